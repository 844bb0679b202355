//! Per node local key-value storage.

use std::collections::btree_map::{self, BTreeMap};

use crate::common::Id;

#[derive(Debug, Clone, PartialEq)]
/// A stored record: the original key and its opaque value.
pub struct Record<V> {
    pub key: String,
    pub value: V,
}

#[derive(Debug, Clone)]
/// Records a node is responsible for, ordered by key [Id].
///
/// Records are addressed by key Id; reads and removals also match the key
/// string, so two keys hashing to the same Id never read each other's value.
pub struct Store<V> {
    records: BTreeMap<Id, Record<V>>,
}

impl<V> Store<V> {
    pub fn new() -> Self {
        Store {
            records: BTreeMap::new(),
        }
    }

    // === Getters ===

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, key_id: &Id) -> bool {
        self.records.contains_key(key_id)
    }

    /// Value of `key`, if the record at `key_id` belongs to it.
    pub fn get(&self, key_id: &Id, key: &str) -> Option<&V> {
        self.records
            .get(key_id)
            .filter(|record| record.key == key)
            .map(|record| &record.value)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, Id, Record<V>> {
        self.records.iter()
    }

    // === Public Methods ===

    /// Store or overwrite a record, returning the previous value if any.
    pub fn put(&mut self, key_id: Id, key: &str, value: V) -> Option<V> {
        self.records
            .insert(
                key_id,
                Record {
                    key: key.to_string(),
                    value,
                },
            )
            .map(|record| record.value)
    }

    /// Overwrite an existing record. Returns `false` and stores nothing if
    /// the key is absent.
    pub fn replace(&mut self, key_id: &Id, key: &str, value: V) -> bool {
        match self.records.get_mut(key_id) {
            Some(record) if record.key == key => {
                record.value = value;
                true
            }
            _ => false,
        }
    }

    pub fn remove(&mut self, key_id: &Id, key: &str) -> Option<V> {
        if self.get(key_id, key).is_none() {
            return None;
        }

        self.records.remove(key_id).map(|record| record.value)
    }

    /// Remove and return every record whose Id matches `predicate`.
    pub fn extract<F>(&mut self, mut predicate: F) -> Vec<(Id, Record<V>)>
    where
        F: FnMut(&Id) -> bool,
    {
        let ids: Vec<Id> = self
            .records
            .keys()
            .filter(|id| predicate(id))
            .copied()
            .collect();

        ids.into_iter()
            .filter_map(|id| self.records.remove(&id).map(|record| (id, record)))
            .collect()
    }

    /// Remove and return every record.
    pub fn drain(&mut self) -> Vec<(Id, Record<V>)> {
        std::mem::take(&mut self.records).into_iter().collect()
    }

    /// Absorb records handed over by another node.
    pub fn absorb(&mut self, records: Vec<(Id, Record<V>)>) {
        self.records.extend(records);
    }

    pub fn clear(&mut self) {
        self.records.clear()
    }
}

impl<V> Default for Store<V> {
    fn default() -> Self {
        Self::new()
    }
}
