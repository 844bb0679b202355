//! Prefix routing table.

use crate::common::{Id, IdSpace, DIGIT_BASE};

#[derive(Debug, Clone)]
/// `rows x 16` table; cell `(r, d)` holds a node sharing exactly `r` leading
/// digits with the owner and whose digit `r` is `d`.
pub struct RoutingTable {
    owner: Id,
    rows: Vec<[Option<Id>; DIGIT_BASE]>,
}

impl RoutingTable {
    pub fn new(owner: Id, rows: usize) -> Self {
        RoutingTable {
            owner,
            rows: vec![[None; DIGIT_BASE]; rows],
        }
    }

    // === Getters ===

    pub fn rows(&self) -> usize {
        self.rows.len()
    }

    pub fn get(&self, row: usize, column: usize) -> Option<Id> {
        self.rows.get(row).and_then(|cells| cells.get(column)).copied().flatten()
    }

    pub fn row(&self, row: usize) -> Option<&[Option<Id>; DIGIT_BASE]> {
        self.rows.get(row)
    }

    /// Every filled cell.
    pub fn nodes(&self) -> Vec<Id> {
        self.rows.iter().flatten().flatten().copied().collect()
    }

    pub fn filled(&self) -> usize {
        self.rows.iter().flatten().filter(|cell| cell.is_some()).count()
    }

    /// The entry for the next digit of `key`, if the key is within reach of
    /// the table.
    pub fn next_hop(&self, key: &Id, space: &IdSpace) -> Option<Id> {
        let row = space.shared_prefix_len(&self.owner, key);
        if row >= self.rows.len() {
            return None;
        }

        self.get(row, space.digit(key, row) as usize)
    }

    // === Public Methods ===

    /// Place `candidate` in its cell unless the cell holds a node for which
    /// `keep` returns `true`. Returns `true` if the table changed.
    pub fn insert<F>(&mut self, candidate: Id, space: &IdSpace, keep: F) -> bool
    where
        F: Fn(&Id) -> bool,
    {
        if candidate == self.owner {
            return false;
        }

        let row = space.shared_prefix_len(&self.owner, &candidate);
        let Some(cells) = self.rows.get_mut(row) else {
            return false;
        };
        let cell = &mut cells[space.digit(&candidate, row) as usize];

        if let Some(existing) = *cell {
            if existing == candidate || keep(&existing) {
                return false;
            }
        }

        *cell = Some(candidate);
        true
    }

    /// Clear every cell holding `id`. Returns `true` if any did.
    pub fn remove(&mut self, id: &Id) -> bool {
        let mut removed = false;

        for cell in self.rows.iter_mut().flatten() {
            if cell.as_ref() == Some(id) {
                *cell = None;
                removed = true;
            }
        }

        removed
    }
}
