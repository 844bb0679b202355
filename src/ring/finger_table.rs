//! Finger table of a ring node.

use std::collections::BTreeSet;

use crate::common::{Id, IdSpace};

#[derive(Debug, Clone)]
/// Entry `i` points at the first node at or after `owner + 2^i`.
///
/// Entry `0` is the owner's successor. Entries are Ids; an entry whose node
/// has left stays in place until a newer node is offered for it.
pub struct FingerTable {
    owner: Id,
    starts: Vec<Id>,
    fingers: Vec<Option<Id>>,
}

impl FingerTable {
    /// Create an empty table of `size` entries for `owner`.
    pub fn new(owner: Id, size: usize, space: &IdSpace) -> Self {
        let starts = (0..size as u32)
            .map(|bit| space.offset(&owner, bit))
            .collect();

        FingerTable {
            owner,
            starts,
            fingers: vec![None; size],
        }
    }

    // === Getters ===

    pub fn size(&self) -> usize {
        self.fingers.len()
    }

    /// `owner + 2^index`
    pub fn start(&self, index: usize) -> Option<&Id> {
        self.starts.get(index)
    }

    pub fn get(&self, index: usize) -> Option<Id> {
        self.fingers.get(index).copied().flatten()
    }

    pub fn successor(&self) -> Option<Id> {
        self.get(0)
    }

    /// Distinct Ids referenced by the table.
    pub fn unique(&self) -> BTreeSet<Id> {
        self.fingers.iter().flatten().copied().collect()
    }

    // === Public Methods ===

    pub fn set(&mut self, index: usize, node: Id) {
        if let Some(finger) = self.fingers.get_mut(index) {
            *finger = Some(node);
        }
    }

    pub fn set_successor(&mut self, node: Id) {
        self.set(0, node)
    }

    /// Point every entry at `node`, the state of a lone node.
    pub fn fill(&mut self, node: Id) {
        self.fingers.iter_mut().for_each(|finger| *finger = Some(node));
    }

    /// Point entry `index` at `node` if `node` falls in `[start, current)`,
    /// i.e. it is a closer successor of the entry's start than the current
    /// finger. Returns `true` if the entry changed.
    pub fn offer(&mut self, index: usize, node: Id, space: &IdSpace) -> bool {
        let Some(start) = self.starts.get(index) else {
            return false;
        };

        let closer = match self.fingers[index] {
            None => true,
            Some(current) if current == node => false,
            Some(current) => space.in_closed_open(&node, start, &current),
        };

        if closer {
            self.fingers[index] = Some(node);
        }

        closer
    }

    /// Highest finger strictly between the owner and `key` for which
    /// `is_live` holds.
    pub fn closest_preceding<F>(&self, key: &Id, space: &IdSpace, is_live: F) -> Option<Id>
    where
        F: Fn(&Id) -> bool,
    {
        self.fingers
            .iter()
            .rev()
            .flatten()
            .find(|finger| space.in_open(finger, &self.owner, key) && is_live(finger))
            .copied()
    }
}
