//! Leaf set of a prefix node.

use std::cmp::Ordering;

use crate::common::{Id, IdSpace};

#[derive(Debug, Clone)]
/// The `L/2` numerically nearest nodes on each side of the owner.
///
/// `left` runs counter-clockwise and `right` clockwise, nearest first. In a
/// network smaller than `L + 1` the same node may sit on both sides.
pub struct LeafSet {
    owner: Id,
    half: usize,
    left: Vec<Id>,
    right: Vec<Id>,
}

impl LeafSet {
    /// Create an empty leaf set of total size `size`.
    pub fn new(owner: Id, size: usize) -> Self {
        let half = size / 2;

        LeafSet {
            owner,
            half,
            left: Vec::with_capacity(half),
            right: Vec::with_capacity(half),
        }
    }

    // === Getters ===

    /// Total size `L`.
    pub fn capacity(&self) -> usize {
        self.half * 2
    }

    pub fn left(&self) -> &[Id] {
        &self.left
    }

    pub fn right(&self) -> &[Id] {
        &self.right
    }

    /// Nearest counter-clockwise neighbour.
    pub fn predecessor(&self) -> Option<Id> {
        self.left.first().copied()
    }

    /// Nearest clockwise neighbour.
    pub fn successor(&self) -> Option<Id> {
        self.right.first().copied()
    }

    pub fn contains(&self, id: &Id) -> bool {
        self.left.contains(id) || self.right.contains(id)
    }

    /// Distinct members, clockwise side first.
    pub fn nodes(&self) -> Vec<Id> {
        let mut nodes = self.right.clone();
        for id in &self.left {
            if !nodes.contains(id) {
                nodes.push(*id);
            }
        }

        nodes
    }

    pub fn len(&self) -> usize {
        self.nodes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty() && self.right.is_empty()
    }

    /// Returns `true` if `key` lies within the span of the leaf set.
    ///
    /// A side with fewer than `L/2` members means every node is known, so
    /// the whole ring is covered.
    pub fn covers(&self, key: &Id, space: &IdSpace) -> bool {
        let (Some(lowest), Some(highest)) = (self.left.last(), self.right.last()) else {
            return true;
        };
        if self.left.len() < self.half || self.right.len() < self.half {
            return true;
        }

        space.clockwise(key, &self.owner) <= space.clockwise(lowest, &self.owner)
            || space.clockwise(&self.owner, key) <= space.clockwise(&self.owner, highest)
    }

    // === Public Methods ===

    /// Offer `candidate` to both sides. Returns `true` if either side took it.
    pub fn insert(&mut self, candidate: Id, space: &IdSpace) -> bool {
        if candidate == self.owner {
            return false;
        }

        let owner = self.owner;
        let right = Self::insert_side(&mut self.right, self.half, candidate, |a, b| {
            space.clockwise(&owner, a).cmp(&space.clockwise(&owner, b))
        });
        let left = Self::insert_side(&mut self.left, self.half, candidate, |a, b| {
            space.clockwise(a, &owner).cmp(&space.clockwise(b, &owner))
        });

        right || left
    }

    /// Remove `id` from both sides. Returns `true` if it was a member.
    pub fn remove(&mut self, id: &Id) -> bool {
        let before = self.left.len() + self.right.len();

        self.left.retain(|member| member != id);
        self.right.retain(|member| member != id);

        before != self.left.len() + self.right.len()
    }

    // === Private Methods ===

    fn insert_side<F>(side: &mut Vec<Id>, half: usize, candidate: Id, nearer: F) -> bool
    where
        F: Fn(&Id, &Id) -> Ordering,
    {
        if side.contains(&candidate) {
            return false;
        }

        let position = side
            .iter()
            .position(|member| nearer(&candidate, member) == Ordering::Less)
            .unwrap_or(side.len());
        if position >= half {
            return false;
        }

        side.insert(position, candidate);
        side.truncate(half);

        true
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn space() -> IdSpace {
        IdSpace::new(8).unwrap()
    }

    fn id(n: u64) -> Id {
        Id::from_u64(n)
    }

    #[test]
    fn keeps_nearest_per_side() {
        let space = space();
        let mut leaves = LeafSet::new(id(100), 4);

        for n in [90, 120, 50, 101, 99, 200] {
            leaves.insert(id(n), &space);
        }

        assert_eq!(leaves.right(), &[id(101), id(120)]);
        assert_eq!(leaves.left(), &[id(99), id(90)]);
        assert_eq!(leaves.predecessor(), Some(id(99)));
        assert_eq!(leaves.successor(), Some(id(101)));

        assert!(!leaves.insert(id(100), &space));
        assert!(!leaves.insert(id(101), &space));
        assert!(!leaves.insert(id(180), &space));
    }

    #[test]
    fn small_networks_share_members() {
        let space = space();
        let mut leaves = LeafSet::new(id(10), 8);

        leaves.insert(id(20), &space);
        leaves.insert(id(250), &space);

        assert_eq!(leaves.right(), &[id(20), id(250)]);
        assert_eq!(leaves.left(), &[id(250), id(20)]);
        assert_eq!(leaves.len(), 2);
        assert!(leaves.covers(&id(128), &space));
    }

    #[test]
    fn covers_span_of_full_set() {
        let space = space();
        let mut leaves = LeafSet::new(id(100), 4);
        for n in [80, 90, 110, 130] {
            leaves.insert(id(n), &space);
        }

        assert!(leaves.covers(&id(80), &space));
        assert!(leaves.covers(&id(100), &space));
        assert!(leaves.covers(&id(125), &space));
        assert!(!leaves.covers(&id(131), &space));
        assert!(!leaves.covers(&id(0), &space));
    }

    #[test]
    fn remove_from_both_sides() {
        let space = space();
        let mut leaves = LeafSet::new(id(10), 8);
        leaves.insert(id(20), &space);

        assert!(leaves.remove(&id(20)));
        assert!(!leaves.remove(&id(20)));
        assert!(leaves.is_empty());
    }
}
