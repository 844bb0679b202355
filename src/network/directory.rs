//! Live node collection of a network.

use std::collections::{btree_map, BTreeMap, HashMap};
use std::sync::Arc;

use crate::common::Id;
use crate::network::RoutingNode;

#[derive(Debug)]
/// The live nodes of a network, keyed by [Id] and reachable by name.
///
/// Nodes only refer to each other by Id. Dereferencing an Id that is no
/// longer here is how a stale routing entry is detected.
pub struct Directory<N> {
    nodes: BTreeMap<Id, Arc<N>>,
    names: HashMap<String, Id>,
}

impl<N: RoutingNode> Directory<N> {
    pub fn new() -> Self {
        Directory {
            nodes: BTreeMap::new(),
            names: HashMap::new(),
        }
    }

    // === Getters ===

    pub fn get(&self, id: &Id) -> Option<&Arc<N>> {
        self.nodes.get(id)
    }

    pub fn by_name(&self, name: &str) -> Option<&Arc<N>> {
        self.names.get(name).and_then(|id| self.nodes.get(id))
    }

    /// Returns `true` if a live node has this Id.
    pub fn contains(&self, id: &Id) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in ring order, ascending by Id.
    pub fn iter(&self) -> btree_map::Values<'_, Id, Arc<N>> {
        self.nodes.values()
    }

    /// The `index`-th node in ring order.
    pub fn nth(&self, index: usize) -> Option<&Arc<N>> {
        self.nodes.values().nth(index)
    }

    // === Membership ===

    pub(crate) fn insert(&mut self, node: Arc<N>) {
        self.names.insert(node.name().to_string(), node.id());
        self.nodes.insert(node.id(), node);
    }

    pub(crate) fn remove(&mut self, id: &Id) -> Option<Arc<N>> {
        let node = self.nodes.remove(id)?;
        self.names.remove(node.name());

        Some(node)
    }

    pub(crate) fn clear(&mut self) {
        self.nodes.clear();
        self.names.clear();
    }
}

impl<N: RoutingNode> Default for Directory<N> {
    fn default() -> Self {
        Self::new()
    }
}
