//! The capability set every protocol's node provides, and the record
//! operations built on top of it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::common::{Hops, Id, IdSpace, Message, Store};
use crate::network::Directory;
use crate::{Config, Result};

/// A node of a structured overlay.
///
/// Protocols implement routing ([RoutingNode::find_responsible]) and
/// membership ([RoutingNode::join], [RoutingNode::leave]); record
/// operations are shared and cost the routing hops plus one direct message
/// to the responsible node when that node is not `self`.
pub trait RoutingNode: Sized + Send + Sync + 'static {
    /// Opaque record payload.
    type Value: Clone + Send + Sync + 'static;

    /// Short protocol name for logs.
    const PROTOCOL: &'static str;

    /// Check the configuration constraints of this protocol.
    fn validate(config: &Config) -> Result<()>;

    /// Create a node that is not yet part of any overlay.
    fn new(name: &str, id: Id, space: IdSpace, config: &Config) -> Self;

    // === Getters ===

    fn name(&self) -> &str;

    fn id(&self) -> Id;

    fn space(&self) -> &IdSpace;

    fn store(&self) -> &Mutex<Store<Self::Value>>;

    /// Returns `true` between a completed join and leave.
    fn is_active(&self) -> bool;

    /// Number of distinct nodes referenced by the routing structure.
    fn routing_entries(&self) -> usize;

    /// Number of distinct leaf set members, for protocols that have one.
    fn leaf_set_len(&self) -> Option<usize> {
        None
    }

    // === Protocol ===

    /// Route toward the node responsible for `key`, starting here, counting
    /// every forwarding step. Returns `None` if this node is not live in
    /// `nodes`.
    fn find_responsible(&self, key: &Id, nodes: &Directory<Self>, hops: &mut Hops) -> Option<Id>;

    /// Join the overlay through `bootstrap`, or start a new one if `None`.
    /// `self` must already be in `nodes`. Returns the hops used.
    fn join(&self, bootstrap: Option<&Arc<Self>>, nodes: &Directory<Self>) -> u32;

    /// Leave gracefully, handing records over and repairing neighbours.
    /// `self` is still in `nodes`. Returns the hops used.
    fn leave(&self, nodes: &Directory<Self>) -> u32;

    /// Drop all state without notifying anyone.
    fn deactivate(&self);

    // === Provided ===

    fn lock_store(&self) -> MutexGuard<'_, Store<Self::Value>> {
        self.store().lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of records stored here.
    fn key_count(&self) -> usize {
        self.lock_store().len()
    }

    /// Resolve the responsible node and account for the direct message to it.
    fn route(
        &self,
        key: &Id,
        nodes: &Directory<Self>,
        hops: &mut Hops,
        message: Message,
    ) -> Option<Arc<Self>> {
        let responsible = self.find_responsible(key, nodes, hops)?;
        let node = nodes.get(&responsible)?;

        hops.send(&self.id(), &responsible, message);

        Some(node.clone())
    }

    /// Store `value` under `key` at the responsible node.
    fn insert(&self, key: &str, value: Self::Value, nodes: &Directory<Self>) -> (bool, u32) {
        let key_id = self.space().key_id(key);
        let mut hops = Hops::new();

        let Some(node) = self.route(&key_id, nodes, &mut hops, Message::Store) else {
            return (false, hops.count());
        };

        node.lock_store().put(key_id, key, value);
        debug!(key, node = node.name(), hops = hops.count(), "Inserted");

        (true, hops.count())
    }

    /// Fetch the value stored under `key`.
    fn lookup(&self, key: &str, nodes: &Directory<Self>) -> (Option<Self::Value>, u32) {
        let key_id = self.space().key_id(key);
        let mut hops = Hops::new();

        let Some(node) = self.route(&key_id, nodes, &mut hops, Message::Fetch) else {
            return (None, hops.count());
        };

        let value = node.lock_store().get(&key_id, key).cloned();
        debug!(
            key,
            node = node.name(),
            found = value.is_some(),
            hops = hops.count(),
            "Lookup"
        );

        (value, hops.count())
    }

    /// Overwrite the value of an existing `key`. Fails if the key is absent.
    fn update(&self, key: &str, value: Self::Value, nodes: &Directory<Self>) -> (bool, u32) {
        let key_id = self.space().key_id(key);
        let mut hops = Hops::new();

        let Some(node) = self.route(&key_id, nodes, &mut hops, Message::Update) else {
            return (false, hops.count());
        };

        let updated = node.lock_store().replace(&key_id, key, value);
        debug!(key, node = node.name(), updated, hops = hops.count(), "Update");

        (updated, hops.count())
    }

    /// Remove `key`. Fails if the key is absent.
    fn delete(&self, key: &str, nodes: &Directory<Self>) -> (bool, u32) {
        let key_id = self.space().key_id(key);
        let mut hops = Hops::new();

        let Some(node) = self.route(&key_id, nodes, &mut hops, Message::Remove) else {
            return (false, hops.count());
        };

        let deleted = node.lock_store().remove(&key_id, key).is_some();
        debug!(key, node = node.name(), deleted, hops = hops.count(), "Delete");

        (deleted, hops.count())
    }
}
