//! Ring node: finger table routing, eager join and minimal leave.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info, warn};

use crate::common::{Hops, Id, IdSpace, Message, Store};
use crate::network::{Directory, RoutingNode};
use crate::ring::FingerTable;
use crate::{Config, Result};

#[derive(Debug)]
struct Links {
    predecessor: Option<Id>,
    fingers: FingerTable,
    active: bool,
}

#[derive(Debug)]
/// Node of a ring overlay, responsible for the keys in `(predecessor, id]`.
pub struct RingNode<V> {
    name: String,
    id: Id,
    space: IdSpace,
    links: RwLock<Links>,
    store: Mutex<Store<V>>,
}

impl<V> RingNode<V> {
    // === Getters ===

    pub fn successor(&self) -> Option<Id> {
        self.links().fingers.successor()
    }

    pub fn predecessor(&self) -> Option<Id> {
        self.links().predecessor
    }

    /// Finger `index`, `None` if unset or out of range.
    pub fn finger(&self, index: usize) -> Option<Id> {
        self.links().fingers.get(index)
    }

    /// Snapshot of the finger table.
    pub fn finger_table(&self) -> FingerTable {
        self.links().fingers.clone()
    }

    // === Private Methods ===

    fn links(&self) -> RwLockReadGuard<'_, Links> {
        self.links.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn links_mut(&self) -> RwLockWriteGuard<'_, Links> {
        self.links.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_successor(&self, successor: Id) {
        self.links_mut().fingers.set_successor(successor);
    }

    fn set_predecessor(&self, predecessor: Id) {
        self.links_mut().predecessor = Some(predecessor);
    }
}

impl<V: Clone + Send + Sync + 'static> RingNode<V> {
    /// Walk the ring from here to the node whose `(id, successor]` covers
    /// `key`, counting one hop per forward.
    fn find_predecessor(
        &self,
        key: &Id,
        nodes: &Directory<Self>,
        hops: &mut Hops,
    ) -> Option<Arc<Self>> {
        let mut current = nodes.get(&self.id)?.clone();

        // Each forward strictly shrinks the clockwise distance to `key`.
        for _ in 0..=nodes.len() {
            let Some(successor) = current.successor() else {
                return Some(current);
            };
            if successor == current.id || self.space.in_half_open(key, &current.id, &successor) {
                return Some(current);
            }

            let next_id = current
                .closest_preceding(key, nodes)
                .unwrap_or(successor);
            let Some(next) = nodes.get(&next_id) else {
                warn!(node = current.name, successor = %next_id, "Successor is not live");
                return Some(current);
            };

            hops.send(&current.id, &next_id, Message::Forward);
            current = next.clone();
        }

        warn!(node = self.name, %key, "Routing did not converge");
        Some(current)
    }

    fn closest_preceding(&self, key: &Id, nodes: &Directory<Self>) -> Option<Id> {
        self.links()
            .fingers
            .closest_preceding(key, &self.space, |finger| {
                let live = nodes.contains(finger);
                if !live {
                    debug!(node = self.name, %finger, "Skipping stale finger");
                }
                live
            })
    }

    /// Resolve `successor(target)` starting at `anchor`, one hop for the
    /// request plus routing.
    fn resolve_from(
        &self,
        anchor: &Arc<Self>,
        target: &Id,
        nodes: &Directory<Self>,
        hops: &mut Hops,
    ) -> Option<Id> {
        hops.send(&self.id, &anchor.id, Message::Join);

        anchor.find_responsible(target, nodes, hops)
    }

    /// Fill the finger table through `successor`, reusing the previous
    /// finger while it still covers the next start.
    fn build_fingers(&self, successor: Id, nodes: &Directory<Self>, hops: &mut Hops) {
        let mut fingers = self.finger_table();
        fingers.set_successor(successor);

        for index in 1..fingers.size() {
            let start = fingers.start(index).copied();
            let (Some(start), Some(previous)) = (start, fingers.get(index - 1)) else {
                break;
            };

            // Past a finger pointing at us the ring is empty up to ourselves.
            if previous == self.id || self.space.in_half_open(&start, &self.id, &previous) {
                fingers.set(index, previous);
                continue;
            }

            let Some(anchor) = nodes.get(&previous).cloned() else {
                fingers.set(index, previous);
                continue;
            };

            let resolved = self
                .resolve_from(&anchor, &start, nodes, hops)
                .unwrap_or(previous);

            // Nobody between the start and the resolved node but us.
            if self.space.in_closed_open(&self.id, &start, &resolved) {
                fingers.set(index, self.id);
            } else {
                fingers.set(index, resolved);
            }
        }

        self.links_mut().fingers = fingers;
    }

    /// Offer ourselves to every node whose finger should now point here.
    ///
    /// The candidates for finger `i` are the nodes preceding `id - 2^i`;
    /// updates for the same node travel in one message, then ripple to
    /// predecessors for as long as they are accepted.
    fn update_others(&self, predecessor: Id, nodes: &Directory<Self>, hops: &mut Hops) {
        let mut pending: BTreeMap<Id, Vec<usize>> = BTreeMap::new();
        let size = self.links().fingers.size();

        // Last resolved arc (owner, owner's successor].
        let mut known = (predecessor, self.id);

        for index in 0..size {
            let target = self
                .space
                .offset_back(&self.id, index as u32)
                .wrapping_add(&Id::from_u64(1))
                .masked(self.space.bits());

            let owner = if self.space.in_half_open(&target, &known.0, &known.1) {
                known.0
            } else {
                match self.find_predecessor(&target, nodes, hops) {
                    Some(node) => {
                        known = (node.id, node.successor().unwrap_or(node.id));
                        node.id
                    }
                    None => continue,
                }
            };

            if owner != self.id {
                pending.entry(owner).or_default().push(index);
            }
        }

        for (owner, indices) in pending {
            let mut sender = self.id;
            let mut current = owner;
            let mut indices = indices;

            while current != self.id && !indices.is_empty() {
                let Some(node) = nodes.get(&current) else {
                    break;
                };

                hops.send(&sender, &current, Message::FingerUpdate);
                indices.retain(|&index| {
                    node.links_mut().fingers.offer(index, self.id, &self.space)
                });

                let Some(predecessor) = node.predecessor() else {
                    break;
                };
                sender = current;
                current = predecessor;
            }
        }
    }
}

impl<V: Clone + Send + Sync + 'static> RoutingNode for RingNode<V> {
    type Value = V;

    const PROTOCOL: &'static str = "ring";

    fn validate(config: &Config) -> Result<()> {
        config.validate_ring()
    }

    fn new(name: &str, id: Id, space: IdSpace, config: &Config) -> Self {
        RingNode {
            name: name.to_string(),
            id,
            space,
            links: RwLock::new(Links {
                predecessor: None,
                fingers: FingerTable::new(id, config.finger_table_size, &space),
                active: false,
            }),
            store: Mutex::new(Store::new()),
        }
    }

    // === Getters ===

    fn name(&self) -> &str {
        &self.name
    }

    fn id(&self) -> Id {
        self.id
    }

    fn space(&self) -> &IdSpace {
        &self.space
    }

    fn store(&self) -> &Mutex<Store<V>> {
        &self.store
    }

    fn is_active(&self) -> bool {
        self.links().active
    }

    fn routing_entries(&self) -> usize {
        self.links().fingers.unique().len()
    }

    // === Protocol ===

    fn find_responsible(&self, key: &Id, nodes: &Directory<Self>, hops: &mut Hops) -> Option<Id> {
        let predecessor = self.find_predecessor(key, nodes, hops)?;
        let responsible = predecessor.successor().unwrap_or(predecessor.id);

        Some(responsible)
    }

    fn join(&self, bootstrap: Option<&Arc<Self>>, nodes: &Directory<Self>) -> u32 {
        let Some(bootstrap) = bootstrap else {
            let mut links = self.links_mut();
            links.predecessor = Some(self.id);
            links.fingers.fill(self.id);
            links.active = true;

            return 0;
        };

        let mut hops = Hops::new();

        let Some(successor_id) = self.resolve_from(bootstrap, &self.id, nodes, &mut hops) else {
            warn!(node = self.name, bootstrap = bootstrap.name, "Bootstrap is not live");
            return hops.count();
        };
        let Some(successor) = nodes.get(&successor_id).cloned() else {
            return hops.count();
        };

        self.build_fingers(successor_id, nodes, &mut hops);

        // Splice in between the successor and its old predecessor.
        hops.send(&self.id, &successor_id, Message::GetPredecessor);
        let predecessor_id = successor.predecessor().unwrap_or(successor_id);
        self.set_predecessor(predecessor_id);

        hops.send(&self.id, &successor_id, Message::Notify);
        successor.set_predecessor(self.id);

        if let Some(predecessor) = nodes.get(&predecessor_id) {
            if predecessor_id != successor_id {
                hops.send(&self.id, &predecessor_id, Message::Notify);
            }
            predecessor.set_successor(self.id);
        }

        // Keys in (predecessor, self] are ours now.
        let moved = successor
            .lock_store()
            .extract(|key| self.space.in_half_open(key, &predecessor_id, &self.id));
        if !moved.is_empty() {
            hops.send(&successor_id, &self.id, Message::Transfer);
            debug!(from = successor.name, to = self.name, keys = moved.len(), "Migrated keys");
            self.lock_store().absorb(moved);
        }

        self.update_others(predecessor_id, nodes, &mut hops);

        self.links_mut().active = true;
        info!(node = self.name, hops = hops.count(), "Joined ring");

        hops.count()
    }

    fn leave(&self, nodes: &Directory<Self>) -> u32 {
        let (successor, predecessor) = {
            let mut links = self.links_mut();
            links.active = false;

            (links.fingers.successor(), links.predecessor)
        };

        let records = self.lock_store().drain();

        let successor = successor
            .filter(|id| *id != self.id)
            .and_then(|id| nodes.get(&id));
        let Some(successor) = successor else {
            debug!(node = self.name, keys = records.len(), "Last node left, dropping records");
            return 0;
        };

        let mut hops = Hops::new();

        if !records.is_empty() {
            hops.send(&self.id, &successor.id, Message::Transfer);
            debug!(from = self.name, to = successor.name, keys = records.len(), "Handed over keys");
            successor.lock_store().absorb(records);
        }

        let predecessor_id = predecessor.unwrap_or(successor.id);

        hops.send(&self.id, &successor.id, Message::Leave);
        successor.set_predecessor(predecessor_id);

        if let Some(predecessor) = nodes.get(&predecessor_id) {
            if predecessor_id != successor.id {
                hops.send(&self.id, &predecessor_id, Message::Leave);
            }
            predecessor.set_successor(successor.id);
        }

        info!(node = self.name, hops = hops.count(), "Left ring");

        hops.count()
    }

    fn deactivate(&self) {
        let mut links = self.links_mut();
        links.active = false;
        links.predecessor = None;
        links.fingers = FingerTable::new(self.id, links.fingers.size(), &self.space);
        drop(links);

        self.lock_store().clear();
    }
}
