//! Prefix node: routing table and leaf set routing, join along the route
//! to the new node's own Id, and leaf set repair on leave.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info, warn};

use crate::common::{Hops, Id, IdSpace, Message, Record, Store};
use crate::network::{Directory, RoutingNode};
use crate::prefix::{LeafSet, RoutingTable};
use crate::{Config, FallbackPolicy, Result};

#[derive(Debug)]
struct State {
    routing_table: RoutingTable,
    leaf_set: LeafSet,
    active: bool,
}

#[derive(Debug)]
/// Node of a prefix overlay, responsible for the keys numerically closest
/// to its Id.
pub struct PrefixNode<V> {
    name: String,
    id: Id,
    space: IdSpace,
    fallback: FallbackPolicy,
    state: RwLock<State>,
    store: Mutex<Store<V>>,
}

impl<V> PrefixNode<V> {
    // === Getters ===

    /// Snapshot of the leaf set.
    pub fn leaf_set(&self) -> LeafSet {
        self.state().leaf_set.clone()
    }

    /// Snapshot of the routing table.
    pub fn routing_table(&self) -> RoutingTable {
        self.state().routing_table.clone()
    }

    // === Private Methods ===

    fn state(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn state_mut(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Routing table entries of rows `0..=row`, as sent to a joining node.
    fn rows_up_to(&self, row: usize) -> Vec<Id> {
        let state = self.state();
        let table = &state.routing_table;

        (0..=row.min(table.rows().saturating_sub(1)))
            .filter_map(|r| table.row(r))
            .flatten()
            .flatten()
            .copied()
            .collect()
    }

    /// `a` is a better fallback than `b` for `key`: longer shared prefix,
    /// then numerically closer.
    fn better_prefix(&self, key: &Id, a: &Id, b: &Id) -> bool {
        let prefix_a = self.space.shared_prefix_len(a, key);
        let prefix_b = self.space.shared_prefix_len(b, key);

        prefix_a > prefix_b
            || (prefix_a == prefix_b && self.space.cmp_closeness(key, a, b) == Ordering::Less)
    }

    fn closer(&self, key: &Id, a: &Id, b: &Id) -> bool {
        self.space.cmp_closeness(key, a, b) == Ordering::Less
    }
}

impl<V: Clone + Send + Sync + 'static> PrefixNode<V> {
    /// The next node toward `key`, or `None` if this node is the closest it
    /// knows of.
    fn next_hop(&self, key: &Id, nodes: &Directory<Self>) -> Option<Id> {
        let state = self.state();
        let live = |id: &Id| nodes.contains(id);

        if state.leaf_set.covers(key, &self.space) {
            let best = state
                .leaf_set
                .nodes()
                .into_iter()
                .filter(live)
                .fold(self.id, |best, leaf| {
                    if self.closer(key, &leaf, &best) {
                        leaf
                    } else {
                        best
                    }
                });

            return (best != self.id).then_some(best);
        }

        if let Some(next) = state.routing_table.next_hop(key, &self.space) {
            if live(&next) {
                return Some(next);
            }
            debug!(node = self.name, entry = %next, "Skipping stale routing entry");
        }

        let candidates: BTreeSet<Id> = state
            .leaf_set
            .nodes()
            .into_iter()
            .chain(state.routing_table.nodes())
            .filter(live)
            .collect();

        let best = match self.fallback {
            FallbackPolicy::PrefixThenDistance => {
                candidates.into_iter().fold(self.id, |best, candidate| {
                    if self.better_prefix(key, &candidate, &best) {
                        candidate
                    } else {
                        best
                    }
                })
            }
            FallbackPolicy::Distance => {
                let floor = self.space.shared_prefix_len(&self.id, key);

                candidates
                    .into_iter()
                    .filter(|candidate| self.space.shared_prefix_len(candidate, key) >= floor)
                    .fold(self.id, |best, candidate| {
                        if self.closer(key, &candidate, &best) {
                            candidate
                        } else {
                            best
                        }
                    })
            }
        };

        (best != self.id).then_some(best)
    }

    /// Offer live `candidates` to the leaf set and routing table.
    fn learn<I>(&self, candidates: I, nodes: &Directory<Self>)
    where
        I: IntoIterator<Item = Id>,
    {
        let mut state = self.state_mut();

        for candidate in candidates {
            if candidate == self.id || !nodes.contains(&candidate) {
                continue;
            }

            state.leaf_set.insert(candidate, &self.space);
            state
                .routing_table
                .insert(candidate, &self.space, |existing| nodes.contains(existing));
        }
    }

    /// Drop `departed` and repair from the leaf set it sent along.
    fn forget(&self, departed: &Id, exchange: &[Id], nodes: &Directory<Self>) {
        {
            let mut state = self.state_mut();
            state.leaf_set.remove(departed);
            state.routing_table.remove(departed);
        }

        self.learn(exchange.iter().copied().filter(|id| id != departed), nodes);
    }
}

impl<V: Clone + Send + Sync + 'static> RoutingNode for PrefixNode<V> {
    type Value = V;

    const PROTOCOL: &'static str = "prefix";

    fn validate(config: &Config) -> Result<()> {
        config.validate_prefix()
    }

    fn new(name: &str, id: Id, space: IdSpace, config: &Config) -> Self {
        PrefixNode {
            name: name.to_string(),
            id,
            space,
            fallback: config.fallback,
            state: RwLock::new(State {
                routing_table: RoutingTable::new(id, config.routing_table_rows),
                leaf_set: LeafSet::new(id, config.leaf_set_size),
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
        self.state().active
    }

    fn routing_entries(&self) -> usize {
        self.state().routing_table.filled()
    }

    fn leaf_set_len(&self) -> Option<usize> {
        Some(self.state().leaf_set.len())
    }

    // === Protocol ===

    fn find_responsible(&self, key: &Id, nodes: &Directory<Self>, hops: &mut Hops) -> Option<Id> {
        let mut current = nodes.get(&self.id)?.clone();
        let mut visited = BTreeSet::from([self.id]);

        loop {
            let Some(next_id) = current.next_hop(key, nodes) else {
                return Some(current.id);
            };
            if !visited.insert(next_id) {
                warn!(node = current.name, %key, "Routing loop, stopping at current node");
                return Some(current.id);
            }
            let Some(next) = nodes.get(&next_id) else {
                return Some(current.id);
            };

            hops.send(&current.id, &next_id, Message::Forward);
            current = next.clone();
        }
    }

    fn join(&self, bootstrap: Option<&Arc<Self>>, nodes: &Directory<Self>) -> u32 {
        let Some(bootstrap) = bootstrap else {
            self.state_mut().active = true;
            return 0;
        };

        let mut hops = Hops::new();
        hops.send(&self.id, &bootstrap.id, Message::Join);

        // Route the join toward our own Id; every node on the way replies
        // with the rows of its table we share a prefix with.
        let mut current = bootstrap.clone();
        let mut visited = BTreeSet::from([current.id]);

        loop {
            hops.send(&current.id, &self.id, Message::State);

            let shared = self.space.shared_prefix_len(&self.id, &current.id);
            let mut candidates = current.rows_up_to(shared);
            candidates.push(current.id);
            self.learn(candidates, nodes);

            let next = current
                .next_hop(&self.id, nodes)
                .filter(|next| visited.insert(*next))
                .and_then(|next| nodes.get(&next).cloned());
            let Some(next) = next else {
                break;
            };

            hops.send(&current.id, &next.id, Message::Join);
            current = next;
        }

        // The closest node's reply also carries its leaf set.
        self.learn(current.leaf_set().nodes(), nodes);

        let (targets, neighbours): (BTreeSet<Id>, Vec<Id>) = {
            let state = self.state();
            let targets = state
                .leaf_set
                .nodes()
                .into_iter()
                .chain(state.routing_table.nodes())
                .collect();
            let neighbours = state
                .leaf_set
                .predecessor()
                .into_iter()
                .chain(state.leaf_set.successor())
                .collect();

            (targets, neighbours)
        };

        for target in &targets {
            if let Some(node) = nodes.get(target) {
                hops.send(&self.id, target, Message::Announce);
                node.learn([self.id], nodes);
            }
        }

        // Pull the keys we are now closest to from both immediate neighbours.
        let neighbours: BTreeSet<Id> = neighbours.into_iter().collect();
        for neighbour in neighbours.iter().filter_map(|id| nodes.get(id)) {
            let moved = neighbour
                .lock_store()
                .extract(|key| self.closer(key, &self.id, &neighbour.id));

            if !moved.is_empty() {
                hops.send(&neighbour.id, &self.id, Message::Transfer);
                debug!(from = neighbour.name, to = self.name, keys = moved.len(), "Migrated keys");
                self.lock_store().absorb(moved);
            }
        }

        self.state_mut().active = true;
        info!(
            node = self.name,
            hops = hops.count(),
            announced = targets.len(),
            "Joined prefix overlay"
        );

        hops.count()
    }

    fn leave(&self, nodes: &Directory<Self>) -> u32 {
        let exchange = {
            let mut state = self.state_mut();
            state.active = false;

            state.leaf_set.nodes()
        };
        let neighbours: Vec<Arc<Self>> = exchange
            .iter()
            .filter_map(|id| nodes.get(id).cloned())
            .collect();

        let records = self.lock_store().drain();

        if neighbours.is_empty() {
            debug!(node = self.name, keys = records.len(), "Last node left, dropping records");
            return 0;
        }

        let mut hops = Hops::new();

        // Each record goes to whichever neighbour is now closest to it.
        let mut handover: BTreeMap<Id, Vec<(Id, Record<V>)>> = BTreeMap::new();
        for (key, record) in records {
            let target = neighbours
                .iter()
                .map(|node| node.id)
                .reduce(|best, id| if self.closer(&key, &id, &best) { id } else { best });

            if let Some(target) = target {
                handover.entry(target).or_default().push((key, record));
            }
        }
        for (target, records) in handover {
            if let Some(node) = nodes.get(&target) {
                hops.send(&self.id, &target, Message::Transfer);
                debug!(from = self.name, to = node.name, keys = records.len(), "Handed over keys");
                node.lock_store().absorb(records);
            }
        }

        for neighbour in &neighbours {
            hops.send(&self.id, &neighbour.id, Message::Leave);
            neighbour.forget(&self.id, &exchange, nodes);
        }

        info!(node = self.name, hops = hops.count(), "Left prefix overlay");

        hops.count()
    }

    fn deactivate(&self) {
        let mut state = self.state_mut();
        state.active = false;
        state.leaf_set = LeafSet::new(self.id, state.leaf_set.capacity());
        state.routing_table = RoutingTable::new(self.id, state.routing_table.rows());
        drop(state);

        self.lock_store().clear();
    }
}
