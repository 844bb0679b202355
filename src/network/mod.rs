//! A simulated overlay network: the sole owner of its nodes, membership
//! changes, and record operations started from a random or named node.

mod batch;
mod directory;
mod routing_node;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, error, info, warn};

use crate::common::{Hops, Id, IdSpace};
use crate::prefix::PrefixNode;
use crate::ring::RingNode;
use crate::{Config, Error, Result};

pub use batch::{BatchReport, KeyOutcome};
pub use directory::Directory;
pub use routing_node::RoutingNode;

pub(crate) use batch::run_pool;

/// A network of [RingNode]s routing with finger tables.
pub type RingNetwork<V = Vec<u8>> = Network<RingNode<V>>;
/// A network of [PrefixNode]s routing by shared identifier prefix.
pub type PrefixNetwork<V = Vec<u8>> = Network<PrefixNode<V>>;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Where a key lives, as resolved by routing.
pub struct Location {
    pub name: String,
    pub id: Id,
    pub hops: u32,
}

#[derive(Debug, Clone, PartialEq)]
/// Snapshot of the network's size and load.
pub struct NetworkStats {
    pub protocol: &'static str,
    pub node_count: usize,
    pub total_keys: usize,
    pub min_keys: usize,
    pub max_keys: usize,
    pub average_keys: f64,
    /// Unique fingers (ring) or filled routing table cells (prefix).
    pub average_routing_entries: f64,
    /// Only for protocols with a leaf set.
    pub average_leaf_set: Option<f64>,
}

#[derive(Debug)]
/// Overlay network of nodes of type `N`.
///
/// Record operations share a read lock on the node collection and may run
/// from many threads at once. Joins and leaves take the write lock, so
/// routing never observes a half finished membership change.
pub struct Network<N: RoutingNode> {
    config: Config,
    space: IdSpace,
    nodes: RwLock<Directory<N>>,
    rng: Mutex<StdRng>,
    next_index: AtomicUsize,
}

impl<N: RoutingNode> Network<N> {
    /// Create an empty network. Fails if `config` is invalid for the protocol.
    pub fn new(config: Config) -> Result<Self> {
        N::validate(&config)?;
        let space = config.space()?;

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Network {
            config,
            space,
            nodes: RwLock::new(Directory::new()),
            rng: Mutex::new(rng),
            next_index: AtomicUsize::new(0),
        })
    }

    // === Getters ===

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn space(&self) -> &IdSpace {
        &self.space
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn node(&self, name: &str) -> Option<Arc<N>> {
        self.read().by_name(name).cloned()
    }

    /// A uniformly random live node.
    pub fn random_node(&self) -> Option<Arc<N>> {
        self.pick(&self.read())
    }

    /// Names of live nodes, sorted.
    pub fn node_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .read()
            .iter()
            .map(|node| node.name().to_string())
            .collect();
        names.sort();

        names
    }

    /// Live nodes sorted by identifier.
    pub fn ring_order(&self) -> Vec<(String, Id)> {
        self.read()
            .iter()
            .map(|node| (node.name().to_string(), node.id()))
            .collect()
    }

    /// Size and load statistics over all live nodes.
    pub fn stats(&self) -> NetworkStats {
        let nodes = self.read();
        let node_count = nodes.len();

        let keys: Vec<usize> = nodes.iter().map(|node| node.key_count()).collect();
        let total_keys: usize = keys.iter().sum();
        let routing_entries: usize = nodes.iter().map(|node| node.routing_entries()).sum();
        let leaf_sets: Option<usize> = nodes.iter().map(|node| node.leaf_set_len()).sum();

        let average = |total: usize| {
            if node_count == 0 {
                0.0
            } else {
                total as f64 / node_count as f64
            }
        };

        NetworkStats {
            protocol: N::PROTOCOL,
            node_count,
            total_keys,
            min_keys: keys.iter().copied().min().unwrap_or(0),
            max_keys: keys.iter().copied().max().unwrap_or(0),
            average_keys: average(total_keys),
            average_routing_entries: average(routing_entries),
            average_leaf_set: leaf_sets.filter(|_| node_count > 0).map(average),
        }
    }

    // === Membership ===

    /// Create a detached node named `name`, identified by the hash of its
    /// name. Fails if the name or its identifier is already in use.
    pub fn create_node(&self, name: &str) -> Result<N> {
        let nodes = self.read();
        let id = self.space.node_id(name);

        self.check_unique(&nodes, name, &id)?;

        Ok(N::new(name, id, self.space, &self.config))
    }

    /// Join `node` through a random live node, or start the overlay with it.
    /// Returns the hops the join used.
    pub fn add_node(&self, node: N) -> Result<u32> {
        let mut nodes = self.write();

        self.check_unique(&nodes, node.name(), &node.id())?;

        let bootstrap = self.pick(&nodes);
        let node = Arc::new(node);

        nodes.insert(node.clone());
        let hops = node.join(bootstrap.as_ref(), &nodes);

        info!(
            protocol = N::PROTOCOL,
            node = node.name(),
            id = %node.id(),
            bootstrap = bootstrap.as_ref().map(|b| b.name()),
            hops,
            size = nodes.len(),
            "Node joined"
        );

        Ok(hops)
    }

    /// Create and join a node named `name`.
    pub fn add_named_node(&self, name: &str) -> Result<u32> {
        let node = self.create_node(name)?;

        self.add_node(node)
    }

    /// Gracefully remove the node named `name`. Returns `false` with zero
    /// hops if there is no such node.
    pub fn remove_node(&self, name: &str) -> (bool, u32) {
        let mut nodes = self.write();

        let Some(node) = nodes.by_name(name).cloned() else {
            warn!(node = name, "Cannot remove unknown node");
            return (false, 0);
        };

        let hops = node.leave(&nodes);
        nodes.remove(&node.id());

        info!(
            protocol = N::PROTOCOL,
            node = name,
            hops,
            size = nodes.len(),
            "Node left"
        );

        (true, hops)
    }

    /// Grow the network by `count` nodes named `node_<i>`, joined one at a
    /// time. Returns the hops of each join in order.
    pub fn build_network(&self, count: usize) -> Result<Vec<u32>> {
        let mut per_join = Vec::with_capacity(count);

        while per_join.len() < count {
            if self.is_full() {
                return Err(Error::SpaceExhausted(self.space.bits()));
            }

            let index = self.next_index.fetch_add(1, Ordering::Relaxed);
            let name = format!("node_{index}");

            let joined = self
                .create_node(&name)
                .and_then(|node| self.add_node(node));

            match joined {
                Ok(hops) => per_join.push(hops),
                Err(error) => debug!(name, ?error, "Skipping node name"),
            }
        }

        let total: u64 = per_join.iter().map(|&hops| hops as u64).sum();
        info!(
            protocol = N::PROTOCOL,
            added = count,
            size = self.len(),
            total_hops = total,
            "Network built"
        );

        Ok(per_join)
    }

    /// Drop every node and record without running the leave protocol, and
    /// reset node naming.
    pub fn clear(&self) {
        let mut nodes = self.write();

        for node in nodes.iter() {
            node.deactivate();
        }
        let removed = nodes.len();
        nodes.clear();

        self.next_index.store(0, Ordering::Relaxed);

        info!(protocol = N::PROTOCOL, removed, "Network cleared");
    }

    // === Records ===

    /// Store `value` under `key`, starting from a random node.
    pub fn insert(&self, key: &str, value: N::Value) -> (bool, u32) {
        self.from_start(None, |node, nodes| node.insert(key, value, nodes))
            .unwrap_or_else(|error| {
                error!(key, %error, "Insert failed");
                (false, 0)
            })
    }

    /// Fetch the value under `key`, starting from a random node.
    pub fn lookup(&self, key: &str) -> (Option<N::Value>, u32) {
        self.from_start(None, |node, nodes| node.lookup(key, nodes))
            .unwrap_or_else(|error| {
                error!(key, %error, "Lookup failed");
                (None, 0)
            })
    }

    /// Overwrite an existing `key`, starting from a random node.
    pub fn update(&self, key: &str, value: N::Value) -> (bool, u32) {
        self.from_start(None, |node, nodes| node.update(key, value, nodes))
            .unwrap_or_else(|error| {
                error!(key, %error, "Update failed");
                (false, 0)
            })
    }

    /// Remove `key`, starting from a random node.
    pub fn delete(&self, key: &str) -> (bool, u32) {
        self.from_start(None, |node, nodes| node.delete(key, nodes))
            .unwrap_or_else(|error| {
                error!(key, %error, "Delete failed");
                (false, 0)
            })
    }

    /// [Self::insert] starting from the node named `start`.
    pub fn insert_via(&self, start: &str, key: &str, value: N::Value) -> Result<(bool, u32)> {
        self.from_start(Some(start), |node, nodes| node.insert(key, value, nodes))
    }

    /// [Self::lookup] starting from the node named `start`.
    pub fn lookup_via(&self, start: &str, key: &str) -> Result<(Option<N::Value>, u32)> {
        self.from_start(Some(start), |node, nodes| node.lookup(key, nodes))
    }

    /// [Self::update] starting from the node named `start`.
    pub fn update_via(&self, start: &str, key: &str, value: N::Value) -> Result<(bool, u32)> {
        self.from_start(Some(start), |node, nodes| node.update(key, value, nodes))
    }

    /// [Self::delete] starting from the node named `start`.
    pub fn delete_via(&self, start: &str, key: &str) -> Result<(bool, u32)> {
        self.from_start(Some(start), |node, nodes| node.delete(key, nodes))
    }

    /// Resolve the node responsible for `key` from a random node.
    pub fn locate(&self, key: &str) -> Result<Location> {
        self.locate_from(None, key)
    }

    /// Resolve the node responsible for `key` from the node named `start`.
    pub fn locate_via(&self, start: &str, key: &str) -> Result<Location> {
        self.locate_from(Some(start), key)
    }

    // === Batches ===

    /// Insert every item in order.
    pub fn bulk_insert<I, K>(&self, items: I) -> BatchReport<bool>
    where
        I: IntoIterator<Item = (K, N::Value)>,
        K: Into<String>,
    {
        let results = items
            .into_iter()
            .map(|(key, value)| {
                let key = key.into();
                let (outcome, hops) = self.insert(&key, value);

                KeyOutcome { key, outcome, hops }
            })
            .collect();

        BatchReport::from_results(results)
    }

    /// Look up every key in order.
    pub fn bulk_lookup<I, K>(&self, keys: I) -> BatchReport<Option<N::Value>>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let results = keys
            .into_iter()
            .map(|key| {
                let key = key.into();
                let (outcome, hops) = self.lookup(&key);

                KeyOutcome { key, outcome, hops }
            })
            .collect();

        BatchReport::from_results(results)
    }

    /// Delete every key in order.
    pub fn bulk_delete<I, K>(&self, keys: I) -> BatchReport<bool>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let results = keys
            .into_iter()
            .map(|key| {
                let key = key.into();
                let (outcome, hops) = self.delete(&key);

                KeyOutcome { key, outcome, hops }
            })
            .collect();

        BatchReport::from_results(results)
    }

    /// Look up keys on a pool of `min(keys, max_workers)` workers, where
    /// `max_workers` defaults to [Config::max_workers].
    ///
    /// Each lookup sees the network as of its own start; results keep the
    /// order of `keys`.
    pub fn concurrent_lookup<I, K>(
        &self,
        keys: I,
        max_workers: Option<usize>,
    ) -> BatchReport<Option<N::Value>>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        let workers = max_workers.unwrap_or(self.config.max_workers);

        let results = run_pool(keys, workers, |key| {
            let (outcome, hops) = self.lookup(&key);

            KeyOutcome { key, outcome, hops }
        });

        BatchReport::from_results(results)
    }

    /// Insert items on a pool of `min(items, max_workers)` workers.
    pub fn concurrent_insert<I, K>(&self, items: I, max_workers: Option<usize>) -> BatchReport<bool>
    where
        I: IntoIterator<Item = (K, N::Value)>,
        K: Into<String>,
    {
        let items: Vec<(String, N::Value)> = items
            .into_iter()
            .map(|(key, value)| (key.into(), value))
            .collect();
        let workers = max_workers.unwrap_or(self.config.max_workers);

        let results = run_pool(items, workers, |(key, value)| {
            let (outcome, hops) = self.insert(&key, value);

            KeyOutcome { key, outcome, hops }
        });

        BatchReport::from_results(results)
    }

    // === Private Methods ===

    fn read(&self) -> RwLockReadGuard<'_, Directory<N>> {
        self.nodes.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Directory<N>> {
        self.nodes.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn pick(&self, nodes: &Directory<N>) -> Option<Arc<N>> {
        if nodes.is_empty() {
            return None;
        }

        let index = self
            .rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .gen_range(0..nodes.len());

        nodes.nth(index).cloned()
    }

    fn check_unique(&self, nodes: &Directory<N>, name: &str, id: &Id) -> Result<()> {
        if nodes.contains_name(name) {
            return Err(Error::DuplicateNodeIdentifier(name.to_string()));
        }
        if let Some(existing) = nodes.get(id) {
            return Err(Error::DuplicateNodeIdentifier(format!(
                "{name} hashes to the id of {}",
                existing.name()
            )));
        }

        Ok(())
    }

    fn is_full(&self) -> bool {
        let bits = self.space.bits();

        bits < usize::BITS && self.len() >= 1usize << bits
    }

    /// Run `f` under the read lock from the node named `start`, or a random
    /// one.
    fn from_start<R, F>(&self, start: Option<&str>, f: F) -> Result<R>
    where
        F: FnOnce(&Arc<N>, &Directory<N>) -> R,
    {
        let nodes = self.read();

        let node = match start {
            Some(name) => nodes
                .by_name(name)
                .cloned()
                .ok_or_else(|| Error::UnknownNode(name.to_string()))?,
            None => self.pick(&nodes).ok_or(Error::EmptyNetwork)?,
        };

        Ok(f(&node, &nodes))
    }

    fn locate_from(&self, start: Option<&str>, key: &str) -> Result<Location> {
        let key_id = self.space.key_id(key);

        self.from_start(start, |node, nodes| {
            let mut hops = Hops::new();

            node.find_responsible(&key_id, nodes, &mut hops)
                .and_then(|id| nodes.get(&id))
                .map(|responsible| Location {
                    name: responsible.name().to_string(),
                    id: responsible.id(),
                    hops: hops.count(),
                })
                .ok_or(Error::EmptyNetwork)
        })?
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn small_config() -> Config {
        Config::default().with_seed(7)
    }

    #[test]
    fn empty_network_operations_fail_without_hops() {
        let network = RingNetwork::<u32>::new(small_config()).unwrap();

        assert!(network.is_empty());
        assert_eq!(network.insert("k", 1), (false, 0));
        assert_eq!(network.lookup("k"), (None, 0));
        assert_eq!(network.update("k", 2), (false, 0));
        assert_eq!(network.delete("k"), (false, 0));
        assert_eq!(network.locate("k"), Err(Error::EmptyNetwork));
        assert_eq!(network.remove_node("node_0"), (false, 0));

        let report = network.bulk_lookup(["a", "b"]);
        assert_eq!(report.total_keys(), 2);
        assert_eq!(report.found_count(), 0);
        assert_eq!(report.total_hops, 0);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let network = PrefixNetwork::<u32>::new(small_config()).unwrap();

        network.add_named_node("alpha").unwrap();

        assert!(matches!(
            network.create_node("alpha"),
            Err(Error::DuplicateNodeIdentifier(_))
        ));
        let detached = network.create_node("beta").unwrap();
        network.add_named_node("beta").unwrap();
        assert!(matches!(
            network.add_node(detached),
            Err(Error::DuplicateNodeIdentifier(_))
        ));

        assert_eq!(network.node_names(), vec!["alpha", "beta"]);
    }

    #[test]
    fn build_skips_taken_names_and_clear_resets() {
        let network = RingNetwork::<u32>::new(small_config()).unwrap();

        network.add_named_node("node_1").unwrap();
        let hops = network.build_network(3).unwrap();

        assert_eq!(hops.len(), 3);
        assert_eq!(network.len(), 4);
        assert_eq!(
            network.node_names(),
            vec!["node_0", "node_1", "node_2", "node_3"]
        );

        let order = network.ring_order();
        assert!(order.windows(2).all(|pair| pair[0].1 < pair[1].1));

        network.clear();
        assert!(network.is_empty());

        network.build_network(1).unwrap();
        assert_eq!(network.node_names(), vec!["node_0"]);
    }

    #[test]
    fn tiny_space_is_exhausted() {
        let config = small_config().with_id_bits(2).with_finger_table_size(2);
        let network = RingNetwork::<u32>::new(config).unwrap();

        assert_eq!(network.build_network(4).unwrap().len(), 4);
        assert_eq!(network.build_network(1), Err(Error::SpaceExhausted(2)));
    }

    #[test]
    fn unknown_start_node() {
        let network = RingNetwork::<u32>::new(small_config()).unwrap();
        network.build_network(2).unwrap();

        assert_eq!(
            network.lookup_via("nobody", "k"),
            Err(Error::UnknownNode("nobody".to_string()))
        );
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = Config::default().with_leaf_set_size(3);

        assert!(RingNetwork::<u32>::new(config.clone()).is_ok());
        assert!(matches!(
            PrefixNetwork::<u32>::new(config),
            Err(Error::InvalidConfig(_))
        ));

        let narrow = Config::default().with_id_bits(16);
        assert!(PrefixNetwork::<u32>::new(narrow.clone()).is_ok());
        assert!(matches!(
            RingNetwork::<u32>::new(narrow),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn stats_count_keys() {
        let network = PrefixNetwork::<u32>::new(small_config()).unwrap();
        network.build_network(6).unwrap();

        for i in 0..30 {
            assert!(network.insert(&format!("key-{i}"), i).0);
        }

        let stats = network.stats();
        assert_eq!(stats.protocol, "prefix");
        assert_eq!(stats.node_count, 6);
        assert_eq!(stats.total_keys, 30);
        assert!(stats.min_keys <= stats.max_keys);
        assert_eq!(stats.average_keys, 5.0);
        assert!(stats.average_leaf_set.is_some());
    }
}
