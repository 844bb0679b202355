//! Behaviour shared by both protocols, checked through the public API
//! against an independent responsibility rule.
//!
//! Run with: cargo test --test protocols

use std::collections::BTreeMap;

use overlay::{Config, Id, IdSpace, Network, PrefixNetwork, RingNetwork, RoutingNode};

type Value = String;

fn config(seed: u64) -> Config {
    Config::default().with_seed(seed)
}

/// Smallest live Id at or after `key`, wrapping.
fn ring_owner(ids: &[Id], key: &Id) -> Id {
    ids.iter()
        .copied()
        .filter(|id| id >= key)
        .min()
        .or_else(|| ids.iter().copied().min())
        .unwrap()
}

/// Numerically closest live Id, ties to the smaller one.
fn prefix_owner(space: &IdSpace, ids: &[Id], key: &Id) -> Id {
    ids.iter()
        .copied()
        .min_by(|a, b| space.cmp_closeness(key, a, b))
        .unwrap()
}

fn owner<N: RoutingNode>(network: &Network<N>, key: &str) -> Id {
    let ids: Vec<Id> = network.ring_order().into_iter().map(|(_, id)| id).collect();
    let key = network.space().key_id(key);

    match N::PROTOCOL {
        "ring" => ring_owner(&ids, &key),
        _ => prefix_owner(network.space(), &ids, &key),
    }
}

/// A live node that is not responsible for `key`.
fn other_start<N: RoutingNode>(network: &Network<N>, key: &str) -> String {
    let responsible = owner(network, key);

    network
        .ring_order()
        .into_iter()
        .find(|(_, id)| *id != responsible)
        .map(|(name, _)| name)
        .unwrap()
}

fn keys(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("key-{i}")).collect()
}

fn responsibility_invariant<N: RoutingNode<Value = Value>>(network: Network<N>) {
    network.build_network(40).unwrap();

    for key in keys(150) {
        assert!(network.insert(&key, format!("value of {key}")).0);
    }

    for key in keys(150) {
        let location = network.locate(&key).unwrap();
        assert_eq!(location.id, owner(&network, &key), "{key}");

        let node = network.node(&location.name).unwrap();
        let key_id = network.space().key_id(&key);
        assert!(node.lock_store().contains(&key_id), "{key} stored at {}", location.name);

        assert_eq!(network.lookup(&key).0, Some(format!("value of {key}")));
    }

    assert_eq!(network.stats().total_keys, 150);
}

fn round_trip<N: RoutingNode<Value = Value>>(network: Network<N>) {
    network.build_network(20).unwrap();

    for key in keys(20) {
        let start = other_start(&network, &key);

        let (stored, hops) = network.insert_via(&start, &key, "v1".into()).unwrap();
        assert!(stored);
        assert!(hops >= 1);

        let (value, hops) = network.lookup_via(&start, &key).unwrap();
        assert_eq!(value.as_deref(), Some("v1"));
        assert!(hops >= 1);

        let (updated, _) = network.update_via(&start, &key, "v2".into()).unwrap();
        assert!(updated);
        assert_eq!(network.lookup(&key).0.as_deref(), Some("v2"));

        let (deleted, hops) = network.delete_via(&start, &key).unwrap();
        assert!(deleted);
        assert!(hops >= 1);

        let (value, hops) = network.lookup_via(&start, &key).unwrap();
        assert_eq!(value, None);
        assert!(hops >= 1);

        assert!(!network.update(&key, "v3".into()).0);
        assert!(!network.delete(&key).0);
    }
}

fn deterministic_hops<N: RoutingNode<Value = Value>>(network: Network<N>) {
    network.build_network(30).unwrap();
    network.insert("stable", "x".into());

    for start in network.node_names() {
        let (_, first) = network.lookup_via(&start, "stable").unwrap();
        let (_, second) = network.lookup_via(&start, "stable").unwrap();

        assert_eq!(first, second, "from {start}");
    }
}

fn membership_closure<N: RoutingNode<Value = Value>>(network: Network<N>) {
    network.build_network(25).unwrap();
    for key in keys(100) {
        network.insert(&key, key.clone());
    }

    let snapshot = |network: &Network<N>| -> BTreeMap<String, String> {
        keys(100)
            .into_iter()
            .map(|key| {
                let location = network.locate(&key).unwrap();
                (key, location.name)
            })
            .collect()
    };

    let names_before = network.node_names();
    let owners_before = snapshot(&network);

    network.add_named_node("visitor").unwrap();
    let (removed, _) = network.remove_node("visitor");
    assert!(removed);

    assert_eq!(network.node_names(), names_before);
    assert_eq!(snapshot(&network), owners_before);

    for key in keys(100) {
        assert_eq!(network.lookup(&key).0, Some(key.clone()));
    }
}

fn churn_keeps_records<N: RoutingNode<Value = Value>>(network: Network<N>) {
    network.build_network(30).unwrap();
    for key in keys(200) {
        network.insert(&key, key.clone());
    }

    for i in (0..30).step_by(3) {
        let (removed, _) = network.remove_node(&format!("node_{i}"));
        assert!(removed);
    }
    for i in 0..5 {
        network.add_named_node(&format!("late_{i}")).unwrap();
    }

    assert_eq!(network.len(), 25);
    assert_eq!(network.stats().total_keys, 200);

    for key in keys(200) {
        assert_eq!(network.locate(&key).unwrap().id, owner(&network, &key));
        assert_eq!(network.lookup(&key).0, Some(key.clone()), "{key}");
    }
}

fn batches<N: RoutingNode<Value = Value>>(network: Network<N>) {
    network.build_network(16).unwrap();

    let items: Vec<(String, Value)> = keys(300).into_iter().map(|k| (k.clone(), k)).collect();

    let inserted = network.concurrent_insert(items, Some(8));
    assert_eq!(inserted.total_keys(), 300);
    assert_eq!(inserted.success_count(), 300);

    let found = network.concurrent_lookup(keys(300), None);
    assert_eq!(found.found_count(), 300);
    for (outcome, key) in found.iter().zip(keys(300)) {
        assert_eq!(outcome.key, key);
        assert_eq!(outcome.outcome.as_deref(), Some(key.as_str()));
    }
    assert!(found.average_hops() > 0.0);

    let deleted = network.bulk_delete(keys(100));
    assert_eq!(deleted.success_count(), 100);

    let after = network.bulk_lookup(keys(300));
    assert_eq!(after.found_count(), 200);
    assert_eq!(after.not_found_count(), 100);
    assert_eq!(
        after.total_hops,
        after.iter().map(|r| r.hops as u64).sum::<u64>()
    );

    let reinserted = network.bulk_insert(keys(10).into_iter().map(|k| (k, "again".to_string())));
    assert_eq!(reinserted.success_count(), 10);
}

fn clear_resets<N: RoutingNode<Value = Value>>(network: Network<N>) {
    network.build_network(5).unwrap();
    network.insert("k", "v".into());

    network.clear();

    assert!(network.is_empty());
    assert_eq!(network.stats().total_keys, 0);
    assert_eq!(network.lookup("k"), (None, 0));

    network.build_network(2).unwrap();
    assert_eq!(network.node_names(), vec!["node_0", "node_1"]);
    assert_eq!(network.lookup("k").0, None);
}

macro_rules! protocol_tests {
    ($module:ident, $network:ty) => {
        mod $module {
            use super::*;

            #[test]
            fn responsibility_invariant() {
                super::responsibility_invariant(<$network>::new(config(1)).unwrap());
            }

            #[test]
            fn round_trip() {
                super::round_trip(<$network>::new(config(2)).unwrap());
            }

            #[test]
            fn deterministic_hops() {
                super::deterministic_hops(<$network>::new(config(3)).unwrap());
            }

            #[test]
            fn membership_closure() {
                super::membership_closure(<$network>::new(config(4)).unwrap());
            }

            #[test]
            fn churn_keeps_records() {
                super::churn_keeps_records(<$network>::new(config(5)).unwrap());
            }

            #[test]
            fn batches() {
                super::batches(<$network>::new(config(6)).unwrap());
            }

            #[test]
            fn clear_resets() {
                super::clear_resets(<$network>::new(config(7)).unwrap());
            }
        }
    };
}

protocol_tests!(ring, RingNetwork<Value>);
protocol_tests!(prefix, PrefixNetwork<Value>);
