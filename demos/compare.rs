//! Builds a ring network and a prefix network of the same size, runs the same
//! workload through both and prints hop histograms side by side.
//!
//! Run: `cargo run --example compare -- --nodes 64 --keys 500`

use clap::{Parser, ValueEnum};
use histo::Histogram;
use overlay::{Config, FallbackPolicy, Network, PrefixNetwork, RingNetwork, RoutingNode};
use tracing::Level;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Fallback {
    Prefix,
    Distance,
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Number of nodes in each network
    #[arg(short, long, default_value_t = 64)]
    nodes: usize,
    /// Number of keys to insert and look up
    #[arg(short, long, default_value_t = 500)]
    keys: usize,
    /// Nodes removed after the first lookup round
    #[arg(short, long, default_value_t = 8)]
    remove: usize,
    /// Concurrent workers for the batch phases
    #[arg(short, long, default_value_t = 8)]
    workers: usize,
    /// Seed for start node selection
    #[arg(long, default_value_t = 42)]
    seed: u64,
    /// Prefix routing fallback when a routing table cell is empty
    #[arg(long, value_enum, default_value_t = Fallback::Prefix)]
    fallback: Fallback,
    /// Log every join and leave
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::INFO } else { Level::WARN };
    tracing_subscriber::fmt().with_max_level(level).init();

    let fallback = match cli.fallback {
        Fallback::Prefix => FallbackPolicy::PrefixThenDistance,
        Fallback::Distance => FallbackPolicy::Distance,
    };
    let config = Config::default()
        .with_seed(cli.seed)
        .with_max_workers(cli.workers)
        .with_fallback(fallback);

    let ring = RingNetwork::<String>::new(config.clone()).expect("invalid ring config");
    run("ring", &ring, &cli);

    let prefix = PrefixNetwork::<String>::new(config).expect("invalid prefix config");
    run("prefix", &prefix, &cli);
}

fn run<N: RoutingNode<Value = String>>(label: &str, network: &Network<N>, cli: &Cli) {
    println!("\n=== {label} ({} nodes) ===", cli.nodes);

    let joins = network
        .build_network(cli.nodes)
        .expect("identifier space exhausted");
    print_histogram("join hops", joins.iter().map(|&h| h as u64));

    let keys: Vec<String> = (0..cli.keys).map(|i| format!("key-{i}")).collect();
    let items = keys.iter().map(|key| (key.clone(), format!("value of {key}")));

    let inserted = network.concurrent_insert(items, None);
    println!(
        "\ninserted {}/{} keys, {:.2} hops on average",
        inserted.success_count(),
        inserted.total_keys(),
        inserted.average_hops()
    );

    let found = network.concurrent_lookup(keys.clone(), None);
    println!(
        "found {}/{} keys, {:.2} hops on average",
        found.found_count(),
        found.total_keys(),
        found.average_hops()
    );
    print_histogram("lookup hops", found.iter().map(|r| r.hops as u64));

    let mut leaves = Vec::new();
    for name in network.node_names().into_iter().take(cli.remove) {
        let (removed, hops) = network.remove_node(&name);
        if removed {
            leaves.push(hops as u64);
        }
    }
    if !leaves.is_empty() {
        print_histogram("leave hops", leaves.into_iter());
    }

    let after = network.bulk_lookup(keys);
    println!(
        "\nafter {} leaves: found {}/{} keys, {:.2} hops on average",
        cli.remove,
        after.found_count(),
        after.total_keys(),
        after.average_hops()
    );

    let stats = network.stats();
    println!(
        "keys per node: min {} max {} avg {:.1}, routing entries avg {:.1}",
        stats.min_keys, stats.max_keys, stats.average_keys, stats.average_routing_entries
    );
    if let Some(leaf_set) = stats.average_leaf_set {
        println!("leaf set avg {leaf_set:.1}");
    }
}

fn print_histogram(title: &str, samples: impl Iterator<Item = u64>) {
    let mut histogram = Histogram::with_buckets(10);
    for sample in samples {
        histogram.add(sample);
    }

    println!("\n{title}:\n{histogram}");
}
