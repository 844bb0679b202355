//! Prefix routing: every node keeps a routing table indexed by shared digit
//! prefix and a leaf set of its numerically nearest neighbours, and owns the
//! keys numerically closest to its Id.

mod leaf_set;
mod node;
mod routing_table;

pub use leaf_set::LeafSet;
pub use node::PrefixNode;
pub use routing_table::RoutingTable;
