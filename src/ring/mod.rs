//! Ring routing: every node keeps a successor, a predecessor and a finger
//! table of `m` shortcuts, and owns the keys between its predecessor and
//! itself.

mod finger_table;
mod node;

pub use finger_table::FingerTable;
pub use node::RingNode;
