#![doc = include_str!("../README.md")]

// Public modules
mod common;
mod config;
mod error;
pub mod network;
pub mod prefix;
pub mod ring;

pub use crate::common::{Hops, Id, IdSpace, Message, Record, Store, ID_BITS, ID_SIZE};
pub use config::{Config, FallbackPolicy};
pub use error::{Error, Result};
pub use network::{
    BatchReport, Directory, KeyOutcome, Location, Network, NetworkStats, PrefixNetwork,
    RingNetwork, RoutingNode,
};
pub use prefix::PrefixNode;
pub use ring::RingNode;

pub mod defaults {
    pub use super::config::{
        DEFAULT_FINGER_TABLE_SIZE, DEFAULT_LEAF_SET_SIZE, DEFAULT_MAX_WORKERS,
        DEFAULT_ROUTING_TABLE_ROWS,
    };
    pub use super::common::{DIGIT_BASE, DIGIT_BITS};
}
