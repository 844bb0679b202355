use crate::common::{IdSpace, DIGIT_BITS, ID_BITS};
use crate::{Error, Result};

/// Default number of fingers, one per identifier bit.
pub const DEFAULT_FINGER_TABLE_SIZE: usize = ID_BITS as usize;
/// Default prefix routing table rows, enough for 16^5 nodes.
pub const DEFAULT_ROUTING_TABLE_ROWS: usize = 5;
/// Default leaf set size, L/2 on each side.
pub const DEFAULT_LEAF_SET_SIZE: usize = 8;
/// Default upper bound on concurrent batch workers.
pub const DEFAULT_MAX_WORKERS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// How the prefix protocol picks a next hop when the routing table cell for
/// the key's next digit is empty.
pub enum FallbackPolicy {
    /// Longest shared prefix with the key, ties broken by numeric closeness.
    #[default]
    PrefixThenDistance,
    /// Numerically closest node among those sharing at least as long a
    /// prefix as the current node.
    Distance,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Network configuration
pub struct Config {
    /// Width of the identifier space in bits.
    ///
    /// Defaults to `160`, the width of a SHA-1 digest.
    pub id_bits: u32,
    /// Number of entries in each ring finger table.
    ///
    /// Defaults to [DEFAULT_FINGER_TABLE_SIZE]
    pub finger_table_size: usize,
    /// Number of rows in each prefix routing table.
    ///
    /// Defaults to [DEFAULT_ROUTING_TABLE_ROWS]
    pub routing_table_rows: usize,
    /// Total leaf set size L, split evenly below and above the node.
    ///
    /// Defaults to [DEFAULT_LEAF_SET_SIZE]
    pub leaf_set_size: usize,
    /// Next hop selection when a prefix routing table cell is empty.
    pub fallback: FallbackPolicy,
    /// Upper bound on workers for concurrent batches.
    ///
    /// Defaults to [DEFAULT_MAX_WORKERS]
    pub max_workers: usize,
    /// Seed for choosing random start and bootstrap nodes.
    ///
    /// Defaults to None, seeding from entropy.
    pub seed: Option<u64>,
}

impl Config {
    // === Options ===

    pub fn with_id_bits(mut self, id_bits: u32) -> Self {
        self.id_bits = id_bits;
        self
    }

    pub fn with_finger_table_size(mut self, size: usize) -> Self {
        self.finger_table_size = size;
        self
    }

    pub fn with_routing_table_rows(mut self, rows: usize) -> Self {
        self.routing_table_rows = rows;
        self
    }

    pub fn with_leaf_set_size(mut self, size: usize) -> Self {
        self.leaf_set_size = size;
        self
    }

    pub fn with_fallback(mut self, fallback: FallbackPolicy) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    // === Public Methods ===

    /// The identifier space this config describes.
    pub fn space(&self) -> Result<IdSpace> {
        IdSpace::new(self.id_bits)
    }

    /// Check the constraints shared by both protocols.
    pub fn validate(&self) -> Result<()> {
        self.space()?;

        if self.max_workers == 0 {
            return Err(Error::InvalidConfig("max_workers must be at least 1"));
        }

        Ok(())
    }

    /// Check the extra constraints of the ring protocol.
    pub fn validate_ring(&self) -> Result<()> {
        self.validate()?;

        if self.finger_table_size == 0 || self.finger_table_size > self.id_bits as usize {
            return Err(Error::InvalidConfig(
                "finger_table_size must be within 1..=id_bits",
            ));
        }

        Ok(())
    }

    /// Check the extra constraints of the prefix protocol.
    pub fn validate_prefix(&self) -> Result<()> {
        self.validate()?;

        if self.id_bits % DIGIT_BITS != 0 {
            return Err(Error::InvalidConfig(
                "id_bits must be a multiple of 4 for prefix routing",
            ));
        }
        let digits = (self.id_bits / DIGIT_BITS) as usize;
        if self.routing_table_rows == 0 || self.routing_table_rows > digits {
            return Err(Error::InvalidConfig(
                "routing_table_rows must be within 1..=id_bits/4",
            ));
        }
        if self.leaf_set_size < 2 || self.leaf_set_size % 2 != 0 {
            return Err(Error::InvalidConfig(
                "leaf_set_size must be even and at least 2",
            ));
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            id_bits: ID_BITS,
            finger_table_size: DEFAULT_FINGER_TABLE_SIZE,
            routing_table_rows: DEFAULT_ROUTING_TABLE_ROWS,
            leaf_set_size: DEFAULT_LEAF_SET_SIZE,
            fallback: FallbackPolicy::default(),
            max_workers: DEFAULT_MAX_WORKERS,
            seed: None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_is_valid() {
        let config = Config::default();

        assert!(config.validate_ring().is_ok());
        assert!(config.validate_prefix().is_ok());
        assert_eq!(config.space().unwrap().bits(), 160);
    }

    #[test]
    fn rejects_bad_values() {
        let config = Config::default().with_id_bits(16);
        assert!(config.validate_ring().is_err(), "finger table wider than ids");
        assert!(config.validate_prefix().is_ok(), "fingers are ring only");

        let config = config.with_finger_table_size(16);
        assert!(config.validate_ring().is_ok());

        assert!(Config::default().with_leaf_set_size(7).validate_prefix().is_err());
        assert!(Config::default().with_max_workers(0).validate().is_err());
        assert!(Config::default()
            .with_routing_table_rows(41)
            .validate_prefix()
            .is_err());

        let odd_bits = Config::default().with_id_bits(13).with_finger_table_size(13);
        assert!(odd_bits.validate_ring().is_ok());
        assert!(odd_bits.validate_prefix().is_err());
    }
}
