//! Main Crate Error

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
/// Overlay crate error enum.
pub enum Error {
    /// Routing was attempted on a network with no live nodes.
    #[error("Network has no live nodes")]
    EmptyNetwork,

    /// A node with the same name, or a name hashing to the same [crate::Id],
    /// already exists. Pick another name.
    #[error("Node identifier already in use: {0}")]
    DuplicateNodeIdentifier(String),

    /// Every identifier of the configured space is taken.
    #[error("Identifier space of {0} bits is exhausted")]
    SpaceExhausted(u32),

    /// No live node with this name.
    #[error("Unknown node: {0}")]
    UnknownNode(String),

    /// Indicates that the [crate::Config] violates one of its constraints.
    #[error("Invalid config: {0}")]
    InvalidConfig(&'static str),

    /// Id bytes were not exactly [crate::ID_SIZE] long.
    #[error("Invalid Id size, expected 20, got {0}")]
    InvalidIdSize(usize),

    /// Id string is not 40 hex characters.
    #[error("Invalid Id encoding: {0}")]
    InvalidIdEncoding(String),
}

/// Alias for `Result<T, overlay::Error>`.
pub type Result<T, E = Error> = std::result::Result<T, E>;
