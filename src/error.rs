//! Error types for the mesh control plane.
//!
//! All fallible operations in this crate return [`Result<T>`], which uses
//! the [`Error`] enum for error variants.

/// Errors that can occur while managing the address space or generating config.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File system I/O error outside the store and the rendered config.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error (config or record files).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A Server or Client record failed validation.
    ///
    /// Every failed check is collected so the caller sees all problems at once.
    /// The record is not persisted and no regeneration happens.
    #[error("Invalid input: {}", .0.join("; "))]
    InvalidInput(Vec<String>),

    /// A string could not be parsed as `address/prefix`.
    #[error("Invalid CIDR: {0}")]
    InvalidCidr(String),

    /// A requested Server or Client record does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// Every usable address in the subnet is the network address, the
    /// broadcast/last address, or already reserved.
    #[error("No available address in {0}")]
    AddressExhausted(String),

    /// The record store could not be read or written.
    #[error("Storage error: {0}")]
    Storage(String),

    /// The configuration artifact could not be produced or written.
    ///
    /// The previously written file is left in place when this is returned.
    #[error("Render error: {0}")]
    Render(String),

    /// The system random source failed.
    #[error("Random source error: {0}")]
    Random(String),

    /// Key material is malformed.
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Invalid process configuration.
    ///
    /// Returned by [`Config::validate`](crate::Config::validate).
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The operator-supplied reload command failed.
    #[error("Reload command failed: {0}")]
    Reload(String),
}

/// A specialized Result type for mesh operations.
pub type Result<T> = std::result::Result<T, Error>;
