//! Error types for quadsum-core

use thiserror::Error;

/// Core error type
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("peer closed connection after {received} of {expected} bytes")]
    PeerClosed { received: usize, expected: usize },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Vector count too large: {count} (max: {max})")]
    VectorCountTooLarge { count: u32, max: u32 },

    #[error("Vector too long: {len} elements (max: {max})")]
    VectorTooLong { len: u32, max: u32 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,
}

impl CoreError {
    /// True for failures of the underlying stream (closed, reset, timed out),
    /// as opposed to a peer that spoke the protocol wrongly.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            CoreError::Io(_) | CoreError::Timeout(_) | CoreError::PeerClosed { .. }
        )
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, CoreError>;
