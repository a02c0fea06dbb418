//! Wire protocol: handshake tokens, vector framing and limits
//!
//! ## Wire format
//!
//! Handshake messages are raw, unframed byte strings, each expected to arrive
//! in a single receive of at most [`MESSAGE_BUFFER_SIZE`] - 1 bytes.
//!
//! After `OK` the client streams a batch:
//! `[count: u32] ([len: u32] [len x i32])*` and the server answers every
//! vector with one `i32`. All integers are little-endian.

pub mod codec;
pub mod framing;

pub use codec::VectorCodec;
pub use framing::FramedStream;

use crate::error::{CoreError, Result};

/// Reply to a login that has no credential record
pub const USER_NOT_FOUND: &[u8] = b"ERR_USER_NOT_FOUND";

/// Reply to a correct digest
pub const AUTH_OK: &[u8] = b"OK";

/// Reply to a wrong digest
pub const AUTH_ERR: &[u8] = b"ERR";

/// Receive buffer for handshake messages; one byte is kept free so a
/// message never fills it completely
pub const MESSAGE_BUFFER_SIZE: usize = 1024;

/// Default cap on the declared number of vectors in a batch
pub const DEFAULT_MAX_VECTORS: u32 = 1 << 20;

/// Default cap on the declared number of elements in one vector
pub const DEFAULT_MAX_VECTOR_LEN: u32 = 1 << 24;

/// Upper bounds applied to peer-declared counts before reading further
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorLimits {
    pub max_vectors: u32,
    pub max_vector_len: u32,
}

impl Default for VectorLimits {
    fn default() -> Self {
        Self {
            max_vectors: DEFAULT_MAX_VECTORS,
            max_vector_len: DEFAULT_MAX_VECTOR_LEN,
        }
    }
}

impl VectorLimits {
    pub fn check_count(&self, count: u32) -> Result<u32> {
        if count > self.max_vectors {
            return Err(CoreError::VectorCountTooLarge {
                count,
                max: self.max_vectors,
            });
        }
        Ok(count)
    }

    pub fn check_len(&self, len: u32) -> Result<u32> {
        if len > self.max_vector_len {
            return Err(CoreError::VectorTooLong {
                len,
                max: self.max_vector_len,
            });
        }
        Ok(len)
    }
}
