//! Quadsum Core - Shared protocol logic for the sum-of-squares service
//!
//! This crate provides:
//! - Challenge and digest primitives for the login handshake
//! - Deadline-bounded framing over async byte streams
//! - Vector batch encoding and wire limits
//! - The streaming sum-of-squares accumulator
//! - A protocol client
//! - Error types

pub mod auth;
pub mod client;
pub mod compute;
pub mod error;
pub mod protocol;

// Re-export common types
pub use auth::{digest, Challenge, FIXED_SALT};
pub use client::{ComputeClient, LoginOutcome};
pub use compute::{sum_of_squares, SquareSum};
pub use error::{CoreError, Result};
pub use protocol::{FramedStream, VectorCodec, VectorLimits};
