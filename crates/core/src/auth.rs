//! Challenge and digest primitives for the login handshake
//!
//! The server sends a challenge (the salt), the client answers with
//! `hex(SHA-224(salt || secret))`. Both ends must use [`digest`] so the
//! algorithm and hex rendering agree.
//!
//! ## Security Notes
//!
//! - **Fixed salt**: [`Challenge::fixed`] is the same for every session, so a
//!   captured answer can be replayed. [`Challenge::fresh`] avoids that at the
//!   cost of a protocol change on the server side only.
//! - **Comparison**: [`Challenge::verify`] compares byte for byte; it is not
//!   constant time.

use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha224};

/// Salt sent to every client unless fresh challenges are enabled
pub const FIXED_SALT: &str = "HASHHASHHASHHASH";

/// Length of a hex-encoded SHA-224 digest
pub const DIGEST_HEX_LEN: usize = 56;

/// Compute `hex(SHA-224(salt || secret))` in lowercase
///
/// # Example
/// ```
/// # use quadsum_core::auth::digest;
/// let hex = digest(b"HASHHASHHASHHASH", b"secret123");
/// assert_eq!(hex.len(), 56);
/// ```
pub fn digest(salt: &[u8], secret: &[u8]) -> String {
    let mut hasher = Sha224::new();
    hasher.update(salt);
    hasher.update(secret);
    to_hex(&hasher.finalize())
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Challenge sent to the client after its login is accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge(String);

impl Challenge {
    /// The well-known constant salt
    pub fn fixed() -> Self {
        Self(FIXED_SALT.to_string())
    }

    /// Random 16-character alphanumeric salt, same length as the fixed one
    pub fn fresh() -> Self {
        let salt = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(FIXED_SALT.len())
            .map(char::from)
            .collect();
        Self(salt)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Expected answer for `secret`
    pub fn expected_answer(&self, secret: &[u8]) -> String {
        digest(self.as_bytes(), secret)
    }

    /// Check a client's answer against the stored secret
    pub fn verify(&self, secret: &[u8], answer: &[u8]) -> bool {
        self.expected_answer(secret).as_bytes() == answer
    }
}
