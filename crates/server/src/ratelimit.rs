//! Per-address connection quota
//!
//! A keyed `governor` limiter caps how often one address may open a
//! connection. Over-quota connections are dropped before the handshake; a
//! rejected login has no effect on later connections.

use governor::{clock::DefaultClock, state::keyed::DefaultKeyedStateStore, Quota, RateLimiter};
use nonzero_ext::nonzero;
use quadsum_core::CoreError;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

/// Connections accepted per address per minute
const CONNECTS_PER_MINUTE: u32 = 30;

/// How often idle per-address buckets are dropped
pub const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

type ConnectLimiter = RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>;

/// Shared by the accept loop and every connection task
#[derive(Clone)]
pub struct ConnectionQuota {
    connects: Arc<ConnectLimiter>,
}

impl ConnectionQuota {
    pub fn new() -> Self {
        Self {
            connects: Arc::new(RateLimiter::keyed(Quota::per_minute(nonzero!(
                CONNECTS_PER_MINUTE
            )))),
        }
    }

    /// Decide whether a connection from `ip` may start a handshake
    pub fn admit(&self, ip: IpAddr) -> Result<(), CoreError> {
        if self.connects.check_key(&ip).is_err() {
            tracing::warn!("Connection rate from {} over {}/min", ip, CONNECTS_PER_MINUTE);
            return Err(CoreError::RateLimitExceeded);
        }
        Ok(())
    }

    /// Forget addresses whose bucket has fully refilled
    pub fn prune(&self) {
        self.connects.retain_recent();
        self.connects.shrink_to_fit();
        tracing::trace!("{} addresses tracked after prune", self.connects.len());
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.connects.len()
    }
}

impl Default for ConnectionQuota {
    fn default() -> Self {
        Self::new()
    }
}
