//! Validated server configuration

use quadsum_core::{CoreError, VectorLimits};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::PathBuf;
use std::time::Duration;

/// Immutable settings for one server process
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `user:password` file consulted on every login
    pub credentials_path: PathBuf,
    /// Journal path from the command line; accepted and carried, not written
    pub journal_path: PathBuf,
    /// Error journal (log sink)
    pub log_path: PathBuf,
    pub bind_address: Ipv4Addr,
    /// 0 lets the OS pick a port
    pub port: u16,
    /// Deadline on every receive/send, `None` to block indefinitely
    pub io_timeout: Option<Duration>,
    pub limits: VectorLimits,
    /// Serve connections until shutdown instead of exactly one
    pub keep_serving: bool,
    /// Random per-session salt instead of the fixed constant
    pub fresh_salt: bool,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.bind_address, self.port))
    }
}

/// Accept `0..=65535`; negative and larger values are rejected
pub fn parse_port(port: i32) -> Result<u16, CoreError> {
    u16::try_from(port)
        .map_err(|_| CoreError::Config(format!("port {} is outside 0..=65535", port)))
}

pub fn parse_address(address: &str) -> Result<Ipv4Addr, CoreError> {
    address
        .parse()
        .map_err(|_| CoreError::Config(format!("invalid IPv4 bind address: {}", address)))
}

/// Seconds to an optional deadline; 0 disables it
pub fn io_timeout(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}
