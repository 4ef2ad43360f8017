//! Centralized configuration for dRPC.
//!
//! This module provides the protocol constants shared by clients and servers
//! and the naming convention for sockets in the socket directory.

use std::time::Duration;

/// Protocol-level configuration.
pub struct DrpcConfig;

impl DrpcConfig {
    /// Largest message that may be sent or received in one datagram.
    ///
    /// Packet sockets deliver a whole message per read without announcing
    /// its size, so receive buffers are preallocated to this bound.
    pub const MAX_MSG_SIZE: usize = 16384;

    /// Each module reserves this many method IDs, starting at `id * offset`.
    pub const MODULE_METHOD_OFFSET: i32 = 100;

    /// Backoff used by retryable requests that don't set their own interval.
    pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_millis(250);

    /// Mode applied to the server socket after bind.
    pub const SOCKET_PERMISSIONS: u32 = 0o777;

    /// Sequence reported in responses to calls that could not be decoded.
    pub const UNKNOWN_SEQUENCE: i64 = -1;
}

/// Socket file naming inside the socket directory.
pub struct SocketConfig;

impl SocketConfig {
    pub const SERVER_SOCKET_NAME: &'static str = "daos_server.sock";
    pub const ENGINE_SOCKET_PREFIX: &'static str = "daos_engine";
    pub const SOCKET_SUFFIX: &'static str = ".sock";
    pub const DEFAULT_SOCKET_DIR: &'static str = "/var/run/daos_server";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_message_fits_module_ranges() {
        assert_eq!(DrpcConfig::MAX_MSG_SIZE, 16 * 1024);
        assert!(DrpcConfig::MODULE_METHOD_OFFSET > 0);
    }

    #[test]
    fn test_server_socket_matches_suffix() {
        assert!(SocketConfig::SERVER_SOCKET_NAME.ends_with(SocketConfig::SOCKET_SUFFIX));
        assert!(!SocketConfig::SERVER_SOCKET_NAME.starts_with(SocketConfig::ENGINE_SOCKET_PREFIX));
    }
}
