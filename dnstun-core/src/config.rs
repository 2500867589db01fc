//! Tunnel configuration shared by the library and the binary.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

fn default_tun_device_name() -> String {
    "dnstun0".to_string()
}

fn default_tun_mtu() -> usize {
    1420
}

fn default_peer_retry_interval() -> Duration {
    Duration::from_millis(50)
}

/// Which side initiates the connection.
///
/// A client connects to its peer at startup; a server binds and learns its
/// peer from the first received datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Server,
    Client,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Server => write!(f, "server"),
            Mode::Client => write!(f, "client"),
        }
    }
}

impl FromStr for Mode {
    type Err = BadMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "server" => Ok(Mode::Server),
            "client" => Ok(Mode::Client),
            other => Err(BadMode(other.to_string())),
        }
    }
}

/// Error for an unrecognized mode string.
#[derive(Debug, thiserror::Error)]
#[error("unknown mode '{0}' (expected 'server' or 'client')")]
pub struct BadMode(String);

/// Configuration for one tunnel endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelConfig {
    /// Server or client.
    pub mode: Mode,

    /// Bind address (server) or peer address (client), textual IPv4.
    pub address: String,

    /// UDP port to bind to (server) or connect to (client).
    pub port: u16,

    /// Name for the local TUN device.
    #[serde(default = "default_tun_device_name")]
    pub tun_device_name: String,

    /// MTU for the local TUN device.
    #[serde(default = "default_tun_mtu")]
    pub tun_mtu: usize,

    /// Fragmentation part size; 0 means the wire format's maximum payload.
    #[serde(default)]
    pub part_size: usize,

    /// How long the uplink waits between peer checks before a peer is known.
    #[serde(default = "default_peer_retry_interval", with = "humantime_serde")]
    pub peer_retry_interval: Duration,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Server,
            address: "0.0.0.0".to_string(),
            port: 53,
            tun_device_name: default_tun_device_name(),
            tun_mtu: default_tun_mtu(),
            part_size: 0,
            peer_retry_interval: default_peer_retry_interval(),
        }
    }
}
