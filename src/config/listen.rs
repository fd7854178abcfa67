//! WebSocket listener configuration.

use serde::Deserialize;
use std::net::SocketAddr;

#[derive(Debug, Clone, Deserialize)]
pub struct ListenConfig {
    /// Address to bind to (e.g., "0.0.0.0:8088").
    #[serde(default = "default_address")]
    pub address: SocketAddr,
    /// Allowed `Origin` header values. Empty allows every origin.
    #[serde(default)]
    pub allow_origins: Vec<String>,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            allow_origins: Vec::new(),
        }
    }
}

fn default_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8088))
}
