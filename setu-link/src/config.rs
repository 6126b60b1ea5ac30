//! Configuration for the SetuLink endpoints
//!
//! Loads configuration from a TOML file with the parameters both roles need:
//! addresses, timeouts, delivery tuning and the robot's initial settings.

use crate::error::Result;
use crate::settings::Settings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Top-level link configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LinkConfig {
    pub network: NetworkConfig,
    pub delivery: DeliveryConfig,
    /// Initial server-authoritative settings (robot role only)
    #[serde(default)]
    pub settings: Settings,
}

/// Network configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NetworkConfig {
    /// TCP bind address for the robot role
    ///
    /// Examples:
    /// - `0.0.0.0:7345` - Bind to all interfaces
    /// - `127.0.0.1:7345` - Localhost only
    pub bind_address: String,

    /// Robot address the operator role connects to (`host:port`)
    pub server_address: String,

    /// Per-connection read timeout in seconds
    ///
    /// A silently dead peer fails the inbound loop after this long instead of
    /// hanging forever.
    pub read_timeout_secs: u64,

    /// Connection attempt timeout in seconds (operator role)
    pub connect_timeout_secs: u64,

    /// Delay between reconnection attempts in seconds (operator role)
    pub reconnect_backoff_secs: u64,
}

/// Delivery tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeliveryConfig {
    /// Capacity of the droppable send lane; when full, the oldest entries are
    /// evicted so fresh video frames replace stale ones
    pub droppable_queue_limit: usize,
}

impl LinkConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: LinkConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Default configuration for the Setu rover
    ///
    /// Suitable for testing and development; deployments should use a proper
    /// TOML configuration file.
    pub fn rover_defaults() -> Self {
        Self {
            network: NetworkConfig {
                bind_address: "0.0.0.0:7345".to_string(),
                server_address: "192.168.4.1:7345".to_string(),
                read_timeout_secs: 5,
                connect_timeout_secs: 5,
                reconnect_backoff_secs: 10,
            },
            delivery: DeliveryConfig {
                droppable_queue_limit: 10,
            },
            settings: Settings::default(),
        }
    }

    /// Read timeout as a [`Duration`]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.network.read_timeout_secs)
    }

    /// Connect timeout as a [`Duration`]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.network.connect_timeout_secs)
    }

    /// Reconnect backoff as a [`Duration`]
    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_secs(self.network.reconnect_backoff_secs)
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self::rover_defaults()
    }
}
