use std::time::Duration;

use cereal_frame::ReaderConfig;
use cereal_transport::PortSettings;
use serde::{Deserialize, Serialize};

/// Pause between sending a baud change and reconfiguring the local ports,
/// giving the frame time to leave at the old speed.
pub const DEFAULT_BAUD_SWITCH_PAUSE: Duration = Duration::from_millis(200);

/// Everything a [`crate::ConnectionManager`] needs to bring up a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Device frames are written to.
    pub tx_port: String,
    /// Device frames are read from. Equal to `tx_port` for a single device.
    pub rx_port: String,
    /// Line settings applied to both ports on connect.
    pub settings: PortSettings,
    pub baud_switch_pause: Duration,
    #[serde(skip)]
    pub reader: ReaderConfig,
}

impl SessionConfig {
    pub fn new(tx_port: impl Into<String>, rx_port: impl Into<String>) -> Self {
        Self {
            tx_port: tx_port.into(),
            rx_port: rx_port.into(),
            ..Self::default()
        }
    }

    /// Send and receive over one device.
    pub fn single(port: impl Into<String>) -> Self {
        let port = port.into();
        Self::new(port.clone(), port)
    }

    /// Whether both directions use the same device.
    pub fn shares_device(&self) -> bool {
        self.tx_port == self.rx_port
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tx_port: String::new(),
            rx_port: String::new(),
            settings: PortSettings::default(),
            baud_switch_pause: DEFAULT_BAUD_SWITCH_PAUSE,
            reader: ReaderConfig::default(),
        }
    }
}
