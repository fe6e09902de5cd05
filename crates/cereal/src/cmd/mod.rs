use std::time::Duration;

use cereal_session::SessionConfig;
use cereal_transport::DEFAULT_BAUD_RATE;
use clap::{Args, Subcommand};

use crate::exit::CliResult;
use crate::logging::{LogFormat, LogLevel};
use crate::output::OutputFormat;

pub mod client;
pub mod server;
pub mod spawn;

/// Which end of the link this process plays.
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Print everything the peer sends until it shuts the session down.
    Server,
    /// Interactive console: send strings, change baud, quit.
    Client,
}

impl Role {
    pub fn name(self) -> &'static str {
        match self {
            Role::Server => "server",
            Role::Client => "client",
        }
    }

    /// Device used when no port is given.
    pub fn default_port(self) -> &'static str {
        if cfg!(windows) {
            match self {
                Role::Server => "COM2",
                Role::Client => "COM3",
            }
        } else {
            match self {
                Role::Server => "/dev/ttyUSB0",
                Role::Client => "/dev/ttyUSB1",
            }
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ConnectionArgs {
    /// Serial device to transmit on. Defaults depend on the role.
    #[arg(long, short = 'p', env = "CEREAL_PORT", global = true)]
    pub port: Option<String>,
    /// Serial device to receive on. Defaults to --port.
    #[arg(long, env = "CEREAL_RX_PORT", global = true)]
    pub rx_port: Option<String>,
    /// Device for the client started when no role is given.
    #[arg(long, env = "CEREAL_PEER_PORT", global = true)]
    pub peer_port: Option<String>,
    /// Initial line speed.
    #[arg(long, env = "CEREAL_BAUD", default_value_t = DEFAULT_BAUD_RATE, global = true)]
    pub baud: u32,
    /// Wait after each port reconfiguration, in milliseconds.
    #[arg(long, value_name = "MS", default_value_t = 1000, global = true)]
    pub settle_ms: u64,
}

impl ConnectionArgs {
    pub fn session_config(&self, role: Role) -> SessionConfig {
        let tx_port = self
            .port
            .clone()
            .unwrap_or_else(|| role.default_port().to_string());
        let rx_port = self.rx_port.clone().unwrap_or_else(|| tx_port.clone());

        let mut config = SessionConfig::new(tx_port, rx_port);
        config.settings.baud_rate = self.baud;
        config.settings.settle_delay = Duration::from_millis(self.settle_ms);
        config
    }
}

/// Process-wide options that a spawned client inherits.
#[derive(Debug, Clone, Copy)]
pub struct Invocation {
    pub format: OutputFormat,
    pub log_format: LogFormat,
    pub log_level: LogLevel,
}

pub fn run(role: Option<Role>, args: ConnectionArgs, invocation: Invocation) -> CliResult<i32> {
    match role {
        Some(Role::Server) => server::run(&args, invocation.format),
        Some(Role::Client) => client::run(&args, invocation.format),
        None => spawn::run(&args, invocation),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> ConnectionArgs {
        ConnectionArgs {
            port: None,
            rx_port: None,
            peer_port: None,
            baud: 9600,
            settle_ms: 250,
        }
    }

    #[test]
    fn session_config_uses_role_default_port() {
        let config = args().session_config(Role::Client);
        assert_eq!(config.tx_port, Role::Client.default_port());
        assert!(config.shares_device());
        assert_eq!(config.settings.baud_rate, 9600);
        assert_eq!(config.settings.settle_delay, Duration::from_millis(250));
    }

    #[test]
    fn session_config_splits_rx_port() {
        let config = ConnectionArgs {
            port: Some("/dev/ttyS0".to_string()),
            rx_port: Some("/dev/ttyS1".to_string()),
            ..args()
        }
        .session_config(Role::Server);
        assert_eq!(config.tx_port, "/dev/ttyS0");
        assert_eq!(config.rx_port, "/dev/ttyS1");
        assert!(!config.shares_device());
    }

    #[test]
    fn roles_default_to_distinct_ports() {
        assert_ne!(Role::Server.default_port(), Role::Client.default_port());
    }
}
