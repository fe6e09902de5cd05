use std::process::{Child, Command};

use tracing::{info, warn};

use crate::cmd::{server, ConnectionArgs, Invocation};
use crate::exit::{io_error, CliResult};
use crate::logging::arg_value;

/// Environment a spawned client must not inherit, since it names the
/// server's devices.
const SERVER_PORT_ENV: [&str; 3] = ["CEREAL_PORT", "CEREAL_RX_PORT", "CEREAL_PEER_PORT"];

/// Run both ends from one invocation: the client as a child process, the
/// server here.
pub fn run(args: &ConnectionArgs, invocation: Invocation) -> CliResult<i32> {
    let mut child = spawn_client(args, invocation)?;
    info!(pid = child.id(), "started client process");

    let result = server::run(args, invocation.format);
    if result.is_err() {
        let _ = child.kill();
    }

    match child.wait() {
        Ok(status) if !status.success() => warn!(%status, "client exited with failure"),
        Ok(_) => {}
        Err(err) => warn!(error = %err, "failed to wait for client"),
    }
    result
}

fn spawn_client(args: &ConnectionArgs, invocation: Invocation) -> CliResult<Child> {
    let exe = std::env::current_exe().map_err(|err| io_error("cannot locate executable", err))?;
    let mut command = Command::new(exe);
    command.args(client_args(args, invocation));
    for key in SERVER_PORT_ENV {
        command.env_remove(key);
    }
    command
        .spawn()
        .map_err(|err| io_error("failed to start client", err))
}

fn client_args(args: &ConnectionArgs, invocation: Invocation) -> Vec<String> {
    let mut out = vec![
        "--format".to_string(),
        arg_value(&invocation.format),
        "--log-format".to_string(),
        arg_value(&invocation.log_format),
        "--log-level".to_string(),
        arg_value(&invocation.log_level),
        "--baud".to_string(),
        args.baud.to_string(),
        "--settle-ms".to_string(),
        args.settle_ms.to_string(),
    ];
    if let Some(port) = &args.peer_port {
        out.push("--port".to_string());
        out.push(port.clone());
    }
    out.push("client".to_string());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{LogFormat, LogLevel};
    use crate::output::OutputFormat;

    fn invocation() -> Invocation {
        Invocation {
            format: OutputFormat::Json,
            log_format: LogFormat::Text,
            log_level: LogLevel::Warn,
        }
    }

    fn args(peer_port: Option<&str>) -> ConnectionArgs {
        ConnectionArgs {
            port: Some("/dev/ttyUSB0".to_string()),
            rx_port: None,
            peer_port: peer_port.map(str::to_string),
            baud: 57_600,
            settle_ms: 100,
        }
    }

    #[test]
    fn client_inherits_line_and_logging_options() {
        let argv = client_args(&args(None), invocation());
        assert_eq!(
            argv,
            [
                "--format",
                "json",
                "--log-format",
                "text",
                "--log-level",
                "warn",
                "--baud",
                "57600",
                "--settle-ms",
                "100",
                "client"
            ]
        );
    }

    #[test]
    fn client_gets_peer_port_not_server_port() {
        let argv = client_args(&args(Some("/dev/ttyUSB1")), invocation());
        let port_at = argv.iter().position(|a| a == "--port").unwrap();
        assert_eq!(argv[port_at + 1], "/dev/ttyUSB1");
        assert!(!argv.iter().any(|a| a == "/dev/ttyUSB0"));
        assert_eq!(argv.last().map(String::as_str), Some("client"));
    }
}
