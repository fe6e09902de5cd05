use std::io::{self, BufRead};
use std::thread;

use cereal_session::ConnectionManager;
use tracing::{info, warn};

use crate::cmd::{ConnectionArgs, Role};
use crate::exit::{io_error, session_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_event, prompt, OutputFormat};

/// One line typed at the top-level `>> ` prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ConsoleCommand {
    SendString,
    ChangeBaud,
    Quit,
    Empty,
    Unknown(String),
}

impl ConsoleCommand {
    fn parse(line: &str) -> Self {
        match line.trim() {
            "s" | "S" => ConsoleCommand::SendString,
            "b" | "B" => ConsoleCommand::ChangeBaud,
            "q" | "Q" => ConsoleCommand::Quit,
            "" => ConsoleCommand::Empty,
            other => ConsoleCommand::Unknown(other.to_string()),
        }
    }
}

pub fn run(args: &ConnectionArgs, format: OutputFormat) -> CliResult<i32> {
    let mut manager = ConnectionManager::new(args.session_config(Role::Client));
    let events = manager
        .take_events()
        .ok_or_else(|| CliError::new(INTERNAL, "event channel already taken"))?;
    manager
        .connect()
        .map_err(|err| session_error("connect failed", err))?;

    // Ends once the manager and its reader have dropped their senders.
    let printer = thread::Builder::new()
        .name("cereal-events".to_string())
        .spawn(move || {
            for event in events {
                print_event(&event, Role::Client.name(), format);
            }
        })
        .map_err(|err| io_error("event printer failed to start", err))?;

    let stdin = io::stdin();
    let result = console(&manager, stdin.lock().lines());
    let closed = manager
        .disconnect()
        .map_err(|err| session_error("disconnect failed", err));
    drop(manager);
    let _ = printer.join();

    result.and(closed).map(|()| SUCCESS)
}

fn console(
    manager: &ConnectionManager,
    mut lines: impl Iterator<Item = io::Result<String>>,
) -> CliResult<()> {
    loop {
        if !manager.is_connected() {
            info!("session ended");
            return Ok(());
        }
        prompt(">> ");
        let Some(line) = next_line(&mut lines)? else {
            return Ok(());
        };

        match ConsoleCommand::parse(&line) {
            ConsoleCommand::SendString => {
                prompt("S >> ");
                let Some(text) = next_line(&mut lines)? else {
                    return Ok(());
                };
                if text.is_empty() {
                    warn!("empty string not sent");
                    continue;
                }
                manager
                    .send_string(text.as_bytes())
                    .map_err(|err| session_error("send failed", err))?;
            }
            ConsoleCommand::ChangeBaud => {
                prompt("B >> ");
                let Some(text) = next_line(&mut lines)? else {
                    return Ok(());
                };
                match parse_baud(&text) {
                    Some(rate) => manager
                        .change_baud(rate)
                        .map_err(|err| session_error("baud change failed", err))?,
                    None => warn!(input = %text.trim(), "not a valid baud rate"),
                }
            }
            ConsoleCommand::Quit => return Ok(()),
            ConsoleCommand::Empty => {}
            ConsoleCommand::Unknown(command) => {
                warn!(%command, "unknown command (use s, b or q)");
            }
        }
    }
}

fn next_line(lines: &mut impl Iterator<Item = io::Result<String>>) -> CliResult<Option<String>> {
    lines
        .next()
        .transpose()
        .map_err(|err| io_error("console read failed", err))
}

fn parse_baud(text: &str) -> Option<u32> {
    text.trim().parse::<u32>().ok().filter(|rate| *rate > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn console_commands_are_case_insensitive() {
        assert_eq!(ConsoleCommand::parse("s"), ConsoleCommand::SendString);
        assert_eq!(ConsoleCommand::parse("S\n"), ConsoleCommand::SendString);
        assert_eq!(ConsoleCommand::parse("B"), ConsoleCommand::ChangeBaud);
        assert_eq!(ConsoleCommand::parse(" q "), ConsoleCommand::Quit);
        assert_eq!(ConsoleCommand::parse(""), ConsoleCommand::Empty);
        assert_eq!(
            ConsoleCommand::parse("send"),
            ConsoleCommand::Unknown("send".to_string())
        );
    }

    #[test]
    fn baud_input_must_be_positive_integer() {
        assert_eq!(parse_baud("9600"), Some(9600));
        assert_eq!(parse_baud(" 115200\n"), Some(115_200));
        assert_eq!(parse_baud("0"), None);
        assert_eq!(parse_baud("fast"), None);
        assert_eq!(parse_baud("-1"), None);
    }

    #[test]
    fn next_line_reports_eof_as_none() {
        let mut lines = Vec::<io::Result<String>>::new().into_iter();
        assert_eq!(next_line(&mut lines).unwrap(), None);
    }

    #[cfg(unix)]
    mod console_session {
        use std::time::Duration;

        use cereal_frame::{ProtocolReader, ReaderEvent};
        use cereal_session::SessionConfig;
        use cereal_transport::{PortHandle, PortSettings, TransportPort};

        use super::*;

        fn fast_config() -> SessionConfig {
            SessionConfig {
                settings: PortSettings {
                    settle_delay: Duration::ZERO,
                    poll_interval: Duration::from_millis(10),
                    ..PortSettings::default()
                },
                baud_switch_pause: Duration::ZERO,
                ..SessionConfig::default()
            }
        }

        fn script(lines: &[&str]) -> impl Iterator<Item = io::Result<String>> {
            lines
                .iter()
                .map(|line| Ok(line.to_string()))
                .collect::<Vec<_>>()
                .into_iter()
        }

        /// A connected manager plus the far end of its transmit line.
        fn connected() -> (ConnectionManager, PortHandle, TransportPort) {
            let (tx, far_rx) = TransportPort::pipe_pair("client-tx", "far-rx").unwrap();
            let (far_tx, rx) = TransportPort::pipe_pair("far-tx", "client-rx").unwrap();
            let mut manager = ConnectionManager::new(fast_config());
            manager.connect_with(tx, rx).unwrap();

            let far_rx = PortHandle::new(far_rx);
            far_rx.configure(&fast_config().settings).unwrap();
            (manager, far_rx, far_tx)
        }

        #[test]
        fn empty_string_is_not_sent() {
            let (manager, far_rx, _far_tx) = connected();
            console(&manager, script(&["s", "", "s", "ok", "q"])).unwrap();

            let mut reader = ProtocolReader::new(far_rx);
            assert!(matches!(
                reader.next_event(),
                Some(ReaderEvent::Message(payload)) if payload[..] == b"ok"[..]
            ));
        }

        #[test]
        fn console_stops_once_session_ends() {
            let (manager, _far_rx, _far_tx) = connected();
            manager.writer().unwrap().send_shutdown().unwrap();

            console(&manager, script(&["s", "never sent"])).unwrap();
        }
    }
}
