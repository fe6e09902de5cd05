use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::time::Duration;

use cereal_frame::ReaderEvent;
use cereal_session::ConnectionManager;
use tracing::info;

use crate::cmd::{ConnectionArgs, Role};
use crate::exit::{session_error, CliError, CliResult, INTERNAL, SUCCESS, TRANSPORT_ERROR};
use crate::output::{print_event, OutputFormat};

const EVENT_POLL: Duration = Duration::from_millis(100);

pub fn run(args: &ConnectionArgs, format: OutputFormat) -> CliResult<i32> {
    let mut manager = ConnectionManager::new(args.session_config(Role::Server));
    let events = manager
        .take_events()
        .ok_or_else(|| CliError::new(INTERNAL, "event channel already taken"))?;
    manager
        .connect()
        .map_err(|err| session_error("connect failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut code = SUCCESS;
    while running.load(Ordering::SeqCst) {
        let event = match events.recv_timeout(EVENT_POLL) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        print_event(&event, Role::Server.name(), format);
        if matches!(event, ReaderEvent::IoFailure { .. }) {
            code = TRANSPORT_ERROR;
        }
        if event.is_terminal() {
            break;
        }
    }

    if !running.load(Ordering::SeqCst) {
        info!("interrupted, closing session");
    }
    manager
        .disconnect()
        .map_err(|err| session_error("disconnect failed", err))?;
    Ok(code)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
