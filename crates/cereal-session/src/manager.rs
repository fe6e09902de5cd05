use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use cereal_frame::{
    FrameSource, ProtocolReader, ProtocolWriter, ReaderConfig, ReaderEvent, ReaderExit,
};
use cereal_transport::{CancelToken, PortHandle, TransportError, TransportPort};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::{Result, SessionError};

const READER_THREAD_NAME: &str = "cereal-reader";

/// Owns one endpoint of a cereal link.
///
/// Events observed by the reader arrive on the channel returned by
/// [`ConnectionManager::take_events`]. The channel outlives individual
/// sessions, so a manager can be reconnected without handing out a new
/// receiver.
pub struct ConnectionManager {
    config: SessionConfig,
    events_tx: Sender<ReaderEvent>,
    events_rx: Option<Receiver<ReaderEvent>>,
    session: Option<ConnectionSession>,
}

struct ConnectionSession {
    tx: PortHandle,
    rx: PortHandle,
    shared_device: bool,
    writer: ProtocolWriter,
    worker: ReaderWorker,
}

impl ConnectionManager {
    pub fn new(config: SessionConfig) -> Self {
        let (events_tx, events_rx) = mpsc::channel();
        Self {
            config,
            events_tx,
            events_rx: Some(events_rx),
            session: None,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Hand out the event receiver. Returns `None` after the first call.
    pub fn take_events(&mut self) -> Option<Receiver<ReaderEvent>> {
        self.events_rx.take()
    }

    /// Open and configure the configured ports, then start the reader.
    ///
    /// All or nothing: if any step fails, every port acquired so far is
    /// closed again. Connecting an already connected manager does nothing.
    pub fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            debug!("already connected");
            return Ok(());
        }
        self.reap_ended()?;

        let tx = open_port(&self.config.tx_port)?;
        if self.config.shares_device() {
            return self.start(tx, None);
        }
        let rx = open_port(&self.config.rx_port)?;
        self.start(tx, Some(rx))
    }

    /// Like [`ConnectionManager::connect`], over ports the caller already
    /// opened.
    pub fn connect_with(&mut self, tx: TransportPort, rx: TransportPort) -> Result<()> {
        if self.is_connected() {
            debug!("already connected");
            return Ok(());
        }
        self.reap_ended()?;
        self.start(tx, Some(rx))
    }

    /// Tell the peer to shut down, stop the reader, and release both ports.
    ///
    /// The shutdown frame is skipped when the session has already ended.
    /// Does nothing when not connected.
    pub fn disconnect(&mut self) -> Result<()> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };

        if !session.is_live() {
            debug!("session already ended, not sending shutdown");
        } else if let Err(err) = session.writer.send_shutdown() {
            warn!(error = %err, "failed to send shutdown frame");
        }

        let exit = session.release()?;
        info!(?exit, "disconnected");
        Ok(())
    }

    /// Move the link to a new line speed.
    ///
    /// The request goes out at the old speed, then both local ports are
    /// reconfigured. The peer follows when its reader sees the request.
    pub fn change_baud(&self, rate: u32) -> Result<()> {
        let session = self.session()?;
        session.writer.send_set_baud(rate)?;

        let pause = self.config.baud_switch_pause;
        if !pause.is_zero() {
            debug!(?pause, "waiting for baud request to drain");
            thread::sleep(pause);
        }

        session.tx.set_baud_rate(rate)?;
        if session.shared_device {
            session.rx.adopt_baud_rate(rate)?;
        } else {
            session.rx.set_baud_rate(rate)?;
        }
        info!(rate, "changed baud rate");
        Ok(())
    }

    pub fn send_string(&self, payload: &[u8]) -> Result<()> {
        self.session()?.writer.send_string(payload)?;
        Ok(())
    }

    /// A writer sharing this session's transmit port. Sending a shutdown
    /// through it ends the session.
    pub fn writer(&self) -> Result<ProtocolWriter> {
        Ok(self.session()?.writer.clone())
    }

    /// Whether a session is open. Turns false as soon as a shutdown is sent
    /// or received, or the reader fails.
    pub fn is_connected(&self) -> bool {
        self.session.as_ref().is_some_and(ConnectionSession::is_live)
    }

    /// Current transmit baud rate, when connected.
    pub fn baud_rate(&self) -> Option<u32> {
        self.session()
            .ok()
            .and_then(|session| session.tx.baud_rate())
    }

    /// Whether a connected session's reader has stopped on its own.
    pub fn reader_finished(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.worker.is_finished())
    }

    fn session(&self) -> Result<&ConnectionSession> {
        self.session
            .as_ref()
            .filter(|session| session.is_live())
            .ok_or(SessionError::NotConnected)
    }

    /// Join the reader of a session that ended on its own.
    fn reap_ended(&mut self) -> Result<()> {
        if let Some(session) = self.session.take() {
            let exit = session.release()?;
            debug!(?exit, "reaped ended session");
        }
        Ok(())
    }

    /// Configure `tx` and `rx` (or a clone of `tx` when `rx` is `None`),
    /// then spawn the reader.
    fn start(&mut self, mut tx: TransportPort, rx: Option<TransportPort>) -> Result<()> {
        let settings = self.config.settings.clone();
        let shared_device = rx.is_none();

        tx.configure(&settings).map_err(|source| SessionError::Connect {
            port: tx.name().to_string(),
            source,
        })?;

        let rx = match rx {
            Some(mut rx) => {
                rx.configure(&settings)
                    .map_err(|source| SessionError::Connect {
                        port: rx.name().to_string(),
                        source,
                    })?;
                rx
            }
            None => tx.try_clone().map_err(|source| SessionError::Connect {
                port: tx.name().to_string(),
                source,
            })?,
        };

        let tx = PortHandle::new(tx);
        let rx = PortHandle::new(rx);
        let source = LinkedSource {
            rx: rx.clone(),
            tx: tx.clone(),
            shared_device,
        };

        let cancel = CancelToken::new();
        let worker = match ReaderWorker::spawn(
            source,
            self.config.reader.clone(),
            cancel.clone(),
            self.events_tx.clone(),
        ) {
            Ok(worker) => worker,
            Err(err) => {
                tx.close();
                rx.close();
                return Err(err);
            }
        };

        info!(
            tx = tx.name(),
            rx = rx.name(),
            line = %settings.line_summary(),
            shared_device,
            "connected"
        );
        self.session = Some(ConnectionSession {
            writer: ProtocolWriter::new(tx.clone()).with_shutdown_signal(cancel),
            tx,
            rx,
            shared_device,
            worker,
        });
        Ok(())
    }
}

impl ConnectionSession {
    /// False once a shutdown went out or the reader stopped. The reader
    /// closes the receive port before delivering its final event.
    fn is_live(&self) -> bool {
        !self.worker.cancel.is_cancelled() && !self.worker.is_finished() && self.rx.is_open()
    }

    /// Stop the reader and release both ports.
    fn release(self) -> Result<ReaderExit> {
        let exit = self.worker.stop();
        self.tx.close();
        self.rx.close();
        exit
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            if session.release().is_err() {
                warn!("reader thread panicked during teardown");
            }
        }
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("tx_port", &self.config.tx_port)
            .field("rx_port", &self.config.rx_port)
            .field("connected", &self.is_connected())
            .finish()
    }
}

fn open_port(name: &str) -> Result<TransportPort> {
    TransportPort::open(name).map_err(|source| SessionError::Connect {
        port: name.to_string(),
        source,
    })
}

/// Background thread running the protocol reader.
struct ReaderWorker {
    cancel: CancelToken,
    handle: JoinHandle<ReaderExit>,
}

impl ReaderWorker {
    fn spawn(
        source: LinkedSource,
        config: ReaderConfig,
        cancel: CancelToken,
        events: Sender<ReaderEvent>,
    ) -> Result<Self> {
        let reader = ProtocolReader::with_config(source, config).with_cancel_token(cancel.clone());
        let handle = thread::Builder::new()
            .name(READER_THREAD_NAME.to_string())
            .spawn(move || reader.run(events))
            .map_err(TransportError::Io)?;
        Ok(Self { cancel, handle })
    }

    fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    fn stop(self) -> Result<ReaderExit> {
        self.cancel.cancel();
        self.handle.join().map_err(|_| SessionError::ReaderPanicked)
    }
}

/// Reads from the receive port and keeps the transmit port in step when the
/// peer changes speed.
struct LinkedSource {
    rx: PortHandle,
    tx: PortHandle,
    shared_device: bool,
}

impl FrameSource for LinkedSource {
    fn fill(&mut self, buf: &mut [u8], cancel: &CancelToken) -> cereal_transport::Result<()> {
        self.rx.read_exact_cancellable(buf, cancel)
    }

    fn apply_baud_rate(&mut self, rate: u32) -> cereal_transport::Result<()> {
        self.rx.set_baud_rate(rate)?;
        if self.shared_device {
            self.tx.adopt_baud_rate(rate)
        } else {
            self.tx.set_baud_rate(rate)
        }
    }

    fn release(&mut self) {
        self.rx.close();
        self.tx.close();
    }
}
