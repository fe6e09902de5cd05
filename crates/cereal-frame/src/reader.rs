use std::io::{ErrorKind, Read};
use std::sync::mpsc::Sender;

use bytes::BytesMut;
use cereal_transport::{CancelToken, PortHandle, TransportError};
use tracing::{debug, info, warn};

use crate::codec::{
    decode_length, decode_rate, parity, CMD_SEND_STRING, CMD_SET_BAUD, CMD_SHUTDOWN,
    DEFAULT_MAX_PAYLOAD, LENGTH_SIZE, RATE_SIZE,
};
use crate::event::{ReaderEvent, ReaderExit};

const DISCARD_CHUNK_SIZE: usize = 8 * 1024;

/// Byte source the reader pulls frames from.
pub trait FrameSource {
    /// Fill `buf` completely, returning [`TransportError::Cancelled`] once
    /// `cancel` is observed.
    fn fill(&mut self, buf: &mut [u8], cancel: &CancelToken) -> cereal_transport::Result<()>;

    /// Follow a baud change requested by the peer.
    fn apply_baud_rate(&mut self, _rate: u32) -> cereal_transport::Result<()> {
        Ok(())
    }

    /// Called once when the reader stops for any reason other than a
    /// detached event receiver, before the final event is handed out.
    fn release(&mut self) {}
}

impl FrameSource for PortHandle {
    fn fill(&mut self, buf: &mut [u8], cancel: &CancelToken) -> cereal_transport::Result<()> {
        self.read_exact_cancellable(buf, cancel)
    }

    fn apply_baud_rate(&mut self, rate: u32) -> cereal_transport::Result<()> {
        self.set_baud_rate(rate)
    }
}

/// Adapts any `Read` stream into a [`FrameSource`].
///
/// Baud changes are ignored. Timeouts and interrupts are retried, so a
/// stream with a read timeout lets cancellation through between reads.
#[derive(Debug)]
pub struct StreamSource<R> {
    inner: R,
}

impl<R> StreamSource<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> FrameSource for StreamSource<R> {
    fn fill(&mut self, buf: &mut [u8], cancel: &CancelToken) -> cereal_transport::Result<()> {
        let mut filled = 0usize;
        while filled < buf.len() {
            if cancel.is_cancelled() {
                return Err(TransportError::Cancelled);
            }
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => return Err(TransportError::Disconnected),
                Ok(n) => filled += n,
                Err(err)
                    if matches!(
                        err.kind(),
                        ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut
                    ) =>
                {
                    continue
                }
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
        Ok(())
    }
}

/// Reader limits.
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Largest send-string payload buffered. Longer frames are skipped.
    pub max_payload: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            max_payload: DEFAULT_MAX_PAYLOAD,
        }
    }
}

/// Position of the reader within the frame grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    WaitCommand,
    ReadLength,
    ReadBaud,
    ReadBody { length: usize },
    ReadParity,
    Stopped,
}

/// Blocking decoder turning a byte stream into [`ReaderEvent`]s.
///
/// Protocol anomalies (parity mismatch, malformed length, unknown command)
/// are reported and the reader carries on with the next command byte.
/// Transport failures and shutdown frames stop it.
pub struct ProtocolReader<S> {
    source: S,
    state: ReaderState,
    config: ReaderConfig,
    cancel: CancelToken,
    body: BytesMut,
    exit: Option<ReaderExit>,
}

impl<S: FrameSource> ProtocolReader<S> {
    pub fn new(source: S) -> Self {
        Self::with_config(source, ReaderConfig::default())
    }

    pub fn with_config(source: S, config: ReaderConfig) -> Self {
        Self {
            source,
            state: ReaderState::WaitCommand,
            config,
            cancel: CancelToken::new(),
            body: BytesMut::new(),
            exit: None,
        }
    }

    /// Use an externally owned stop signal.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> ReaderState {
        self.state
    }

    /// Why the reader stopped, once it has.
    pub fn exit(&self) -> Option<ReaderExit> {
        self.exit
    }

    /// Drive the state machine until it produces an event.
    ///
    /// Returns `None` once the reader is stopped. A cancelled reader stops
    /// silently; a failed one yields a final [`ReaderEvent::IoFailure`].
    pub fn next_event(&mut self) -> Option<ReaderEvent> {
        loop {
            if self.state == ReaderState::Stopped {
                return None;
            }
            match self.step() {
                Ok(Some(event)) => return Some(event),
                Ok(None) => continue,
                Err(TransportError::Cancelled) => {
                    debug!(state = ?self.state, "reader cancelled");
                    self.stop(ReaderExit::Cancelled);
                    return None;
                }
                Err(err) => {
                    warn!(error = %err, state = ?self.state, "reader transport failure");
                    self.stop(ReaderExit::Failed);
                    return Some(ReaderEvent::io_failure(&err));
                }
            }
        }
    }

    /// Forward every event to `events` until the reader stops.
    pub fn run(mut self, events: Sender<ReaderEvent>) -> ReaderExit {
        info!("reader started");
        while let Some(event) = self.next_event() {
            if events.send(event).is_err() {
                debug!("event receiver dropped");
                self.stop(ReaderExit::Detached);
                return ReaderExit::Detached;
            }
        }
        let exit = self.exit.unwrap_or(ReaderExit::Cancelled);
        info!(?exit, "reader stopped");
        exit
    }

    pub fn get_ref(&self) -> &S {
        &self.source
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn into_inner(self) -> S {
        self.source
    }

    fn step(&mut self) -> cereal_transport::Result<Option<ReaderEvent>> {
        match self.state {
            ReaderState::WaitCommand => {
                if self.cancel.is_cancelled() {
                    return Err(TransportError::Cancelled);
                }
                let [command] = self.read_array::<1>()?;
                match command {
                    CMD_SEND_STRING => {
                        self.state = ReaderState::ReadLength;
                        Ok(None)
                    }
                    CMD_SET_BAUD => {
                        self.state = ReaderState::ReadBaud;
                        Ok(None)
                    }
                    CMD_SHUTDOWN => {
                        info!("peer requested shutdown");
                        self.stop(ReaderExit::Shutdown);
                        Ok(Some(ReaderEvent::ShutdownRequested))
                    }
                    other => {
                        warn!(command = other, "unknown command byte");
                        Ok(Some(ReaderEvent::UnknownCommand(other)))
                    }
                }
            }
            ReaderState::ReadLength => {
                let length = decode_length(self.read_array::<LENGTH_SIZE>()?);
                if length <= 0 {
                    warn!(length, "non-positive send-string length");
                    self.state = ReaderState::WaitCommand;
                    return Ok(Some(ReaderEvent::MalformedFrame { length }));
                }

                let size = length as usize;
                if size > self.config.max_payload {
                    warn!(
                        length,
                        max = self.config.max_payload,
                        "send-string payload over limit, skipping"
                    );
                    // Payload plus parity byte.
                    self.discard(size + 1)?;
                    self.state = ReaderState::WaitCommand;
                    return Ok(Some(ReaderEvent::MalformedFrame { length }));
                }

                self.state = ReaderState::ReadBody { length: size };
                Ok(None)
            }
            ReaderState::ReadBody { length } => {
                self.body.clear();
                self.body.resize(length, 0);
                self.source.fill(&mut self.body[..], &self.cancel)?;
                self.state = ReaderState::ReadParity;
                Ok(None)
            }
            ReaderState::ReadParity => {
                let [received] = self.read_array::<1>()?;
                let expected = parity(&self.body);
                let length = self.body.len();
                self.state = ReaderState::WaitCommand;

                if received != expected {
                    warn!(expected, received, length, "parity mismatch, dropping payload");
                    self.body.clear();
                    return Ok(Some(ReaderEvent::ProtocolCorruption {
                        expected,
                        received,
                        length,
                    }));
                }

                debug!(length, "received string");
                Ok(Some(ReaderEvent::Message(self.body.split().freeze())))
            }
            ReaderState::ReadBaud => {
                let rate = decode_rate(self.read_array::<RATE_SIZE>()?);
                self.source.apply_baud_rate(rate)?;
                info!(rate, "peer changed baud rate");
                self.state = ReaderState::WaitCommand;
                Ok(Some(ReaderEvent::BaudChanged(rate)))
            }
            ReaderState::Stopped => Ok(None),
        }
    }

    fn read_array<const N: usize>(&mut self) -> cereal_transport::Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.source.fill(&mut buf, &self.cancel)?;
        Ok(buf)
    }

    fn discard(&mut self, mut remaining: usize) -> cereal_transport::Result<()> {
        let mut scratch = [0u8; DISCARD_CHUNK_SIZE];
        while remaining > 0 {
            let n = remaining.min(DISCARD_CHUNK_SIZE);
            self.source.fill(&mut scratch[..n], &self.cancel)?;
            remaining -= n;
        }
        Ok(())
    }

    fn stop(&mut self, exit: ReaderExit) {
        self.state = ReaderState::Stopped;
        self.exit = Some(exit);
        if exit != ReaderExit::Detached {
            self.source.release();
        }
    }
}

impl<S: FrameSource> Iterator for ProtocolReader<S> {
    type Item = ReaderEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_event()
    }
}
