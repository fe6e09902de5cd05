use bytes::Bytes;
use cereal_transport::TransportError;

/// Something the reader observed on the wire.
///
/// Delivered from the reader's worker thread to whoever holds the receiving
/// end of the event channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderEvent {
    /// A send-string frame whose parity checked out.
    Message(Bytes),
    /// The peer switched line speed; the local receiving side already follows.
    BaudChanged(u32),
    /// The peer asked to end the session. Terminal.
    ShutdownRequested,
    /// Parity mismatch on a send-string frame; the payload was dropped.
    ProtocolCorruption {
        expected: u8,
        received: u8,
        length: usize,
    },
    /// A send-string frame with a non-positive or oversized length.
    MalformedFrame { length: i32 },
    /// A command byte outside the protocol.
    UnknownCommand(u8),
    /// The transport failed; the reader has stopped. Terminal.
    IoFailure {
        message: String,
        os_code: Option<i32>,
    },
}

impl ReaderEvent {
    pub(crate) fn io_failure(err: &TransportError) -> Self {
        ReaderEvent::IoFailure {
            message: err.to_string(),
            os_code: err.os_code(),
        }
    }

    /// Whether the reader stops after emitting this event.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReaderEvent::ShutdownRequested | ReaderEvent::IoFailure { .. }
        )
    }

    /// Short stable name, used in logs and structured output.
    pub fn kind(&self) -> &'static str {
        match self {
            ReaderEvent::Message(_) => "message",
            ReaderEvent::BaudChanged(_) => "baud_changed",
            ReaderEvent::ShutdownRequested => "shutdown_requested",
            ReaderEvent::ProtocolCorruption { .. } => "protocol_corruption",
            ReaderEvent::MalformedFrame { .. } => "malformed_frame",
            ReaderEvent::UnknownCommand(_) => "unknown_command",
            ReaderEvent::IoFailure { .. } => "io_failure",
        }
    }
}

/// Why a reader loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderExit {
    /// The peer sent a shutdown frame.
    Shutdown,
    /// The owner cancelled the loop.
    Cancelled,
    /// The transport failed.
    Failed,
    /// Nobody is listening for events any more.
    Detached,
}
