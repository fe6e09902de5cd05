//! Command framing for the cereal serial protocol.
//!
//! Every frame starts with a one-byte command code:
//! - `0x01` send string: 4-byte little-endian length, payload, parity byte
//! - `0x02` set baud: 4-byte little-endian rate
//! - `0x03` shutdown
//!
//! Encoding is a set of pure functions in [`codec`]. Decoding is the
//! [`ProtocolReader`] state machine, because the length of a send-string
//! frame is only known mid-stream.

pub mod codec;
pub mod error;
pub mod event;
pub mod reader;
pub mod writer;

pub use codec::{
    encode_send_string, encode_set_baud, encode_shutdown, parity, Command, CMD_SEND_STRING,
    CMD_SET_BAUD, CMD_SHUTDOWN, DEFAULT_MAX_PAYLOAD, MAX_WIRE_PAYLOAD,
};
pub use error::{FrameError, Result};
pub use event::{ReaderEvent, ReaderExit};
pub use reader::{FrameSource, ProtocolReader, ReaderConfig, ReaderState, StreamSource};
pub use writer::ProtocolWriter;
