//! Exclusive serial port transport.
//!
//! Provides the lowest layer of cereal: a [`TransportPort`] that opens one
//! serial device exclusively, applies line settings followed by a settle
//! delay, and performs exact-count blocking reads and writes.
//!
//! Once a session starts, ports are owned through a [`PortHandle`] so the
//! reader worker and frame writers share one device without global state.

pub mod cancel;
pub mod error;
pub mod handle;
pub mod port;
pub mod settings;

pub use cancel::CancelToken;
pub use error::{Result, TransportError};
pub use handle::PortHandle;
pub use port::TransportPort;
pub use settings::{
    DataBits, Parity, PortSettings, StopBits, DEFAULT_BAUD_RATE, DEFAULT_POLL_INTERVAL,
    DEFAULT_SETTLE_DELAY,
};
