//! Connection lifecycle for one cereal endpoint.
//!
//! A [`ConnectionManager`] owns the transmit and receive ports of a session,
//! runs the protocol reader on a background thread, and coordinates baud
//! changes so both ends of the link move to the new speed together.

pub mod config;
pub mod error;
pub mod manager;

pub use config::{SessionConfig, DEFAULT_BAUD_SWITCH_PAUSE};
pub use error::{Result, SessionError};
pub use manager::ConnectionManager;
