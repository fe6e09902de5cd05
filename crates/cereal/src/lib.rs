//! Two-endpoint serial command protocol.
//!
//! cereal moves strings, baud-rate changes and shutdown requests between two
//! processes joined by a null-modem serial link.
//!
//! # Crate Structure
//!
//! - [`transport`]: Exclusive serial port access and line configuration
//! - [`frame`]: Command encoding and the protocol reader state machine
//! - [`session`]: Connection lifecycle and baud-change orchestration (behind `session` feature)

/// Re-export transport types.
pub mod transport {
    pub use cereal_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use cereal_frame::*;
}

/// Re-export session types (requires `session` feature).
#[cfg(feature = "session")]
pub mod session {
    pub use cereal_session::*;
}
