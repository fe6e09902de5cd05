use cereal_transport::TransportError;

/// Errors that can occur while encoding or sending frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload does not fit the signed 32-bit length field.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The transport failed while the frame was being committed.
    #[error("frame transport error: {0}")]
    Transport(#[from] TransportError),
}

pub type Result<T> = std::result::Result<T, FrameError>;
