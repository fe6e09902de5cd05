use cereal_frame::FrameError;
use cereal_transport::TransportError;

/// Errors that can occur while managing a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Opening or configuring one of the session's ports failed.
    ///
    /// Any port that had already been acquired is released again.
    #[error("failed to connect {port}: {source}")]
    Connect {
        port: String,
        source: TransportError,
    },

    /// The operation needs a connected session.
    #[error("session is not connected")]
    NotConnected,

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// The reader thread panicked instead of returning.
    #[error("reader thread panicked")]
    ReaderPanicked,
}

impl SessionError {
    /// Native error code of the underlying transport failure, if any.
    pub fn os_code(&self) -> Option<i32> {
        match self {
            SessionError::Connect { source, .. } | SessionError::Transport(source) => {
                source.os_code()
            }
            SessionError::Frame(FrameError::Transport(source)) => source.os_code(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
