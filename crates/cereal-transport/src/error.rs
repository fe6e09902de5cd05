/// Errors that can occur in serial transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The device could not be exclusively acquired.
    #[error("failed to open {name}: {source}")]
    Open {
        name: String,
        source: std::io::Error,
    },

    /// The OS rejected the requested line settings.
    #[error("failed to configure {name}: {source}")]
    Config {
        name: String,
        source: std::io::Error,
    },

    /// A read or write primitive failed outright.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The port is closed.
    #[error("port is not open")]
    NotOpen,

    /// The port is open but has never been configured.
    #[error("port is not configured")]
    NotConfigured,

    /// The device reported end of stream.
    #[error("device disconnected")]
    Disconnected,

    /// A cancellable read observed its stop signal.
    #[error("operation cancelled")]
    Cancelled,
}

impl TransportError {
    /// Native error code carried by the underlying I/O error, if any.
    pub fn os_code(&self) -> Option<i32> {
        match self {
            TransportError::Open { source, .. }
            | TransportError::Config { source, .. }
            | TransportError::Io(source) => source.raw_os_error(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
