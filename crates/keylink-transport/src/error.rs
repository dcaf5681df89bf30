/// Errors that can occur in byte transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// An I/O error occurred on a host-side stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The byte source is exhausted and no further bytes will arrive.
    #[error("byte channel closed")]
    Closed,

    /// A transport configuration value is out of range.
    #[error("invalid transport configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, TransportError>;
