use keylink_frame::ChannelId;

/// Errors that can occur in bridge operations.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] keylink_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] keylink_frame::FrameError),

    /// The channel has no USB endpoint behind it.
    #[error("channel {0} is not a USB endpoint")]
    NotUsbEndpoint(ChannelId),

    /// Bridge configuration is unusable.
    #[error("invalid bridge configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
