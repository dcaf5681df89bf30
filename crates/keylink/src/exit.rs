use std::fmt;
use std::io;

use keylink_bridge::BridgeError;
use keylink_frame::{FrameError, RestartCause};
use keylink_fw::{FwError, ReplyError};
use keylink_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
/// The input drove the link into a state the firmware answers with a reset.
pub const RESTART_REQUIRED: i32 = 80;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(USAGE, message)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::NotFound => USAGE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn restart(context: &str, cause: RestartCause) -> CliError {
    CliError::new(RESTART_REQUIRED, format!("{context}: restart required: {cause}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Io(source) => io_error(context, source),
        TransportError::InvalidConfig(_) => CliError::new(USAGE, format!("{context}: {err}")),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::RestartRequired(cause) => restart(context, cause),
        FrameError::Io(source) => io_error(context, source),
        FrameError::Transport(err) => transport_error(context, err),
        FrameError::PayloadTooLarge { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::NotLinkChannel(_) => CliError::new(USAGE, format!("{context}: {err}")),
        FrameError::ConnectionClosed => CliError::new(DATA_INVALID, format!("{context}: {err}")),
    }
}

pub fn bridge_error(context: &str, err: BridgeError) -> CliError {
    match err {
        BridgeError::Transport(err) => transport_error(context, err),
        BridgeError::Frame(err) => frame_error(context, err),
        BridgeError::InvalidConfig(_) | BridgeError::NotUsbEndpoint(_) => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
    }
}

pub fn reply_error(context: &str, err: ReplyError) -> CliError {
    CliError::new(DATA_INVALID, format!("{context}: {err}"))
}

pub fn fw_error(context: &str, err: FwError) -> CliError {
    match err {
        FwError::Fatal(cause) => restart(context, cause),
        FwError::Frame(err) => frame_error(context, err),
        FwError::Transport(err) => transport_error(context, err),
        FwError::Reply(err) => reply_error(context, err),
        FwError::Parse(_) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restart_maps_to_dedicated_code() {
        let err = frame_error(
            "decode",
            FrameError::RestartRequired(RestartCause::Desync { byte: 0x55 }),
        );
        assert_eq!(err.code, RESTART_REQUIRED);
        assert!(err.message.contains("0x55"));
    }

    #[test]
    fn not_found_is_usage() {
        let err = io_error("open", io::Error::from(io::ErrorKind::NotFound));
        assert_eq!(err.code, USAGE);
    }

    #[test]
    fn closed_stream_is_transport_error() {
        let err = bridge_error("simulate", BridgeError::Transport(TransportError::Closed));
        assert_eq!(err.code, TRANSPORT_ERROR);
    }
}
