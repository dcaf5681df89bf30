use keylink_frame::ChannelMask;

/// CONTROL command code: persist a new active-endpoint mask and restart.
pub const CONTROL_SET_ENDPOINTS: u8 = 0x01;

/// An administrative command carried on the CONTROL channel.
///
/// Byte 0 of the payload selects the command; the rest are its arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Replace the active-endpoint mask. Takes effect after a restart.
    SetEndpoints(ChannelMask),
}

impl ControlCommand {
    /// Parse a CONTROL payload. Unknown or truncated commands are logged and
    /// yield `None`.
    pub fn parse(payload: &[u8]) -> Option<Self> {
        match payload {
            [CONTROL_SET_ENDPOINTS, mask, ..] => {
                Some(Self::SetEndpoints(ChannelMask::from_bits_truncate(*mask)))
            }
            [CONTROL_SET_ENDPOINTS] => {
                tracing::warn!("SET_ENDPOINTS without a mask byte");
                None
            }
            [code, ..] => {
                tracing::warn!(code, "unknown control command");
                None
            }
            [] => {
                tracing::warn!("empty control frame");
                None
            }
        }
    }

    /// The CONTROL payload for this command.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::SetEndpoints(mask) => vec![CONTROL_SET_ENDPOINTS, mask.bits()],
        }
    }
}
