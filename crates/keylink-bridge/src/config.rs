use keylink_frame::ChannelMask;
use keylink_transport::FlowConfig;

use crate::error::{BridgeError, Result};

/// Endpoints enabled whatever the persisted mask says.
pub const ALWAYS_ON: ChannelMask = ChannelMask::CDC.union(ChannelMask::CONTROL);

/// Bridge configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Channels delivered to USB; frames for other channels are discarded.
    pub active: ChannelMask,
    /// Receive ring flow control.
    pub flow: FlowConfig,
}

impl BridgeConfig {
    /// Build the startup configuration from the mask byte kept in
    /// non-volatile storage.
    pub fn from_persisted(mask: u8) -> Self {
        Self {
            active: ChannelMask::from_bits_truncate(mask) | ALWAYS_ON,
            flow: FlowConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.active.contains(ALWAYS_ON) {
            return Err(BridgeError::InvalidConfig(format!(
                "active mask {:#04x} must include CDC and CONTROL",
                self.active.bits()
            )));
        }
        self.flow.validate()?;
        Ok(())
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::from_persisted(0)
    }
}
