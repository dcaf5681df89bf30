use crate::header::{Endpoint, CMDLEN_MAXBYTES};

/// Secure-core configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FwConfig {
    /// Command buffer size. Commands declaring more are rejected.
    pub max_command_len: usize,
    /// Endpoint this firmware answers to.
    pub identity: Endpoint,
}

impl Default for FwConfig {
    fn default() -> Self {
        Self {
            max_command_len: CMDLEN_MAXBYTES,
            identity: Endpoint::Fw,
        }
    }
}
