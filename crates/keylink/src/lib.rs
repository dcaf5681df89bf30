//! UART framing, multiplexing and flow control for a two-processor security
//! key.
//!
//! A USB-facing bridge MCU and a secure core share one UART. keylink carries
//! several independent byte streams over it without loss, reordering or
//! unbounded blocking.
//!
//! # Crate Structure
//!
//! - [`transport`]: byte channel, receive ring buffer, flow-control line
//! - [`frame`]: `{channel, length, payload}` wire frames and their decoder
//! - [`bridge`]: bridge-side multiplexer and USB endpoint plumbing
//! - [`fw`]: secure-core command header, parser and reply generator

/// Re-export transport types.
pub mod transport {
    pub use keylink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use keylink_frame::*;
}

/// Re-export bridge types.
pub mod bridge {
    pub use keylink_bridge::*;
}

/// Re-export secure-core types.
pub mod fw {
    pub use keylink_fw::*;
}
