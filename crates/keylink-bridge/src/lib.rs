//! Bridge-side multiplexing for the keylink UART link.
//!
//! The bridge MCU owns one [`LinkContext`] per physical link. Its interrupt
//! handlers push received UART bytes into the ring, clear endpoint busy flags
//! and park USB OUT packets; the [`Bridge`] poll loop drains the ring one
//! frame at a time and routes each frame to its USB endpoint, discards it,
//! or acts on it as an administrative command.

pub mod config;
pub mod control;
pub mod endpoint;
pub mod error;
pub mod link;
pub mod mux;
pub mod slot;

pub use config::{BridgeConfig, ALWAYS_ON};
pub use control::{ControlCommand, CONTROL_SET_ENDPOINTS};
pub use endpoint::{BusyFlags, PacketPolicy, RecordingSink, Transfer, UpstreamSink, UsbEndpoint};
pub use error::{BridgeError, Result};
pub use link::LinkContext;
pub use mux::{Bridge, BridgeStats, MuxState, PollOutcome};
pub use slot::{OutSlot, OutSlots};
