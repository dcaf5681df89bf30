//! Byte-level transport for the keylink UART bridge.
//!
//! This is the lowest layer of keylink. It provides:
//! - [`ByteChannel`], the blocking read-one-byte / write-one-byte primitive
//!   everything else is written against
//! - [`RingBuffer`], the single-producer/single-consumer receive buffer filled
//!   from interrupt context and drained by the poll loop
//! - [`FlowController`], which maps ring occupancy onto the "may send" line
//!   the peer watches before it transmits

pub mod error;
pub mod flow;
pub mod ring;
pub mod traits;
pub mod uart;

pub use error::{Result, TransportError};
pub use flow::{FlowConfig, FlowController, FlowLine, RecordingLine};
pub use ring::{RingBuffer, DEFAULT_CAPACITY};
pub use traits::{ByteChannel, IoChannel, MemoryChannel};
pub use uart::{MemoryUart, PolledUart, UartRegisters};
