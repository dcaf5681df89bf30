//! Secure-core side of the keylink link.
//!
//! The secure core reads bridge frames straight off its UART. Inside the CDC
//! stream each command starts with a one-byte [`CommandHeader`] that names a
//! transaction id, a target endpoint and one of four fixed payload sizes.
//! Replies go back as a two-byte header frame followed by data chunks small
//! enough to fit one USB packet each.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod header;
pub mod link;
pub mod parser;
pub mod reply;

pub use config::FwConfig;
pub use dispatch::{CommandHandler, DispatchOutcome, Dispatcher, Reply};
pub use error::{FwError, ParseError, ReplyError, Result};
pub use header::{CommandHeader, Endpoint, LengthClass, CMDLEN_MAXBYTES};
pub use link::FwLink;
pub use parser::{Command, CommandParser, ParseStatus};
pub use reply::{build_reply, FwCommand, FwResponse, REPLY_CHUNK};
