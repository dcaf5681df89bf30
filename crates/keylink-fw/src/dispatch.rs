use keylink_frame::RestartCause;
use keylink_transport::ByteChannel;

use crate::config::FwConfig;
use crate::error::{FwError, ParseError, ReplyError, Result};
use crate::link::FwLink;
use crate::parser::Command;

/// Reply produced by a [`CommandHandler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Response code, sent as the first reply byte.
    pub code: u8,
    /// Reply data after the code. Zero-filled up to the reply length.
    pub data: Vec<u8>,
}

impl Reply {
    pub fn new(code: u8, data: impl Into<Vec<u8>>) -> Self {
        Self {
            code,
            data: data.into(),
        }
    }
}

/// Application command semantics live behind this trait.
pub trait CommandHandler {
    /// Handle one command. `None` sends no reply.
    fn handle(&mut self, command: &Command) -> Option<Reply>;
}

impl<F> CommandHandler for F
where
    F: FnMut(&Command) -> Option<Reply>,
{
    fn handle(&mut self, command: &Command) -> Option<Reply> {
        self(command)
    }
}

/// What happened to one inbound command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A reply was sent in this many transport frames.
    Replied { code: u8, frames: usize },
    /// The handler chose not to reply.
    NoReply,
    /// The command was dropped; the rest of its transport frame was drained.
    Rejected(ParseError),
    /// The handler's reply could not be built and was not sent.
    ReplyAbandoned(ReplyError),
}

/// Secure-core command loop: read, hand to the handler, reply.
pub struct Dispatcher<C, H> {
    link: FwLink<C>,
    handler: H,
}

impl<C: ByteChannel, H: CommandHandler> Dispatcher<C, H> {
    pub fn new(channel: C, handler: H, config: &FwConfig) -> Self {
        Self {
            link: FwLink::new(channel, config),
            handler,
        }
    }

    /// Process exactly one command.
    pub fn dispatch_one(&mut self) -> Result<DispatchOutcome> {
        let command = match self.link.read_command() {
            Ok(command) => command,
            Err(FwError::Parse(err)) => {
                self.link.drain_transport_frame()?;
                return Ok(DispatchOutcome::Rejected(err));
            }
            Err(err) => return Err(err),
        };

        let Some(reply) = self.handler.handle(&command) else {
            return Ok(DispatchOutcome::NoReply);
        };

        match self.link.reply(&command.header, reply.code, &reply.data) {
            Ok(frames) => Ok(DispatchOutcome::Replied {
                code: reply.code,
                frames,
            }),
            Err(FwError::Reply(err)) => Ok(DispatchOutcome::ReplyAbandoned(err)),
            Err(err) => Err(err),
        }
    }

    /// Run until the link becomes unusable. Returns the restart cause, or
    /// the transport error that ended the loop.
    pub fn run(&mut self) -> Result<RestartCause> {
        loop {
            match self.dispatch_one() {
                Ok(_) => {}
                Err(FwError::Fatal(cause)) => {
                    tracing::error!(%cause, "secure core restart required");
                    return Ok(cause);
                }
                Err(err) => return Err(err),
            }
        }
    }

    pub fn link(&self) -> &FwLink<C> {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut FwLink<C> {
        &mut self.link
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn into_parts(self) -> (FwLink<C>, H) {
        (self.link, self.handler)
    }
}
