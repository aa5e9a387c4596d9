use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::io;
use crate::rsa::RsaError;

pub mod frame;
pub mod command;
pub mod session;
pub mod storage;
#[cfg(test)]
pub mod pipe;

pub use command::*;
pub use session::*;
pub use storage::*;

pub enum ChannelError {
    Rsa(RsaError),
    Protocol(String),
    Transport(io::Error),
    Storage(io::Error),
}

impl ChannelError {
    fn display(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelError::Rsa(e) => write!(f, "{}", e),
            ChannelError::Protocol(msg) => write!(f, "Protocol violation: {}", msg),
            ChannelError::Transport(e) => write!(f, "Transport error: {}", e),
            ChannelError::Storage(e) => write!(f, "Storage error: {}", e),
        }
    }
}

impl Display for ChannelError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.display(f)
    }
}

impl Debug for ChannelError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.display(f)
    }
}

impl Error for ChannelError {}

impl From<RsaError> for ChannelError {
    fn from(e: RsaError) -> Self {
        ChannelError::Rsa(e)
    }
}

impl From<io::Error> for ChannelError {
    fn from(e: io::Error) -> Self {
        ChannelError::Transport(e)
    }
}
