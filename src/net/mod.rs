use std::error::Error;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use log::debug;
use crate::channel::{ChannelError, Role, SecureChannel};
use crate::config::Config;
use crate::rsa::codec::Codec;
use crate::rsa::keys::KeyPair;

pub mod client;
pub mod server;

/// What both peers of a TCP session are set up with.
#[derive(Debug, Clone, Copy)]
pub struct ChannelSettings {
    pub codec: Codec,
    pub max_frame: usize,
    pub timeout: Option<Duration>,
}

impl ChannelSettings {
    pub fn from_config(config: &Config) -> Result<Self, Box<dyn Error>> {
        Ok(Self {
            codec: config.codec()?,
            max_frame: config.max_frame,
            timeout: config.idle_timeout(),
        })
    }

    /// Connects and completes the key exchange as initiator.
    pub fn connect<A: ToSocketAddrs>(&self, addr: A, keys: KeyPair) -> Result<SecureChannel<TcpStream>, ChannelError> {
        let stream = TcpStream::connect(addr)?;
        self.open(stream, Role::Initiator, keys)
    }

    /// Completes the key exchange on an accepted stream.
    pub fn accept(&self, stream: TcpStream, keys: KeyPair) -> Result<SecureChannel<TcpStream>, ChannelError> {
        self.open(stream, Role::Acceptor, keys)
    }

    fn open(&self, stream: TcpStream, role: Role, keys: KeyPair) -> Result<SecureChannel<TcpStream>, ChannelError> {
        stream.set_read_timeout(self.timeout)?;
        stream.set_write_timeout(self.timeout)?;
        stream.set_nodelay(true)?;
        let mut channel = SecureChannel::new(stream, role, keys, self.codec).with_max_frame(self.max_frame);
        channel.handshake()?;
        debug!("Channel open as {:?}", role);
        Ok(channel)
    }
}
