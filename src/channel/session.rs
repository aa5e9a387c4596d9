use std::io::{Read, Write};
use log::{debug, info};
use num_bigint::BigUint;
use num_traits::{One, Zero};
use crate::channel::{ChannelError, Command, Reply, Storage, NO_FILES};
use crate::channel::frame::*;
use crate::rsa::RsaError;
use crate::rsa::codec::Codec;
use crate::rsa::keys::{Key, KeyPair};

/// Which side of the connection this channel is. The acceptor sends its
/// public key first, the initiator reads first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Acceptor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    KeyExchanged,
    Ready,
    Closed,
}

/// One encrypted conversation over an ordered byte stream.
///
/// Every message after the handshake is encrypted against the recipient's
/// public key and framed. Any failure while talking to the peer closes the
/// channel for good; there is no retry and no way back from `Closed`.
pub struct SecureChannel<T: Read + Write> {
    role: Role,
    state: ChannelState,
    keys: KeyPair,
    peer: Option<Key>,
    transport: Option<T>,
    codec: Codec,
    max_frame: usize,
}

impl<T: Read + Write> SecureChannel<T> {
    pub fn new(transport: T, role: Role, keys: KeyPair, codec: Codec) -> Self {
        Self {
            role,
            state: ChannelState::Disconnected,
            keys,
            peer: None,
            transport: Some(transport),
            codec,
            max_frame: DEFAULT_MAX_FRAME,
        }
    }

    pub fn with_max_frame(mut self, max_frame: usize) -> Self {
        self.max_frame = max_frame;
        self
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn public_key(&self) -> &Key {
        &self.keys.public
    }

    pub fn peer_key(&self) -> Option<&Key> {
        self.peer.as_ref()
    }

    /// Drops the peer key and the transport.
    pub fn close(&mut self) {
        if self.state != ChannelState::Closed {
            debug!("Channel closed from state {:?}", self.state);
        }
        self.peer = None;
        self.transport = None;
        self.state = ChannelState::Closed;
    }

    fn guarded<R, F>(&mut self, f: F) -> Result<R, ChannelError>
        where F: FnOnce(&mut Self) -> Result<R, ChannelError> {
        let res = f(self);
        if res.is_err() { self.close(); }
        res
    }

    fn require_session(&self) -> Result<(), ChannelError> {
        match self.state {
            ChannelState::KeyExchanged | ChannelState::Ready => Ok(()),
            ChannelState::Disconnected => Err(ChannelError::Protocol("keys have not been exchanged".to_string())),
            ChannelState::Closed => Err(ChannelError::Protocol("channel is closed".to_string())),
        }
    }

    fn transport(&mut self) -> Result<&mut T, ChannelError> {
        self.transport.as_mut().ok_or_else(|| ChannelError::Protocol("channel is closed".to_string()))
    }

    pub fn handshake(&mut self) -> Result<(), ChannelError> {
        if self.state != ChannelState::Disconnected {
            return Err(ChannelError::Protocol(format!("key exchange repeated in state {:?}", self.state)));
        }
        self.guarded(|ch| {
            let own = encode_key(&ch.keys.public);
            let max = ch.max_frame;
            let body = match ch.role {
                Role::Acceptor => {
                    write_frame(ch.transport()?, &own, max)?;
                    read_frame(ch.transport()?, max)?
                }
                Role::Initiator => {
                    let body = read_frame(ch.transport()?, max)?;
                    write_frame(ch.transport()?, &own, max)?;
                    body
                }
            };
            let peer = decode_key(&body)?;
            if peer.m <= BigUint::one() || peer.base.is_zero() {
                return Err(ChannelError::Protocol("peer sent an unusable public key".to_string()));
            }
            debug!("Key exchange completed, peer modulus has {} bits", peer.m.bits());
            ch.peer = Some(peer);
            ch.state = ChannelState::KeyExchanged;
            Ok(())
        })
    }

    fn write_message(&mut self, payload: &[u8]) -> Result<(), ChannelError> {
        let peer = self.peer.as_ref()
            .ok_or_else(|| ChannelError::Protocol("no peer key bound".to_string()))?;
        let body = encode_ciphertext(&self.codec.encrypt(peer, payload)?);
        let max = self.max_frame;
        write_frame(self.transport()?, &body, max)
    }

    fn read_message(&mut self) -> Result<Vec<u8>, ChannelError> {
        let max = self.max_frame;
        let body = read_frame(self.transport()?, max)?;
        let width = ((self.keys.private.m.bits() + 7) / 8) as usize;
        let ciphertext = decode_ciphertext(&body, width)?;
        Ok(self.codec.decrypt(&self.keys.private, &ciphertext)?)
    }

    fn write_text(&mut self, text: &str) -> Result<(), ChannelError> {
        self.write_message(text.as_bytes())
    }

    fn read_text(&mut self) -> Result<String, ChannelError> {
        String::from_utf8(self.read_message()?)
            .map_err(|_| RsaError::DecryptionMismatch("message is not valid UTF-8".to_string()).into())
    }

    pub fn send_bytes(&mut self, payload: &[u8]) -> Result<(), ChannelError> {
        self.require_session()?;
        self.guarded(|ch| ch.write_message(payload))
    }

    pub fn recv_bytes(&mut self) -> Result<Vec<u8>, ChannelError> {
        self.require_session()?;
        self.guarded(|ch| ch.read_message())
    }

    pub fn send_text(&mut self, text: &str) -> Result<(), ChannelError> {
        self.require_session()?;
        self.guarded(|ch| ch.write_text(text))
    }

    pub fn recv_text(&mut self) -> Result<String, ChannelError> {
        self.require_session()?;
        self.guarded(|ch| ch.read_text())
    }

    fn expect_reply(&mut self, expected: Reply) -> Result<(), ChannelError> {
        let reply = Reply::parse(&self.read_text()?)?;
        if reply == expected {
            Ok(())
        } else {
            Err(ChannelError::Protocol(format!("expected `{}', got `{}'", expected, reply)))
        }
    }

    pub fn request_upload(&mut self, name: &str, data: &[u8]) -> Result<(), ChannelError> {
        let command = Command::parse(&Command::Upload(name.to_string()).to_string())?;
        self.require_session()?;
        self.guarded(|ch| {
            ch.write_text(&command.to_string())?;
            ch.expect_reply(Reply::ReadyForUpload(name.to_string()))?;
            ch.write_message(data)?;
            ch.expect_reply(Reply::UploadSuccess(name.to_string()))?;
            ch.state = ChannelState::Ready;
            Ok(())
        })
    }

    /// `None` when the responder does not have `name`.
    pub fn request_download(&mut self, name: &str) -> Result<Option<Vec<u8>>, ChannelError> {
        let command = Command::parse(&Command::Download(name.to_string()).to_string())?;
        self.require_session()?;
        self.guarded(|ch| {
            ch.write_text(&command.to_string())?;
            let size = match Reply::parse(&ch.read_text()?)? {
                Reply::FileNotFound(missing) if missing == name => {
                    ch.state = ChannelState::Ready;
                    return Ok(None);
                }
                Reply::FileSize(size) => size,
                r => return Err(ChannelError::Protocol(format!("expected FILE_SIZE, got `{}'", r))),
            };
            ch.write_text(&Reply::ReadyForDownload.to_string())?;
            let data = ch.read_message()?;
            if data.len() as u64 != size {
                return Err(ChannelError::Protocol(format!("announced {} bytes, received {}", size, data.len())));
            }
            ch.state = ChannelState::Ready;
            Ok(Some(data))
        })
    }

    /// Newline separated names, or `NO_FILES`.
    pub fn request_list(&mut self) -> Result<String, ChannelError> {
        self.require_session()?;
        self.guarded(|ch| {
            ch.write_text(&Command::List.to_string())?;
            let listing = ch.read_text()?;
            ch.state = ChannelState::Ready;
            Ok(listing)
        })
    }

    pub fn request_exit(&mut self) -> Result<(), ChannelError> {
        self.require_session()?;
        let res = self.guarded(|ch| ch.write_text(&Command::Exit.to_string()));
        self.close();
        res
    }

    /// Answers commands until the peer sends EXIT.
    pub fn serve<S: Storage + ?Sized>(&mut self, storage: &S) -> Result<(), ChannelError> {
        self.require_session()?;
        self.guarded(|ch| loop {
            let command = Command::parse(&ch.read_text()?)?;
            debug!("Received command: {}", command);
            match command {
                Command::Upload(name) => ch.handle_upload(storage, &name)?,
                Command::Download(name) => ch.handle_download(storage, &name)?,
                Command::List => ch.handle_list(storage)?,
                Command::Exit => {
                    ch.close();
                    return Ok(());
                }
            }
            ch.state = ChannelState::Ready;
        })
    }

    fn handle_upload<S: Storage + ?Sized>(&mut self, storage: &S, name: &str) -> Result<(), ChannelError> {
        self.write_text(&Reply::ReadyForUpload(name.to_string()).to_string())?;
        let data = self.read_message()?;
        storage.put(name, &data).map_err(ChannelError::Storage)?;
        info!("Stored {} ({} bytes)", name, data.len());
        self.write_text(&Reply::UploadSuccess(name.to_string()).to_string())
    }

    fn handle_download<S: Storage + ?Sized>(&mut self, storage: &S, name: &str) -> Result<(), ChannelError> {
        let data = match storage.get(name).map_err(ChannelError::Storage)? {
            Some(data) => data,
            None => {
                info!("Requested file {} not found", name);
                return self.write_text(&Reply::FileNotFound(name.to_string()).to_string());
            }
        };
        self.write_text(&Reply::FileSize(data.len() as u64).to_string())?;
        self.expect_reply(Reply::ReadyForDownload)?;
        self.write_message(&data)?;
        info!("Sent {} ({} bytes)", name, data.len());
        Ok(())
    }

    fn handle_list<S: Storage + ?Sized>(&mut self, storage: &S) -> Result<(), ChannelError> {
        let names = storage.list().map_err(ChannelError::Storage)?;
        let listing = match names.is_empty() {
            true => NO_FILES.to_string(),
            false => names.join("\n"),
        };
        self.write_text(&listing)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::thread::JoinHandle;
    use super::*;
    use crate::channel::MemoryStorage;
    use crate::channel::frame::{encode_key, read_frame, write_frame, DEFAULT_MAX_FRAME};
    use crate::channel::pipe::{duplex, Pipe};
    use crate::rsa::codec::BlockPolicy;
    use crate::rsa::test_key_pair;

    type Channel = SecureChannel<Pipe>;

    fn pair() -> (Channel, Channel) {
        let (a, b) = duplex();
        (SecureChannel::new(a, Role::Initiator, test_key_pair(256, 31), Codec::default()),
         SecureChannel::new(b, Role::Acceptor, test_key_pair(256, 32), Codec::default()))
    }

    fn connected() -> (Channel, Channel) {
        let (mut client, mut server) = pair();
        let handle = thread::spawn(move || {
            server.handshake().unwrap();
            server
        });
        client.handshake().unwrap();
        (client, handle.join().unwrap())
    }

    fn serving(mut server: Channel, storage: Arc<MemoryStorage>) -> JoinHandle<(Channel, Result<(), ChannelError>)> {
        thread::spawn(move || {
            let res = server.serve(&*storage);
            (server, res)
        })
    }

    /// A serving responder whose initiator side is driven by hand.
    fn raw_initiator() -> (Pipe, JoinHandle<(Channel, Result<(), ChannelError>)>) {
        let (mut raw, b) = duplex();
        let mut server = SecureChannel::new(b, Role::Acceptor, test_key_pair(256, 32), Codec::default());
        let handle = thread::spawn(move || {
            let res = server.handshake().and_then(|_| server.serve(&MemoryStorage::new()));
            (server, res)
        });
        read_frame(&mut raw, DEFAULT_MAX_FRAME).unwrap();
        write_frame(&mut raw, &encode_key(&test_key_pair(256, 31).public), DEFAULT_MAX_FRAME).unwrap();
        (raw, handle)
    }

    #[test]
    fn handshake_binds_peer_keys() {
        let (client, server) = connected();
        assert_eq!(client.state(), ChannelState::KeyExchanged);
        assert_eq!(server.state(), ChannelState::KeyExchanged);
        assert_eq!(client.peer_key(), Some(server.public_key()));
        assert_eq!(server.peer_key(), Some(client.public_key()));
    }

    #[test]
    fn handshake_only_once() {
        let (mut client, _server) = connected();
        assert!(matches!(client.handshake(), Err(ChannelError::Protocol(_))));
        assert_eq!(client.state(), ChannelState::KeyExchanged);
    }

    #[test]
    fn raw_messages_keep_leading_zeros() {
        let (mut client, mut server) = connected();
        let payload = [0u8, 0, 0, 9, 0, 0, 1, 2, 3, 0];
        client.send_bytes(&payload).unwrap();
        client.send_bytes(&[]).unwrap();
        assert_eq!(server.recv_bytes().unwrap(), payload);
        assert!(server.recv_bytes().unwrap().is_empty());
        assert_eq!(client.state(), ChannelState::KeyExchanged);
    }

    #[test]
    fn commands_need_handshake() {
        let (mut client, _server) = pair();
        assert!(matches!(client.request_list(), Err(ChannelError::Protocol(_))));
        assert_eq!(client.state(), ChannelState::Disconnected);
    }

    #[test]
    fn upload_exchange_order() {
        let (mut client, mut server) = connected();
        let responder = thread::spawn(move || {
            let mut seen = vec![server.recv_text().unwrap()];
            server.send_text("READY_FOR_UPLOAD a.txt").unwrap();
            seen.push(String::from_utf8(server.recv_bytes().unwrap()).unwrap());
            server.send_text("UPLOAD_SUCCESS a.txt").unwrap();
            seen
        });
        client.request_upload("a.txt", b"hello").unwrap();
        assert_eq!(client.state(), ChannelState::Ready);
        assert_eq!(responder.join().unwrap(), vec!["UPLOAD a.txt".to_string(), "hello".to_string()]);
    }

    #[test]
    fn upload_then_download() {
        let (mut client, server) = connected();
        let storage = Arc::new(MemoryStorage::new());
        let handle = serving(server, storage.clone());
        client.request_upload("a.txt", b"hello").unwrap();
        assert_eq!(client.request_download("a.txt").unwrap(), Some(b"hello".to_vec()));
        let big = (0..10_000u32).map(|i| (i % 251) as u8).collect::<Vec<_>>();
        client.request_upload("big.bin", &big).unwrap();
        assert_eq!(client.request_download("big.bin").unwrap(), Some(big.clone()));
        client.request_exit().unwrap();
        let (server, res) = handle.join().unwrap();
        res.unwrap();
        assert_eq!(server.state(), ChannelState::Closed);
        assert_eq!(storage.get("a.txt").unwrap(), Some(b"hello".to_vec()));
        assert_eq!(storage.get("big.bin").unwrap(), Some(big));
    }

    #[test]
    fn download_missing_file() {
        let (mut client, server) = connected();
        let handle = serving(server, Arc::new(MemoryStorage::new()));
        client.send_text("DOWNLOAD missing.txt").unwrap();
        assert_eq!(client.recv_text().unwrap(), "FILE_NOT_FOUND missing.txt");
        // the next reply belongs to the next command, nothing else was queued
        client.send_text("LIST").unwrap();
        assert_eq!(client.recv_text().unwrap(), NO_FILES);
        assert_eq!(client.request_download("missing.txt").unwrap(), None);
        assert_eq!(client.state(), ChannelState::Ready);
        client.request_exit().unwrap();
        handle.join().unwrap().1.unwrap();
    }

    #[test]
    fn list_empty_and_populated() {
        let (mut client, server) = connected();
        let storage = Arc::new(MemoryStorage::new());
        let handle = serving(server, storage.clone());
        assert_eq!(client.request_list().unwrap(), NO_FILES);
        storage.put("a", b"1").unwrap();
        storage.put("b", b"2").unwrap();
        let listing = client.request_list().unwrap();
        assert_eq!(listing.lines().collect::<Vec<_>>(), vec!["a", "b"]);
        client.request_exit().unwrap();
        handle.join().unwrap().1.unwrap();
    }

    #[test]
    fn exit_closes_for_good() {
        let (mut client, server) = connected();
        let handle = serving(server, Arc::new(MemoryStorage::new()));
        client.request_exit().unwrap();
        assert_eq!(client.state(), ChannelState::Closed);
        assert!(client.peer_key().is_none());
        assert!(matches!(client.request_list(), Err(ChannelError::Protocol(_))));
        assert!(matches!(client.request_upload("a", b"x"), Err(ChannelError::Protocol(_))));
        assert!(matches!(client.request_exit(), Err(ChannelError::Protocol(_))));
        assert!(matches!(client.handshake(), Err(ChannelError::Protocol(_))));
        let (server, res) = handle.join().unwrap();
        res.unwrap();
        assert_eq!(server.state(), ChannelState::Closed);
    }

    #[test]
    fn unexpected_reply_closes() {
        let (mut client, mut server) = connected();
        let responder = thread::spawn(move || {
            server.recv_text().unwrap();
            server.send_text("UPLOAD_SUCCESS a.txt").unwrap();
            server
        });
        assert!(matches!(client.request_upload("a.txt", b"hello"), Err(ChannelError::Protocol(_))));
        assert_eq!(client.state(), ChannelState::Closed);
        responder.join().unwrap();
    }

    #[test]
    fn foreign_not_found_reply_closes() {
        let (mut client, mut server) = connected();
        let responder = thread::spawn(move || {
            server.recv_text().unwrap();
            server.send_text("FILE_NOT_FOUND other.txt").unwrap();
            server
        });
        assert!(matches!(client.request_download("a.txt"), Err(ChannelError::Protocol(_))));
        assert_eq!(client.state(), ChannelState::Closed);
        responder.join().unwrap();
    }

    #[test]
    fn hostile_length_closes_responder() {
        let (mut raw, handle) = raw_initiator();
        let mut body = u64::MAX.to_le_bytes().to_vec();
        body.extend_from_slice(&0u32.to_le_bytes());
        write_frame(&mut raw, &body, DEFAULT_MAX_FRAME).unwrap();
        let (server, res) = handle.join().unwrap();
        assert!(matches!(res, Err(ChannelError::Rsa(RsaError::DecryptionMismatch(_)))));
        assert_eq!(server.state(), ChannelState::Closed);
    }

    #[test]
    fn empty_blocks_close_responder() {
        let (mut raw, handle) = raw_initiator();
        let count = 50_000u32;
        let mut body = (count as u64 * 16).to_le_bytes().to_vec();
        body.extend_from_slice(&count.to_le_bytes());
        body.resize(body.len() + count as usize * 4, 0);
        write_frame(&mut raw, &body, DEFAULT_MAX_FRAME).unwrap();
        let (server, res) = handle.join().unwrap();
        assert!(matches!(res, Err(ChannelError::Protocol(_))));
        assert_eq!(server.state(), ChannelState::Closed);
    }

    #[test]
    fn unknown_command_closes_responder() {
        let (mut client, server) = connected();
        let handle = serving(server, Arc::new(MemoryStorage::new()));
        client.send_text("DELETE a.txt").unwrap();
        let (server, res) = handle.join().unwrap();
        assert!(matches!(res, Err(ChannelError::Protocol(_))));
        assert_eq!(server.state(), ChannelState::Closed);
        assert!(matches!(client.recv_text(), Err(ChannelError::Transport(_))));
        assert_eq!(client.state(), ChannelState::Closed);
    }

    #[test]
    fn peer_gone_is_transport_error() {
        let (mut client, server) = connected();
        drop(server);
        assert!(matches!(client.request_list(), Err(ChannelError::Transport(_))));
        assert_eq!(client.state(), ChannelState::Closed);
    }

    #[test]
    fn frame_limit_enforced() {
        let (mut client, server) = connected();
        let storage = Arc::new(MemoryStorage::new());
        let handle = serving(server.with_max_frame(4096), storage.clone());
        assert!(client.request_upload("big.bin", &vec![7u8; 8192]).is_err());
        let (_, res) = handle.join().unwrap();
        assert!(matches!(res, Err(ChannelError::Protocol(_))));
        assert_eq!(storage.get("big.bin").unwrap(), None);
    }

    #[test]
    fn mismatched_block_policy_fails() {
        let (a, b) = duplex();
        let mut client = SecureChannel::new(a, Role::Initiator, test_key_pair(256, 41), Codec::new(BlockPolicy::Maximal, 1));
        let mut server = SecureChannel::new(b, Role::Acceptor, test_key_pair(256, 42), Codec::default());
        let handle = thread::spawn(move || {
            server.handshake().unwrap();
            let res = server.serve(&MemoryStorage::new());
            (server, res)
        });
        client.handshake().unwrap();
        client.send_text("LIST but long enough to span blocks").unwrap();
        let (server, res) = handle.join().unwrap();
        assert!(matches!(res, Err(ChannelError::Rsa(RsaError::DecryptionMismatch(_)))));
        assert_eq!(server.state(), ChannelState::Closed);
    }
}
