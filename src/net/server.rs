use std::error::Error;
use std::net::TcpListener;
use std::sync::Arc;
use std::thread;
use std::thread::JoinHandle;
use log::{error, info, warn};
use rand::Rng;
use crate::channel::{DirStorage, Storage};
use crate::config::Config;
use crate::net::ChannelSettings;
use crate::rsa::keys::KeyPair;

pub fn run<R: Rng + ?Sized>(config: &Config, rng: &mut R) -> Result<(), Box<dyn Error>> {
    let storage = Arc::new(DirStorage::new(&config.storage)?);
    let listener = TcpListener::bind((config.host.as_str(), config.port))?;
    info!("Server started on {}, storing files in {}", listener.local_addr()?, storage.root().display());
    let settings = ChannelSettings::from_config(config)?;
    serve(listener, storage, settings, config.sessions, || config.session_keys(rng))
}

fn reap(handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        if handle.join().is_err() {
            error!("Session thread panicked");
        }
    }
}

/// Accepts connections until `sessions` of them were served, or forever
/// when `sessions` is 0. Every session runs on its own thread with the key
/// pair `keys` hands out for it; only `storage` is shared.
pub fn serve<S, K>(listener: TcpListener, storage: Arc<S>, settings: ChannelSettings,
                   sessions: usize, mut keys: K) -> Result<(), Box<dyn Error>>
    where S: Storage + 'static, K: FnMut() -> Result<KeyPair, Box<dyn Error>> {
    let mut handles: Vec<JoinHandle<()>> = Vec::new();
    let mut accepted = 0;
    for stream in listener.incoming() {
        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Failed to accept connection: {}", e);
                continue;
            }
        };
        let peer = stream.peer_addr().map(|a| a.to_string()).unwrap_or_else(|_| "unknown peer".to_string());
        info!("Connection from {}", peer);
        let session_keys = match keys() {
            Ok(keys) => keys,
            Err(e) => {
                reap(handles);
                return Err(e);
            }
        };
        let storage = storage.clone();
        handles.push(thread::spawn(move || {
            match settings.accept(stream, session_keys).and_then(|mut channel| channel.serve(&*storage)) {
                Ok(()) => info!("Connection with {} closed", peer),
                Err(e) => warn!("Connection with {} closed: {}", peer, e),
            }
        }));
        let (done, running): (Vec<_>, Vec<_>) = handles.into_iter().partition(|h| h.is_finished());
        reap(done);
        handles = running;
        accepted += 1;
        if sessions != 0 && accepted >= sessions {
            break;
        }
    }
    reap(handles);
    Ok(())
}
