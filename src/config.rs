use std::error::Error;
use std::time::Duration;
use clap::Parser;
use lazy_static::lazy_static;
use mut_static::MutStatic;
use num_cpus;
use rand::Rng;
use log::info;

use crate::rsa::codec::{BlockPolicy, Codec};
use crate::rsa::keys::{KeyData, KeyFiles, KeyPair};
use crate::net::{client, server};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Server,
    Client,
    Generate,
}

#[macro_export]
macro_rules! config_t {
    ($CONFIG: expr, $NAME: ident) => {
#[derive(Debug, Clone, Parser)]
#[command(version, about = "File transfer over a hand-built RSA channel")]
pub struct $NAME {
    #[clap(short, long, value_parser, default_value = $CONFIG.mode.as_str(), help = "Run mode: server, client or generate")]
    pub mode: String,
    #[clap(long, value_parser, default_value = $CONFIG.host.as_str(), help = "Host to bind (server) or connect to (client)")]
    pub host: String,
    #[clap(short, long, value_parser, default_value_t = $CONFIG.port, help = "Well-known port of the server")]
    pub port: u16,
    #[clap(short, long, value_parser, default_value = $CONFIG.key.as_str(), help = "Key path, uses `path' and `path.pub'; empty for fresh keys")]
    pub key: String,
    #[clap(short, long, value_parser, default_value = $CONFIG.comment.as_str(), help = "Attach comment to key files")]
    pub comment: String,
    #[clap(long, value_parser, default_value_t = $CONFIG.binary, help = "Write key files in binary format")]
    pub binary: bool,
    #[clap(short, long, value_parser, default_value_t = $CONFIG.bits, help = "Modulus bits of generated keys")]
    pub bits: u32,
    #[clap(short, long, value_parser, default_value_t = $CONFIG.rounds, help = "Miller Rabin witness rounds")]
    pub rounds: u32,
    #[clap(long, value_parser, default_value_t = $CONFIG.time_max, help = "Max time in mill seconds that trying to generate a prime")]
    pub time_max: i64,
    #[clap(long, value_parser, default_value_t = $CONFIG.retry, help = "Retry when failed to generate primes")]
    pub retry: bool,
    #[clap(short, long, value_parser, default_value_t = $CONFIG.threads, help = "Calculate in <THREADS> threads")]
    pub threads: usize,
    #[clap(short, long, value_parser, default_value_t = $CONFIG.silent, help = "Disable log output")]
    pub silent: bool,
    #[clap(long, value_parser, default_value = $CONFIG.storage.as_str(), help = "Server directory holding uploaded files")]
    pub storage: String,
    #[clap(long, value_parser, default_value = $CONFIG.downloads.as_str(), help = "Client directory for downloaded files")]
    pub downloads: String,
    #[clap(long, value_parser, default_value = $CONFIG.block.as_str(), help = "Block size policy: conservative or maximal, both peers must agree")]
    pub block: String,
    #[clap(long, value_parser, default_value_t = $CONFIG.max_frame, help = "Largest accepted frame in bytes")]
    pub max_frame: usize,
    #[clap(long, value_parser, default_value_t = $CONFIG.timeout, help = "Idle timeout of a connection in seconds, 0 to disable")]
    pub timeout: u64,
    #[clap(long, value_parser, default_value_t = $CONFIG.sessions, help = "Sessions the server serves before exiting, 0 for no limit")]
    pub sessions: usize,
}
    };
}

lazy_static! {
    pub static ref CONFIG_DEF: Config = Config {
        mode: String::from("server"),
        host: String::from("localhost"),
        port: 9999,
        key: String::new(),
        comment: String::from("RSA-TRANSFER KEY"),
        binary: false,
        bits: 1024,
        rounds: crate::rsa::prime_gen::DEFAULT_ROUNDS,
        time_max: 10000,
        retry: true,
        threads: num_cpus::get(),
        silent: false,
        storage: String::from("uploads"),
        downloads: String::from("."),
        block: String::from("conservative"),
        max_frame: crate::channel::frame::DEFAULT_MAX_FRAME,
        timeout: 300,
        sessions: 1,
    };
    pub static ref SILENT: MutStatic<bool> =
        MutStatic::new();
}

config_t!(CONFIG_DEF, Config);

/// Process-wide quiet flag. Unset counts as silent so library users and
/// tests get no progress bars.
pub fn silent() -> bool {
    SILENT.read().map(|s| *s).unwrap_or(true)
}

impl Config {
    pub fn get(&self) -> &Config {
        self
    }

    pub fn run_mode(&self) -> Result<RunMode, Box<dyn Error>> {
        match self.mode.as_str() {
            "server" => Ok(RunMode::Server),
            "client" => Ok(RunMode::Client),
            "generate" => Ok(RunMode::Generate),
            _ => Err("Unknown run mode! available: server(default), client, generate".into())
        }
    }

    pub fn block_policy(&self) -> Result<BlockPolicy, Box<dyn Error>> {
        match self.block.as_str() {
            "conservative" => Ok(BlockPolicy::Conservative),
            "maximal" => Ok(BlockPolicy::Maximal),
            b => Err(format!("Unknown block policy `{}'! available: conservative(default), maximal", b).into())
        }
    }

    pub fn codec(&self) -> Result<Codec, Box<dyn Error>> {
        Ok(Codec::new(self.block_policy()?, self.threads.max(1)))
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        match self.timeout {
            0 => None,
            t => Some(Duration::from_secs(t))
        }
    }

    /// Key pair for one session: an owned copy of the key files when `key`
    /// is set, otherwise freshly generated.
    pub fn session_keys<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<KeyPair, Box<dyn Error>> {
        if self.key.is_empty() {
            let start = chrono::Local::now().timestamp_millis();
            let keys = self.generate_key(rng)?;
            info!("Generated {}-bit key pair in {} ms", keys.public.m.bits(), chrono::Local::now().timestamp_millis() - start);
            Ok(keys)
        } else {
            Ok(KeyFiles::load(&self.key)?.into_key_pair()?)
        }
    }

    pub fn run(&mut self) -> Result<(), Box<dyn Error>> {
        let mut rng = rand::thread_rng();
        match self.run_mode()? {
            RunMode::Generate => {
                let path = match self.key.as_str() {
                    "" => "key",
                    p => p,
                };
                let key_pair = self.generate_key(&mut rng)?;
                let bits = key_pair.public.m.bits() as usize;
                let mut files = KeyFiles {
                    public: KeyData::new_public(key_pair.public, self.comment.clone()),
                    private: KeyData::new_private(key_pair.private, self.comment.clone()),
                };
                files.public.generate_header_footer_bits(bits);
                files.private.generate_header_footer_bits(bits);
                files.save(path, !self.binary)?;
                info!("Generated key files: {}, {}.pub", path, path);
            }
            RunMode::Server => server::run(self, &mut rng)?,
            RunMode::Client => client::run(self, &mut rng)?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_defaults() {
        let config = Config::parse_from(["rsa-transfer"]);
        assert_eq!(config.run_mode().unwrap(), RunMode::Server);
        assert_eq!(config.port, 9999);
        assert_eq!(config.rounds, 5);
        assert_eq!(config.block_policy().unwrap(), BlockPolicy::Conservative);
        assert_eq!(config.sessions, 1);
    }

    #[test]
    fn parse_client_flags() {
        let config = Config::parse_from([
            "rsa-transfer", "--mode", "client", "--host", "10.0.0.2", "--port", "7000",
            "--block", "maximal", "--timeout", "0",
        ]);
        assert_eq!(config.run_mode().unwrap(), RunMode::Client);
        assert_eq!(config.host, "10.0.0.2");
        assert_eq!(config.port, 7000);
        assert_eq!(config.block_policy().unwrap(), BlockPolicy::Maximal);
        assert!(config.idle_timeout().is_none());
    }

    #[test]
    fn reject_unknown_values() {
        let mut config = CONFIG_DEF.get().clone();
        config.mode = "encode".to_string();
        assert!(config.run_mode().is_err());
        config.block = "huge".to_string();
        assert!(config.block_policy().is_err());
    }
}
