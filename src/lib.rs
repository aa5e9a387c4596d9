pub mod config;
pub mod rsa;
pub mod channel;
pub mod net;

pub use crate::config::{Config, RunMode, SILENT};
