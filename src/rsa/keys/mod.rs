pub mod key_writer;
pub mod key_reader;
pub mod key_data;
pub mod key_pair;

pub use key_pair::*;
pub use key_reader::*;
pub use key_writer::*;
pub use key_data::*;

use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::io;
use num_bigint::BigUint;

/// One half of a key pair: `base` is the exponent (`e` or `d`), `m` the modulus.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Key {
    pub base: BigUint,
    pub m: BigUint,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPair {
    pub public: Key,
    pub private: Key,
}

pub enum KeyError {
    ParseError(String),
    Io(io::Error),
}

impl KeyError {
    fn display(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyError::ParseError(msg) => write!(f, "Key parse error: {}", msg),
            KeyError::Io(e) => write!(f, "Key file error: {}", e),
        }
    }
}

impl Display for KeyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.display(f)
    }
}

impl Debug for KeyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.display(f)
    }
}

impl Error for KeyError {}

impl From<io::Error> for KeyError {
    fn from(e: io::Error) -> Self {
        KeyError::Io(e)
    }
}

const BASE64_SPLIT: usize = 70;
