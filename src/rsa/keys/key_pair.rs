use std::path::Path;
use crate::rsa::keys::*;
use crate::rsa::keys::key_data::*;

/// The two files of a key pair: `path` holds the private key and
/// `path.pub` the public one.
#[derive(Debug)]
pub struct KeyFiles {
    pub public: KeyData,
    pub private: KeyData,
}

fn public_path(path: &str) -> String {
    path.to_string() + ".pub"
}

impl KeyFiles {
    pub fn load(path: &str) -> Result<Self, KeyError> {
        Ok(Self { public: KeyData::load(public_path(path))?, private: KeyData::load(Path::new(path))? })
    }

    pub fn save(&mut self, path: &str, base64_output: bool) -> Result<(), KeyError> {
        self.public.save(public_path(path), base64_output)?;
        self.private.save(path, base64_output)?;
        Ok(())
    }

    pub fn into_key_pair(self) -> Result<KeyPair, KeyError> {
        if self.public.is_private() || !self.private.is_private() {
            return Err(KeyError::ParseError("Key files hold the wrong key kinds".to_string()));
        }
        if self.public.key.m != self.private.key.m {
            return Err(KeyError::ParseError("Public and private key moduli differ".to_string()));
        }
        Ok(KeyPair { public: self.public.key, private: self.private.key })
    }
}
