use crate::rsa::keys::*;

pub const MODE_PUBLIC: &str = "PUBLIC_";
pub const MODE_PRIVATE: &str = "PRIVATE";

/// A key as stored on disk: the key itself plus its mode tag, comment and
/// armor lines.
#[derive(Debug, Clone, Default)]
pub struct KeyData {
    pub(crate) mode: String,
    pub(crate) comment: String,
    pub(crate) key: Key,
    pub(crate) header: String,
    pub(crate) footer: String,
}

impl PartialEq for KeyData {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.mode == other.mode
    }
}

impl KeyData {
    fn label(&self) -> String {
        self.mode.trim_end_matches('_').to_uppercase()
    }

    pub fn generate_header_footer(&mut self) {
        self.header = format!("-----BEGIN RSA-TRANSFER {} KEY-----", self.label());
        self.footer = format!("-----END RSA-TRANSFER {} KEY-----", self.label());
    }

    pub fn generate_header_footer_bits(&mut self, bits: usize) {
        self.header = format!("-----BEGIN RSA-{} {} KEY-----", bits, self.label());
        self.footer = format!("-----END RSA-{} {} KEY-----", bits, self.label());
    }

    pub fn new_public(key: Key, comment: String) -> Self {
        Self { mode: MODE_PUBLIC.to_string(), comment, key, ..Default::default() }
    }

    pub fn new_private(key: Key, comment: String) -> Self {
        Self { mode: MODE_PRIVATE.to_string(), comment, key, ..Default::default() }
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    pub fn is_private(&self) -> bool {
        self.mode == MODE_PRIVATE
    }
}
