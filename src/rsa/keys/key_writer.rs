use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use crate::rsa::keys::{BASE64_SPLIT, KeyError};
use crate::rsa::keys::key_data::KeyData;

/// Collects a key body and writes it out base64 armored between a header
/// and a footer line.
pub struct KeyWriter<W: Write> {
    writer: W,
    buffer: Vec<u8>,
    pub header: String,
    pub footer: String,
}

impl<W: Write> KeyWriter<W> {
    pub fn new(writer: W) -> Self {
        KeyWriter {
            writer,
            buffer: vec![],
            header: "".to_string(),
            footer: "".to_string(),
        }
    }

    pub fn finish(mut self) -> io::Result<W> {
        let encoded = base64::encode(&self.buffer);
        writeln!(self.writer, "{}", self.header)?;
        for line in encoded.as_bytes().chunks(BASE64_SPLIT) {
            self.writer.write_all(line)?;
            self.writer.write_all(b"\n")?;
        }
        writeln!(self.writer, "{}", self.footer)?;
        self.writer.flush()?;
        Ok(self.writer)
    }
}

impl<W: Write> Write for KeyWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl KeyData {
    /// Binary body: `u32` LE lengths of base and modulus, both magnitudes
    /// little-endian, the 7-byte mode tag, then the comment.
    pub fn to_bytes(&self) -> Vec<u8> {
        let base = self.key.base.to_bytes_le();
        let m = self.key.m.to_bytes_le();
        let mut f = Vec::with_capacity(8 + base.len() + m.len() + 7 + self.comment.len());
        f.extend_from_slice(&(base.len() as u32).to_le_bytes());
        f.extend_from_slice(&(m.len() as u32).to_le_bytes());
        f.extend_from_slice(&base);
        f.extend_from_slice(&m);
        let mut mode = [0 as u8; 7];
        for (a, b) in mode.iter_mut().zip(self.mode.bytes()) {
            *a = b;
        }
        f.extend_from_slice(&mode);
        f.extend_from_slice(self.comment.as_bytes());
        f
    }

    pub fn write_to<W: Write>(&mut self, writer: W, base64_output: bool) -> Result<(), KeyError> {
        if self.footer.is_empty() && self.header.is_empty() {
            self.generate_header_footer();
        }
        let body = self.to_bytes();
        if base64_output {
            let mut key_writer = KeyWriter::new(writer);
            key_writer.header = self.header.clone();
            key_writer.footer = self.footer.clone();
            key_writer.write_all(&body)?;
            key_writer.finish()?;
        } else {
            let mut writer = writer;
            writer.write_all(&body)?;
            writer.flush()?;
        }
        Ok(())
    }

    pub fn save<P: AsRef<Path>>(&mut self, path: P, base64_output: bool) -> Result<(), KeyError> {
        self.write_to(File::create(path)?, base64_output)
    }
}
