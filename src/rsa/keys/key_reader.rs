use std::fs::File;
use std::io::{BufRead, Cursor, Read};
use std::path::Path;
use num_bigint::BigUint;
use crate::rsa::keys::{Key, KeyError};
use crate::rsa::keys::key_data::{KeyData, MODE_PRIVATE, MODE_PUBLIC};

const READER_JUDGE_BUF: usize = 4;

/// Reads a key file in either layout. Text files are recognised by their
/// first bytes being printable and are base64 decoded between the armor lines.
pub struct KeyReader {
    pub binary: bool,
    res_buf: Vec<u8>,
    header: String,
    footer: String,
}

impl KeyReader {
    pub fn new<R: Read>(mut reader: R) -> Result<Self, KeyError> {
        let mut read_buf = Vec::new();
        reader.read_to_end(&mut read_buf)?;
        if read_buf.len() < READER_JUDGE_BUF {
            return Err(KeyError::ParseError("Data length not enough".to_string()));
        }
        let count = read_buf[..READER_JUDGE_BUF].iter().filter(|x| x.is_ascii_graphic()).count();
        let mut s = Self { binary: count < READER_JUDGE_BUF, res_buf: vec![], header: "".to_string(), footer: "".to_string() };
        if s.binary {
            s.res_buf = read_buf;
        } else {
            s.parse_text(&read_buf)?;
        }
        Ok(s)
    }

    fn parse_text(&mut self, read_buf: &[u8]) -> Result<(), KeyError> {
        let mut encoded = String::new();
        for line in Cursor::new(read_buf).lines() {
            let line = line?;
            let line = line.trim();
            if line.starts_with('-') {
                if line.contains("END") {
                    self.footer = line.to_string();
                } else {
                    self.header = line.to_string();
                }
            } else {
                encoded.push_str(line);
            }
        }
        self.res_buf = base64::decode(&encoded)
            .map_err(|e| KeyError::ParseError(format!("bad base64 body: {}", e)))?;
        Ok(())
    }

    pub fn into_key_data(self) -> Result<KeyData, KeyError> {
        let mut data = KeyData::from_bytes(&self.res_buf)?;
        data.header = self.header;
        data.footer = self.footer;
        Ok(data)
    }
}

fn take<'a>(data: &'a [u8], at: &mut usize, len: usize) -> Result<&'a [u8], KeyError> {
    let end = at.checked_add(len).filter(|end| *end <= data.len())
        .ok_or_else(|| KeyError::ParseError("Key body truncated".to_string()))?;
    let res = &data[*at..end];
    *at = end;
    Ok(res)
}

impl KeyData {
    pub fn from_bytes(content: &[u8]) -> Result<KeyData, KeyError> {
        let mut at = 0;
        let mut len_base: [u8; 4] = [0; 4];
        let mut len_m: [u8; 4] = [0; 4];
        len_base.copy_from_slice(take(content, &mut at, 4)?);
        len_m.copy_from_slice(take(content, &mut at, 4)?);
        let (len_base, len_m) = (u32::from_le_bytes(len_base) as usize, u32::from_le_bytes(len_m) as usize);
        let base = BigUint::from_bytes_le(take(content, &mut at, len_base)?);
        let m = BigUint::from_bytes_le(take(content, &mut at, len_m)?);
        let mode = String::from_utf8_lossy(take(content, &mut at, 7)?).to_string();
        if mode != MODE_PUBLIC && mode != MODE_PRIVATE {
            return Err(KeyError::ParseError(format!("Unknown key mode `{}'", mode)));
        }
        let comment = String::from_utf8(content[at..].to_vec())
            .map_err(|_| KeyError::ParseError("Comment is not UTF-8".to_string()))?;
        Ok(KeyData { mode, comment, key: Key { base, m }, header: String::new(), footer: String::new() })
    }

    pub fn read_from<R: Read>(reader: R) -> Result<KeyData, KeyError> {
        KeyReader::new(reader)?.into_key_data()
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<KeyData, KeyError> {
        KeyData::read_from(File::open(path)?)
    }
}
