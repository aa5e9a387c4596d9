use std::fmt::{Display, Formatter};
use crate::channel::ChannelError;

/// LIST reply when storage holds nothing.
pub const NO_FILES: &str = "No files available";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Upload(String),
    Download(String),
    List,
    Exit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    ReadyForUpload(String),
    UploadSuccess(String),
    FileNotFound(String),
    FileSize(u64),
    ReadyForDownload,
}

fn named(verb: &str, rest: Option<&str>) -> Result<String, ChannelError> {
    match rest {
        Some(name) if !name.is_empty() => Ok(name.to_string()),
        _ => Err(ChannelError::Protocol(format!("{} without a file name", verb))),
    }
}

impl Command {
    pub fn parse(text: &str) -> Result<Command, ChannelError> {
        let (verb, rest) = match text.split_once(' ') {
            Some((verb, rest)) => (verb, Some(rest)),
            None => (text, None),
        };
        match (verb, rest) {
            ("UPLOAD", _) => Ok(Command::Upload(named(verb, rest)?)),
            ("DOWNLOAD", _) => Ok(Command::Download(named(verb, rest)?)),
            ("LIST", None) => Ok(Command::List),
            ("EXIT", None) => Ok(Command::Exit),
            _ => Err(ChannelError::Protocol(format!("unknown command `{}'", text))),
        }
    }
}

impl Display for Command {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Upload(name) => write!(f, "UPLOAD {}", name),
            Command::Download(name) => write!(f, "DOWNLOAD {}", name),
            Command::List => write!(f, "LIST"),
            Command::Exit => write!(f, "EXIT"),
        }
    }
}

impl Reply {
    pub fn parse(text: &str) -> Result<Reply, ChannelError> {
        let (verb, rest) = match text.split_once(' ') {
            Some((verb, rest)) => (verb, Some(rest)),
            None => (text, None),
        };
        match (verb, rest) {
            ("READY_FOR_UPLOAD", _) => Ok(Reply::ReadyForUpload(named(verb, rest)?)),
            ("UPLOAD_SUCCESS", _) => Ok(Reply::UploadSuccess(named(verb, rest)?)),
            ("FILE_NOT_FOUND", _) => Ok(Reply::FileNotFound(named(verb, rest)?)),
            ("FILE_SIZE", Some(size)) => size.parse()
                .map(Reply::FileSize)
                .map_err(|_| ChannelError::Protocol(format!("bad file size `{}'", size))),
            ("READY_FOR_DOWNLOAD", None) => Ok(Reply::ReadyForDownload),
            _ => Err(ChannelError::Protocol(format!("unexpected reply `{}'", text))),
        }
    }
}

impl Display for Reply {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Reply::ReadyForUpload(name) => write!(f, "READY_FOR_UPLOAD {}", name),
            Reply::UploadSuccess(name) => write!(f, "UPLOAD_SUCCESS {}", name),
            Reply::FileNotFound(name) => write!(f, "FILE_NOT_FOUND {}", name),
            Reply::FileSize(size) => write!(f, "FILE_SIZE {}", size),
            Reply::ReadyForDownload => write!(f, "READY_FOR_DOWNLOAD"),
        }
    }
}
