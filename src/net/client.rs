use std::error::Error;
use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use log::{info, warn};
use rand::Rng;
use crate::channel::{check_name, write_atomic, ChannelState, SecureChannel};
use crate::config::Config;
use crate::net::ChannelSettings;

pub fn run<R: Rng + ?Sized>(config: &Config, rng: &mut R) -> Result<(), Box<dyn Error>> {
    let settings = ChannelSettings::from_config(config)?;
    let keys = config.session_keys(rng)?;
    let channel = settings.connect((config.host.as_str(), config.port), keys)?;
    info!("Connected to server at {}:{}", config.host, config.port);
    let mut client = Client::new(channel, &config.downloads);
    let stdin = io::stdin();
    client.interact(stdin.lock(), io::stdout())
}

/// Requester side of a session plus the local file handling around it.
pub struct Client<T: Read + Write> {
    channel: SecureChannel<T>,
    downloads: PathBuf,
}

impl<T: Read + Write> Client<T> {
    pub fn new<P: Into<PathBuf>>(channel: SecureChannel<T>, downloads: P) -> Self {
        Self { channel, downloads: downloads.into() }
    }

    pub fn channel(&self) -> &SecureChannel<T> {
        &self.channel
    }

    /// Sends the file at `path` under its base name.
    pub fn upload<P: AsRef<Path>>(&mut self, path: P) -> Result<String, Box<dyn Error>> {
        let path = path.as_ref();
        let name = path.file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| format!("{} has no usable file name", path.display()))?
            .to_string();
        let data = fs::read(path)?;
        self.channel.request_upload(&name, &data)?;
        info!("Uploaded {} ({} bytes)", name, data.len());
        Ok(name)
    }

    /// Saves `name` to `save_path`, or into the download directory. Returns
    /// `None` when the server does not have the file.
    pub fn download(&mut self, name: &str, save_path: Option<&Path>) -> Result<Option<PathBuf>, Box<dyn Error>> {
        let path = match save_path {
            Some(path) => path.to_path_buf(),
            None => {
                check_name(name)?;
                self.downloads.join(name)
            }
        };
        let data = match self.channel.request_download(name)? {
            Some(data) => data,
            None => return Ok(None),
        };
        write_atomic(&path, &data)?;
        info!("Downloaded {} ({} bytes) to {}", name, data.len(), path.display());
        Ok(Some(path))
    }

    pub fn list(&mut self) -> Result<String, Box<dyn Error>> {
        Ok(self.channel.request_list()?)
    }

    /// Sends EXIT if the channel is still open.
    pub fn close(&mut self) {
        if self.channel.state() == ChannelState::Closed { return; }
        if let Err(e) = self.channel.request_exit() {
            warn!("Failed to send EXIT: {}", e);
        }
    }

    fn handle_choice<I: BufRead, O: Write>(&mut self, choice: &str, input: &mut I, output: &mut O) -> Result<(), Box<dyn Error>> {
        match choice {
            "1" => {
                let path = prompt(input, output, "Enter file path to upload: ")?.unwrap_or_default();
                let name = self.upload(&path)?;
                writeln!(output, "Successfully uploaded {}", name)?;
            }
            "2" => {
                let name = prompt(input, output, "Enter filename to download: ")?.unwrap_or_default();
                let save_path = prompt(input, output, "Enter save path (or press enter to use original filename): ")?
                    .filter(|p| !p.is_empty())
                    .map(PathBuf::from);
                match self.download(&name, save_path.as_deref())? {
                    Some(path) => writeln!(output, "Successfully downloaded {} to {}", name, path.display())?,
                    None => writeln!(output, "File {} not found on server", name)?,
                }
            }
            "3" => {
                let listing = self.list()?;
                writeln!(output, "Files available on server:\n{}", listing)?;
            }
            _ => writeln!(output, "Invalid choice")?,
        }
        Ok(())
    }

    /// Menu loop over `input` until the user picks exit or input ends.
    /// Local failures are reported and the menu goes on; a failure that
    /// closed the channel ends the loop with that error.
    pub fn interact<I: BufRead, O: Write>(&mut self, mut input: I, mut output: O) -> Result<(), Box<dyn Error>> {
        loop {
            writeln!(output, "\nOptions:\n1. Upload file\n2. Download file\n3. List files\n4. Exit")?;
            let choice = match prompt(&mut input, &mut output, "Enter choice (1-4): ")? {
                Some(choice) => choice,
                None => break,
            };
            if choice == "4" { break; }
            if let Err(e) = self.handle_choice(&choice, &mut input, &mut output) {
                writeln!(output, "Error: {}", e)?;
                if self.channel.state() == ChannelState::Closed {
                    return Err(e);
                }
            }
        }
        self.close();
        writeln!(output, "Connection closed")?;
        Ok(())
    }
}

/// One trimmed line, `None` at end of input.
fn prompt<I: BufRead, O: Write>(input: &mut I, output: &mut O, text: &str) -> io::Result<Option<String>> {
    write!(output, "{}", text)?;
    output.flush()?;
    let mut line = String::new();
    match input.read_line(&mut line)? {
        0 => Ok(None),
        _ => Ok(Some(line.trim_end_matches(['\r', '\n']).to_string())),
    }
}
