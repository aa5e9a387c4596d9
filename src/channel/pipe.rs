//! In-process byte stream pair for exercising channels without sockets.

use std::io::{self, ErrorKind, Read, Write};
use crossbeam_channel::{unbounded, Receiver, Sender};

pub struct Pipe {
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
    buf: Vec<u8>,
    pos: usize,
}

pub fn duplex() -> (Pipe, Pipe) {
    let (a_tx, a_rx) = unbounded();
    let (b_tx, b_rx) = unbounded();
    (Pipe { tx: a_tx, rx: b_rx, buf: vec![], pos: 0 }, Pipe { tx: b_tx, rx: a_rx, buf: vec![], pos: 0 })
}

impl Read for Pipe {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        while self.pos == self.buf.len() {
            match self.rx.recv() {
                Ok(chunk) => {
                    self.buf = chunk;
                    self.pos = 0;
                }
                // peer dropped its end
                Err(_) => return Ok(0),
            }
        }
        let n = out.len().min(self.buf.len() - self.pos);
        out[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

impl Write for Pipe {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if !data.is_empty() {
            self.tx.send(data.to_vec()).map_err(|_| io::Error::new(ErrorKind::BrokenPipe, "peer closed"))?;
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
