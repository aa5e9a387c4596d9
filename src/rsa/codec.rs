use std::thread;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use indicatif::{ProgressBar, ProgressStyle};
use num_bigint::BigUint;
use num_traits::Zero;
use crate::config::silent;
use crate::rsa::{fast_modular_exponent, RsaError};
use crate::rsa::keys::Key;

/// Payloads with fewer blocks than this are processed on the calling thread.
const PARALLEL_BLOCKS: usize = 64;
/// Payloads with at least this many blocks get a progress bar.
const PROGRESS_BLOCKS: usize = 4096;
/// Decrypt output reserved up front; larger payloads grow as blocks are restored.
const PREALLOC_MAX: usize = 16 * 1024 * 1024;

/// How many plaintext bytes go into one block. Both peers must use the same
/// policy: the receiver restores block widths from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockPolicy {
    /// `bitlength(n) / 16` bytes.
    Conservative,
    /// `bitlength(n) / 8 - 1` bytes, the largest width that always stays below `n`.
    Maximal,
}

impl BlockPolicy {
    pub fn block_size(&self, n: &BigUint) -> usize {
        let bits = n.bits() as usize;
        match self {
            BlockPolicy::Conservative => bits / 16,
            BlockPolicy::Maximal => (bits / 8).saturating_sub(1),
        }.max(1)
    }
}

/// Encrypted payload: one integer per plaintext block, in order, plus the
/// plaintext length needed to restore the width of every block.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Ciphertext {
    pub len: u64,
    pub blocks: Vec<BigUint>,
}

#[derive(Debug, Clone, Copy)]
pub struct Codec {
    pub policy: BlockPolicy,
    pub threads: usize,
}

impl Default for Codec {
    fn default() -> Self {
        Self { policy: BlockPolicy::Conservative, threads: 1 }
    }
}

impl Codec {
    pub fn new(policy: BlockPolicy, threads: usize) -> Self {
        Self { policy, threads: threads.max(1) }
    }

    pub fn block_size(&self, n: &BigUint) -> usize {
        self.policy.block_size(n)
    }

    pub fn encrypt(&self, key: &Key, plaintext: &[u8]) -> Result<Ciphertext, RsaError> {
        let size = self.block_size(&key.m);
        let source = plaintext.chunks(size)
            .enumerate()
            .map(|(i, chunk)| {
                let m = BigUint::from_bytes_be(chunk);
                if m >= key.m {
                    Err(RsaError::MessageTooLarge { block: i, modulus_bits: key.m.bits() })
                } else {
                    Ok(m)
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Ciphertext { len: plaintext.len() as u64, blocks: self.exponentiate(key, source) })
    }

    pub fn decrypt(&self, key: &Key, ciphertext: &Ciphertext) -> Result<Vec<u8>, RsaError> {
        let size = self.block_size(&key.m);
        let len = usize::try_from(ciphertext.len)
            .map_err(|_| RsaError::DecryptionMismatch(format!("length {} out of range", ciphertext.len)))?;
        let chunks = ciphertext.blocks.len();
        let fits = chunks.checked_mul(size).map_or(false, |cap| len <= cap);
        if len / size + (len % size != 0) as usize != chunks || !fits {
            return Err(RsaError::DecryptionMismatch(
                format!("{} blocks cannot hold {} bytes at {} bytes per block", chunks, len, size)));
        }
        if let Some(i) = ciphertext.blocks.iter().position(|c| *c >= key.m) {
            return Err(RsaError::DecryptionMismatch(format!("block {} is not below the modulus", i)));
        }
        let plain = self.exponentiate(key, ciphertext.blocks.clone());
        let mut res = Vec::with_capacity(len.min(PREALLOC_MAX));
        for (index, m) in plain.iter().enumerate() {
            let width = if index + 1 == chunks { len - size * index } else { size };
            let bytes = if m.is_zero() { Vec::new() } else { m.to_bytes_be() };
            if bytes.len() > width {
                return Err(RsaError::DecryptionMismatch(
                    format!("block {} decrypts to {} bytes, expected at most {}", index, bytes.len(), width)));
            }
            res.resize(res.len() + width - bytes.len(), 0);
            res.extend_from_slice(&bytes);
        }
        Ok(res)
    }

    /// Raises every block to `key.base` modulo `key.m`, preserving order.
    fn exponentiate(&self, key: &Key, source: Vec<BigUint>) -> Vec<BigUint> {
        let threads = self.threads;
        let chunks = source.len();
        if threads <= 1 || chunks < PARALLEL_BLOCKS {
            return source.iter().map(|x| fast_modular_exponent(x, &key.base, &key.m)).collect();
        }
        let (map_tx, map_rx): (Sender<(usize, BigUint)>, Receiver<(usize, BigUint)>) = bounded(threads);
        let (reduce_tx, reduce_rx) = unbounded();
        let pb = match silent() || chunks < PROGRESS_BLOCKS {
            true => None,
            false => Some(ProgressBar::new(chunks as u64)),
        };
        if let Some(pb) = &pb {
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} blocks ({eta})") {
                pb.set_style(style.progress_chars("#>-"));
            }
        }
        let handles = (0..threads).map(|_i| {
            let r = map_rx.clone();
            let s = reduce_tx.clone();
            let key = key.clone();
            thread::spawn(move || {
                for (index, data) in r.iter() {
                    let res = fast_modular_exponent(&data, &key.base, &key.m);
                    if s.send((index, res)).is_err() { break; }
                }
            })
        }).collect::<Vec<_>>();
        drop(map_rx);
        drop(reduce_tx);
        for item in source.into_iter().enumerate() {
            if map_tx.send(item).is_err() { break; }
        }
        drop(map_tx);
        let mut res_collect = Vec::with_capacity(chunks);
        for r in reduce_rx.iter() {
            res_collect.push(r);
            if let Some(pb) = &pb { pb.inc(1); }
        }
        if let Some(pb) = &pb {
            pb.finish_and_clear();
        }
        for handle in handles { let _ = handle.join(); }
        res_collect.sort_by_key(|x| x.0);
        res_collect.into_iter().map(|x| x.1).collect()
    }
}
