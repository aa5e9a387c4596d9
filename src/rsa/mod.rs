use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use num::Integer;
use num_bigint::{BigInt, BigUint, Sign, ToBigUint};
use num_traits::{One, Zero};
use rand::Rng;
use log::debug;

pub mod prime_gen;
pub mod codec;
pub mod keys;

use crate::config::Config;
use keys::*;
use prime_gen::*;

/// Smallest public exponent tried during key generation.
pub const PUBLIC_EXPONENT: u32 = 65537;

pub enum RsaError {
    KeyGeneration(String),
    MessageTooLarge { block: usize, modulus_bits: u64 },
    DecryptionMismatch(String),
    Prime(PrimeError),
}

impl RsaError {
    fn display(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RsaError::KeyGeneration(msg) => write!(f, "Key generation failed: {}", msg),
            RsaError::MessageTooLarge { block, modulus_bits } =>
                write!(f, "Message too large for the key size: block {} does not fit a {}-bit modulus", block, modulus_bits),
            RsaError::DecryptionMismatch(msg) => write!(f, "Decryption mismatch: {}", msg),
            RsaError::Prime(e) => write!(f, "{}", e),
        }
    }
}

impl Display for RsaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.display(f)
    }
}

impl Debug for RsaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.display(f)
    }
}

impl Error for RsaError {}

impl From<PrimeError> for RsaError {
    fn from(e: PrimeError) -> Self {
        RsaError::Prime(e)
    }
}

/// Square-and-multiply `a^q mod n`.
pub fn fast_modular_exponent(a: &BigUint, q: &BigUint, n: &BigUint) -> BigUint {
    if n.is_one() { return Zero::zero(); }
    let mut r: BigUint = One::one();
    let mut a = a % n;
    let mut q = q.clone();
    while !q.is_zero() {
        if q.bit(0) { r = (r * &a) % n; }
        q >>= 1;
        a = (&a * &a) % n;
    }
    r
}

pub fn euler(p: &BigUint, q: &BigUint) -> BigUint {
    (p - 1u32) * (q - 1u32)
}

/// Returns `(g, x, y)` with `a*x + b*y = g = gcd(a, b)`.
pub fn extended_gcd(a: &BigInt, b: &BigInt) -> (BigInt, BigInt, BigInt) {
    if a.is_zero() {
        return (b.clone(), BigInt::zero(), BigInt::one());
    }
    let (g, x, y) = extended_gcd(&(b % a), a);
    (g, y - (b / a) * &x, x)
}

/// Inverse of `e` modulo `phi`, normalised into `[0, phi)`.
pub fn mod_inverse(e: &BigUint, phi: &BigUint) -> Result<BigUint, RsaError> {
    if *phi <= One::one() {
        return Err(RsaError::KeyGeneration(format!("modulus {} admits no inverse", phi)));
    }
    let (e_s, phi_s) = (BigInt::from_biguint(Sign::Plus, e.clone()), BigInt::from_biguint(Sign::Plus, phi.clone()));
    let (g, x, _) = extended_gcd(&e_s, &phi_s);
    if !g.is_one() {
        return Err(RsaError::KeyGeneration(format!("modular inverse does not exist, gcd(e, phi) = {}", g)));
    }
    x.mod_floor(&phi_s).to_biguint()
        .ok_or_else(|| RsaError::KeyGeneration("negative inverse".to_string()))
}

/// Derives the key pair for two distinct primes.
pub fn key_pair_from_primes(p: &BigUint, q: &BigUint) -> Result<KeyPair, RsaError> {
    if p == q {
        return Err(RsaError::KeyGeneration("p and q must be distinct".to_string()));
    }
    let n = p * q;
    let f = euler(p, q);
    let mut e = BigUint::from(PUBLIC_EXPONENT);
    while !f.gcd(&e).is_one() { e += 2u32; }
    let d = mod_inverse(&e, &f)?;
    check_key_set(&d, &e, &f)?;
    Ok(KeyPair { public: Key { base: e, m: n.clone() }, private: Key { base: d, m: n } })
}

pub fn check_key_set(d: &BigUint, e: &BigUint, f: &BigUint) -> Result<(), RsaError> {
    let res = (d * e) % f;
    debug!("(d * e) % f = {}", res);
    if res.is_one() {
        Ok(())
    } else {
        Err(RsaError::KeyGeneration(format!("e * d mod phi = {}, expected 1", res)))
    }
}

impl Config {
    /// Fresh key pair with a `bits`-bit modulus target, primes of `bits / 2`.
    pub fn generate_key<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<KeyPair, RsaError> {
        let half = (self.bits / 2).max(2);
        let p = self.generate_prime(half, rng)?;
        let mut q = self.generate_prime(half, rng)?;
        while q == p {
            q = self.generate_prime(half, rng)?;
        }
        key_pair_from_primes(&p, &q)
    }
}

#[cfg(test)]
pub(crate) fn small(v: u64) -> BigUint {
    BigUint::from(v)
}

#[cfg(test)]
pub(crate) fn test_key_pair(bits: u32, seed: u64) -> KeyPair {
    use rand::SeedableRng;
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let p = generate_prime(bits / 2, DEFAULT_ROUNDS, &mut rng);
    let mut q = generate_prime(bits / 2, DEFAULT_ROUNDS, &mut rng);
    while q == p { q = generate_prime(bits / 2, DEFAULT_ROUNDS, &mut rng); }
    key_pair_from_primes(&p, &q).unwrap()
}
