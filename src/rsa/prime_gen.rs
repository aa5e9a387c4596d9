use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::sync::mpsc;
use std::thread;
use chrono::Local;
use log::debug;
use num_bigint::{BigUint, RandBigInt};
use num_traits::*;
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;
use crate::config::Config;
use crate::rsa::fast_modular_exponent;
use crate::rsa::prime_gen::PrimeError::Exhausted;

/// Witness rounds used when none are configured; a composite survives
/// with probability at most 4^-5.
pub const DEFAULT_ROUNDS: u32 = 5;

pub enum PrimeError {
    Exhausted(i64)
}

impl PrimeError {
    fn display(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Exhausted(time) => write!(f, "Prime generation exhausted after {} ms", time)
        }
    }
}

impl Display for PrimeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.display(f)
    }
}

impl Debug for PrimeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.display(f)
    }
}

impl Error for PrimeError {}

/// Miller-Rabin test. Composite verdicts are always right, prime verdicts
/// are wrong with probability at most 4^-rounds.
pub fn miller_rabin<R: Rng + ?Sized>(n: &BigUint, rounds: u32, rng: &mut R) -> bool {
    if *n <= One::one() { return false; }
    if *n <= BigUint::from(3u32) { return true; }
    if !n.bit(0) { return false; }
    let n_1: BigUint = n - 1u32;
    let mut d = n_1.clone();
    let mut r = 0u32;
    while !d.bit(0) {
        d >>= 1;
        r += 1;
    }
    let low = BigUint::from(2u32);
    'witness: for _ in 0..rounds {
        // a in [2, n - 2]
        let a = rng.gen_biguint_range(&low, &n_1);
        let mut x = fast_modular_exponent(&a, &d, n);
        if x.is_one() || x == n_1 { continue; }
        for _ in 1..r {
            x = (&x * &x) % n;
            if x == n_1 { continue 'witness; }
        }
        return false;
    }
    true
}

/// Uniform odd integer of exactly `bits` bits.
pub fn random_candidate<R: Rng + ?Sized>(bits: u32, rng: &mut R) -> BigUint {
    let bits = bits.max(2);
    let top: BigUint = BigUint::one() << (bits as usize - 1);
    rng.gen_biguint(bits as u64) | top | BigUint::one()
}

/// Draws candidates until one passes `miller_rabin`.
pub fn generate_prime<R: Rng + ?Sized>(bits: u32, rounds: u32, rng: &mut R) -> BigUint {
    loop {
        let test = random_candidate(bits, rng);
        if miller_rabin(&test, rounds, rng) {
            return test;
        }
    }
}

pub fn generate_one_prime<R: Rng + ?Sized>(bits: u32, rounds: u32, time_max: i64, rng: &mut R) -> Result<BigUint, PrimeError> {
    let epoch = 0xf;
    let start = Local::now().timestamp_millis();
    let mut try_times = 0;
    loop {
        try_times += &epoch;
        for _ in 0..epoch {
            let test = random_candidate(bits, rng);
            if miller_rabin(&test, rounds, rng) {
                let time = Local::now().timestamp_millis() - start;
                debug!("Done generation in {} tries after {} ms", try_times, time);
                return Ok(test);
            }
        }
        let time = Local::now().timestamp_millis() - start;
        if time_max > 0 && time > time_max {
            debug!("Failed generation in {} tries after {} ms", try_times, time);
            return Err(Exhausted(time));
        }
    }
}

impl Config {
    /// Searches in `threads` workers, each seeded from `rng`. The lowest
    /// worker index that succeeds wins, so a seeded `rng` gives a
    /// reproducible prime as long as no worker times out.
    pub fn generate_prime<R: Rng + ?Sized>(&self, bits: u32, rng: &mut R) -> Result<BigUint, PrimeError> {
        let t = self.threads.max(1);
        let (rounds, time_max) = (self.rounds, self.time_max);
        if t == 1 {
            return match generate_one_prime(bits, rounds, time_max, rng) {
                Err(_) if self.retry => self.generate_prime(bits, rng),
                r => r
            };
        }
        let (tx, rx) = mpsc::channel();
        let handles = (0..t).map(|i| {
            let tx = tx.clone();
            let seed: u64 = rng.gen();
            thread::spawn(move || {
                let mut rng = StdRng::seed_from_u64(seed);
                // receiver outlives every worker
                let _ = tx.send((i, generate_one_prime(bits, rounds, time_max, &mut rng)));
            })
        }).collect::<Vec<_>>();
        drop(tx);
        let mut found = rx.iter().collect::<Vec<_>>();
        for handle in handles { let _ = handle.join(); }
        found.sort_by_key(|x| x.0);
        let mut last = 0;
        for (_, res) in found {
            match res {
                Ok(prime) => return Ok(prime),
                Err(Exhausted(time)) => last = time,
            }
        }
        if self.retry {
            self.generate_prime(bits, rng)
        } else {
            Err(Exhausted(last))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CONFIG_DEF;
    use crate::rsa::small;

    #[test]
    fn test_known_primes() {
        let mut rng = StdRng::seed_from_u64(7);
        for p in [2u64, 3, 5, 7, 13, 97, 7919, 65537, 1000003, 2147483647] {
            assert!(miller_rabin(&small(p), DEFAULT_ROUNDS, &mut rng), "{} is prime", p);
        }
        let mersenne: BigUint = (BigUint::one() << 127usize) - 1u32;
        assert!(miller_rabin(&mersenne, DEFAULT_ROUNDS, &mut rng));
    }

    #[test]
    fn test_known_composites() {
        let mut rng = StdRng::seed_from_u64(11);
        // 561, 1105, 1729 are Carmichael numbers; 341 and 2047 are base-2 pseudoprimes.
        let composites = [0u64, 1, 4, 6, 9, 15, 21, 25, 341, 561, 1105, 1729, 2047, 7917, 1000001];
        for _ in 0..20 {
            for c in composites {
                assert!(!miller_rabin(&small(c), DEFAULT_ROUNDS, &mut rng), "{} is composite", c);
            }
        }
    }

    #[test]
    fn test_miller_rabin_range() {
        let mut rng = StdRng::seed_from_u64(3);
        let res = (0xfff0u64..0xffff)
            .filter(|x| miller_rabin(&small(*x), DEFAULT_ROUNDS, &mut rng))
            .collect::<Vec<_>>();
        // 65521 is the largest prime below 2^16
        assert_eq!(res, vec![0xfff1]);
    }

    #[test]
    fn test_candidate_shape() {
        let mut rng = StdRng::seed_from_u64(1);
        for bits in [2u32, 8, 64, 255] {
            let c = random_candidate(bits, &mut rng);
            assert_eq!(c.bits(), bits as u64);
            assert!(c.bit(0));
        }
    }

    #[test]
    fn gen_prime() {
        let mut rng = StdRng::seed_from_u64(99);
        let prime = generate_prime(96, DEFAULT_ROUNDS, &mut rng);
        assert_eq!(prime.bits(), 96);
        assert!(miller_rabin(&prime, 20, &mut rng));
    }

    #[test]
    fn gen_prime_reproducible() -> Result<(), Box<dyn Error>> {
        let mut config = CONFIG_DEF.get().clone();
        config.threads = 3;
        let a = config.generate_prime(80, &mut StdRng::seed_from_u64(5))?;
        let b = config.generate_prime(80, &mut StdRng::seed_from_u64(5))?;
        assert_eq!(a, b);
        assert_eq!(a.bits(), 80);
        Ok(())
    }
}
