use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine as _;
use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};
use std::cell::RefCell;

/// Shared randomness source used for identifiers, credentials and key material.
///
/// The source is reference-counted across a [`Session`](crate::session::Session)
/// and all of its transports and is seedable so that identifier generation is
/// deterministic under test.
pub struct SessionRng {
    rng: RefCell<SmallRng>,
}

impl SessionRng {
    pub fn new() -> Self {
        SessionRng {
            rng: RefCell::new(SmallRng::from_os_rng()),
        }
    }

    /// Builds a deterministic source; two sources built from the same seed
    /// produce identical output streams.
    pub fn from_seed(seed: u64) -> Self {
        SessionRng {
            rng: RefCell::new(SmallRng::seed_from_u64(seed)),
        }
    }

    pub fn next_u64(&self) -> u64 {
        self.rng.borrow_mut().next_u64()
    }

    pub fn fill_bytes(&self, buf: &mut [u8]) {
        self.rng.borrow_mut().fill_bytes(buf);
    }

    /// Generates `len` random printable characters drawn from the base64
    /// alphabet, suitable for ids, ufrags and passwords.
    pub fn fill_base64(&self, len: usize) -> String {
        let mut raw = vec![0u8; len.div_ceil(4) * 3];
        self.fill_bytes(&mut raw);
        let mut out = STANDARD_NO_PAD.encode(&raw);
        out.truncate(len);
        out
    }
}

impl Default for SessionRng {
    fn default() -> Self {
        SessionRng::new()
    }
}
