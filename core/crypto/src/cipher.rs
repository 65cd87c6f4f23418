//! Position-keyed XOR transform for encrypted extensions.
//!
//! Entries whose extension is classified as encrypted are stored with every
//! byte XORed against a key stream. The stream restarts at position zero for
//! each entry, and applying the transform twice restores the input, so the
//! same call encrypts on write and decrypts on read.

use crate::keys::{CipherKey, CIPHER_KEY_LENGTH};

/// XOR cipher over a derived key table.
#[derive(Clone, Debug)]
pub struct XorCipher {
    key: CipherKey,
}

impl XorCipher {
    /// Create a cipher from an existing key.
    pub fn new(key: CipherKey) -> Self {
        Self { key }
    }

    /// Create a cipher whose key is derived from `seed`.
    pub fn from_seed(seed: &[u8]) -> Self {
        Self::new(CipherKey::derive(seed))
    }

    /// Key stream byte for an absolute position within an entry.
    #[inline]
    fn stream_byte(&self, position: u64) -> u8 {
        let table = self.key.as_bytes();
        let lap = (position / CIPHER_KEY_LENGTH as u64) as u8;
        table[(position % CIPHER_KEY_LENGTH as u64) as usize].wrapping_add(lap)
    }

    /// Transform `data` in place as if it started at the entry's first byte.
    pub fn apply(&self, data: &mut [u8]) {
        self.apply_at(data, 0);
    }

    /// Transform `data` in place, treating it as the slice of an entry that
    /// begins at `position`.
    pub fn apply_at(&self, data: &mut [u8], position: u64) {
        for (i, byte) in data.iter_mut().enumerate() {
            *byte ^= self.stream_byte(position + i as u64);
        }
    }

    /// Transform a borrowed buffer into a new one.
    pub fn transform(&self, data: &[u8]) -> Vec<u8> {
        let mut out = data.to_vec();
        self.apply(&mut out);
        out
    }
}
