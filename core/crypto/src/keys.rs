//! Cipher key with secure memory handling.
//!
//! The key zeroizes its memory on drop so derived key streams do not
//! linger after an engine is discarded.

use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length of the XOR key table in bytes.
pub const CIPHER_KEY_LENGTH: usize = 256;

/// Domain separation tag mixed into every derived block.
const DERIVATION_CONTEXT: &[u8] = b"resvault-extension-cipher";

/// Key table used by [`crate::XorCipher`].
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct CipherKey {
    table: [u8; CIPHER_KEY_LENGTH],
}

impl CipherKey {
    /// Derive a key table from a seed.
    ///
    /// Uses blake2b in counter mode: four 64-byte blocks, each keyed by the
    /// seed, the block counter and a fixed context string.
    ///
    /// # Postconditions
    /// - The same seed always yields the same table
    pub fn derive(seed: &[u8]) -> Self {
        use blake2::{Blake2b512, Digest};

        let mut table = [0u8; CIPHER_KEY_LENGTH];
        for (counter, block) in table.chunks_mut(64).enumerate() {
            let mut hasher = Blake2b512::new();
            hasher.update(seed);
            hasher.update([counter as u8]);
            hasher.update(DERIVATION_CONTEXT);
            block.copy_from_slice(&hasher.finalize());
        }
        Self { table }
    }

    /// Get the key table.
    ///
    /// # Security
    /// The returned slice should be used immediately and not stored.
    pub fn as_bytes(&self) -> &[u8; CIPHER_KEY_LENGTH] {
        &self.table
    }
}

impl fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CipherKey([REDACTED])")
    }
}
