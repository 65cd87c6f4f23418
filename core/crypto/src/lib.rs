//! Cryptographic primitives for resvault.
//!
//! This module provides:
//! - Content digests (BLAKE2b-512) for integrity comparison
//! - The position-keyed XOR transform applied to encrypted extensions
//! - Cipher key derivation with automatic zeroization
//!
//! # Guarantees
//! - Digests are deterministic and never silently zero on I/O failure
//! - Key material is zeroized on drop and never printed
//! - Digest comparison is constant-time

pub mod cipher;
pub mod hash;
pub mod keys;

pub use cipher::XorCipher;
pub use hash::{digest, digest_file, digest_reader, Digest, DIGEST_LENGTH};
pub use keys::{CipherKey, CIPHER_KEY_LENGTH};
