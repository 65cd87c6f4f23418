//! Content digests for integrity comparison.
//!
//! Every digest is BLAKE2b with a 512-bit output. Identical input always
//! produces identical output; file failures are reported, never replaced by
//! an empty digest.

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use std::str::FromStr;

use blake2::{Blake2b512, Digest as _};
use subtle::ConstantTimeEq;

use resvault_common::{Error, IoResultExt, Result};

/// Digest length in bytes (512-bit).
pub const DIGEST_LENGTH: usize = 64;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// A 64-byte content digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest([u8; DIGEST_LENGTH]);

impl Digest {
    /// Lower-case hex rendering.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Constant-time comparison.
    pub fn ct_eq(&self, other: &Digest) -> bool {
        self.0[..].ct_eq(&other.0[..]).into()
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl FromStr for Digest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = hex::decode(s.trim())
            .map_err(|e| Error::InvalidInput(format!("Invalid digest hex: {}", e)))?;
        let bytes: [u8; DIGEST_LENGTH] = bytes.try_into().map_err(|v: Vec<u8>| {
            Error::InvalidInput(format!(
                "Invalid digest length: expected {}, got {}",
                DIGEST_LENGTH,
                v.len()
            ))
        })?;
        Ok(Self(bytes))
    }
}

fn finish(hasher: Blake2b512) -> Digest {
    let mut out = [0u8; DIGEST_LENGTH];
    out.copy_from_slice(&hasher.finalize());
    Digest(out)
}

/// Digest an in-memory byte sequence.
pub fn digest(bytes: &[u8]) -> Digest {
    let mut hasher = Blake2b512::new();
    hasher.update(bytes);
    finish(hasher)
}

/// Digest everything a reader yields.
pub fn digest_reader<R: Read>(mut reader: R) -> io::Result<Digest> {
    let mut hasher = Blake2b512::new();
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(finish(hasher))
}

/// Digest the contents of a file.
///
/// # Errors
/// - `Error::Io` naming the path if it cannot be opened or read
pub fn digest_file(path: &Path) -> Result<Digest> {
    let file = File::open(path).with_path("opening", path)?;
    digest_reader(BufReader::new(file)).with_path("hashing", path)
}
