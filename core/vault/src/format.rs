//! Binary layout of the index file (`data.000`).
//!
//! All integers are little-endian.
//!
//! ```text
//! magic      8 bytes  "RESVIDX\0"
//! version    u16
//! flags      u16      bit 0: case-insensitive names
//! saved_at   i64      unix seconds
//! enc_len    u8, label bytes (ASCII)
//! containers u32
//! ext_count  u32, then per extension: len u8, bytes, encrypted u8
//! entries    u32, then per entry: name_len u16, name bytes,
//!                                 data_id u32, offset u64, length u64
//! ```
//!
//! Names and extensions are stored in the vault's code page.

use chrono::{DateTime, Utc};

use resvault_common::{CasePolicy, Error, Result, TextEncoding};

use crate::index::IndexEntry;

/// Leading bytes of every index file.
pub const INDEX_MAGIC: &[u8; 8] = b"RESVIDX\0";

/// Current index format version.
pub const FORMAT_VERSION: u16 = 1;

const FLAG_CASE_INSENSITIVE: u16 = 0x0001;

/// Decoded contents of an index file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexFile {
    /// Case policy the vault was written under.
    pub case_policy: CasePolicy,
    /// When the file was written.
    pub saved_at: DateTime<Utc>,
    /// Code page label recorded by the writer.
    pub encoding_label: String,
    /// Number of data containers.
    pub containers: u32,
    /// Extension encryption flags in registration order.
    pub extensions: Vec<(String, bool)>,
    /// Entries in index order.
    pub entries: Vec<IndexEntry>,
}

impl IndexFile {
    /// Serialize, storing names in `encoding`.
    ///
    /// # Errors
    /// - `InvalidInput` if a name cannot be represented in the code page or
    ///   is too long for its length prefix
    pub fn encode(&self, encoding: TextEncoding) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(64 + self.entries.len() * 48);

        out.extend_from_slice(INDEX_MAGIC);
        out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        let flags = match self.case_policy {
            CasePolicy::Insensitive => FLAG_CASE_INSENSITIVE,
            CasePolicy::Sensitive => 0,
        };
        out.extend_from_slice(&flags.to_le_bytes());
        out.extend_from_slice(&self.saved_at.timestamp().to_le_bytes());

        let label = encoding.label().as_bytes();
        out.push(short_len(label.len(), "encoding label")?);
        out.extend_from_slice(label);

        out.extend_from_slice(&self.containers.to_le_bytes());

        out.extend_from_slice(&count_u32(self.extensions.len(), "extensions")?.to_le_bytes());
        for (ext, encrypted) in &self.extensions {
            let bytes = encoding.encode(ext)?;
            out.push(short_len(bytes.len(), ext)?);
            out.extend_from_slice(&bytes);
            out.push(u8::from(*encrypted));
        }

        out.extend_from_slice(&count_u32(self.entries.len(), "entries")?.to_le_bytes());
        for entry in &self.entries {
            let name = encoding.encode(&entry.name)?;
            let name_len = u16::try_from(name.len()).map_err(|_| {
                Error::InvalidInput(format!("Name '{}' is too long for the index", entry.name))
            })?;
            out.extend_from_slice(&name_len.to_le_bytes());
            out.extend_from_slice(&name);
            out.extend_from_slice(&entry.data_id.to_le_bytes());
            out.extend_from_slice(&entry.offset.to_le_bytes());
            out.extend_from_slice(&entry.length.to_le_bytes());
        }

        Ok(out)
    }

    /// Parse an index file, decoding names with `encoding`.
    ///
    /// # Errors
    /// - `CorruptIndex` on bad magic, unknown version, truncated records,
    ///   undecodable names or trailing bytes
    pub fn decode(bytes: &[u8], encoding: TextEncoding) -> Result<Self> {
        let mut r = Cursor::new(bytes);

        if r.take(INDEX_MAGIC.len(), "magic")? != INDEX_MAGIC {
            return Err(Error::CorruptIndex("not a resvault index".to_string()));
        }

        let version = r.u16("version")?;
        if version != FORMAT_VERSION {
            return Err(Error::CorruptIndex(format!(
                "unsupported format version {}",
                version
            )));
        }

        let flags = r.u16("flags")?;
        let case_policy = if flags & FLAG_CASE_INSENSITIVE != 0 {
            CasePolicy::Insensitive
        } else {
            CasePolicy::Sensitive
        };

        let secs = r.i64("timestamp")?;
        let saved_at = DateTime::from_timestamp(secs, 0)
            .ok_or_else(|| Error::CorruptIndex(format!("timestamp {} out of range", secs)))?;

        let label_len = r.u8("encoding label")? as usize;
        let encoding_label = std::str::from_utf8(r.take(label_len, "encoding label")?)
            .map_err(|_| Error::CorruptIndex("encoding label is not ASCII".to_string()))?
            .to_string();

        let containers = r.u32("container count")?;

        let ext_count = r.u32("extension count")?;
        let mut extensions = Vec::new();
        for i in 0..ext_count {
            let len = r.u8("extension")? as usize;
            let raw = r.take(len, "extension")?;
            let ext = encoding.decode(raw).ok_or_else(|| {
                Error::CorruptIndex(format!("extension {} is not valid {}", i, encoding))
            })?;
            let encrypted = match r.u8("extension flag")? {
                0 => false,
                1 => true,
                other => {
                    return Err(Error::CorruptIndex(format!(
                        "extension '{}' has invalid flag {}",
                        ext, other
                    )))
                }
            };
            extensions.push((ext, encrypted));
        }

        let entry_count = r.u32("entry count")?;
        let mut entries = Vec::new();
        for i in 0..entry_count {
            let len = r.u16("name length")? as usize;
            let raw = r.take(len, "name")?;
            let name = encoding.decode(raw).ok_or_else(|| {
                Error::CorruptIndex(format!("name of entry {} is not valid {}", i, encoding))
            })?;
            let data_id = r.u32("data id")?;
            let offset = r.u64("offset")?;
            let length = r.u64("length")?;
            entries.push(IndexEntry {
                name,
                data_id,
                offset,
                length,
            });
        }

        if r.remaining() != 0 {
            return Err(Error::CorruptIndex(format!(
                "{} trailing bytes after last entry",
                r.remaining()
            )));
        }

        Ok(Self {
            case_policy,
            saved_at,
            encoding_label,
            containers,
            extensions,
            entries,
        })
    }
}

fn short_len(len: usize, what: &str) -> Result<u8> {
    u8::try_from(len)
        .map_err(|_| Error::InvalidInput(format!("'{}' is too long for the index", what)))
}

fn count_u32(len: usize, what: &str) -> Result<u32> {
    u32::try_from(len).map_err(|_| Error::InvalidInput(format!("Too many {} for the index", what)))
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(Error::CorruptIndex(format!(
                "truncated while reading {} at byte {}",
                what, self.pos
            )));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn array<const N: usize>(&mut self, what: &str) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, what)?);
        Ok(out)
    }

    fn u8(&mut self, what: &str) -> Result<u8> {
        Ok(self.array::<1>(what)?[0])
    }

    fn u16(&mut self, what: &str) -> Result<u16> {
        Ok(u16::from_le_bytes(self.array(what)?))
    }

    fn u32(&mut self, what: &str) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array(what)?))
    }

    fn u64(&mut self, what: &str) -> Result<u64> {
        Ok(u64::from_le_bytes(self.array(what)?))
    }

    fn i64(&mut self, what: &str) -> Result<i64> {
        Ok(i64::from_le_bytes(self.array(what)?))
    }
}
