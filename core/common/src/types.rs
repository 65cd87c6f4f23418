//! Common types used throughout resvault.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

use encoding_rs::Encoding;

/// How logical names are compared.
///
/// The policy is fixed when an engine is constructed and applies to name
/// uniqueness, exact lookup, substring search and extension matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CasePolicy {
    /// Names differing only in case are distinct.
    Sensitive,
    /// Names differing only in case collide.
    #[default]
    Insensitive,
}

impl CasePolicy {
    /// Comparison key for a name under this policy.
    pub fn key<'a>(&self, name: &'a str) -> Cow<'a, str> {
        match self {
            Self::Sensitive => Cow::Borrowed(name),
            Self::Insensitive => Cow::Owned(name.to_lowercase()),
        }
    }

    /// Check whether `haystack` contains `needle`.
    pub fn contains(&self, haystack: &str, needle: &str) -> bool {
        self.key(haystack).contains(self.key(needle).as_ref())
    }

    /// Normalise an extension for use as a catalog key.
    pub fn extension_key(&self, extension: &str) -> String {
        self.key(extension.trim_start_matches('.')).into_owned()
    }
}

/// Extension of a logical name: the text after the last `.`.
///
/// Returns an empty string when the name has no `.` or ends with one.
pub fn extension_of(name: &str) -> &str {
    match name.rfind('.') {
        Some(pos) => &name[pos + 1..],
        None => "",
    }
}

/// A legacy code page used for names stored in the index.
///
/// Wraps an `encoding_rs` encoding resolved from a WHATWG label such as
/// `windows-1252`, `euc-kr` or `utf-8`.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct TextEncoding(&'static Encoding);

impl TextEncoding {
    /// Resolve an encoding by label.
    ///
    /// # Errors
    /// - Unknown label
    /// - Encodings that cannot round-trip through bytes (UTF-16, replacement)
    pub fn from_label(label: &str) -> crate::Result<Self> {
        let encoding = Encoding::for_label(label.trim().as_bytes()).ok_or_else(|| {
            crate::Error::InvalidInput(format!("Unknown text encoding '{}'", label))
        })?;

        if encoding.output_encoding() != encoding {
            return Err(crate::Error::InvalidInput(format!(
                "Text encoding '{}' cannot be used for index names",
                encoding.name()
            )));
        }

        Ok(Self(encoding))
    }

    /// UTF-8.
    pub fn utf8() -> Self {
        Self(encoding_rs::UTF_8)
    }

    /// Canonical name of the encoding.
    pub fn label(&self) -> &'static str {
        self.0.name()
    }

    /// Encode a name into bytes.
    ///
    /// # Errors
    /// - The name contains characters the code page cannot represent
    pub fn encode<'a>(&self, name: &'a str) -> crate::Result<Cow<'a, [u8]>> {
        let (bytes, _, unmappable) = self.0.encode(name);
        if unmappable {
            return Err(crate::Error::InvalidInput(format!(
                "Name '{}' cannot be represented in {}",
                name,
                self.label()
            )));
        }
        Ok(bytes)
    }

    /// Decode bytes into a name, rejecting malformed sequences.
    pub fn decode(&self, bytes: &[u8]) -> Option<String> {
        self.0
            .decode_without_bom_handling_and_without_replacement(bytes)
            .map(Cow::into_owned)
    }
}

impl Default for TextEncoding {
    fn default() -> Self {
        Self(encoding_rs::WINDOWS_1252)
    }
}

impl fmt::Debug for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TextEncoding({})", self.label())
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Human readable byte count ("512 B", "1.50 KB", "3.20 GB").
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    if bytes < 1024 {
        return format!("{} B", bytes);
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", value, UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("a.txt"), "txt");
        assert_eq!(extension_of("archive.tar.gz"), "gz");
        assert_eq!(extension_of("README"), "");
        assert_eq!(extension_of("trailing."), "");
    }

    #[test]
    fn test_case_policy() {
        let insensitive = CasePolicy::Insensitive;
        assert_eq!(insensitive.key("Hero.DDS"), insensitive.key("hero.dds"));
        assert!(insensitive.contains("Monster_Boss.nx3", "boss"));
        assert_eq!(insensitive.extension_key(".DDS"), "dds");

        let sensitive = CasePolicy::Sensitive;
        assert_ne!(sensitive.key("Hero.DDS"), sensitive.key("hero.dds"));
        assert!(!sensitive.contains("Monster_Boss.nx3", "boss"));
        assert_eq!(sensitive.extension_key("DDS"), "DDS");
    }

    #[test]
    fn test_encoding_roundtrip_latin1() {
        let enc = TextEncoding::from_label("windows-1252").unwrap();
        let bytes = enc.encode("café.txt").unwrap();
        assert_eq!(bytes.len(), 8);
        assert_eq!(enc.decode(&bytes).unwrap(), "café.txt");
    }

    #[test]
    fn test_encoding_rejects_unmappable() {
        let enc = TextEncoding::from_label("windows-1252").unwrap();
        assert!(enc.encode("몬스터.dds").is_err());

        let korean = TextEncoding::from_label("euc-kr").unwrap();
        let bytes = korean.encode("몬스터.dds").unwrap();
        assert_eq!(korean.decode(&bytes).unwrap(), "몬스터.dds");
    }

    #[test]
    fn test_encoding_labels() {
        assert!(TextEncoding::from_label("no-such-codepage").is_err());
        assert!(TextEncoding::from_label("utf-16le").is_err());
        assert_eq!(TextEncoding::from_label("latin1").unwrap().label(), "windows-1252");
        assert_eq!(TextEncoding::utf8().label(), "UTF-8");
    }

    #[test]
    fn test_utf8_rejects_malformed() {
        assert!(TextEncoding::utf8().decode(&[0xff, 0xfe, 0x41]).is_none());
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.00 MB");
    }

    proptest! {
        #[test]
        fn prop_extension_is_suffix(stem in "[a-z]{1,8}", ext in "[a-z0-9]{1,4}") {
            let name = format!("{}.{}", stem, ext);
            prop_assert_eq!(extension_of(&name), ext.as_str());
        }
    }
}
