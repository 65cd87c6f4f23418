//! Engine configuration.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use resvault_common::{CasePolicy, Error, IoResultExt, Result, TextEncoding};

/// Default per-container size ceiling (1 GiB).
pub const DEFAULT_MAX_CONTAINER_SIZE: u64 = 1 << 30;

/// Default code page for names in the index.
pub const DEFAULT_ENCODING: &str = "windows-1252";

/// Default minimum fragment length for partial-name search.
pub const DEFAULT_SEARCH_MIN_LEN: usize = 4;

/// Extensions stored XOR-transformed unless configured otherwise.
pub const DEFAULT_ENCRYPTED_EXTENSIONS: &[&str] = &["rdb", "lua", "cfg", "xml"];

const DEFAULT_CIPHER_SEED: &str = "resvault";

/// Settings an engine is constructed with.
///
/// Every field has a default, so a configuration file only needs to name
/// the values it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Largest number of bytes a container is filled to before a new one
    /// is started. A single larger file still gets a container of its own.
    pub max_container_size: u64,
    /// WHATWG label of the code page used for names in the index.
    pub encoding: String,
    /// Name comparison policy.
    pub case_policy: CasePolicy,
    /// Extensions whose entries are stored XOR-transformed.
    pub encrypted_extensions: Vec<String>,
    /// Seed the cipher key is derived from.
    pub cipher_seed: String,
    /// Copy an existing index to `data.000.bak` before overwriting it.
    pub backup: bool,
    /// Fragments shorter than this are not a search filter.
    pub search_min_len: usize,
    /// Directory exports go to when the caller does not name one.
    pub build_directory: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_container_size: DEFAULT_MAX_CONTAINER_SIZE,
            encoding: DEFAULT_ENCODING.to_string(),
            case_policy: CasePolicy::default(),
            encrypted_extensions: DEFAULT_ENCRYPTED_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            cipher_seed: DEFAULT_CIPHER_SEED.to_string(),
            backup: true,
            search_min_len: DEFAULT_SEARCH_MIN_LEN,
            build_directory: None,
        }
    }
}

impl EngineConfig {
    /// Check the configuration and resolve its code page.
    ///
    /// # Errors
    /// - `InvalidInput` for an unknown encoding label
    /// - `InvalidInput` for a zero container ceiling
    pub fn validate(&self) -> Result<TextEncoding> {
        if self.max_container_size == 0 {
            return Err(Error::InvalidInput(
                "max_container_size must be greater than zero".to_string(),
            ));
        }
        TextEncoding::from_label(&self.encoding)
    }

    /// Whether the policy table marks `extension` as encrypted.
    pub fn is_encrypted_extension(&self, extension: &str) -> bool {
        let key = self.case_policy.extension_key(extension);
        self.encrypted_extensions
            .iter()
            .any(|ext| self.case_policy.extension_key(ext) == key)
    }

    /// Serialize configuration to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Read a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path).with_path("reading config", path)?;
        Self::from_json(&json)
    }

    /// Write a configuration file.
    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_json()?).with_path("writing config", path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_container_size, 1024 * 1024 * 1024);
        assert_eq!(config.case_policy, CasePolicy::Insensitive);
        assert_eq!(config.search_min_len, 4);
        assert!(config.backup);
        assert_eq!(config.validate().unwrap().label(), "windows-1252");
    }

    #[test]
    fn test_encrypted_extension_lookup() {
        let config = EngineConfig::default();
        assert!(config.is_encrypted_extension("lua"));
        assert!(config.is_encrypted_extension("LUA"));
        assert!(config.is_encrypted_extension(".xml"));
        assert!(!config.is_encrypted_extension("txt"));

        let sensitive = EngineConfig {
            case_policy: CasePolicy::Sensitive,
            ..EngineConfig::default()
        };
        assert!(!sensitive.is_encrypted_extension("LUA"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = EngineConfig {
            encoding: "klingon".to_string(),
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidInput(_))));

        let config = EngineConfig {
            max_container_size: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config =
            EngineConfig::from_json(r#"{ "max_container_size": 64, "case_policy": "sensitive" }"#)
                .unwrap();
        assert_eq!(config.max_container_size, 64);
        assert_eq!(config.case_policy, CasePolicy::Sensitive);
        assert_eq!(config.encoding, DEFAULT_ENCODING);

        assert!(matches!(
            EngineConfig::from_json("{ not json"),
            Err(Error::Serialization(_))
        ));
    }

    #[test]
    fn test_config_file_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("resvault.json");

        let config = EngineConfig {
            encoding: "euc-kr".to_string(),
            build_directory: Some(temp.path().join("out")),
            ..EngineConfig::default()
        };
        config.save(&path).unwrap();

        assert_eq!(EngineConfig::load(&path).unwrap(), config);
    }
}
