//! Extension catalog: per-extension counts, sizes and encryption flags.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use resvault_common::CasePolicy;

use crate::index::IndexModel;

/// Aggregate view of one extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionInfo {
    /// Normalised extension, without the dot.
    pub kind: String,
    /// Number of entries with this extension.
    pub count: u64,
    /// Whether entries are stored XOR-transformed.
    pub encrypted: bool,
    /// Total stored bytes, present once computed.
    pub size_bytes: Option<u64>,
}

/// Outcome of recording an extension's encryption flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// First time the extension was seen.
    New,
    /// Already known with the same flag.
    Known,
    /// Already known with a different flag; the first one was kept.
    Conflict { kept: bool },
}

/// Classifies extensions and caches derived statistics.
///
/// Counts and sizes are derived from the index and cached until
/// [`invalidate`](Self::invalidate) is called. Encryption flags are fixed by
/// the first registration of each extension.
#[derive(Debug, Clone)]
pub struct ExtensionCatalog {
    policy: CasePolicy,
    defaults: Vec<String>,
    order: Vec<String>,
    flags: HashMap<String, bool>,
    counts: Option<Vec<(String, u64)>>,
    sizes: HashMap<String, u64>,
    size_scans: u64,
}

impl ExtensionCatalog {
    /// Create a catalog whose unregistered extensions fall back to
    /// `encrypted_extensions`.
    pub fn new(policy: CasePolicy, encrypted_extensions: &[String]) -> Self {
        Self {
            policy,
            defaults: encrypted_extensions
                .iter()
                .map(|ext| policy.extension_key(ext))
                .collect(),
            order: Vec::new(),
            flags: HashMap::new(),
            counts: None,
            sizes: HashMap::new(),
            size_scans: 0,
        }
    }

    /// Flag the static policy assigns to an extension.
    pub fn policy_flag(&self, extension: &str) -> bool {
        let key = self.policy.extension_key(extension);
        self.defaults.iter().any(|ext| *ext == key)
    }

    /// Whether entries with `extension` are stored encrypted.
    pub fn is_encrypted(&self, extension: &str) -> bool {
        let key = self.policy.extension_key(extension);
        match self.flags.get(&key) {
            Some(&flag) => flag,
            None => self.policy_flag(&key),
        }
    }

    /// Record the encryption flag of an extension.
    ///
    /// The first registration wins; later ones with a different flag are
    /// reported as [`Registration::Conflict`] and change nothing.
    pub fn register(&mut self, extension: &str, encrypted: bool) -> Registration {
        let key = self.policy.extension_key(extension);
        match self.flags.get(&key) {
            Some(&kept) if kept == encrypted => Registration::Known,
            Some(&kept) => Registration::Conflict { kept },
            None => {
                debug!(extension = %key, encrypted, "Registered extension");
                self.flags.insert(key.clone(), encrypted);
                self.order.push(key);
                Registration::New
            }
        }
    }

    /// Registered extensions with their flags, in registration order.
    pub fn registered(&self) -> Vec<(String, bool)> {
        self.order
            .iter()
            .map(|ext| (ext.clone(), self.flags.get(ext).copied().unwrap_or(false)))
            .collect()
    }

    /// Drop every cached count and size.
    pub fn invalidate(&mut self) {
        self.counts = None;
        self.sizes.clear();
    }

    /// Forget registrations as well as caches.
    pub fn reset(&mut self) {
        self.invalidate();
        self.order.clear();
        self.flags.clear();
    }

    /// Number of size scans performed so far.
    pub fn size_scans(&self) -> u64 {
        self.size_scans
    }

    /// One entry per extension in first-occurrence order.
    ///
    /// Counts are always filled; sizes only where already cached.
    pub fn list_all(&mut self, index: &IndexModel) -> Vec<ExtensionInfo> {
        if self.counts.is_none() {
            self.counts = Some(self.count_extensions(index));
        }

        self.counts
            .iter()
            .flatten()
            .map(|(kind, count)| ExtensionInfo {
                kind: kind.clone(),
                count: *count,
                encrypted: self.is_encrypted(kind),
                size_bytes: self.sizes.get(kind).copied(),
            })
            .collect()
    }

    /// Total stored bytes for an extension, scanning the index on a miss.
    pub fn size_of(&mut self, index: &IndexModel, extension: &str) -> u64 {
        let key = self.policy.extension_key(extension);
        if let Some(&size) = self.sizes.get(&key) {
            return size;
        }

        let size = index
            .iter()
            .filter(|e| self.policy.extension_key(e.extension()) == key)
            .map(|e| e.length)
            .sum();
        self.size_scans += 1;
        debug!(extension = %key, size, "Computed extension size");
        self.sizes.insert(key, size);
        size
    }

    fn count_extensions(&self, index: &IndexModel) -> Vec<(String, u64)> {
        let mut counts: Vec<(String, u64)> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();

        for entry in index.iter() {
            let key = self.policy.extension_key(entry.extension());
            match positions.get(&key) {
                Some(&pos) => counts[pos].1 += 1,
                None => {
                    positions.insert(key.clone(), counts.len());
                    counts.push((key, 1));
                }
            }
        }
        counts
    }
}
