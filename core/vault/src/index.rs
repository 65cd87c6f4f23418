//! Index model: the ordered list of entries in a vault.
//!
//! Entries keep insertion order. A name map keyed by the case policy keeps
//! uniqueness checks and exact lookups cheap, and is updated in the same
//! call that appends to the entry list, so queries always see committed
//! state.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use resvault_common::{extension_of, CasePolicy, Error, Result};

use crate::config::DEFAULT_SEARCH_MIN_LEN;

/// Location of one stored file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Logical name, unique in the index.
    pub name: String,
    /// Container holding the bytes.
    pub data_id: u32,
    /// Byte offset within the container.
    pub offset: u64,
    /// Stored length in bytes.
    pub length: u64,
}

impl IndexEntry {
    /// Create an entry.
    pub fn new(name: impl Into<String>, data_id: u32, offset: u64, length: u64) -> Self {
        Self {
            name: name.into(),
            data_id,
            offset,
            length,
        }
    }

    /// Text after the last `.` of the name, or empty.
    pub fn extension(&self) -> &str {
        extension_of(&self.name)
    }
}

/// Ordering for extension listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    /// By name under the case policy.
    #[default]
    Name,
    /// By stored length, smallest first.
    Size,
}

/// In-memory index of a vault.
#[derive(Debug, Clone)]
pub struct IndexModel {
    policy: CasePolicy,
    search_min_len: usize,
    entries: Vec<IndexEntry>,
    by_name: HashMap<String, usize>,
}

impl IndexModel {
    /// Create an empty index.
    pub fn new(policy: CasePolicy) -> Self {
        Self::with_search_min_len(policy, DEFAULT_SEARCH_MIN_LEN)
    }

    /// Create an empty index with a custom search threshold.
    pub fn with_search_min_len(policy: CasePolicy, search_min_len: usize) -> Self {
        Self {
            policy,
            search_min_len,
            entries: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    /// Name comparison policy.
    pub fn policy(&self) -> CasePolicy {
        self.policy
    }

    /// Append an entry.
    ///
    /// # Postconditions
    /// - On success the entry is the last in iteration order
    /// - On failure the index is unchanged
    ///
    /// # Errors
    /// - `DuplicateName` if an entry with the same name exists
    pub fn add_entry(&mut self, entry: IndexEntry) -> Result<()> {
        let key = self.policy.key(&entry.name).into_owned();
        if self.by_name.contains_key(&key) {
            return Err(Error::DuplicateName(entry.name));
        }

        self.by_name.insert(key, self.entries.len());
        self.entries.push(entry);
        Ok(())
    }

    /// Whether `name` is already taken.
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(self.policy.key(name).as_ref())
    }

    /// Exact lookup.
    pub fn entry_by_name(&self, name: &str) -> Option<&IndexEntry> {
        self.by_name
            .get(self.policy.key(name).as_ref())
            .map(|&i| &self.entries[i])
    }

    /// Entries whose extension equals `extension`.
    pub fn entries_by_extension(&self, extension: &str, sort_by: SortBy) -> Vec<IndexEntry> {
        let wanted = self.policy.extension_key(extension);
        let mut matches: Vec<IndexEntry> = self
            .entries
            .iter()
            .filter(|e| self.policy.extension_key(e.extension()) == wanted)
            .cloned()
            .collect();

        match sort_by {
            SortBy::Name => matches.sort_by(|a, b| {
                self.policy
                    .key(&a.name)
                    .as_ref()
                    .cmp(self.policy.key(&b.name).as_ref())
            }),
            SortBy::Size => matches.sort_by_key(|e| e.length),
        }
        matches
    }

    /// Entries whose name contains `fragment`, in index order.
    ///
    /// Fragments shorter than the search threshold are not a filter and
    /// return every entry.
    pub fn entries_by_partial_name(&self, fragment: &str) -> Vec<IndexEntry> {
        if fragment.chars().count() < self.search_min_len {
            return self.entries.clone();
        }
        self.entries
            .iter()
            .filter(|e| self.policy.contains(&e.name, fragment))
            .cloned()
            .collect()
    }

    /// Number of entries.
    pub fn row_count(&self) -> u64 {
        self.entries.len() as u64
    }

    /// Whether the index has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in insertion order.
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.iter()
    }

    /// Sum of all entry lengths.
    pub fn total_length(&self) -> u64 {
        self.entries.iter().map(|e| e.length).sum()
    }

    /// Number of containers the entries span (highest `data_id` + 1).
    pub fn container_count(&self) -> u32 {
        self.entries
            .iter()
            .map(|e| e.data_id.saturating_add(1))
            .max()
            .unwrap_or(0)
    }
}
