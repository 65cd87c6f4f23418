//! Vault engine for resvault.
//!
//! This module provides:
//! - Building a vault from a directory of loose files
//! - Loading, saving and validating the index file
//! - Incremental import and export of single entries
//! - Per-extension statistics and encryption policy
//! - Progress notifications for long-running operations
//!
//! # Architecture
//! [`VaultEngine`] is the only type callers drive. It owns the index, the
//! extension catalog and a container store, and applies the extension
//! cipher transparently on every write and read.

pub mod catalog;
pub mod config;
pub mod engine;
pub mod format;
pub mod index;
pub mod progress;
pub mod report;

pub use catalog::{ExtensionCatalog, ExtensionInfo, Registration};
pub use config::EngineConfig;
pub use engine::{VaultEngine, VaultState, BACKUP_FILE_NAME};
pub use format::IndexFile;
pub use index::{IndexEntry, IndexModel, SortBy};
pub use progress::{NullObserver, ProgressEvent, ProgressObserver};
pub use report::{BatchFailure, BatchReport};
