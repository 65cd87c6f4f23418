//! Common utilities and types shared across resvault modules.
//!
//! This module provides the error taxonomy used by every crate in the
//! workspace together with the small naming helpers (case policy, extension
//! derivation, legacy code pages) that the index and the engine agree on.

pub mod error;
pub mod types;

pub use error::{Error, IoResultExt, Result};
pub use types::{extension_of, format_size, CasePolicy, TextEncoding};
