//! Container I/O for resvault.
//!
//! A vault keeps entry bytes in numbered data containers. This module
//! provides a trait-based interface over them with a local filesystem
//! backend and an in-memory backend, plus the size-ceiling placement policy
//! that decides which container receives the next write.
//!
//! # Design Principles
//! - Positioned reads are bounds-checked against the physical size
//! - Writes only ever append; existing bytes are never rewritten
//! - A container is open for reading or appending, never both at once
//! - Handles are released on close, on drop and on every error path

pub mod local;
pub mod memory;
pub mod placement;
pub mod provider;

pub use local::{container_file_name, parse_container_file_name, LocalContainers, INDEX_FILE_NAME};
pub use memory::MemoryContainers;
pub use placement::{Placement, Slot};
pub use provider::{AccessMode, ContainerStore, MAX_CONTAINERS};
