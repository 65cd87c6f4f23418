//! In-memory container store for testing.

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;

use crate::provider::{check_bounds, AccessMode, ContainerStore, MAX_CONTAINERS};
use resvault_common::{Error, Result};

/// In-memory container store.
///
/// Useful for testing the engine without touching disk. Containers are
/// plain byte vectors and are lost on drop.
#[derive(Default)]
pub struct MemoryContainers {
    containers: HashMap<u32, Vec<u8>>,
    modes: HashMap<u32, AccessMode>,
    capacity: Option<u64>,
}

impl MemoryContainers {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit the total bytes the store accepts. Appends that would go past
    /// the limit fail like a full disk would.
    pub fn with_capacity_limit(mut self, limit: u64) -> Self {
        self.capacity = Some(limit);
        self
    }

    /// Raw bytes of a container, as stored.
    pub fn raw(&self, data_id: u32) -> Option<&[u8]> {
        self.containers.get(&data_id).map(Vec::as_slice)
    }

    fn total_bytes(&self) -> u64 {
        self.containers.values().map(|c| c.len() as u64).sum()
    }

    fn missing(data_id: u32) -> Error {
        Error::ContainerMissing {
            data_id,
            path: PathBuf::from(format!("memory://{}", data_id)),
        }
    }

    fn set_mode(&mut self, data_id: u32, mode: AccessMode) {
        self.modes.insert(data_id, mode);
    }
}

impl ContainerStore for MemoryContainers {
    fn name(&self) -> &str {
        "memory"
    }

    fn exists(&self, data_id: u32) -> bool {
        self.containers.contains_key(&data_id)
    }

    fn size(&self, data_id: u32) -> Result<u64> {
        self.containers
            .get(&data_id)
            .map(|c| c.len() as u64)
            .ok_or_else(|| Self::missing(data_id))
    }

    fn create(&mut self, data_id: u32) -> Result<()> {
        if data_id >= MAX_CONTAINERS {
            return Err(Error::InvalidInput(format!(
                "Container id {} exceeds the limit of {} containers",
                data_id, MAX_CONTAINERS
            )));
        }
        self.modes.remove(&data_id);
        self.containers.insert(data_id, Vec::new());
        Ok(())
    }

    fn read(&mut self, data_id: u32, offset: u64, length: u64) -> Result<Vec<u8>> {
        let container = self
            .containers
            .get(&data_id)
            .ok_or_else(|| Self::missing(data_id))?;
        check_bounds(data_id, offset, length, container.len() as u64)?;

        let start = offset as usize;
        let bytes = container[start..start + length as usize].to_vec();
        self.set_mode(data_id, AccessMode::Read);
        Ok(bytes)
    }

    fn append(&mut self, data_id: u32, bytes: &[u8]) -> Result<u64> {
        if !self.containers.contains_key(&data_id) {
            return Err(Self::missing(data_id));
        }

        if let Some(limit) = self.capacity {
            if self.total_bytes() + bytes.len() as u64 > limit {
                return Err(Error::io(
                    format!("appending to memory://{}", data_id),
                    io::Error::new(io::ErrorKind::Other, "capacity limit reached"),
                ));
            }
        }

        let container = self
            .containers
            .get_mut(&data_id)
            .ok_or_else(|| Self::missing(data_id))?;
        let offset = container.len() as u64;
        container.extend_from_slice(bytes);
        self.set_mode(data_id, AccessMode::Append);
        Ok(offset)
    }

    fn truncate(&mut self, data_id: u32, len: u64) -> Result<()> {
        let container = self
            .containers
            .get_mut(&data_id)
            .ok_or_else(|| Self::missing(data_id))?;
        container.truncate(len as usize);
        self.modes.remove(&data_id);
        Ok(())
    }

    fn remove(&mut self, data_id: u32) -> Result<()> {
        self.modes.remove(&data_id);
        self.containers.remove(&data_id);
        Ok(())
    }

    fn open_mode(&self, data_id: u32) -> Option<AccessMode> {
        self.modes.get(&data_id).copied()
    }

    fn open_handles(&self) -> usize {
        self.modes.len()
    }

    fn close(&mut self, data_id: u32) {
        self.modes.remove(&data_id);
    }

    fn close_all(&mut self) {
        self.modes.clear();
    }

    fn container_ids(&self) -> Result<Vec<u32>> {
        let mut ids: Vec<u32> = self.containers.keys().copied().collect();
        ids.sort_unstable();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_append_and_read() {
        let mut store = MemoryContainers::new();
        store.create(0).unwrap();

        assert_eq!(store.append(0, b"abc").unwrap(), 0);
        assert_eq!(store.append(0, b"defg").unwrap(), 3);
        assert_eq!(store.read(0, 2, 3).unwrap(), b"cde");
        assert_eq!(store.size(0).unwrap(), 7);
        assert_eq!(store.raw(0), Some(&b"abcdefg"[..]));
    }

    #[test]
    fn test_memory_tracks_modes() {
        let mut store = MemoryContainers::new();
        store.create(0).unwrap();
        store.create(1).unwrap();

        store.append(0, b"x").unwrap();
        store.read(0, 0, 1).unwrap();
        store.append(1, b"y").unwrap();

        assert_eq!(store.open_mode(0), Some(AccessMode::Read));
        assert_eq!(store.open_mode(1), Some(AccessMode::Append));
        assert_eq!(store.open_handles(), 2);

        store.close(0);
        assert_eq!(store.open_handles(), 1);
    }

    #[test]
    fn test_memory_errors() {
        let mut store = MemoryContainers::new();
        assert!(matches!(
            store.read(0, 0, 1).unwrap_err(),
            Error::ContainerMissing { data_id: 0, .. }
        ));

        store.create(0).unwrap();
        store.append(0, b"12345").unwrap();
        assert!(matches!(
            store.read(0, 4, 2).unwrap_err(),
            Error::OutOfBounds { size: 5, .. }
        ));
    }

    #[test]
    fn test_memory_capacity_limit() {
        let mut store = MemoryContainers::new().with_capacity_limit(8);
        store.create(0).unwrap();

        store.append(0, b"12345").unwrap();
        let err = store.append(0, b"6789").unwrap_err();
        assert_eq!(err.kind(), "io");
        assert_eq!(store.size(0).unwrap(), 5);
    }
}
