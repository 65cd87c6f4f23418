//! Container store trait definition.

use resvault_common::Result;

/// Highest number of data containers a vault may hold.
///
/// Containers are named `data.001` through `data.999`; `data.000` is the
/// index.
pub const MAX_CONTAINERS: u32 = 999;

/// How a container handle is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Positioned reads only (browsing, export).
    Read,
    /// Writes at end-of-file only (build, import).
    Append,
}

/// Storage backend for numbered data containers.
///
/// Handles are opened lazily by `read` and `append`. Opening a container in
/// one mode closes any handle held in the other mode first.
pub trait ContainerStore: Send {
    /// Get the backend name (e.g., "local", "memory").
    fn name(&self) -> &str;

    /// Check whether a container has a backing file.
    fn exists(&self, data_id: u32) -> bool;

    /// Physical size of a container in bytes.
    ///
    /// # Errors
    /// - `ContainerMissing` if there is no backing file
    fn size(&self, data_id: u32) -> Result<u64>;

    /// Create an empty container, replacing any existing one.
    fn create(&mut self, data_id: u32) -> Result<()>;

    /// Read `length` bytes starting at `offset`.
    ///
    /// # Preconditions
    /// - Container must exist
    ///
    /// # Errors
    /// - `ContainerMissing` if there is no backing file
    /// - `OutOfBounds` if `offset + length` exceeds the physical size
    fn read(&mut self, data_id: u32, offset: u64, length: u64) -> Result<Vec<u8>>;

    /// Append bytes at end-of-file.
    ///
    /// # Postconditions
    /// - Returns the offset at which the write began
    /// - On failure the container keeps its previous length
    ///
    /// # Errors
    /// - `ContainerMissing` if there is no backing file
    fn append(&mut self, data_id: u32, bytes: &[u8]) -> Result<u64>;

    /// Cut a container back to `len` bytes.
    fn truncate(&mut self, data_id: u32, len: u64) -> Result<()>;

    /// Delete a container. Removing a missing container is not an error.
    fn remove(&mut self, data_id: u32) -> Result<()>;

    /// Mode of the currently open handle, if any.
    fn open_mode(&self, data_id: u32) -> Option<AccessMode>;

    /// Number of open handles.
    fn open_handles(&self) -> usize;

    /// Release the handle for one container.
    fn close(&mut self, data_id: u32);

    /// Release every handle.
    fn close_all(&mut self);

    /// Ids of every container currently present, ascending.
    fn container_ids(&self) -> Result<Vec<u32>>;
}

/// Check a requested range against a container's size.
pub(crate) fn check_bounds(data_id: u32, offset: u64, length: u64, size: u64) -> Result<()> {
    match offset.checked_add(length) {
        Some(end) if end <= size => Ok(()),
        _ => Err(resvault_common::Error::OutOfBounds {
            data_id,
            offset,
            length,
            size,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_bounds() {
        assert!(check_bounds(0, 0, 10, 10).is_ok());
        assert!(check_bounds(0, 10, 0, 10).is_ok());
        assert!(check_bounds(0, 5, 6, 10).is_err());
        assert!(check_bounds(0, u64::MAX, 2, 10).is_err());
    }
}
