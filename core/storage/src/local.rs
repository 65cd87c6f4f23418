//! Local filesystem container store.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::provider::{check_bounds, AccessMode, ContainerStore, MAX_CONTAINERS};
use resvault_common::{Error, IoResultExt, Result};

/// File name of the index inside a vault directory.
pub const INDEX_FILE_NAME: &str = "data.000";

/// File name of the container holding `data_id`.
///
/// Container ids start at zero and map onto `data.001`, `data.002`, ...
pub fn container_file_name(data_id: u32) -> String {
    format!("data.{:03}", u64::from(data_id) + 1)
}

/// Inverse of [`container_file_name`]. Returns `None` for the index file and
/// for anything that is not a container.
pub fn parse_container_file_name(name: &str) -> Option<u32> {
    let digits = name.strip_prefix("data.")?;
    if digits.len() != 3 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let n: u32 = digits.parse().ok()?;
    if n == 0 {
        None
    } else {
        Some(n - 1)
    }
}

struct OpenContainer {
    file: File,
    mode: AccessMode,
    len: u64,
}

/// Container store backed by `data.NNN` files in one directory.
pub struct LocalContainers {
    root: PathBuf,
    handles: HashMap<u32, OpenContainer>,
}

impl LocalContainers {
    /// Create a store over `root`.
    ///
    /// # Postconditions
    /// - Root directory is created if it doesn't exist
    ///
    /// # Errors
    /// - Permission denied
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        if !root.exists() {
            fs::create_dir_all(&root).with_path("creating vault directory", &root)?;
        }

        Ok(Self {
            root,
            handles: HashMap::new(),
        })
    }

    /// Directory holding the containers.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Full path of a container file.
    pub fn container_path(&self, data_id: u32) -> PathBuf {
        self.root.join(container_file_name(data_id))
    }

    fn checked_path(&self, data_id: u32) -> Result<PathBuf> {
        if data_id >= MAX_CONTAINERS {
            return Err(Error::InvalidInput(format!(
                "Container id {} exceeds the limit of {} containers",
                data_id, MAX_CONTAINERS
            )));
        }
        Ok(self.container_path(data_id))
    }

    /// Get an open handle in `mode`, reopening if held in the other mode.
    fn handle(&mut self, data_id: u32, mode: AccessMode) -> Result<&mut OpenContainer> {
        if let Some(open) = self.handles.get(&data_id) {
            if open.mode != mode {
                debug!(data_id, ?mode, "Reopening container in new mode");
                self.handles.remove(&data_id);
            }
        }

        if !self.handles.contains_key(&data_id) {
            let path = self.checked_path(data_id)?;
            if !path.is_file() {
                return Err(Error::ContainerMissing { data_id, path });
            }

            let file = match mode {
                AccessMode::Read => File::open(&path),
                AccessMode::Append => OpenOptions::new().append(true).open(&path),
            }
            .with_path("opening container", &path)?;
            let len = file
                .metadata()
                .with_path("inspecting container", &path)?
                .len();

            debug!(data_id, ?mode, len, "Opened container");
            self.handles.insert(data_id, OpenContainer { file, mode, len });
        }

        self.handles
            .get_mut(&data_id)
            .ok_or_else(|| Error::InvalidState(format!("Container {} handle vanished", data_id)))
    }
}

impl ContainerStore for LocalContainers {
    fn name(&self) -> &str {
        "local"
    }

    fn exists(&self, data_id: u32) -> bool {
        data_id < MAX_CONTAINERS && self.container_path(data_id).is_file()
    }

    fn size(&self, data_id: u32) -> Result<u64> {
        if let Some(open) = self.handles.get(&data_id) {
            if open.mode == AccessMode::Append {
                return Ok(open.len);
            }
        }

        let path = self.checked_path(data_id)?;
        match fs::metadata(&path) {
            Ok(meta) if meta.is_file() => Ok(meta.len()),
            _ => Err(Error::ContainerMissing { data_id, path }),
        }
    }

    fn create(&mut self, data_id: u32) -> Result<()> {
        let path = self.checked_path(data_id)?;
        self.close(data_id);
        File::create(&path).with_path("creating container", &path)?;
        debug!(data_id, path = %path.display(), "Created container");
        Ok(())
    }

    fn read(&mut self, data_id: u32, offset: u64, length: u64) -> Result<Vec<u8>> {
        let path = self.checked_path(data_id)?;
        let open = self.handle(data_id, AccessMode::Read)?;

        // Size is re-read so external truncation surfaces as a bounds error.
        open.len = open
            .file
            .metadata()
            .with_path("inspecting container", &path)?
            .len();
        check_bounds(data_id, offset, length, open.len)?;

        let length = usize::try_from(length).map_err(|_| {
            Error::InvalidInput(format!("Read of {} bytes does not fit in memory", length))
        })?;
        let mut buf = vec![0u8; length];
        open.file
            .seek(SeekFrom::Start(offset))
            .with_path("seeking in container", &path)?;
        open.file
            .read_exact(&mut buf)
            .with_path("reading container", &path)?;
        Ok(buf)
    }

    fn append(&mut self, data_id: u32, bytes: &[u8]) -> Result<u64> {
        let path = self.checked_path(data_id)?;
        let open = self.handle(data_id, AccessMode::Append)?;
        let offset = open.len;

        if let Err(e) = open.file.write_all(bytes).and_then(|_| open.file.flush()) {
            warn!(data_id, offset, "Append failed, rolling container back");
            if let Err(rollback) = open.file.set_len(offset) {
                warn!(
                    data_id,
                    offset,
                    error = %rollback,
                    "Rollback failed, container keeps partial bytes"
                );
            }
            self.handles.remove(&data_id);
            return Err(Error::io(format!("appending to {}", path.display()), e));
        }

        open.len += bytes.len() as u64;
        Ok(offset)
    }

    fn truncate(&mut self, data_id: u32, len: u64) -> Result<()> {
        let path = self.checked_path(data_id)?;
        self.close(data_id);
        if !path.is_file() {
            return Err(Error::ContainerMissing { data_id, path });
        }
        let file = OpenOptions::new()
            .write(true)
            .open(&path)
            .with_path("opening container", &path)?;
        file.set_len(len).with_path("truncating container", &path)?;
        Ok(())
    }

    fn remove(&mut self, data_id: u32) -> Result<()> {
        let path = self.checked_path(data_id)?;
        self.close(data_id);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(data_id, path = %path.display(), "Removed container");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io(format!("removing {}", path.display()), e)),
        }
    }

    fn open_mode(&self, data_id: u32) -> Option<AccessMode> {
        self.handles.get(&data_id).map(|open| open.mode)
    }

    fn open_handles(&self) -> usize {
        self.handles.len()
    }

    fn close(&mut self, data_id: u32) {
        if self.handles.remove(&data_id).is_some() {
            debug!(data_id, "Closed container");
        }
    }

    fn close_all(&mut self) {
        if !self.handles.is_empty() {
            debug!(count = self.handles.len(), "Closing all containers");
        }
        self.handles.clear();
    }

    fn container_ids(&self) -> Result<Vec<u32>> {
        let mut ids = Vec::new();
        let entries = fs::read_dir(&self.root).with_path("listing", &self.root)?;
        for entry in entries {
            let entry = entry.with_path("listing", &self.root)?;
            let name = entry.file_name();
            if let Some(id) = name.to_str().and_then(parse_container_file_name) {
                if entry.path().is_file() {
                    ids.push(id);
                }
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_container_names() {
        assert_eq!(container_file_name(0), "data.001");
        assert_eq!(container_file_name(7), "data.008");
        assert_eq!(container_file_name(u32::MAX), "data.4294967296");
        assert_eq!(parse_container_file_name("data.001"), Some(0));
        assert_eq!(parse_container_file_name("data.000"), None);
        assert_eq!(parse_container_file_name("data.01"), None);
        assert_eq!(parse_container_file_name("notes.txt"), None);
    }

    #[test]
    fn test_local_append_and_read() {
        let temp = TempDir::new().unwrap();
        let mut store = LocalContainers::new(temp.path()).unwrap();

        store.create(0).unwrap();
        assert_eq!(store.append(0, b"0123456789").unwrap(), 0);
        assert_eq!(store.append(0, b"abcdef").unwrap(), 10);
        assert_eq!(store.size(0).unwrap(), 16);

        assert_eq!(store.read(0, 10, 6).unwrap(), b"abcdef");
        assert_eq!(store.read(0, 3, 4).unwrap(), b"3456");
    }

    #[test]
    fn test_local_modes_are_exclusive() {
        let temp = TempDir::new().unwrap();
        let mut store = LocalContainers::new(temp.path()).unwrap();

        store.create(0).unwrap();
        store.append(0, b"hello").unwrap();
        assert_eq!(store.open_mode(0), Some(AccessMode::Append));

        store.read(0, 0, 5).unwrap();
        assert_eq!(store.open_mode(0), Some(AccessMode::Read));
        assert_eq!(store.open_handles(), 1);

        store.close_all();
        assert_eq!(store.open_handles(), 0);
    }

    #[test]
    fn test_local_out_of_bounds() {
        let temp = TempDir::new().unwrap();
        let mut store = LocalContainers::new(temp.path()).unwrap();

        store.create(0).unwrap();
        store.append(0, b"short").unwrap();

        let err = store.read(0, 2, 10).unwrap_err();
        assert!(matches!(
            err,
            Error::OutOfBounds {
                data_id: 0,
                offset: 2,
                length: 10,
                size: 5
            }
        ));
    }

    #[test]
    fn test_local_missing_container() {
        let temp = TempDir::new().unwrap();
        let mut store = LocalContainers::new(temp.path()).unwrap();

        assert!(!store.exists(3));
        assert!(matches!(
            store.read(3, 0, 1).unwrap_err(),
            Error::ContainerMissing { data_id: 3, .. }
        ));
        assert!(matches!(
            store.append(3, b"x").unwrap_err(),
            Error::ContainerMissing { data_id: 3, .. }
        ));
    }

    #[test]
    fn test_local_external_truncation_detected() {
        let temp = TempDir::new().unwrap();
        let mut store = LocalContainers::new(temp.path()).unwrap();

        store.create(0).unwrap();
        store.append(0, &[7u8; 64]).unwrap();
        store.read(0, 0, 64).unwrap();

        let file = OpenOptions::new()
            .write(true)
            .open(store.container_path(0))
            .unwrap();
        file.set_len(16).unwrap();

        assert!(matches!(
            store.read(0, 0, 64).unwrap_err(),
            Error::OutOfBounds { size: 16, .. }
        ));
    }

    #[test]
    fn test_local_container_ids_and_truncate() {
        let temp = TempDir::new().unwrap();
        let mut store = LocalContainers::new(temp.path()).unwrap();

        store.create(1).unwrap();
        store.create(0).unwrap();
        fs::write(temp.path().join(INDEX_FILE_NAME), b"index").unwrap();
        fs::write(temp.path().join("readme.txt"), b"x").unwrap();

        assert_eq!(store.container_ids().unwrap(), vec![0, 1]);

        store.append(1, b"0123456789").unwrap();
        store.truncate(1, 4).unwrap();
        assert_eq!(store.size(1).unwrap(), 4);

        store.remove(1).unwrap();
        store.remove(1).unwrap();
        assert_eq!(store.container_ids().unwrap(), vec![0]);
    }

    #[test]
    fn test_local_id_limit() {
        let temp = TempDir::new().unwrap();
        let mut store = LocalContainers::new(temp.path()).unwrap();
        assert!(matches!(
            store.create(MAX_CONTAINERS).unwrap_err(),
            Error::InvalidInput(_)
        ));
        assert!(matches!(
            store.read(u32::MAX, 0, 1).unwrap_err(),
            Error::InvalidInput(_)
        ));
        assert!(matches!(
            store.append(u32::MAX, b"x").unwrap_err(),
            Error::InvalidInput(_)
        ));
    }
}
