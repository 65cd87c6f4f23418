//! Vault engine: build, load, save, import, export and query a vault.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use resvault_common::{extension_of, Error, IoResultExt, Result, TextEncoding};
use resvault_crypto::{digest, digest_file, Digest, XorCipher};
use resvault_storage::{ContainerStore, LocalContainers, Placement, Slot, INDEX_FILE_NAME};

use crate::catalog::{ExtensionCatalog, ExtensionInfo, Registration};
use crate::config::EngineConfig;
use crate::format::IndexFile;
use crate::index::{IndexEntry, IndexModel, SortBy};
use crate::progress::{notify, warn_observer, NullObserver, ProgressObserver, Ticker};
use crate::report::BatchReport;

/// Copy of the previous index kept by `save` when backups are enabled.
pub const BACKUP_FILE_NAME: &str = "data.000.bak";

/// Lifecycle of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VaultState {
    /// No vault.
    Empty,
    /// A build is running.
    Building,
    /// A vault was built by this engine.
    Built,
    /// A vault was loaded from an index file.
    Loaded,
    /// An import is running.
    Importing,
    /// An export is running.
    Exporting,
    /// The engine was closed.
    Closed,
}

impl VaultState {
    /// Whether a vault is available.
    pub fn is_open(self) -> bool {
        matches!(
            self,
            Self::Built | Self::Loaded | Self::Importing | Self::Exporting
        )
    }
}

impl fmt::Display for VaultState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Empty => "empty",
            Self::Building => "building",
            Self::Built => "built",
            Self::Loaded => "loaded",
            Self::Importing => "importing",
            Self::Exporting => "exporting",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// The open vault: containers, index and catalog.
struct Vault {
    root: PathBuf,
    store: Box<dyn ContainerStore>,
    index: IndexModel,
    catalog: ExtensionCatalog,
}

impl Vault {
    fn new(root: impl Into<PathBuf>, store: Box<dyn ContainerStore>, config: &EngineConfig) -> Self {
        Self {
            root: root.into(),
            store,
            index: IndexModel::with_search_min_len(config.case_policy, config.search_min_len),
            catalog: ExtensionCatalog::new(config.case_policy, &config.encrypted_extensions),
        }
    }

    /// Placement continuing the highest existing container.
    fn append_placement(&self, ceiling: u64) -> Result<Placement> {
        let highest = self
            .store
            .container_ids()?
            .into_iter()
            .max()
            .or_else(|| self.index.container_count().checked_sub(1));

        match highest {
            Some(id) if self.store.exists(id) => {
                Ok(Placement::resume(ceiling, id, self.store.size(id)?))
            }
            _ => Ok(Placement::new(ceiling)),
        }
    }

    /// Store `bytes` under `name` and index them.
    ///
    /// # Postconditions
    /// - On success the entry is indexed and the catalog is invalidated
    /// - On failure the index, the catalog and every container keep their
    ///   previous contents
    ///
    /// # Errors
    /// - `DuplicateName` if the name is taken
    /// - `InvalidInput` if the name cannot be stored in the code page
    /// - Container failures
    fn insert(
        &mut self,
        name: String,
        mut bytes: Vec<u8>,
        placement: &mut Placement,
        cipher: &XorCipher,
        encoding: TextEncoding,
    ) -> Result<(IndexEntry, Registration)> {
        if self.index.contains(&name) {
            return Err(Error::DuplicateName(name));
        }
        encoding.encode(&name)?;

        let extension = extension_of(&name).to_string();
        let requested = self.catalog.policy_flag(&extension);
        let encrypted = self.catalog.is_encrypted(&extension);
        if encrypted {
            cipher.apply(&mut bytes);
        }

        let length = bytes.len() as u64;
        let slot = placement.plan(length)?;
        let data_id = slot.data_id();
        if let Slot::Fresh(id) = slot {
            self.store.create(id)?;
        }

        let offset = match self.store.append(data_id, &bytes) {
            Ok(offset) => offset,
            Err(e) => {
                if let Slot::Fresh(id) = slot {
                    if let Err(rollback) = self.store.remove(id) {
                        warn!(data_id = id, error = %rollback, "Could not remove fresh container");
                    }
                }
                return Err(e);
            }
        };
        placement.commit(slot, length);

        let entry = IndexEntry::new(name, data_id, offset, length);
        self.index.add_entry(entry.clone())?;
        let registration = self.catalog.register(&extension, requested);
        self.catalog.invalidate();

        debug!(
            name = %entry.name,
            data_id,
            offset,
            length,
            encrypted,
            "Stored entry"
        );
        Ok((entry, registration))
    }

    /// Read an entry's bytes, reversing the cipher where applicable.
    fn read_entry(&mut self, entry: &IndexEntry, cipher: &XorCipher) -> Result<Vec<u8>> {
        let mut bytes = self
            .store
            .read(entry.data_id, entry.offset, entry.length)?;
        if self.catalog.is_encrypted(entry.extension()) {
            cipher.apply(&mut bytes);
        }
        Ok(bytes)
    }

    fn lookup(&self, name: &str) -> Result<IndexEntry> {
        self.index
            .entry_by_name(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("No entry named '{}'", name)))
    }
}

/// Façade over one vault.
///
/// Long operations report through the [`ProgressObserver`] given at
/// construction. The engine is synchronous; callers that need a responsive
/// thread move it onto a worker.
pub struct VaultEngine {
    config: EngineConfig,
    encoding: TextEncoding,
    cipher: XorCipher,
    observer: Box<dyn ProgressObserver>,
    state: VaultState,
    vault: Option<Vault>,
}

impl VaultEngine {
    /// Create an engine that discards progress notifications.
    ///
    /// # Errors
    /// - Invalid configuration (see [`EngineConfig::validate`])
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::with_observer(config, NullObserver)
    }

    /// Create an engine reporting to `observer`.
    ///
    /// # Errors
    /// - Invalid configuration (see [`EngineConfig::validate`])
    pub fn with_observer(
        config: EngineConfig,
        observer: impl ProgressObserver + 'static,
    ) -> Result<Self> {
        let encoding = config.validate()?;
        let cipher = XorCipher::from_seed(config.cipher_seed.as_bytes());

        Ok(Self {
            config,
            encoding,
            cipher,
            observer: Box::new(observer),
            state: VaultState::Empty,
            vault: None,
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> VaultState {
        self.state
    }

    /// Configuration the engine was built with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Code page used for names.
    pub fn encoding(&self) -> TextEncoding {
        self.encoding
    }

    /// Directory holding the open vault's containers.
    pub fn root(&self) -> Option<&Path> {
        self.vault.as_ref().map(|v| v.root.as_path())
    }

    /// Pack every regular file under `source_dir` into a new vault in
    /// `dest_dir`.
    ///
    /// # Preconditions
    /// - `source_dir` is a directory
    ///
    /// # Postconditions
    /// - Containers and `data.000` are written to `dest_dir`
    /// - State is `Built`; on failure it is `Empty` with no open handles
    ///
    /// # Errors
    /// - `DuplicateName` if two files share a name
    /// - `InvalidInput` for names the code page cannot hold
    /// - File system failures
    pub fn build(&mut self, source_dir: &Path, dest_dir: &Path) -> Result<()> {
        let store = LocalContainers::new(dest_dir)?;
        self.build_with_store(source_dir, dest_dir, Box::new(store))
    }

    /// Like [`build`](Self::build), writing container bytes to `store`.
    /// The index file is still written to `dest_dir`.
    pub fn build_with_store(
        &mut self,
        source_dir: &Path,
        dest_dir: &Path,
        store: Box<dyn ContainerStore>,
    ) -> Result<()> {
        self.release();
        info!(
            source = %source_dir.display(),
            dest = %dest_dir.display(),
            store = store.name(),
            "Building vault"
        );

        self.state = VaultState::Building;
        match self.run_build(source_dir, dest_dir, store) {
            Ok(vault) => {
                info!(entries = vault.index.row_count(), "Vault built");
                self.vault = Some(vault);
                self.state = VaultState::Built;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Build failed");
                self.state = VaultState::Empty;
                Err(e)
            }
        }
    }

    fn run_build(
        &mut self,
        source_dir: &Path,
        dest_dir: &Path,
        mut store: Box<dyn ContainerStore>,
    ) -> Result<Vault> {
        let files = collect_files(source_dir)?;
        fs::create_dir_all(dest_dir).with_path("creating", dest_dir)?;
        retire_index(dest_dir, self.config.backup)?;

        for id in store.container_ids()? {
            store.remove(id)?;
        }

        let mut vault = Vault::new(dest_dir, store, &self.config);
        let mut placement = Placement::new(self.config.max_container_size);
        let mut ticker = Ticker::start(self.observer.as_mut(), files.len() as u64);

        for path in &files {
            let name = logical_name(path)?;
            if vault.index.contains(&name) {
                return Err(Error::DuplicateName(name));
            }

            let bytes = fs::read(path).with_path("reading", path)?;
            vault.insert(name, bytes, &mut placement, &self.cipher, self.encoding)?;
            ticker.tick();
        }

        vault.store.close_all();
        write_index(&vault, dest_dir, self.encoding, self.config.backup)?;

        ticker.message(&format!(
            "Built {} entries in {} containers",
            vault.index.row_count(),
            vault.index.container_count()
        ));
        Ok(vault)
    }

    /// Open the vault described by `index_path`.
    ///
    /// Containers are looked for next to the index and opened lazily on
    /// first read.
    ///
    /// # Postconditions
    /// - State is `Loaded`; on failure it is `Empty` with no open handles
    ///
    /// # Errors
    /// - `CorruptIndex` if the index cannot be parsed
    /// - `ContainerMissing` if a referenced container does not exist
    /// - `OutOfBounds` if an entry reaches past its container
    pub fn load(&mut self, index_path: &Path) -> Result<()> {
        self.release();
        info!(path = %index_path.display(), "Loading vault");

        match self.run_load(index_path) {
            Ok(vault) => {
                info!(entries = vault.index.row_count(), "Vault loaded");
                self.vault = Some(vault);
                self.state = VaultState::Loaded;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Load failed");
                self.state = VaultState::Empty;
                Err(e)
            }
        }
    }

    fn run_load(&mut self, index_path: &Path) -> Result<Vault> {
        let bytes = fs::read(index_path).with_path("reading index", index_path)?;
        let file = IndexFile::decode(&bytes, self.encoding)?;

        let root = match index_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let store = LocalContainers::new(&root)?;
        let mut vault = Vault::new(root, Box::new(store), &self.config);

        let mut ticker = Ticker::start(self.observer.as_mut(), file.entries.len() as u64);

        if !file.encoding_label.eq_ignore_ascii_case(self.encoding.label()) {
            ticker.warning(&format!(
                "Index was written in {} but names are decoded as {}",
                file.encoding_label, self.encoding
            ));
        }
        if file.case_policy != self.config.case_policy {
            ticker.warning(&format!(
                "Index was written with {:?} names, comparing them as {:?}",
                file.case_policy, self.config.case_policy
            ));
        }

        for (extension, encrypted) in &file.extensions {
            vault.catalog.register(extension, *encrypted);
        }

        let mut sizes: HashMap<u32, u64> = HashMap::new();
        for entry in file.entries {
            if entry.data_id >= file.containers {
                return Err(Error::CorruptIndex(format!(
                    "entry '{}' names container {} of {}",
                    entry.name, entry.data_id, file.containers
                )));
            }

            let size = match sizes.get(&entry.data_id) {
                Some(&size) => size,
                None => {
                    let size = vault.store.size(entry.data_id)?;
                    sizes.insert(entry.data_id, size);
                    size
                }
            };
            if entry.offset.checked_add(entry.length).map_or(true, |end| end > size) {
                return Err(Error::OutOfBounds {
                    data_id: entry.data_id,
                    offset: entry.offset,
                    length: entry.length,
                    size,
                });
            }

            vault.index.add_entry(entry).map_err(|e| match e {
                Error::DuplicateName(name) => {
                    Error::CorruptIndex(format!("entry '{}' appears twice", name))
                }
                other => other,
            })?;
            ticker.tick();
        }

        ticker.message(&format!(
            "Loaded {} entries from {}",
            vault.index.row_count(),
            index_path.display()
        ));
        Ok(vault)
    }

    /// Write the index to `dest_dir/data.000`.
    ///
    /// The file is replaced atomically. With backups enabled an existing
    /// index is first copied to `data.000.bak`. Container bytes are never
    /// rewritten.
    ///
    /// # Errors
    /// - `InvalidState` if no vault is open
    /// - File system failures
    pub fn save(&mut self, dest_dir: &Path) -> Result<()> {
        let vault = open_vault(&mut self.vault, self.state, "save")?;
        fs::create_dir_all(dest_dir).with_path("creating", dest_dir)?;
        let path = write_index(vault, dest_dir, self.encoding, self.config.backup)?;
        if !same_dir(dest_dir, &vault.root) {
            warn_observer(
                self.observer.as_mut(),
                &format!(
                    "Index saved to {} but its containers stay in {}",
                    dest_dir.display(),
                    vault.root.display()
                ),
            );
        }
        notify(
            self.observer.as_mut(),
            &format!("Saved {} entries to {}", vault.index.row_count(), path.display()),
        );
        Ok(())
    }

    /// Add one file to the open vault under its file name.
    ///
    /// # Postconditions
    /// - The entry is indexed only if its bytes were fully written
    ///
    /// # Errors
    /// - `InvalidState` if no vault is open
    /// - `DuplicateName` if the name is taken
    /// - File system and container failures
    pub fn import_file_entry(&mut self, file_path: &Path) -> Result<IndexEntry> {
        let prior = self.state;
        let vault = open_vault(&mut self.vault, prior, "import")?;
        self.state = VaultState::Importing;

        let result = vault
            .append_placement(self.config.max_container_size)
            .and_then(|mut placement| {
                import_path(vault, file_path, &mut placement, &self.cipher, self.encoding)
            });
        self.state = prior;

        let (entry, registration) = result?;
        if let Registration::Conflict { kept } = registration {
            warn_observer(self.observer.as_mut(), &conflict_message(&entry, kept));
        }
        info!(name = %entry.name, data_id = entry.data_id, "Imported entry");
        Ok(entry)
    }

    /// Add several files, continuing past individual failures.
    ///
    /// # Errors
    /// - `InvalidState` if no vault is open
    /// - Failure to inspect the containers before the first import
    pub fn import_file_entries(&mut self, paths: &[PathBuf]) -> Result<BatchReport> {
        let prior = self.state;
        let vault = open_vault(&mut self.vault, prior, "import")?;
        let mut placement = vault.append_placement(self.config.max_container_size)?;
        self.state = VaultState::Importing;

        let mut report = BatchReport::new();
        {
            let mut ticker = Ticker::start(self.observer.as_mut(), paths.len() as u64);
            for path in paths {
                match import_path(vault, path, &mut placement, &self.cipher, self.encoding) {
                    Ok((entry, registration)) => {
                        if let Registration::Conflict { kept } = registration {
                            ticker.warning(&conflict_message(&entry, kept));
                        }
                        report.record_success(entry.name);
                    }
                    Err(e) => {
                        ticker.warning(&format!("Failed to import {}: {}", path.display(), e));
                        report.record_failure(path.display().to_string(), e);
                    }
                }
                ticker.tick();
            }
            ticker.message(&format!(
                "Imported {} of {} files",
                report.succeeded.len(),
                report.total()
            ));
        }

        self.state = prior;
        Ok(report)
    }

    /// Write one entry's original bytes to `dest_path`.
    ///
    /// Parent directories are created as needed.
    ///
    /// # Errors
    /// - `InvalidState` if no vault is open
    /// - `NotFound` if the entry is not in this vault
    /// - Container and file system failures
    pub fn export_file_entry(&mut self, dest_path: &Path, entry: &IndexEntry) -> Result<()> {
        let prior = self.state;
        let vault = open_vault(&mut self.vault, prior, "export")?;
        self.state = VaultState::Exporting;
        let result = vault
            .lookup(&entry.name)
            .and_then(|entry| export_to(vault, &entry, dest_path, &self.cipher));
        self.state = prior;
        result
    }

    /// Export every entry into `dest_dir`, in index order.
    ///
    /// # Errors
    /// - `InvalidState` if no vault is open
    /// - `dest_dir` cannot be created
    pub fn export_all_entries(&mut self, dest_dir: &Path) -> Result<BatchReport> {
        self.export_batch(dest_dir, None)
    }

    /// Export the entries with `extension` into `dest_dir/<extension>/`, in
    /// index order.
    ///
    /// # Errors
    /// - `InvalidState` if no vault is open
    /// - The destination directory cannot be created
    pub fn export_ext_entries(&mut self, dest_dir: &Path, extension: &str) -> Result<BatchReport> {
        self.export_batch(dest_dir, Some(extension))
    }

    fn export_batch(&mut self, dest_dir: &Path, extension: Option<&str>) -> Result<BatchReport> {
        let prior = self.state;
        let vault = open_vault(&mut self.vault, prior, "export")?;

        let policy = vault.index.policy();
        let (target, entries): (PathBuf, Vec<IndexEntry>) = match extension {
            Some(ext) => {
                let key = policy.extension_key(ext);
                let entries = vault
                    .index
                    .iter()
                    .filter(|e| policy.extension_key(e.extension()) == key)
                    .cloned()
                    .collect();
                (dest_dir.join(key), entries)
            }
            None => (dest_dir.to_path_buf(), vault.index.entries().to_vec()),
        };

        fs::create_dir_all(&target).with_path("creating", &target)?;
        info!(dest = %target.display(), count = entries.len(), "Exporting entries");
        self.state = VaultState::Exporting;

        let mut report = BatchReport::new();
        {
            let mut ticker = Ticker::start(self.observer.as_mut(), entries.len() as u64);
            for entry in &entries {
                let result = entry_path(&target, &entry.name)
                    .and_then(|path| export_to(vault, entry, &path, &self.cipher));
                match result {
                    Ok(()) => report.record_success(entry.name.clone()),
                    Err(e) => {
                        ticker.warning(&format!("Failed to export {}: {}", entry.name, e));
                        report.record_failure(entry.name.clone(), e);
                    }
                }
                ticker.tick();
            }
            ticker.message(&format!(
                "Exported {} of {} entries to {}",
                report.succeeded.len(),
                report.total(),
                target.display()
            ));
        }

        self.state = prior;
        Ok(report)
    }

    /// Original bytes of the entry called `name`.
    ///
    /// # Errors
    /// - `InvalidState` if no vault is open
    /// - `NotFound` if there is no such entry
    /// - Container failures
    pub fn get_file_bytes(&mut self, name: &str) -> Result<Vec<u8>> {
        let vault = open_vault(&mut self.vault, self.state, "read")?;
        let entry = vault.lookup(name)?;
        vault.read_entry(&entry, &self.cipher)
    }

    /// Digest of an entry's original bytes.
    pub fn entry_digest(&mut self, name: &str) -> Result<Digest> {
        Ok(digest(&self.get_file_bytes(name)?))
    }

    /// Whether an entry's original bytes equal the contents of `path`.
    ///
    /// # Errors
    /// - Everything [`get_file_bytes`](Self::get_file_bytes) reports
    /// - `path` cannot be read
    pub fn compare_with_file(&mut self, name: &str, path: &Path) -> Result<bool> {
        let stored = self.entry_digest(name)?;
        let other = digest_file(path)?;
        let same = stored.ct_eq(&other);
        debug!(name, path = %path.display(), same, "Compared entry with file");
        Ok(same)
    }

    /// Exact lookup by name.
    pub fn get_entry(&self, name: &str) -> Option<IndexEntry> {
        self.vault
            .as_ref()
            .and_then(|v| v.index.entry_by_name(name).cloned())
    }

    /// Every entry, in index order.
    pub fn entries(&self) -> &[IndexEntry] {
        self.vault
            .as_ref()
            .map(|v| v.index.entries())
            .unwrap_or(&[])
    }

    /// Entries with `extension`, sorted.
    pub fn get_entries_by_extension(&self, extension: &str, sort_by: SortBy) -> Vec<IndexEntry> {
        self.vault
            .as_ref()
            .map(|v| v.index.entries_by_extension(extension, sort_by))
            .unwrap_or_default()
    }

    /// Entries whose name contains `fragment`. Short fragments match all.
    pub fn get_entries_by_partial_name(&self, fragment: &str) -> Vec<IndexEntry> {
        self.vault
            .as_ref()
            .map(|v| v.index.entries_by_partial_name(fragment))
            .unwrap_or_default()
    }

    /// One [`ExtensionInfo`] per extension in first-occurrence order.
    pub fn extension_list(&mut self) -> Vec<ExtensionInfo> {
        match self.vault.as_mut() {
            Some(v) => v.catalog.list_all(&v.index),
            None => Vec::new(),
        }
    }

    /// Whether entries with `extension` are stored encrypted.
    pub fn extension_encrypted(&self, extension: &str) -> bool {
        match self.vault.as_ref() {
            Some(v) => v.catalog.is_encrypted(extension),
            None => self.config.is_encrypted_extension(extension),
        }
    }

    /// Total stored bytes of `extension`; cached until the index changes.
    pub fn get_extension_size(&mut self, extension: &str) -> u64 {
        match self.vault.as_mut() {
            Some(v) => v.catalog.size_of(&v.index, extension),
            None => 0,
        }
    }

    /// Number of extension size scans performed on the open vault.
    pub fn size_scans(&self) -> u64 {
        self.vault.as_ref().map_or(0, |v| v.catalog.size_scans())
    }

    /// Number of entries.
    pub fn row_count(&self) -> u64 {
        self.vault.as_ref().map_or(0, |v| v.index.row_count())
    }

    /// Number of data containers the entries span.
    pub fn container_count(&self) -> u32 {
        self.vault.as_ref().map_or(0, |v| v.index.container_count())
    }

    /// Total stored bytes across all entries.
    pub fn total_size(&self) -> u64 {
        self.vault.as_ref().map_or(0, |v| v.index.total_length())
    }

    /// Number of open container handles.
    pub fn open_handles(&self) -> usize {
        self.vault.as_ref().map_or(0, |v| v.store.open_handles())
    }

    /// Release the vault and every handle.
    pub fn close(&mut self) {
        self.release();
        self.state = VaultState::Closed;
        debug!("Engine closed");
    }

    fn release(&mut self) {
        if let Some(mut vault) = self.vault.take() {
            vault.store.close_all();
            debug!(root = %vault.root.display(), "Released vault");
        }
    }
}

impl fmt::Debug for VaultEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultEngine")
            .field("state", &self.state)
            .field("encoding", &self.encoding)
            .field("root", &self.root())
            .field("rows", &self.row_count())
            .finish()
    }
}

fn open_vault<'a>(
    vault: &'a mut Option<Vault>,
    state: VaultState,
    action: &str,
) -> Result<&'a mut Vault> {
    match vault {
        Some(vault) if state.is_open() => Ok(vault),
        _ => Err(Error::InvalidState(format!(
            "Cannot {}: no vault is open (state: {})",
            action, state
        ))),
    }
}

fn collect_files(source_dir: &Path) -> Result<Vec<PathBuf>> {
    if !source_dir.is_dir() {
        return Err(Error::InvalidInput(format!(
            "Source {} is not a directory",
            source_dir.display()
        )));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(source_dir).sort_by_file_name() {
        let entry =
            entry.map_err(|e| Error::io(format!("walking {}", source_dir.display()), e.into()))?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    debug!(count = files.len(), "Collected source files");
    Ok(files)
}

fn logical_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            Error::InvalidInput(format!("{} has no usable file name", path.display()))
        })
}

/// Join a stored name onto `dir`, refusing anything but a plain file name.
fn entry_path(dir: &Path, name: &str) -> Result<PathBuf> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(dir.join(name)),
        _ => Err(Error::InvalidInput(format!(
            "Entry name '{}' is not a plain file name",
            name
        ))),
    }
}

fn import_path(
    vault: &mut Vault,
    path: &Path,
    placement: &mut Placement,
    cipher: &XorCipher,
    encoding: TextEncoding,
) -> Result<(IndexEntry, Registration)> {
    let name = logical_name(path)?;
    if vault.index.contains(&name) {
        return Err(Error::DuplicateName(name));
    }
    let bytes = fs::read(path).with_path("reading", path)?;
    vault.insert(name, bytes, placement, cipher, encoding)
}

fn export_to(vault: &mut Vault, entry: &IndexEntry, dest: &Path, cipher: &XorCipher) -> Result<()> {
    let bytes = vault.read_entry(entry, cipher)?;
    if let Some(parent) = dest.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_path("creating", parent)?;
        }
    }
    fs::write(dest, &bytes).with_path("writing", dest)?;
    debug!(name = %entry.name, dest = %dest.display(), "Exported entry");
    Ok(())
}

fn conflict_message(entry: &IndexEntry, kept: bool) -> String {
    format!(
        "Extension '{}' of {} is already registered as {}; keeping that",
        entry.extension(),
        entry.name,
        if kept { "encrypted" } else { "plain" }
    )
}

/// Serialize the index into `dir` through a temporary file.
fn same_dir(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Move an existing index out of the way before its containers are replaced,
/// so an interrupted build never leaves it pointing at foreign bytes.
fn retire_index(dir: &Path, backup: bool) -> Result<()> {
    let path = dir.join(INDEX_FILE_NAME);
    if !path.is_file() {
        return Ok(());
    }

    if backup {
        let backup_path = dir.join(BACKUP_FILE_NAME);
        fs::rename(&path, &backup_path).with_path("backing up", &path)?;
        debug!(backup = %backup_path.display(), "Moved previous index aside");
    } else {
        fs::remove_file(&path).with_path("removing", &path)?;
        debug!(path = %path.display(), "Removed previous index");
    }
    Ok(())
}

fn write_index(
    vault: &Vault,
    dir: &Path,
    encoding: TextEncoding,
    backup: bool,
) -> Result<PathBuf> {
    let file = IndexFile {
        case_policy: vault.index.policy(),
        saved_at: Utc::now(),
        encoding_label: encoding.label().to_string(),
        containers: vault.index.container_count(),
        extensions: vault.catalog.registered(),
        entries: vault.index.entries().to_vec(),
    };
    let bytes = file.encode(encoding)?;

    let path = dir.join(INDEX_FILE_NAME);
    if backup && path.is_file() {
        let backup_path = dir.join(BACKUP_FILE_NAME);
        fs::copy(&path, &backup_path).with_path("backing up", &path)?;
        debug!(backup = %backup_path.display(), "Backed up previous index");
    }

    let mut temp = tempfile::NamedTempFile::new_in(dir).with_path("staging index in", dir)?;
    temp.write_all(&bytes).with_path("staging", &path)?;
    temp.as_file().sync_all().with_path("syncing", &path)?;
    temp.persist(&path)
        .map_err(|e| Error::io(format!("replacing {}", path.display()), e.error))?;

    debug!(path = %path.display(), bytes = bytes.len(), "Wrote index");
    Ok(path)
}
