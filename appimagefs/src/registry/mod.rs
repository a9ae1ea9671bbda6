//! Registry of AppImages exposed through the filesystem.
//!
//! The registry maps integer ids to [`PackageRecord`]s. Ids come from a
//! monotonic counter and are never reused. A file can be registered at most
//! once; paths are canonicalized before comparison.
//!
//! # Locking
//!
//! All state sits behind one mutex which is only held while the map itself is
//! touched. Opening backing files and checking for their existence on disk
//! happen outside the lock, so a slow disk never stalls other requests.
//!
//! # Lazy eviction
//!
//! Entries whose backing file disappeared are removed the next time
//! [`Registry::resolve`] or [`Registry::list`] touches them. Callers racing a
//! deletion may see different answers: one may still get the record while
//! the other already gets `NotFound`. Eviction itself is idempotent.

mod record;

pub use record::PackageRecord;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::{FsError, FsResult};

/// Mutable registry state guarded by the registry lock.
#[derive(Debug, Default)]
struct RegistryState {
    entries: HashMap<u32, Arc<PackageRecord>>,
    next_id: u32,
}

impl RegistryState {
    /// Linear search for a record with the given canonical path.
    fn find_by_path(&self, path: &Path) -> FsResult<Option<u32>> {
        let mut found: Option<&Arc<PackageRecord>> = None;

        for record in self.entries.values() {
            if record.path() != path {
                continue;
            }
            match found {
                None => found = Some(record),
                Some(first) => {
                    first.same_package(record)?;
                    // Same id stored under two keys
                    return Err(FsError::DuplicateCorruption {
                        id_a: first.id(),
                        id_b: record.id(),
                    });
                }
            }
        }

        Ok(found.map(|r| r.id()))
    }
}

/// Registry of known AppImages, shared by every request handler.
#[derive(Debug, Default)]
pub struct Registry {
    state: Mutex<RegistryState>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries, including ones not yet found to be missing.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Whether the registry holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register an AppImage and return its id.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotFound`] if `path` is not an existing regular file
    /// - [`FsError::AlreadyRegistered`] with the existing id if the file is
    ///   registered already (not a failure from the user's point of view)
    /// - [`FsError::DuplicateCorruption`] if the registry holds the file twice
    /// - [`FsError::OpenFailed`] if the file cannot be opened for reading
    pub fn register(&self, path: impl AsRef<Path>) -> FsResult<u32> {
        let path = path.as_ref();

        if !path.is_file() {
            return Err(FsError::NotFound(path.display().to_string()));
        }
        let canonical = fs::canonicalize(path)
            .map_err(|_| FsError::NotFound(path.display().to_string()))?;

        if let Some(existing) = self.lookup_path(&canonical)? {
            return Err(FsError::AlreadyRegistered(existing));
        }

        // Open before taking the lock; the id is filled in below
        let opened = PackageRecord::open(0, canonical.clone())?;

        let id = {
            let mut state = self.state.lock();

            // Another caller may have registered the same file meanwhile
            if let Some(existing) = state.find_by_path(&canonical)? {
                return Err(FsError::AlreadyRegistered(existing));
            }

            let id = state.next_id;
            state.next_id = id.checked_add(1).ok_or(FsError::IdsExhausted)?;
            state.entries.insert(id, Arc::new(opened.with_id(id)));
            id
        };

        info!(id = %format!("{:04}", id), path = %canonical.display(), "Registered new AppImage");
        Ok(id)
    }

    /// Look up the record for `id`.
    ///
    /// If the backing file vanished the entry is evicted and `NotFound` is
    /// returned.
    pub fn resolve(&self, id: u32) -> FsResult<Arc<PackageRecord>> {
        let record = self
            .state
            .lock()
            .entries
            .get(&id)
            .cloned()
            .ok_or_else(|| FsError::unknown_id(id))?;

        if !record.exists_on_disk() {
            self.evict(&record);
            return Err(FsError::unknown_id(id));
        }

        Ok(record)
    }

    /// Snapshot of all live entries as `(id, path)`, sorted by id.
    ///
    /// This is not a pure read: entries whose backing file no longer exists
    /// are evicted before the listing is returned.
    pub fn list(&self) -> Vec<(u32, PathBuf)> {
        let mut snapshot: Vec<Arc<PackageRecord>> =
            self.state.lock().entries.values().cloned().collect();
        snapshot.sort_by_key(|r| r.id());

        let mut live = Vec::with_capacity(snapshot.len());
        for record in snapshot {
            if record.exists_on_disk() {
                live.push((record.id(), record.path().to_path_buf()));
            } else {
                self.evict(&record);
            }
        }
        live
    }

    /// Register every regular file in `dir`.
    ///
    /// Failures are logged and skipped. Returns the number of newly
    /// registered files; a missing directory registers nothing.
    pub fn scan_directory(&self, dir: &Path) -> usize {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(dir = %dir.display(), error = %e, "Skipping AppImage scan");
                return 0;
            }
        };

        let mut registered = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            match self.register(&path) {
                Ok(_) => registered += 1,
                Err(FsError::AlreadyRegistered(_)) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Could not register AppImage"),
            }
        }

        info!(dir = %dir.display(), count = registered, "Scanned directory for AppImages");
        registered
    }

    fn lookup_path(&self, canonical: &Path) -> FsResult<Option<u32>> {
        let result = self.state.lock().find_by_path(canonical);
        if let Err(ref e) = result {
            error!(path = %canonical.display(), error = %e, "Registry invariant violated");
        }
        result
    }

    /// Remove `record` if it is still the entry stored under its id.
    ///
    /// Returns whether this call removed it.
    fn evict(&self, record: &Arc<PackageRecord>) -> bool {
        let removed = {
            let mut state = self.state.lock();
            let is_current = state
                .entries
                .get(&record.id())
                .is_some_and(|current| Arc::ptr_eq(current, record));
            if is_current {
                state.entries.remove(&record.id())
            } else {
                None
            }
        };

        match removed {
            Some(_) => {
                info!(
                    id = %format!("{:04}", record.id()),
                    path = %record.path().display(),
                    "Removed AppImage that no longer exists on disk"
                );
                true
            }
            None => false,
        }
    }
}
