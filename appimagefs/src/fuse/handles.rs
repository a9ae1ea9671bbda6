//! Open file handle table.
//!
//! Every successful `open` stores an [`OpenFile`] under a fresh 64-bit
//! handle id that the kernel passes back on `read`, `write` and `release`.
//! Removing the session on release hands ownership back to the caller, so
//! cleanup happens exactly once whatever path the request took.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::registry::PackageRecord;

use super::register::RegistrationBuffer;

/// Per-open state.
#[derive(Debug)]
pub enum OpenFile {
    /// The generated listing.
    Listing,
    /// The registration channel and what has been written to it so far.
    Register(RegistrationBuffer),
    /// A registered AppImage. The descriptor belongs to the record.
    Entry(Arc<PackageRecord>),
}

/// Table of open handles, keyed by handle id.
#[derive(Debug)]
pub struct HandleTable {
    next: AtomicU64,
    open: DashMap<u64, OpenFile>,
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

impl HandleTable {
    /// Create an empty table. Handle ids start at 1; 0 is never issued.
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
            open: DashMap::new(),
        }
    }

    /// Store `file` and return its handle id.
    pub fn insert(&self, file: OpenFile) -> u64 {
        let fh = self.next.fetch_add(1, Ordering::Relaxed);
        self.open.insert(fh, file);
        fh
    }

    /// Record behind an entry handle.
    pub fn entry(&self, fh: u64) -> Option<Arc<PackageRecord>> {
        let file = self.open.get(&fh)?;
        match file.value() {
            OpenFile::Entry(record) => Some(Arc::clone(record)),
            _ => None,
        }
    }

    /// Append to the buffer of a registration handle.
    ///
    /// Returns `None` if `fh` is not an open registration handle.
    pub fn append(&self, fh: u64, data: &[u8]) -> Option<usize> {
        let mut file = self.open.get_mut(&fh)?;
        match file.value_mut() {
            OpenFile::Register(buffer) => Some(buffer.append(data)),
            _ => None,
        }
    }

    /// Remove a handle, returning its state.
    pub fn remove(&self, fh: u64) -> Option<OpenFile> {
        self.open.remove(&fh).map(|(_, file)| file)
    }

    /// Number of open handles.
    pub fn len(&self) -> usize {
        self.open.len()
    }

    /// Whether no handle is open.
    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::path::PathBuf;

    #[test]
    fn test_handles_are_unique_and_nonzero() {
        let table = HandleTable::new();
        let ids: HashSet<u64> = (0..100).map(|_| table.insert(OpenFile::Listing)).collect();
        assert_eq!(ids.len(), 100);
        assert!(!ids.contains(&0));
        assert_eq!(table.len(), 100);
    }

    #[test]
    fn test_append_only_to_register_handles() {
        let table = HandleTable::new();
        let reg = table.insert(OpenFile::Register(RegistrationBuffer::new()));
        let listing = table.insert(OpenFile::Listing);

        assert_eq!(table.append(reg, b"/tmp/a"), Some(6));
        assert_eq!(table.append(listing, b"/tmp/a"), None);
        assert_eq!(table.append(999, b"/tmp/a"), None);
    }

    #[test]
    fn test_buffers_are_private_per_handle() {
        let table = HandleTable::new();
        let first = table.insert(OpenFile::Register(RegistrationBuffer::new()));
        let second = table.insert(OpenFile::Register(RegistrationBuffer::new()));

        table.append(first, b"/one\n");
        table.append(second, b"/two\n");

        match table.remove(first) {
            Some(OpenFile::Register(buf)) => assert_eq!(buf.requested_paths(), vec![PathBuf::from("/one")]),
            other => panic!("unexpected {:?}", other),
        }
        match table.remove(second) {
            Some(OpenFile::Register(buf)) => assert_eq!(buf.requested_paths(), vec![PathBuf::from("/two")]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_remove_is_once() {
        let table = HandleTable::new();
        let fh = table.insert(OpenFile::Listing);
        assert!(table.remove(fh).is_some());
        assert!(table.remove(fh).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_entry_lookup_ignores_other_kinds() {
        let table = HandleTable::new();
        let fh = table.insert(OpenFile::Listing);
        assert!(table.entry(fh).is_none());
    }
}
