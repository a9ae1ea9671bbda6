//! Path-based request handlers.
//!
//! [`AppImageFs`] answers every filesystem operation in terms of the path it
//! targets. The kernel adapter in [`super::adapter`] maps inode-based FUSE
//! requests onto these handlers; tests drive them directly.

use std::fs;
use std::sync::Arc;
use std::time::SystemTime;

use fuser::{FileAttr, FileType};
use tracing::{debug, trace};

use crate::error::{FsError, FsResult};
use crate::registry::Registry;

use super::attr::{FileAttrBuilder, ENTRY_MODE, LISTING_MODE, REGISTER_MODE, ROOT_MODE};
use super::handles::{HandleTable, OpenFile};
use super::listing::{read_slice, render_listing};
use super::path::{canonical_name, VirtualPath, LISTING_NAME, REGISTER_NAME};
use super::proxy::read_entry;
use super::register::{RegistrationBuffer, REGISTER_MESSAGE};

/// One name in the root directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub ino: u64,
    pub kind: FileType,
    pub name: String,
}

/// Result of a successful open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenedFile {
    /// Handle id to pass back on read, write and release.
    pub fh: u64,
    /// Content is generated per request and must bypass the page cache.
    pub direct_io: bool,
}

/// The AppImage filesystem.
#[derive(Debug)]
pub struct AppImageFs {
    registry: Arc<Registry>,
    handles: HandleTable,
    started: SystemTime,
    uid: u32,
    gid: u32,
}

impl AppImageFs {
    /// Create a filesystem serving `registry`, owned by the current user.
    pub fn new(registry: Arc<Registry>) -> Self {
        // SAFETY: getuid/getgid cannot fail and touch no memory
        let (uid, gid) = unsafe { (libc::getuid(), libc::getgid()) };
        Self {
            registry,
            handles: HandleTable::new(),
            started: SystemTime::now(),
            uid,
            gid,
        }
    }

    /// The registry behind this filesystem.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Number of currently open handles.
    pub fn open_handles(&self) -> usize {
        self.handles.len()
    }

    /// Attributes of `path`.
    pub fn getattr(&self, path: &str) -> FsResult<FileAttr> {
        self.attr_of(VirtualPath::parse(path)?)
    }

    /// Attributes of an already resolved node.
    pub fn attr_of(&self, node: VirtualPath) -> FsResult<FileAttr> {
        let ino = node
            .ino()
            .ok_or_else(|| FsError::InvalidPath(format!("{:?}", node)))?;
        let virtual_node = FileAttrBuilder::new(ino, self.uid, self.gid, self.started);

        match node {
            VirtualPath::Root => Ok(virtual_node.directory().perm(ROOT_MODE).build()),
            VirtualPath::ListingFile => {
                let size = render_listing(&self.registry).len() as u64;
                Ok(virtual_node.regular().perm(LISTING_MODE).size(size).build())
            }
            VirtualPath::RegisterChannel => Ok(virtual_node
                .regular()
                .perm(REGISTER_MODE)
                .size(REGISTER_MESSAGE.len() as u64)
                .build()),
            VirtualPath::Entry(id) => {
                let record = self.registry.resolve(id)?;
                let metadata = fs::metadata(record.path())
                    .map_err(|_| FsError::unknown_id(id))?;
                Ok(FileAttrBuilder::from_metadata(ino, &metadata)
                    .regular()
                    .perm(ENTRY_MODE)
                    .build())
            }
            VirtualPath::Invalid => Err(FsError::InvalidPath(format!("{:?}", node))),
        }
    }

    /// List `path`, which must be the root.
    pub fn readdir(&self, path: &str) -> FsResult<Vec<DirEntry>> {
        if VirtualPath::parse(path)? != VirtualPath::Root {
            return Err(FsError::NotFound(path.to_string()));
        }

        let fixed = [
            (VirtualPath::Root, FileType::Directory, "."),
            (VirtualPath::Root, FileType::Directory, ".."),
            (VirtualPath::ListingFile, FileType::RegularFile, LISTING_NAME),
            (VirtualPath::RegisterChannel, FileType::RegularFile, REGISTER_NAME),
        ];

        let mut entries: Vec<DirEntry> = fixed
            .into_iter()
            .filter_map(|(node, kind, name)| {
                Some(DirEntry {
                    ino: node.ino()?,
                    kind,
                    name: name.to_string(),
                })
            })
            .collect();

        for (id, _) in self.registry.list() {
            if let Some(ino) = VirtualPath::Entry(id).ino() {
                entries.push(DirEntry {
                    ino,
                    kind: FileType::RegularFile,
                    name: canonical_name(id),
                });
            }
        }

        Ok(entries)
    }

    /// Open `path` with the given `open(2)` flags.
    pub fn open(&self, path: &str, flags: i32) -> FsResult<OpenedFile> {
        let read_only = flags & libc::O_ACCMODE == libc::O_RDONLY;

        let (file, direct_io) = match VirtualPath::parse(path)? {
            VirtualPath::RegisterChannel => (OpenFile::Register(RegistrationBuffer::new()), true),
            VirtualPath::ListingFile if read_only => (OpenFile::Listing, true),
            VirtualPath::Entry(id) => {
                let record = self.registry.resolve(id)?;
                if !read_only {
                    return Err(FsError::PermissionDenied(format!(
                        "{} is read-only",
                        path
                    )));
                }
                (OpenFile::Entry(record), false)
            }
            VirtualPath::ListingFile => {
                return Err(FsError::PermissionDenied(format!("{} is read-only", path)))
            }
            VirtualPath::Root | VirtualPath::Invalid => {
                return Err(FsError::NotFound(path.to_string()))
            }
        };

        let fh = self.handles.insert(file);
        debug!(path, fh, flags, "Opened");
        Ok(OpenedFile { fh, direct_io })
    }

    /// Read up to `size` bytes at `offset`.
    pub fn read(&self, path: &str, fh: u64, offset: u64, size: usize) -> FsResult<Vec<u8>> {
        trace!(path, fh, offset, size, "Read");

        match VirtualPath::parse(path)? {
            VirtualPath::ListingFile => {
                let map = render_listing(&self.registry);
                Ok(read_slice(map.as_bytes(), offset, size)?.to_vec())
            }
            VirtualPath::RegisterChannel => {
                let message = REGISTER_MESSAGE.as_bytes();
                if offset >= message.len() as u64 {
                    return Ok(Vec::new());
                }
                Ok(read_slice(message, offset, size)?.to_vec())
            }
            VirtualPath::Entry(id) => {
                let record = match self.handles.entry(fh) {
                    Some(record) if record.id() == id => record,
                    _ => self.registry.resolve(id)?,
                };
                read_entry(&record, offset, size)
            }
            VirtualPath::Root | VirtualPath::Invalid => Err(FsError::NotFound(path.to_string())),
        }
    }

    /// Write `data` through handle `fh`. Only the registration channel
    /// accepts writes; the offset is ignored and data is appended.
    pub fn write(&self, path: &str, fh: u64, offset: u64, data: &[u8]) -> FsResult<usize> {
        trace!(path, fh, offset, len = data.len(), "Write");

        match VirtualPath::parse(path)? {
            VirtualPath::RegisterChannel => self
                .handles
                .append(fh, data)
                .ok_or_else(|| FsError::NotFound(format!("no open handle {} for {}", fh, path))),
            VirtualPath::ListingFile | VirtualPath::Entry(_) => Err(FsError::PermissionDenied(
                format!("{} is read-only", path),
            )),
            VirtualPath::Root | VirtualPath::Invalid => Err(FsError::NotFound(path.to_string())),
        }
    }

    /// Truncate `path` to `size`. Accepted as a no-op on the registration
    /// channel, refused everywhere else.
    pub fn truncate(&self, path: &str, size: u64) -> FsResult<()> {
        match VirtualPath::parse(path)? {
            VirtualPath::RegisterChannel => Ok(()),
            _ => Err(FsError::PermissionDenied(format!(
                "cannot truncate {} to {} bytes",
                path, size
            ))),
        }
    }

    /// Close handle `fh`.
    ///
    /// Registration handles commit their buffer here. Never fails: the
    /// outcome of the registration is only logged.
    pub fn release(&self, path: &str, fh: u64) {
        match self.handles.remove(fh) {
            Some(OpenFile::Register(buffer)) if !buffer.is_empty() => {
                debug!(path, fh, "Committing registration request");
                buffer.commit(&self.registry);
            }
            Some(_) => debug!(path, fh, "Released"),
            None => debug!(path, fh, "Release of unknown handle"),
        }
    }
}
