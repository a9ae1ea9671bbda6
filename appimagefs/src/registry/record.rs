//! A single registered AppImage.

use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use crate::error::{FsError, FsResult};

/// One registered AppImage and the descriptor that keeps it readable.
///
/// The descriptor is opened once at registration and closed when the last
/// `Arc` to the record is dropped, so open handles keep working even if the
/// record is evicted while they read.
#[derive(Debug)]
pub struct PackageRecord {
    id: u32,
    path: PathBuf,
    file: File,
}

impl PackageRecord {
    /// Open `path` read-only and wrap it in a record.
    ///
    /// `path` must already be canonical.
    pub(crate) fn open(id: u32, path: PathBuf) -> FsResult<Self> {
        let file = File::open(&path).map_err(|source| FsError::OpenFailed {
            path: path.clone(),
            source,
        })?;
        Ok(Self { id, path, file })
    }

    /// The same record under another id.
    pub(crate) fn with_id(self, id: u32) -> Self {
        Self { id, ..self }
    }

    /// The id assigned at registration.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Canonical absolute path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the backing file is still a regular file on disk.
    pub fn exists_on_disk(&self) -> bool {
        self.path.is_file()
    }

    /// Compare two records by path.
    ///
    /// Equal paths with different ids mean the registry holds the same file
    /// twice, which is reported as [`FsError::DuplicateCorruption`].
    pub fn same_package(&self, other: &PackageRecord) -> FsResult<bool> {
        let equal = self.path == other.path;
        if equal && self.id != other.id {
            return Err(FsError::DuplicateCorruption {
                id_a: self.id,
                id_b: other.id,
            });
        }
        Ok(equal)
    }

    /// Positioned read into `buf`, retrying short reads until `buf` is full or
    /// the end of the file is reached.
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.file.read_at(&mut buf[filled..], offset + filled as u64) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }
}
