//! Error types for the AppImage filesystem.
//!
//! Every internal failure is an [`FsError`]. Kernel-facing handlers convert
//! them to errno values with [`FsError::errno`] so no failure ever crosses the
//! FUSE boundary as a panic.

use std::io;
use std::path::PathBuf;

use libc::c_int;
use thiserror::Error;

/// Result type for filesystem operations.
pub type FsResult<T> = Result<T, FsError>;

/// Errors that can occur in the registry, the resolver and the request handlers.
#[derive(Debug, Error)]
pub enum FsError {
    /// Unknown path, unknown id, or a backing file that vanished.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Path does not have the shape of anything this filesystem serves.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// The file is registered already. Informational, not a failure for users.
    #[error("AppImage already registered (ID: {0:04})")]
    AlreadyRegistered(u32),

    /// Two records share a path under different ids.
    #[error("Registry corrupted: IDs {id_a:04} and {id_b:04} refer to the same file")]
    DuplicateCorruption { id_a: u32, id_b: u32 },

    /// The backing file could not be opened for reading.
    #[error("Could not open {}: {source}", .path.display())]
    OpenFailed { path: PathBuf, source: io::Error },

    /// I/O error while serving a request.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Read offset lies beyond the end of a generated file.
    #[error("Offset {offset} is beyond the end of the file ({len} bytes)")]
    OffsetOutOfRange { offset: u64, len: usize },

    /// Computed transfer length does not fit the 32-bit FUSE reply size.
    #[error("Transfer of {0} bytes exceeds the FUSE reply size limit")]
    TransferOverflow(usize),

    /// Every id has been handed out once.
    #[error("No AppImage IDs left")]
    IdsExhausted,

    /// Another instance is mounted at the same path.
    #[error("Another instance is already running at {}", .0.display())]
    AlreadyRunning(PathBuf),

    /// Mutation of immutable content was requested.
    #[error("Operation not permitted: {0}")]
    PermissionDenied(String),

    /// The FUSE session could not be established.
    #[error("Mount failed: {0}")]
    MountFailed(String),
}

impl FsError {
    /// Translate into the errno reported to the kernel.
    pub fn errno(&self) -> c_int {
        match self {
            FsError::NotFound(_) | FsError::InvalidPath(_) => libc::ENOENT,
            FsError::AlreadyRegistered(_) => libc::EEXIST,
            FsError::DuplicateCorruption { .. } => libc::EIO,
            FsError::OpenFailed { source, .. } => source.raw_os_error().unwrap_or(libc::EIO),
            FsError::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
            FsError::OffsetOutOfRange { .. } | FsError::TransferOverflow(_) => libc::EIO,
            FsError::IdsExhausted => libc::ENOSPC,
            FsError::AlreadyRunning(_) => libc::EBUSY,
            FsError::PermissionDenied(_) => libc::EPERM,
            FsError::MountFailed(_) => libc::EIO,
        }
    }

    /// Build a `NotFound` for an entry id.
    pub(crate) fn unknown_id(id: u32) -> Self {
        FsError::NotFound(format!("no registered AppImage with ID {:04}", id))
    }
}
