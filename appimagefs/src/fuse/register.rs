//! The `/register` channel.
//!
//! Reading returns a short help text. Writing appends to a buffer private to
//! the open handle; when the handle is released the buffer is interpreted as
//! paths, one per line, and each is registered. The writer only learns
//! whether the write itself succeeded. Registration outcomes go to the log.

use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;

use tracing::{error, info, warn};

use crate::error::FsError;
use crate::registry::Registry;

/// Content served when reading the channel.
pub const REGISTER_MESSAGE: &str =
    "Write paths to AppImages into this virtual file, one per line, to register them\n";

/// Bytes written to one open handle of the channel.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RegistrationBuffer {
    data: Vec<u8>,
}

impl RegistrationBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `bytes` verbatim; returns how many were accepted (all of them).
    pub fn append(&mut self, bytes: &[u8]) -> usize {
        self.data.extend_from_slice(bytes);
        bytes.len()
    }

    /// Whether anything was written.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Paths requested in this buffer, with line terminators stripped and
    /// blank lines dropped. Bytes are kept as written; paths need not be UTF-8.
    pub fn requested_paths(&self) -> Vec<PathBuf> {
        self.data
            .split(|&b| b == b'\n')
            .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
            .filter(|line| !line.is_empty())
            .map(|line| PathBuf::from(OsStr::from_bytes(line)))
            .collect()
    }

    /// Register every requested path. Consumes the buffer.
    ///
    /// Never fails: `AlreadyRegistered` is logged as information, every other
    /// error as a warning. Returns the ids of newly registered files.
    pub fn commit(self, registry: &Registry) -> Vec<u32> {
        let mut registered = Vec::new();

        for path in self.requested_paths() {
            match registry.register(&path) {
                Ok(id) => registered.push(id),
                Err(FsError::AlreadyRegistered(id)) => {
                    info!(
                        path = %path.display(),
                        id = %format!("{:04}", id),
                        "AppImage already registered"
                    );
                }
                Err(e @ FsError::DuplicateCorruption { .. }) => {
                    error!(path = %path.display(), error = %e, "Registration aborted");
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Could not register AppImage");
                }
            }
        }

        registered
    }
}
