//! Kernel-facing `fuser` adapter.
//!
//! FUSE talks in inode numbers; [`AppImageFs`] talks in paths. The adapter
//! converts between the two using the fixed inode layout in
//! [`super::path`] and turns every [`crate::error::FsError`] into an errno
//! reply. Nothing here panics on bad input from the kernel.

use std::ffi::OsStr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use fuser::consts::FOPEN_DIRECT_IO;
use fuser::{
    Filesystem, KernelConfig, ReplyAttr, ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry,
    ReplyOpen, ReplyWrite, Request, TimeOrNow,
};
use libc::c_int;
use tracing::{debug, error, info};

use crate::error::FsError;

use super::filesystem::AppImageFs;
use super::path::{VirtualPath, ROOT_INO};

/// Attribute and entry cache lifetime. Zero so that `/map` sizes and entry
/// evictions are visible immediately.
pub const TTL: Duration = Duration::ZERO;

/// Generation number for all inodes. Inode numbers are never reused.
const GENERATION: u64 = 0;

/// `fuser::Filesystem` implementation backed by an [`AppImageFs`].
pub struct FuseAdapter {
    fs: Arc<AppImageFs>,
}

impl FuseAdapter {
    /// Wrap a filesystem for mounting.
    pub fn new(fs: Arc<AppImageFs>) -> Self {
        Self { fs }
    }

    /// Path served at `ino`.
    fn path_of(ino: u64) -> Result<String, c_int> {
        VirtualPath::from_ino(ino).to_path().ok_or(libc::ENOENT)
    }

    /// Log and convert an error for the kernel.
    fn errno(op: &str, path: &str, err: FsError) -> c_int {
        match err {
            FsError::DuplicateCorruption { .. } => {
                error!(op, path, error = %err, "Registry corruption detected")
            }
            _ => debug!(op, path, error = %err, "Request failed"),
        }
        err.errno()
    }
}

impl Filesystem for FuseAdapter {
    fn init(&mut self, _req: &Request<'_>, _config: &mut KernelConfig) -> Result<(), c_int> {
        info!(entries = self.fs.registry().len(), "AppImage filesystem initialized");
        Ok(())
    }

    fn destroy(&mut self) {
        info!("AppImage filesystem shutting down");
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        if parent != ROOT_INO {
            reply.error(libc::ENOENT);
            return;
        }
        let Some(name) = name.to_str() else {
            reply.error(libc::ENOENT);
            return;
        };

        let path = format!("/{}", name);
        match self.fs.getattr(&path) {
            Ok(attr) => reply.entry(&TTL, &attr, GENERATION),
            Err(e) => reply.error(Self::errno("lookup", &path, e)),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        let node = VirtualPath::from_ino(ino);
        match self.fs.attr_of(node) {
            Ok(attr) => reply.attr(&TTL, &attr),
            Err(e) => reply.error(Self::errno("getattr", &format!("{:?}", node), e)),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let path = match Self::path_of(ino) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };

        // Only size changes mean anything here; other attribute changes are ignored
        if let Some(size) = size {
            if let Err(e) = self.fs.truncate(&path, size) {
                reply.error(Self::errno("truncate", &path, e));
                return;
            }
        }

        match self.fs.getattr(&path) {
            Ok(attr) => reply.attr(&TTL, &attr),
            Err(e) => reply.error(Self::errno("setattr", &path, e)),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        let path = match Self::path_of(ino) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };

        match self.fs.open(&path, flags) {
            Ok(opened) => {
                let open_flags = if opened.direct_io { FOPEN_DIRECT_IO } else { 0 };
                reply.opened(opened.fh, open_flags);
            }
            Err(e) => reply.error(Self::errno("open", &path, e)),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let path = match Self::path_of(ino) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        let Ok(offset) = u64::try_from(offset) else {
            reply.error(libc::EINVAL);
            return;
        };

        match self.fs.read(&path, fh, offset, size as usize) {
            Ok(data) => reply.data(&data),
            Err(e) => reply.error(Self::errno("read", &path, e)),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let path = match Self::path_of(ino) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };

        match self.fs.write(&path, fh, offset.max(0) as u64, data) {
            Ok(written) => match u32::try_from(written) {
                Ok(written) => reply.written(written),
                Err(_) => reply.error(Self::errno(
                    "write",
                    &path,
                    FsError::TransferOverflow(written),
                )),
            },
            Err(e) => reply.error(Self::errno("write", &path, e)),
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        let path = Self::path_of(ino).unwrap_or_default();
        self.fs.release(&path, fh);
        reply.ok();
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let path = match Self::path_of(ino) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };

        let entries = match self.fs.readdir(&path) {
            Ok(entries) => entries,
            Err(e) => return reply.error(Self::errno("readdir", &path, e)),
        };

        let skip = usize::try_from(offset).unwrap_or(0);
        for (index, entry) in entries.iter().enumerate().skip(skip) {
            // The offset passed back to us is that of the next entry
            if reply.add(entry.ino, (index + 1) as i64, entry.kind, &entry.name) {
                break;
            }
        }
        reply.ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fuse::path::{ENTRY_INO_BASE, LISTING_INO, REGISTER_INO};

    #[test]
    fn test_path_of_fixed_inodes() {
        assert_eq!(FuseAdapter::path_of(ROOT_INO).unwrap(), "/");
        assert_eq!(FuseAdapter::path_of(LISTING_INO).unwrap(), "/map");
        assert_eq!(FuseAdapter::path_of(REGISTER_INO).unwrap(), "/register");
    }

    #[test]
    fn test_path_of_entry_inodes() {
        assert_eq!(
            FuseAdapter::path_of(ENTRY_INO_BASE + 5).unwrap(),
            "/0005.AppImage"
        );
    }

    #[test]
    fn test_path_of_unknown_inode() {
        assert_eq!(FuseAdapter::path_of(0), Err(libc::ENOENT));
        assert_eq!(FuseAdapter::path_of(7), Err(libc::ENOENT));
    }

    #[test]
    fn test_errno_passthrough() {
        assert_eq!(
            FuseAdapter::errno("read", "/map", FsError::OffsetOutOfRange { offset: 9, len: 3 }),
            libc::EIO
        );
        assert_eq!(
            FuseAdapter::errno("open", "/x", FsError::NotFound("/x".into())),
            libc::ENOENT
        );
    }
}
