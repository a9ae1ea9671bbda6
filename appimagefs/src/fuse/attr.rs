//! File attribute construction.

use std::fs::Metadata;
use std::os::unix::fs::MetadataExt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fuser::{FileAttr, FileType};

/// Mode of the mount root.
pub const ROOT_MODE: u16 = 0o750;

/// Mode of the listing file.
pub const LISTING_MODE: u16 = 0o444;

/// Mode of the registration channel.
pub const REGISTER_MODE: u16 = 0o660;

/// Mode forced onto every entry.
pub const ENTRY_MODE: u16 = 0o555;

const BLOCK_SIZE: u32 = 4096;

/// Builder for [`FileAttr`] values of virtual and proxied nodes.
#[derive(Debug, Clone, Copy)]
pub struct FileAttrBuilder {
    attr: FileAttr,
}

impl FileAttrBuilder {
    /// Start a regular file owned by `uid`/`gid` with all timestamps at `time`.
    pub fn new(ino: u64, uid: u32, gid: u32, time: SystemTime) -> Self {
        Self {
            attr: FileAttr {
                ino,
                size: 0,
                blocks: 0,
                atime: time,
                mtime: time,
                ctime: time,
                crtime: time,
                kind: FileType::RegularFile,
                perm: 0,
                nlink: 1,
                uid,
                gid,
                rdev: 0,
                blksize: BLOCK_SIZE,
                flags: 0,
            },
        }
    }

    /// Start from the metadata of a real file.
    pub fn from_metadata(ino: u64, metadata: &Metadata) -> Self {
        let ctime = unix_time(metadata.ctime(), metadata.ctime_nsec());
        let mut builder = Self::new(ino, metadata.uid(), metadata.gid(), ctime);
        builder.attr.size = metadata.size();
        builder.attr.blocks = metadata.blocks();
        builder.attr.atime = unix_time(metadata.atime(), metadata.atime_nsec());
        builder.attr.mtime = unix_time(metadata.mtime(), metadata.mtime_nsec());
        builder.attr.blksize = u32::try_from(metadata.blksize()).unwrap_or(BLOCK_SIZE);
        builder
    }

    /// Make this node a directory.
    pub fn directory(mut self) -> Self {
        self.attr.kind = FileType::Directory;
        self.attr.nlink = 2;
        self
    }

    /// Make this node a regular file.
    pub fn regular(mut self) -> Self {
        self.attr.kind = FileType::RegularFile;
        self.attr.nlink = 1;
        self
    }

    /// Set the permission bits.
    pub fn perm(mut self, perm: u16) -> Self {
        self.attr.perm = perm;
        self
    }

    /// Set the size and derive the block count.
    pub fn size(mut self, size: u64) -> Self {
        self.attr.size = size;
        self.attr.blocks = size.div_ceil(512);
        self
    }

    /// Finish the attributes.
    pub fn build(self) -> FileAttr {
        self.attr
    }
}

fn unix_time(secs: i64, nsecs: i64) -> SystemTime {
    let nanos = u32::try_from(nsecs).unwrap_or(0);
    if secs >= 0 {
        UNIX_EPOCH + Duration::new(secs as u64, nanos)
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs()) + Duration::from_nanos(u64::from(nanos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_attrs() {
        let now = SystemTime::now();
        let attr = FileAttrBuilder::new(1, 1000, 100, now)
            .directory()
            .perm(ROOT_MODE)
            .build();
        assert_eq!(attr.kind, FileType::Directory);
        assert_eq!(attr.nlink, 2);
        assert_eq!(attr.perm, 0o750);
        assert_eq!(attr.mtime, now);
        assert_eq!((attr.uid, attr.gid), (1000, 100));
    }

    #[test]
    fn test_size_sets_blocks() {
        let attr = FileAttrBuilder::new(2, 0, 0, UNIX_EPOCH)
            .regular()
            .size(1025)
            .build();
        assert_eq!(attr.size, 1025);
        assert_eq!(attr.blocks, 3);
        assert_eq!(attr.nlink, 1);
    }

    #[test]
    fn test_from_metadata_copies_size_and_owner() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("a.AppImage");
        std::fs::write(&path, vec![1u8; 3000]).unwrap();
        let metadata = std::fs::metadata(&path).unwrap();

        let attr = FileAttrBuilder::from_metadata(20, &metadata)
            .regular()
            .perm(ENTRY_MODE)
            .build();

        assert_eq!(attr.ino, 20);
        assert_eq!(attr.size, 3000);
        assert_eq!(attr.uid, metadata.uid());
        assert_eq!(attr.gid, metadata.gid());
        assert_eq!(attr.perm, 0o555);
        assert_eq!(attr.mtime, metadata.modified().unwrap());
    }

    #[test]
    fn test_unix_time_before_epoch() {
        assert_eq!(unix_time(-1, 0), UNIX_EPOCH - Duration::from_secs(1));
        assert_eq!(unix_time(5, 10), UNIX_EPOCH + Duration::new(5, 10));
    }
}
