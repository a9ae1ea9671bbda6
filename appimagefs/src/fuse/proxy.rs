//! Content proxy for registered AppImages.
//!
//! Reads go straight to the descriptor held by the [`PackageRecord`]. Before
//! the data is returned, file offsets 8 to 10 are zeroed: type 1 and type 2
//! AppImages carry the magic `AI\x01` / `AI\x02` there, and runtimes that see
//! it try to treat the file as a mounted AppImage instead of a plain ELF
//! binary. The file on disk is never modified.

use std::ops::Range;

use crate::error::{FsError, FsResult};
use crate::registry::PackageRecord;

use super::listing::MAX_TRANSFER;

/// File offsets zeroed in every read that covers them.
pub const MAGIC_BYTES: Range<u64> = 8..11;

/// Read up to `size` bytes at `offset` from the record, with the magic bytes
/// patched out.
pub fn read_entry(record: &PackageRecord, offset: u64, size: usize) -> FsResult<Vec<u8>> {
    if size > MAX_TRANSFER {
        return Err(FsError::TransferOverflow(size));
    }
    let mut buf = vec![0u8; size];
    let read = record.read_at(&mut buf, offset)?;
    buf.truncate(read);
    patch_magic_bytes(&mut buf, offset);
    Ok(buf)
}

/// Zero the part of [`MAGIC_BYTES`] that falls inside `buf`, where `buf`
/// holds file content starting at `offset`.
pub fn patch_magic_bytes(buf: &mut [u8], offset: u64) {
    let end = offset.saturating_add(buf.len() as u64);
    let start = MAGIC_BYTES.start.max(offset);
    let stop = MAGIC_BYTES.end.min(end);

    for pos in start..stop {
        buf[(pos - offset) as usize] = 0;
    }
}
