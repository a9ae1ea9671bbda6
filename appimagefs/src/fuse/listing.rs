//! The generated `/map` file.
//!
//! Each registered AppImage whose backing file still exists contributes one
//! line:
//!
//! ```text
//! 0000.AppImage -> /home/user/Applications/Firefox.AppImage
//! ```
//!
//! The content is rendered from the registry on every request, so it always
//! reflects the live state, including entries just evicted.

use crate::error::{FsError, FsResult};
use crate::registry::Registry;

use super::path::canonical_name;

/// Largest transfer a single FUSE reply can carry.
pub const MAX_TRANSFER: usize = i32::MAX as usize;

/// Render the listing. Prunes missing entries as a side effect.
pub fn render_listing(registry: &Registry) -> String {
    let mut map = String::new();
    for (id, path) in registry.list() {
        map.push_str(&canonical_name(id));
        map.push_str(" -> ");
        map.push_str(&path.to_string_lossy());
        map.push('\n');
    }
    map
}

/// Serve a read of `size` bytes at `offset` from a generated file.
///
/// Reading exactly at the end returns nothing; reading past it fails with
/// [`FsError::OffsetOutOfRange`].
pub fn read_slice(content: &[u8], offset: u64, size: usize) -> FsResult<&[u8]> {
    let len = content.len();
    let start = usize::try_from(offset)
        .ok()
        .filter(|start| *start <= len)
        .ok_or(FsError::OffsetOutOfRange { offset, len })?;

    let count = size.min(len - start);
    if count > MAX_TRANSFER {
        return Err(FsError::TransferOverflow(count));
    }

    Ok(&content[start..start + count])
}
