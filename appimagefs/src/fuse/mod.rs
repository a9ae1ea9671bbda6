//! FUSE filesystem exposing registered AppImages.
//!
//! The mount root is a flat directory:
//!
//! - `map` - read-only listing of `NNNN.AppImage -> /abs/path` lines
//! - `register` - write absolute paths here, one per line, to register them
//! - `NNNN.AppImage` - read-only proxy of each registered package, with the
//!   AppImage magic bytes zeroed
//!
//! # Layers
//!
//! - [`AppImageFs`] - path-based core holding the registry and open handles
//! - [`FuseAdapter`] - `fuser::Filesystem` implementation mapping inodes to paths

mod adapter;
mod attr;
mod filesystem;
mod handles;
mod listing;
mod path;
mod proxy;
mod register;

pub use adapter::{FuseAdapter, TTL};
pub use attr::{FileAttrBuilder, ENTRY_MODE, LISTING_MODE, REGISTER_MODE, ROOT_MODE};
pub use filesystem::{AppImageFs, DirEntry, OpenedFile};
pub use handles::{HandleTable, OpenFile};
pub use listing::{read_slice, render_listing, MAX_TRANSFER};
pub use path::{
    canonical_name, VirtualPath, ENTRY_INO_BASE, ENTRY_SUFFIX, LISTING_INO, LISTING_NAME,
    REGISTER_INO, REGISTER_NAME, ROOT_INO,
};
pub use proxy::{patch_magic_bytes, read_entry, MAGIC_BYTES};
pub use register::{RegistrationBuffer, REGISTER_MESSAGE};
