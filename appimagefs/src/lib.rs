//! AppImageFS - a FUSE filesystem that serves AppImages under stable names.
//!
//! Packages registered through the `register` channel show up at the mount
//! root as `NNNN.AppImage`. Reads are proxied to the original file with the
//! AppImage magic bytes hidden, so desktop integration tools do not treat the
//! proxies as installable packages.

pub mod config;
pub mod error;
pub mod fuse;
pub mod logging;
pub mod mount;
pub mod registry;

pub use error::{FsError, FsResult};
pub use fuse::{AppImageFs, FuseAdapter};
pub use mount::{MountConfig, MountSession};
pub use registry::{PackageRecord, Registry};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
