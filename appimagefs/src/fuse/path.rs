//! Virtual path resolution.
//!
//! The filesystem is a single flat directory. Every request path is
//! classified into a [`VirtualPath`]:
//!
//! - `/` - the mount root
//! - `/map` - generated listing of registered AppImages
//! - `/register` - write-only registration channel
//! - `/NNNN.AppImage` - a registered AppImage, by zero-padded id
//!
//! Entry names are canonical: only the exact name produced by
//! [`canonical_name`] resolves. `/1.AppImage`, `/00001.AppImage` and
//! `/0001.appimage` are all unknown files, never aliases of `/0001.AppImage`.

use crate::error::{FsError, FsResult};

/// Name of the generated listing file.
pub const LISTING_NAME: &str = "map";

/// Name of the registration channel.
pub const REGISTER_NAME: &str = "register";

/// Suffix of every entry name.
pub const ENTRY_SUFFIX: &str = ".AppImage";

/// Inode of the mount root (fixed by FUSE).
pub const ROOT_INO: u64 = 1;

/// Inode of the listing file.
pub const LISTING_INO: u64 = 2;

/// Inode of the registration channel.
pub const REGISTER_INO: u64 = 3;

/// First inode used for entries; entry `id` lives at `ENTRY_INO_BASE + id`.
pub const ENTRY_INO_BASE: u64 = 16;

/// Resolved target of a filesystem request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VirtualPath {
    /// The mount root directory.
    Root,
    /// The generated listing file.
    ListingFile,
    /// The registration channel.
    RegisterChannel,
    /// A registered AppImage.
    Entry(u32),
    /// Anything else.
    Invalid,
}

impl VirtualPath {
    /// Parse a request path.
    ///
    /// # Errors
    ///
    /// - [`FsError::InvalidPath`] if the path is not absolute or has more
    ///   than one segment
    /// - [`FsError::NotFound`] if the single segment names nothing this
    ///   filesystem serves
    ///
    /// # Examples
    ///
    /// ```
    /// use appimagefs::fuse::VirtualPath;
    ///
    /// assert_eq!(VirtualPath::parse("/").unwrap(), VirtualPath::Root);
    /// assert_eq!(VirtualPath::parse("/map").unwrap(), VirtualPath::ListingFile);
    /// assert_eq!(VirtualPath::parse("/0042.AppImage").unwrap(), VirtualPath::Entry(42));
    /// assert!(VirtualPath::parse("/42.AppImage").is_err());
    /// ```
    pub fn parse(path: &str) -> FsResult<Self> {
        if path == "/" {
            return Ok(VirtualPath::Root);
        }

        let name = path
            .strip_prefix('/')
            .ok_or_else(|| FsError::InvalidPath(format!("{} does not start with /", path)))?;
        if name.contains('/') {
            return Err(FsError::InvalidPath(format!(
                "{} has more than one path segment",
                path
            )));
        }

        match name {
            LISTING_NAME => return Ok(VirtualPath::ListingFile),
            REGISTER_NAME => return Ok(VirtualPath::RegisterChannel),
            _ => {}
        }

        let stem = name.split('.').next().unwrap_or(name);
        let id: u32 = stem
            .parse()
            .map_err(|_| FsError::NotFound(path.to_string()))?;

        if canonical_name(id) != name {
            return Err(FsError::NotFound(path.to_string()));
        }

        Ok(VirtualPath::Entry(id))
    }

    /// Classify a request path, mapping every failure to [`VirtualPath::Invalid`].
    pub fn classify(path: &str) -> Self {
        Self::parse(path).unwrap_or(VirtualPath::Invalid)
    }

    /// Inode number of this node, `None` for [`VirtualPath::Invalid`].
    pub fn ino(self) -> Option<u64> {
        match self {
            VirtualPath::Root => Some(ROOT_INO),
            VirtualPath::ListingFile => Some(LISTING_INO),
            VirtualPath::RegisterChannel => Some(REGISTER_INO),
            VirtualPath::Entry(id) => Some(ENTRY_INO_BASE + u64::from(id)),
            VirtualPath::Invalid => None,
        }
    }

    /// Node for an inode number.
    pub fn from_ino(ino: u64) -> Self {
        match ino {
            ROOT_INO => VirtualPath::Root,
            LISTING_INO => VirtualPath::ListingFile,
            REGISTER_INO => VirtualPath::RegisterChannel,
            ino if ino >= ENTRY_INO_BASE => u32::try_from(ino - ENTRY_INO_BASE)
                .map(VirtualPath::Entry)
                .unwrap_or(VirtualPath::Invalid),
            _ => VirtualPath::Invalid,
        }
    }

    /// Absolute path string of this node, `None` for [`VirtualPath::Invalid`].
    pub fn to_path(self) -> Option<String> {
        match self {
            VirtualPath::Root => Some("/".to_string()),
            VirtualPath::ListingFile => Some(format!("/{}", LISTING_NAME)),
            VirtualPath::RegisterChannel => Some(format!("/{}", REGISTER_NAME)),
            VirtualPath::Entry(id) => Some(format!("/{}", canonical_name(id))),
            VirtualPath::Invalid => None,
        }
    }
}

/// Canonical file name of entry `id`.
///
/// # Examples
///
/// ```
/// use appimagefs::fuse::canonical_name;
///
/// assert_eq!(canonical_name(7), "0007.AppImage");
/// assert_eq!(canonical_name(12345), "12345.AppImage");
/// ```
pub fn canonical_name(id: u32) -> String {
    format!("{:04}{}", id, ENTRY_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // ========================================================================
    // Fixed nodes
    // ========================================================================

    #[test]
    fn test_parse_root() {
        assert_eq!(VirtualPath::parse("/").unwrap(), VirtualPath::Root);
    }

    #[test]
    fn test_parse_fixed_files() {
        assert_eq!(VirtualPath::parse("/map").unwrap(), VirtualPath::ListingFile);
        assert_eq!(
            VirtualPath::parse("/register").unwrap(),
            VirtualPath::RegisterChannel
        );
    }

    #[test]
    fn test_fixed_names_are_case_sensitive() {
        assert!(matches!(
            VirtualPath::parse("/Map"),
            Err(FsError::NotFound(_))
        ));
        assert!(matches!(
            VirtualPath::parse("/REGISTER"),
            Err(FsError::NotFound(_))
        ));
    }

    // ========================================================================
    // Shape errors
    // ========================================================================

    #[test]
    fn test_relative_path_is_invalid() {
        assert!(matches!(
            VirtualPath::parse("0001.AppImage"),
            Err(FsError::InvalidPath(_))
        ));
        assert!(matches!(VirtualPath::parse(""), Err(FsError::InvalidPath(_))));
    }

    #[test]
    fn test_nested_path_is_invalid() {
        assert!(matches!(
            VirtualPath::parse("/sub/0001.AppImage"),
            Err(FsError::InvalidPath(_))
        ));
        assert!(matches!(
            VirtualPath::parse("//map"),
            Err(FsError::InvalidPath(_))
        ));
        assert!(matches!(
            VirtualPath::parse("/map/"),
            Err(FsError::InvalidPath(_))
        ));
    }

    // ========================================================================
    // Entries
    // ========================================================================

    #[test]
    fn test_parse_entry() {
        assert_eq!(
            VirtualPath::parse("/0000.AppImage").unwrap(),
            VirtualPath::Entry(0)
        );
        assert_eq!(
            VirtualPath::parse("/0042.AppImage").unwrap(),
            VirtualPath::Entry(42)
        );
        assert_eq!(
            VirtualPath::parse("/12345.AppImage").unwrap(),
            VirtualPath::Entry(12345)
        );
    }

    #[test]
    fn test_non_canonical_entry_names_are_not_found() {
        for path in [
            "/42.AppImage",
            "/00042.AppImage",
            "/0042.appimage",
            "/0042.AppImage.bak",
            "/0042",
            "/+042.AppImage",
            "/0042.",
        ] {
            assert!(
                matches!(VirtualPath::parse(path), Err(FsError::NotFound(_))),
                "{} should not resolve",
                path
            );
        }
    }

    #[test]
    fn test_non_numeric_names_are_not_found() {
        for path in ["/foo", "/foo.AppImage", "/.AppImage", "/-001.AppImage"] {
            assert!(
                matches!(VirtualPath::parse(path), Err(FsError::NotFound(_))),
                "{} should not resolve",
                path
            );
        }
    }

    #[test]
    fn test_id_overflow_is_not_found() {
        assert!(matches!(
            VirtualPath::parse("/99999999999.AppImage"),
            Err(FsError::NotFound(_))
        ));
    }

    #[test]
    fn test_classify_maps_errors_to_invalid() {
        assert_eq!(VirtualPath::classify("/a/b"), VirtualPath::Invalid);
        assert_eq!(VirtualPath::classify("/nope"), VirtualPath::Invalid);
        assert_eq!(VirtualPath::classify("/0001.AppImage"), VirtualPath::Entry(1));
    }

    // ========================================================================
    // Inode mapping
    // ========================================================================

    #[test]
    fn test_inode_mapping() {
        assert_eq!(VirtualPath::Root.ino(), Some(ROOT_INO));
        assert_eq!(VirtualPath::ListingFile.ino(), Some(LISTING_INO));
        assert_eq!(VirtualPath::RegisterChannel.ino(), Some(REGISTER_INO));
        assert_eq!(VirtualPath::Entry(0).ino(), Some(ENTRY_INO_BASE));
        assert_eq!(VirtualPath::Invalid.ino(), None);
    }

    #[test]
    fn test_reserved_inodes_are_invalid() {
        for ino in [0, 4, 5, ENTRY_INO_BASE - 1] {
            assert_eq!(VirtualPath::from_ino(ino), VirtualPath::Invalid);
        }
        assert_eq!(
            VirtualPath::from_ino(ENTRY_INO_BASE + u64::from(u32::MAX) + 1),
            VirtualPath::Invalid
        );
    }

    #[test]
    fn test_to_path_parses_back() {
        for node in [
            VirtualPath::Root,
            VirtualPath::ListingFile,
            VirtualPath::RegisterChannel,
            VirtualPath::Entry(3),
        ] {
            let path = node.to_path().unwrap();
            assert_eq!(VirtualPath::parse(&path).unwrap(), node);
        }
        assert_eq!(VirtualPath::Invalid.to_path(), None);
    }

    proptest! {
        #[test]
        fn prop_classification_is_stable(path in "\\PC{0,24}") {
            prop_assert_eq!(VirtualPath::classify(&path), VirtualPath::classify(&path));
        }

        #[test]
        fn prop_canonical_names_resolve(id in any::<u32>()) {
            let path = format!("/{}", canonical_name(id));
            prop_assert_eq!(VirtualPath::parse(&path).unwrap(), VirtualPath::Entry(id));
        }

        #[test]
        fn prop_entries_resolve_only_by_canonical_name(id in any::<u32>(), zeros in 1usize..4) {
            let padded = format!("/{}{}", "0".repeat(zeros), canonical_name(id));
            prop_assert!(VirtualPath::parse(&padded).is_err());
        }

        #[test]
        fn prop_inode_round_trip(id in any::<u32>()) {
            let node = VirtualPath::Entry(id);
            prop_assert_eq!(VirtualPath::from_ino(node.ino().unwrap()), node);
        }
    }
}
