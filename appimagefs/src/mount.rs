//! Mount lifecycle.
//!
//! Prepares the mountpoint, refuses to start when another instance is
//! already mounted there, and runs the FUSE session either in the foreground
//! ([`mount`]) or on a background thread ([`spawn_mount`]).
//!
//! Live-instance detection only looks at `/proc/mounts`. A mountpoint left
//! behind by a crashed instance is reported as running until it is cleaned
//! up with [`unmount`].

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use fuser::{BackgroundSession, MountOption};
use tracing::{debug, info, warn};

use crate::error::{FsError, FsResult};
use crate::fuse::{AppImageFs, FuseAdapter};

/// Environment variable enabling debug mode.
pub const DEBUG_ENV: &str = "APPIMAGEFS_DEBUG";

/// Mode of the mountpoint directory.
pub const MOUNTPOINT_MODE: u32 = 0o750;

/// Name of the mountpoint directory inside the runtime directory.
const MOUNT_DIR_NAME: &str = "appimagefs";

/// Mount settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountConfig {
    /// Directory to mount on.
    pub mountpoint: PathBuf,
    /// Filesystem name shown in `/proc/mounts`.
    pub fs_name: String,
    /// Run in the foreground with trace logging.
    pub debug: bool,
    /// Let other users access the mount (requires `user_allow_other`).
    pub allow_other: bool,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self::new(default_mountpoint())
    }
}

impl MountConfig {
    /// Create a config for `mountpoint`.
    pub fn new(mountpoint: impl Into<PathBuf>) -> Self {
        Self {
            mountpoint: mountpoint.into(),
            fs_name: "appimagefs".to_string(),
            debug: false,
            allow_other: false,
        }
    }

    /// Enable debug mode if [`DEBUG_ENV`] is set.
    pub fn from_env(mut self) -> Self {
        if std::env::var_os(DEBUG_ENV).is_some() {
            self.debug = true;
        }
        self
    }

    /// Set debug mode.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Allow other users to access the mount.
    pub fn with_allow_other(mut self, allow_other: bool) -> Self {
        self.allow_other = allow_other;
        self
    }

    /// Set the filesystem name.
    pub fn with_fs_name(mut self, name: impl Into<String>) -> Self {
        self.fs_name = name.into();
        self
    }

    /// FUSE mount options for this config.
    pub fn mount_options(&self) -> Vec<MountOption> {
        let mut options = vec![
            MountOption::FSName(self.fs_name.clone()),
            MountOption::Subtype("appimagefs".to_string()),
            MountOption::NoDev,
            MountOption::NoSuid,
            MountOption::DefaultPermissions,
        ];
        if self.allow_other {
            options.push(MountOption::AllowOther);
        }
        options
    }
}

/// Default mountpoint: `$XDG_RUNTIME_DIR/appimagefs`, falling back to
/// `/run/user/<uid>/appimagefs`.
pub fn default_mountpoint() -> PathBuf {
    dirs::runtime_dir()
        .unwrap_or_else(|| {
            // SAFETY: getuid cannot fail and touches no memory
            let uid = unsafe { libc::getuid() };
            PathBuf::from(format!("/run/user/{}", uid))
        })
        .join(MOUNT_DIR_NAME)
}

/// Check whether `path` is currently a mountpoint.
pub fn is_mounted(path: &Path) -> bool {
    let Ok(mounts) = fs::read_to_string("/proc/mounts") else {
        return false;
    };
    let path_str = path.to_string_lossy();
    let path_str = match path_str.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    };

    mounts.lines().any(|line| {
        line.split_whitespace()
            .nth(1)
            .is_some_and(|mounted| unescape_mount_field(mounted) == path_str)
    })
}

/// Undo the octal escaping `/proc/mounts` applies to space, tab, newline
/// and backslash (`\040`, `\011`, `\012`, `\134`).
fn unescape_mount_field(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let escape = bytes.get(i + 1..i + 4).filter(|digits| {
            bytes[i] == b'\\' && digits.iter().all(|d| (b'0'..=b'7').contains(d))
        });
        match escape.map(|d| d.iter().fold(0u32, |acc, d| acc * 8 + u32::from(d - b'0'))) {
            Some(value) if value <= 0xff => {
                out.push(value as u8);
                i += 4;
            }
            _ => {
                out.push(bytes[i]);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Create the mountpoint directory with mode 0750.
///
/// # Errors
///
/// [`FsError::AlreadyRunning`] if something is already mounted there.
pub fn prepare_mountpoint(path: &Path) -> FsResult<()> {
    if is_mounted(path) {
        return Err(FsError::AlreadyRunning(path.to_path_buf()));
    }

    fs::create_dir_all(path)?;
    fs::set_permissions(path, fs::Permissions::from_mode(MOUNTPOINT_MODE))?;
    debug!(mountpoint = %path.display(), "Prepared mountpoint");
    Ok(())
}

/// Mount `fs` and serve requests on the calling thread until unmounted.
pub fn mount(fs: Arc<AppImageFs>, config: &MountConfig) -> FsResult<()> {
    prepare_mountpoint(&config.mountpoint)?;
    info!(
        mountpoint = %config.mountpoint.display(),
        debug = config.debug,
        "Mounting AppImage filesystem in the foreground"
    );

    fuser::mount2(
        FuseAdapter::new(fs),
        &config.mountpoint,
        &config.mount_options(),
    )
    .map_err(|e| FsError::MountFailed(e.to_string()))?;

    info!(mountpoint = %config.mountpoint.display(), "Filesystem unmounted");
    Ok(())
}

/// Mount `fs` and serve requests on a background thread.
pub fn spawn_mount(fs: Arc<AppImageFs>, config: &MountConfig) -> FsResult<MountSession> {
    prepare_mountpoint(&config.mountpoint)?;

    let session = fuser::spawn_mount2(
        FuseAdapter::new(fs),
        &config.mountpoint,
        &config.mount_options(),
    )
    .map_err(|e| FsError::MountFailed(e.to_string()))?;

    info!(mountpoint = %config.mountpoint.display(), "Mounted AppImage filesystem");
    Ok(MountSession {
        session: Some(session),
        mountpoint: config.mountpoint.clone(),
    })
}

/// Handle to a background FUSE session.
///
/// Dropping the handle unmounts the filesystem.
pub struct MountSession {
    session: Option<BackgroundSession>,
    mountpoint: PathBuf,
}

impl MountSession {
    /// Path the filesystem is mounted on.
    pub fn mountpoint(&self) -> &Path {
        &self.mountpoint
    }

    /// Whether the kernel still lists the mount. Turns false when someone
    /// runs `fusermount -u` on it.
    pub fn is_active(&self) -> bool {
        self.session.is_some() && is_mounted(&self.mountpoint)
    }

    /// Unmount and wait for the session thread to finish.
    pub fn unmount(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        debug!(mountpoint = %self.mountpoint.display(), "Stopping FUSE session");
        // The session unmounts itself when joined or dropped
        session.join();

        if is_mounted(&self.mountpoint) {
            warn!(
                mountpoint = %self.mountpoint.display(),
                "Still mounted after session end, escalating to fusermount"
            );
            if !unmount(&self.mountpoint, false) {
                unmount(&self.mountpoint, true);
            }
        }
        info!(mountpoint = %self.mountpoint.display(), "Filesystem unmounted");
    }
}

impl Drop for MountSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Unmount `path` with `fusermount3`, falling back to `fusermount`.
///
/// A lazy unmount (`-uz`) detaches immediately even while files are open.
/// Returns `true` if the path is no longer mounted afterwards.
pub fn unmount(path: &Path, lazy: bool) -> bool {
    let mountpoint = path.to_string_lossy().to_string();
    let args: &[&str] = if lazy {
        &["-uz", &mountpoint]
    } else {
        &["-u", &mountpoint]
    };

    let result = Command::new("fusermount3")
        .args(args)
        .output()
        .or_else(|_| Command::new("fusermount").args(args).output());

    match result {
        Ok(output) if output.status.success() => {
            debug!(mountpoint = %mountpoint, lazy, "Unmounted");
            true
        }
        Ok(output) => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // "not found" or "not mounted" means already unmounted
            if stderr.contains("not found") || stderr.contains("not mounted") {
                true
            } else {
                debug!(mountpoint = %mountpoint, lazy, stderr = %stderr, "fusermount failed");
                false
            }
        }
        Err(e) => {
            warn!(mountpoint = %mountpoint, error = %e, "Failed to run fusermount");
            false
        }
    }
}
