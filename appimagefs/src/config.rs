//! INI configuration file.
//!
//! Lives at `~/.config/appimagefs/config.ini`. Every key is optional; a
//! missing file yields the defaults. Command-line flags override whatever is
//! loaded here.
//!
//! ```ini
//! [mount]
//! mountpoint = /run/user/1000/appimagefs
//! allow_other = false
//!
//! [registry]
//! scan_dir = /home/user/Applications
//! scan_on_start = true
//!
//! [logging]
//! level = info
//! file = /home/user/.local/state/appimagefs/appimagefs.log
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use ini::{Ini, Properties};
use thiserror::Error;
use tracing::debug;

use crate::logging::{LoggingConfig, DEFAULT_LEVEL};
use crate::mount::default_mountpoint;

/// Errors from reading or writing the config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not determine the user config directory")]
    NoConfigDir,

    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: ini::Error,
    },

    #[error("Failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid value '{value}' for [{section}] {key}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
    },
}

/// `[mount]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountSettings {
    pub mountpoint: PathBuf,
    pub allow_other: bool,
}

impl Default for MountSettings {
    fn default() -> Self {
        Self {
            mountpoint: default_mountpoint(),
            allow_other: false,
        }
    }
}

/// `[registry]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrySettings {
    /// Directory scanned for `*.AppImage` files at startup.
    pub scan_dir: Option<PathBuf>,
    pub scan_on_start: bool,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            scan_dir: dirs::home_dir().map(|home| home.join("Applications")),
            scan_on_start: true,
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    pub level: String,
    pub file: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: DEFAULT_LEVEL.to_string(),
            file: None,
        }
    }
}

impl LoggingSettings {
    /// Logging config for these settings.
    pub fn to_logging_config(&self, debug: bool) -> LoggingConfig {
        LoggingConfig {
            level: self.level.clone(),
            file: self.file.clone(),
            debug,
        }
    }
}

/// Parsed configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigFile {
    pub mount: MountSettings,
    pub registry: RegistrySettings,
    pub logging: LoggingSettings,
}

/// Default location of the config file.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join("appimagefs").join("config.ini"))
        .ok_or(ConfigError::NoConfigDir)
}

impl ConfigFile {
    /// Load from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_file_path()?)
    }

    /// Load from `path`, falling back to defaults if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_ini(&ini)?;
        debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// Save to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&config_file_path()?)
    }

    /// Save to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        self.to_ini().write_to_file(path).map_err(write_err)
    }

    /// Flattened `section.key = value` pairs, for display.
    pub fn entries(&self) -> Vec<(String, String)> {
        let ini = self.to_ini();
        let mut entries = Vec::new();
        for (section, props) in ini.iter() {
            let Some(section) = section else { continue };
            for (key, value) in props.iter() {
                entries.push((format!("{}.{}", section, key), value.to_string()));
            }
        }
        entries
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(props) = ini.section(Some("mount")) {
            if let Some(mountpoint) = non_empty(props, "mountpoint") {
                config.mount.mountpoint = PathBuf::from(mountpoint);
            }
            if let Some(value) = parse_bool(props, "mount", "allow_other")? {
                config.mount.allow_other = value;
            }
        }

        if let Some(props) = ini.section(Some("registry")) {
            if let Some(dir) = props.get("scan_dir") {
                let dir = dir.trim();
                config.registry.scan_dir = (!dir.is_empty()).then(|| PathBuf::from(dir));
            }
            if let Some(value) = parse_bool(props, "registry", "scan_on_start")? {
                config.registry.scan_on_start = value;
            }
        }

        if let Some(props) = ini.section(Some("logging")) {
            if let Some(level) = non_empty(props, "level") {
                config.logging.level = level.to_string();
            }
            if let Some(file) = non_empty(props, "file") {
                config.logging.file = Some(PathBuf::from(file));
            }
        }

        Ok(config)
    }

    fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();
        ini.with_section(Some("mount"))
            .set("mountpoint", self.mount.mountpoint.to_string_lossy())
            .set("allow_other", self.mount.allow_other.to_string());
        ini.with_section(Some("registry"))
            .set(
                "scan_dir",
                self.registry
                    .scan_dir
                    .as_deref()
                    .map(|dir| dir.to_string_lossy().to_string())
                    .unwrap_or_default(),
            )
            .set("scan_on_start", self.registry.scan_on_start.to_string());
        ini.with_section(Some("logging"))
            .set("level", self.logging.level.as_str())
            .set(
                "file",
                self.logging
                    .file
                    .as_deref()
                    .map(|file| file.to_string_lossy().to_string())
                    .unwrap_or_default(),
            );
        ini
    }
}

fn non_empty<'a>(props: &'a Properties, key: &str) -> Option<&'a str> {
    props.get(key).map(str::trim).filter(|value| !value.is_empty())
}

fn parse_bool(props: &Properties, section: &str, key: &str) -> Result<Option<bool>, ConfigError> {
    let Some(value) = non_empty(props, key) else {
        return Ok(None);
    };
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(Some(true)),
        "false" | "no" | "off" | "0" => Ok(Some(false)),
        _ => Err(ConfigError::InvalidValue {
            section: section.to_string(),
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp = tempfile::tempdir().unwrap();
        let config = ConfigFile::load_from(&temp.path().join("nope.ini")).unwrap();
        assert_eq!(config, ConfigFile::default());
        assert!(config.registry.scan_on_start);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_all_sections() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("config.ini");
        fs::write(
            &path,
            "[mount]\nmountpoint = /tmp/apps\nallow_other = yes\n\n\
             [registry]\nscan_dir = /opt/apps\nscan_on_start = false\n\n\
             [logging]\nlevel = debug\nfile = /tmp/appimagefs.log\n",
        )
        .unwrap();

        let config = ConfigFile::load_from(&path).unwrap();
        assert_eq!(config.mount.mountpoint, PathBuf::from("/tmp/apps"));
        assert!(config.mount.allow_other);
        assert_eq!(config.registry.scan_dir, Some(PathBuf::from("/opt/apps")));
        assert!(!config.registry.scan_on_start);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.file, Some(PathBuf::from("/tmp/appimagefs.log")));
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("config.ini");
        fs::write(&path, "[mount]\ncolour = blue\n[extra]\nkey = 1\n").unwrap();

        let config = ConfigFile::load_from(&path).unwrap();
        assert_eq!(config, ConfigFile::default());
    }

    #[test]
    fn test_invalid_bool_rejected() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("config.ini");
        fs::write(&path, "[registry]\nscan_on_start = maybe\n").unwrap();

        match ConfigFile::load_from(&path) {
            Err(ConfigError::InvalidValue { section, key, value }) => {
                assert_eq!(section, "registry");
                assert_eq!(key, "scan_on_start");
                assert_eq!(value, "maybe");
            }
            other => panic!("expected InvalidValue, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_scan_dir_disables_scan_dir() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("config.ini");
        fs::write(&path, "[registry]\nscan_dir =\n").unwrap();

        let config = ConfigFile::load_from(&path).unwrap();
        assert_eq!(config.registry.scan_dir, None);
    }

    #[test]
    fn test_save_then_load() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("nested").join("config.ini");
        let mut config = ConfigFile::default();
        config.mount.mountpoint = PathBuf::from("/tmp/mnt");
        config.registry.scan_dir = None;
        config.logging.file = Some(PathBuf::from("/tmp/log/appimagefs.log"));

        config.save_to(&path).unwrap();

        assert_eq!(ConfigFile::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_entries_are_qualified() {
        let entries = ConfigFile::default().entries();
        let keys: Vec<&str> = entries.iter().map(|(k, _)| k.as_str()).collect();
        assert!(keys.contains(&"mount.mountpoint"));
        assert!(keys.contains(&"registry.scan_on_start"));
        assert!(keys.contains(&"logging.level"));
    }

    #[test]
    fn test_logging_settings_conversion() {
        let settings = LoggingSettings {
            level: "warn".to_string(),
            file: None,
        };
        let config = settings.to_logging_config(true);
        assert_eq!(config.directive(), "trace");
    }
}
