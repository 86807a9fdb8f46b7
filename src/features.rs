//! Capability model.
//!
//! A `Features` record declares which optional behaviors a candidate store
//! claims to support. It is built once per run from a preset or an
//! explicit TOML configuration and never mutated by tests. The baseline
//! suite consults it before entering a gated group; a `false` flag means
//! the group is recorded as skipped, never as a failure.

use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum FeaturesError {
    #[error("failed to read features file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse features file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("unknown features preset {0:?} (expected posix, minimal, or host)")]
    UnknownPreset(String),
}

/// Optional capabilities of a storage implementation.
///
/// Flags absent from an explicit configuration default to `false`, so a
/// TOML file only needs to name what the candidate actually supports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Features {
    /// The store supports symbolic links (lstat, readlink, symlink).
    pub symlinks: bool,

    /// The store supports hard links.
    pub hard_links: bool,

    /// The store supports Unix-style permission bits.
    pub permissions: bool,

    /// The store supports access/modification timestamps.
    pub timestamps: bool,

    /// Paths are case-sensitive.
    pub case_sensitive: bool,

    /// Rename over an existing entry replaces it atomically.
    pub atomic_rename: bool,

    /// The store supports sparse files.
    pub sparse_files: bool,

    /// The store supports files larger than 2 GiB.
    pub large_files: bool,
}

impl Features {
    /// Everything enabled: what a full POSIX-like store supports.
    pub fn default_posix() -> Self {
        Self {
            symlinks: true,
            hard_links: true,
            permissions: true,
            timestamps: true,
            case_sensitive: true,
            atomic_rename: true,
            sparse_files: true,
            large_files: true,
        }
    }

    /// The minimum every implementation is expected to support.
    pub fn minimal() -> Self {
        Self {
            case_sensitive: true,
            ..Self::default()
        }
    }

    /// Capabilities of the host filesystem this binary was compiled for.
    #[cfg(unix)]
    pub fn host_os() -> Self {
        Self::default_posix()
    }

    /// Capabilities of the host filesystem this binary was compiled for.
    ///
    /// Symlink creation needs elevated privileges on Windows and case
    /// sensitivity is off by default, so neither is claimed.
    #[cfg(not(unix))]
    pub fn host_os() -> Self {
        Self {
            symlinks: false,
            hard_links: true,
            permissions: false,
            timestamps: true,
            case_sensitive: false,
            atomic_rename: true,
            sparse_files: true,
            large_files: true,
        }
    }

    pub fn preset(name: &str) -> Result<Self, FeaturesError> {
        match name {
            "posix" => Ok(Self::default_posix()),
            "minimal" => Ok(Self::minimal()),
            "host" => Ok(Self::host_os()),
            other => Err(FeaturesError::UnknownPreset(other.to_string())),
        }
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, FeaturesError> {
        let text = std::fs::read_to_string(path).map_err(|source| FeaturesError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| FeaturesError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}
