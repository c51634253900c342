//! Path and environment derivation for an installed runtime.
//!
//! Everything here is a pure function of the installation root, the pinned
//! bundle version, and the OS family. The installer recomputes the whole
//! [`RuntimePaths`] struct whenever the root changes; individual fields are
//! never patched.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::dist::{OsFamily, BUNDLE_VERSION};

/// Environment variables that must not leak from the host process into
/// child invocations of the bundled runtime.
const SCRUBBED_VARS: &[&str] = &["PYTHONPATH", "PYTHONSTARTUP", "PYTHONHOME"];

/// Filesystem layout derived from an installation root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimePaths {
    /// Configured installation root.
    pub install_root: PathBuf,
    /// `{root}/{bundleVersion}`, where the archive unpacks to.
    pub version_dir: PathBuf,
    /// The interpreter: `python.exe` on Windows, `bin/python3` elsewhere.
    pub executable: PathBuf,
    /// Directory containing the interpreter.
    pub bin_dir: PathBuf,
    /// `Scripts` subdirectory holding console entry points (Windows only).
    pub scripts_dir: PathBuf,
    /// Offline package directory used for no-network pip installs.
    pub package_dir: PathBuf,
    os: OsFamily,
}

impl RuntimePaths {
    pub fn derive(install_root: &Path, os: OsFamily) -> Self {
        let version_dir = install_root.join(BUNDLE_VERSION);
        let (executable, bin_dir) = if os.is_windows() {
            (version_dir.join("python.exe"), version_dir.clone())
        } else {
            (
                version_dir.join("bin").join("python3"),
                version_dir.join("bin"),
            )
        };

        Self {
            install_root: install_root.to_path_buf(),
            executable,
            bin_dir,
            scripts_dir: version_dir.join("Scripts"),
            package_dir: version_dir.join("offlinePackages"),
            version_dir,
            os,
        }
    }

    pub fn os(&self) -> OsFamily {
        self.os
    }

    /// PATH-like value with the runtime's tool directories prepended to the
    /// inherited PATH. On Windows both the `Scripts` directory and the bin
    /// directory are prepended, in that order; elsewhere only the bin
    /// directory.
    pub fn env_path(&self, inherited_path: &str) -> String {
        let delimiter = self.os.path_delimiter().to_string();
        let mut parts = Vec::new();
        if self.os.is_windows() {
            parts.push(self.scripts_dir.to_string_lossy().into_owned());
        }
        parts.push(self.bin_dir.to_string_lossy().into_owned());
        if !inherited_path.is_empty() {
            parts.push(inherited_path.to_string());
        }
        parts.join(&delimiter)
    }
}

/// Build the environment map for subprocess invocations of the bundled
/// runtime: Python-specific variables are removed and PATH is replaced by
/// the derived value. Pure over `ambient`; the process environment is never
/// mutated, the derived map is passed explicitly to every subprocess call.
pub fn subprocess_env(
    paths: &RuntimePaths,
    ambient: impl IntoIterator<Item = (String, String)>,
) -> HashMap<String, String> {
    let mut env: HashMap<String, String> = ambient
        .into_iter()
        .filter(|(key, _)| !SCRUBBED_VARS.contains(&key.as_str()))
        .collect();
    let inherited = env.get("PATH").cloned().unwrap_or_default();
    env.insert("PATH".to_string(), paths.env_path(&inherited));
    env
}
