//! Distribution metadata for the bundled Python runtime.
//!
//! The runtime is shipped as a platform-specific archive pinned to a
//! specific Python build and bundle version. Windows distributions are
//! zipped and carry an offline package directory; macOS and Linux
//! distributions are tarballs.

/// Python build shipped in the distribution archives.
pub const PYTHON_VERSION: &str = "3.8.10";

/// Identifier pinning which distribution build is fetched and expected on
/// disk. Also the name of the version subdirectory under the install root.
pub const BUNDLE_VERSION: &str = "0.0.1";

/// Version of the distributed-compute integration wheel bundled in the
/// offline package directory of Windows distributions.
pub const SPARKMAGIC_VERSION: &str = "0.12.9";

/// Requirements manifest inside the offline package directory.
pub const REQUIREMENTS_MANIFEST: &str = "requirements.txt";

/// OS family a distribution is built for. Unknown platforms fall back to
/// the Linux distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFamily {
    Windows,
    MacOs,
    Linux,
}

impl OsFamily {
    pub fn current() -> Self {
        match std::env::consts::OS {
            "windows" => OsFamily::Windows,
            "macos" => OsFamily::MacOs,
            _ => OsFamily::Linux,
        }
    }

    /// Platform identifier used in artifact filenames.
    pub fn platform_id(self) -> &'static str {
        match self {
            OsFamily::Windows => "win32",
            OsFamily::MacOs => "osx",
            OsFamily::Linux => "linux",
        }
    }

    pub fn archive_extension(self) -> &'static str {
        match self {
            OsFamily::Windows => "zip",
            OsFamily::MacOs | OsFamily::Linux => "tar.gz",
        }
    }

    pub fn is_windows(self) -> bool {
        self == OsFamily::Windows
    }

    /// Separator used when assembling PATH-like environment values.
    pub fn path_delimiter(self) -> char {
        match self {
            OsFamily::Windows => ';',
            OsFamily::MacOs | OsFamily::Linux => ':',
        }
    }
}

/// Fixed download location for each OS family's distribution archives.
pub fn distribution_base_url(os: OsFamily) -> &'static str {
    match os {
        OsFamily::Windows => "https://dist.nbdesk.dev/python/win32",
        OsFamily::MacOs => "https://dist.nbdesk.dev/python/osx",
        OsFamily::Linux => "https://dist.nbdesk.dev/python/linux",
    }
}

/// Archive filename for the given OS family, e.g.
/// `python-3.8.10-linux-0.0.1.tar.gz`.
pub fn artifact_name(os: OsFamily) -> String {
    format!(
        "python-{}-{}-{}.{}",
        PYTHON_VERSION,
        os.platform_id(),
        BUNDLE_VERSION,
        os.archive_extension()
    )
}

/// Full download URL for the given OS family's archive.
pub fn artifact_url(os: OsFamily) -> String {
    format!("{}/{}", distribution_base_url(os), artifact_name(os))
}

/// Exact filename of the distributed-compute integration wheel inside the
/// offline package directory.
pub fn sparkmagic_wheel_name() -> String {
    format!("sparkmagic-{}-py3-none-any.whl", SPARKMAGIC_VERSION)
}
