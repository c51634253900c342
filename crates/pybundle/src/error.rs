use std::path::PathBuf;

use thiserror::Error;

/// Terminal failures of a single install attempt. No step is retried; the
/// first failure unwinds the whole pipeline.
#[derive(Debug, Error)]
pub enum InstallError {
    /// The target executable appears to be locked by a running interpreter.
    #[error("python at {0} appears to be running, refusing to overwrite it")]
    RuntimeInUse(PathBuf),

    /// Another install is in flight on this instance; the call is rejected,
    /// not queued.
    #[error("a python installation is already in progress")]
    InstallAlreadyInProgress,

    #[error("could not create installation directory {path}: {message}")]
    DirectoryCreationFailed { path: PathBuf, message: String },

    /// Transport error or non-2xx response while fetching the archive.
    #[error("downloading the python distribution failed: {0}")]
    DownloadFailed(String),

    /// Stale-copy deletion or decompression failure.
    #[error("unpacking the python distribution failed: {0}")]
    UnpackFailed(String),

    /// A pip invocation exited with a non-zero status.
    #[error("installing bundled packages failed: {0}")]
    PackageInstallFailed(String),
}
