//! Managed Python runtime for the notebook desktop app.
//!
//! Downloads a version-pinned Python distribution, unpacks it under a
//! configurable installation root, and (on Windows) installs the bundled
//! notebook packages from the offline package directory. The host
//! application plugs in its own progress, notification, and configuration
//! surfaces through the traits in [`host`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use pybundle::{host, PythonInstaller};
//!
//! # async fn run() -> Result<(), pybundle::InstallError> {
//! let config = Arc::new(host::JsonConfigStore::load(host::JsonConfigStore::default_path()));
//! let installer = PythonInstaller::new(
//!     config,
//!     Arc::new(host::LogTasks),
//!     Arc::new(host::LogNotifier),
//!     Arc::new(host::LogOutput),
//! );
//! installer.start_install(false, None).await?;
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod dist;
pub mod download;
pub mod error;
pub mod host;
pub mod installer;
pub mod paths;
pub mod pip;

pub use error::InstallError;
pub use installer::{default_install_root, PythonInstaller};
pub use paths::RuntimePaths;
