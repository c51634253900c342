//! The Python runtime installer.
//!
//! Ensures a working, version-pinned Python runtime exists at the
//! configured location, downloading and unpacking it on demand. At most one
//! install runs at a time per instance; a second attempt is rejected rather
//! than queued, and an install never overwrites an interpreter that appears
//! to be executing. Progress is reported through the host collaborators in
//! [`crate::host`].

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use log::{info, warn};

use crate::archive;
use crate::dist::{self, OsFamily};
use crate::download;
use crate::error::InstallError;
use crate::host::{
    BackgroundTasks, ConfigStore, InstallPrompt, Notifier, OutputChannel, TaskDescriptor,
    TaskStatus, INSTALL_PATH_KEY,
};
use crate::paths::{subprocess_env, RuntimePaths};
use crate::pip;

/// Default installation root under the per-user data directory.
pub fn default_install_root() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("pybundle")
        .join("python")
}

/// OS error codes read as "the file is locked by a running process" when
/// probing the interpreter for exclusive write access.
#[cfg(windows)]
const BUSY_ERROR_CODES: &[i32] = &[5, 32]; // ERROR_ACCESS_DENIED, ERROR_SHARING_VIOLATION
#[cfg(unix)]
const BUSY_ERROR_CODES: &[i32] = &[26]; // ETXTBSY
#[cfg(not(any(unix, windows)))]
const BUSY_ERROR_CODES: &[i32] = &[];

/// Heuristic check whether the executable is currently running, by opening
/// it in a mode requiring exclusive write access. Busy or permission error
/// codes read as "running"; a successful open (closed immediately) or any
/// other failure, including a missing file, reads as "not running".
///
/// Known limitation: this races with process startup and depends on
/// OS-specific error codes. A recorded PID with a liveness probe would be
/// more reliable.
fn is_python_running(executable: &Path) -> bool {
    match std::fs::OpenOptions::new().write(true).open(executable) {
        Ok(file) => {
            drop(file);
            false
        }
        Err(e) => matches!(e.raw_os_error(), Some(code) if BUSY_ERROR_CODES.contains(&code)),
    }
}

struct InstallState {
    paths: RuntimePaths,
}

/// Installs and tracks the bundled Python runtime.
pub struct PythonInstaller {
    os: OsFamily,
    http: reqwest::Client,
    config: Arc<dyn ConfigStore>,
    tasks: Arc<dyn BackgroundTasks>,
    notifier: Arc<dyn Notifier>,
    output: Arc<dyn OutputChannel>,
    state: Mutex<InstallState>,
    install_in_progress: AtomicBool,
    distribution_base: Option<String>,
}

impl PythonInstaller {
    /// Create an installer rooted at the path recorded in the config store,
    /// or the default install root when nothing is recorded yet.
    pub fn new(
        config: Arc<dyn ConfigStore>,
        tasks: Arc<dyn BackgroundTasks>,
        notifier: Arc<dyn Notifier>,
        output: Arc<dyn OutputChannel>,
    ) -> Self {
        let os = OsFamily::current();
        let root = config
            .get(INSTALL_PATH_KEY)
            .map(PathBuf::from)
            .unwrap_or_else(default_install_root);
        Self {
            os,
            http: reqwest::Client::new(),
            config,
            tasks,
            notifier,
            output,
            state: Mutex::new(InstallState {
                paths: RuntimePaths::derive(&root, os),
            }),
            install_in_progress: AtomicBool::new(false),
            distribution_base: None,
        }
    }

    /// Override the distribution download location (mirrors, tests). The
    /// artifact filename is appended to this base.
    pub fn with_distribution_base(mut self, base: impl Into<String>) -> Self {
        self.distribution_base = Some(base.into());
        self
    }

    /// Current derived layout. Valid once the installer is constructed;
    /// recomputed wholesale whenever the installation path changes.
    pub fn paths(&self) -> RuntimePaths {
        self.state.lock().unwrap().paths.clone()
    }

    /// True iff the config store records an installation path and the
    /// interpreter exists at the derived location under it. Deliberately
    /// consults the store rather than in-memory state, which may still hold
    /// the unpersisted default.
    pub fn is_python_installed(&self) -> bool {
        match self.config.get(INSTALL_PATH_KEY) {
            Some(root) => RuntimePaths::derive(Path::new(&root), self.os)
                .executable
                .exists(),
            None => false,
        }
    }

    /// Open the first-run configuration dialog when no runtime is
    /// installed; no-op otherwise.
    pub fn prompt_for_install(&self, prompt: &dyn InstallPrompt) {
        if !self.is_python_installed() {
            prompt.open_install_dialog();
        }
    }

    /// Ensure the runtime exists, downloading and unpacking it if needed.
    ///
    /// When the interpreter is already present and `force_install` is
    /// false, the pipeline is skipped entirely but the installation path is
    /// still persisted to the config store. The returned future resolves
    /// with the actual pipeline outcome; the in-progress guard is cleared
    /// exactly once on every exit path.
    pub async fn start_install(
        &self,
        force_install: bool,
        installation_path: Option<PathBuf>,
    ) -> Result<(), InstallError> {
        // Guard 1: never overwrite a binary that is locked/executing.
        let candidate = match &installation_path {
            Some(root) => RuntimePaths::derive(root, self.os),
            None => self.paths(),
        };
        if is_python_running(&candidate.executable) {
            return Err(InstallError::RuntimeInUse(candidate.executable));
        }

        // Guard 2: one install at a time; reject, don't queue.
        if self
            .install_in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(InstallError::InstallAlreadyInProgress);
        }

        // Commit the new configuration; derived paths are recomputed
        // together, never patched field by field.
        self.state.lock().unwrap().paths = candidate.clone();

        let result = self.run_install(force_install, candidate).await;
        self.install_in_progress.store(false, Ordering::SeqCst);
        result
    }

    async fn run_install(
        &self,
        force_install: bool,
        paths: RuntimePaths,
    ) -> Result<(), InstallError> {
        if paths.executable.exists() && !force_install {
            info!(
                "python already present at {:?}, skipping install",
                paths.executable
            );
            self.persist_install_root(&paths);
            return Ok(());
        }

        let task = self.tasks.create(TaskDescriptor {
            display_name: "Installing Python runtime".to_string(),
            description: format!("Python {} ({})", dist::PYTHON_VERSION, dist::BUNDLE_VERSION),
            cancelable: false,
        });
        task.update_status(TaskStatus::InProgress, "Installing the bundled Python runtime");
        self.notifier
            .info("Installing the bundled Python runtime in the background");
        self.output.append_line(&format!(
            "Installing Python {} to {}",
            dist::PYTHON_VERSION,
            paths.install_root.display()
        ));
        self.output.show();

        match self.run_pipeline(&paths).await {
            Ok(()) => {
                self.persist_install_root(&paths);
                let message = format!(
                    "Python runtime installed at {}",
                    paths.version_dir.display()
                );
                task.update_status(TaskStatus::Succeeded, &message);
                self.notifier.info(&message);
                self.output.append_line(&message);
                Ok(())
            }
            Err(err) => {
                let message = format!("Python runtime installation failed: {err}");
                task.update_status(TaskStatus::Failed, &message);
                self.notifier.error(&message);
                self.output.append_line(&message);
                Err(err)
            }
        }
    }

    /// The sequential install pipeline: download, unpack, then (Windows
    /// only) offline package installs. Any failure is terminal for this
    /// attempt; nothing is retried.
    async fn run_pipeline(&self, paths: &RuntimePaths) -> Result<(), InstallError> {
        tokio::fs::create_dir_all(&paths.install_root)
            .await
            .map_err(|e| InstallError::DirectoryCreationFailed {
                path: paths.install_root.clone(),
                message: e.to_string(),
            })?;

        let artifact = paths.install_root.join(dist::artifact_name(self.os));
        let url = self.artifact_url();
        self.output.append_line(&format!("Downloading {url}"));
        download::download_to_file(&self.http, &url, &artifact, self.output.as_ref())
            .await
            .map_err(|e| InstallError::DownloadFailed(format!("{e:#}")))?;

        archive::remove_stale_copy(&paths.version_dir)
            .await
            .map_err(|e| InstallError::UnpackFailed(format!("{e:#}")))?;
        self.output
            .append_line(&format!("Unpacking {}", artifact.display()));
        archive::unpack_and_cleanup(&artifact, &paths.install_root)
            .await
            .map_err(|e| InstallError::UnpackFailed(format!("{e:#}")))?;

        // Offline package sets ship only with Windows distributions.
        if self.os.is_windows() {
            let env = subprocess_env(paths, std::env::vars());
            self.output
                .append_line("Installing bundled notebook packages");
            pip::install_requirements(paths, &env, self.output.as_ref())
                .await
                .map_err(|e| InstallError::PackageInstallFailed(format!("{e:#}")))?;
            self.output
                .append_line("Installing the sparkmagic integration");
            pip::install_sparkmagic(paths, &env, self.output.as_ref())
                .await
                .map_err(|e| InstallError::PackageInstallFailed(format!("{e:#}")))?;
        }

        Ok(())
    }

    fn artifact_url(&self) -> String {
        match &self.distribution_base {
            Some(base) => format!(
                "{}/{}",
                base.trim_end_matches('/'),
                dist::artifact_name(self.os)
            ),
            None => dist::artifact_url(self.os),
        }
    }

    /// Persisting the path must not fail an otherwise successful install;
    /// the runtime on disk is the source of truth.
    fn persist_install_root(&self, paths: &RuntimePaths) {
        if let Err(e) = self
            .config
            .set(INSTALL_PATH_KEY, &paths.install_root.to_string_lossy())
        {
            warn!("could not persist installation path: {e:#}");
        }
    }
}
