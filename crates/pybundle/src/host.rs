//! Contracts for the host application services the installer talks to.
//!
//! The installer never renders UI itself. It reports through a
//! background-task handle, a notification surface, and an append-line
//! output channel, and persists its one setting through a [`ConfigStore`].
//! Consumers implement these traits to route everything to their own UI
//! layer; the `Log*` implementations here route to the `log` crate and are
//! enough for headless use.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use log::{error, info};
use serde::{Deserialize, Serialize};

/// Well-known configuration key recording the runtime installation root.
pub const INSTALL_PATH_KEY: &str = "notebook.pythonInstallPath";

/// Persistent string-keyed configuration, shared with the host application
/// and surviving process restarts.
pub trait ConfigStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Status of a background task as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Succeeded,
    Failed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in progress",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
        };
        write!(f, "{label}")
    }
}

/// Parameters for registering a background task with the host UI.
#[derive(Debug, Clone)]
pub struct TaskDescriptor {
    pub display_name: String,
    pub description: String,
    pub cancelable: bool,
}

/// Handle to one registered background task.
pub trait TaskHandle: Send + Sync {
    fn update_status(&self, status: TaskStatus, message: &str);
}

/// The host's long-running-job UI.
pub trait BackgroundTasks: Send + Sync {
    fn create(&self, task: TaskDescriptor) -> Arc<dyn TaskHandle>;
}

/// Fire-and-forget message display.
pub trait Notifier: Send + Sync {
    fn info(&self, message: &str);
    fn error(&self, message: &str);
}

/// Append-line log sink, optionally focused on demand.
pub trait OutputChannel: Send + Sync {
    fn append_line(&self, line: &str);
    fn show(&self) {}
}

/// First-run configuration dialog, opened when no runtime is installed yet.
pub trait InstallPrompt: Send + Sync {
    fn open_install_dialog(&self);
}

/// Log-only background task UI.
pub struct LogTasks;

struct LogTaskHandle {
    display_name: String,
}

impl BackgroundTasks for LogTasks {
    fn create(&self, task: TaskDescriptor) -> Arc<dyn TaskHandle> {
        info!("[task] {}: {}", task.display_name, task.description);
        Arc::new(LogTaskHandle {
            display_name: task.display_name,
        })
    }
}

impl TaskHandle for LogTaskHandle {
    fn update_status(&self, status: TaskStatus, message: &str) {
        match status {
            TaskStatus::Failed => error!("[task] {} {}: {}", self.display_name, status, message),
            _ => info!("[task] {} {}: {}", self.display_name, status, message),
        }
    }
}

/// Log-only notification surface.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn info(&self, message: &str) {
        info!("{message}");
    }

    fn error(&self, message: &str) {
        error!("{message}");
    }
}

/// Log-only output channel.
pub struct LogOutput;

impl OutputChannel for LogOutput {
    fn append_line(&self, line: &str) {
        info!("{line}");
    }
}

/// File-backed [`ConfigStore`]: a flat string map persisted as pretty JSON
/// on every write.
pub struct JsonConfigStore {
    path: PathBuf,
    values: Mutex<HashMap<String, String>>,
}

impl JsonConfigStore {
    /// Default location under the per-user config directory.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("pybundle")
            .join("config.json")
    }

    /// Load from `path`, falling back to an empty store when the file is
    /// missing or unreadable.
    pub fn load(path: PathBuf) -> Self {
        let values = std::fs::read_to_string(&path)
            .ok()
            .and_then(|contents| serde_json::from_str::<HashMap<String, String>>(&contents).ok())
            .unwrap_or_default();
        Self {
            path,
            values: Mutex::new(values),
        }
    }
}

impl ConfigStore for JsonConfigStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().unwrap().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let snapshot = {
            let mut values = self.values.lock().unwrap();
            values.insert(key.to_string(), value.to_string());
            values.clone()
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("could not create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&snapshot)?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("could not write {}", self.path.display()))?;
        Ok(())
    }
}
