//! End-to-end install pipeline tests against a loopback HTTP server.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use pybundle::host::{
    BackgroundTasks, ConfigStore, InstallPrompt, Notifier, OutputChannel, TaskDescriptor,
    TaskHandle, TaskStatus, INSTALL_PATH_KEY,
};
use pybundle::{InstallError, PythonInstaller};

#[derive(Default)]
struct Inner {
    statuses: Mutex<Vec<(TaskStatus, String)>>,
    tasks_created: AtomicUsize,
    notes: Mutex<Vec<String>>,
    lines: Mutex<Vec<String>>,
}

/// Records every host interaction the installer makes.
#[derive(Default, Clone)]
struct Recorder(Arc<Inner>);

impl BackgroundTasks for Recorder {
    fn create(&self, _task: TaskDescriptor) -> Arc<dyn TaskHandle> {
        self.0.tasks_created.fetch_add(1, Ordering::SeqCst);
        Arc::new(self.clone())
    }
}

impl TaskHandle for Recorder {
    fn update_status(&self, status: TaskStatus, message: &str) {
        self.0
            .statuses
            .lock()
            .unwrap()
            .push((status, message.to_string()));
    }
}

impl Notifier for Recorder {
    fn info(&self, message: &str) {
        self.0.notes.lock().unwrap().push(message.to_string());
    }

    fn error(&self, message: &str) {
        self.0.notes.lock().unwrap().push(message.to_string());
    }
}

impl OutputChannel for Recorder {
    fn append_line(&self, line: &str) {
        self.0.lines.lock().unwrap().push(line.to_string());
    }
}

#[derive(Default)]
struct MemoryConfig(Mutex<HashMap<String, String>>);

impl ConfigStore for MemoryConfig {
    fn get(&self, key: &str) -> Option<String> {
        self.0.lock().unwrap().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.0
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Minimal HTTP server answering every request with the same response.
/// Returns the base URL to point the installer at.
async fn serve(status_line: &'static str, body: Vec<u8>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let body = body.clone();
            tokio::spawn(async move {
                let mut request = [0u8; 1024];
                let _ = socket.read(&mut request).await;
                let header = format!(
                    "HTTP/1.1 {status_line}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                );
                let _ = socket.write_all(header.as_bytes()).await;
                let _ = socket.write_all(&body).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    format!("http://{addr}")
}

/// Gzipped tarball shaped like a real distribution: the interpreter under
/// `{bundleVersion}/bin/python3`.
fn runtime_archive() -> Vec<u8> {
    let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);
    let contents: &[u8] = b"#!/bin/sh\nexit 0\n";
    let mut header = tar::Header::new_gnu();
    header.set_size(contents.len() as u64);
    header.set_mode(0o755);
    header.set_cksum();
    builder
        .append_data(&mut header, "0.0.1/bin/python3", contents)
        .unwrap();
    builder.into_inner().unwrap().finish().unwrap()
}

fn build_installer(
    base: &str,
    recorder: &Recorder,
    config: Arc<MemoryConfig>,
) -> PythonInstaller {
    PythonInstaller::new(
        config,
        Arc::new(recorder.clone()),
        Arc::new(recorder.clone()),
        Arc::new(recorder.clone()),
    )
    .with_distribution_base(base)
}

#[tokio::test]
async fn install_downloads_and_unpacks() {
    let base = serve("200 OK", runtime_archive()).await;
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("py");
    let recorder = Recorder::default();
    let config = Arc::new(MemoryConfig::default());
    let installer = build_installer(&base, &recorder, config.clone());

    assert!(!installer.is_python_installed());
    installer
        .start_install(false, Some(root.clone()))
        .await
        .unwrap();

    let paths = installer.paths();
    assert_eq!(paths.install_root, root);
    assert_eq!(paths.executable, root.join("0.0.1/bin/python3"));
    assert!(paths.executable.exists());
    assert!(installer.is_python_installed());
    assert_eq!(
        config.get(INSTALL_PATH_KEY).as_deref(),
        Some(root.to_str().unwrap())
    );

    let statuses = recorder.0.statuses.lock().unwrap();
    assert_eq!(statuses.first().unwrap().0, TaskStatus::InProgress);
    assert_eq!(statuses.last().unwrap().0, TaskStatus::Succeeded);
    let lines = recorder.0.lines.lock().unwrap();
    assert!(lines.iter().any(|l| l.starts_with("Downloaded ")));
    // Package installs are a Windows-only pipeline stage.
    assert!(!lines
        .iter()
        .any(|l| l.contains("Installing bundled") || l.contains("sparkmagic")));
}

#[tokio::test]
async fn corrupt_archive_fails_unpack_and_spares_siblings() {
    // A 200 response whose body is not a valid gzip stream.
    let base = serve("200 OK", b"this is not an archive".to_vec()).await;
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("py");
    std::fs::create_dir_all(root.join("0.0.1")).unwrap();
    std::fs::write(root.join("0.0.1/leftover"), b"old").unwrap();
    std::fs::write(root.join("keep.txt"), b"unrelated").unwrap();

    let recorder = Recorder::default();
    let installer = build_installer(&base, &recorder, Arc::new(MemoryConfig::default()));

    let err = installer
        .start_install(false, Some(root.clone()))
        .await
        .unwrap_err();
    assert!(matches!(err, InstallError::UnpackFailed(_)));

    // Only the stale version directory was deleted; siblings survive.
    assert!(!root.join("0.0.1").exists());
    assert!(root.join("keep.txt").exists());

    let statuses = recorder.0.statuses.lock().unwrap();
    let (status, message) = statuses.last().unwrap();
    assert_eq!(*status, TaskStatus::Failed);
    assert!(message.contains("unpacking the python distribution failed"));
}

#[tokio::test]
async fn existing_runtime_skips_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("py");
    std::fs::create_dir_all(root.join("0.0.1/bin")).unwrap();
    std::fs::write(root.join("0.0.1/bin/python3"), b"#!/bin/sh\n").unwrap();

    let recorder = Recorder::default();
    let config = Arc::new(MemoryConfig::default());
    // Unroutable base: any download attempt would fail the test.
    let installer = build_installer("http://127.0.0.1:9", &recorder, config.clone());

    installer
        .start_install(false, Some(root.clone()))
        .await
        .unwrap();

    assert_eq!(recorder.0.tasks_created.load(Ordering::SeqCst), 0);
    assert_eq!(
        config.get(INSTALL_PATH_KEY).as_deref(),
        Some(root.to_str().unwrap())
    );
}

#[tokio::test]
async fn non_200_fails_and_clears_guard() {
    let base = serve("404 Not Found", b"missing".to_vec()).await;
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("py");
    let recorder = Recorder::default();
    let installer = build_installer(&base, &recorder, Arc::new(MemoryConfig::default()));

    let err = installer
        .start_install(false, Some(root.clone()))
        .await
        .unwrap_err();
    assert!(matches!(err, InstallError::DownloadFailed(_)));
    assert!(!root.join("0.0.1").exists());
    assert!(!installer.is_python_installed());
    {
        let statuses = recorder.0.statuses.lock().unwrap();
        assert_eq!(statuses.last().unwrap().0, TaskStatus::Failed);
    }

    // The failure released the in-progress guard: the retry reaches the
    // download again instead of being rejected.
    let err = installer
        .start_install(false, Some(root))
        .await
        .unwrap_err();
    assert!(matches!(err, InstallError::DownloadFailed(_)));
}

#[tokio::test]
async fn concurrent_installs_one_rejected() {
    let base = serve("200 OK", runtime_archive()).await;
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("py");
    let recorder = Recorder::default();
    let installer = build_installer(&base, &recorder, Arc::new(MemoryConfig::default()));

    let (first, second) = tokio::join!(
        installer.start_install(false, Some(root.clone())),
        installer.start_install(false, Some(root.clone())),
    );

    // The first call holds the guard through its first await point, so the
    // second is rejected without touching disk.
    first.unwrap();
    assert!(matches!(second, Err(InstallError::InstallAlreadyInProgress)));

    // Once finished, the next call sees the installed runtime and succeeds.
    installer.start_install(false, Some(root)).await.unwrap();
}

#[tokio::test]
async fn force_reinstall_replaces_previous_copy() {
    let base = serve("200 OK", runtime_archive()).await;
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("py");
    std::fs::create_dir_all(root.join("0.0.1/bin")).unwrap();
    std::fs::write(root.join("0.0.1/bin/python3"), b"#!/bin/sh\n").unwrap();
    std::fs::write(root.join("0.0.1/stale-marker"), b"old").unwrap();

    let recorder = Recorder::default();
    let installer = build_installer(&base, &recorder, Arc::new(MemoryConfig::default()));

    installer
        .start_install(true, Some(root.clone()))
        .await
        .unwrap();

    // The previous copy was deleted wholesale before unpacking.
    assert!(!root.join("0.0.1/stale-marker").exists());
    assert!(root.join("0.0.1/bin/python3").exists());
}

struct FlagPrompt(AtomicBool);

impl InstallPrompt for FlagPrompt {
    fn open_install_dialog(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn prompt_opens_only_when_runtime_missing() {
    let base = serve("200 OK", runtime_archive()).await;
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("py");
    let recorder = Recorder::default();
    let installer = build_installer(&base, &recorder, Arc::new(MemoryConfig::default()));

    let prompt = FlagPrompt(AtomicBool::new(false));
    installer.prompt_for_install(&prompt);
    assert!(prompt.0.load(Ordering::SeqCst));

    installer.start_install(false, Some(root)).await.unwrap();

    let prompt = FlagPrompt(AtomicBool::new(false));
    installer.prompt_for_install(&prompt);
    assert!(!prompt.0.load(Ordering::SeqCst));
}

#[tokio::test]
async fn config_key_without_runtime_on_disk_is_not_installed() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = Recorder::default();
    let config = Arc::new(MemoryConfig::default());
    config
        .set(INSTALL_PATH_KEY, dir.path().to_str().unwrap())
        .unwrap();
    let installer = build_installer("http://127.0.0.1:9", &recorder, config);

    assert!(!installer.is_python_installed());
}
