//! Extraction of downloaded runtime archives.
//!
//! Windows distributions are zip archives; macOS and Linux distributions
//! are gzipped tarballs. Extraction is CPU and disk bound, so it runs on
//! the blocking thread pool.

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use flate2::read::GzDecoder;
use log::info;
use tar::Archive;
use zip::ZipArchive;

/// Remove a leftover extracted copy at `version_dir`, if any. A runtime
/// that cannot be deleted fails the install rather than being overwritten
/// in place.
pub async fn remove_stale_copy(version_dir: &Path) -> Result<()> {
    if tokio::fs::try_exists(version_dir).await? {
        info!("removing previous runtime at {:?}", version_dir);
        tokio::fs::remove_dir_all(version_dir)
            .await
            .with_context(|| format!("could not remove previous runtime at {}", version_dir.display()))?;
    }
    Ok(())
}

/// Unpack `archive_path` into `dest`, then delete the archive file.
pub async fn unpack_and_cleanup(archive_path: &Path, dest: &Path) -> Result<()> {
    let archive = archive_path.to_path_buf();
    let dest_dir = dest.to_path_buf();
    tokio::task::spawn_blocking(move || extract(&archive, &dest_dir))
        .await
        .map_err(|e| anyhow!("extraction task panicked: {e}"))??;

    tokio::fs::remove_file(archive_path)
        .await
        .with_context(|| format!("could not delete archive {}", archive_path.display()))?;
    Ok(())
}

fn extract(archive_path: &Path, dest: &Path) -> Result<()> {
    let name = archive_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();

    if name.ends_with(".zip") {
        extract_zip(archive_path, dest)
    } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        extract_tar_gz(archive_path, dest)
    } else {
        Err(anyhow!("unsupported archive format: {name}"))
    }
}

fn extract_tar_gz(archive_path: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive_path)
        .with_context(|| format!("could not open {}", archive_path.display()))?;
    let mut archive = Archive::new(GzDecoder::new(file));
    archive
        .unpack(dest)
        .with_context(|| format!("could not unpack {}", archive_path.display()))?;
    Ok(())
}

fn extract_zip(archive_path: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive_path)
        .with_context(|| format!("could not open {}", archive_path.display()))?;
    let mut archive = ZipArchive::new(file)
        .with_context(|| format!("could not read {}", archive_path.display()))?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        // Skip entries that would escape the destination.
        let out_path: PathBuf = match entry.enclosed_name() {
            Some(path) => dest.join(path),
            None => continue,
        };

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out_file = File::create(&out_path)
            .with_context(|| format!("could not create {}", out_path.display()))?;
        std::io::copy(&mut entry, &mut out_file)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                std::fs::set_permissions(&out_path, std::fs::Permissions::from_mode(mode))?;
            }
        }
    }
    Ok(())
}
