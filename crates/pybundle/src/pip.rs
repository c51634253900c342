//! Offline package installation via the bundled interpreter's pip.
//!
//! Windows distributions ship an offline package directory; pip is pointed
//! at it with `--no-index --find-links` so no network is touched. Child
//! output is streamed line by line to the output channel.

use std::collections::HashMap;
use std::ffi::OsString;
use std::process::Stdio;

use anyhow::{anyhow, Context, Result};
use log::info;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::dist::{sparkmagic_wheel_name, REQUIREMENTS_MANIFEST};
use crate::host::OutputChannel;
use crate::paths::RuntimePaths;

/// Install the bundled requirements manifest from the offline package
/// directory.
pub async fn install_requirements(
    paths: &RuntimePaths,
    env: &HashMap<String, String>,
    output: &dyn OutputChannel,
) -> Result<()> {
    let manifest = paths.package_dir.join(REQUIREMENTS_MANIFEST);
    pip_install_offline(
        paths,
        env,
        &[OsString::from("-r"), manifest.into_os_string()],
        output,
    )
    .await
}

/// Install the distributed-compute integration wheel by its exact filename.
pub async fn install_sparkmagic(
    paths: &RuntimePaths,
    env: &HashMap<String, String>,
    output: &dyn OutputChannel,
) -> Result<()> {
    let wheel = paths.package_dir.join(sparkmagic_wheel_name());
    pip_install_offline(paths, env, &[wheel.into_os_string()], output).await
}

/// Run `python -m pip install --no-index --find-links <offlinePackages>`
/// with the given extra arguments and a fully derived environment (the
/// ambient process environment is not inherited).
async fn pip_install_offline(
    paths: &RuntimePaths,
    env: &HashMap<String, String>,
    extra_args: &[OsString],
    output: &dyn OutputChannel,
) -> Result<()> {
    info!(
        "running pip install {:?} from {:?}",
        extra_args, paths.package_dir
    );

    let mut child = Command::new(&paths.executable)
        .arg("-m")
        .arg("pip")
        .arg("install")
        .arg("--no-index")
        .arg("--find-links")
        .arg(&paths.package_dir)
        .args(extra_args)
        .env_clear()
        .envs(env)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("could not spawn {}", paths.executable.display()))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("could not capture pip stdout"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("could not capture pip stderr"))?;

    let mut out_lines = BufReader::new(stdout).lines();
    let mut err_lines = BufReader::new(stderr).lines();
    let drain_stdout = async {
        while let Ok(Some(line)) = out_lines.next_line().await {
            output.append_line(&line);
        }
    };
    let drain_stderr = async {
        while let Ok(Some(line)) = err_lines.next_line().await {
            output.append_line(&line);
        }
    };

    let (status, (), ()) = tokio::join!(child.wait(), drain_stdout, drain_stderr);
    let status = status.context("pip did not exit cleanly")?;
    if !status.success() {
        return Err(anyhow!("pip exited with {status}"));
    }
    Ok(())
}
