//! Command line front end for the bundled Python runtime installer.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::debug;

use pybundle::dist::{OsFamily, BUNDLE_VERSION, PYTHON_VERSION};
use pybundle::host::{
    ConfigStore, InstallPrompt, JsonConfigStore, LogNotifier, LogOutput, LogTasks,
    INSTALL_PATH_KEY,
};
use pybundle::{default_install_root, PythonInstaller, RuntimePaths};

#[derive(Parser)]
#[command(name = "pybundle", about = "Manage the bundled Python runtime", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download and install the Python runtime
    Install {
        /// Reinstall even when a runtime is already present
        #[arg(long)]
        force: bool,
        /// Installation root (defaults to the configured or per-user path)
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Show the installation status and derived paths
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Interactively install the runtime if it is missing
    Setup,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime.block_on(run(cli)),
        Err(e) => Err(e.into()),
    };
    if let Err(e) = result {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Install { force, path } => {
            let installer = build_installer();
            installer.start_install(force, path).await?;
            println!("python runtime ready at {}", installer.paths().version_dir.display());
            Ok(())
        }
        Commands::Status { json } => status(json),
        Commands::Setup => setup().await,
    }
}

fn build_installer() -> PythonInstaller {
    let config = Arc::new(JsonConfigStore::load(JsonConfigStore::default_path()));
    PythonInstaller::new(
        config,
        Arc::new(LogTasks),
        Arc::new(LogNotifier),
        Arc::new(LogOutput),
    )
}

fn status(json: bool) -> Result<()> {
    let config = JsonConfigStore::load(JsonConfigStore::default_path());
    let root = config
        .get(INSTALL_PATH_KEY)
        .map(PathBuf::from)
        .unwrap_or_else(default_install_root);
    let paths = RuntimePaths::derive(&root, OsFamily::current());
    let installed = paths.executable.exists();
    debug!("status for root {:?}", root);

    if json {
        let value = serde_json::json!({
            "installed": installed,
            "python_version": PYTHON_VERSION,
            "bundle_version": BUNDLE_VERSION,
            "install_root": paths.install_root,
            "executable": paths.executable,
            "package_dir": paths.package_dir,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("installed:      {}", if installed { "yes" } else { "no" });
        println!("python version: {PYTHON_VERSION} (bundle {BUNDLE_VERSION})");
        println!("install root:   {}", paths.install_root.display());
        println!("executable:     {}", paths.executable.display());
    }
    Ok(())
}

/// Asks on the terminal instead of opening a dialog.
struct TerminalPrompt {
    confirmed: AtomicBool,
}

impl InstallPrompt for TerminalPrompt {
    fn open_install_dialog(&self) {
        print!("No Python runtime is installed. Install Python {PYTHON_VERSION} now? [y/N] ");
        let _ = std::io::stdout().flush();
        let mut answer = String::new();
        if std::io::stdin().lock().read_line(&mut answer).is_ok() {
            let confirmed = matches!(answer.trim(), "y" | "Y" | "yes");
            self.confirmed.store(confirmed, Ordering::SeqCst);
        }
    }
}

async fn setup() -> Result<()> {
    let installer = build_installer();
    if installer.is_python_installed() {
        println!(
            "python runtime already installed at {}",
            installer.paths().version_dir.display()
        );
        return Ok(());
    }

    let prompt = TerminalPrompt {
        confirmed: AtomicBool::new(false),
    };
    installer.prompt_for_install(&prompt);
    if !prompt.confirmed.load(Ordering::SeqCst) {
        println!("skipped");
        return Ok(());
    }

    installer.start_install(false, None).await?;
    println!(
        "python runtime ready at {}",
        installer.paths().version_dir.display()
    );
    Ok(())
}
