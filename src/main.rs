// src/main.rs

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use libshelf::diagnostics::Diagnostics;
use libshelf::install::http::HttpDownloader;
use libshelf::install::{self, DiskRemover};
use libshelf::manifest::{diff, store, Manifest, SCHEMA_VERSION};
use libshelf::project::Project;
use std::path::Path;
use tracing::info;

#[derive(Parser)]
#[command(name = "libshelf")]
#[command(author, version, about = "Declarative library asset installer with manifest reconciliation", long_about = None)]
struct Cli {
    /// Project directory containing libshelf.json
    #[arg(short, long, global = true, default_value = ".")]
    project_dir: std::path::PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile on-disk library assets with the declared manifest
    Sync,
    /// List the libraries recorded as installed
    List,
    /// Generate shell completion scripts
    Completions {
        /// Shell type
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing subscriber for logging
    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    match cli.command {
        // Sync is the default action, mirroring the automatic run after a
        // package install/update.
        Some(Commands::Sync) | None => sync(&cli.project_dir),
        Some(Commands::List) => list(&cli.project_dir),
        Some(Commands::Completions { shell }) => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut std::io::stdout());
            Ok(())
        }
    }
}

/// One full reconciliation pass over the project's declared libraries.
fn sync(project_dir: &Path) -> Result<()> {
    let Some(project) = Project::discover(project_dir)? else {
        info!(
            "No libshelf.json in {}. Nothing to do.",
            project_dir.display()
        );
        return Ok(());
    };

    let mut diagnostics = Diagnostics::new();

    let prior = store::load(&project.state_file())?;
    let merged = project.merge_sources(&mut diagnostics)?;
    let delta = diff::diff(&merged, &prior, |name, definition| {
        project.exists_on_disk(name, definition)
    });
    diagnostics.flush();

    if delta.is_empty() {
        info!("All libraries are up to date");
    } else {
        info!(
            "Installing {} and removing {} libraries",
            delta.to_install.len(),
            delta.to_remove.len()
        );
        let downloader = HttpDownloader::new()?;
        let result = install::reconcile(
            &delta,
            &project,
            &downloader,
            &DiskRemover,
            &mut diagnostics,
        );
        diagnostics.flush();
        // A failed run leaves the prior state document untouched, so the
        // next pass retries everything that did not complete.
        result?;
    }

    let manifest = Manifest {
        schema_version: SCHEMA_VERSION.to_string(),
        installed: merged,
    };
    store::save(&project.state_file(), &manifest)?;

    println!(
        "Libraries synchronized: {} installed, {} removed, {} declared",
        delta.to_install.len(),
        delta.to_remove.len(),
        manifest.installed.len()
    );
    Ok(())
}

/// Print the persisted manifest.
fn list(project_dir: &Path) -> Result<()> {
    let Some(project) = Project::discover(project_dir)? else {
        println!("No libshelf.json in {}", project_dir.display());
        return Ok(());
    };

    let manifest = store::load(&project.state_file())?;
    if manifest.is_empty() {
        println!("No libraries installed");
        return Ok(());
    }

    for (name, definition) in &manifest.installed {
        println!(
            "{} {} ({}) from {} [{}]",
            name,
            definition.version,
            definition.archive_type,
            definition.source_package,
            definition.url
        );
    }
    Ok(())
}
