use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use vardepot_core::archive::read_thumbnail;
use vardepot_core::contents::package_contents;
use vardepot_core::install::{check_collisions, install};
use vardepot_core::operations::{disable_old_versions, resolve_conflicts_with, toggle};
use vardepot_core::scanner::count_libraries;
use vardepot_core::{Analyzer, EngineConfig, IdentityCheck, SystemDiskSpace};

#[derive(Parser, Debug)]
#[command(name = "vardepot")]
#[command(about = "Manage a library of .var content packages", long_about = None)]
struct Cli {
    /// JSON engine configuration.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan a library and print every package record as JSON.
    Scan { root: PathBuf },
    /// Count packages in one or more libraries.
    Count {
        #[arg(required = true)]
        roots: Vec<PathBuf>,
    },
    Enable {
        path: PathBuf,
        #[arg(long)]
        root: PathBuf,
        /// Move the package to the library root, keeping an active copy there.
        #[arg(long)]
        merge: bool,
    },
    Disable {
        path: PathBuf,
        #[arg(long)]
        root: PathBuf,
    },
    /// Keep only the newest enabled version of creator.name.
    DisableOld {
        root: PathBuf,
        creator: String,
        name: String,
    },
    /// Copy packages into a library.
    Install {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[arg(long)]
        target: PathBuf,
        #[arg(long)]
        overwrite: bool,
        /// Only list files that already exist in the target.
        #[arg(long)]
        check: bool,
    },
    /// Merge or disable copies of a package and move the kept one to the root.
    Resolve {
        keep: PathBuf,
        others: Vec<PathBuf>,
        #[arg(long)]
        root: PathBuf,
        /// Compare MD5 digests, not just sizes.
        #[arg(long)]
        digest: bool,
    },
    /// List the displayable items inside a package.
    Contents { path: PathBuf },
    /// Write the preview image of a package to a file.
    Thumbnail { path: PathBuf, output: PathBuf },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load(path),
        None => Ok(EngineConfig::default()),
    }
}

/// Cancel `token` on Ctrl-C.
fn cancel_on_interrupt(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            token.cancel();
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Scan { root } => {
            let cancel = CancellationToken::new();
            cancel_on_interrupt(cancel.clone());

            let result = Analyzer::new(config)
                .scan_library(&cancel, &root)
                .await
                .context(format!("Failed to scan library: {:?}", root))?;
            print_json(&result)?;
        }
        Commands::Count { roots } => {
            print_json(&count_libraries(&roots))?;
        }
        Commands::Enable { path, root, merge } => {
            let new_path = toggle(&path, true, &root, merge)
                .context(format!("Failed to enable {:?}", path))?;
            println!("{}", new_path.display());
        }
        Commands::Disable { path, root } => {
            let new_path = toggle(&path, false, &root, false)
                .context(format!("Failed to disable {:?}", path))?;
            println!("{}", new_path.display());
        }
        Commands::DisableOld { root, creator, name } => {
            let cancel = CancellationToken::new();
            cancel_on_interrupt(cancel.clone());

            let result = Analyzer::new(config).scan_library(&cancel, &root).await?;
            let disabled = disable_old_versions(&result.packages, &creator, &name, &root)
                .context(format!("Failed to disable old versions of {creator}.{name}"))?;
            print_json(&disabled)?;
        }
        Commands::Install {
            files,
            target,
            overwrite,
            check,
        } => {
            if check {
                print_json(&check_collisions(&files, &target))?;
                return Ok(());
            }

            let outcome = install(&files, &target, overwrite, &SystemDiskSpace, |progress| {
                info!(
                    current = progress.current,
                    total = progress.total,
                    file = %progress.file_name,
                    status = ?progress.status,
                    "Install progress"
                );
            })
            .context(format!("Failed to install into {:?}", target))?;

            if let Some(summary) = outcome.skipped_summary() {
                warn!("{summary}");
            }
            print_json(&outcome)?;
        }
        Commands::Resolve {
            keep,
            others,
            root,
            digest,
        } => {
            let check = if digest {
                IdentityCheck::Digest
            } else {
                IdentityCheck::Size
            };
            let outcome = resolve_conflicts_with(&keep, &others, &root, check)
                .context(format!("Failed to resolve conflicts for {:?}", keep))?;
            print_json(&outcome)?;
        }
        Commands::Contents { path } => {
            let contents = package_contents(&path)
                .context(format!("Failed to read package: {:?}", path))?;
            print_json(&contents)?;
        }
        Commands::Thumbnail { path, output } => {
            match read_thumbnail(&path, &config.parse_limits())
                .context(format!("Failed to read package: {:?}", path))?
            {
                Some(thumbnail) => {
                    std::fs::write(&output, &thumbnail.bytes)
                        .context(format!("Failed to write thumbnail: {:?}", output))?;
                    info!(entry = %thumbnail.entry_name, output = ?output, "Thumbnail written");
                }
                None => warn!(package = ?path, "Package has no preview image"),
            }
        }
    }

    Ok(())
}
