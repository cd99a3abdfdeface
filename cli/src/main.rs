//! taxform CLI - operator entry point for the form engine.
//!
//! # Architecture
//!
//! ```text
//! main() -> load config -> init_tracing() -> FormEngine::open_with() -> commands::run()
//!                                                                        |
//!                                                                        v
//!                                                          pretty JSON on stdout
//! ```
//!
//! Every engine error is returned from `main`, which prints it and exits with
//! status 1.

mod commands;

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use taxform_config::TaxformConfig;
use taxform_store::{FormEngine, LogNotifier};

use crate::commands::Command;

#[derive(Parser, Debug)]
#[command(name = "taxform", version)]
#[command(about = "Create, fill, submit and review tax forms")]
struct Cli {
    /// Config file (default: $TAXFORM_CONFIG or ~/.taxform/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Database file, overriding `[store] path`
    #[arg(long, global = true, value_name = "PATH", env = "TAXFORM_DB")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

fn load_config(explicit: Option<&Path>) -> Result<TaxformConfig> {
    match explicit {
        Some(path) => Ok(TaxformConfig::load_from(path)?),
        None => Ok(TaxformConfig::load()?.unwrap_or_default()),
    }
}

fn init_tracing(config: &TaxformConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_filter().unwrap_or_else(|| "info".into())))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let mut init_warnings = Vec::new();
    if let Some(log_path) = config.log_file() {
        match open_log_file(&log_path) {
            Ok(file) => {
                tracing_subscriber::registry()
                    .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
                    .with(env_filter)
                    .init();
                tracing::debug!(path = %log_path.display(), "Logging initialized");
                return;
            }
            Err(e) => init_warnings.push(format!("{e:#}")),
        }
    }

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
    for warning in init_warnings {
        tracing::warn!("{warning}");
    }
}

fn open_log_file(path: &Path) -> Result<fs::File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log dir {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    init_tracing(&config);

    let Some(db_path) = cli.db.clone().or_else(|| config.db_path()) else {
        bail!("No database path: pass --db or set [store] path in the config");
    };
    let engine = FormEngine::open_with(&db_path, config.store_options())?
        .with_notifier(Arc::new(LogNotifier));

    let output = commands::run(&engine, cli.command)?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
