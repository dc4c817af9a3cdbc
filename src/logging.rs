//! Logging setup for hosts embedding the orchestration layer
//!
//! Library code emits `tracing` events; with tracing's `log` feature they reach
//! whichever `log` logger is installed. This installs `env_logger`, writing to a file
//! or stderr. `RUST_LOG` wins over the configured level.

use eyre::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::Config;

/// `<data dir>/toolhub/logs/toolhub.log`
pub fn default_log_file() -> PathBuf {
    let project_name = env!("CARGO_PKG_NAME");
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(project_name)
        .join("logs")
        .join(format!("{}.log", project_name))
}

/// Install the global logger. `log_file` of `None` logs to stderr.
pub fn init_logging(config: &Config, log_file: Option<&Path>) -> Result<()> {
    let level = config.log_level.as_deref().unwrap_or("info");
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level));

    if let Some(path) = log_file {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).context("Failed to create log directory")?;
        }
        let target = Box::new(
            fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .context("Failed to open log file")?,
        );
        builder.target(env_logger::Target::Pipe(target));
    } else {
        builder.target(env_logger::Target::Stderr);
    }

    builder.try_init().context("Logger already initialized")?;

    match log_file {
        Some(path) => log::info!("Logging initialized, writing to: {}", path.display()),
        None => log::info!("Logging initialized, writing to stderr"),
    }
    Ok(())
}
