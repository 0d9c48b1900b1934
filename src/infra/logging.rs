use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

const DEBUG_LOG_FILE: &str = "traggo-console.log";

#[derive(Debug, Error)]
pub enum InitLoggingError {
    #[error("failed to open log file {path}: {source}")]
    Open { path: String, source: io::Error },

    #[error("logger already initialised: {0}")]
    Install(String),
}

/// `DEBUG` wins over the configured file; neither means logging stays off.
pub fn resolve_log_path(debug: bool, configured: Option<&Path>) -> Option<PathBuf> {
    if debug {
        return Some(PathBuf::from(DEBUG_LOG_FILE));
    }
    configured.map(Path::to_path_buf)
}

/// Routes `log` records to a file, since the terminal belongs to the console.
/// Returns the path in use, if any.
pub fn init_logging(configured: Option<&Path>) -> Result<Option<PathBuf>, InitLoggingError> {
    let debug = std::env::var_os("DEBUG").is_some();
    let Some(path) = resolve_log_path(debug, configured) else {
        return Ok(None);
    };

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|source| InitLoggingError::Open {
            path: path.display().to_string(),
            source,
        })?;

    let default_level = if debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .target(env_logger::Target::Pipe(Box::new(file)))
        .format_timestamp_secs()
        .try_init()
        .map_err(|error| InitLoggingError::Install(error.to_string()))?;

    log::info!("logging to {}", path.display());
    Ok(Some(path))
}
