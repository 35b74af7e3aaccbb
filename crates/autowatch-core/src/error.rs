use std::path::PathBuf;
use thiserror::Error;

/// User-correctable configuration problems.  Reported before the poll loop
/// starts; never raised afterwards.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Please specify {0} in .env")]
    Missing(&'static str),
    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error("Failed to read config file {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path:?}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Failures reported by a `Page` implementation.
#[derive(Debug, Clone, Error)]
pub enum PageError {
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },
    #[error("browser driver error: {0}")]
    Driver(String),
    #[error("invalid selector `{0}`")]
    Selector(String),
}

/// Anything that aborts a single poll cycle.  The loop logs it and carries on
/// with the next scheduled poll.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Page(#[from] PageError),
    #[error("malformed page: {0}")]
    Structural(String),
}
