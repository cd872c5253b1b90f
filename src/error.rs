use std::path::PathBuf;

use thiserror::Error;

/// A host metric query failed.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("{query} failed: {reason}")]
    QueryFailed { query: &'static str, reason: String },
    #[error("no mounted filesystem contains {0}")]
    UnknownMount(PathBuf),
    #[error("{0} state lock poisoned")]
    LockPoisoned(&'static str),
}

impl SourceError {
    pub fn query(query: &'static str, reason: impl Into<String>) -> Self {
        SourceError::QueryFailed {
            query,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("run interval must be at least 1 second, got {0}")]
    InvalidRunInterval(u64),
    #[error("contamination must be in (0, 0.5], got {0}")]
    ContaminationOutOfRange(f64),
    #[error("min_samples must be at least {floor}, got {got}")]
    MinSamplesTooSmall { got: usize, floor: usize },
    #[error("relearning interval must be positive")]
    InvalidRelearningInterval,
    #[error("n_estimators must be positive")]
    InvalidEstimatorCount,
    #[error("display window must hold at least one sample")]
    InvalidDisplayWindow,
    #[error("poll interval must be positive")]
    InvalidPollInterval,
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialise config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Error)]
pub enum LoopError {
    #[error("sampling loop already started (state: {0:?})")]
    AlreadyStarted(crate::metrics::LoopState),
    #[error("failed to build sampling runtime: {0}")]
    Runtime(#[from] std::io::Error),
}
