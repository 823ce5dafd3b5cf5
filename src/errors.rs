//! Typed error hierarchy for the pipewright engine.
//!
//! Two top-level enums cover the two failure planes:
//! - `EngineError` — programming errors inside the engine itself; fatal to
//!   the run and never retried
//! - `ConfigError` — configuration loading and validation failures
//!
//! Collaborator failures are *not* errors at this level: each stage converts
//! them into a failure-flagged response object and the router decides what
//! happens next. Only the engine's own invariant violations surface here.

use thiserror::Error;

/// Fatal errors from the workflow engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("stage {stage} requires `{field}`, which no prior stage has populated")]
    MissingState {
        stage: &'static str,
        field: &'static str,
    },

    #[error("retry budget violated: prepare_retry called after {attempts} of {max} attempts")]
    RetryBudgetViolated { attempts: u32, max: u32 },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from loading or validating an `EngineConfig`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file at {path}: {source}")]
    ReadFailed {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file at {path}: {source}")]
    ParseFailed {
        path: std::path::PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for `{field}`: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}
