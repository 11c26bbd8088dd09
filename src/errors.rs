// Error taxonomy and user-facing error messages
//
// Typed errors for the failures the harness distinguishes (configuration,
// trainer, reporter sequencing), plus helpers that turn them into
// actionable messages for the terminal.

use std::fmt;
use thiserror::Error;

use crate::tracking::RunState;

#[derive(Error, Debug)]
pub enum RunnerError {
    /// A required flag or environment variable is absent or empty
    #[error("missing required configuration: {0}")]
    MissingConfig(&'static str),

    /// A value is present but cannot be coerced to what the request needs
    #[error("invalid value for {key}: {value:?} ({reason})")]
    InvalidConfig {
        key: &'static str,
        value: String,
        reason: String,
    },

    /// The trainer program could not be started at all
    #[error("failed to start trainer '{program}'")]
    TrainerSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The trainer ran and exited unsuccessfully
    #[error("trainer exited with {status}: {command}")]
    TrainerFailed { command: String, status: String },

    /// Reporter steps were attempted out of order
    #[error("invalid tracking transition: {from:?} -> {to:?}")]
    InvalidTransition { from: RunState, to: RunState },
}

impl RunnerError {
    /// True for errors raised before anything external was touched
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            RunnerError::MissingConfig(_) | RunnerError::InvalidConfig { .. }
        )
    }
}

/// Rewrite errors that have a known fix into messages with suggestions
pub fn user_facing(err: anyhow::Error) -> anyhow::Error {
    match err.downcast_ref::<RunnerError>() {
        Some(RunnerError::TrainerSpawn { program, source }) => {
            anyhow::anyhow!("{}\n\nCause: {}", trainer_not_found_error(program), source)
        }
        Some(RunnerError::TrainerFailed { .. }) => anyhow::anyhow!(wrap_error_with_suggestion(
            &err,
            "Check the trainer output above. Partial results are left in place."
        )),
        _ => err,
    }
}

/// Format a trainer-not-found error with helpful suggestions
pub fn trainer_not_found_error(program: &str) -> String {
    format!(
        "Trainer '{}' could not be started\n\n\
        \x1b[1;33mPossible causes:\x1b[0m\n\
        • The trainer CLI is not installed\n\
        • The trainer is installed in an environment that is not active\n\
        • PATH does not include the trainer's install directory\n\n\
        \x1b[1;32mTry:\x1b[0m\n\
        1. Install the trainer:\n\
           \x1b[36mpip install ultralytics\x1b[0m\n\n\
        2. Check that it is reachable:\n\
           \x1b[36mwhich {}\x1b[0m\n\n\
        3. Point segtrain at it explicitly in ~/.segtrain/config.toml:\n\
           \x1b[36m[trainer]\nprogram = \"/path/to/{}\"\x1b[0m",
        program, program, program
    )
}

/// Format a tracking server connection error with helpful suggestions
pub fn tracking_unreachable_error(uri: &str) -> String {
    format!(
        "Could not reach tracking server at {}\n\n\
        \x1b[1;33mPossible causes:\x1b[0m\n\
        • The tracking server is not running\n\
        • MLFLOW_TRACKING_URI points at the wrong host or port\n\n\
        \x1b[1;32mTry:\x1b[0m\n\
        1. Start a local server:\n\
           \x1b[36mmlflow server --host 127.0.0.1 --port 5000\x1b[0m\n\n\
        2. Check the configured address:\n\
           \x1b[36mecho $MLFLOW_TRACKING_URI\x1b[0m",
        uri
    )
}

/// Wrap a generic error with a suggestion
pub fn wrap_error_with_suggestion(error: impl fmt::Display, suggestion: &str) -> String {
    format!(
        "{}\n\n\
        \x1b[1;33mSuggestion:\x1b[0m {}",
        error, suggestion
    )
}
