// Configuration loader
// Builds a TrainingRequest from CLI flags or from environment variables

use clap::Parser;
use std::ffi::OsString;
use std::num::NonZeroU32;
use std::path::PathBuf;

use super::request::TrainingRequest;
use crate::errors::RunnerError;

/// Environment variables read in environment mode, in check order
pub const ENV_MODEL: &str = "MODEL";
pub const ENV_EPOCHS: &str = "EPOCHS";
pub const ENV_BATCH: &str = "BATCH";
pub const ENV_OUTPUT: &str = "OUTPUT";

#[derive(Parser, Debug, Clone)]
#[command(name = "segtrain")]
#[command(about = "Run a segmentation training job", version)]
pub struct TrainArgs {
    /// Path to the base model to fine-tune
    #[arg(long)]
    pub model: String,

    /// Training epochs
    #[arg(long, default_value_t = 20, value_parser = clap::value_parser!(u32).range(1..))]
    pub epochs: u32,

    /// Batch size
    #[arg(long, default_value_t = 4, value_parser = clap::value_parser!(u32).range(1..))]
    pub batch: u32,

    /// Directory to save outputs
    #[arg(long = "output_dir", alias = "output-dir")]
    pub output_dir: PathBuf,
}

impl TrainArgs {
    /// Convert parsed flags into a request.
    ///
    /// clap already enforces presence and numeric ranges; this only rejects
    /// values that parse but are empty.
    pub fn into_request(self) -> Result<TrainingRequest, RunnerError> {
        if self.model.trim().is_empty() {
            return Err(RunnerError::MissingConfig("--model"));
        }
        if self.output_dir.as_os_str().is_empty() {
            return Err(RunnerError::MissingConfig("--output_dir"));
        }

        Ok(TrainingRequest {
            model: self.model,
            epochs: self.epochs,
            batch: self.batch,
            output_dir: self.output_dir,
        })
    }
}

/// Load a request from MODEL, EPOCHS, BATCH and OUTPUT in the process environment
pub fn load_request_from_env() -> Result<TrainingRequest, RunnerError> {
    load_request_with(|key| std::env::var_os(key))
}

/// Load a request through an arbitrary variable lookup.
///
/// Variables are checked in the order MODEL, EPOCHS, BATCH, OUTPUT and the
/// first missing or malformed one is reported. OUTPUT is taken as a raw OS
/// path; the others must be valid Unicode.
pub fn load_request_with<F>(lookup: F) -> Result<TrainingRequest, RunnerError>
where
    F: Fn(&str) -> Option<OsString>,
{
    let model = unicode(ENV_MODEL, required(&lookup, ENV_MODEL)?)?;
    let epochs = positive(ENV_EPOCHS, unicode(ENV_EPOCHS, required(&lookup, ENV_EPOCHS)?)?)?;
    let batch = positive(ENV_BATCH, unicode(ENV_BATCH, required(&lookup, ENV_BATCH)?)?)?;
    let output_dir = PathBuf::from(required(&lookup, ENV_OUTPUT)?);

    tracing::debug!(
        model = %model,
        epochs,
        batch,
        output_dir = %output_dir.display(),
        "Loaded training request from environment"
    );

    Ok(TrainingRequest {
        model,
        epochs,
        batch,
        output_dir,
    })
}

fn required<F>(lookup: &F, key: &'static str) -> Result<OsString, RunnerError>
where
    F: Fn(&str) -> Option<OsString>,
{
    match lookup(key) {
        Some(value) if !value.to_string_lossy().trim().is_empty() => Ok(value),
        _ => Err(RunnerError::MissingConfig(key)),
    }
}

fn unicode(key: &'static str, value: OsString) -> Result<String, RunnerError> {
    value
        .into_string()
        .map_err(|raw| RunnerError::InvalidConfig {
            key,
            value: raw.to_string_lossy().into_owned(),
            reason: "not valid Unicode".to_string(),
        })
}

fn positive(key: &'static str, value: String) -> Result<u32, RunnerError> {
    value
        .trim()
        .parse::<NonZeroU32>()
        .map(NonZeroU32::get)
        .map_err(|e| RunnerError::InvalidConfig {
            key,
            value,
            reason: format!("expected a positive integer: {}", e),
        })
}
