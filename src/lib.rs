// Segtrain - segmentation training harness
// Library exports

pub mod config;
pub mod errors;
pub mod logging;
pub mod runner; // Training pipeline (plain and tracked)
pub mod tracking; // MLflow run/param/artifact reporting
pub mod training; // Trainer command + subprocess

pub use config::{Settings, TrainingRequest};
pub use errors::RunnerError;
pub use runner::{ArtifactStatus, RunOutcome, TrainingRunner};
