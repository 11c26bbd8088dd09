// Experiment tracking
//
// Records run parameters and the trained weights to an MLflow server.

pub mod client;
pub mod session;
mod types;

pub use client::{ArtifactLocation, MlflowClient};
pub use session::TrackingSession;
pub use types::{RunInfo, RunState, RunStatus, TrackingSink};
