// Tracking types shared by the sink trait, the MLflow client and the session

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A run opened on the tracking server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunInfo {
    pub run_id: String,
    /// Where the server stores this run's artifacts
    pub artifact_uri: String,
}

/// Terminal status recorded when a run is ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Finished,
    Failed,
    Killed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Finished => "FINISHED",
            RunStatus::Failed => "FAILED",
            RunStatus::Killed => "KILLED",
        }
    }
}

/// Reporter progress through one tracked training run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    RunStarted,
    ParamsLogged,
    TrainerInvoked,
    ArtifactLogged,
    ArtifactMissingWarned,
    RunEnded,
}

impl RunState {
    /// Forward-only transitions. A started run may jump straight to
    /// `RunEnded` when a later step fails.
    pub fn can_transition_to(self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Idle, RunStarted)
                | (RunStarted, ParamsLogged)
                | (ParamsLogged, TrainerInvoked)
                | (TrainerInvoked, ArtifactLogged)
                | (TrainerInvoked, ArtifactMissingWarned)
                | (RunStarted, RunEnded)
                | (ParamsLogged, RunEnded)
                | (TrainerInvoked, RunEnded)
                | (ArtifactLogged, RunEnded)
                | (ArtifactMissingWarned, RunEnded)
        )
    }
}

/// Destination for run parameters and artifacts
#[async_trait]
pub trait TrackingSink: Send + Sync {
    /// Open a new run
    async fn start_run(&self, run_name: Option<&str>) -> Result<RunInfo>;

    /// Record one key/value parameter on a run
    async fn log_param(&self, run_id: &str, key: &str, value: &str) -> Result<()>;

    /// Upload a local file into the run's artifact root
    async fn log_artifact(&self, run: &RunInfo, path: &Path) -> Result<()>;

    /// Close a run with a terminal status
    async fn end_run(&self, run_id: &str, status: RunStatus) -> Result<()>;
}
