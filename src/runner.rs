// Training runner
//
// The whole pipeline: build the trainer command, run it, look for the
// weights file, and (tracked mode) report params and artifact around it.

use anyhow::Result;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::config::{
    load_request_with, Settings, TrackingSettings, TrainerSettings, TrainingRequest,
};
use crate::tracking::{RunStatus, TrackingSession, TrackingSink};
use crate::training::{ProcessTrainer, Trainer, TrainerCommand};

/// What happened to the expected weights file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactStatus {
    /// Present on disk (untracked runs)
    Present(PathBuf),
    /// Present and uploaded to the tracking run
    Logged(PathBuf),
    /// Not produced by the trainer
    Missing(PathBuf),
}

impl ArtifactStatus {
    pub fn path(&self) -> &Path {
        match self {
            ArtifactStatus::Present(p) | ArtifactStatus::Logged(p) | ArtifactStatus::Missing(p) => {
                p.as_path()
            }
        }
    }
}

/// Result of a successful trainer invocation
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub command: TrainerCommand,
    pub artifact: ArtifactStatus,
}

pub struct TrainingRunner<T: Trainer = ProcessTrainer> {
    trainer: T,
    settings: TrainerSettings,
}

impl TrainingRunner<ProcessTrainer> {
    /// Runner that spawns the real trainer process
    pub fn new(settings: TrainerSettings) -> Self {
        Self::with_trainer(ProcessTrainer::new(), settings)
    }
}

impl<T: Trainer> TrainingRunner<T> {
    pub fn with_trainer(trainer: T, settings: TrainerSettings) -> Self {
        Self { trainer, settings }
    }

    pub fn trainer(&self) -> &T {
        &self.trainer
    }

    pub fn command_for(&self, request: &TrainingRequest) -> TrainerCommand {
        TrainerCommand::build(request, &self.settings)
    }

    /// Run the trainer without tracking
    pub async fn run(&self, request: &TrainingRequest) -> Result<RunOutcome> {
        let command = self.invoke(request).await?;

        let artifact = request.artifact_path();
        let artifact = if artifact.exists() {
            info!(path = %artifact.display(), "Weights written");
            ArtifactStatus::Present(artifact)
        } else {
            warn!(path = %artifact.display(), "Trainer finished without writing weights");
            ArtifactStatus::Missing(artifact)
        };

        Ok(RunOutcome { command, artifact })
    }

    /// Run the trainer inside a tracking run.
    ///
    /// The run is always ended once started: `FINISHED` on success, `FAILED`
    /// if logging, training or upload fails. The pipeline's own error takes
    /// precedence over a failure to end the run.
    pub async fn run_tracked<S: TrackingSink>(
        &self,
        request: &TrainingRequest,
        session: &mut TrackingSession<S>,
        run_name: Option<&str>,
    ) -> Result<RunOutcome> {
        session.ensure_no_active_run().await?;
        session.start_run(run_name).await?;

        let result = self.tracked_steps(request, session).await;
        let status = if result.is_ok() {
            RunStatus::Finished
        } else {
            RunStatus::Failed
        };

        match (result, session.end_run(status).await) {
            (Ok(outcome), Ok(())) => Ok(outcome),
            (Ok(_), Err(end_err)) => Err(end_err),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(end_err)) => {
                warn!(error = %end_err, "Failed to end tracking run after failure");
                Err(err)
            }
        }
    }

    async fn tracked_steps<S: TrackingSink>(
        &self,
        request: &TrainingRequest,
        session: &mut TrackingSession<S>,
    ) -> Result<RunOutcome> {
        session.log_params(&request.params()).await?;

        let command = self.invoke(request).await?;
        session.mark_trainer_invoked()?;

        let artifact = request.artifact_path();
        let artifact = if artifact.exists() {
            session.log_artifact(&artifact).await?;
            println!("Logged artifact: {}", artifact.display());
            ArtifactStatus::Logged(artifact)
        } else {
            warn!(path = %artifact.display(), "No artifact found");
            println!("Warning: no artifact found at {}", artifact.display());
            session.mark_artifact_missing()?;
            ArtifactStatus::Missing(artifact)
        };

        Ok(RunOutcome { command, artifact })
    }

    async fn invoke(&self, request: &TrainingRequest) -> Result<TrainerCommand> {
        let command = self.command_for(request);
        println!("Running command: {}", command);
        info!(
            model = %request.model,
            epochs = request.epochs,
            batch = request.batch,
            output_dir = %request.output_dir.display(),
            "Starting training"
        );
        self.trainer.train(&command).await?;
        Ok(command)
    }
}

/// Environment-driven tracked job.
///
/// MODEL, EPOCHS, BATCH and OUTPUT are validated first. Settings are read,
/// the tracking sink is connected and the trainer is spawned only after
/// that succeeds.
pub async fn run_tracked_from_env<F, T, S, C>(
    lookup: F,
    trainer: T,
    connect: C,
) -> Result<RunOutcome>
where
    F: Fn(&str) -> Option<OsString>,
    T: Trainer,
    S: TrackingSink,
    C: FnOnce(&TrackingSettings) -> Result<S>,
{
    let request = load_request_with(&lookup).map_err(|e| {
        error!(error = %e, config_error = e.is_config_error(), "Configuration rejected");
        e
    })?;
    let settings = Settings::load_with(|key| lookup(key).and_then(|v| v.into_string().ok()))?;

    let sink = connect(&settings.tracking)?;
    let mut session =
        TrackingSession::with_active_run(sink, settings.tracking.active_run_id.clone());

    TrainingRunner::with_trainer(trainer, settings.trainer)
        .run_tracked(&request, &mut session, settings.tracking.run_name.as_deref())
        .await
}
