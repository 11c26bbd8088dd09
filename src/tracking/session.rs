// Tracking session
//
// Owns the sink and the single active run. Every reporter step goes through
// here so the run lifecycle can only move forward.

use anyhow::{bail, Result};
use std::path::Path;
use tracing::{info, warn};

use super::types::{RunInfo, RunState, RunStatus, TrackingSink};
use crate::errors::RunnerError;

/// The currently open run, if any
#[derive(Debug, Clone, PartialEq, Eq)]
enum ActiveRun {
    /// Opened by someone else before this session took over
    Inherited(String),
    /// Opened by this session
    Owned(RunInfo),
}

impl ActiveRun {
    fn run_id(&self) -> &str {
        match self {
            ActiveRun::Inherited(run_id) => run_id,
            ActiveRun::Owned(info) => &info.run_id,
        }
    }
}

pub struct TrackingSession<S: TrackingSink> {
    sink: S,
    active: Option<ActiveRun>,
    state: RunState,
}

impl<S: TrackingSink> TrackingSession<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            active: None,
            state: RunState::Idle,
        }
    }

    /// Session that starts with a run left open by a previous owner
    pub fn with_active_run(sink: S, run_id: Option<String>) -> Self {
        let mut session = Self::new(sink);
        session.active = run_id.map(ActiveRun::Inherited);
        session
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn active_run_id(&self) -> Option<&str> {
        self.active.as_ref().map(ActiveRun::run_id)
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// End any open run and return to `Idle`
    pub async fn ensure_no_active_run(&mut self) -> Result<()> {
        if let Some(active) = self.active.take() {
            warn!(run_id = %active.run_id(), "Ending previously active run");
            self.sink
                .end_run(active.run_id(), RunStatus::Finished)
                .await?;
        }
        self.state = RunState::Idle;
        Ok(())
    }

    pub async fn start_run(&mut self, run_name: Option<&str>) -> Result<()> {
        if let Some(active) = &self.active {
            bail!("Run {} is still active", active.run_id());
        }
        self.check(RunState::RunStarted)?;

        let run = self.sink.start_run(run_name).await?;
        info!(run_id = %run.run_id, "Run started");
        self.active = Some(ActiveRun::Owned(run));
        self.state = RunState::RunStarted;
        Ok(())
    }

    pub async fn log_params(&mut self, params: &[(&str, String)]) -> Result<()> {
        self.check(RunState::ParamsLogged)?;
        let run_id = self.owned_run()?.run_id.clone();
        for (key, value) in params {
            self.sink.log_param(&run_id, key, value).await?;
        }
        self.state = RunState::ParamsLogged;
        Ok(())
    }

    pub fn mark_trainer_invoked(&mut self) -> Result<()> {
        self.advance(RunState::TrainerInvoked)
    }

    pub async fn log_artifact(&mut self, path: &Path) -> Result<()> {
        self.check(RunState::ArtifactLogged)?;
        let run = self.owned_run()?.clone();
        self.sink.log_artifact(&run, path).await?;
        self.state = RunState::ArtifactLogged;
        Ok(())
    }

    pub fn mark_artifact_missing(&mut self) -> Result<()> {
        self.advance(RunState::ArtifactMissingWarned)
    }

    /// Close the owned run. The session ends up in `RunEnded` even if the
    /// sink call fails, so a run is never ended twice.
    pub async fn end_run(&mut self, status: RunStatus) -> Result<()> {
        self.check(RunState::RunEnded)?;
        let run_id = self.owned_run()?.run_id.clone();
        self.active = None;
        self.state = RunState::RunEnded;
        self.sink.end_run(&run_id, status).await
    }

    fn owned_run(&self) -> Result<&RunInfo> {
        match &self.active {
            Some(ActiveRun::Owned(info)) => Ok(info),
            _ => bail!("No run has been started in this session"),
        }
    }

    fn check(&self, next: RunState) -> Result<()> {
        if self.state.can_transition_to(next) {
            Ok(())
        } else {
            Err(RunnerError::InvalidTransition {
                from: self.state,
                to: next,
            }
            .into())
        }
    }

    fn advance(&mut self, next: RunState) -> Result<()> {
        self.check(next)?;
        self.state = next;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// Calls seen by a [`RecordingSink`]
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Call {
        StartRun(Option<String>),
        LogParam(String, String, String),
        LogArtifact(String, PathBuf),
        EndRun(String, RunStatus),
    }

    /// In-memory sink that records every call
    #[derive(Default)]
    pub struct RecordingSink {
        pub calls: Mutex<Vec<Call>>,
        pub fail_log_param: bool,
    }

    impl RecordingSink {
        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TrackingSink for RecordingSink {
        async fn start_run(&self, run_name: Option<&str>) -> Result<RunInfo> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::StartRun(run_name.map(str::to_string)));
            Ok(RunInfo {
                run_id: "run-1".to_string(),
                artifact_uri: "mlflow-artifacts:/0/run-1/artifacts".to_string(),
            })
        }

        async fn log_param(&self, run_id: &str, key: &str, value: &str) -> Result<()> {
            if self.fail_log_param {
                bail!("param store unavailable");
            }
            self.calls.lock().unwrap().push(Call::LogParam(
                run_id.to_string(),
                key.to_string(),
                value.to_string(),
            ));
            Ok(())
        }

        async fn log_artifact(&self, run: &RunInfo, path: &Path) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::LogArtifact(run.run_id.clone(), path.to_path_buf()));
            Ok(())
        }

        async fn end_run(&self, run_id: &str, status: RunStatus) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::EndRun(run_id.to_string(), status));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_inherited_run_is_ended_first() {
        let mut session =
            TrackingSession::with_active_run(RecordingSink::default(), Some("stale".to_string()));
        assert_eq!(session.active_run_id(), Some("stale"));

        session.ensure_no_active_run().await.unwrap();
        assert_eq!(session.state(), RunState::Idle);
        assert!(session.active_run_id().is_none());

        session.start_run(None).await.unwrap();
        assert_eq!(
            session.sink().calls(),
            vec![
                Call::EndRun("stale".to_string(), RunStatus::Finished),
                Call::StartRun(None),
            ]
        );
    }

    #[tokio::test]
    async fn test_start_refused_while_run_active() {
        let mut session =
            TrackingSession::with_active_run(RecordingSink::default(), Some("stale".to_string()));
        assert!(session.start_run(None).await.is_err());
        assert!(session.sink().calls().is_empty());
    }

    #[tokio::test]
    async fn test_full_lifecycle() {
        let mut session = TrackingSession::new(RecordingSink::default());
        session.ensure_no_active_run().await.unwrap();
        session.start_run(Some("nightly")).await.unwrap();
        session
            .log_params(&[("model", "m.pt".to_string()), ("epochs", "3".to_string())])
            .await
            .unwrap();
        session.mark_trainer_invoked().unwrap();
        session
            .log_artifact(Path::new("/out/experiment/weights/best.pt"))
            .await
            .unwrap();
        session.end_run(RunStatus::Finished).await.unwrap();

        assert_eq!(session.state(), RunState::RunEnded);
        assert_eq!(
            session.sink().calls(),
            vec![
                Call::StartRun(Some("nightly".to_string())),
                Call::LogParam("run-1".into(), "model".into(), "m.pt".into()),
                Call::LogParam("run-1".into(), "epochs".into(), "3".into()),
                Call::LogArtifact(
                    "run-1".into(),
                    PathBuf::from("/out/experiment/weights/best.pt")
                ),
                Call::EndRun("run-1".into(), RunStatus::Finished),
            ]
        );
    }

    #[tokio::test]
    async fn test_out_of_order_steps_rejected() {
        let mut session = TrackingSession::new(RecordingSink::default());
        let err = session.mark_trainer_invoked().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RunnerError>(),
            Some(RunnerError::InvalidTransition {
                from: RunState::Idle,
                to: RunState::TrainerInvoked
            })
        ));

        session.start_run(None).await.unwrap();
        assert!(session.mark_artifact_missing().is_err());
        assert!(session.log_artifact(Path::new("best.pt")).await.is_err());
        assert_eq!(session.state(), RunState::RunStarted);
    }

    #[tokio::test]
    async fn test_run_ended_only_once() {
        let mut session = TrackingSession::new(RecordingSink::default());
        session.start_run(None).await.unwrap();
        session.end_run(RunStatus::Failed).await.unwrap();
        assert!(session.end_run(RunStatus::Failed).await.is_err());

        let ends = session
            .sink()
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::EndRun(..)))
            .count();
        assert_eq!(ends, 1);
    }
}
