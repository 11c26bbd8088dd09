// Trainer subprocess invoker
//
// Runs the trainer to completion (blocking the pipeline) with inherited
// stdout/stderr. Arguments go straight to the program, never through a shell.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;

use super::command::TrainerCommand;
use crate::errors::RunnerError;

/// Something that can execute a trainer invocation to completion
#[async_trait]
pub trait Trainer: Send + Sync {
    /// Run the command and wait for it. Ok only on a successful exit.
    async fn train(&self, command: &TrainerCommand) -> Result<(), RunnerError>;
}

/// Runs the trainer as a child process
#[derive(Debug, Clone, Default)]
pub struct ProcessTrainer;

impl ProcessTrainer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Trainer for ProcessTrainer {
    async fn train(&self, command: &TrainerCommand) -> Result<(), RunnerError> {
        let mut cmd = Command::new(command.program());
        cmd.args(command.args())
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        let mut child = cmd.spawn().map_err(|source| RunnerError::TrainerSpawn {
            program: command.program().to_string(),
            source,
        })?;

        tracing::info!(pid = ?child.id(), "Trainer process started");

        // No timeout: the operator aborts by signalling the process
        let status = child.wait().await.map_err(|source| RunnerError::TrainerSpawn {
            program: command.program().to_string(),
            source,
        })?;

        if status.success() {
            tracing::info!("Trainer exited successfully");
            Ok(())
        } else {
            tracing::error!(status = %status, "Trainer failed");
            Err(RunnerError::TrainerFailed {
                command: command.display(),
                status: status.to_string(),
            })
        }
    }
}
