// Trainer command builder
//
// Turns a TrainingRequest into the trainer's key=value argument vector.
// Arguments are OS strings so paths reach the trainer byte for byte.

use std::ffi::{OsStr, OsString};
use std::fmt;

use crate::config::{TrainerSettings, TrainingRequest};

/// A fully built trainer invocation (program + argument vector)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainerCommand {
    program: String,
    args: Vec<OsString>,
}

impl TrainerCommand {
    /// Build the invocation for a request.
    ///
    /// Token order: task, data, model, epochs, batch, exist_ok, device,
    /// project, name. Values are passed through as-is.
    pub fn build(request: &TrainingRequest, settings: &TrainerSettings) -> Self {
        let mut args: Vec<OsString> = settings.task.iter().map(OsString::from).collect();
        args.extend([
            key_value("data", settings.data.as_os_str()),
            key_value("model", &request.model),
            key_value("epochs", request.epochs.to_string()),
            key_value("batch", request.batch.to_string()),
            key_value("exist_ok", "True"),
            key_value("device", &settings.device),
            key_value("project", request.output_dir.as_os_str()),
            key_value("name", request.experiment_name()),
        ]);

        Self {
            program: settings.program.clone(),
            args,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments exactly as handed to the process
    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    /// Single-line rendering, space-joined without quoting.
    /// Non-UTF-8 bytes are shown lossily; the spawned arguments keep them.
    pub fn display(&self) -> String {
        self.to_string()
    }
}

fn key_value(key: &str, value: impl AsRef<OsStr>) -> OsString {
    let mut arg = OsString::from(key);
    arg.push("=");
    arg.push(value);
    arg
}

impl fmt::Display for TrainerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}
