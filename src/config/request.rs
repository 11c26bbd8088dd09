// Training request - the per-invocation input to the runner

use std::path::{Path, PathBuf};

/// Name of the trainer's run subfolder under the output directory.
/// Constant across runs, so repeated runs into one directory reuse it.
pub const EXPERIMENT_NAME: &str = "experiment";

/// A validated request for one trainer invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingRequest {
    /// Base model identifier or path (e.g., "yolov8n-seg.pt")
    pub model: String,

    /// Training epochs
    pub epochs: u32,

    /// Batch size
    pub batch: u32,

    /// Trainer project directory
    pub output_dir: PathBuf,
}

impl TrainingRequest {
    pub fn experiment_name(&self) -> &'static str {
        EXPERIMENT_NAME
    }

    /// `<output_dir>/experiment`
    pub fn experiment_path(&self) -> PathBuf {
        experiment_path(&self.output_dir)
    }

    /// `<output_dir>/experiment/weights/best.pt`
    pub fn artifact_path(&self) -> PathBuf {
        artifact_path(&self.output_dir)
    }

    /// Parameters recorded to the tracking sink, in logging order
    pub fn params(&self) -> [(&'static str, String); 3] {
        [
            ("model", self.model.clone()),
            ("epochs", self.epochs.to_string()),
            ("batch", self.batch.to_string()),
        ]
    }
}

pub fn experiment_path(output_dir: &Path) -> PathBuf {
    output_dir.join(EXPERIMENT_NAME)
}

pub fn artifact_path(output_dir: &Path) -> PathBuf {
    experiment_path(output_dir).join("weights").join("best.pt")
}
