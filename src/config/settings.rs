// Harness settings
//
// Everything that is not part of a TrainingRequest: how to call the trainer
// and where the tracking server lives. Loaded from an optional TOML file,
// then overridden by environment variables.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Default dataset descriptor handed to the trainer.
/// Staged externally; never derived from the request.
pub const DEFAULT_DATASET: &str = "/tmp/data.yaml";

pub const DEFAULT_TRACKING_URI: &str = "http://127.0.0.1:5000";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub trainer: TrainerSettings,
    pub tracking: TrackingSettings,
}

/// How the trainer CLI is invoked
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TrainerSettings {
    /// Trainer executable (default: "yolo")
    pub program: String,

    /// Leading task arguments (default: ["segment", "train"])
    pub task: Vec<String>,

    /// Dataset descriptor path (default: /tmp/data.yaml)
    pub data: PathBuf,

    /// Device passed to the trainer (default: "cpu")
    pub device: String,
}

impl Default for TrainerSettings {
    fn default() -> Self {
        Self {
            program: "yolo".to_string(),
            task: vec!["segment".to_string(), "train".to_string()],
            data: PathBuf::from(DEFAULT_DATASET),
            device: "cpu".to_string(),
        }
    }
}

/// Where parameters and artifacts are recorded
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TrackingSettings {
    /// Tracking server base URL
    pub tracking_uri: String,

    /// Experiment to record into; None uses the server's default experiment
    pub experiment_name: Option<String>,

    /// Optional display name for the run
    pub run_name: Option<String>,

    /// Request timeout in seconds
    pub timeout_seconds: u64,

    /// Run left active by a previous session (ended before a new one starts)
    #[serde(skip)]
    pub active_run_id: Option<String>,
}

impl Default for TrackingSettings {
    fn default() -> Self {
        Self {
            tracking_uri: DEFAULT_TRACKING_URI.to_string(),
            experiment_name: None,
            run_name: None,
            timeout_seconds: 60,
            active_run_id: None,
        }
    }
}

impl Settings {
    /// Load settings from the config file (if any) and the process environment
    pub fn load() -> Result<Self> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Load settings with environment variables read through `lookup`
    pub fn load_with<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = match settings_path(&lookup) {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        settings.apply_env(lookup);
        Ok(settings)
    }

    /// Parse a TOML settings file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let settings: Settings = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        tracing::debug!(path = %path.display(), "Loaded settings file");
        Ok(settings)
    }

    /// Apply MLflow-style environment overrides
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(uri) = non_empty("MLFLOW_TRACKING_URI") {
            self.tracking.tracking_uri = uri;
        }
        if let Some(name) = non_empty("MLFLOW_EXPERIMENT_NAME") {
            self.tracking.experiment_name = Some(name);
        }
        if let Some(name) = non_empty("MLFLOW_RUN_NAME") {
            self.tracking.run_name = Some(name);
        }
        if let Some(run_id) = non_empty("MLFLOW_RUN_ID") {
            self.tracking.active_run_id = Some(run_id);
        }
    }
}

/// `$SEGTRAIN_CONFIG`, else `~/.segtrain/config.toml`
fn settings_path<F>(lookup: &F) -> Option<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = lookup("SEGTRAIN_CONFIG") {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    dirs::home_dir().map(|home| home.join(".segtrain").join("config.toml"))
}
