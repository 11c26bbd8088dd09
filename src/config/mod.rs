// Configuration module
// Request loading (flags or environment) and harness settings

mod loader;
mod request;
mod settings;

pub use loader::{load_request_from_env, load_request_with, TrainArgs};
pub use request::{artifact_path, experiment_path, TrainingRequest, EXPERIMENT_NAME};
pub use settings::{Settings, TrackingSettings, TrainerSettings, DEFAULT_DATASET};
