// MLflow tracking client
//
// Talks to an MLflow tracking server over its REST API. Artifacts go through
// the server's artifact proxy, or are copied when the run's artifact root is
// a local directory.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use super::types::{RunInfo, RunStatus, TrackingSink};
use crate::config::TrackingSettings;
use crate::errors;

/// Experiment used when no experiment name is configured
const DEFAULT_EXPERIMENT_ID: &str = "0";

/// HTTP client for an MLflow tracking server
pub struct MlflowClient {
    base_url: String,
    client: Client,
    experiment_name: Option<String>,
}

impl MlflowClient {
    pub fn new(settings: &TrackingSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .build()
            .context("Failed to build HTTP client")?;

        let base_url = settings.tracking_uri.trim_end_matches('/').to_string();
        info!(base_url = %base_url, "Using tracking server");

        Ok(Self {
            base_url,
            client,
            experiment_name: settings.experiment_name.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn api(&self, endpoint: &str) -> String {
        format!("{}/api/2.0/mlflow/{}", self.base_url, endpoint)
    }

    /// Experiment id for the configured name, creating the experiment if needed
    async fn resolve_experiment(&self) -> Result<String> {
        let Some(name) = &self.experiment_name else {
            return Ok(DEFAULT_EXPERIMENT_ID.to_string());
        };

        let response = self
            .client
            .get(self.api("experiments/get-by-name"))
            .query(&[("experiment_name", name.as_str())])
            .send()
            .await
            .map_err(|e| self.send_error(e))?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!(experiment = %name, "Experiment not found, creating it");
            let created: CreateExperimentResponse = self
                .post("experiments/create", &CreateExperimentRequest { name })
                .await?
                .json()
                .await
                .context("Failed to parse create-experiment response")?;
            return Ok(created.experiment_id);
        }

        let found: GetExperimentResponse = check(response, "get experiment")
            .await?
            .json()
            .await
            .context("Failed to parse get-experiment response")?;
        Ok(found.experiment.experiment_id)
    }

    async fn post<T: Serialize + ?Sized>(&self, endpoint: &str, body: &T) -> Result<Response> {
        let response = self
            .client
            .post(self.api(endpoint))
            .json(body)
            .send()
            .await
            .map_err(|e| self.send_error(e))?;
        check(response, endpoint).await
    }

    fn send_error(&self, e: reqwest::Error) -> anyhow::Error {
        if e.is_connect() {
            anyhow::anyhow!(errors::tracking_unreachable_error(&self.base_url))
        } else {
            anyhow::Error::new(e).context("Request to tracking server failed")
        }
    }

    async fn upload(&self, location: &str, path: &Path, file_name: &str) -> Result<()> {
        let url = format!(
            "{}/api/2.0/mlflow-artifacts/artifacts/{}/{}",
            self.base_url,
            location.trim_matches('/'),
            file_name
        );
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read artifact {}", path.display()))?;

        debug!(url = %url, size = bytes.len(), "Uploading artifact");
        let response = self
            .client
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes)
            .send()
            .await
            .map_err(|e| self.send_error(e))?;
        check(response, "upload artifact").await?;
        Ok(())
    }
}

#[async_trait]
impl TrackingSink for MlflowClient {
    async fn start_run(&self, run_name: Option<&str>) -> Result<RunInfo> {
        let experiment_id = self.resolve_experiment().await?;
        let request = CreateRunRequest {
            experiment_id: &experiment_id,
            start_time: chrono::Utc::now().timestamp_millis(),
            run_name,
        };

        let created: CreateRunResponse = self
            .post("runs/create", &request)
            .await?
            .json()
            .await
            .context("Failed to parse create-run response")?;

        let info = created.run.info;
        info!(run_id = %info.run_id, experiment_id = %experiment_id, "Tracking run started");
        Ok(RunInfo {
            run_id: info.run_id,
            artifact_uri: info.artifact_uri,
        })
    }

    async fn log_param(&self, run_id: &str, key: &str, value: &str) -> Result<()> {
        self.post("runs/log-parameter", &LogParamRequest { run_id, key, value })
            .await
            .with_context(|| format!("Failed to log parameter '{}'", key))?;
        debug!(run_id, key, value, "Logged parameter");
        Ok(())
    }

    async fn log_artifact(&self, run: &RunInfo, path: &Path) -> Result<()> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("Artifact path has no file name: {}", path.display()))?;

        match ArtifactLocation::parse(&run.artifact_uri)? {
            ArtifactLocation::Proxied(location) => {
                self.upload(&location, path, file_name).await?;
            }
            ArtifactLocation::Local(dir) => {
                tokio::fs::create_dir_all(&dir)
                    .await
                    .with_context(|| format!("Failed to create {}", dir.display()))?;
                tokio::fs::copy(path, dir.join(file_name))
                    .await
                    .with_context(|| format!("Failed to copy artifact into {}", dir.display()))?;
            }
        }

        info!(run_id = %run.run_id, path = %path.display(), "Artifact logged");
        Ok(())
    }

    async fn end_run(&self, run_id: &str, status: RunStatus) -> Result<()> {
        let request = UpdateRunRequest {
            run_id,
            status,
            end_time: chrono::Utc::now().timestamp_millis(),
        };
        self.post("runs/update", &request)
            .await
            .with_context(|| format!("Failed to end run {}", run_id))?;
        info!(run_id, status = status.as_str(), "Tracking run ended");
        Ok(())
    }
}

/// Where a run's artifacts live, derived from its artifact URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactLocation {
    /// Served by the tracking server's artifact proxy (`mlflow-artifacts:`)
    Proxied(String),
    /// A directory on this machine (`file://` or a bare absolute path)
    Local(PathBuf),
}

impl ArtifactLocation {
    pub fn parse(uri: &str) -> Result<Self> {
        if let Some(rest) = uri.strip_prefix("mlflow-artifacts:") {
            // mlflow-artifacts://host:port/path carries an authority; drop it
            let path = match rest.strip_prefix("//") {
                Some(with_host) => with_host.split_once('/').map(|(_, p)| p).unwrap_or(""),
                None => rest,
            };
            return Ok(ArtifactLocation::Proxied(path.trim_matches('/').to_string()));
        }
        if let Some(path) = uri.strip_prefix("file://") {
            return Ok(ArtifactLocation::Local(PathBuf::from(path)));
        }
        if uri.starts_with('/') {
            return Ok(ArtifactLocation::Local(PathBuf::from(uri)));
        }
        bail!("Unsupported artifact location: {}", uri)
    }
}

/// Turn non-2xx responses into errors carrying the server's message
async fn check(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    bail!("Tracking server returned {} for {}: {}", status, what, body.trim())
}

#[derive(Serialize)]
struct CreateExperimentRequest<'a> {
    name: &'a str,
}

#[derive(Deserialize)]
struct CreateExperimentResponse {
    experiment_id: String,
}

#[derive(Deserialize)]
struct GetExperimentResponse {
    experiment: ExperimentInfo,
}

#[derive(Deserialize)]
struct ExperimentInfo {
    experiment_id: String,
}

#[derive(Serialize)]
struct CreateRunRequest<'a> {
    experiment_id: &'a str,
    start_time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    run_name: Option<&'a str>,
}

#[derive(Deserialize)]
struct CreateRunResponse {
    run: RunResponse,
}

#[derive(Deserialize)]
struct RunResponse {
    info: RunInfoResponse,
}

#[derive(Deserialize)]
struct RunInfoResponse {
    #[serde(alias = "run_uuid")]
    run_id: String,
    #[serde(default)]
    artifact_uri: String,
}

#[derive(Serialize)]
struct LogParamRequest<'a> {
    run_id: &'a str,
    key: &'a str,
    value: &'a str,
}

#[derive(Serialize)]
struct UpdateRunRequest<'a> {
    run_id: &'a str,
    status: RunStatus,
    end_time: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn settings(url: &str, experiment: Option<&str>) -> TrackingSettings {
        TrackingSettings {
            tracking_uri: url.to_string(),
            experiment_name: experiment.map(str::to_string),
            ..Default::default()
        }
    }

    fn run_body(run_id: &str, artifact_uri: &str) -> String {
        json!({"run": {"info": {"run_id": run_id, "artifact_uri": artifact_uri}}}).to_string()
    }

    #[test]
    fn test_artifact_location_parsing() {
        assert_eq!(
            ArtifactLocation::parse("mlflow-artifacts:/1/abc/artifacts").unwrap(),
            ArtifactLocation::Proxied("1/abc/artifacts".to_string())
        );
        assert_eq!(
            ArtifactLocation::parse("mlflow-artifacts://tracking:5000/1/abc/artifacts").unwrap(),
            ArtifactLocation::Proxied("1/abc/artifacts".to_string())
        );
        assert_eq!(
            ArtifactLocation::parse("file:///mlruns/0/abc/artifacts").unwrap(),
            ArtifactLocation::Local(PathBuf::from("/mlruns/0/abc/artifacts"))
        );
        assert_eq!(
            ArtifactLocation::parse("/mlruns/0/abc/artifacts").unwrap(),
            ArtifactLocation::Local(PathBuf::from("/mlruns/0/abc/artifacts"))
        );
        assert!(ArtifactLocation::parse("s3://bucket/artifacts").is_err());
    }

    #[tokio::test]
    async fn test_start_run_in_default_experiment() {
        let mut server = mockito::Server::new_async().await;
        let create = server
            .mock("POST", "/api/2.0/mlflow/runs/create")
            .match_body(Matcher::PartialJson(json!({"experiment_id": "0"})))
            .with_status(200)
            .with_body(run_body("run-1", "mlflow-artifacts:/0/run-1/artifacts"))
            .create_async()
            .await;

        let client = MlflowClient::new(&settings(&server.url(), None)).unwrap();
        let run = client.start_run(None).await.unwrap();

        create.assert_async().await;
        assert_eq!(run.run_id, "run-1");
        assert_eq!(run.artifact_uri, "mlflow-artifacts:/0/run-1/artifacts");
    }

    #[tokio::test]
    async fn test_start_run_creates_missing_experiment() {
        let mut server = mockito::Server::new_async().await;
        let lookup = server
            .mock("GET", "/api/2.0/mlflow/experiments/get-by-name")
            .match_query(Matcher::UrlEncoded(
                "experiment_name".into(),
                "segmentation".into(),
            ))
            .with_status(404)
            .with_body(r#"{"error_code":"RESOURCE_DOES_NOT_EXIST"}"#)
            .create_async()
            .await;
        let create_experiment = server
            .mock("POST", "/api/2.0/mlflow/experiments/create")
            .match_body(Matcher::Json(json!({"name": "segmentation"})))
            .with_status(200)
            .with_body(r#"{"experiment_id":"7"}"#)
            .create_async()
            .await;
        let create_run = server
            .mock("POST", "/api/2.0/mlflow/runs/create")
            .match_body(Matcher::PartialJson(
                json!({"experiment_id": "7", "run_name": "nightly"}),
            ))
            .with_status(200)
            .with_body(run_body("run-7", "mlflow-artifacts:/7/run-7/artifacts"))
            .create_async()
            .await;

        let client = MlflowClient::new(&settings(&server.url(), Some("segmentation"))).unwrap();
        let run = client.start_run(Some("nightly")).await.unwrap();

        lookup.assert_async().await;
        create_experiment.assert_async().await;
        create_run.assert_async().await;
        assert_eq!(run.run_id, "run-7");
    }

    #[tokio::test]
    async fn test_existing_experiment_is_reused() {
        let mut server = mockito::Server::new_async().await;
        let _lookup = server
            .mock("GET", "/api/2.0/mlflow/experiments/get-by-name")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"experiment":{"experiment_id":"3","name":"seg"}}"#)
            .create_async()
            .await;
        let create_experiment = server
            .mock("POST", "/api/2.0/mlflow/experiments/create")
            .expect(0)
            .create_async()
            .await;
        let _create_run = server
            .mock("POST", "/api/2.0/mlflow/runs/create")
            .match_body(Matcher::PartialJson(json!({"experiment_id": "3"})))
            .with_status(200)
            .with_body(run_body("run-3", "mlflow-artifacts:/3/run-3/artifacts"))
            .create_async()
            .await;

        let client = MlflowClient::new(&settings(&server.url(), Some("seg"))).unwrap();
        client.start_run(None).await.unwrap();
        create_experiment.assert_async().await;
    }

    #[tokio::test]
    async fn test_log_param_and_end_run() {
        let mut server = mockito::Server::new_async().await;
        let param = server
            .mock("POST", "/api/2.0/mlflow/runs/log-parameter")
            .match_body(Matcher::Json(
                json!({"run_id": "r", "key": "epochs", "value": "20"}),
            ))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;
        let update = server
            .mock("POST", "/api/2.0/mlflow/runs/update")
            .match_body(Matcher::PartialJson(
                json!({"run_id": "r", "status": "FAILED"}),
            ))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let client = MlflowClient::new(&settings(&server.url(), None)).unwrap();
        client.log_param("r", "epochs", "20").await.unwrap();
        client.end_run("r", RunStatus::Failed).await.unwrap();

        param.assert_async().await;
        update.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_error_is_reported() {
        let mut server = mockito::Server::new_async().await;
        let _param = server
            .mock("POST", "/api/2.0/mlflow/runs/log-parameter")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let client = MlflowClient::new(&settings(&server.url(), None)).unwrap();
        let err = client.log_param("r", "model", "m.pt").await.unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("model"));
        assert!(message.contains("500"));
        assert!(message.contains("boom"));
    }

    #[tokio::test]
    async fn test_proxied_artifact_upload() {
        let dir = tempfile::tempdir().unwrap();
        let weights = dir.path().join("best.pt");
        std::fs::write(&weights, b"weights").unwrap();

        let mut server = mockito::Server::new_async().await;
        let upload = server
            .mock(
                "PUT",
                "/api/2.0/mlflow-artifacts/artifacts/0/run-1/artifacts/best.pt",
            )
            .match_body("weights")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let client = MlflowClient::new(&settings(&server.url(), None)).unwrap();
        let run = RunInfo {
            run_id: "run-1".to_string(),
            artifact_uri: "mlflow-artifacts:/0/run-1/artifacts".to_string(),
        };
        client.log_artifact(&run, &weights).await.unwrap();
        upload.assert_async().await;
    }

    #[tokio::test]
    async fn test_local_artifact_copy() {
        let dir = tempfile::tempdir().unwrap();
        let weights = dir.path().join("best.pt");
        std::fs::write(&weights, b"weights").unwrap();
        let store = dir.path().join("mlruns/0/run-1/artifacts");

        let client = MlflowClient::new(&settings("http://127.0.0.1:1", None)).unwrap();
        let run = RunInfo {
            run_id: "run-1".to_string(),
            artifact_uri: format!("file://{}", store.display()),
        };
        client.log_artifact(&run, &weights).await.unwrap();
        assert_eq!(std::fs::read(store.join("best.pt")).unwrap(), b"weights");
    }
}
