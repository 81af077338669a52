//! HTTP client for the transcoding worker service.
//!
//! The worker performs the actual encoding; this module only speaks its
//! JSON endpoints. [`WorkerApi`] wraps one [`reqwest::Client`] plus a base
//! URL. The two operations the engine core drives (job creation and the
//! authoritative job list) are abstracted behind [`WorkerBackend`] so the
//! submission and reconciliation logic can be tested without a network.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::job::JobState;

/// Worker-side concurrency limit, `GET`/`POST /jobs-config`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobsConfig {
    pub max_concurrent_tasks: u32,
}

/// Worker input/output directories, `GET`/`POST /directories`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Directories {
    pub input_dir: String,
    pub output_dir: String,
}

/// Body of `POST /jobs`: one input plus its resolved encoding parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    pub filename: String,
    pub codec: String,
    pub crf: u32,
    pub extra_args: Vec<String>,
}

/// Successful response of `POST /jobs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedJob {
    pub job_id: String,
}

/// One entry of the authoritative job list, `GET /jobs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteJob {
    pub job_id: String,
    pub filename: String,
    pub state: JobState,
    pub progress: f64,
    #[serde(default)]
    pub speed: Option<f64>,
}

/// Historical completed-job record, `GET /job-logs`. Read-only for
/// display; `exit_code == 0` means success. The timestamp is kept as the
/// opaque string the worker logged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobLogEntry {
    #[serde(default)]
    pub timestamp: Option<String>,
    pub filename: String,
    pub codec: String,
    pub crf: u32,
    #[serde(default)]
    pub compression_ratio: Option<f64>,
    #[serde(default)]
    pub elapsed_seconds: Option<f64>,
    pub exit_code: i32,
}

impl JobLogEntry {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// Errors from the worker HTTP layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The HTTP request itself failed (network, DNS, timeout).
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The worker returned a non-2xx status code.
    #[error("worker returned {status}: {body}")]
    Status {
        status: u16,
        /// Raw response body, the worker's textual reason.
        body: String,
    },
}

/// The two worker operations the engine core depends on.
///
/// [`WorkerApi`] is the production implementation; tests script a fake.
pub trait WorkerBackend: Send + Sync {
    fn create_job(
        &self,
        request: &JobRequest,
    ) -> impl Future<Output = Result<CreatedJob, ApiError>> + Send;

    fn list_jobs(&self) -> impl Future<Output = Result<Vec<RemoteJob>, ApiError>> + Send;
}

/// HTTP client for a single worker instance.
#[derive(Debug, Clone)]
pub struct WorkerApi {
    client: reqwest::Client,
    base_url: String,
}

impl WorkerApi {
    /// Create a client for a worker at `base_url` (e.g. `http://host:5000`).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Create a client reusing an existing [`reqwest::Client`] (to share
    /// connection pooling and timeouts configured by the caller).
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn jobs_config(&self) -> Result<JobsConfig, ApiError> {
        let response = self
            .client
            .get(format!("{}/jobs-config", self.base_url))
            .send()
            .await?;
        Self::parse_json(response).await
    }

    pub async fn set_jobs_config(&self, config: &JobsConfig) -> Result<JobsConfig, ApiError> {
        let response = self
            .client
            .post(format!("{}/jobs-config", self.base_url))
            .json(config)
            .send()
            .await?;
        Self::parse_json(response).await
    }

    pub async fn directories(&self) -> Result<Directories, ApiError> {
        let response = self
            .client
            .get(format!("{}/directories", self.base_url))
            .send()
            .await?;
        Self::parse_json(response).await
    }

    pub async fn set_directories(&self, dirs: &Directories) -> Result<Directories, ApiError> {
        let response = self
            .client
            .post(format!("{}/directories", self.base_url))
            .json(dirs)
            .send()
            .await?;
        Self::parse_json(response).await
    }

    /// Input filenames currently available for submission, in server order.
    pub async fn list_inputs(&self) -> Result<Vec<String>, ApiError> {
        let response = self
            .client
            .get(format!("{}/inputs", self.base_url))
            .send()
            .await?;
        Self::parse_json(response).await
    }

    pub async fn job_logs(&self) -> Result<Vec<JobLogEntry>, ApiError> {
        let response = self
            .client
            .get(format!("{}/job-logs", self.base_url))
            .send()
            .await?;
        Self::parse_json(response).await
    }

    async fn parse_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json::<T>().await?)
    }
}

impl WorkerBackend for WorkerApi {
    async fn create_job(&self, request: &JobRequest) -> Result<CreatedJob, ApiError> {
        let response = self
            .client
            .post(format!("{}/jobs", self.base_url))
            .json(request)
            .send()
            .await?;
        Self::parse_json(response).await
    }

    async fn list_jobs(&self) -> Result<Vec<RemoteJob>, ApiError> {
        let response = self
            .client
            .get(format!("{}/jobs", self.base_url))
            .send()
            .await?;
        Self::parse_json(response).await
    }
}
