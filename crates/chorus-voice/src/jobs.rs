//! Job Poller: bounded polling of asynchronous remote voice-cloning jobs.
//!
//! Each poll attempt waits one interval first, then fetches the job status, so
//! exhausting `max_attempts` takes at least `max_attempts * interval`. Waiting is
//! a `tokio::time::sleep`, never a blocking sleep.

use crate::config::CloningConfig;
use crate::error::{VoiceError, VoiceResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Remote status of a cloning job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Succeeded(String),
    Failed(String),
    TimedOut,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Pending)
    }
}

#[derive(Debug, Clone)]
pub struct BackendJob {
    pub job_token: String,
    pub submitted_at: DateTime<Utc>,
    pub poll_attempts: u32,
    pub status: JobStatus,
}

/// Job-based cloning API: submit text, then poll for a result URL.
#[async_trait]
pub trait CloningApi: Send + Sync {
    /// Returns the job token.
    async fn submit(&self, text: &str, voice_id: &str) -> VoiceResult<String>;

    async fn poll_status(&self, job_token: &str) -> VoiceResult<JobStatus>;
}

pub struct JobPoller {
    api: Arc<dyn CloningApi>,
    max_attempts: u32,
    interval: Duration,
}

impl JobPoller {
    pub fn new(api: Arc<dyn CloningApi>, max_attempts: u32, interval: Duration) -> Self {
        Self {
            api,
            max_attempts: max_attempts.max(1),
            interval,
        }
    }

    pub fn from_config(api: Arc<dyn CloningApi>, config: &CloningConfig) -> Self {
        Self::new(api, config.max_attempts, config.poll_interval())
    }

    pub async fn submit(&self, text: &str, voice_id: &str) -> VoiceResult<BackendJob> {
        let job_token = self.api.submit(text, voice_id).await.map_err(|e| match e {
            VoiceError::SubmissionFailed(_) => e,
            other => VoiceError::SubmissionFailed(other.to_string()),
        })?;
        info!(job_token = %job_token, voice_id, "cloning job submitted");
        Ok(BackendJob {
            job_token,
            submitted_at: Utc::now(),
            poll_attempts: 0,
            status: JobStatus::Pending,
        })
    }

    /// Poll until the job succeeds (result URL), fails, or runs out of attempts.
    /// A failing status fetch counts as an attempt and is retried.
    pub async fn poll_until_terminal(&self, job: &mut BackendJob) -> VoiceResult<String> {
        while job.poll_attempts < self.max_attempts {
            tokio::time::sleep(self.interval).await;
            job.poll_attempts += 1;
            match self.api.poll_status(&job.job_token).await {
                Ok(JobStatus::Pending) => {
                    debug!(job_token = %job.job_token, attempt = job.poll_attempts, "job pending");
                }
                Ok(JobStatus::Succeeded(url)) => {
                    info!(job_token = %job.job_token, attempt = job.poll_attempts, "job succeeded");
                    job.status = JobStatus::Succeeded(url.clone());
                    return Ok(url);
                }
                Ok(JobStatus::Failed(reason)) => {
                    warn!(job_token = %job.job_token, reason = %reason, "job failed");
                    job.status = JobStatus::Failed(reason.clone());
                    return Err(VoiceError::JobFailed {
                        token: job.job_token.clone(),
                        reason,
                    });
                }
                Ok(JobStatus::TimedOut) => {
                    job.status = JobStatus::TimedOut;
                    return Err(VoiceError::TimedOut {
                        token: job.job_token.clone(),
                        attempts: job.poll_attempts,
                    });
                }
                Err(e) => {
                    warn!(job_token = %job.job_token, attempt = job.poll_attempts, error = %e, "job poll failed");
                }
            }
        }
        job.status = JobStatus::TimedOut;
        Err(VoiceError::TimedOut {
            token: job.job_token.clone(),
            attempts: job.poll_attempts,
        })
    }
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(alias = "id", alias = "job_id")]
    token: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
    #[serde(default)]
    result_url: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// HTTP client for the cloning API (`POST /jobs`, `GET /jobs/{token}`).
#[derive(Debug, Clone)]
pub struct HttpCloningApi {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpCloningApi {
    pub fn new(config: &CloningConfig) -> VoiceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            client,
        })
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.api_key {
            Some(ref key) => builder.bearer_auth(key),
            None => builder,
        }
    }
}

#[async_trait]
impl CloningApi for HttpCloningApi {
    async fn submit(&self, text: &str, voice_id: &str) -> VoiceResult<String> {
        let url = format!("{}/jobs", self.base_url);
        let body = serde_json::json!({ "text": text, "voice_id": voice_id });
        let res = self.authorized(self.client.post(&url)).json(&body).send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let detail = res.text().await.unwrap_or_default();
            return Err(VoiceError::SubmissionFailed(format!("{}: {}", status, detail)));
        }
        let parsed: SubmitResponse = res.json().await?;
        Ok(parsed.token)
    }

    async fn poll_status(&self, job_token: &str) -> VoiceResult<JobStatus> {
        let url = format!("{}/jobs/{}", self.base_url, job_token);
        let parsed: StatusResponse = self
            .authorized(self.client.get(&url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(parse_status(parsed))
    }
}

fn parse_status(res: StatusResponse) -> JobStatus {
    match res.status.to_ascii_lowercase().as_str() {
        "succeeded" | "success" | "completed" | "done" => match res.result_url {
            Some(url) => JobStatus::Succeeded(url),
            None => JobStatus::Failed("finished without a result url".to_string()),
        },
        "failed" | "error" => JobStatus::Failed(res.error.unwrap_or_else(|| "unknown error".to_string())),
        _ => JobStatus::Pending,
    }
}
