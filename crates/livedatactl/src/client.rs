//! HTTP client for livedatad

use anyhow::{anyhow, bail, Context, Result};
use livedata_common::api::{CleanupRequestBody, HealthResponse, JobAccepted, QueryRequestBody};
use livedata_common::config::LivedataConfig;
use livedata_common::result_store::JobResultRecord;
use livedata_common::types::ManagedDeviceSummary;
use livedata_common::JobFailure;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Turn a listen address into a base URL; full URLs pass through
pub fn base_url_for(listen: &str) -> String {
    let trimmed = listen.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    }
}

/// Client for communicating with livedatad
pub struct LivedataClient {
    client: reqwest::Client,
    base_url: String,
}

impl LivedataClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("livedatactl/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url_for(base_url),
        })
    }

    /// Use `url` when given, else the daemon's configured listen address
    pub fn from_config(url: Option<&str>) -> Result<Self> {
        match url {
            Some(url) => Self::new(url),
            None => {
                let config = LivedataConfig::load().context("Failed to load configuration")?;
                Self::new(&config.server.listen)
            }
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Cannot reach livedatad at {}", self.base_url))?;
        decode(resp).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("Cannot reach livedatad at {}", self.base_url))?;
        decode(resp).await
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        self.get("/v1/health").await
    }

    pub async fn managed_device(&self, object_type: &str, id: &str) -> Result<ManagedDeviceSummary> {
        self.get(&format!("/v1/managed-device/{}/{}", object_type, id))
            .await
    }

    pub async fn submit_query(&self, object_type: &str, id: &str, filter: Option<String>) -> Result<Uuid> {
        let accepted: JobAccepted = self
            .post(
                &format!("/v1/query/{}/{}", object_type, id),
                &QueryRequestBody { filter },
            )
            .await?;
        Ok(accepted.job_id)
    }

    pub async fn submit_cleanup(&self, days_to_keep: Option<u32>, dry_run: bool) -> Result<Uuid> {
        let body = CleanupRequestBody {
            days_to_keep,
            dry_run: Some(dry_run),
        };
        let accepted: JobAccepted = self.post("/v1/cleanup", &body).await?;
        Ok(accepted.job_id)
    }

    pub async fn job(&self, id: &Uuid) -> Result<JobResultRecord> {
        self.get(&format!("/v1/jobs/{}", id)).await
    }

    /// Poll a job until it finishes or `timeout` elapses
    pub async fn wait_for_job(&self, id: &Uuid, timeout: Duration) -> Result<JobResultRecord> {
        let deadline = Instant::now() + timeout;
        loop {
            let record = self.job(id).await?;
            if record.status.is_finished() {
                return Ok(record);
            }
            if Instant::now() >= deadline {
                bail!(
                    "Job {} still {} after {}s",
                    id,
                    record.status,
                    timeout.as_secs()
                );
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
    let status = resp.status();
    if status.is_success() {
        return resp.json::<T>().await.context("Malformed response from livedatad");
    }

    let body = resp.text().await.unwrap_or_default();
    match serde_json::from_str::<JobFailure>(&body) {
        Ok(failure) => Err(anyhow!("{} ({}): {}", failure.kind, failure.code, failure.message)),
        Err(_) => Err(anyhow!("livedatad returned {}: {}", status, body.trim())),
    }
}
