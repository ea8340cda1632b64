//! reqwest-backed implementations of the service traits.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;

use super::types::{
    JobStatusResponse, LaunchRequest, LaunchResponse, RawResultRecord, UploadSlot,
    UploadSlotRequest, UploadSlotsResponse,
};
use super::{JobService, ObjectStorage, ResultStore};
use crate::config::{JobServiceConfig, UploadConfig};
use crate::error::ServiceError;
use crate::sanitize::{redact_signed_url, truncate_body};

fn build_client(
    connect_timeout: Duration,
    request_timeout: Duration,
) -> Result<Client, ServiceError> {
    Client::builder()
        .connect_timeout(connect_timeout)
        .timeout(request_timeout)
        .build()
        .map_err(|e| ServiceError::Client(e.to_string()))
}

/// Turns a non-2xx response into [`ServiceError::Status`] with a truncated body.
async fn check_status(url: &str, response: Response) -> Result<Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ServiceError::Status {
        url: url.to_string(),
        status: status.as_u16(),
        body: truncate_body(&body),
    })
}

async fn decode<T: DeserializeOwned>(url: &str, response: Response) -> Result<T, ServiceError> {
    let text = response.text().await.map_err(|e| ServiceError::Transport {
        url: url.to_string(),
        source: e.without_url(),
    })?;
    serde_json::from_str(&text).map_err(|e| ServiceError::Decode {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

/// Client for the job service HTTP API.
pub struct HttpJobService {
    client: Client,
    base_url: Url,
    token: Option<SecretString>,
}

impl HttpJobService {
    pub fn new(
        config: &JobServiceConfig,
        token: Option<SecretString>,
    ) -> Result<Self, ServiceError> {
        let base_url = Url::parse(config.base_url.trim()).map_err(|e| {
            ServiceError::Client(format!("Invalid base URL '{}': {}", config.base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ServiceError::Client(format!(
                "Base URL '{}' cannot carry a path",
                config.base_url
            )));
        }
        Ok(Self {
            client: build_client(config.connect_timeout(), config.request_timeout())?,
            base_url,
            token,
        })
    }

    /// Builds the service from config, resolving the optional bearer token.
    pub fn from_config(config: &JobServiceConfig) -> crate::Result<Self> {
        let token = config.token_source().resolve_optional()?;
        Ok(Self::new(config, token)?)
    }

    /// `base_url` joined with percent-encoded path segments.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ServiceError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                ServiceError::Client(format!("Base URL '{}' cannot carry a path", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token.expose_secret()),
            None => builder,
        }
    }

    async fn post_json<B, T>(&self, segments: &[&str], body: &B) -> Result<T, ServiceError>
    where
        B: serde::Serialize + Sync,
        T: DeserializeOwned,
    {
        let url = self.endpoint(segments)?;
        let url_str = url.to_string();
        debug!("POST {}", url_str);

        let response = self
            .authorize(self.client.post(url))
            .json(body)
            .send()
            .await
            .map_err(|e| ServiceError::Transport {
                url: url_str.clone(),
                source: e,
            })?;

        let response = check_status(&url_str, response).await?;
        decode(&url_str, response).await
    }
}

#[async_trait]
impl JobService for HttpJobService {
    async fn request_upload_slots(
        &self,
        request: &UploadSlotRequest,
    ) -> Result<UploadSlotsResponse, ServiceError> {
        self.post_json(&["generate-upload-urls"], request).await
    }

    async fn launch_job(&self, request: &LaunchRequest) -> Result<LaunchResponse, ServiceError> {
        self.post_json(&["ultra-batch-analyze"], request).await
    }

    async fn job_status(&self, job_id: &str) -> Result<JobStatusResponse, ServiceError> {
        let url = self.endpoint(&["ultra-batch-status", job_id])?;
        let url_str = url.to_string();
        debug!("GET {}", url_str);

        let response = self
            .authorize(self.client.get(url))
            .send()
            .await
            .map_err(|e| ServiceError::Transport {
                url: url_str.clone(),
                source: e,
            })?;

        let response = check_status(&url_str, response).await?;
        decode(&url_str, response).await
    }
}

/// The status endpoint doubles as the result store: it returns every record
/// written so far.
#[async_trait]
impl ResultStore for HttpJobService {
    async fn fetch_records(&self, job_id: &str) -> Result<Vec<RawResultRecord>, ServiceError> {
        Ok(self.job_status(job_id).await?.results)
    }
}

/// Uploads directly to signed object-storage URLs.
///
/// Never attaches the job service token: signed URLs carry their own
/// credentials.
#[derive(Clone)]
pub struct HttpObjectStorage {
    client: Client,
}

impl HttpObjectStorage {
    pub fn new(config: &UploadConfig, connect_timeout: Duration) -> Result<Self, ServiceError> {
        Ok(Self {
            client: build_client(connect_timeout, Duration::from_secs(config.timeout_secs))?,
        })
    }
}

#[async_trait]
impl ObjectStorage for HttpObjectStorage {
    async fn put(
        &self,
        slot: &UploadSlot,
        content_type: &str,
        data: Vec<u8>,
    ) -> Result<(), ServiceError> {
        let redacted = redact_signed_url(&slot.signed_url);
        debug!("PUT {} ({} bytes)", redacted, data.len());

        let response = self
            .client
            .put(&slot.signed_url)
            .header(CONTENT_TYPE, content_type)
            .body(data)
            .send()
            .await
            .map_err(|e| ServiceError::Transport {
                url: redacted.clone(),
                source: e.without_url(),
            })?;

        check_status(&redacted, response).await?;
        Ok(())
    }
}
