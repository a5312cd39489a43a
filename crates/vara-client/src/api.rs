//! HTTP client for the data and auth backends.
//!
//! One `reqwest::Client` is shared by every caller so the auth session
//! cookie set by the login flow rides along on all user-scoped requests.

use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use vara_proto::config::BackendConfig;
use vara_proto::model::ContentVersion;

use crate::error::{ClientError, Result};

/// Which backend a request goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Catalog reads, content version, play analytics.
    Data,
    /// Session, favourites, downloads, licences, billing, assistant.
    Auth,
}

/// Result of polling the content version endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionStamp {
    pub version: ContentVersion,
    pub payload: serde_json::Value,
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    data_url: String,
    auth_url: String,
}

impl ApiClient {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            http,
            data_url: config.data_url.trim_end_matches('/').to_string(),
            auth_url: config.auth_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self, backend: Backend) -> &str {
        match backend {
            Backend::Data => &self.data_url,
            Backend::Auth => &self.auth_url,
        }
    }

    pub fn url(&self, backend: Backend, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url(backend), path)
        } else {
            format!("{}/{}", self.base_url(backend), path)
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, backend: Backend, path: &str) -> Result<T> {
        let resp = self.send(self.http.get(self.url(backend, path))).await?;
        decode(resp).await
    }

    /// GET with a per-request timeout shorter than the client default.
    pub async fn get_json_with_timeout<T: DeserializeOwned>(
        &self,
        backend: Backend,
        path: &str,
        timeout: Duration,
    ) -> Result<T> {
        let req = self.http.get(self.url(backend, path)).timeout(timeout);
        match tokio::time::timeout(timeout, self.send(req)).await {
            Ok(resp) => decode(resp?).await,
            Err(_) => Err(ClientError::Timeout),
        }
    }

    pub async fn post_json<B, T>(&self, backend: Backend, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let resp = self
            .send(self.http.post(self.url(backend, path)).json(body))
            .await?;
        decode(resp).await
    }

    /// POST where only the status matters.
    pub async fn post_empty<B: Serialize + ?Sized>(
        &self,
        backend: Backend,
        path: &str,
        body: &B,
    ) -> Result<()> {
        self.send(self.http.post(self.url(backend, path)).json(body))
            .await?;
        Ok(())
    }

    pub async fn delete(&self, backend: Backend, path: &str) -> Result<()> {
        self.send(self.http.delete(self.url(backend, path))).await?;
        Ok(())
    }

    pub async fn get_bytes(&self, backend: Backend, path: &str) -> Result<Vec<u8>> {
        let resp = self.send(self.http.get(self.url(backend, path))).await?;
        Ok(resp.bytes().await?.to_vec())
    }

    /// Streams a backend file to `dest`. Returns the number of bytes written.
    pub async fn download_to(&self, backend: Backend, path: &str, dest: &Path) -> Result<u64> {
        let url = self.url(backend, path);
        self.download_url_to(&url, dest).await
    }

    /// Streams an absolute URL to `dest`, used for direct free-song downloads.
    pub async fn download_url_to(&self, url: &str, dest: &Path) -> Result<u64> {
        let resp = self.send(self.http.get(url)).await?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = resp.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        debug!("api: wrote {} bytes to {:?}", written, dest);
        Ok(written)
    }

    /// Reads the content version stamp from the data backend.
    pub async fn content_version(&self, path: &str) -> Result<VersionStamp> {
        let payload: serde_json::Value = self.get_json(Backend::Data, path).await?;
        let version = payload
            .get("v")
            .cloned()
            .ok_or_else(|| ClientError::Decode("version response has no `v` field".into()))
            .and_then(|v| serde_json::from_value::<ContentVersion>(v).map_err(ClientError::from))?;
        Ok(VersionStamp { version, payload })
    }

    async fn send(&self, req: RequestBuilder) -> Result<Response> {
        let resp = req.send().await?;
        check_status(resp).await
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

async fn check_status(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let url = resp.url().path().to_string();
    let text = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .and_then(|b| b.message.or(b.error))
        .or_else(|| {
            let t = text.trim();
            (!t.is_empty()).then(|| t.to_string())
        });

    match status {
        StatusCode::UNAUTHORIZED => {
            debug!("api: 401 from {}", url);
            Err(ClientError::Unauthorized)
        }
        StatusCode::TOO_MANY_REQUESTS => {
            warn!("api: 429 from {}", url);
            Err(ClientError::QuotaExceeded { message })
        }
        _ => {
            warn!("api: {} from {}", status, url);
            Err(ClientError::Status {
                status: status.as_u16(),
                message: message.unwrap_or_else(|| status.to_string()),
            })
        }
    }
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T> {
    let bytes = resp.bytes().await?;
    serde_json::from_slice(&bytes).map_err(ClientError::from)
}
