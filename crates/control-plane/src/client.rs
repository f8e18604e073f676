//! Control-plane client.
//!
//! Async HTTP client using `reqwest`. Every endpoint answers with the
//! `{code, status, message, data}` envelope; only transport and decoding
//! failures become errors.

use std::time::Duration;

use reqwest::Url;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use vidup_protocol::{
    ApiResponse, InitUploadData, InitUploadRequest, StorageGrant, UserCredentials, token_query,
};
use vidup_upload::{ControlFuture, ControlPlane, ControlPlaneError};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors from the control-plane client.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid base URL: {0}")]
    InvalidUrl(String),
}

impl From<HttpError> for ControlPlaneError {
    fn from(e: HttpError) -> Self {
        match e {
            HttpError::Json(e) => ControlPlaneError::InvalidResponse(e.to_string()),
            other => ControlPlaneError::Transport(other.to_string()),
        }
    }
}

/// Control-plane client for one API base URL.
#[derive(Debug, Clone)]
pub struct HttpControlPlane {
    http: reqwest::Client,
    base_url: Url,
}

impl HttpControlPlane {
    /// Creates a client for `base_url` with a 30 second request timeout.
    pub fn new(base_url: &str) -> Result<Self, HttpError> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .user_agent(concat!("vidup/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Self::with_client(http, base_url)
    }

    /// Creates a client that reuses an existing `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: &str) -> Result<Self, HttpError> {
        let base_url = Url::parse(base_url).map_err(|e| HttpError::InvalidUrl(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(HttpError::InvalidUrl(base_url.to_string()));
        }
        Ok(Self { http, base_url })
    }

    /// `{base}/v2/uploadvideo/{user_id}/{action}`, with `user_id` escaped.
    fn endpoint(&self, user_id: &str, action: &str) -> Result<Url, HttpError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| HttpError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(["v2", "uploadvideo", user_id, action]);
        Ok(url)
    }

    /// Registers a video and receives its storage grant.
    pub async fn init_upload(
        &self,
        user: &UserCredentials,
        request: &InitUploadRequest,
    ) -> Result<ApiResponse<InitUploadData>, HttpError> {
        let url = self.endpoint(&user.user_id, "init")?;
        debug!(%url, size = request.file_size, "initiate request");
        let resp = self.http.post(url).form(request).send().await?;
        read_envelope(resp).await
    }

    /// Requests a fresh storage grant.
    pub async fn fetch_token(
        &self,
        user: &UserCredentials,
    ) -> Result<ApiResponse<StorageGrant>, HttpError> {
        let url = self.endpoint(&user.user_id, "token")?;
        debug!(%url, "credential refresh request");
        let resp = self.http.get(url).query(&token_query(user)).send().await?;
        read_envelope(resp).await
    }
}

impl ControlPlane for HttpControlPlane {
    fn initiate(
        &self,
        user: UserCredentials,
        request: InitUploadRequest,
    ) -> ControlFuture<'_, InitUploadData> {
        Box::pin(async move { Ok(self.init_upload(&user, &request).await?) })
    }

    fn refresh_credentials(&self, user: UserCredentials) -> ControlFuture<'_, StorageGrant> {
        Box::pin(async move { Ok(self.fetch_token(&user).await?) })
    }
}

/// Decodes a response envelope.
///
/// A non-2xx response without an envelope becomes a failure envelope
/// carrying the HTTP status. A `data` payload that does not decode is an
/// error only when the envelope reports success.
async fn read_envelope<T: DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<ApiResponse<T>, HttpError> {
    let status = resp.status();
    let body = resp.bytes().await?;

    let raw: ApiResponse<serde_json::Value> = match serde_json::from_slice(&body) {
        Ok(raw) => raw,
        Err(e) if status.is_success() => return Err(e.into()),
        Err(_) => {
            warn!(status = status.as_u16(), "control plane error without envelope");
            let text = String::from_utf8_lossy(&body);
            let message = match text.trim() {
                "" => status.canonical_reason().unwrap_or("request failed").to_string(),
                t => t.to_string(),
            };
            return Ok(ApiResponse::failure(i32::from(status.as_u16()), message));
        }
    };

    let succeeded = raw.code_ok() || raw.status_ok();
    let data = match raw.data {
        None | Some(serde_json::Value::Null) => None,
        Some(value) => match serde_json::from_value(value) {
            Ok(data) => Some(data),
            Err(e) if succeeded => return Err(e.into()),
            Err(e) => {
                debug!(error = %e, "ignoring undecodable data of a failed response");
                None
            }
        },
    };

    Ok(ApiResponse {
        code: raw.code,
        status: raw.status,
        message: raw.message,
        data,
    })
}
