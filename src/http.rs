//! Shared response handling for the HTTP clients: every failure is mapped onto
//! the core error type so the pipeline's retry rules apply uniformly.

use reqwest::Response;
use serde::de::DeserializeOwned;
use wp_mirror_core::error::SyncError;

pub const USER_AGENT: &str = concat!("wp-mirror/", env!("CARGO_PKG_VERSION"));

pub fn transport(url: &str, e: reqwest::Error) -> SyncError {
    SyncError::Transport {
        url: url.to_string(),
        message: e.to_string(),
    }
}

/// Pass through 2xx responses; anything else becomes [`SyncError::Status`]
/// carrying the response body.
pub async fn check(url: &str, response: Response) -> Result<Response, SyncError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| String::from("<Failed to decode response body>"));
    Err(SyncError::Status {
        url: url.to_string(),
        status: status.as_u16(),
        body,
    })
}

pub async fn decode_json<T: DeserializeOwned>(url: &str, response: Response) -> Result<T, SyncError> {
    response.json::<T>().await.map_err(|e| SyncError::Decode {
        url: url.to_string(),
        message: e.to_string(),
    })
}
