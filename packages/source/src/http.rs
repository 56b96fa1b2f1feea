//! HTTP plumbing shared by the providers.
//!
//! Requests are sent once. Non-success statuses become
//! [`SourceError::Response`] carrying a preview of the body so the
//! failure recorded on a layer explains itself. Retrying is the caller's
//! decision (see [`crate::retry`]).

use std::time::Duration;

use crate::SourceError;

/// Sent with every provider request.
pub const USER_AGENT: &str = "LandOS/1.0";

/// Default per-request timeout. Large polygons can take minutes to serve.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(180);

/// Maximum length of the response body preview included in errors.
const BODY_PREVIEW_LEN: usize = 500;

/// Builds a client with the shared user agent and `timeout`.
///
/// # Errors
///
/// Returns [`SourceError::Http`] if the TLS backend cannot be initialised.
pub fn client(timeout: Duration) -> Result<reqwest::Client, SourceError> {
    Ok(reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()?)
}

/// Sends a request and returns the body bytes of a 2xx response.
///
/// # Errors
///
/// Returns [`SourceError`] if the request fails or the status is not 2xx.
pub async fn send_bytes(request: reqwest::RequestBuilder) -> Result<Vec<u8>, SourceError> {
    let response = check_status(request.send().await?).await?;
    Ok(response.bytes().await?.to_vec())
}

/// Sends a request and returns the body text of a 2xx response.
///
/// # Errors
///
/// Returns [`SourceError`] if the request fails or the status is not 2xx.
pub async fn send_text(request: reqwest::RequestBuilder) -> Result<String, SourceError> {
    let response = check_status(request.send().await?).await?;
    Ok(response.text().await?)
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, SourceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().to_string();
    let body = response.text().await.unwrap_or_default();
    let preview = preview(&body);
    log::warn!("HTTP {status} from {url}\n  body preview: {preview}");

    Err(SourceError::Response {
        message: format!("HTTP {status} from {url}: {preview}"),
    })
}

/// Truncates a response body for logs and error messages.
#[must_use]
pub fn preview(body: &str) -> String {
    if body.len() > BODY_PREVIEW_LEN {
        let cut = (0..=BODY_PREVIEW_LEN)
            .rev()
            .find(|&i| body.is_char_boundary(i))
            .unwrap_or(0);
        format!("{}...", &body[..cut])
    } else {
        body.to_string()
    }
}

/// Whether `bytes` start with a TIFF byte-order marker.
#[must_use]
pub fn is_tiff(bytes: &[u8]) -> bool {
    bytes.starts_with(b"II*\0")
        || bytes.starts_with(b"MM\0*")
        || bytes.starts_with(b"II+\0")
        || bytes.starts_with(b"MM\0+")
}

/// Rejects payloads that are not TIFFs, surfacing the provider's message.
///
/// # Errors
///
/// Returns [`SourceError::Response`] with a preview of the payload.
pub fn ensure_tiff(bytes: Vec<u8>, provider: &str) -> Result<Vec<u8>, SourceError> {
    if is_tiff(&bytes) {
        return Ok(bytes);
    }
    let text = String::from_utf8_lossy(&bytes);
    Err(SourceError::Response {
        message: format!("{provider} did not return a GeoTIFF: {}", preview(&text)),
    })
}
