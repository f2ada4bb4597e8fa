//! Shared HTTP plumbing for API sources.

use std::time::Duration;

use reqwest::{Client, Response};

use super::SourceError;

pub(crate) fn user_agent() -> String {
    format!(
        "mortem/{} (+https://github.com/mortem-dev/mortem)",
        env!("CARGO_PKG_VERSION")
    )
}

pub(crate) fn build_client(timeout: Duration) -> Result<Client, SourceError> {
    Client::builder()
        .user_agent(user_agent())
        .timeout(timeout)
        .build()
        .map_err(|e| SourceError::NotConfigured(format!("HTTP client: {}", e)))
}

/// Map non-success statuses onto [`SourceError`].
pub(crate) async fn check_status(response: Response) -> Result<Response, SourceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == 429 {
        let retry_after_ms = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(|secs| secs * 1000)
            .unwrap_or(0);
        return Err(SourceError::RateLimited { retry_after_ms });
    }
    if status == 401 || status == 403 {
        let body = response.text().await.unwrap_or_default();
        return Err(SourceError::Authentication(format!(
            "{}: {}",
            status.as_u16(),
            truncate(&body, 200)
        )));
    }
    let body = response.text().await.unwrap_or_default();
    Err(SourceError::Api {
        status: status.as_u16(),
        message: truncate(&body, 200),
    })
}

pub(crate) fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("...");
    out
}
