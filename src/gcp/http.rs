//! HTTP utilities for GCP REST API calls

use crate::error::{Error, Result};
use reqwest::{Client, Method};
use serde_json::Value;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Truncate a response body and strip control characters before logging
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut end = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..end], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// Pull `error.message` out of a GCP error body, if there is one
fn provider_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
        .map(sanitize_for_log)
}

/// HTTP client wrapper for GCP API calls
#[derive(Clone)]
pub struct GcpHttpClient {
    client: Client,
}

impl GcpHttpClient {
    /// Create a new HTTP client
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("gcp-scheduler/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::provider(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { client })
    }

    pub async fn get(&self, url: &str, token: &str) -> Result<Value> {
        self.send(Method::GET, url, token, None).await
    }

    pub async fn post(&self, url: &str, token: &str, body: Option<&Value>) -> Result<Value> {
        self.send(Method::POST, url, token, body).await
    }

    pub async fn put(&self, url: &str, token: &str, body: &Value) -> Result<Value> {
        self.send(Method::PUT, url, token, Some(body)).await
    }

    pub async fn patch(&self, url: &str, token: &str, body: &Value) -> Result<Value> {
        self.send(Method::PATCH, url, token, Some(body)).await
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        token: &str,
        body: Option<&Value>,
    ) -> Result<Value> {
        tracing::debug!("{} {}", method, url);

        let mut request = self.client.request(method, url).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::provider(format!("failed to send request: {e}")))?;

        let status = response.status();
        let response_body = response
            .text()
            .await
            .map_err(|e| Error::provider(format!("failed to read response body: {e}")))?;

        if !status.is_success() {
            tracing::error!("API error: {} - {}", status, sanitize_for_log(&response_body));
            let message = match provider_message(&response_body) {
                Some(detail) => format!("API request failed: {} ({})", status, detail),
                None => format!("API request failed: {}", status),
            };
            return Err(Error::provider_status(status.as_u16(), message));
        }

        if response_body.is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&response_body)
            .map_err(|e| Error::provider(format!("failed to parse response JSON: {e}")))
    }
}

/// Format a GCP API error for display
pub fn format_gcp_error(error: &Error) -> String {
    match error.status() {
        Some(403) => return "Permission denied. Check the service account's IAM roles.".to_string(),
        Some(401) => return "Authentication failed. Check Application Default Credentials.".to_string(),
        Some(404) => return "Resource not found.".to_string(),
        Some(429) => return "Rate limit exceeded.".to_string(),
        Some(400) => return "Invalid request. The resource may not be in a state that allows this operation.".to_string(),
        Some(409) => return "Resource conflict. Another operation may be in progress.".to_string(),
        Some(500) | Some(503) => return "GCP service temporarily unavailable.".to_string(),
        _ => {},
    }

    let error_str = error.to_string();
    let sanitized = error_str
        .chars()
        .filter(|c| c.is_ascii_graphic() || *c == ' ')
        .take(120)
        .collect::<String>();

    if sanitized.len() < error_str.len() {
        format!("{}...", sanitized)
    } else {
        sanitized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_truncates_long_bodies() {
        let body = "x".repeat(500);
        let sanitized = sanitize_for_log(&body);
        assert!(sanitized.starts_with(&"x".repeat(MAX_LOG_BODY_LENGTH)));
        assert!(sanitized.contains("500 bytes total"));
    }

    #[test]
    fn test_provider_message_extracts_error() {
        let body = r#"{"error":{"code":400,"message":"Instance is not running"}}"#;
        assert_eq!(
            provider_message(body),
            Some("Instance is not running".to_string())
        );
        assert_eq!(provider_message("not json"), None);
    }

    #[test]
    fn test_format_gcp_error_by_status() {
        let err = Error::provider_status(403, "API request failed: 403 Forbidden");
        assert_eq!(
            format_gcp_error(&err),
            "Permission denied. Check the service account's IAM roles."
        );

        let err = Error::provider("failed to send request: connection refused");
        assert!(format_gcp_error(&err).contains("connection refused"));
    }
}
