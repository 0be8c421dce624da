//! Common utilities for HTTP service clients

use std::time::Duration;

use reqwest::{header, Client};

use crate::error::mapping::{map_http_error, seconds_to_duration};
use crate::error::{ErrorContext, Result, ServiceError};

/// Header carrying the backend's public API key
pub const API_KEY_HEADER: &str = "apikey";

/// Build the HTTP client shared by every attempt.
///
/// The client-level timeout is a backstop only; the orchestrator enforces
/// the per-attempt deadline itself.
pub fn build_http_client(user_agent: &str, api_key: &str, timeout: Duration) -> Result<Client> {
    let mut headers = header::HeaderMap::new();

    headers.insert(
        header::USER_AGENT,
        header::HeaderValue::from_str(user_agent)
            .map_err(|e| ServiceError::configuration(format!("Invalid user agent: {}", e)))?,
    );

    let mut key_value = header::HeaderValue::from_str(api_key)
        .map_err(|e| ServiceError::configuration(format!("Invalid API key header: {}", e)))?;
    key_value.set_sensitive(true);
    headers.insert(API_KEY_HEADER, key_value);

    Client::builder()
        .default_headers(headers)
        .timeout(timeout + Duration::from_secs(5))
        .gzip(true)
        .build()
        .map_err(|e| ServiceError::configuration(format!("Failed to build HTTP client: {}", e)))
}

/// Parse a `Retry-After` header given in seconds
pub fn parse_retry_after(headers: &header::HeaderMap) -> Option<Duration> {
    headers
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<f64>().ok())
        .and_then(seconds_to_duration)
}

/// Create error context for an assistant request
pub fn create_error_context(
    service_name: &str,
    endpoint: &str,
    request_id: &str,
    status: Option<reqwest::StatusCode>,
) -> ErrorContext {
    let mut context = ErrorContext::for_service(service_name)
        .endpoint(endpoint)
        .request_id(request_id);

    if let Some(status_code) = status {
        context = context.status_code(status_code.as_u16());
    }

    context
}

/// Parse an error response into a ServiceError carrying its context
pub async fn parse_error_response(mut context: ErrorContext, response: reqwest::Response) -> ServiceError {
    let status = response.status();
    let retry_after = parse_retry_after(response.headers());

    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => {
            log::debug!("Failed to read error response body: {}", e);
            String::new()
        }
    };

    let error = map_http_error(status, &body, retry_after, &mut context);
    error.with_context(context)
}
