//! HTTP transport for the support assistant endpoint
//!
//! One `POST` per attempt with body
//! `{problem, context?, idempotencyKey, payloadHash}`. The backend's public
//! API key goes in the `apikey` header; the user's access token, when there
//! is a session, goes in `Authorization: Bearer`.

mod models;
pub use models::*;

use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, StatusCode};

use crate::config::AssistConfig;
use crate::core::{AssistTransport, SessionProvider};
use crate::error::mapping::map_http_error;
use crate::error::{ErrorContext, Result, ServiceError};
use crate::services::common::{
    build_http_client, create_error_context, parse_error_response, parse_retry_after,
};

const SERVICE_NAME: &str = "assistant";

/// reqwest-backed `AssistTransport`
pub struct HttpAssistTransport {
    http_client: Client,
    endpoint: String,
    session: Arc<dyn SessionProvider>,
}

impl HttpAssistTransport {
    /// Create a transport from a validated configuration
    pub fn new(config: &AssistConfig, session: Arc<dyn SessionProvider>) -> Result<Self> {
        let http_client = build_http_client(&config.user_agent, &config.api_key, config.timeout)?;

        Ok(Self {
            http_client,
            endpoint: config.endpoint.clone(),
            session,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl AssistTransport for HttpAssistTransport {
    async fn send(&self, request: &AssistRequest) -> Result<AnalysisResult> {
        let mut builder = self.http_client.post(&self.endpoint).json(request);

        let authenticated = match self.session.bearer_token().await {
            Some(token) => {
                builder = builder.bearer_auth(token);
                true
            }
            None => false,
        };

        debug!(
            "Sending request to assistant: POST {} (key {}, authenticated: {})",
            self.endpoint, request.idempotency_key, authenticated
        );

        let response = builder.send().await?;

        let status = response.status();
        let context = create_error_context(SERVICE_NAME, &self.endpoint, &request.idempotency_key, Some(status));

        if !status.is_success() {
            return Err(parse_error_response(context, response).await);
        }

        let retry_after = parse_retry_after(response.headers());
        let body = response.text().await?;

        interpret_reply(status, &body, retry_after, context)
    }

    fn name(&self) -> &str {
        SERVICE_NAME
    }
}

/// Turn a 2xx body into an analysis or a ServiceError.
///
/// The endpoint reports some failures (notably `rate_limit`) inside a 2xx
/// envelope, so the body is checked for `error` before `success`.
fn interpret_reply(
    status: StatusCode,
    body: &str,
    retry_after: Option<std::time::Duration>,
    mut context: ErrorContext,
) -> Result<AnalysisResult> {
    let reply: AssistReply = serde_json::from_str(body).map_err(|e| {
        ServiceError::parsing(format!("Invalid assistant response: {}", e)).with_context(context.clone())
    })?;

    if reply.error.is_some() {
        let error = map_http_error(status, body, retry_after, &mut context);
        return Err(error.with_context(context));
    }

    match reply {
        AssistReply {
            success: true,
            analysis: Some(analysis),
            ..
        } => Ok(analysis),
        _ => Err(ServiceError::parsing("Assistant response has no analysis").with_context(context)),
    }
}
