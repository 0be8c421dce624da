//! Core abstractions for the assistant SDK
//!
//! The orchestrator talks to the outside world only through these traits:
//!
//! - `AssistTransport`: performs one outbound assistant call
//! - `SessionProvider`: supplies the optional bearer token of the signed-in user
//! - `TicketSink`: receives a ticket prefill when the user escalates
//! - `OrchestratorBuilder`: wires everything together

pub mod builder;
pub use builder::OrchestratorBuilder;

use async_trait::async_trait;

use crate::error::Result;
use crate::services::assistant::{AnalysisResult, AssistRequest, TicketDraft};

/// Performs a single assistant call.
///
/// Cancellation is cooperative: the orchestrator drops the returned future
/// when the attempt is superseded or times out, so implementations must not
/// rely on running to completion.
#[async_trait]
pub trait AssistTransport: Send + Sync {
    /// Send one attempt and return the assistant's analysis
    async fn send(&self, request: &AssistRequest) -> Result<AnalysisResult>;

    /// Transport name used in logs and error context
    fn name(&self) -> &str {
        "assistant"
    }
}

/// Source of the signed-in user's access token.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// `None` for anonymous callers; the endpoint accepts both
    async fn bearer_token(&self) -> Option<String>;
}

/// Session provider for callers without a session
#[derive(Debug, Clone, Copy, Default)]
pub struct AnonymousSession;

#[async_trait]
impl SessionProvider for AnonymousSession {
    async fn bearer_token(&self) -> Option<String> {
        None
    }
}

/// Session provider holding a fixed token, for scripts and tests
#[derive(Debug, Clone)]
pub struct StaticSession(pub String);

#[async_trait]
impl SessionProvider for StaticSession {
    async fn bearer_token(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

/// Receives the ticket prefill built from a terminal analysis.
#[async_trait]
pub trait TicketSink: Send + Sync {
    /// Create (or open a form for) a support ticket; returns its identifier
    async fn create_ticket(&self, draft: TicketDraft) -> Result<String>;
}
