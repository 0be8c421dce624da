//! # Assist SDK
//!
//! Client-side orchestrator for the payment dashboard's "ask the support
//! assistant" flow.
//!
//! This crate provides:
//!
//! - A single-flight submission gate with last-submission-wins supersession
//! - Per-attempt idempotency keys and request fingerprints for duplicate suppression
//! - Failure classification into user-facing terminal results
//! - A server-driven rate-limit cooldown with a ticking countdown
//! - Configuration management utilities
//!
//! ## Architecture
//!
//! - `Orchestrator`: the submission state machine
//! - `AssistTransport`: performs the outbound call (`HttpAssistTransport` by default)
//! - `SessionProvider`: optional bearer token of the signed-in user
//! - `TicketSink`: receives the ticket prefill on escalation
//! - `ServiceError`: error type for everything that can fail below `submit`
//!
//! ```no_run
//! # async fn run() -> assist_sdk::Result<()> {
//! let orchestrator = assist_sdk::orchestrator()
//!     .endpoint("https://example.supabase.co/functions/v1/assist")
//!     .api_key("public-anon-key")
//!     .build()?;
//!
//! if let Some(result) = orchestrator.submit("¿Por qué falló mi pago?").await.into_result() {
//!     println!("{}", result.diagnosis);
//! }
//! # Ok(())
//! # }
//! ```

pub mod core;
pub use core::{AnonymousSession, AssistTransport, OrchestratorBuilder, SessionProvider, StaticSession, TicketSink};

pub mod services;
pub use services::assistant::{
    AnalysisResult, AssistRequest, HttpAssistTransport, PaymentContext, Query, TicketDraft,
};

pub mod error;
pub use error::{ErrorContext, ErrorKind, Result, ServiceError};

pub mod config;
pub use config::{AssistConfig, ConfigProvider, ServiceConfig};

pub mod cancellation;
pub mod gate;
pub mod keyer;
pub mod rate_limit;
pub use keyer::{Fingerprint, IdempotencyKey};
pub use rate_limit::{RateLimitWindow, RateLimiter};

pub mod orchestrator;
pub use orchestrator::{
    DropReason, InFlightState, Orchestrator, OrchestratorState, OrchestratorStats, SubmitOutcome,
};

mod util;

#[cfg(test)]
mod tests;

/// Create a new orchestrator builder
pub fn orchestrator() -> OrchestratorBuilder {
    OrchestratorBuilder::new()
}
