//! Orchestrator builder
//!
//! Collects configuration and collaborators, validates them, and produces a
//! ready `Orchestrator`. Without an explicit transport the builder wires up
//! `HttpAssistTransport` against the configured endpoint.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{AssistConfig, ConfigProvider, ServiceConfig};
use crate::core::{AnonymousSession, AssistTransport, SessionProvider, TicketSink};
use crate::error::{Result, ServiceError};
use crate::orchestrator::{Orchestrator, OrchestratorOptions};
use crate::services::assistant::HttpAssistTransport;

/// Builder for `Orchestrator`
pub struct OrchestratorBuilder {
    config: AssistConfig,

    /// Bearer token source for the HTTP transport
    session: Option<Arc<dyn SessionProvider>>,

    /// Escalation target
    ticket_sink: Option<Arc<dyn TicketSink>>,

    /// Replaces the HTTP transport entirely
    transport: Option<Arc<dyn AssistTransport>>,
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self {
            config: AssistConfig::default(),
            session: None,
            ticket_sink: None,
            transport: None,
        }
    }
}

impl fmt::Debug for OrchestratorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrchestratorBuilder")
            .field("endpoint", &self.config.endpoint)
            .field("timeout", &self.config.timeout)
            .field("session", &self.session.is_some())
            .field("ticket_sink", &self.ticket_sink.is_some())
            .field("transport", &self.transport.is_some())
            .finish()
    }
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from configuration read through a provider
    pub fn from_config<P: ConfigProvider + ?Sized>(provider: &P) -> Result<Self> {
        Ok(Self {
            config: AssistConfig::from_provider(provider)?,
            ..Self::default()
        })
    }

    /// Start from an existing configuration
    pub fn with_config(mut self, config: AssistConfig) -> Self {
        self.config = config;
        self
    }

    /// Full URL of the assistant function
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.endpoint = endpoint.into();
        self
    }

    /// Public API key of the managed backend
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.config.api_key = api_key.into();
        self
    }

    /// Per-attempt deadline
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Cooldown applied when a rate-limit response has no `retryAfter`
    pub fn default_retry_after(mut self, retry_after: Duration) -> Self {
        self.config.default_retry_after = retry_after;
        self
    }

    pub fn tick_interval(mut self, tick_interval: Duration) -> Self {
        self.config.tick_interval = tick_interval;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    pub fn session_provider(mut self, session: Arc<dyn SessionProvider>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn ticket_sink(mut self, sink: Arc<dyn TicketSink>) -> Self {
        self.ticket_sink = Some(sink);
        self
    }

    /// Use a custom transport; endpoint and API key are then not required
    pub fn transport(mut self, transport: Arc<dyn AssistTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Validate and build
    pub fn build(self) -> Result<Arc<Orchestrator>> {
        let transport: Arc<dyn AssistTransport> = match self.transport {
            Some(transport) => {
                if self.config.timeout.is_zero() {
                    return Err(ServiceError::configuration("Timeout must be greater than zero"));
                }
                if self.config.tick_interval.is_zero() {
                    return Err(ServiceError::configuration("Tick interval must be greater than zero"));
                }
                transport
            }
            None => {
                self.config.validate()?;
                let session = self
                    .session
                    .unwrap_or_else(|| Arc::new(AnonymousSession) as Arc<dyn SessionProvider>);
                Arc::new(HttpAssistTransport::new(&self.config, session)?)
            }
        };

        log::debug!(
            "Building assistant orchestrator (transport: {}, timeout: {:?})",
            transport.name(),
            self.config.timeout
        );

        let mut orchestrator = Orchestrator::new(transport, OrchestratorOptions::from(&self.config));
        if let Some(sink) = self.ticket_sink {
            orchestrator = orchestrator.with_ticket_sink(sink);
        }

        Ok(Arc::new(orchestrator))
    }
}
