//! The "ask the support assistant" orchestrator
//!
//! `Orchestrator::submit` is the single entry point. Each call moves through
//! `Idle -> Submitting -> {Applied, Dropped} -> Idle`:
//!
//! 1. refused while a rate-limit window is active
//! 2. refused while an attempt for the same question is in flight;
//!    a different question supersedes the in-flight attempt
//! 3. refused if it repeats the last successfully answered question
//! 4. a new attempt token is issued (cancelling any previous one) and a
//!    fresh idempotency key is minted
//! 5. the transport call runs under the per-attempt deadline
//! 6. the result is applied only if the attempt's token is still current
//!
//! Failures never cross the `submit` boundary: they are classified and
//! turned into a terminal `AnalysisResult`. Cancelled attempts produce no
//! result at all.

mod stats;
pub use stats::OrchestratorStats;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use parking_lot::Mutex;
use tracing::Instrument;

use crate::cancellation::{AttemptToken, CancellationController};
use crate::config::AssistConfig;
use crate::core::{AssistTransport, TicketSink};
use crate::error::mapping::{classify, DEFAULT_RETRY_AFTER};
use crate::error::{ErrorKind, Result, ServiceError};
use crate::gate::{GateGuard, RequestGate};
use crate::keyer::{Fingerprint, IdempotencyKey, RequestKeyer};
use crate::rate_limit::RateLimiter;
use crate::services::assistant::{AnalysisResult, AssistRequest, Query, TicketDraft};
use crate::util::sanitize_for_logging;

/// Whether an attempt currently holds the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    Idle,
    Submitting,
}

/// Why a submission produced no result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    /// A rate-limit window is active
    RateLimited = 0,
    /// The same question is already in flight
    Busy = 1,
    /// Same question as the last successful answer
    Duplicate = 2,
    /// A newer submission replaced this one before it settled
    Superseded = 3,
    /// The orchestrator was shut down
    TornDown = 4,
}

impl DropReason {
    pub const ALL: [DropReason; 5] = [
        DropReason::RateLimited,
        DropReason::Busy,
        DropReason::Duplicate,
        DropReason::Superseded,
        DropReason::TornDown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::RateLimited => "rate_limited",
            DropReason::Busy => "busy",
            DropReason::Duplicate => "duplicate",
            DropReason::Superseded => "superseded",
            DropReason::TornDown => "torn_down",
        }
    }
}

/// What a call to `submit` produced
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// The attempt settled while current; its result is now the visible one
    Applied(AnalysisResult),
    /// Silent no-op
    Dropped(DropReason),
}

impl SubmitOutcome {
    pub fn into_result(self) -> Option<AnalysisResult> {
        match self {
            SubmitOutcome::Applied(result) => Some(result),
            SubmitOutcome::Dropped(_) => None,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, SubmitOutcome::Applied(_))
    }

    pub fn drop_reason(&self) -> Option<DropReason> {
        match self {
            SubmitOutcome::Applied(_) => None,
            SubmitOutcome::Dropped(reason) => Some(*reason),
        }
    }
}

/// Snapshot of the attempt holding the gate
#[derive(Debug, Clone, PartialEq)]
pub struct InFlightState {
    pub token: AttemptToken,
    pub fingerprint: Fingerprint,
    pub idempotency_key: IdempotencyKey,
    pub started_at: DateTime<Utc>,
}

/// In-flight state plus the gate it owns; dropping it releases the gate
struct InFlightSlot {
    state: InFlightState,
    _gate: GateGuard,
}

#[derive(Default)]
struct Visible {
    in_flight: Option<InFlightSlot>,
    last_successful: Option<Fingerprint>,
    last_result: Option<AnalysisResult>,
    last_query: Option<Query>,
    torn_down: bool,
}

/// Timing knobs, taken from `AssistConfig`
#[derive(Debug, Clone, Copy)]
pub struct OrchestratorOptions {
    pub timeout: Duration,
    pub default_retry_after: Duration,
    pub tick_interval: Duration,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            default_retry_after: DEFAULT_RETRY_AFTER,
            tick_interval: Duration::from_secs(1),
        }
    }
}

impl From<&AssistConfig> for OrchestratorOptions {
    fn from(config: &AssistConfig) -> Self {
        Self {
            timeout: config.timeout,
            default_retry_after: config.default_retry_after,
            tick_interval: config.tick_interval,
        }
    }
}

/// Drives submissions to the support assistant
pub struct Orchestrator {
    transport: Arc<dyn AssistTransport>,
    ticket_sink: Option<Arc<dyn TicketSink>>,
    keyer: RequestKeyer,
    gate: Arc<RequestGate>,
    cancellation: CancellationController,
    rate_limiter: RateLimiter,
    visible: Mutex<Visible>,
    options: OrchestratorOptions,
    stats: OrchestratorStats,
}

impl Orchestrator {
    /// Create an orchestrator over any transport
    pub fn new(transport: Arc<dyn AssistTransport>, options: OrchestratorOptions) -> Self {
        Self {
            transport,
            ticket_sink: None,
            keyer: RequestKeyer::new(),
            gate: Arc::new(RequestGate::new()),
            cancellation: CancellationController::new(),
            rate_limiter: RateLimiter::new(options.tick_interval),
            visible: Mutex::new(Visible::default()),
            options,
            stats: OrchestratorStats::default(),
        }
    }

    /// Attach the collaborator that receives escalated tickets
    pub fn with_ticket_sink(mut self, sink: Arc<dyn TicketSink>) -> Self {
        self.ticket_sink = Some(sink);
        self
    }

    /// Ask the assistant. Never fails: errors become a terminal result,
    /// and refused or superseded calls come back as `Dropped`.
    pub async fn submit(&self, query: impl Into<Query>) -> SubmitOutcome {
        let query = query.into();
        self.stats.record_submitted();

        let fingerprint = self.keyer.fingerprint_query(&query);
        let (token, key) = match self.admit(&fingerprint) {
            Ok(admitted) => admitted,
            Err(reason) => return self.dropped(reason),
        };

        let request = AssistRequest {
            problem: query.text().to_string(),
            context: query.context().cloned(),
            idempotency_key: key.to_string(),
            payload_hash: fingerprint.to_string(),
        };

        let mut cleanup = AttemptCleanup {
            orchestrator: self,
            token: token.clone(),
            armed: true,
        };

        debug!(
            "Starting assistant attempt {} (fingerprint {}, key {})",
            token.id(),
            fingerprint,
            key
        );

        let span = tracing::info_span!(
            "assist_attempt",
            attempt = token.id(),
            fingerprint = %fingerprint,
            idempotency_key = %key,
        );
        let call = tokio::time::timeout(self.options.timeout, self.transport.send(&request)).instrument(span);

        let settled = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            result = call => Some(result.unwrap_or_else(|_| {
                Err(ServiceError::timeout(format!(
                    "No response within {}s",
                    self.options.timeout.as_secs_f64()
                )))
            })),
        };

        match settled {
            Some(result) => self.settle(&mut cleanup, query, fingerprint, result),
            None => {
                drop(cleanup);
                self.dropped(self.cancelled_reason())
            }
        }
    }

    /// Cooldown, gate, duplicate and supersession checks; on success the
    /// attempt owns the gate and is the current one.
    fn admit(&self, fingerprint: &Fingerprint) -> std::result::Result<(AttemptToken, IdempotencyKey), DropReason> {
        let mut visible = self.visible.lock();

        if visible.torn_down {
            return Err(DropReason::TornDown);
        }

        // Checked under the same lock `settle` arms the window with
        if self.rate_limiter.is_blocked() {
            return Err(DropReason::RateLimited);
        }

        let guard = match self.gate.acquire_guard() {
            Some(guard) => {
                if visible.last_successful.as_ref() == Some(fingerprint) {
                    return Err(DropReason::Duplicate);
                }
                guard
            }
            None => {
                let in_flight = visible.in_flight.as_ref().map(|slot| &slot.state.fingerprint);
                if in_flight == Some(fingerprint) {
                    return Err(DropReason::Busy);
                }
                if visible.last_successful.as_ref() == Some(fingerprint) {
                    return Err(DropReason::Duplicate);
                }

                // A different question: orphan the running attempt and take its gate
                let previous = visible.in_flight.take().ok_or(DropReason::Busy)?;
                debug!("Superseding assistant attempt {}", previous.state.token.id());
                drop(previous);

                self.gate.acquire_guard().ok_or(DropReason::Busy)?
            }
        };

        let token = self.cancellation.begin();
        let key = self.keyer.new_idempotency_key();

        visible.in_flight = Some(InFlightSlot {
            state: InFlightState {
                token: token.clone(),
                fingerprint: fingerprint.clone(),
                idempotency_key: key.clone(),
                started_at: Utc::now(),
            },
            _gate: guard,
        });

        Ok((token, key))
    }

    /// Apply a settled attempt if it is still current
    fn settle(
        &self,
        cleanup: &mut AttemptCleanup<'_>,
        query: Query,
        fingerprint: Fingerprint,
        result: Result<AnalysisResult>,
    ) -> SubmitOutcome {
        let mut visible = self.visible.lock();

        if !self.cancellation.is_current(&cleanup.token) {
            drop(visible);
            debug!("Discarding stale response for attempt {}", cleanup.token.id());
            return self.dropped(self.cancelled_reason());
        }

        // Releases the gate
        let slot = take_slot(&mut visible, &cleanup.token);
        cleanup.armed = false;
        drop(slot);

        let applied = match result {
            Ok(analysis) => {
                info!(
                    "Assistant answered (resolved: {}, confidence: {:.2})",
                    analysis.resolved, analysis.confidence
                );
                self.stats.record_success();
                visible.last_successful = Some(fingerprint);
                analysis
            }
            Err(err) => {
                let classification = classify(&err, self.options.default_retry_after);
                warn!(
                    "Assistant call failed ({}): {}",
                    classification.kind,
                    sanitize_for_logging(&err.to_string())
                );
                self.stats.record_failure(classification.kind);

                if let (ErrorKind::RateLimit, Some(retry_after)) = (classification.kind, classification.retry_after) {
                    self.rate_limiter.observe(retry_after);
                }
                classification.result
            }
        };

        visible.last_result = Some(applied.clone());
        visible.last_query = Some(query);

        SubmitOutcome::Applied(applied)
    }

    fn cancelled_reason(&self) -> DropReason {
        if self.is_shut_down() {
            DropReason::TornDown
        } else {
            DropReason::Superseded
        }
    }

    fn dropped(&self, reason: DropReason) -> SubmitOutcome {
        debug!("Assistant submission dropped: {}", reason.as_str());
        self.stats.record_dropped(reason);
        SubmitOutcome::Dropped(reason)
    }

    /// Cancel anything in flight and refuse further submissions.
    ///
    /// A response arriving afterwards is discarded.
    pub fn shutdown(&self) {
        {
            let mut visible = self.visible.lock();
            visible.torn_down = true;
            self.cancellation.cancel_all();
            visible.in_flight = None;
        }
        self.rate_limiter.disarm();
        info!("Assistant orchestrator shut down");
    }

    /// Hand a prefill of the last terminal result to the ticket collaborator.
    ///
    /// `Ok(None)` if nothing has been applied yet.
    pub async fn escalate(&self) -> Result<Option<String>> {
        let sink = self
            .ticket_sink
            .as_ref()
            .ok_or_else(|| ServiceError::configuration("No ticket sink configured"))?;

        match self.ticket_draft() {
            Some(draft) => sink.create_ticket(draft).await.map(Some),
            None => Ok(None),
        }
    }

    /// Ticket prefill built from the last applied result
    pub fn ticket_draft(&self) -> Option<TicketDraft> {
        let visible = self.visible.lock();
        match (&visible.last_query, &visible.last_result) {
            (Some(query), Some(result)) => Some(TicketDraft::from_analysis(query, result)),
            _ => None,
        }
    }

    pub fn state(&self) -> OrchestratorState {
        if self.visible.lock().in_flight.is_some() {
            OrchestratorState::Submitting
        } else {
            OrchestratorState::Idle
        }
    }

    pub fn in_flight(&self) -> Option<InFlightState> {
        self.visible.lock().in_flight.as_ref().map(|slot| slot.state.clone())
    }

    /// The result currently shown to the user
    pub fn last_result(&self) -> Option<AnalysisResult> {
        self.visible.lock().last_result.clone()
    }

    pub fn is_rate_limited(&self) -> bool {
        self.rate_limiter.is_blocked()
    }

    pub fn rate_limit_remaining(&self) -> u64 {
        self.rate_limiter.remaining_seconds()
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn is_shut_down(&self) -> bool {
        self.visible.lock().torn_down
    }

    pub fn stats(&self) -> &OrchestratorStats {
        &self.stats
    }

    pub fn metrics(&self) -> HashMap<String, String> {
        self.stats.as_map()
    }

    pub fn transport_name(&self) -> &str {
        self.transport.name()
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.cancellation.cancel_all();
    }
}

fn take_slot(visible: &mut Visible, token: &AttemptToken) -> Option<InFlightSlot> {
    match &visible.in_flight {
        Some(slot) if slot.state.token == *token => visible.in_flight.take(),
        _ => None,
    }
}

/// Frees the attempt's slot and gate on every exit path of `submit`:
/// supersession, panics in the transport, and the caller dropping the
/// future. A slot that already belongs to a newer attempt is left alone.
struct AttemptCleanup<'a> {
    orchestrator: &'a Orchestrator,
    token: AttemptToken,
    armed: bool,
}

impl Drop for AttemptCleanup<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut visible = self.orchestrator.visible.lock();
        drop(take_slot(&mut visible, &self.token));
    }
}
