//! Shared test doubles

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::core::AssistTransport;
use crate::error::{Result, ServiceError};
use crate::services::assistant::{AnalysisResult, AssistRequest};

/// How the scripted transport answers one call
pub enum Reply {
    Now(Result<AnalysisResult>),
    /// Answer after a real-time delay
    After(Duration, Result<AnalysisResult>),
    /// Answer when the test sends on the paired channel
    Later(oneshot::Receiver<Result<AnalysisResult>>),
    /// Never answer
    Hang,
    Panic,
}

/// Decrements the outstanding count when the call future is dropped
struct Outstanding(Arc<AtomicUsize>);

impl Outstanding {
    fn enter(counter: &Arc<AtomicUsize>, peak: &AtomicUsize) -> Self {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for Outstanding {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// In-memory transport answering calls from a queue of scripted replies.
/// An empty queue answers with a canned analysis.
#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<AssistRequest>>,
    outstanding: Arc<AtomicUsize>,
    peak_outstanding: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, reply: Reply) {
        self.replies.lock().push_back(reply);
    }

    /// Queue a reply released by the returned sender
    pub fn push_later(&self) -> oneshot::Sender<Result<AnalysisResult>> {
        let (tx, rx) = oneshot::channel();
        self.push(Reply::Later(rx));
        tx
    }

    pub fn requests(&self) -> Vec<AssistRequest> {
        self.requests.lock().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    /// Calls whose futures are still alive
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Most calls ever alive at the same time
    pub fn peak_outstanding(&self) -> usize {
        self.peak_outstanding.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AssistTransport for ScriptedTransport {
    async fn send(&self, request: &AssistRequest) -> Result<AnalysisResult> {
        let _outstanding = Outstanding::enter(&self.outstanding, &self.peak_outstanding);
        self.requests.lock().push(request.clone());

        let reply = self.replies.lock().pop_front();
        match reply {
            None => Ok(analysis(&format!("Respuesta para: {}", request.problem))),
            Some(Reply::Now(result)) => result,
            Some(Reply::After(delay, result)) => {
                tokio::time::sleep(delay).await;
                result
            }
            Some(Reply::Later(rx)) => rx
                .await
                .unwrap_or_else(|_| Err(ServiceError::network("scripted reply dropped"))),
            Some(Reply::Hang) => std::future::pending().await,
            Some(Reply::Panic) => panic!("scripted transport panic"),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// A successful analysis with the given diagnosis
pub fn analysis(diagnosis: &str) -> AnalysisResult {
    AnalysisResult {
        diagnosis: diagnosis.to_string(),
        explanation: "El pago fue rechazado por el banco emisor.".to_string(),
        recommendation: "Intenta con otra tarjeta.".to_string(),
        resolved: true,
        confidence: 0.85,
        category: Some("payment_declined".to_string()),
        suggested_actions: Some(vec!["Usar otra tarjeta".to_string()]),
    }
}

/// Let spawned tasks run up to their next suspension point
pub async fn run_pending() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}
