//! Rate-limit cooldown demo
//!
//! Runs against an in-process transport that always answers with a
//! rate-limit error, then follows the countdown until submissions are
//! accepted again.
//!
//! ```
//! cargo run --example rate_limit_countdown
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use assist_sdk::{AnalysisResult, AssistRequest, AssistTransport, OrchestratorBuilder, Result, ServiceError};

/// Rejects every request with a short cooldown
struct ThrottledTransport {
    retry_after: Duration,
}

#[async_trait]
impl AssistTransport for ThrottledTransport {
    async fn send(&self, request: &AssistRequest) -> Result<AnalysisResult> {
        log::info!("Backend received attempt {}", request.idempotency_key);
        Err(ServiceError::rate_limit("rate_limit", Some(self.retry_after)))
    }

    fn name(&self) -> &str {
        "throttled"
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let orchestrator = OrchestratorBuilder::new()
        .transport(Arc::new(ThrottledTransport {
            retry_after: Duration::from_secs(5),
        }))
        .build()?;

    let mut remaining = orchestrator.rate_limiter().subscribe();

    if let Some(result) = orchestrator.submit("¿Dónde está mi pago?").await.into_result() {
        println!("{}", result.diagnosis);
        println!("{}", result.explanation);
    }

    let outcome = orchestrator.submit("¿Y ahora?").await;
    println!("Second submission: {:?}", outcome.drop_reason());

    while remaining.changed().await.is_ok() {
        let seconds = *remaining.borrow_and_update();
        println!("Puedes volver a preguntar en {}s", seconds);
        if seconds == 0 {
            break;
        }
    }

    println!("Rate limited: {}", orchestrator.is_rate_limited());
    Ok(())
}
