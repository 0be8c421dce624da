//! Ask the support assistant a question
//!
//! To run this example:
//! ```
//! ASSIST_ENDPOINT=https://<project>.supabase.co/functions/v1/payment-assistant \
//! ASSIST_API_KEY=your_anon_key \
//! cargo run --example ask_assistant -- "¿Por qué mi pago aparece como pendiente?"
//! ```
//!
//! Set `ASSIST_ACCESS_TOKEN` to send the request as a signed-in user.

use std::sync::Arc;

use anyhow::Context;
use assist_sdk::{
    config::{ConfigProvider, DEFAULT_PROVIDER},
    AnonymousSession, OrchestratorBuilder, PaymentContext, Query, SessionProvider, StaticSession, SubmitOutcome,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let question = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "¿Por qué mi pago aparece como pendiente?".to_string());

    let session: Arc<dyn SessionProvider> = match DEFAULT_PROVIDER.get_string("access_token") {
        Ok(token) => Arc::new(StaticSession(token)),
        Err(_) => Arc::new(AnonymousSession),
    };

    let orchestrator = OrchestratorBuilder::from_config(&**DEFAULT_PROVIDER)
        .context("Set ASSIST_ENDPOINT and ASSIST_API_KEY")?
        .session_provider(session)
        .build()?;

    let context = PaymentContext::new()
        .payment_id("pay_demo_001")
        .amount(250.0, "MXN")
        .status("pending")
        .source("whatsapp");

    println!("Asking: {}", question);

    match orchestrator.submit(Query::with_context(question, context)).await {
        SubmitOutcome::Applied(result) => {
            println!("\nDiagnosis:      {}", result.diagnosis);
            println!("Explanation:    {}", result.explanation);
            println!("Recommendation: {}", result.recommendation);
            println!("Resolved:       {} (confidence {:.0}%)", result.resolved, result.confidence * 100.0);

            if let Some(actions) = &result.suggested_actions {
                println!("\nSuggested actions:");
                for action in actions {
                    println!("  - {}", action);
                }
            }

            if !result.resolved {
                if let Some(draft) = orchestrator.ticket_draft() {
                    println!("\nTicket prefill: {}", draft.subject);
                }
            }
        }
        SubmitOutcome::Dropped(reason) => println!("Submission dropped: {}", reason.as_str()),
    }

    println!("\nMetrics:");
    let mut metrics: Vec<_> = orchestrator.metrics().into_iter().collect();
    metrics.sort();
    for (key, value) in metrics {
        println!("  {}: {}", key, value);
    }

    Ok(())
}
