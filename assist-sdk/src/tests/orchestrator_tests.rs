//! Tests for the submission state machine
//!
//! These tests drive `Orchestrator::submit` against a scripted transport and
//! check the admission, supersession, failure and cooldown behavior.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use futures::future::join_all;
    use tokio_test::{assert_pending, assert_ready};

    use crate::core::OrchestratorBuilder;
    use crate::error::ServiceError;
    use crate::keyer::RequestKeyer;
    use crate::orchestrator::{DropReason, Orchestrator, OrchestratorState, SubmitOutcome};
    use crate::services::assistant::{PaymentContext, Query};
    use crate::tests::support::{analysis, run_pending, Reply, ScriptedTransport};

    fn orchestrator(transport: &Arc<ScriptedTransport>) -> Arc<Orchestrator> {
        OrchestratorBuilder::new()
            .transport(transport.clone())
            .build()
            .expect("Failed to build orchestrator")
    }

    fn spawn_submit(
        orchestrator: &Arc<Orchestrator>,
        text: &'static str,
    ) -> tokio::task::JoinHandle<SubmitOutcome> {
        let orchestrator = Arc::clone(orchestrator);
        tokio::spawn(async move { orchestrator.submit(text).await })
    }

    #[tokio::test]
    async fn test_happy_path_applies_result() {
        let transport = ScriptedTransport::new();
        transport.push(Reply::Now(Ok(analysis("Pago rechazado"))));
        let orchestrator = orchestrator(&transport);

        let outcome = orchestrator.submit("¿Por qué falló mi pago?").await;
        let result = outcome.into_result().expect("result should be applied");

        assert_eq!(result.diagnosis, "Pago rechazado");
        assert_eq!(orchestrator.last_result(), Some(result));
        assert_eq!(orchestrator.state(), OrchestratorState::Idle);
        assert!(orchestrator.in_flight().is_none());

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].problem, "¿Por qué falló mi pago?");
        assert!(!requests[0].idempotency_key.is_empty());

        let expected = RequestKeyer::new().fingerprint("¿Por qué falló mi pago?", None);
        assert_eq!(requests[0].payload_hash, expected.as_str());
    }

    #[tokio::test]
    async fn test_submit_stays_pending_until_reply() {
        let transport = ScriptedTransport::new();
        let release = transport.push_later();
        let orchestrator = orchestrator(&transport);

        let mut submit = tokio_test::task::spawn(orchestrator.submit("Pregunta"));
        assert_pending!(submit.poll());
        assert_eq!(orchestrator.state(), OrchestratorState::Submitting);
        assert!(orchestrator.last_result().is_none());

        release.send(Ok(analysis("Listo"))).unwrap();
        assert!(submit.is_woken());

        let outcome = assert_ready!(submit.poll());
        assert!(outcome.is_applied());
        assert_eq!(orchestrator.state(), OrchestratorState::Idle);
    }

    #[tokio::test]
    async fn test_repeat_of_last_success_is_dropped() {
        let transport = ScriptedTransport::new();
        let orchestrator = orchestrator(&transport);

        assert!(orchestrator.submit("Mi pago no aparece").await.is_applied());

        // Same question after normalization
        let outcome = orchestrator.submit("  mi PAGO no aparece ").await;
        assert_eq!(outcome, SubmitOutcome::Dropped(DropReason::Duplicate));
        assert_eq!(transport.calls(), 1);

        // Same text, different payment context
        let context = PaymentContext::new().payment_id("pay_123").status("failed");
        let outcome = orchestrator
            .submit(Query::with_context("Mi pago no aparece", context.clone()))
            .await;
        assert!(outcome.is_applied());
        assert_eq!(transport.calls(), 2);
        assert_eq!(transport.requests()[1].context, Some(context));
    }

    #[tokio::test]
    async fn test_same_question_while_in_flight_is_busy() {
        let transport = ScriptedTransport::new();
        let release = transport.push_later();
        let orchestrator = orchestrator(&transport);

        let first = spawn_submit(&orchestrator, "Cobro duplicado");
        run_pending().await;

        assert_eq!(orchestrator.state(), OrchestratorState::Submitting);
        let in_flight = orchestrator.in_flight().expect("attempt should be in flight");
        assert_eq!(
            in_flight.idempotency_key.as_str(),
            transport.requests()[0].idempotency_key
        );

        let outcome = orchestrator.submit("Cobro duplicado").await;
        assert_eq!(outcome, SubmitOutcome::Dropped(DropReason::Busy));
        assert_eq!(transport.calls(), 1);

        release.send(Ok(analysis("Listo"))).unwrap();
        let outcome = first.await.unwrap();
        assert_eq!(outcome.into_result().unwrap().diagnosis, "Listo");
        assert_eq!(orchestrator.state(), OrchestratorState::Idle);
    }

    #[tokio::test]
    async fn test_concurrent_identical_submissions_make_one_call() {
        let transport = ScriptedTransport::new();
        let release = transport.push_later();
        let orchestrator = orchestrator(&transport);

        let handles: Vec<_> = (0..5)
            .map(|_| spawn_submit(&orchestrator, "¿Dónde está mi reembolso?"))
            .collect();
        run_pending().await;

        assert_eq!(transport.calls(), 1);
        release.send(Ok(analysis("Reembolso en curso"))).unwrap();

        let outcomes: Vec<SubmitOutcome> = join_all(handles)
            .await
            .into_iter()
            .map(|joined| joined.unwrap())
            .collect();

        let applied = outcomes.iter().filter(|o| o.is_applied()).count();
        let busy = outcomes
            .iter()
            .filter(|o| o.drop_reason() == Some(DropReason::Busy))
            .count();
        assert_eq!(applied, 1);
        assert_eq!(busy, 4);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_threaded_identical_submissions_never_overlap() {
        let transport = ScriptedTransport::new();
        transport.push(Reply::After(Duration::from_millis(50), Ok(analysis("Pago rechazado"))));
        let orchestrator = orchestrator(&transport);
        let barrier = Arc::new(tokio::sync::Barrier::new(16));

        let tasks = (0..16).map(|_| {
            let orchestrator = Arc::clone(&orchestrator);
            let barrier = Arc::clone(&barrier);
            tokio::spawn(async move {
                barrier.wait().await;
                orchestrator.submit("¿Por qué falló mi pago?").await
            })
        });
        let outcomes: Vec<SubmitOutcome> = join_all(tasks)
            .await
            .into_iter()
            .map(|outcome| outcome.unwrap())
            .collect();

        let applied = outcomes.iter().filter(|outcome| outcome.is_applied()).count();
        assert_eq!(applied, 1);
        for outcome in &outcomes {
            assert!(matches!(
                outcome,
                SubmitOutcome::Applied(_)
                    | SubmitOutcome::Dropped(DropReason::Busy)
                    | SubmitOutcome::Dropped(DropReason::Duplicate)
            ));
        }

        assert_eq!(transport.calls(), 1);
        assert_eq!(transport.peak_outstanding(), 1);
        assert_eq!(transport.outstanding(), 0);
        assert_eq!(orchestrator.state(), OrchestratorState::Idle);
    }

    #[tokio::test]
    async fn test_new_question_supersedes_in_flight_attempt() {
        let transport = ScriptedTransport::new();
        let reply_a = transport.push_later();
        let reply_b = transport.push_later();
        let orchestrator = orchestrator(&transport);

        let a = spawn_submit(&orchestrator, "Pregunta A");
        run_pending().await;
        let key_a = orchestrator.in_flight().unwrap().idempotency_key;

        let b = spawn_submit(&orchestrator, "Pregunta B");
        run_pending().await;

        assert_eq!(a.await.unwrap(), SubmitOutcome::Dropped(DropReason::Superseded));
        assert_eq!(transport.outstanding(), 1);
        assert_eq!(transport.calls(), 2);

        let in_flight = orchestrator.in_flight().unwrap();
        assert_ne!(in_flight.idempotency_key, key_a);
        assert_eq!(in_flight.idempotency_key.as_str(), transport.requests()[1].idempotency_key);

        // The superseded call was dropped, so its late answer has nowhere to go
        assert!(reply_a.send(Ok(analysis("A"))).is_err());

        reply_b.send(Ok(analysis("B"))).unwrap();
        let result = b.await.unwrap().into_result().unwrap();
        assert_eq!(result.diagnosis, "B");
        assert_eq!(orchestrator.last_result().unwrap().diagnosis, "B");
        assert_eq!(transport.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_idempotency_keys_are_fresh_per_attempt() {
        let transport = ScriptedTransport::new();
        transport.push(Reply::Now(Err(ServiceError::network("connection reset"))));
        let orchestrator = orchestrator(&transport);

        orchestrator.submit("No puedo pagar").await;
        orchestrator.submit("No puedo pagar").await;

        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].payload_hash, requests[1].payload_hash);
        assert_ne!(requests[0].idempotency_key, requests[1].idempotency_key);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_blocks_until_window_expires() {
        let transport = ScriptedTransport::new();
        transport.push(Reply::Now(Err(ServiceError::rate_limit(
            "Too many requests",
            Some(Duration::from_secs(15)),
        ))));
        let orchestrator = orchestrator(&transport);

        let result = orchestrator.submit("Pregunta uno").await.into_result().unwrap();
        assert_eq!(result.category.as_deref(), Some("rate_limit"));
        assert!(!result.resolved);
        assert_eq!(result.confidence, 0.0);
        assert!(result.explanation.contains("15"));

        assert!(orchestrator.is_rate_limited());
        assert_eq!(orchestrator.rate_limit_remaining(), 15);

        let outcome = orchestrator.submit("Pregunta dos").await;
        assert_eq!(outcome, SubmitOutcome::Dropped(DropReason::RateLimited));
        assert_eq!(transport.calls(), 1);

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert!(!orchestrator.is_rate_limited());
        assert_eq!(orchestrator.rate_limit_remaining(), 0);

        assert!(orchestrator.submit("Pregunta dos").await.is_applied());
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_without_retry_after_uses_default() {
        let transport = ScriptedTransport::new();
        transport.push(Reply::Now(Err(ServiceError::rate_limit("slow down", None))));
        let orchestrator = orchestrator(&transport);

        orchestrator.submit("Pregunta").await;
        assert_eq!(orchestrator.rate_limit_remaining(), 30);

        let transport = ScriptedTransport::new();
        transport.push(Reply::Now(Err(ServiceError::rate_limit("slow down", None))));
        let orchestrator = OrchestratorBuilder::new()
            .transport(transport.clone())
            .default_retry_after(Duration::from_secs(5))
            .build()
            .unwrap();

        orchestrator.submit("Pregunta").await;
        assert_eq!(orchestrator.rate_limit_remaining(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_call_times_out() {
        let transport = ScriptedTransport::new();
        transport.push(Reply::Hang);
        let orchestrator = orchestrator(&transport);

        let started = tokio::time::Instant::now();
        let result = orchestrator.submit("Pregunta").await.into_result().unwrap();

        assert_eq!(result.category.as_deref(), Some("timeout"));
        assert!(started.elapsed() >= Duration::from_secs(30));
        assert_eq!(transport.outstanding(), 0);
        assert_eq!(orchestrator.state(), OrchestratorState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_timeout_is_honored() {
        let transport = ScriptedTransport::new();
        transport.push(Reply::Hang);
        let orchestrator = OrchestratorBuilder::new()
            .transport(transport.clone())
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();

        let started = tokio::time::Instant::now();
        let result = orchestrator.submit("Pregunta").await.into_result().unwrap();

        assert_eq!(result.category.as_deref(), Some("timeout"));
        assert!(started.elapsed() >= Duration::from_secs(5));
        assert!(started.elapsed() < Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_failures_become_terminal_results() {
        let cases = vec![
            (ServiceError::network("connection refused"), "network"),
            (ServiceError::http(503, "upstream unavailable"), "server"),
            (ServiceError::parsing("unexpected token"), "unknown"),
        ];

        for (error, category) in cases {
            let transport = ScriptedTransport::new();
            transport.push(Reply::Now(Err(error)));
            let orchestrator = orchestrator(&transport);

            let result = orchestrator.submit("Pregunta").await.into_result().unwrap();
            assert_eq!(result.category.as_deref(), Some(category));
            assert!(!result.resolved);
            assert!(!result.diagnosis.is_empty());
            assert!(!result.suggested_actions.unwrap_or_default().is_empty());
            assert!(!orchestrator.is_rate_limited());
        }
    }

    #[tokio::test]
    async fn test_upstream_message_is_not_shown() {
        let transport = ScriptedTransport::new();
        transport.push(Reply::Now(Err(ServiceError::http(500, "panic at db.rs:42 secret"))));
        let orchestrator = orchestrator(&transport);

        let result = orchestrator.submit("Pregunta").await.into_result().unwrap();
        for text in [&result.diagnosis, &result.explanation, &result.recommendation] {
            assert!(!text.contains("secret"));
            assert!(!text.contains("db.rs"));
        }
    }

    #[tokio::test]
    async fn test_failure_does_not_suppress_resubmission() {
        let transport = ScriptedTransport::new();
        transport.push(Reply::Now(Err(ServiceError::network("connection reset"))));
        let orchestrator = orchestrator(&transport);

        let failed = orchestrator.submit("Mi transferencia").await.into_result().unwrap();
        assert_eq!(failed.category.as_deref(), Some("network"));
        assert_eq!(orchestrator.last_result(), Some(failed));

        let retried = orchestrator.submit("Mi transferencia").await;
        assert!(retried.is_applied());
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_dropping_submit_future_frees_the_gate() {
        let transport = ScriptedTransport::new();
        let _never = transport.push_later();
        let orchestrator = orchestrator(&transport);

        let task = spawn_submit(&orchestrator, "Pregunta");
        run_pending().await;
        assert_eq!(orchestrator.state(), OrchestratorState::Submitting);

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());

        assert_eq!(orchestrator.state(), OrchestratorState::Idle);
        assert_eq!(transport.outstanding(), 0);
        assert!(orchestrator.submit("Pregunta").await.is_applied());
    }

    #[tokio::test]
    async fn test_transport_panic_frees_the_gate() {
        let transport = ScriptedTransport::new();
        transport.push(Reply::Panic);
        let orchestrator = orchestrator(&transport);

        let task = spawn_submit(&orchestrator, "Pregunta");
        assert!(task.await.unwrap_err().is_panic());

        assert_eq!(orchestrator.state(), OrchestratorState::Idle);
        assert!(orchestrator.submit("Otra pregunta").await.is_applied());
    }

    #[tokio::test]
    async fn test_shutdown_cancels_and_refuses() {
        let transport = ScriptedTransport::new();
        let _never = transport.push_later();
        let orchestrator = orchestrator(&transport);

        let task = spawn_submit(&orchestrator, "Pregunta");
        run_pending().await;

        orchestrator.shutdown();
        assert!(orchestrator.is_shut_down());
        assert_eq!(task.await.unwrap(), SubmitOutcome::Dropped(DropReason::TornDown));

        let outcome = orchestrator.submit("Otra pregunta").await;
        assert_eq!(outcome, SubmitOutcome::Dropped(DropReason::TornDown));
        assert_eq!(orchestrator.state(), OrchestratorState::Idle);
        assert_eq!(transport.outstanding(), 0);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_metrics_count_outcomes() {
        let transport = ScriptedTransport::new();
        transport.push(Reply::Now(Ok(analysis("ok"))));
        transport.push(Reply::Now(Err(ServiceError::network("connection reset"))));
        let orchestrator = orchestrator(&transport);

        orchestrator.submit("Pregunta uno").await;
        orchestrator.submit("Pregunta uno").await;
        orchestrator.submit("Pregunta dos").await;

        let stats = orchestrator.stats();
        assert_eq!(stats.submitted(), 3);
        assert_eq!(stats.succeeded(), 1);
        assert_eq!(stats.dropped(DropReason::Duplicate), 1);

        let metrics = orchestrator.metrics();
        assert_eq!(metrics.get("submitted"), Some(&"3".to_string()));
        assert_eq!(metrics.get("dropped_duplicate"), Some(&"1".to_string()));
        assert_eq!(metrics.get("failed_network"), Some(&"1".to_string()));
        assert_eq!(metrics.get("failed_timeout"), Some(&"0".to_string()));
    }
}
