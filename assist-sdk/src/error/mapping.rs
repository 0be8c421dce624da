//! Error mapping and classification
//!
//! `map_http_error` turns an assistant error response into a `ServiceError`.
//! `classify` reduces any `ServiceError` to an `ErrorKind` and the canned,
//! user-safe `AnalysisResult` shown for it. Rules are evaluated in order and
//! the first match wins:
//!
//! 1. HTTP 429, a `rate_limit` body, or a rate-limit marker in backend text
//! 2. client-side deadline elapsed
//! 3. transport failure (refused, reset, DNS)
//! 4. HTTP 5xx or a `server` marker in backend text
//! 5. anything else
//!
//! Backend text is the message of an HTTP or rate-limit error plus the body's
//! `error` code. Locally produced messages (transport errors embed the request
//! URL, decode errors embed the body) are never scanned for markers.

use std::time::Duration;

use reqwest::StatusCode;
use serde_json::Value;

use super::{ErrorContext, ErrorKind, ServiceError};
use crate::services::assistant::AnalysisResult;

/// Back-off applied when the backend rate-limits without saying for how long
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(30);

/// Upper bound on any cooldown, whatever the backend asks for
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

const RATE_LIMIT_MARKERS: [&str; 3] = ["rate_limit", "rate limit", "too many requests"];
const SERVER_MARKERS: [&str; 1] = ["server"];

/// Outcome of classifying a failed attempt
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub kind: ErrorKind,

    /// Only set for `ErrorKind::RateLimit`
    pub retry_after: Option<Duration>,

    /// Terminal result presented to the user
    pub result: AnalysisResult,
}

/// Map an assistant error response to a ServiceError.
///
/// `retry_after_header` is the parsed `Retry-After` header; a `retryAfter`
/// field in the body takes precedence over it.
pub fn map_http_error(
    status: StatusCode,
    body: &str,
    retry_after_header: Option<Duration>,
    context: &mut ErrorContext,
) -> ServiceError {
    context.service = "assistant".to_string();
    context.status_code = Some(status.as_u16());

    if let Ok(json) = serde_json::from_str::<Value>(body) {
        let code = json.get("error").and_then(Value::as_str);
        if let Some(code) = code {
            context.error_code = Some(code.to_string());
        }

        let message = json
            .get("message")
            .and_then(Value::as_str)
            .or(code)
            .map(str::to_string)
            .unwrap_or_else(|| status.to_string());

        let retry_after = json
            .get("retryAfter")
            .and_then(Value::as_f64)
            .and_then(seconds_to_duration)
            .or(retry_after_header);

        if status == StatusCode::TOO_MANY_REQUESTS || code == Some("rate_limit") {
            return ServiceError::rate_limit(message, retry_after);
        }

        return ServiceError::http(status.as_u16(), message);
    }

    // Fallback to status-based mapping
    let message = if body.is_empty() {
        status.to_string()
    } else {
        format!("{}: {}", status, crate::util::truncate_string(body, 100))
    };

    if status == StatusCode::TOO_MANY_REQUESTS {
        ServiceError::rate_limit(message, retry_after_header)
    } else {
        ServiceError::http(status.as_u16(), message)
    }
}

/// Convert a server-supplied seconds value, rejecting negatives and NaN.
/// Values past `MAX_RETRY_AFTER` are clamped to it.
pub fn seconds_to_duration(seconds: f64) -> Option<Duration> {
    if seconds.is_nan() || seconds < 0.0 {
        return None;
    }
    let duration = Duration::try_from_secs_f64(seconds).unwrap_or(MAX_RETRY_AFTER);
    Some(duration.min(MAX_RETRY_AFTER))
}

/// Reduce a failure to the closed taxonomy plus its user-facing template.
pub fn classify(error: &ServiceError, default_retry_after: Duration) -> Classification {
    let kind = classify_kind(error);

    let retry_after = match kind {
        ErrorKind::RateLimit => Some(
            error
                .retry_after()
                .unwrap_or(default_retry_after)
                .min(MAX_RETRY_AFTER),
        ),
        _ => None,
    };

    Classification {
        kind,
        retry_after,
        result: failure_result(kind, retry_after),
    }
}

/// The ordered rule set, without building the template
pub fn classify_kind(error: &ServiceError) -> ErrorKind {
    let root = error.root();
    let status = error.status_code();
    let text = backend_text(error);
    let mentions = |markers: &[&str]| markers.iter().any(|m| text.contains(*m));

    if matches!(root, ServiceError::RateLimit { .. })
        || status == Some(429)
        || mentions(&RATE_LIMIT_MARKERS[..])
    {
        return ErrorKind::RateLimit;
    }

    if matches!(root, ServiceError::Timeout(_)) {
        return ErrorKind::Timeout;
    }

    if matches!(root, ServiceError::Network(_)) {
        return ErrorKind::Network;
    }

    if matches!(status, Some(500..=599)) || mentions(&SERVER_MARKERS[..]) {
        return ErrorKind::Server;
    }

    ErrorKind::Unknown
}

/// Lowercased text that came from the backend, empty for local failures
fn backend_text(error: &ServiceError) -> String {
    let mut text = match error.root() {
        ServiceError::RateLimit { message, .. } | ServiceError::Http { message, .. } => message.to_lowercase(),
        _ => String::new(),
    };
    if let Some(code) = error.error_code() {
        text.push(' ');
        text.push_str(&code.to_lowercase());
    }
    text
}

/// Fixed result template for each kind. Never includes upstream messages.
pub fn failure_result(kind: ErrorKind, retry_after: Option<Duration>) -> AnalysisResult {
    let (diagnosis, explanation, recommendation, actions): (&str, String, &str, Vec<String>) = match kind {
        ErrorKind::RateLimit => {
            let seconds = retry_after.unwrap_or(DEFAULT_RETRY_AFTER).as_secs().max(1);
            (
                "Demasiadas consultas al asistente",
                format!(
                    "Alcanzaste el límite de consultas. Podrás volver a preguntar en {} segundos.",
                    seconds
                ),
                "Espera a que termine la cuenta regresiva antes de enviar otra consulta.",
                vec![
                    format!("Esperar {} segundos", seconds),
                    "Crear un ticket de soporte si el problema es urgente".to_string(),
                ],
            )
        }
        ErrorKind::Timeout => (
            "El asistente tardó demasiado en responder",
            "No recibimos respuesta a tiempo. Tu consulta no se perdió, pero no pudimos analizarla.".to_string(),
            "Intenta de nuevo en unos momentos o crea un ticket de soporte.",
            vec![
                "Reintentar la consulta".to_string(),
                "Crear un ticket de soporte".to_string(),
            ],
        ),
        ErrorKind::Network => (
            "No pudimos conectar con el asistente",
            "Parece que hay un problema de conexión entre tu navegador y nuestro servicio.".to_string(),
            "Revisa tu conexión a internet e intenta de nuevo.",
            vec![
                "Verificar la conexión a internet".to_string(),
                "Reintentar la consulta".to_string(),
            ],
        ),
        ErrorKind::Server => (
            "El asistente no está disponible en este momento",
            "Nuestro servicio tuvo un problema al procesar tu consulta.".to_string(),
            "Intenta de nuevo en unos minutos o crea un ticket de soporte.",
            vec![
                "Reintentar más tarde".to_string(),
                "Crear un ticket de soporte".to_string(),
            ],
        ),
        ErrorKind::Unknown => (
            "No pudimos analizar tu consulta",
            "Ocurrió un error inesperado al consultar al asistente.".to_string(),
            "Intenta de nuevo o crea un ticket de soporte para que un agente te ayude.",
            vec!["Crear un ticket de soporte".to_string()],
        ),
    };

    AnalysisResult {
        diagnosis: diagnosis.to_string(),
        explanation,
        recommendation: recommendation.to_string(),
        resolved: false,
        confidence: 0.0,
        category: Some(kind.as_str().to_string()),
        suggested_actions: Some(actions),
    }
}
