//! Support assistant data models
//!
//! Wire types for the assistant endpoint plus the caller-facing `Query` and
//! `AnalysisResult`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Payment the user is asking about, as shown on the dashboard.
///
/// Unknown fields are kept in `extra` so that dashboard additions reach the
/// backend without an SDK release. `extra` is a `BTreeMap` so serialization
/// order is stable, which the request fingerprint relies on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,

    /// Detection status (`pending`, `confirmed`, `rejected`, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    /// Channel the payment notice came from (`whatsapp`, `email`, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_at: Option<chrono::DateTime<chrono::Utc>>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl PaymentContext {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    pub fn payment_id(mut self, id: impl Into<String>) -> Self {
        self.payment_id = Some(id.into());
        self
    }

    pub fn amount(mut self, amount: f64, currency: impl Into<String>) -> Self {
        self.amount = Some(amount);
        self.currency = Some(currency.into());
        self
    }

    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Attach an arbitrary extra field
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// A question for the support assistant. Immutable once submitted.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    text: String,
    context: Option<PaymentContext>,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            context: None,
        }
    }

    pub fn with_context(text: impl Into<String>, context: PaymentContext) -> Self {
        Self {
            text: text.into(),
            context: Some(context),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn context(&self) -> Option<&PaymentContext> {
        self.context.as_ref()
    }
}

impl From<&str> for Query {
    fn from(text: &str) -> Self {
        Query::new(text)
    }
}

impl From<String> for Query {
    fn from(text: String) -> Self {
        Query::new(text)
    }
}

/// The assistant's answer, or a canned failure template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub diagnosis: String,

    pub explanation: String,

    pub recommendation: String,

    #[serde(default)]
    pub resolved: bool,

    /// 0.0 to 1.0
    #[serde(default)]
    pub confidence: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_actions: Option<Vec<String>>,
}

/// Body of `POST <assistant endpoint>`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistRequest {
    pub problem: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<PaymentContext>,

    pub idempotency_key: String,

    pub payload_hash: String,
}

/// Envelope returned by the assistant endpoint.
///
/// Success is `{success: true, analysis}`; failures carry `error` and
/// optionally `message` and `retryAfter` (seconds).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistReply {
    #[serde(default)]
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AnalysisResult>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<f64>,
}

/// Prefill for a manual support ticket when the user escalates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketDraft {
    pub subject: String,

    pub description: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<PaymentContext>,

    pub analysis: AnalysisResult,
}

impl TicketDraft {
    /// Build a ticket prefill from the question and the last terminal answer
    pub fn from_analysis(query: &Query, analysis: &AnalysisResult) -> Self {
        let subject = crate::util::truncate_string(query.text().trim(), 80);

        let mut description = format!(
            "{}\n\nDiagnóstico: {}\n{}\n\nRecomendación: {}",
            query.text().trim(),
            analysis.diagnosis,
            analysis.explanation,
            analysis.recommendation,
        );
        if let Some(actions) = analysis.suggested_actions.as_ref().filter(|a| !a.is_empty()) {
            description.push_str("\n\nAcciones sugeridas:");
            for action in actions {
                description.push_str("\n- ");
                description.push_str(action);
            }
        }

        Self {
            subject,
            description,
            category: analysis.category.clone(),
            context: query.context().cloned(),
            analysis: analysis.clone(),
        }
    }
}
