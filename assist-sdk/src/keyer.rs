//! Request fingerprints and idempotency keys
//!
//! A `Fingerprint` identifies *what* was asked and is only used to suppress
//! duplicate submissions. An `IdempotencyKey` identifies one *attempt* and
//! is never reused, even when the same question is asked again.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use sha2::{Digest, Sha256};

use crate::services::assistant::{PaymentContext, Query};

/// Separates the normalized text from the serialized context in the digest
const FIELD_SEPARATOR: u8 = 0x1f;

/// Hex chars kept from the digest; collisions are tolerable here
const FINGERPRINT_LEN: usize = 16;

/// Deterministic digest over a normalized query
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-attempt key letting the backend deduplicate retried requests
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Computes fingerprints and mints idempotency keys
#[derive(Debug, Default)]
pub struct RequestKeyer {
    sequence: AtomicU64,
}

impl RequestKeyer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fingerprint of `(normalize(text), serialize(context))`.
    ///
    /// Text is trimmed and lowercased. Context serialization is stable
    /// because `PaymentContext` has a fixed field order and sorted extras.
    pub fn fingerprint(&self, text: &str, context: Option<&PaymentContext>) -> Fingerprint {
        let normalized = normalize(text);
        let serialized = context
            .and_then(|c| serde_json::to_string(c).ok())
            .unwrap_or_default();

        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        hasher.update([FIELD_SEPARATOR]);
        hasher.update(serialized.as_bytes());
        let mut hex = hex::encode(hasher.finalize());
        hex.truncate(FINGERPRINT_LEN);
        Fingerprint(hex)
    }

    /// Fingerprint of a whole query
    pub fn fingerprint_query(&self, query: &Query) -> Fingerprint {
        self.fingerprint(query.text(), query.context())
    }

    /// A fresh key: wall-clock millis, a per-keyer sequence, and a random UUID
    pub fn new_idempotency_key(&self) -> IdempotencyKey {
        let millis = chrono::Utc::now().timestamp_millis();
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let random = uuid::Uuid::new_v4().simple();

        IdempotencyKey(format!("{:x}-{:x}-{}", millis, seq, random))
    }
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}
