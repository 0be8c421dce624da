//! Counters for orchestrator activity

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use super::DropReason;
use crate::error::ErrorKind;

#[derive(Debug, Default)]
pub struct OrchestratorStats {
    submitted: AtomicU64,
    succeeded: AtomicU64,
    dropped: [AtomicU64; 5],
    failures: [AtomicU64; 5],
}

impl OrchestratorStats {
    pub(crate) fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_success(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self, reason: DropReason) {
        self.dropped[reason as usize].fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self, kind: ErrorKind) {
        if let Some(index) = ErrorKind::ALL.iter().position(|k| *k == kind) {
            self.failures[index].fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    pub fn dropped(&self, reason: DropReason) -> u64 {
        self.dropped[reason as usize].load(Ordering::Relaxed)
    }

    pub fn failures(&self, kind: ErrorKind) -> u64 {
        ErrorKind::ALL
            .iter()
            .position(|k| *k == kind)
            .map_or(0, |index| self.failures[index].load(Ordering::Relaxed))
    }

    /// All counters as a flat string map
    pub fn as_map(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();

        map.insert("submitted".to_string(), self.submitted().to_string());
        map.insert("succeeded".to_string(), self.succeeded().to_string());

        for reason in DropReason::ALL {
            map.insert(format!("dropped_{}", reason.as_str()), self.dropped(reason).to_string());
        }

        for kind in ErrorKind::ALL {
            map.insert(format!("failed_{}", kind.as_str()), self.failures(kind).to_string());
        }

        map
    }
}
