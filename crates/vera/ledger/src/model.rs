use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use vera_types::EntryKind;

/// Optimistic concurrency assumption for an append.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TailExpectation {
    /// The chain has no entries yet.
    Empty,
    /// The chain's tail is at this sequence.
    At(u64),
}

/// Append payload. Sequence, hashes, and timestamps are assigned by the
/// store inside the append operation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppendRequest {
    pub kind: EntryKind,
    /// Opaque reference to the governed object this entry records.
    pub payload_ref: String,
    pub payload: Value,
    /// When set, the append fails with `ConcurrencyConflict` unless the
    /// chain tail matches the expectation.
    pub expected_tail: Option<TailExpectation>,
}

impl AppendRequest {
    pub fn new(kind: EntryKind, payload_ref: impl Into<String>, payload: Value) -> Self {
        Self {
            kind,
            payload_ref: payload_ref.into(),
            payload,
            expected_tail: None,
        }
    }

    pub fn with_expected_tail(mut self, expectation: TailExpectation) -> Self {
        self.expected_tail = Some(expectation);
        self
    }
}

/// Per-tenant chain statistics.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerStatistics {
    pub total_entries: u64,
    pub by_kind: HashMap<String, u64>,
}
