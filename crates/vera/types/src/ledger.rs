use crate::hash::ContentHash;
use crate::id::TenantId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The category of governed action an entry records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    ApprovalDecision,
    BindingActivated,
    BindingViolation,
    BindingStatusChanged,
    BundleExported,
    CertificateIssued,
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EntryKind::ApprovalDecision => "approval_decision",
            EntryKind::BindingActivated => "binding_activated",
            EntryKind::BindingViolation => "binding_violation",
            EntryKind::BindingStatusChanged => "binding_status_changed",
            EntryKind::BundleExported => "bundle_exported",
            EntryKind::CertificateIssued => "certificate_issued",
        };
        write!(f, "{name}")
    }
}

impl std::str::FromStr for EntryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approval_decision" => Ok(EntryKind::ApprovalDecision),
            "binding_activated" => Ok(EntryKind::BindingActivated),
            "binding_violation" => Ok(EntryKind::BindingViolation),
            "binding_status_changed" => Ok(EntryKind::BindingStatusChanged),
            "bundle_exported" => Ok(EntryKind::BundleExported),
            "certificate_issued" => Ok(EntryKind::CertificateIssued),
            other => Err(format!("unknown entry kind: {other}")),
        }
    }
}

/// One immutable, hash-chained record of a governed action.
///
/// Invariants, maintained by the ledger store at append time:
/// - `entry_hash = H(sequence ‖ prev_hash ‖ payload_hash)` with a versioned
///   domain prefix;
/// - `prev_hash` equals the previous entry's `entry_hash`, or the zero hash
///   for sequence 0;
/// - `payload_hash` is the hash of the canonical payload bytes.
///
/// The payload itself travels with the entry so exported bundles can be
/// verified without access to the live store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub tenant_id: TenantId,
    pub sequence: u64,
    pub entry_hash: ContentHash,
    pub prev_hash: ContentHash,
    pub payload_hash: ContentHash,
    /// Opaque reference to the governed object (approval id, binding id, ...).
    pub payload_ref: String,
    pub kind: EntryKind,
    pub payload: Value,
    pub recorded_at: DateTime<Utc>,
}
