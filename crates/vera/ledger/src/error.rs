use thiserror::Error;
use vera_types::TenantId;

/// Ledger-store errors.
///
/// Every variant carries enough structured context (tenant, expected vs.
/// actual sequence) for audit review; a caller never has to re-derive what
/// failed from a message string.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The caller's assumed tail did not match the current tail. Retryable
    /// after a re-read.
    #[error("concurrency conflict for tenant {tenant_id}: expected tail {expected:?}, actual {actual:?}")]
    ConcurrencyConflict {
        tenant_id: TenantId,
        expected: Option<u64>,
        actual: Option<u64>,
    },

    /// A read range exceeded the stored tail.
    #[error("range [{from_seq}, {to_seq}] not found for tenant {tenant_id} (tail: {tail:?})")]
    NotFound {
        tenant_id: TenantId,
        from_seq: u64,
        to_seq: u64,
        tail: Option<u64>,
    },

    #[error("invalid range: from {from_seq} exceeds to {to_seq}")]
    InvalidRange { from_seq: u64, to_seq: u64 },

    /// A stored entry failed rehashing or chain linkage during self-check.
    #[error("chain corrupted for tenant {tenant_id} at sequence {sequence}: {detail}")]
    ChainCorrupted {
        tenant_id: TenantId,
        sequence: u64,
        detail: String,
    },

    #[error("payload serialization failed: {0}")]
    Serialization(String),

    /// Transient persistence failure. Retryable by the caller with backoff.
    #[error("storage failure: {0}")]
    StorageFailure(String),
}
