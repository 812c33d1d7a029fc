use crate::error::LedgerError;
use crate::model::{AppendRequest, LedgerStatistics};
use async_trait::async_trait;
use vera_types::{ContentHash, LedgerEntry, TenantId};

/// Storage contract for the append-only governance ledger.
///
/// Guarantees every implementation must hold:
/// - `append` is atomic per tenant: no two entries ever claim the same
///   sequence, and the entry hash is computed inside the same critical
///   section as sequence assignment;
/// - appends for distinct tenants proceed independently;
/// - entries are immutable once written.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Append one entry to a tenant's chain.
    async fn append(
        &self,
        tenant_id: &TenantId,
        request: AppendRequest,
    ) -> Result<LedgerEntry, LedgerError>;

    /// Read an inclusive sequence range, in ledger order.
    async fn read_range(
        &self,
        tenant_id: &TenantId,
        from_seq: u64,
        to_seq: u64,
    ) -> Result<Vec<LedgerEntry>, LedgerError>;

    /// Sequence of the last entry, or `None` for an empty chain.
    async fn tail_sequence(&self, tenant_id: &TenantId) -> Result<Option<u64>, LedgerError>;

    /// Hash of the last entry, or `None` for an empty chain.
    async fn latest_entry_hash(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Option<ContentHash>, LedgerError>;

    /// Re-hash and re-link the whole chain. Returns the number of entries
    /// checked; fails with `ChainCorrupted` at the first bad entry.
    async fn verify_chain(&self, tenant_id: &TenantId) -> Result<u64, LedgerError>;

    /// Entry counts per kind for a tenant.
    async fn statistics(&self, tenant_id: &TenantId) -> Result<LedgerStatistics, LedgerError>;
}
