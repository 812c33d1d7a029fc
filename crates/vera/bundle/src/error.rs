use thiserror::Error;
use vera_crypto::SignatureError;
use vera_ledger::LedgerError;
use vera_types::{BundleId, TenantId};

#[derive(Debug, Error)]
pub enum BundleError {
    #[error("bundle selection is empty")]
    EmptySelection,

    #[error("entry refs not strictly increasing: {prev} then {next}")]
    OutOfOrder { prev: u64, next: u64 },

    #[error("entry {sequence} for tenant {tenant_id} is not in the ledger")]
    MissingEntry { tenant_id: TenantId, sequence: u64 },

    #[error("bundle not found: {0}")]
    NotFound(BundleId),

    #[error("bundle {0} is already signed and its export is recorded")]
    AlreadySigned(BundleId),

    #[error("bundle {bundle_id} is signed but its export entry was not recorded: {detail}")]
    ExportNotRecorded { bundle_id: BundleId, detail: String },

    #[error("cannot certify bundle {0}: verification failed")]
    NotVerified(BundleId),

    #[error("unsupported bundle format: {0}")]
    UnsupportedFormat(String),

    #[error("signature failure: {0}")]
    Signature(#[from] SignatureError),

    #[error("ledger failure: {0}")]
    Ledger(#[from] LedgerError),

    #[error("serialization failure: {0}")]
    Serialization(String),
}
