use thiserror::Error;
use vera_approvals::ApprovalError;
use vera_bindings::BindingError;
use vera_bundle::BundleError;
use vera_ledger::LedgerError;

#[derive(Debug, Error)]
pub enum GovernanceError {
    #[error(transparent)]
    Approval(#[from] ApprovalError),

    #[error(transparent)]
    Binding(#[from] BindingError),

    #[error(transparent)]
    Bundle(#[from] BundleError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}
