use thiserror::Error;
use vera_ledger::LedgerError;
use vera_types::{BindingId, BindingStatus, PolicyInstanceId, Role};

#[derive(Debug, Error)]
pub enum BindingError {
    #[error("binding not found: {0}")]
    NotFound(BindingId),

    #[error("no approved decision exists for policy instance {0}")]
    ApprovalRequired(PolicyInstanceId),

    #[error("binding {binding_id} cannot {action} while {status}")]
    InvalidTransition {
        binding_id: BindingId,
        status: BindingStatus,
        action: &'static str,
    },

    #[error("actor '{actor}' with role {role} may not drive operator transitions")]
    Forbidden { actor: String, role: Role },

    #[error("ledger failure: {0}")]
    Ledger(#[from] LedgerError),
}
