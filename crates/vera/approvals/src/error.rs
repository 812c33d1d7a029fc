use thiserror::Error;
use vera_crypto::SignatureError;
use vera_ledger::LedgerError;
use vera_types::{ApprovalId, Role};

#[derive(Debug, Error)]
pub enum ApprovalError {
    #[error("approval not found: {0}")]
    NotFound(ApprovalId),

    #[error("actor '{actor}' with role {role} is not in the required role set for stage '{stage}'")]
    Forbidden {
        actor: String,
        role: Role,
        stage: String,
    },

    #[error("approval {0} already has a terminal decision")]
    AlreadyDecided(ApprovalId),

    #[error("invalid decision: {0}")]
    InvalidDecision(String),

    #[error("approval {0} has no terminal decision yet")]
    NotDecided(ApprovalId),

    #[error("actor '{actor}' has no signer key and cannot record a decision")]
    MissingSignerKey { actor: String },

    #[error("signature failure: {0}")]
    Signature(#[from] SignatureError),

    #[error("ledger failure: {0}")]
    Ledger(#[from] LedgerError),

    #[error("serialization failure: {0}")]
    Serialization(String),
}
