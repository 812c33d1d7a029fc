//! Vera Service - the composition root of the governance layer.
//!
//! Wires the ledger store, signature service, approval registry, binding
//! manager, and bundle builder/verifier into one facade with per-operation
//! timeouts. The CRUD/API layer above calls into this and nothing below it.

#![deny(unsafe_code)]

mod config;
mod error;
mod service;

pub use config::GovernanceConfig;
pub use error::GovernanceError;
pub use service::GovernanceService;
