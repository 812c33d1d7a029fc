//! Vera Approvals - the review state machine over governed objects.
//!
//! An approval starts pending and moves through exactly one terminal
//! decision (approved, rejected, or conditional). Decisions carry an
//! electronic signature and land in the ledger atomically with the state
//! change; corrections never edit a decided approval in place, they create
//! a new approval that supersedes the old one.

#![deny(unsafe_code)]

mod error;
mod registry;

pub use error::ApprovalError;
pub use registry::{ApprovalRegistry, CreateApprovalRequest, DecisionInput};
