//! Vera Types - shared data model for the policy governance ledger.
//!
//! Every record that crosses a component boundary lives here: ledger
//! entries, approvals, runtime bindings, proof bundles, and the signature
//! records that make decisions non-repudiable.

#![deny(unsafe_code)]

mod actor;
mod approval;
mod binding;
mod bundle;
mod hash;
mod id;
mod ledger;
mod signature;

pub use actor::{Actor, Role};
pub use approval::{Approval, Decision, DecisionRecord, ObjectKind};
pub use binding::{BindingScope, BindingStatus, RuntimeBinding};
pub use bundle::{ProofBundle, ProofBundleDocument, PROOF_BUNDLE_FORMAT_VERSION};
pub use hash::ContentHash;
pub use id::{
    ApprovalId, BindingId, BundleId, CertificateId, PartnerId, PolicyInstanceId, SignerKeyId,
    TenantId, WorkspaceId,
};
pub use ledger::{EntryKind, LedgerEntry};
pub use signature::{KeyRef, SignatureMeaning, SignatureRecord};
