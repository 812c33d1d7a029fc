//! Vera Bundle - proof bundle construction and verification.
//!
//! The builder packages a selection of ledger entries into an immutable,
//! signed bundle whose root hash commits to every entry hash in ledger
//! order. The verifier replays all integrity checks against the bundle
//! document alone, so an auditor who does not trust the live database can
//! still establish whether the chain was tampered with.

#![deny(unsafe_code)]

mod builder;
mod certificate;
mod error;
mod verifier;

pub use builder::BundleBuilder;
pub use certificate::{CertificateIssuer, VerificationCertificate};
pub use error::BundleError;
pub use verifier::{BundleVerifier, FailureReason, VerificationResult, VerificationWarning};
