use crate::hash::ContentHash;
use crate::id::SignerKeyId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reference to signing key material (NOT the key itself).
///
/// The fingerprint is a hash of the public key, so a verifier can confirm
/// it is checking against the key the signer claimed to use.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRef {
    pub key_id: SignerKeyId,
    pub algorithm: String,
    pub fingerprint: ContentHash,
}

/// What a signature asserts, in the electronic-signature sense.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignatureMeaning {
    ApprovalDecision,
    BundleExport,
    CertificateIssued,
}

impl std::fmt::Display for SignatureMeaning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SignatureMeaning::ApprovalDecision => "approval_decision",
            SignatureMeaning::BundleExport => "bundle_export",
            SignatureMeaning::CertificateIssued => "certificate_issued",
        };
        write!(f, "{name}")
    }
}

/// The non-repudiation unit attached to approval decisions and bundles.
///
/// Signature bytes are always over a 32-byte canonical digest, never over a
/// JSON rendering of the signed object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureRecord {
    pub signer_identity: String,
    pub reauthenticated: bool,
    pub meaning: SignatureMeaning,
    pub signed_at: DateTime<Utc>,
    pub signature: Vec<u8>,
    pub key_ref: KeyRef,
}
