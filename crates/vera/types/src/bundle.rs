use crate::hash::ContentHash;
use crate::id::{BundleId, SignerKeyId, TenantId};
use crate::ledger::LedgerEntry;
use crate::signature::SignatureRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Format tag carried by exported bundle documents.
pub const PROOF_BUNDLE_FORMAT_VERSION: &str = "vera-proof-bundle-v1";

/// An exportable, signed set of ledger entries with a recomputable root hash.
///
/// Entries are embedded in full (including payloads) so an auditor can run
/// every integrity check offline. `signature` is `None` only in the window
/// between bundle persistence and a signing failure being reconciled; a
/// bundle is never re-signed once a signature exists.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProofBundle {
    pub bundle_id: BundleId,
    pub tenant_id: TenantId,
    /// In ledger order, strictly increasing by sequence.
    pub entries: Vec<LedgerEntry>,
    pub root_hash: ContentHash,
    pub signature: Option<SignatureRecord>,
    pub signer_key_id: SignerKeyId,
    /// Ed25519 public key bytes of the signer, embedded so offline
    /// verification needs no key store access.
    pub signer_public_key: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

impl ProofBundle {
    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }

    /// Bundled sequence range, if any entries are present.
    pub fn sequence_range(&self) -> Option<(u64, u64)> {
        let first = self.entries.first()?.sequence;
        let last = self.entries.last()?.sequence;
        Some((first, last))
    }
}

/// Portable document form of a bundle, e.g. for regulatory submission.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProofBundleDocument {
    pub format_version: String,
    pub bundle: ProofBundle,
    pub exported_at: DateTime<Utc>,
}

impl ProofBundleDocument {
    pub fn new(bundle: ProofBundle) -> Self {
        Self {
            format_version: PROOF_BUNDLE_FORMAT_VERSION.to_string(),
            bundle,
            exported_at: Utc::now(),
        }
    }
}
