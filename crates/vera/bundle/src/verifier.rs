use serde::{Deserialize, Serialize};
use std::sync::Arc;
use vera_crypto::SignatureService;
use vera_ledger::LedgerStore;
use vera_types::{ContentHash, ProofBundle, ProofBundleDocument, PROOF_BUNDLE_FORMAT_VERSION};

/// A specific integrity guarantee that failed.
///
/// Each variant carries enough context for an auditor to see which entry
/// broke and what was expected, without needing the live store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// An entry's recomputed hashes disagree with its captured values.
    HashMismatch {
        sequence: u64,
        expected: ContentHash,
        actual: ContentHash,
    },
    /// Adjacent entries do not link prev_hash to entry_hash.
    ChainBroken {
        sequence: u64,
        expected_prev: ContentHash,
        actual_prev: ContentHash,
    },
    /// The recomputed root hash disagrees with the bundle's.
    RootMismatch {
        expected: ContentHash,
        actual: ContentHash,
    },
    /// The signature does not verify over the root hash, or is missing.
    SignatureInvalid { detail: String },
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::HashMismatch {
                sequence,
                expected,
                actual,
            } => write!(
                f,
                "hash mismatch at sequence {sequence}: expected {expected}, recomputed {actual}"
            ),
            FailureReason::ChainBroken {
                sequence,
                expected_prev,
                actual_prev,
            } => write!(
                f,
                "chain broken at sequence {sequence}: prev_hash {actual_prev}, expected {expected_prev}"
            ),
            FailureReason::RootMismatch { expected, actual } => {
                write!(f, "root mismatch: expected {expected}, recomputed {actual}")
            }
            FailureReason::SignatureInvalid { detail } => {
                write!(f, "signature invalid: {detail}")
            }
        }
    }
}

/// Advisory findings from the optional live-ledger cross-check.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerificationWarning {
    /// A bundled entry could not be matched against the live ledger.
    EntryNotFoundInLedger { sequence: u64 },
}

/// Outcome of running all verifier checks against one bundle.
///
/// `valid` depends on `reasons` only; warnings from advisory checks never
/// flip validity.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerificationResult {
    pub valid: bool,
    pub reasons: Vec<FailureReason>,
    pub warnings: Vec<VerificationWarning>,
}

impl VerificationResult {
    fn from_reasons(reasons: Vec<FailureReason>) -> Self {
        Self {
            valid: reasons.is_empty(),
            reasons,
            warnings: Vec::new(),
        }
    }
}

/// Replays every integrity check against a bundle, offline.
///
/// Verification never mutates state and needs nothing beyond the bundle
/// itself: entries, root hash, signature, and the signer's public key are
/// all embedded. A live ledger, when available, adds an advisory
/// cross-check only.
#[derive(Default)]
pub struct BundleVerifier;

impl BundleVerifier {
    pub fn new() -> Self {
        Self
    }

    /// Run checks in order: entry hashes, chain links, root hash, signature.
    ///
    /// Every failed check is reported; nothing short-circuits, so an
    /// auditor sees the full damage picture in one pass.
    pub fn verify(&self, bundle: &ProofBundle) -> VerificationResult {
        let mut reasons = Vec::new();

        // (a) Per-entry hash recomputation. Payload bytes are rehashed too,
        // so a single flipped payload byte surfaces here. Recomputed hashes
        // feed the root check, which makes payload tampering cascade into
        // a root mismatch as well.
        let mut recomputed_hashes = Vec::with_capacity(bundle.entries.len());
        for entry in &bundle.entries {
            let recomputed_payload =
                vera_crypto::payload_hash(&entry.payload).unwrap_or(ContentHash::ZERO);
            let recomputed_entry =
                vera_crypto::entry_hash(entry.sequence, &entry.prev_hash, &recomputed_payload);
            if recomputed_payload != entry.payload_hash || recomputed_entry != entry.entry_hash {
                reasons.push(FailureReason::HashMismatch {
                    sequence: entry.sequence,
                    expected: entry.entry_hash,
                    actual: recomputed_entry,
                });
            }
            recomputed_hashes.push(recomputed_entry);
        }

        // (b) Chain walk. Only adjacent sequences can be linked; a sparse
        // selection has nothing to assert across its gaps.
        for pair in bundle.entries.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            if next.sequence == prev.sequence + 1 && next.prev_hash != prev.entry_hash {
                reasons.push(FailureReason::ChainBroken {
                    sequence: next.sequence,
                    expected_prev: prev.entry_hash,
                    actual_prev: next.prev_hash,
                });
            }
        }

        // (c) Root hash over recomputed entry hashes.
        let recomputed_root = vera_crypto::root_hash(recomputed_hashes.iter());
        if recomputed_root != bundle.root_hash {
            reasons.push(FailureReason::RootMismatch {
                expected: bundle.root_hash,
                actual: recomputed_root,
            });
        }

        // (d) Signature over the root hash, via the embedded public key.
        match &bundle.signature {
            None => reasons.push(FailureReason::SignatureInvalid {
                detail: "bundle is unsigned".to_string(),
            }),
            Some(record) => {
                let verified = SignatureService::verify_with_public_key(
                    &bundle.signer_public_key,
                    &bundle.root_hash,
                    &record.signature,
                );
                match verified {
                    Ok(true) => {}
                    Ok(false) => reasons.push(FailureReason::SignatureInvalid {
                        detail: "signature does not verify over root hash".to_string(),
                    }),
                    Err(e) => reasons.push(FailureReason::SignatureInvalid {
                        detail: e.to_string(),
                    }),
                }
            }
        }

        VerificationResult::from_reasons(reasons)
    }

    /// Offline checks plus the advisory live-ledger cross-check.
    ///
    /// A bundled entry that cannot be matched in the live ledger becomes a
    /// warning, never a failure: the offline guarantees stand on their own.
    pub async fn verify_against_ledger(
        &self,
        bundle: &ProofBundle,
        ledger: &Arc<dyn LedgerStore>,
    ) -> VerificationResult {
        let mut result = self.verify(bundle);

        for entry in &bundle.entries {
            let live = ledger
                .read_range(&bundle.tenant_id, entry.sequence, entry.sequence)
                .await;
            let matched = match live {
                Ok(entries) => entries
                    .first()
                    .is_some_and(|e| e.entry_hash == entry.entry_hash),
                Err(_) => false,
            };
            if !matched {
                result
                    .warnings
                    .push(VerificationWarning::EntryNotFoundInLedger {
                        sequence: entry.sequence,
                    });
            }
        }
        result
    }

    /// Verify a portable bundle document, checking the format tag first.
    pub fn verify_document(
        &self,
        document: &ProofBundleDocument,
    ) -> Result<VerificationResult, crate::error::BundleError> {
        if document.format_version != PROOF_BUNDLE_FORMAT_VERSION {
            return Err(crate::error::BundleError::UnsupportedFormat(
                document.format_version.clone(),
            ));
        }
        Ok(self.verify(&document.bundle))
    }

    /// Verify many bundles in one pass, in input order.
    pub fn verify_batch(&self, bundles: &[ProofBundle]) -> Vec<VerificationResult> {
        bundles.iter().map(|b| self.verify(b)).collect()
    }
}
