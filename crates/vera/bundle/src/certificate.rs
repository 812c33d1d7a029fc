use crate::error::BundleError;
use crate::verifier::VerificationResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use vera_crypto::SignatureService;
use vera_ledger::{AppendRequest, LedgerStore};
use vera_types::{
    BundleId, CertificateId, ContentHash, EntryKind, ProofBundle, SignatureMeaning, SignatureRecord,
    SignerKeyId, TenantId,
};

/// A signed attestation that a bundle passed every verifier check.
///
/// Issued only against a valid verification result, and recorded in the
/// ledger like any other governed action.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerificationCertificate {
    pub certificate_id: CertificateId,
    pub bundle_id: BundleId,
    pub tenant_id: TenantId,
    pub root_hash: ContentHash,
    pub entry_count: u64,
    pub verified_at: DateTime<Utc>,
    pub issued_by: String,
    pub signature: SignatureRecord,
}

/// Issues certificates for bundles that verified cleanly.
pub struct CertificateIssuer {
    ledger: Arc<dyn LedgerStore>,
    signer: Arc<SignatureService>,
}

impl CertificateIssuer {
    pub fn new(ledger: Arc<dyn LedgerStore>, signer: Arc<SignatureService>) -> Self {
        Self { ledger, signer }
    }

    /// Issue a certificate for a bundle and its verification result.
    ///
    /// Fails with `NotVerified` if the result carries any failure reason;
    /// advisory warnings do not block issuance.
    pub async fn issue(
        &self,
        bundle: &ProofBundle,
        result: &VerificationResult,
        key_id: &SignerKeyId,
        issued_by: &str,
    ) -> Result<VerificationCertificate, BundleError> {
        if !result.valid {
            return Err(BundleError::NotVerified(bundle.bundle_id.clone()));
        }

        let certificate_id = CertificateId::generate();
        let verified_at = Utc::now();
        let signed_content = json!({
            "certificate_id": certificate_id.as_str(),
            "bundle_id": bundle.bundle_id.as_str(),
            "tenant_id": bundle.tenant_id.as_str(),
            "root_hash": bundle.root_hash.to_hex(),
            "entry_count": bundle.entries.len(),
            "verified_at": verified_at.to_rfc3339(),
            "issued_by": issued_by,
        });
        let digest = vera_crypto::payload_hash(&signed_content)
            .map_err(|e| BundleError::Serialization(e.to_string()))?;
        let signature = self
            .signer
            .sign_record(
                key_id,
                &digest,
                issued_by,
                SignatureMeaning::CertificateIssued,
                false,
            )
            .await?;

        let certificate = VerificationCertificate {
            certificate_id,
            bundle_id: bundle.bundle_id.clone(),
            tenant_id: bundle.tenant_id.clone(),
            root_hash: bundle.root_hash,
            entry_count: bundle.entries.len() as u64,
            verified_at,
            issued_by: issued_by.to_string(),
            signature,
        };

        self.ledger
            .append(
                &certificate.tenant_id,
                AppendRequest::new(
                    EntryKind::CertificateIssued,
                    certificate.certificate_id.as_str(),
                    json!({
                        "certificate_id": certificate.certificate_id.as_str(),
                        "bundle_id": certificate.bundle_id.as_str(),
                        "root_hash": certificate.root_hash.to_hex(),
                        "issued_by": issued_by,
                    }),
                ),
            )
            .await?;

        info!(
            certificate_id = %certificate.certificate_id,
            bundle_id = %certificate.bundle_id,
            "verification certificate issued"
        );
        Ok(certificate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::BundleBuilder;
    use crate::verifier::{BundleVerifier, FailureReason};
    use vera_crypto::InMemoryKeyStore;
    use vera_ledger::InMemoryLedger;

    async fn signed_bundle() -> (Arc<InMemoryLedger>, Arc<SignatureService>, ProofBundle, SignerKeyId)
    {
        let keystore = InMemoryKeyStore::new();
        let key_id = SignerKeyId::new("auditor-key");
        keystore
            .provision_from_seed(key_id.clone(), &[4u8; 32])
            .unwrap();
        let ledger = Arc::new(InMemoryLedger::new());
        let signer = Arc::new(SignatureService::new(Arc::new(keystore)));
        let tenant = TenantId::new("acme");

        ledger
            .append(
                &tenant,
                AppendRequest::new(EntryKind::ApprovalDecision, "approval-1", json!({"n": 1})),
            )
            .await
            .unwrap();
        let builder = BundleBuilder::new(
            Arc::clone(&ledger) as Arc<dyn LedgerStore>,
            Arc::clone(&signer),
        );
        let bundle = builder
            .build(&tenant, &[0], &key_id, "user:auditor")
            .await
            .unwrap();
        (ledger, signer, bundle, key_id)
    }

    #[tokio::test]
    async fn valid_bundle_gets_certificate_and_ledger_entry() {
        let (ledger, signer, bundle, key_id) = signed_bundle().await;
        let issuer = CertificateIssuer::new(
            Arc::clone(&ledger) as Arc<dyn LedgerStore>,
            Arc::clone(&signer),
        );

        let result = BundleVerifier::new().verify(&bundle);
        let certificate = issuer
            .issue(&bundle, &result, &key_id, "user:auditor")
            .await
            .unwrap();

        assert_eq!(certificate.bundle_id, bundle.bundle_id);
        assert_eq!(certificate.root_hash, bundle.root_hash);
        assert_eq!(
            certificate.signature.meaning,
            SignatureMeaning::CertificateIssued
        );

        let tail = ledger.tail_sequence(&bundle.tenant_id).await.unwrap().unwrap();
        let entries = ledger
            .read_range(&bundle.tenant_id, tail, tail)
            .await
            .unwrap();
        assert_eq!(entries[0].kind, EntryKind::CertificateIssued);
    }

    #[tokio::test]
    async fn failed_verification_blocks_issuance() {
        let (ledger, signer, mut bundle, key_id) = signed_bundle().await;
        let issuer = CertificateIssuer::new(
            Arc::clone(&ledger) as Arc<dyn LedgerStore>,
            Arc::clone(&signer),
        );

        bundle.entries[0].payload = json!({"tampered": true});
        let result = BundleVerifier::new().verify(&bundle);
        assert!(result
            .reasons
            .iter()
            .any(|r| matches!(r, FailureReason::HashMismatch { .. })));

        let tail_before = ledger.tail_sequence(&bundle.tenant_id).await.unwrap();
        assert!(matches!(
            issuer.issue(&bundle, &result, &key_id, "user:auditor").await,
            Err(BundleError::NotVerified(_))
        ));
        assert_eq!(
            ledger.tail_sequence(&bundle.tenant_id).await.unwrap(),
            tail_before
        );
    }
}
