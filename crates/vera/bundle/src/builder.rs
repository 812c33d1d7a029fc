use crate::error::BundleError;
use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info};
use vera_crypto::SignatureService;
use vera_ledger::{AppendRequest, LedgerError, LedgerStore};
use vera_types::{
    BundleId, EntryKind, LedgerEntry, ProofBundle, ProofBundleDocument, SignatureMeaning,
    SignerKeyId, TenantId,
};

/// A stored bundle plus its export progress. Signing and recording the
/// `bundle_exported` ledger entry are separate steps, each of which can
/// fail independently; `reconcile` retries whichever step is missing.
struct StoredBundle {
    bundle: ProofBundle,
    export_recorded: bool,
}

/// Builds and stores proof bundles.
///
/// A bundle is persisted before it is signed. If the signing step fails,
/// the unsigned bundle stays put and `reconcile` retries the signature
/// over the same root hash; a signed bundle is never signed again. If the
/// export ledger entry fails to append after signing, the signature
/// stands and `reconcile` retries only the append. That keeps both the
/// signature and the export audit entry exactly-once across outages.
pub struct BundleBuilder {
    ledger: Arc<dyn LedgerStore>,
    signer: Arc<SignatureService>,
    bundles: RwLock<HashMap<BundleId, StoredBundle>>,
}

impl BundleBuilder {
    pub fn new(ledger: Arc<dyn LedgerStore>, signer: Arc<SignatureService>) -> Self {
        Self {
            ledger,
            signer,
            bundles: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, bundle_id: &BundleId) -> Result<ProofBundle, BundleError> {
        self.bundles
            .read()
            .await
            .get(bundle_id)
            .map(|stored| stored.bundle.clone())
            .ok_or_else(|| BundleError::NotFound(bundle_id.clone()))
    }

    /// Build a signed bundle over the referenced ledger sequences.
    ///
    /// Entries are re-fetched from the ledger; caller-supplied hashes are
    /// never trusted. The export itself is an auditable event: one ledger
    /// entry records who exported which range.
    pub async fn build(
        &self,
        tenant_id: &TenantId,
        entry_refs: &[u64],
        signer_key_id: &SignerKeyId,
        exported_by: &str,
    ) -> Result<ProofBundle, BundleError> {
        if entry_refs.is_empty() {
            return Err(BundleError::EmptySelection);
        }
        for pair in entry_refs.windows(2) {
            if pair[1] <= pair[0] {
                return Err(BundleError::OutOfOrder {
                    prev: pair[0],
                    next: pair[1],
                });
            }
        }

        let mut entries: Vec<LedgerEntry> = Vec::with_capacity(entry_refs.len());
        for &sequence in entry_refs {
            let mut fetched = self
                .ledger
                .read_range(tenant_id, sequence, sequence)
                .await
                .map_err(|e| match e {
                    LedgerError::NotFound { .. } => BundleError::MissingEntry {
                        tenant_id: tenant_id.clone(),
                        sequence,
                    },
                    other => BundleError::Ledger(other),
                })?;
            match fetched.pop() {
                Some(entry) => entries.push(entry),
                None => {
                    return Err(BundleError::MissingEntry {
                        tenant_id: tenant_id.clone(),
                        sequence,
                    })
                }
            }
        }

        let root_hash = vera_crypto::root_hash(entries.iter().map(|e| &e.entry_hash));
        let signer_public_key = self.signer.public_key_bytes(signer_key_id).await?;

        let bundle = ProofBundle {
            bundle_id: BundleId::generate(),
            tenant_id: tenant_id.clone(),
            entries,
            root_hash,
            signature: None,
            signer_key_id: signer_key_id.clone(),
            signer_public_key,
            created_at: Utc::now(),
        };

        // Persist unsigned first. A signing or append failure leaves this
        // record in place for `reconcile` instead of losing the export.
        let bundle_id = bundle.bundle_id.clone();
        self.bundles.write().await.insert(
            bundle_id.clone(),
            StoredBundle {
                bundle,
                export_recorded: false,
            },
        );

        match self.sign_and_record(&bundle_id, exported_by).await {
            Ok(signed) => Ok(signed),
            Err(e) => {
                error!(
                    bundle_id = %bundle_id,
                    error = %e,
                    "bundle export incomplete, reconcile to finish"
                );
                Err(e)
            }
        }
    }

    /// Finish an export interrupted partway: sign a bundle left unsigned
    /// by a signing failure, or append the missing `bundle_exported` entry
    /// for a bundle that was signed but whose append failed.
    ///
    /// Fails with `AlreadySigned` once both steps are done; the original
    /// signature always stands.
    pub async fn reconcile(
        &self,
        bundle_id: &BundleId,
        exported_by: &str,
    ) -> Result<ProofBundle, BundleError> {
        {
            let bundles = self.bundles.read().await;
            let stored = bundles
                .get(bundle_id)
                .ok_or_else(|| BundleError::NotFound(bundle_id.clone()))?;
            if stored.bundle.is_signed() && stored.export_recorded {
                return Err(BundleError::AlreadySigned(bundle_id.clone()));
            }
        }
        info!(bundle_id = %bundle_id, "reconciling incomplete bundle export");
        self.sign_and_record(bundle_id, exported_by).await
    }

    /// Portable document form of a signed bundle.
    pub async fn export_document(
        &self,
        bundle_id: &BundleId,
    ) -> Result<ProofBundleDocument, BundleError> {
        let bundle = self.get(bundle_id).await?;
        Ok(ProofBundleDocument::new(bundle))
    }

    async fn sign_and_record(
        &self,
        bundle_id: &BundleId,
        exported_by: &str,
    ) -> Result<ProofBundle, BundleError> {
        let bundle = self.get(bundle_id).await?;
        let signed = if bundle.is_signed() {
            bundle
        } else {
            let signature = self
                .signer
                .sign_record(
                    &bundle.signer_key_id,
                    &bundle.root_hash,
                    exported_by,
                    SignatureMeaning::BundleExport,
                    false,
                )
                .await?;

            let mut bundles = self.bundles.write().await;
            let stored = bundles
                .get_mut(bundle_id)
                .ok_or_else(|| BundleError::NotFound(bundle_id.clone()))?;
            if stored.bundle.is_signed() {
                // A concurrent caller signed first; its signature stands.
                stored.bundle.clone()
            } else {
                stored.bundle.signature = Some(signature);
                stored.bundle.clone()
            }
        };

        let (from_seq, to_seq) = signed.sequence_range().unwrap_or((0, 0));
        {
            // Held across the append so the export entry lands at most once.
            let mut bundles = self.bundles.write().await;
            let stored = bundles
                .get_mut(bundle_id)
                .ok_or_else(|| BundleError::NotFound(bundle_id.clone()))?;
            if !stored.export_recorded {
                self.ledger
                    .append(
                        &signed.tenant_id,
                        AppendRequest::new(
                            EntryKind::BundleExported,
                            signed.bundle_id.as_str(),
                            json!({
                                "bundle_id": signed.bundle_id.as_str(),
                                "exported_by": exported_by,
                                "from_seq": from_seq,
                                "to_seq": to_seq,
                                "entry_count": signed.entries.len(),
                                "root_hash": signed.root_hash.to_hex(),
                            }),
                        ),
                    )
                    .await
                    .map_err(|e| BundleError::ExportNotRecorded {
                        bundle_id: signed.bundle_id.clone(),
                        detail: e.to_string(),
                    })?;
                stored.export_recorded = true;
            }
        }

        info!(
            bundle_id = %signed.bundle_id,
            tenant_id = %signed.tenant_id,
            from_seq,
            to_seq,
            "proof bundle exported"
        );
        Ok(signed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verifier::BundleVerifier;
    use vera_crypto::{InMemoryKeyStore, KeyStore, SignatureService};
    use vera_ledger::InMemoryLedger;

    struct Fixture {
        builder: BundleBuilder,
        ledger: Arc<InMemoryLedger>,
        tenant: TenantId,
        key_id: SignerKeyId,
    }

    fn fixture() -> Fixture {
        let keystore = InMemoryKeyStore::new();
        let key_id = SignerKeyId::new("export-key");
        keystore
            .provision_from_seed(key_id.clone(), &[3u8; 32])
            .unwrap();
        let ledger = Arc::new(InMemoryLedger::new());
        let builder = BundleBuilder::new(
            Arc::clone(&ledger) as Arc<dyn LedgerStore>,
            Arc::new(SignatureService::new(Arc::new(keystore))),
        );
        Fixture {
            builder,
            ledger,
            tenant: TenantId::new("acme"),
            key_id,
        }
    }

    async fn seed_entries(fx: &Fixture, count: u64) {
        for n in 0..count {
            fx.ledger
                .append(
                    &fx.tenant,
                    AppendRequest::new(
                        EntryKind::ApprovalDecision,
                        format!("approval-{n}"),
                        json!({"n": n}),
                    ),
                )
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn build_produces_signed_verifiable_bundle() {
        let fx = fixture();
        seed_entries(&fx, 3).await;

        let bundle = fx
            .builder
            .build(&fx.tenant, &[0, 1, 2], &fx.key_id, "user:auditor")
            .await
            .unwrap();

        assert!(bundle.is_signed());
        assert_eq!(bundle.entries.len(), 3);
        assert_eq!(
            bundle.root_hash,
            vera_crypto::root_hash(bundle.entries.iter().map(|e| &e.entry_hash))
        );

        let result = BundleVerifier::new().verify(&bundle);
        assert!(result.valid, "reasons: {:?}", result.reasons);
        assert!(result.reasons.is_empty());
    }

    #[tokio::test]
    async fn export_is_itself_a_ledger_entry() {
        let fx = fixture();
        seed_entries(&fx, 2).await;

        let bundle = fx
            .builder
            .build(&fx.tenant, &[0, 1], &fx.key_id, "user:auditor")
            .await
            .unwrap();

        let tail = fx.ledger.tail_sequence(&fx.tenant).await.unwrap().unwrap();
        assert_eq!(tail, 2);
        let entries = fx.ledger.read_range(&fx.tenant, 2, 2).await.unwrap();
        assert_eq!(entries[0].kind, EntryKind::BundleExported);
        assert_eq!(entries[0].payload_ref, bundle.bundle_id.as_str());
        assert_eq!(entries[0].payload["exported_by"], "user:auditor");
    }

    #[tokio::test]
    async fn selection_errors_are_terminal() {
        let fx = fixture();
        seed_entries(&fx, 3).await;

        assert!(matches!(
            fx.builder.build(&fx.tenant, &[], &fx.key_id, "u").await,
            Err(BundleError::EmptySelection)
        ));
        assert!(matches!(
            fx.builder.build(&fx.tenant, &[1, 0], &fx.key_id, "u").await,
            Err(BundleError::OutOfOrder { prev: 1, next: 0 })
        ));
        assert!(matches!(
            fx.builder.build(&fx.tenant, &[2, 2], &fx.key_id, "u").await,
            Err(BundleError::OutOfOrder { .. })
        ));
        assert!(matches!(
            fx.builder.build(&fx.tenant, &[0, 7], &fx.key_id, "u").await,
            Err(BundleError::MissingEntry { sequence: 7, .. })
        ));
    }

    #[tokio::test]
    async fn sparse_selection_is_allowed() {
        let fx = fixture();
        seed_entries(&fx, 5).await;

        let bundle = fx
            .builder
            .build(&fx.tenant, &[0, 2, 4], &fx.key_id, "user:auditor")
            .await
            .unwrap();
        assert_eq!(bundle.entries.len(), 3);
        assert_eq!(bundle.sequence_range(), Some((0, 4)));

        let result = BundleVerifier::new().verify(&bundle);
        assert!(result.valid, "reasons: {:?}", result.reasons);
    }

    /// Key store that refuses a configurable number of sign calls before
    /// recovering, for exercising the unsigned-bundle reconcile path.
    struct FlakyKeyStore {
        inner: InMemoryKeyStore,
        failures_left: std::sync::atomic::AtomicU32,
    }

    #[async_trait::async_trait]
    impl vera_crypto::KeyStore for FlakyKeyStore {
        async fn sign(
            &self,
            key_id: &SignerKeyId,
            digest: &vera_types::ContentHash,
        ) -> Result<Vec<u8>, vera_crypto::SignatureError> {
            use std::sync::atomic::Ordering;
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(vera_crypto::SignatureError::SigningFailure(
                    "backend unavailable".to_string(),
                ));
            }
            self.inner.sign(key_id, digest).await
        }

        async fn public_key(
            &self,
            key_id: &SignerKeyId,
        ) -> Result<ed25519_dalek::VerifyingKey, vera_crypto::SignatureError> {
            self.inner.public_key(key_id).await
        }
    }

    #[tokio::test]
    async fn signing_failure_leaves_unsigned_bundle_for_reconcile() {
        let inner = InMemoryKeyStore::new();
        let key_id = SignerKeyId::new("export-key");
        inner
            .provision_from_seed(key_id.clone(), &[3u8; 32])
            .unwrap();
        let flaky = FlakyKeyStore {
            inner,
            failures_left: std::sync::atomic::AtomicU32::new(1),
        };
        let ledger = Arc::new(InMemoryLedger::new());
        let builder = BundleBuilder::new(
            Arc::clone(&ledger) as Arc<dyn LedgerStore>,
            Arc::new(SignatureService::new(Arc::new(flaky))),
        );
        let tenant = TenantId::new("acme");
        ledger
            .append(
                &tenant,
                AppendRequest::new(EntryKind::ApprovalDecision, "approval-1", json!({"n": 1})),
            )
            .await
            .unwrap();

        let result = builder.build(&tenant, &[0], &key_id, "user:auditor").await;
        assert!(matches!(result, Err(BundleError::Signature(_))));

        // The unsigned bundle survived, and no export entry was written.
        let bundles = builder.bundles.read().await;
        let (bundle_id, stored) = bundles
            .iter()
            .next()
            .map(|(k, v)| (k.clone(), v.bundle.clone()))
            .unwrap();
        drop(bundles);
        assert!(!stored.is_signed());
        assert_eq!(ledger.tail_sequence(&tenant).await.unwrap(), Some(0));

        // Reconcile signs exactly once and records the export.
        let signed = builder.reconcile(&bundle_id, "user:auditor").await.unwrap();
        assert!(signed.is_signed());
        assert_eq!(ledger.tail_sequence(&tenant).await.unwrap(), Some(1));
        assert!(matches!(
            builder.reconcile(&bundle_id, "user:auditor").await,
            Err(BundleError::AlreadySigned(_))
        ));
    }

    /// Ledger that refuses a configurable number of export-entry appends
    /// before recovering, for exercising the unrecorded-export path.
    struct FlakyLedger {
        inner: InMemoryLedger,
        export_failures_left: std::sync::atomic::AtomicU32,
    }

    #[async_trait::async_trait]
    impl LedgerStore for FlakyLedger {
        async fn append(
            &self,
            tenant_id: &TenantId,
            request: AppendRequest,
        ) -> Result<LedgerEntry, LedgerError> {
            use std::sync::atomic::Ordering;
            if request.kind == EntryKind::BundleExported
                && self
                    .export_failures_left
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok()
            {
                return Err(LedgerError::StorageFailure(
                    "ledger unavailable".to_string(),
                ));
            }
            self.inner.append(tenant_id, request).await
        }

        async fn read_range(
            &self,
            tenant_id: &TenantId,
            from_seq: u64,
            to_seq: u64,
        ) -> Result<Vec<LedgerEntry>, LedgerError> {
            self.inner.read_range(tenant_id, from_seq, to_seq).await
        }

        async fn tail_sequence(&self, tenant_id: &TenantId) -> Result<Option<u64>, LedgerError> {
            self.inner.tail_sequence(tenant_id).await
        }

        async fn latest_entry_hash(
            &self,
            tenant_id: &TenantId,
        ) -> Result<Option<vera_types::ContentHash>, LedgerError> {
            self.inner.latest_entry_hash(tenant_id).await
        }

        async fn verify_chain(&self, tenant_id: &TenantId) -> Result<u64, LedgerError> {
            self.inner.verify_chain(tenant_id).await
        }

        async fn statistics(
            &self,
            tenant_id: &TenantId,
        ) -> Result<vera_ledger::LedgerStatistics, LedgerError> {
            self.inner.statistics(tenant_id).await
        }
    }

    #[tokio::test]
    async fn append_failure_after_signing_is_repaired_by_reconcile() {
        let keystore = InMemoryKeyStore::new();
        let key_id = SignerKeyId::new("export-key");
        keystore
            .provision_from_seed(key_id.clone(), &[3u8; 32])
            .unwrap();
        let ledger = Arc::new(FlakyLedger {
            inner: InMemoryLedger::new(),
            export_failures_left: std::sync::atomic::AtomicU32::new(1),
        });
        let builder = BundleBuilder::new(
            Arc::clone(&ledger) as Arc<dyn LedgerStore>,
            Arc::new(SignatureService::new(Arc::new(keystore))),
        );
        let tenant = TenantId::new("acme");
        ledger
            .append(
                &tenant,
                AppendRequest::new(EntryKind::ApprovalDecision, "approval-1", json!({"n": 1})),
            )
            .await
            .unwrap();

        // The append of the export entry fails after the bundle is signed;
        // the error names the bundle so the caller can reconcile it.
        let result = builder.build(&tenant, &[0], &key_id, "user:auditor").await;
        let bundle_id = match result {
            Err(BundleError::ExportNotRecorded { bundle_id, .. }) => bundle_id,
            other => panic!("expected ExportNotRecorded, got {other:?}"),
        };

        // The signature stands, but no export entry was written.
        let stored = builder.get(&bundle_id).await.unwrap();
        assert!(stored.is_signed());
        let signature = stored.signature.clone().unwrap().signature;
        assert_eq!(ledger.tail_sequence(&tenant).await.unwrap(), Some(0));

        // Reconcile appends the missing entry without re-signing.
        let repaired = builder.reconcile(&bundle_id, "user:auditor").await.unwrap();
        assert_eq!(repaired.signature.unwrap().signature, signature);
        let tail = ledger.tail_sequence(&tenant).await.unwrap().unwrap();
        assert_eq!(tail, 1);
        let entries = ledger.read_range(&tenant, 1, 1).await.unwrap();
        assert_eq!(entries[0].kind, EntryKind::BundleExported);

        // Once recorded, the export is closed for good.
        assert!(matches!(
            builder.reconcile(&bundle_id, "user:auditor").await,
            Err(BundleError::AlreadySigned(_))
        ));
        assert_eq!(ledger.tail_sequence(&tenant).await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn reconcile_refuses_to_resign() {
        let fx = fixture();
        seed_entries(&fx, 1).await;

        let bundle = fx
            .builder
            .build(&fx.tenant, &[0], &fx.key_id, "user:auditor")
            .await
            .unwrap();

        assert!(matches!(
            fx.builder.reconcile(&bundle.bundle_id, "user:auditor").await,
            Err(BundleError::AlreadySigned(_))
        ));
    }

    #[tokio::test]
    async fn unknown_signer_key_leaves_no_bundle_signed() {
        let fx = fixture();
        seed_entries(&fx, 1).await;

        let result = fx
            .builder
            .build(&fx.tenant, &[0], &SignerKeyId::new("missing"), "u")
            .await;
        assert!(matches!(result, Err(BundleError::Signature(_))));
    }

    #[tokio::test]
    async fn document_carries_format_version() {
        let fx = fixture();
        seed_entries(&fx, 1).await;

        let bundle = fx
            .builder
            .build(&fx.tenant, &[0], &fx.key_id, "user:auditor")
            .await
            .unwrap();
        let document = fx.builder.export_document(&bundle.bundle_id).await.unwrap();
        assert_eq!(
            document.format_version,
            vera_types::PROOF_BUNDLE_FORMAT_VERSION
        );
    }
}
