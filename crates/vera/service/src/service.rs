use crate::config::GovernanceConfig;
use crate::error::GovernanceError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use vera_approvals::{ApprovalRegistry, CreateApprovalRequest, DecisionInput};
use vera_bindings::BindingManager;
use vera_bundle::{
    BundleBuilder, BundleVerifier, CertificateIssuer, VerificationCertificate, VerificationResult,
};
use vera_crypto::{SignatureError, SignatureService};
use vera_ledger::{LedgerError, LedgerStatistics, LedgerStore};
use vera_types::{
    Actor, Approval, ApprovalId, BindingId, BindingScope, BundleId, LedgerEntry,
    PolicyInstanceId, ProofBundle, ProofBundleDocument, RuntimeBinding, SignerKeyId, TenantId,
};

/// The governance layer behind the API boundary.
///
/// Every inbound operation carries an already-authenticated actor where
/// authorization matters. Ledger appends and signing calls run under the
/// configured timeouts; a timeout surfaces as `StorageFailure` or
/// `SigningFailure`, never as silent partial state.
pub struct GovernanceService {
    config: GovernanceConfig,
    ledger: Arc<dyn LedgerStore>,
    approvals: Arc<ApprovalRegistry>,
    bindings: Arc<BindingManager>,
    bundles: Arc<BundleBuilder>,
    verifier: BundleVerifier,
    certificates: CertificateIssuer,
}

impl GovernanceService {
    pub fn new(
        config: GovernanceConfig,
        ledger: Arc<dyn LedgerStore>,
        signer: Arc<SignatureService>,
    ) -> Self {
        let approvals = Arc::new(ApprovalRegistry::new(
            Arc::clone(&ledger),
            Arc::clone(&signer),
        ));
        let bindings = Arc::new(BindingManager::new(
            Arc::clone(&approvals),
            Arc::clone(&ledger),
            config.auto_suspend_threshold,
        ));
        let bundles = Arc::new(BundleBuilder::new(
            Arc::clone(&ledger),
            Arc::clone(&signer),
        ));
        let certificates = CertificateIssuer::new(Arc::clone(&ledger), Arc::clone(&signer));
        info!(
            auto_suspend_threshold = ?config.auto_suspend_threshold,
            live_cross_check = config.live_cross_check,
            "governance service initialized"
        );
        Self {
            config,
            ledger,
            approvals,
            bindings,
            bundles,
            verifier: BundleVerifier::new(),
            certificates,
        }
    }

    /// Open a review gate over a governed object.
    pub async fn create_approval(&self, request: CreateApprovalRequest) -> Approval {
        self.approvals.create(request).await
    }

    pub async fn get_approval(&self, id: &ApprovalId) -> Result<Approval, GovernanceError> {
        Ok(self.approvals.get(id).await?)
    }

    /// Record a signed terminal decision for an approval.
    pub async fn submit_approval_decision(
        &self,
        approval_id: &ApprovalId,
        actor: &Actor,
        input: DecisionInput,
    ) -> Result<Approval, GovernanceError> {
        Ok(signing_deadline(
            self.config.signing_timeout,
            self.approvals.submit_decision(approval_id, actor, input),
        )
        .await?)
    }

    /// Open a correcting approval for an already-decided one.
    pub async fn create_correction(
        &self,
        prior_id: &ApprovalId,
        stage: impl Into<String>,
        required_roles: std::collections::BTreeSet<vera_types::Role>,
    ) -> Result<Approval, GovernanceError> {
        Ok(self
            .approvals
            .create_correction(prior_id, stage, required_roles)
            .await?)
    }

    /// Activate an approved policy instance against a scope.
    pub async fn activate_runtime_binding(
        &self,
        policy_instance_id: PolicyInstanceId,
        scope: BindingScope,
        enterprise_id: TenantId,
    ) -> Result<RuntimeBinding, GovernanceError> {
        Ok(append_deadline(
            self.config.append_timeout,
            self.bindings.activate(policy_instance_id, scope, enterprise_id),
        )
        .await?)
    }

    /// Record one violation; may auto-suspend at the configured threshold.
    pub async fn record_violation(
        &self,
        binding_id: &BindingId,
    ) -> Result<RuntimeBinding, GovernanceError> {
        Ok(append_deadline(
            self.config.append_timeout,
            self.bindings.record_violation(binding_id),
        )
        .await?)
    }

    pub async fn suspend_binding(
        &self,
        binding_id: &BindingId,
        actor: &Actor,
    ) -> Result<RuntimeBinding, GovernanceError> {
        Ok(self.bindings.suspend(binding_id, actor).await?)
    }

    pub async fn reactivate_binding(
        &self,
        binding_id: &BindingId,
        actor: &Actor,
    ) -> Result<RuntimeBinding, GovernanceError> {
        Ok(self.bindings.reactivate(binding_id, actor).await?)
    }

    pub async fn deprecate_binding(
        &self,
        binding_id: &BindingId,
    ) -> Result<RuntimeBinding, GovernanceError> {
        Ok(self.bindings.deprecate(binding_id).await?)
    }

    pub async fn get_binding(&self, id: &BindingId) -> Result<RuntimeBinding, GovernanceError> {
        Ok(self.bindings.get(id).await?)
    }

    /// Build and sign a proof bundle over a contiguous sequence range.
    pub async fn export_proof_bundle(
        &self,
        tenant_id: &TenantId,
        from_seq: u64,
        to_seq: u64,
        signer_key_id: &SignerKeyId,
        actor: &Actor,
    ) -> Result<ProofBundle, GovernanceError> {
        let refs: Vec<u64> = (from_seq..=to_seq).collect();
        Ok(signing_deadline(
            self.config.signing_timeout,
            self.bundles.build(tenant_id, &refs, signer_key_id, &actor.id),
        )
        .await?)
    }

    /// Finish a bundle export interrupted by a signing or append failure.
    pub async fn reconcile_bundle(
        &self,
        bundle_id: &BundleId,
        actor: &Actor,
    ) -> Result<ProofBundle, GovernanceError> {
        Ok(signing_deadline(
            self.config.signing_timeout,
            self.bundles.reconcile(bundle_id, &actor.id),
        )
        .await?)
    }

    pub async fn get_bundle(&self, bundle_id: &BundleId) -> Result<ProofBundle, GovernanceError> {
        Ok(self.bundles.get(bundle_id).await?)
    }

    /// Portable document form of a bundle.
    pub async fn export_bundle_document(
        &self,
        bundle_id: &BundleId,
    ) -> Result<ProofBundleDocument, GovernanceError> {
        Ok(self.bundles.export_document(bundle_id).await?)
    }

    /// Run all verifier checks against a bundle.
    ///
    /// With `live_cross_check` enabled the live ledger is consulted as an
    /// advisory source; its findings go to warnings only.
    pub async fn verify_proof_bundle(&self, bundle: &ProofBundle) -> VerificationResult {
        let result = if self.config.live_cross_check {
            self.verifier.verify_against_ledger(bundle, &self.ledger).await
        } else {
            self.verifier.verify(bundle)
        };
        if !result.valid {
            warn!(
                bundle_id = %bundle.bundle_id,
                reasons = result.reasons.len(),
                "bundle failed verification"
            );
        }
        result
    }

    /// Verify many bundles in input order.
    pub fn verify_proof_bundles(&self, bundles: &[ProofBundle]) -> Vec<VerificationResult> {
        self.verifier.verify_batch(bundles)
    }

    /// Verify a bundle and, if it passes, issue a signed certificate.
    pub async fn certify_proof_bundle(
        &self,
        bundle: &ProofBundle,
        key_id: &SignerKeyId,
        actor: &Actor,
    ) -> Result<(VerificationResult, VerificationCertificate), GovernanceError> {
        let result = self.verify_proof_bundle(bundle).await;
        let certificate = self
            .certificates
            .issue(bundle, &result, key_id, &actor.id)
            .await?;
        Ok((result, certificate))
    }

    /// Re-derive every hash in a tenant's chain against the stored values.
    pub async fn verify_ledger_chain(&self, tenant_id: &TenantId) -> Result<u64, GovernanceError> {
        Ok(self.ledger.verify_chain(tenant_id).await?)
    }

    pub async fn read_ledger_range(
        &self,
        tenant_id: &TenantId,
        from_seq: u64,
        to_seq: u64,
    ) -> Result<Vec<LedgerEntry>, GovernanceError> {
        Ok(self.ledger.read_range(tenant_id, from_seq, to_seq).await?)
    }

    pub async fn ledger_statistics(
        &self,
        tenant_id: &TenantId,
    ) -> Result<LedgerStatistics, GovernanceError> {
        Ok(self.ledger.statistics(tenant_id).await?)
    }
}

/// Bound a signing operation; elapsed surfaces as `SigningFailure`.
async fn signing_deadline<T, E>(
    timeout: Duration,
    operation: impl Future<Output = Result<T, E>>,
) -> Result<T, E>
where
    E: From<SignatureError>,
{
    match tokio::time::timeout(timeout, operation).await {
        Ok(result) => result,
        Err(_) => Err(E::from(SignatureError::SigningFailure(format!(
            "signing operation exceeded {timeout:?}"
        )))),
    }
}

/// Bound an append-heavy operation; elapsed surfaces as `StorageFailure`.
async fn append_deadline<T, E>(
    timeout: Duration,
    operation: impl Future<Output = Result<T, E>>,
) -> Result<T, E>
where
    E: From<LedgerError>,
{
    match tokio::time::timeout(timeout, operation).await {
        Ok(result) => result,
        Err(_) => Err(E::from(LedgerError::StorageFailure(format!(
            "append operation exceeded {timeout:?}"
        )))),
    }
}
