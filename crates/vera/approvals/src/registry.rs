use crate::error::ApprovalError;
use chrono::Utc;
use serde_json::json;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info};
use vera_crypto::SignatureService;
use vera_ledger::{AppendRequest, LedgerStore};
use vera_types::{
    Actor, Approval, ApprovalId, Decision, DecisionRecord, EntryKind, ObjectKind, Role,
    SignatureMeaning, TenantId,
};

/// Inputs for opening a new review gate.
#[derive(Clone, Debug)]
pub struct CreateApprovalRequest {
    pub tenant_id: TenantId,
    pub object_kind: ObjectKind,
    pub object_id: String,
    pub stage: String,
    pub required_roles: BTreeSet<Role>,
}

/// A reviewer's submitted verdict.
#[derive(Clone, Debug)]
pub struct DecisionInput {
    pub decision: Decision,
    pub rationale: Option<String>,
    pub conditions: Vec<String>,
    /// Whether the reviewer re-authenticated at signing time.
    pub reauthenticated: bool,
}

impl DecisionInput {
    pub fn new(decision: Decision) -> Self {
        Self {
            decision,
            rationale: None,
            conditions: Vec::new(),
            reauthenticated: false,
        }
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = Some(rationale.into());
        self
    }

    pub fn with_conditions(mut self, conditions: Vec<String>) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn reauthenticated(mut self) -> Self {
        self.reauthenticated = true;
        self
    }
}

/// Owns approval records and enforces their state machine.
///
/// Decisions are optimistic-locked: validation runs against a snapshot, the
/// signature is produced without holding any lock, and the final commit
/// re-checks that no other writer decided the approval in the meantime. The
/// losing writer gets `AlreadyDecided`.
pub struct ApprovalRegistry {
    approvals: RwLock<HashMap<ApprovalId, Approval>>,
    ledger: Arc<dyn LedgerStore>,
    signer: Arc<SignatureService>,
}

impl ApprovalRegistry {
    pub fn new(ledger: Arc<dyn LedgerStore>, signer: Arc<SignatureService>) -> Self {
        Self {
            approvals: RwLock::new(HashMap::new()),
            ledger,
            signer,
        }
    }

    /// Open a review gate in the pending state.
    pub async fn create(&self, request: CreateApprovalRequest) -> Approval {
        let approval = Approval {
            id: ApprovalId::generate(),
            tenant_id: request.tenant_id,
            object_kind: request.object_kind,
            object_id: request.object_id,
            stage: request.stage,
            required_roles: request.required_roles,
            decision: None,
            supersedes: None,
            created_at: Utc::now(),
        };
        self.approvals
            .write()
            .await
            .insert(approval.id.clone(), approval.clone());
        info!(
            approval_id = %approval.id,
            object_kind = %approval.object_kind,
            object_id = %approval.object_id,
            stage = %approval.stage,
            "approval created"
        );
        approval
    }

    pub async fn get(&self, id: &ApprovalId) -> Result<Approval, ApprovalError> {
        self.approvals
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| ApprovalError::NotFound(id.clone()))
    }

    /// Record the terminal decision for an approval.
    ///
    /// Gate order: role check, terminality, then decision shape. On success
    /// the approval carries a signed `DecisionRecord` and one ledger entry
    /// holds the full decision payload.
    pub async fn submit_decision(
        &self,
        approval_id: &ApprovalId,
        actor: &Actor,
        input: DecisionInput,
    ) -> Result<Approval, ApprovalError> {
        let snapshot = self.get(approval_id).await?;

        if !snapshot.required_roles.contains(&actor.role) {
            return Err(ApprovalError::Forbidden {
                actor: actor.id.clone(),
                role: actor.role,
                stage: snapshot.stage.clone(),
            });
        }
        if snapshot.is_decided() {
            return Err(ApprovalError::AlreadyDecided(approval_id.clone()));
        }
        if input.decision == Decision::Conditional && input.conditions.is_empty() {
            return Err(ApprovalError::InvalidDecision(
                "conditional decision requires a non-empty conditions list".to_string(),
            ));
        }

        let key_id = actor
            .signer_key_id
            .clone()
            .ok_or_else(|| ApprovalError::MissingSignerKey {
                actor: actor.id.clone(),
            })?;

        // Sign the decision content itself, not its eventual ledger entry:
        // the signature stands on its own even outside the chain.
        let decided_at = Utc::now();
        let signed_content = json!({
            "approval_id": snapshot.id.as_str(),
            "tenant_id": snapshot.tenant_id.as_str(),
            "object_kind": snapshot.object_kind.to_string(),
            "object_id": snapshot.object_id,
            "stage": snapshot.stage,
            "decision": input.decision.to_string(),
            "decided_by": actor.id,
            "decided_at": decided_at.to_rfc3339(),
            "rationale": input.rationale,
            "conditions": input.conditions,
        });
        let digest = vera_crypto::payload_hash(&signed_content)
            .map_err(|e| ApprovalError::Serialization(e.to_string()))?;
        let signature = self
            .signer
            .sign_record(
                &key_id,
                &digest,
                &actor.id,
                SignatureMeaning::ApprovalDecision,
                input.reauthenticated,
            )
            .await?;

        let record = DecisionRecord {
            decision: input.decision,
            decided_by: actor.id.clone(),
            decided_at,
            rationale: input.rationale,
            conditions: input.conditions,
            signature,
        };

        // Commit point. A competing writer that decided first wins.
        let decided = {
            let mut approvals = self.approvals.write().await;
            let stored = approvals
                .get_mut(approval_id)
                .ok_or_else(|| ApprovalError::NotFound(approval_id.clone()))?;
            if stored.is_decided() {
                return Err(ApprovalError::AlreadyDecided(approval_id.clone()));
            }
            stored.decision = Some(record.clone());
            stored.clone()
        };

        let payload = json!({
            "approval_id": decided.id.as_str(),
            "object_kind": decided.object_kind.to_string(),
            "object_id": decided.object_id,
            "stage": decided.stage,
            "supersedes": decided.supersedes.as_ref().map(|id| id.as_str().to_string()),
            "record": serde_json::to_value(&record)
                .map_err(|e| ApprovalError::Serialization(e.to_string()))?,
        });
        let append = AppendRequest::new(
            EntryKind::ApprovalDecision,
            decided.id.as_str(),
            payload,
        );
        if let Err(e) = self.ledger.append(&decided.tenant_id, append).await {
            // The decision is committed; the missing entry is surfaced to the
            // caller for reconciliation rather than rolled back.
            error!(
                approval_id = %decided.id,
                error = %e,
                "decision committed but ledger append failed"
            );
            return Err(e.into());
        }

        info!(
            approval_id = %decided.id,
            decision = %record.decision,
            decided_by = %record.decided_by,
            "approval decided"
        );
        Ok(decided)
    }

    /// Open a correcting approval for an already-decided one.
    ///
    /// The prior decision stays in place and in the ledger; the new approval
    /// carries a `supersedes` back-reference and goes through the normal
    /// decision flow.
    pub async fn create_correction(
        &self,
        prior_id: &ApprovalId,
        stage: impl Into<String>,
        required_roles: BTreeSet<Role>,
    ) -> Result<Approval, ApprovalError> {
        let prior = self.get(prior_id).await?;
        if !prior.is_decided() {
            return Err(ApprovalError::NotDecided(prior_id.clone()));
        }

        let correction = Approval {
            id: ApprovalId::generate(),
            tenant_id: prior.tenant_id,
            object_kind: prior.object_kind,
            object_id: prior.object_id,
            stage: stage.into(),
            required_roles,
            decision: None,
            supersedes: Some(prior_id.clone()),
            created_at: Utc::now(),
        };
        self.approvals
            .write()
            .await
            .insert(correction.id.clone(), correction.clone());
        info!(
            approval_id = %correction.id,
            supersedes = %prior_id,
            "correction approval created"
        );
        Ok(correction)
    }

    /// The authoritative decision for a governed object, if any.
    ///
    /// A decision superseded by a later decided correction is no longer
    /// authoritative. Among the remaining decided approvals the most recent
    /// one wins.
    pub async fn latest_decision_for(
        &self,
        object_kind: ObjectKind,
        object_id: &str,
    ) -> Option<(ApprovalId, DecisionRecord)> {
        let approvals = self.approvals.read().await;

        let superseded: std::collections::HashSet<&ApprovalId> = approvals
            .values()
            .filter(|a| a.is_decided())
            .filter_map(|a| a.supersedes.as_ref())
            .collect();

        approvals
            .values()
            .filter(|a| a.object_kind == object_kind && a.object_id == object_id)
            .filter(|a| !superseded.contains(&a.id))
            .filter_map(|a| a.decision.as_ref().map(|d| (a, d)))
            .max_by_key(|(_, d)| d.decided_at)
            .map(|(a, d)| (a.id.clone(), d.clone()))
    }
}
