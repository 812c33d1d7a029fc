use crate::error::BindingError;
use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use vera_approvals::ApprovalRegistry;
use vera_ledger::{AppendRequest, LedgerStore};
use vera_types::{
    Actor, BindingId, BindingScope, BindingStatus, Decision, EntryKind, ObjectKind,
    PolicyInstanceId, RuntimeBinding, TenantId,
};

/// Owns runtime bindings and enforces their lifecycle.
///
/// Transitions are compare-and-swap on the binding's current status under
/// the write lock; losing writers fail with `InvalidTransition` instead of
/// silently overwriting.
pub struct BindingManager {
    bindings: RwLock<HashMap<BindingId, RuntimeBinding>>,
    approvals: Arc<ApprovalRegistry>,
    ledger: Arc<dyn LedgerStore>,
    /// When set, crossing this violation count suspends the binding
    /// automatically. `None` disables auto-suspend.
    auto_suspend_threshold: Option<u32>,
}

impl BindingManager {
    pub fn new(
        approvals: Arc<ApprovalRegistry>,
        ledger: Arc<dyn LedgerStore>,
        auto_suspend_threshold: Option<u32>,
    ) -> Self {
        Self {
            bindings: RwLock::new(HashMap::new()),
            approvals,
            ledger,
            auto_suspend_threshold,
        }
    }

    pub async fn get(&self, id: &BindingId) -> Result<RuntimeBinding, BindingError> {
        self.bindings
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| BindingError::NotFound(id.clone()))
    }

    /// Activate an approved policy instance against a scope.
    ///
    /// Requires an authoritative `approved` decision for the policy
    /// instance; a rejected, conditional, or missing decision fails with
    /// `ApprovalRequired`.
    pub async fn activate(
        &self,
        policy_instance_id: PolicyInstanceId,
        scope: BindingScope,
        enterprise_id: TenantId,
    ) -> Result<RuntimeBinding, BindingError> {
        let decision = self
            .approvals
            .latest_decision_for(ObjectKind::PolicyInstance, policy_instance_id.as_str())
            .await;
        let (approval_id, record) = match decision {
            Some((id, record)) if record.decision == Decision::Approved => (id, record),
            _ => return Err(BindingError::ApprovalRequired(policy_instance_id)),
        };

        let binding = RuntimeBinding {
            id: BindingId::generate(),
            policy_instance_id,
            scope,
            enterprise_id,
            status: BindingStatus::Active,
            approval_id: approval_id.clone(),
            activated_at: Utc::now(),
            deactivated_at: None,
            last_verified_at: None,
            violation_count: 0,
        };
        self.bindings
            .write()
            .await
            .insert(binding.id.clone(), binding.clone());

        self.ledger
            .append(
                &binding.enterprise_id,
                AppendRequest::new(
                    EntryKind::BindingActivated,
                    binding.id.as_str(),
                    json!({
                        "binding_id": binding.id.as_str(),
                        "policy_instance_id": binding.policy_instance_id.as_str(),
                        "scope": binding.scope.to_string(),
                        "approval_id": approval_id.as_str(),
                        "decided_by": record.decided_by,
                        "activated_at": binding.activated_at.to_rfc3339(),
                    }),
                ),
            )
            .await?;

        info!(
            binding_id = %binding.id,
            policy_instance_id = %binding.policy_instance_id,
            scope = %binding.scope,
            "runtime binding activated"
        );
        Ok(binding)
    }

    /// Record one policy violation against an active binding.
    ///
    /// Crossing the auto-suspend threshold (when configured) suspends the
    /// binding in the same call and writes a second ledger entry for the
    /// status change. The threshold fires exactly once because the count
    /// only ever equals it on the crossing increment.
    pub async fn record_violation(
        &self,
        binding_id: &BindingId,
    ) -> Result<RuntimeBinding, BindingError> {
        let (binding, auto_suspended) = {
            let mut bindings = self.bindings.write().await;
            let stored = bindings
                .get_mut(binding_id)
                .ok_or_else(|| BindingError::NotFound(binding_id.clone()))?;
            if stored.status != BindingStatus::Active {
                return Err(BindingError::InvalidTransition {
                    binding_id: binding_id.clone(),
                    status: stored.status,
                    action: "record a violation",
                });
            }
            stored.violation_count += 1;
            let crossed = self
                .auto_suspend_threshold
                .is_some_and(|t| stored.violation_count == t);
            if crossed {
                stored.status = BindingStatus::Suspended;
            }
            (stored.clone(), crossed)
        };

        self.ledger
            .append(
                &binding.enterprise_id,
                AppendRequest::new(
                    EntryKind::BindingViolation,
                    binding.id.as_str(),
                    json!({
                        "binding_id": binding.id.as_str(),
                        "policy_instance_id": binding.policy_instance_id.as_str(),
                        "violation_count": binding.violation_count,
                    }),
                ),
            )
            .await?;

        if auto_suspended {
            warn!(
                binding_id = %binding.id,
                violation_count = binding.violation_count,
                "violation threshold crossed, binding auto-suspended"
            );
            self.append_status_change(&binding, "auto_suspend").await?;
        }
        Ok(binding)
    }

    /// Operator-driven suspension. Administrative roles only.
    pub async fn suspend(
        &self,
        binding_id: &BindingId,
        actor: &Actor,
    ) -> Result<RuntimeBinding, BindingError> {
        self.operator_transition(
            binding_id,
            actor,
            BindingStatus::Active,
            BindingStatus::Suspended,
            "suspend",
        )
        .await
    }

    /// Operator-driven reactivation of a suspended binding.
    pub async fn reactivate(
        &self,
        binding_id: &BindingId,
        actor: &Actor,
    ) -> Result<RuntimeBinding, BindingError> {
        self.operator_transition(
            binding_id,
            actor,
            BindingStatus::Suspended,
            BindingStatus::Active,
            "reactivate",
        )
        .await
    }

    /// Retire a binding. Terminal; a deprecated binding never comes back.
    pub async fn deprecate(&self, binding_id: &BindingId) -> Result<RuntimeBinding, BindingError> {
        let binding = {
            let mut bindings = self.bindings.write().await;
            let stored = bindings
                .get_mut(binding_id)
                .ok_or_else(|| BindingError::NotFound(binding_id.clone()))?;
            if stored.status == BindingStatus::Deprecated {
                return Err(BindingError::InvalidTransition {
                    binding_id: binding_id.clone(),
                    status: stored.status,
                    action: "deprecate",
                });
            }
            stored.status = BindingStatus::Deprecated;
            stored.deactivated_at = Some(Utc::now());
            stored.clone()
        };

        self.append_status_change(&binding, "deprecate").await?;
        info!(binding_id = %binding.id, "runtime binding deprecated");
        Ok(binding)
    }

    /// Record a successful health check against the binding.
    pub async fn mark_verified(&self, binding_id: &BindingId) -> Result<RuntimeBinding, BindingError> {
        let mut bindings = self.bindings.write().await;
        let stored = bindings
            .get_mut(binding_id)
            .ok_or_else(|| BindingError::NotFound(binding_id.clone()))?;
        stored.last_verified_at = Some(Utc::now());
        Ok(stored.clone())
    }

    async fn operator_transition(
        &self,
        binding_id: &BindingId,
        actor: &Actor,
        from: BindingStatus,
        to: BindingStatus,
        action: &'static str,
    ) -> Result<RuntimeBinding, BindingError> {
        if !actor.role.is_administrative() {
            return Err(BindingError::Forbidden {
                actor: actor.id.clone(),
                role: actor.role,
            });
        }

        let binding = {
            let mut bindings = self.bindings.write().await;
            let stored = bindings
                .get_mut(binding_id)
                .ok_or_else(|| BindingError::NotFound(binding_id.clone()))?;
            if stored.status != from {
                return Err(BindingError::InvalidTransition {
                    binding_id: binding_id.clone(),
                    status: stored.status,
                    action,
                });
            }
            stored.status = to;
            stored.clone()
        };

        self.append_status_change(&binding, action).await?;
        info!(
            binding_id = %binding.id,
            actor = %actor.id,
            status = %binding.status,
            "operator transition applied"
        );
        Ok(binding)
    }

    async fn append_status_change(
        &self,
        binding: &RuntimeBinding,
        cause: &str,
    ) -> Result<(), BindingError> {
        self.ledger
            .append(
                &binding.enterprise_id,
                AppendRequest::new(
                    EntryKind::BindingStatusChanged,
                    binding.id.as_str(),
                    json!({
                        "binding_id": binding.id.as_str(),
                        "policy_instance_id": binding.policy_instance_id.as_str(),
                        "status": binding.status.to_string(),
                        "cause": cause,
                        "violation_count": binding.violation_count,
                    }),
                ),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use vera_approvals::{CreateApprovalRequest, DecisionInput};
    use vera_crypto::{InMemoryKeyStore, SignatureService};
    use vera_ledger::InMemoryLedger;
    use vera_types::{Role, SignerKeyId, WorkspaceId};

    struct Fixture {
        manager: BindingManager,
        approvals: Arc<ApprovalRegistry>,
        ledger: Arc<InMemoryLedger>,
        tenant: TenantId,
        officer: Actor,
        admin: Actor,
    }

    fn fixture(auto_suspend_threshold: Option<u32>) -> Fixture {
        let keystore = InMemoryKeyStore::new();
        let key_id = SignerKeyId::new("officer-key");
        keystore
            .provision_from_seed(key_id.clone(), &[9u8; 32])
            .unwrap();
        let ledger = Arc::new(InMemoryLedger::new());
        let signer = Arc::new(SignatureService::new(Arc::new(keystore)));
        let approvals = Arc::new(ApprovalRegistry::new(
            Arc::clone(&ledger) as Arc<dyn LedgerStore>,
            signer,
        ));
        let manager = BindingManager::new(
            Arc::clone(&approvals),
            Arc::clone(&ledger) as Arc<dyn LedgerStore>,
            auto_suspend_threshold,
        );
        Fixture {
            manager,
            approvals,
            ledger,
            tenant: TenantId::new("acme"),
            officer: Actor::new("user:alice", Role::ComplianceOfficer).with_signer_key(key_id),
            admin: Actor::new("user:root", Role::Admin),
        }
    }

    async fn approve_policy(fx: &Fixture, policy_id: &str) {
        let approval = fx
            .approvals
            .create(CreateApprovalRequest {
                tenant_id: fx.tenant.clone(),
                object_kind: ObjectKind::PolicyInstance,
                object_id: policy_id.to_string(),
                stage: "compliance_review".to_string(),
                required_roles: BTreeSet::from([Role::ComplianceOfficer]),
            })
            .await;
        fx.approvals
            .submit_decision(&approval.id, &fx.officer, DecisionInput::new(Decision::Approved))
            .await
            .unwrap();
    }

    async fn activate(fx: &Fixture, policy_id: &str) -> RuntimeBinding {
        fx.manager
            .activate(
                PolicyInstanceId::new(policy_id),
                BindingScope::Workspace(WorkspaceId::new("ws-1")),
                fx.tenant.clone(),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn activation_requires_approved_decision() {
        let fx = fixture(None);

        let result = fx
            .manager
            .activate(
                PolicyInstanceId::new("policy-1"),
                BindingScope::Workspace(WorkspaceId::new("ws-1")),
                fx.tenant.clone(),
            )
            .await;
        assert!(matches!(result, Err(BindingError::ApprovalRequired(_))));

        approve_policy(&fx, "policy-1").await;
        let binding = activate(&fx, "policy-1").await;
        assert_eq!(binding.status, BindingStatus::Active);
        assert_eq!(binding.violation_count, 0);

        // decision entry + activation entry
        let entries = fx.ledger.read_range(&fx.tenant, 0, 1).await.unwrap();
        assert_eq!(entries[1].kind, EntryKind::BindingActivated);
    }

    #[tokio::test]
    async fn rejected_decision_does_not_authorize_activation() {
        let fx = fixture(None);
        let approval = fx
            .approvals
            .create(CreateApprovalRequest {
                tenant_id: fx.tenant.clone(),
                object_kind: ObjectKind::PolicyInstance,
                object_id: "policy-1".to_string(),
                stage: "compliance_review".to_string(),
                required_roles: BTreeSet::from([Role::ComplianceOfficer]),
            })
            .await;
        fx.approvals
            .submit_decision(&approval.id, &fx.officer, DecisionInput::new(Decision::Rejected))
            .await
            .unwrap();

        let result = fx
            .manager
            .activate(
                PolicyInstanceId::new("policy-1"),
                BindingScope::Workspace(WorkspaceId::new("ws-1")),
                fx.tenant.clone(),
            )
            .await;
        assert!(matches!(result, Err(BindingError::ApprovalRequired(_))));
    }

    #[tokio::test]
    async fn violations_count_monotonically() {
        let fx = fixture(None);
        approve_policy(&fx, "policy-1").await;
        let binding = activate(&fx, "policy-1").await;

        for expected in 1..=5u32 {
            let updated = fx.manager.record_violation(&binding.id).await.unwrap();
            assert_eq!(updated.violation_count, expected);
            // Auto-suspend disabled: still active regardless of count.
            assert_eq!(updated.status, BindingStatus::Active);
        }
    }

    #[tokio::test]
    async fn auto_suspend_fires_exactly_once_at_threshold() {
        let fx = fixture(Some(3));
        approve_policy(&fx, "policy-1").await;
        let binding = activate(&fx, "policy-1").await;

        let tail_before = fx.ledger.tail_sequence(&fx.tenant).await.unwrap().unwrap();

        assert_eq!(
            fx.manager.record_violation(&binding.id).await.unwrap().status,
            BindingStatus::Active
        );
        assert_eq!(
            fx.manager.record_violation(&binding.id).await.unwrap().status,
            BindingStatus::Active
        );
        let suspended = fx.manager.record_violation(&binding.id).await.unwrap();
        assert_eq!(suspended.status, BindingStatus::Suspended);
        assert_eq!(suspended.violation_count, 3);

        // Two violation entries, then violation + status change at the
        // threshold crossing.
        let tail_after = fx.ledger.tail_sequence(&fx.tenant).await.unwrap().unwrap();
        assert_eq!(tail_after - tail_before, 4);
        let entries = fx
            .ledger
            .read_range(&fx.tenant, tail_after, tail_after)
            .await
            .unwrap();
        assert_eq!(entries[0].kind, EntryKind::BindingStatusChanged);

        // Suspended binding takes no further violations.
        assert!(matches!(
            fx.manager.record_violation(&binding.id).await,
            Err(BindingError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn operator_transitions_require_admin_role() {
        let fx = fixture(None);
        approve_policy(&fx, "policy-1").await;
        let binding = activate(&fx, "policy-1").await;

        assert!(matches!(
            fx.manager.suspend(&binding.id, &fx.officer).await,
            Err(BindingError::Forbidden { .. })
        ));

        let suspended = fx.manager.suspend(&binding.id, &fx.admin).await.unwrap();
        assert_eq!(suspended.status, BindingStatus::Suspended);

        // Suspending twice is an invalid transition.
        assert!(matches!(
            fx.manager.suspend(&binding.id, &fx.admin).await,
            Err(BindingError::InvalidTransition { .. })
        ));

        let reactivated = fx.manager.reactivate(&binding.id, &fx.admin).await.unwrap();
        assert_eq!(reactivated.status, BindingStatus::Active);
        assert_eq!(reactivated.deactivated_at, None);
    }

    #[tokio::test]
    async fn deprecate_is_terminal() {
        let fx = fixture(None);
        approve_policy(&fx, "policy-1").await;
        let binding = activate(&fx, "policy-1").await;

        let deprecated = fx.manager.deprecate(&binding.id).await.unwrap();
        assert_eq!(deprecated.status, BindingStatus::Deprecated);
        assert!(deprecated.deactivated_at.is_some());

        assert!(matches!(
            fx.manager.deprecate(&binding.id).await,
            Err(BindingError::InvalidTransition { .. })
        ));
        // No way back, even for an admin.
        assert!(matches!(
            fx.manager.reactivate(&binding.id, &fx.admin).await,
            Err(BindingError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn mark_verified_records_timestamp_without_ledger_entry() {
        let fx = fixture(None);
        approve_policy(&fx, "policy-1").await;
        let binding = activate(&fx, "policy-1").await;

        let tail_before = fx.ledger.tail_sequence(&fx.tenant).await.unwrap();
        let verified = fx.manager.mark_verified(&binding.id).await.unwrap();
        assert!(verified.last_verified_at.is_some());
        assert_eq!(fx.ledger.tail_sequence(&fx.tenant).await.unwrap(), tail_before);
    }
}
