use crate::id::{BindingId, PartnerId, PolicyInstanceId, TenantId, WorkspaceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a policy instance is live.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BindingScope {
    Workspace(WorkspaceId),
    Partner(PartnerId),
}

impl std::fmt::Display for BindingScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BindingScope::Workspace(id) => write!(f, "workspace:{id}"),
            BindingScope::Partner(id) => write!(f, "partner:{id}"),
        }
    }
}

/// Runtime binding lifecycle states.
///
/// `active ⇄ suspended → deprecated`; deprecated is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BindingStatus {
    Active,
    Suspended,
    Deprecated,
}

impl std::fmt::Display for BindingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BindingStatus::Active => "active",
            BindingStatus::Suspended => "suspended",
            BindingStatus::Deprecated => "deprecated",
        };
        write!(f, "{name}")
    }
}

/// The live activation of an approved policy instance against a scope.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RuntimeBinding {
    pub id: BindingId,
    pub policy_instance_id: PolicyInstanceId,
    pub scope: BindingScope,
    pub enterprise_id: TenantId,
    pub status: BindingStatus,
    /// The approval that authorised this binding.
    pub approval_id: crate::id::ApprovalId,
    pub activated_at: DateTime<Utc>,
    pub deactivated_at: Option<DateTime<Utc>>,
    /// Written by the external health-check collaborator.
    pub last_verified_at: Option<DateTime<Utc>>,
    /// Monotonically non-decreasing while the binding lives.
    pub violation_count: u32,
}
