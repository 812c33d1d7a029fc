use crate::id::{ApprovalId, TenantId};
use crate::signature::SignatureRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::actor::Role;

/// The governed object kinds an approval can target.
///
/// Closed tagged set: new kinds are compile-time additions, so dispatch over
/// approval targets stays exhaustively matched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    PolicyInstance,
    SandboxRun,
    PolicyTemplate,
    RuntimeBinding,
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ObjectKind::PolicyInstance => "policy_instance",
            ObjectKind::SandboxRun => "sandbox_run",
            ObjectKind::PolicyTemplate => "policy_template",
            ObjectKind::RuntimeBinding => "runtime_binding",
        };
        write!(f, "{name}")
    }
}

/// Terminal approval outcomes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Approved,
    Rejected,
    Conditional,
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Decision::Approved => "approved",
            Decision::Rejected => "rejected",
            Decision::Conditional => "conditional",
        };
        write!(f, "{name}")
    }
}

/// The recorded outcome of a review. Immutable once written.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub decision: Decision,
    pub decided_by: String,
    pub decided_at: DateTime<Utc>,
    pub rationale: Option<String>,
    pub conditions: Vec<String>,
    pub signature: SignatureRecord,
}

/// A review gate over a governed object.
///
/// Lifecycle: created pending, then exactly one terminal decision. A wrong
/// decision is corrected by a new Approval that references this one via
/// `supersedes`, never by editing in place.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Approval {
    pub id: ApprovalId,
    pub tenant_id: TenantId,
    pub object_kind: ObjectKind,
    pub object_id: String,
    pub stage: String,
    pub required_roles: BTreeSet<Role>,
    pub decision: Option<DecisionRecord>,
    pub supersedes: Option<ApprovalId>,
    pub created_at: DateTime<Utc>,
}

impl Approval {
    /// Whether a terminal decision has been recorded.
    pub fn is_decided(&self) -> bool {
        self.decision.is_some()
    }
}
