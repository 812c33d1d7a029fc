use crate::id::SignerKeyId;
use serde::{Deserialize, Serialize};

/// Reviewer roles recognised by the governance layer.
///
/// A closed set: adding a role is a compile-time change, which keeps role
/// checks exhaustively matched rather than string-compared.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    ComplianceOfficer,
    LegalReviewer,
    MedicalReviewer,
    Admin,
    Auditor,
}

impl Role {
    /// Roles allowed to drive operator transitions on runtime bindings.
    pub fn is_administrative(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Role::ComplianceOfficer => "compliance_officer",
            Role::LegalReviewer => "legal_reviewer",
            Role::MedicalReviewer => "medical_reviewer",
            Role::Admin => "admin",
            Role::Auditor => "auditor",
        };
        write!(f, "{name}")
    }
}

/// An already-authenticated caller identity.
///
/// Authentication happens upstream; this layer only consumes the resulting
/// identity and role. The signer key reference is present for actors who
/// can produce electronic signatures.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: Role,
    pub signer_key_id: Option<SignerKeyId>,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
            signer_key_id: None,
        }
    }

    pub fn with_signer_key(mut self, key_id: SignerKeyId) -> Self {
        self.signer_key_id = Some(key_id);
        self
    }
}
