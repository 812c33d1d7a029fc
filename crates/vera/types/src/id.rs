use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            /// Generate a new random identifier.
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_id!(
    /// Tenant boundary for ledger chains. Every enterprise gets its own chain.
    TenantId
);

string_id!(
    /// Unique identifier for an Approval record.
    ApprovalId
);

string_id!(
    /// Unique identifier for a RuntimeBinding.
    BindingId
);

string_id!(
    /// Unique identifier for a ProofBundle.
    BundleId
);

string_id!(
    /// Identifier of a governed policy instance.
    PolicyInstanceId
);

string_id!(
    /// Unique identifier for a verification certificate.
    CertificateId
);

string_id!(
    /// Reference to a provisioned signing key. Never the key itself.
    SignerKeyId
);

string_id!(
    /// Workspace scope for runtime bindings.
    WorkspaceId
);

string_id!(
    /// Partner scope for runtime bindings.
    PartnerId
);
