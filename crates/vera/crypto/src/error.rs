use thiserror::Error;
use vera_types::SignerKeyId;

/// Signature-service errors.
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("signer key not provisioned: {0}")]
    UnknownKey(SignerKeyId),

    #[error("signing backend failure: {0}")]
    SigningFailure(String),

    #[error("malformed public key: {0}")]
    MalformedKey(String),
}
