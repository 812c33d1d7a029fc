use crate::error::SignatureError;
use crate::keystore::{key_ref_for, KeyStore};
use chrono::Utc;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use std::sync::Arc;
use tracing::debug;
use vera_types::{ContentHash, KeyRef, SignatureMeaning, SignatureRecord, SignerKeyId};

/// Produces and verifies signatures over canonical digests.
///
/// The message passed to sign/verify is always a 32-byte digest (entry hash
/// or bundle root hash), never a formatted rendering of the signed object,
/// so there is no signature ambiguity from serialization differences.
pub struct SignatureService {
    store: Arc<dyn KeyStore>,
}

impl SignatureService {
    pub fn new(store: Arc<dyn KeyStore>) -> Self {
        Self { store }
    }

    /// Sign a digest, returning raw signature bytes.
    pub async fn sign(
        &self,
        key_id: &SignerKeyId,
        digest: &ContentHash,
    ) -> Result<Vec<u8>, SignatureError> {
        let signature = self.store.sign(key_id, digest).await?;
        debug!(key_id = %key_id, digest = %digest, "signed digest");
        Ok(signature)
    }

    /// Sign a digest and wrap it in a full non-repudiation record.
    pub async fn sign_record(
        &self,
        key_id: &SignerKeyId,
        digest: &ContentHash,
        signer_identity: &str,
        meaning: SignatureMeaning,
        reauthenticated: bool,
    ) -> Result<SignatureRecord, SignatureError> {
        let signature = self.sign(key_id, digest).await?;
        let key_ref = self.key_ref(key_id).await?;
        Ok(SignatureRecord {
            signer_identity: signer_identity.to_string(),
            reauthenticated,
            meaning,
            signed_at: Utc::now(),
            signature,
            key_ref,
        })
    }

    /// Public handle for a provisioned key.
    pub async fn key_ref(&self, key_id: &SignerKeyId) -> Result<KeyRef, SignatureError> {
        let public_key = self.store.public_key(key_id).await?;
        Ok(key_ref_for(key_id, &public_key))
    }

    /// Public key bytes for embedding in exported documents.
    pub async fn public_key_bytes(&self, key_id: &SignerKeyId) -> Result<Vec<u8>, SignatureError> {
        let public_key = self.store.public_key(key_id).await?;
        Ok(public_key.as_bytes().to_vec())
    }

    /// Verify a signature using a provisioned key id.
    pub async fn verify(
        &self,
        key_id: &SignerKeyId,
        digest: &ContentHash,
        signature: &[u8],
    ) -> Result<bool, SignatureError> {
        let public_key = self.store.public_key(key_id).await?;
        Ok(verify_against(&public_key, digest, signature))
    }

    /// Verify a signature against raw public key bytes.
    ///
    /// This is the offline path: the bundle document carries the public key,
    /// so no key store access is required.
    pub fn verify_with_public_key(
        public_key: &[u8],
        digest: &ContentHash,
        signature: &[u8],
    ) -> Result<bool, SignatureError> {
        let key_bytes: [u8; 32] = public_key
            .try_into()
            .map_err(|_| SignatureError::MalformedKey("expected 32 bytes".to_string()))?;
        let verifying_key = VerifyingKey::from_bytes(&key_bytes)
            .map_err(|e| SignatureError::MalformedKey(e.to_string()))?;
        Ok(verify_against(&verifying_key, digest, signature))
    }
}

fn verify_against(public_key: &VerifyingKey, digest: &ContentHash, signature: &[u8]) -> bool {
    match Signature::from_slice(signature) {
        Ok(sig) => public_key.verify(digest.as_bytes(), &sig).is_ok(),
        // Malformed signature bytes are a verification failure, not an error.
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keystore::InMemoryKeyStore;

    fn service_with_key(key_id: &SignerKeyId) -> SignatureService {
        let store = InMemoryKeyStore::new();
        store
            .provision_from_seed(key_id.clone(), &[42u8; 32])
            .unwrap();
        SignatureService::new(Arc::new(store))
    }

    #[tokio::test]
    async fn sign_verify_round_trip() {
        let key_id = SignerKeyId::new("officer-1");
        let service = service_with_key(&key_id);
        let digest = ContentHash([5u8; 32]);

        let signature = service.sign(&key_id, &digest).await.unwrap();
        assert!(service.verify(&key_id, &digest, &signature).await.unwrap());

        // Different digest fails verification.
        let other = ContentHash([6u8; 32]);
        assert!(!service.verify(&key_id, &other, &signature).await.unwrap());
    }

    #[tokio::test]
    async fn offline_verification_uses_embedded_public_key() {
        let key_id = SignerKeyId::new("officer-1");
        let service = service_with_key(&key_id);
        let digest = ContentHash([5u8; 32]);

        let signature = service.sign(&key_id, &digest).await.unwrap();
        let public_key = service.public_key_bytes(&key_id).await.unwrap();

        assert!(
            SignatureService::verify_with_public_key(&public_key, &digest, &signature).unwrap()
        );
    }

    #[tokio::test]
    async fn malformed_signature_bytes_fail_cleanly() {
        let key_id = SignerKeyId::new("officer-1");
        let service = service_with_key(&key_id);
        let digest = ContentHash([5u8; 32]);

        assert!(!service.verify(&key_id, &digest, &[1, 2, 3]).await.unwrap());
    }

    #[tokio::test]
    async fn signature_record_carries_meaning_and_key_ref() {
        let key_id = SignerKeyId::new("officer-1");
        let service = service_with_key(&key_id);
        let digest = ContentHash([5u8; 32]);

        let record = service
            .sign_record(
                &key_id,
                &digest,
                "user:alice",
                SignatureMeaning::ApprovalDecision,
                true,
            )
            .await
            .unwrap();

        assert_eq!(record.signer_identity, "user:alice");
        assert!(record.reauthenticated);
        assert_eq!(record.meaning, SignatureMeaning::ApprovalDecision);
        assert_eq!(record.key_ref.key_id, key_id);

        let public_key = service.public_key_bytes(&key_id).await.unwrap();
        assert!(SignatureService::verify_with_public_key(
            &public_key,
            &digest,
            &record.signature
        )
        .unwrap());
    }
}
