use crate::error::SignatureError;
use crate::hashing::{digest_bytes, ED25519_ALGORITHM};
use async_trait::async_trait;
use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use std::collections::HashMap;
use std::sync::RwLock;
use vera_types::{ContentHash, KeyRef, SignerKeyId};
use zeroize::Zeroizing;

/// Seam to the key-holding backend (HSM or managed key store).
///
/// Implementations hold private key material; callers only ever see
/// signature bytes and public keys.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Sign a 32-byte canonical digest with the named key.
    async fn sign(
        &self,
        key_id: &SignerKeyId,
        digest: &ContentHash,
    ) -> Result<Vec<u8>, SignatureError>;

    /// Public key for the named key.
    async fn public_key(&self, key_id: &SignerKeyId) -> Result<VerifyingKey, SignatureError>;
}

/// In-memory Ed25519 key store for tests and single-process deployments.
///
/// Production deployments should implement [`KeyStore`] against an external
/// key service; this adapter exists so the rest of the system can be
/// exercised deterministically.
#[derive(Default)]
pub struct InMemoryKeyStore {
    keys: RwLock<HashMap<SignerKeyId, SigningKey>>,
}

impl InMemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provision a fresh random key under the given id.
    pub fn provision(&self, key_id: SignerKeyId) -> Result<KeyRef, SignatureError> {
        let mut seed = Zeroizing::new([0u8; 32]);
        OsRng.fill_bytes(seed.as_mut());
        self.provision_from_seed(key_id, &seed)
    }

    /// Provision a key from a fixed seed. Used by tests that need stable keys.
    pub fn provision_from_seed(
        &self,
        key_id: SignerKeyId,
        seed: &[u8; 32],
    ) -> Result<KeyRef, SignatureError> {
        let signing_key = SigningKey::from_bytes(seed);
        let key_ref = key_ref_for(&key_id, &signing_key.verifying_key());

        let mut keys = self
            .keys
            .write()
            .map_err(|_| SignatureError::SigningFailure("key store lock poisoned".to_string()))?;
        keys.insert(key_id, signing_key);
        Ok(key_ref)
    }
}

#[async_trait]
impl KeyStore for InMemoryKeyStore {
    async fn sign(
        &self,
        key_id: &SignerKeyId,
        digest: &ContentHash,
    ) -> Result<Vec<u8>, SignatureError> {
        let keys = self
            .keys
            .read()
            .map_err(|_| SignatureError::SigningFailure("key store lock poisoned".to_string()))?;
        let key = keys
            .get(key_id)
            .ok_or_else(|| SignatureError::UnknownKey(key_id.clone()))?;
        let signature = key.sign(digest.as_bytes());
        Ok(signature.to_bytes().to_vec())
    }

    async fn public_key(&self, key_id: &SignerKeyId) -> Result<VerifyingKey, SignatureError> {
        let keys = self
            .keys
            .read()
            .map_err(|_| SignatureError::SigningFailure("key store lock poisoned".to_string()))?;
        keys.get(key_id)
            .map(|key| key.verifying_key())
            .ok_or_else(|| SignatureError::UnknownKey(key_id.clone()))
    }
}

/// Build the public handle for a provisioned key.
pub(crate) fn key_ref_for(key_id: &SignerKeyId, public_key: &VerifyingKey) -> KeyRef {
    KeyRef {
        key_id: key_id.clone(),
        algorithm: ED25519_ALGORITHM.to_string(),
        fingerprint: digest_bytes(public_key.as_bytes()),
    }
}
