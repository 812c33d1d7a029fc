//! Vera Crypto - the only component that touches key material.
//!
//! Provides canonical BLAKE3 hashing for the ledger chain and an Ed25519
//! signature service behind a key-store seam. Key material never leaves
//! this crate; everything else handles `KeyRef` handles and signature bytes.

#![deny(unsafe_code)]

mod error;
mod hashing;
mod keystore;
mod service;

pub use error::SignatureError;
pub use hashing::{digest_bytes, entry_hash, payload_hash, root_hash, ED25519_ALGORITHM};
pub use keystore::{InMemoryKeyStore, KeyStore};
pub use service::SignatureService;
