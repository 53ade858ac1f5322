//! Signing identities and the provider that signs and verifies on their behalf.
//!
//! The log never touches key material directly. It holds an [`Identity`]
//! (a public descriptor embedded in every entry it writes) and an
//! [`IdentityProvider`] that can produce and check signatures for it.
//! [`Ed25519Keystore`] is the in-process provider used by tests and by
//! applications that don't bring their own key management.

use std::collections::HashMap;
use std::sync::RwLock;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::error::LogError;

/// Public descriptor of a writer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    /// Application-level identifier of the writer.
    pub id: String,
    /// Raw public key bytes.
    pub public_key: Vec<u8>,
    /// Proofs binding `id` and `public_key` together.
    pub signatures: IdentitySignatures,
    /// Name of the scheme that produced the key, e.g. `"ed25519"`.
    pub kind: String,
}

/// Signatures carried by an [`Identity`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentitySignatures {
    /// Signature over the identity's `id`.
    pub id: Vec<u8>,
    /// Signature over `public_key || signatures.id`.
    pub public_key: Vec<u8>,
}

impl Identity {
    /// Identity for a bare public key, with no binding signatures.
    ///
    /// Used when normalising legacy entries that only recorded a key.
    pub fn from_public_key(public_key: Vec<u8>) -> Self {
        Self {
            id: hex::encode(&public_key),
            public_key,
            signatures: IdentitySignatures::default(),
            kind: "ed25519".to_string(),
        }
    }

    /// Hex rendering of the public key; used as the Lamport clock id.
    pub fn public_key_hex(&self) -> String {
        hex::encode(&self.public_key)
    }
}

/// Signs on behalf of identities and verifies signatures.
///
/// Calls may suspend (e.g. a remote keystore), so the trait is async.
#[async_trait::async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Sign `data` with the key belonging to `identity`.
    async fn sign(&self, identity: &Identity, data: &[u8]) -> Result<Vec<u8>, LogError>;

    /// Check `signature` over `data` against `public_key`.
    ///
    /// Returns `Ok(false)` for a signature that doesn't verify, including
    /// malformed keys or signatures.
    async fn verify(
        &self,
        signature: &[u8],
        public_key: &[u8],
        data: &[u8],
    ) -> Result<bool, LogError>;
}

/// In-memory ed25519 keystore.
///
/// Keys are indexed by the hex of their public key, so several identities
/// may share an application `id` without clobbering one another.
#[derive(Default)]
pub struct Ed25519Keystore {
    keys: RwLock<HashMap<String, SigningKey>>,
}

impl Ed25519Keystore {
    /// Create an empty keystore.
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a fresh key and return the identity bound to it.
    pub fn create_identity(&self, id: &str) -> Identity {
        self.identity_from_seed(id, rand::random())
    }

    /// Derive a key from `seed` and return the identity bound to it.
    ///
    /// Deterministic: the same `(id, seed)` always yields the same identity.
    pub fn identity_from_seed(&self, id: &str, seed: [u8; 32]) -> Identity {
        let signing_key = SigningKey::from_bytes(&seed);
        let public_key = signing_key.verifying_key().to_bytes().to_vec();

        let id_signature = signing_key.sign(id.as_bytes()).to_bytes().to_vec();
        let mut bound = public_key.clone();
        bound.extend_from_slice(&id_signature);
        let public_key_signature = signing_key.sign(&bound).to_bytes().to_vec();

        self.keys
            .write()
            .expect("lock poisoned")
            .insert(hex::encode(&public_key), signing_key);

        Identity {
            id: id.to_string(),
            public_key,
            signatures: IdentitySignatures {
                id: id_signature,
                public_key: public_key_signature,
            },
            kind: "ed25519".to_string(),
        }
    }
}

#[async_trait::async_trait]
impl IdentityProvider for Ed25519Keystore {
    async fn sign(&self, identity: &Identity, data: &[u8]) -> Result<Vec<u8>, LogError> {
        let keys = self.keys.read().expect("lock poisoned");
        let key = keys.get(&identity.public_key_hex()).ok_or_else(|| {
            LogError::Signing(format!("no private key for identity {:?}", identity.id))
        })?;

        Ok(key.sign(data).to_bytes().to_vec())
    }

    async fn verify(
        &self,
        signature: &[u8],
        public_key: &[u8],
        data: &[u8],
    ) -> Result<bool, LogError> {
        let Ok(key_bytes) = <[u8; 32]>::try_from(public_key) else {
            return Ok(false);
        };
        let Ok(verifying_key) = VerifyingKey::from_bytes(&key_bytes) else {
            return Ok(false);
        };
        let Ok(signature) = Signature::from_slice(signature) else {
            return Ok(false);
        };

        Ok(verifying_key.verify(data, &signature).is_ok())
    }
}
