//! Ed25519 signing, the default chain algorithm.

use crate::error::Validation;
use ed25519_dalek::{Signer, Verifier};
use rand::{CryptoRng, RngCore};
use zeroize::Zeroizing;

/// Ed25519 keypair.
pub struct KeyPair {
    signing_key: ed25519_dalek::SigningKey,
}

impl KeyPair {
    /// Generate a keypair from the provided randomness source.
    pub fn generate<T: CryptoRng + RngCore>(rng: &mut T) -> Self {
        Self {
            signing_key: ed25519_dalek::SigningKey::generate(rng),
        }
    }

    /// Rebuild a keypair from a private key.
    pub fn from_private(private: PrivateKey) -> Self {
        Self {
            signing_key: private.0,
        }
    }

    pub fn private(&self) -> PrivateKey {
        PrivateKey(self.signing_key.clone())
    }

    pub fn public(&self) -> PublicKey {
        PublicKey(self.signing_key.verifying_key())
    }

    /// Sign a message, producing the raw 64-byte signature.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.signing_key.sign(message).to_bytes().to_vec()
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ed25519::KeyPair({})", hex::encode(self.public().to_bytes()))
    }
}

/// Ed25519 private key. The scalar is zeroized on drop.
#[derive(Clone)]
pub struct PrivateKey(ed25519_dalek::SigningKey);

impl PrivateKey {
    /// The 32-byte scalar, in a zeroizing container.
    pub fn to_bytes(&self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(self.0.to_bytes().to_vec())
    }

    /// Rebuild from the 32-byte scalar.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Validation> {
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| Validation::InvalidKeySize(bytes.len()))?;
        Ok(Self(ed25519_dalek::SigningKey::from_bytes(&bytes)))
    }

    pub fn public(&self) -> PublicKey {
        PublicKey(self.0.verifying_key())
    }

    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.0.sign(message).to_bytes().to_vec()
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ed25519::PrivateKey(..)")
    }
}

/// Ed25519 public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicKey(ed25519_dalek::VerifyingKey);

impl PublicKey {
    /// The raw 32-byte point.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    /// Parse a raw 32-byte point.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Validation> {
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| Validation::InvalidKeySize(bytes.len()))?;
        ed25519_dalek::VerifyingKey::from_bytes(&bytes)
            .map(Self)
            .map_err(|e| Validation::InvalidKey(e.to_string()))
    }

    /// Verify a raw 64-byte signature.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), Validation> {
        let signature = ed25519_dalek::Signature::from_slice(signature)
            .map_err(|e| Validation::InvalidSignature(e.to_string()))?;
        self.0
            .verify(message, &signature)
            .map_err(|e| Validation::InvalidSignature(e.to_string()))
    }
}
