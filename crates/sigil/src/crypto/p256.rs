//! ECDSA over secp256r1, the alternate chain algorithm.
//!
//! Signatures cross the wire DER-encoded; raw 64-byte signatures are
//! accepted on read for interoperability. Public keys serialize as 33-byte
//! compressed SEC1 points.

use crate::error::Validation;
use p256::ecdsa::signature::Signer;
use p256::ecdsa::signature::Verifier;
use rand::{CryptoRng, RngCore};
use zeroize::Zeroizing;

/// secp256r1 keypair.
pub struct KeyPair {
    signing_key: p256::ecdsa::SigningKey,
}

impl KeyPair {
    /// Generate a keypair from the provided randomness source.
    pub fn generate<T: CryptoRng + RngCore>(rng: &mut T) -> Self {
        Self {
            signing_key: p256::ecdsa::SigningKey::random(rng),
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
        PublicKey(*self.signing_key.verifying_key())
    }

    /// Sign a message, producing a DER-encoded signature.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        let signature: p256::ecdsa::Signature = self.signing_key.sign(message);
        signature.to_der().as_bytes().to_vec()
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "p256::KeyPair({})", hex::encode(self.public().to_bytes()))
    }
}

/// secp256r1 private key. The scalar is zeroized on drop.
#[derive(Clone)]
pub struct PrivateKey(p256::ecdsa::SigningKey);

impl PrivateKey {
    /// The 32-byte scalar, in a zeroizing container.
    pub fn to_bytes(&self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(self.0.to_bytes().to_vec())
    }

    /// Rebuild from the 32-byte scalar.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Validation> {
        if bytes.len() != 32 {
            return Err(Validation::InvalidKeySize(bytes.len()));
        }
        p256::ecdsa::SigningKey::from_slice(bytes)
            .map(Self)
            .map_err(|e| Validation::InvalidKey(e.to_string()))
    }

    pub fn public(&self) -> PublicKey {
        PublicKey(*self.0.verifying_key())
    }

    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        let signature: p256::ecdsa::Signature = self.0.sign(message);
        signature.to_der().as_bytes().to_vec()
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "p256::PrivateKey(..)")
    }
}

/// secp256r1 public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicKey(p256::ecdsa::VerifyingKey);

impl PublicKey {
    /// The compressed 33-byte SEC1 point.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.to_encoded_point(true).as_bytes().to_vec()
    }

    /// Parse a SEC1 point (compressed or uncompressed).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Validation> {
        p256::ecdsa::VerifyingKey::from_sec1_bytes(bytes)
            .map(Self)
            .map_err(|e| Validation::InvalidKey(e.to_string()))
    }

    /// Verify a signature, DER-encoded or raw 64-byte.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), Validation> {
        let signature = parse_signature(signature)?;
        self.0
            .verify(message, &signature)
            .map_err(|e| Validation::InvalidSignature(e.to_string()))
    }
}

/// Accept DER first, falling back to the raw representation.
fn parse_signature(bytes: &[u8]) -> Result<p256::ecdsa::Signature, Validation> {
    p256::ecdsa::Signature::from_der(bytes)
        .or_else(|_| p256::ecdsa::Signature::from_slice(bytes))
        .map_err(|e| Validation::InvalidSignature(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn sign_verify_roundtrip() {
        let mut rng = StdRng::seed_from_u64(3);
        let keypair = KeyPair::generate(&mut rng);
        let signature = keypair.sign(b"payload");
        keypair.public().verify(b"payload", &signature).unwrap();
        assert!(keypair.public().verify(b"tampered", &signature).is_err());
    }

    #[test]
    fn public_key_is_compressed() {
        let mut rng = StdRng::seed_from_u64(4);
        let keypair = KeyPair::generate(&mut rng);
        let bytes = keypair.public().to_bytes();
        assert_eq!(bytes.len(), 33);
        let restored = PublicKey::from_bytes(&bytes).unwrap();
        assert_eq!(restored, keypair.public());
    }
}
