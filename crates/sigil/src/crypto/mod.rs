//! Chain cryptography.
//!
//! Two signature algorithms are supported: Ed25519 (raw 64-byte signatures)
//! and ECDSA over secp256r1 (DER-encoded signatures). Every block designates
//! the algorithm of the *next* keypair, so a single chain can mix
//! algorithms. Randomness is only needed for keypair generation and is
//! always supplied by the caller, which keeps tests deterministic.

pub mod ed25519;
pub mod p256;

use crate::error::Validation;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroizing;

/// Signature algorithm of a keypair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    /// Ed25519, algorithm id 0
    #[default]
    Ed25519,
    /// ECDSA over secp256r1, algorithm id 1
    Secp256r1,
}

impl Algorithm {
    /// Wire identifier of the algorithm.
    pub fn to_id(self) -> i32 {
        match self {
            Algorithm::Ed25519 => 0,
            Algorithm::Secp256r1 => 1,
        }
    }

    /// Parse a wire identifier.
    pub fn from_id(id: i32) -> Option<Self> {
        match id {
            0 => Some(Algorithm::Ed25519),
            1 => Some(Algorithm::Secp256r1),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Algorithm::Ed25519 => "ed25519",
            Algorithm::Secp256r1 => "secp256r1",
        }
    }
}

/// A keypair in either algorithm.
#[derive(Debug)]
pub enum KeyPair {
    Ed25519(ed25519::KeyPair),
    Secp256r1(p256::KeyPair),
}

impl KeyPair {
    /// Generate a fresh keypair from the provided randomness source.
    pub fn generate<T: CryptoRng + RngCore>(algorithm: Algorithm, rng: &mut T) -> Self {
        match algorithm {
            Algorithm::Ed25519 => KeyPair::Ed25519(ed25519::KeyPair::generate(rng)),
            Algorithm::Secp256r1 => KeyPair::Secp256r1(p256::KeyPair::generate(rng)),
        }
    }

    /// Rebuild a keypair from its private half.
    pub fn from_private(private: PrivateKey) -> Self {
        match private {
            PrivateKey::Ed25519(key) => KeyPair::Ed25519(ed25519::KeyPair::from_private(key)),
            PrivateKey::Secp256r1(key) => KeyPair::Secp256r1(p256::KeyPair::from_private(key)),
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        match self {
            KeyPair::Ed25519(_) => Algorithm::Ed25519,
            KeyPair::Secp256r1(_) => Algorithm::Secp256r1,
        }
    }

    pub fn private(&self) -> PrivateKey {
        match self {
            KeyPair::Ed25519(keypair) => PrivateKey::Ed25519(keypair.private()),
            KeyPair::Secp256r1(keypair) => PrivateKey::Secp256r1(keypair.private()),
        }
    }

    pub fn public(&self) -> PublicKey {
        match self {
            KeyPair::Ed25519(keypair) => PublicKey::Ed25519(keypair.public()),
            KeyPair::Secp256r1(keypair) => PublicKey::Secp256r1(keypair.public()),
        }
    }

    /// Sign a message with the private half.
    pub fn sign(&self, message: &[u8]) -> Signature {
        match self {
            KeyPair::Ed25519(keypair) => Signature(keypair.sign(message)),
            KeyPair::Secp256r1(keypair) => Signature(keypair.sign(message)),
        }
    }
}

/// A private key in either algorithm. Scalars zeroize on drop.
#[derive(Debug, Clone)]
pub enum PrivateKey {
    Ed25519(ed25519::PrivateKey),
    Secp256r1(p256::PrivateKey),
}

impl PrivateKey {
    pub fn algorithm(&self) -> Algorithm {
        match self {
            PrivateKey::Ed25519(_) => Algorithm::Ed25519,
            PrivateKey::Secp256r1(_) => Algorithm::Secp256r1,
        }
    }

    /// The 32-byte scalar, in a zeroizing container.
    pub fn to_bytes(&self) -> Zeroizing<Vec<u8>> {
        match self {
            PrivateKey::Ed25519(key) => key.to_bytes(),
            PrivateKey::Secp256r1(key) => key.to_bytes(),
        }
    }

    /// Rebuild a private key from its scalar bytes.
    pub fn from_bytes(bytes: &[u8], algorithm: Algorithm) -> Result<Self, Validation> {
        match algorithm {
            Algorithm::Ed25519 => ed25519::PrivateKey::from_bytes(bytes).map(PrivateKey::Ed25519),
            Algorithm::Secp256r1 => p256::PrivateKey::from_bytes(bytes).map(PrivateKey::Secp256r1),
        }
    }

    /// The corresponding public key.
    pub fn public(&self) -> PublicKey {
        match self {
            PrivateKey::Ed25519(key) => PublicKey::Ed25519(key.public()),
            PrivateKey::Secp256r1(key) => PublicKey::Secp256r1(key.public()),
        }
    }

    /// Sign a message.
    pub fn sign(&self, message: &[u8]) -> Signature {
        match self {
            PrivateKey::Ed25519(key) => Signature(key.sign(message)),
            PrivateKey::Secp256r1(key) => Signature(key.sign(message)),
        }
    }
}

/// A public key in either algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublicKey {
    Ed25519(ed25519::PublicKey),
    Secp256r1(p256::PublicKey),
}

impl PublicKey {
    pub fn algorithm(&self) -> Algorithm {
        match self {
            PublicKey::Ed25519(_) => Algorithm::Ed25519,
            PublicKey::Secp256r1(_) => Algorithm::Secp256r1,
        }
    }

    /// Serialized key bytes: 32-byte raw for Ed25519, 33-byte compressed
    /// SEC1 for secp256r1.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            PublicKey::Ed25519(key) => key.to_bytes().to_vec(),
            PublicKey::Secp256r1(key) => key.to_bytes(),
        }
    }

    /// Parse key bytes for the given algorithm.
    pub fn from_bytes(bytes: &[u8], algorithm: Algorithm) -> Result<Self, Validation> {
        match algorithm {
            Algorithm::Ed25519 => ed25519::PublicKey::from_bytes(bytes).map(PublicKey::Ed25519),
            Algorithm::Secp256r1 => p256::PublicKey::from_bytes(bytes).map(PublicKey::Secp256r1),
        }
    }

    /// Verify a signature over a message.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<(), Validation> {
        match self {
            PublicKey::Ed25519(key) => key.verify(message, &signature.0),
            PublicKey::Secp256r1(key) => key.verify(message, &signature.0),
        }
    }
}

impl std::hash::Hash for PublicKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.algorithm().to_id().hash(state);
        self.to_bytes().hash(state);
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.algorithm().name(), hex::encode(self.to_bytes()))
    }
}

/// A detached signature, stored in its wire representation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature(pub(crate) Vec<u8>);

impl Signature {
    /// Wrap wire-representation signature bytes.
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// The signature bytes.
    pub fn to_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Public key interning table.
///
/// Parallels the symbol table, without a reserved prefix. The primary table
/// covers the whole chain; each third-party block keeps an isolated one.
#[derive(Debug, Clone, Default)]
pub struct PublicKeys {
    keys: Vec<PublicKey>,
}

impl PublicKeys {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a key, returning its index. Idempotent.
    pub fn insert(&mut self, key: &PublicKey) -> u64 {
        if let Some(index) = self.get(key) {
            return index;
        }
        self.keys.push(*key);
        self.keys.len() as u64 - 1
    }

    /// Look up a key's index without interning it.
    pub fn get(&self, key: &PublicKey) -> Option<u64> {
        self.keys
            .iter()
            .position(|candidate| candidate == key)
            .map(|position| position as u64)
    }

    /// Resolve an index back to its key.
    pub fn get_key(&self, index: u64) -> Option<&PublicKey> {
        self.keys.get(index as usize)
    }

    /// The interned keys, in interning order.
    pub fn keys(&self) -> &[PublicKey] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Append the keys a deserialized block introduces, rejecting
    /// redeclarations.
    pub fn extend(&mut self, keys: &[PublicKey]) -> Result<(), Validation> {
        for key in keys {
            if self.get(key).is_some() {
                return Err(Validation::DuplicatePublicKey(key.to_string()));
            }
            self.keys.push(*key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn keypair_dispatches_both_algorithms() {
        let mut rng = StdRng::seed_from_u64(7);
        for algorithm in [Algorithm::Ed25519, Algorithm::Secp256r1] {
            let keypair = KeyPair::generate(algorithm, &mut rng);
            assert_eq!(keypair.algorithm(), algorithm);
            let signature = keypair.sign(b"chain input");
            keypair.public().verify(b"chain input", &signature).unwrap();

            let restored = KeyPair::from_private(keypair.private());
            assert_eq!(restored.public(), keypair.public());
        }
    }

    #[test]
    fn public_key_roundtrips_through_bytes() {
        let mut rng = StdRng::seed_from_u64(8);
        for algorithm in [Algorithm::Ed25519, Algorithm::Secp256r1] {
            let keypair = KeyPair::generate(algorithm, &mut rng);
            let bytes = keypair.public().to_bytes();
            let restored = PublicKey::from_bytes(&bytes, algorithm).unwrap();
            assert_eq!(restored, keypair.public());
        }
    }

    #[test]
    fn key_table_interns_and_rejects_duplicates() {
        let mut rng = StdRng::seed_from_u64(9);
        let a = KeyPair::generate(Algorithm::Ed25519, &mut rng).public();
        let b = KeyPair::generate(Algorithm::Ed25519, &mut rng).public();

        let mut table = PublicKeys::new();
        assert_eq!(table.insert(&a), 0);
        assert_eq!(table.insert(&b), 1);
        assert_eq!(table.insert(&a), 0);
        assert_eq!(table.get_key(1), Some(&b));

        assert!(matches!(
            table.extend(&[a]),
            Err(Validation::DuplicatePublicKey(_))
        ));
    }
}
