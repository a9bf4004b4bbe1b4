//! Serialized token container and chain signatures.
//!
//! A token is an authority block plus attenuation blocks, each carrying the
//! encoded datalog payload, the public half of the next ephemeral keypair,
//! and a signature by the previous key. The proof section holds either the
//! last next-key secret (open token) or a terminal sealing signature.
//!
//! Two signature input schemes exist. V1, the current one, prefixes every
//! section with a domain-separation tag. V0 is plain concatenation and is
//! kept read-only for already-issued tokens, except that sealing stays on
//! the V0 input for signature parity with existing sealed tokens.

pub(crate) mod convert;
pub(crate) mod schema;

use crate::crypto::{Algorithm, KeyPair, PrivateKey, PublicKey, Signature};
use crate::error::{self, Validation};
use prost::Message;
use rand::{CryptoRng, RngCore};

/// Lowest accepted datalog payload version.
pub(crate) const MIN_BLOCK_VERSION: u32 = 3;
/// Highest accepted datalog payload version; always emitted on write.
pub(crate) const MAX_BLOCK_VERSION: u32 = 6;

/// Signature input scheme emitted for new blocks.
const CHAIN_VERSION: u32 = 1;

/// A third-party co-signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ExternalSignature {
    pub signature: Signature,
    pub public_key: PublicKey,
}

/// One signed chain node.
#[derive(Debug, Clone)]
pub(crate) struct SignedBlock {
    /// Encoded datalog payload; signatures bind these exact bytes
    pub data: Vec<u8>,
    pub next_key: PublicKey,
    pub signature: Signature,
    pub external_signature: Option<ExternalSignature>,
    /// Signature scheme version flag as found on the wire
    pub version: Option<u32>,
}

impl SignedBlock {
    fn scheme_version(&self) -> u32 {
        self.version.unwrap_or(0)
    }
}

/// The terminal state of the chain.
#[derive(Debug, Clone)]
pub(crate) enum TokenProof {
    NextSecret(PrivateKey),
    FinalSignature(Signature),
}

/// The decoded wire form of a token.
#[derive(Debug, Clone)]
pub(crate) struct SerializedToken {
    pub root_key_id: Option<u32>,
    pub authority: SignedBlock,
    pub blocks: Vec<SignedBlock>,
    pub proof: TokenProof,
}

/// V1 block signature input.
fn block_signature_input_v1(
    payload: &[u8],
    next_key: &PublicKey,
    previous_signature: Option<&Signature>,
    external_signature: Option<&Signature>,
) -> Vec<u8> {
    let mut input = Vec::new();
    input.extend_from_slice(b"\0BLOCK\0");
    input.extend_from_slice(b"\0VERSION\0");
    input.extend_from_slice(&CHAIN_VERSION.to_le_bytes());
    input.extend_from_slice(b"\0PAYLOAD\0");
    input.extend_from_slice(payload);
    input.extend_from_slice(b"\0ALGORITHM\0");
    input.extend_from_slice(&(next_key.algorithm().to_id() as u32).to_le_bytes());
    input.extend_from_slice(b"\0NEXTKEY\0");
    input.extend_from_slice(&next_key.to_bytes());
    if let Some(signature) = previous_signature {
        input.extend_from_slice(b"\0PREVSIG\0");
        input.extend_from_slice(signature.to_bytes());
    }
    if let Some(signature) = external_signature {
        input.extend_from_slice(b"\0EXTERNALSIG\0");
        input.extend_from_slice(signature.to_bytes());
    }
    input
}

/// V1 external (third-party) signature input.
pub(crate) fn external_signature_input_v1(
    payload: &[u8],
    previous_signature: &Signature,
) -> Vec<u8> {
    let mut input = Vec::new();
    input.extend_from_slice(b"\0EXTERNAL\0");
    input.extend_from_slice(b"\0VERSION\0");
    input.extend_from_slice(&CHAIN_VERSION.to_le_bytes());
    input.extend_from_slice(b"\0PAYLOAD\0");
    input.extend_from_slice(payload);
    input.extend_from_slice(b"\0PREVSIG\0");
    input.extend_from_slice(previous_signature.to_bytes());
    input
}

/// V0 block signature input, read-only.
fn block_signature_input_v0(
    payload: &[u8],
    next_key: &PublicKey,
    external_signature: Option<&Signature>,
) -> Vec<u8> {
    let mut input = payload.to_vec();
    if let Some(signature) = external_signature {
        input.extend_from_slice(signature.to_bytes());
    }
    input.extend_from_slice(&(next_key.algorithm().to_id() as u32).to_le_bytes());
    input.extend_from_slice(&next_key.to_bytes());
    input
}

/// V0 sealing input, kept for signature parity with existing sealed tokens.
fn seal_signature_input(block: &SignedBlock) -> Vec<u8> {
    let mut input = block.data.clone();
    input.extend_from_slice(&(block.next_key.algorithm().to_id() as u32).to_le_bytes());
    input.extend_from_slice(&block.next_key.to_bytes());
    input.extend_from_slice(block.signature.to_bytes());
    input
}

impl SerializedToken {
    /// Sign an authority payload under the root key, minting the first
    /// ephemeral next-keypair.
    pub fn new<T: CryptoRng + RngCore>(
        rng: &mut T,
        root: &PrivateKey,
        root_key_id: Option<u32>,
        next_algorithm: Algorithm,
        payload: Vec<u8>,
    ) -> Self {
        let next_keypair = KeyPair::generate(next_algorithm, rng);
        let next_key = next_keypair.public();
        let input = block_signature_input_v1(&payload, &next_key, None, None);
        let signature = root.sign(&input);
        Self {
            root_key_id,
            authority: SignedBlock {
                data: payload,
                next_key,
                signature,
                external_signature: None,
                version: Some(CHAIN_VERSION),
            },
            blocks: Vec::new(),
            proof: TokenProof::NextSecret(next_keypair.private()),
        }
    }

    /// The signature of the last block in the chain.
    pub fn last_signature(&self) -> &Signature {
        self.blocks
            .last()
            .map(|block| &block.signature)
            .unwrap_or(&self.authority.signature)
    }

    fn next_secret(&self) -> Result<&PrivateKey, error::Token> {
        match &self.proof {
            TokenProof::NextSecret(secret) => Ok(secret),
            TokenProof::FinalSignature(_) => Err(error::Token::CannotAttenuateSealedToken),
        }
    }

    /// Append a payload, signing with the current next-key secret and
    /// minting a fresh keypair. Open tokens only.
    pub fn append<T: CryptoRng + RngCore>(
        &self,
        rng: &mut T,
        next_algorithm: Algorithm,
        payload: Vec<u8>,
        external_signature: Option<ExternalSignature>,
    ) -> Result<Self, error::Token> {
        let secret = self.next_secret()?;
        let next_keypair = KeyPair::generate(next_algorithm, rng);
        let next_key = next_keypair.public();
        let input = block_signature_input_v1(
            &payload,
            &next_key,
            Some(self.last_signature()),
            external_signature.as_ref().map(|external| &external.signature),
        );
        let signature = secret.sign(&input);

        let mut blocks = self.blocks.clone();
        blocks.push(SignedBlock {
            data: payload,
            next_key,
            signature,
            external_signature,
            version: Some(CHAIN_VERSION),
        });
        tracing::debug!(blocks = blocks.len() + 1, "appended block to chain");
        Ok(Self {
            root_key_id: self.root_key_id,
            authority: self.authority.clone(),
            blocks,
            proof: TokenProof::NextSecret(next_keypair.private()),
        })
    }

    /// Consume the next-key secret into a terminal sealing signature.
    pub fn seal(&self) -> Result<Self, error::Token> {
        let secret = self.next_secret()?;
        let last = self.blocks.last().unwrap_or(&self.authority);
        let signature = secret.sign(&seal_signature_input(last));
        Ok(Self {
            root_key_id: self.root_key_id,
            authority: self.authority.clone(),
            blocks: self.blocks.clone(),
            proof: TokenProof::FinalSignature(signature),
        })
    }

    /// Walk the chain: root signature, per-block next-key signatures,
    /// external signatures, then the proof.
    pub fn verify(&self, root: &PublicKey) -> Result<(), error::Token> {
        if self.authority.external_signature.is_some() {
            return Err(Validation::ThirdPartySignedAuthority.into());
        }
        verify_block_signature(&self.authority, root, None)?;

        let mut previous = &self.authority;
        for block in &self.blocks {
            verify_block_signature(block, &previous.next_key, Some(&previous.signature))?;
            if let Some(external) = &block.external_signature {
                let input = external_signature_input_v1(&block.data, &previous.signature);
                external
                    .public_key
                    .verify(&input, &external.signature)
                    .map_err(|_| Validation::InvalidExternalSignature)?;
            }
            previous = block;
        }

        let last = self.blocks.last().unwrap_or(&self.authority);
        match &self.proof {
            TokenProof::NextSecret(secret) => {
                if secret.public() != last.next_key {
                    return Err(Validation::InvalidProof.into());
                }
            }
            TokenProof::FinalSignature(signature) => {
                last.next_key
                    .verify(&seal_signature_input(last), signature)
                    .map_err(|_| Validation::InvalidSealingSignature)?;
            }
        }
        tracing::debug!(blocks = self.blocks.len() + 1, "chain verified");
        Ok(())
    }

    /// Per-block signatures, usable as revocation identifiers.
    pub fn revocation_ids(&self) -> Vec<Vec<u8>> {
        std::iter::once(&self.authority)
            .chain(self.blocks.iter())
            .map(|block| block.signature.to_bytes().to_vec())
            .collect()
    }

    pub fn to_proto(&self) -> schema::Token {
        schema::Token {
            root_key_id: self.root_key_id,
            authority: Some(signed_block_to_proto(&self.authority)),
            blocks: self.blocks.iter().map(signed_block_to_proto).collect(),
            proof: Some(schema::Proof {
                content: Some(match &self.proof {
                    TokenProof::NextSecret(secret) => {
                        schema::proof::Content::NextSecret(secret.to_bytes().to_vec())
                    }
                    TokenProof::FinalSignature(signature) => {
                        schema::proof::Content::FinalSignature(signature.to_bytes().to_vec())
                    }
                }),
            }),
        }
    }

    pub fn from_proto(proto: &schema::Token) -> Result<Self, Validation> {
        let authority = proto
            .authority
            .as_ref()
            .ok_or(Validation::MissingAuthority)
            .and_then(signed_block_from_proto)?;
        let blocks = proto
            .blocks
            .iter()
            .map(signed_block_from_proto)
            .collect::<Result<Vec<_>, _>>()?;

        let last_key = blocks
            .last()
            .map(|block| block.next_key)
            .unwrap_or(authority.next_key);
        let proof = match proto
            .proof
            .as_ref()
            .and_then(|proof| proof.content.as_ref())
            .ok_or(Validation::MissingProof)?
        {
            schema::proof::Content::NextSecret(bytes) => {
                TokenProof::NextSecret(PrivateKey::from_bytes(bytes, last_key.algorithm())?)
            }
            schema::proof::Content::FinalSignature(bytes) => {
                TokenProof::FinalSignature(Signature::from_vec(bytes.clone()))
            }
        };
        Ok(Self {
            root_key_id: proto.root_key_id,
            authority,
            blocks,
            proof,
        })
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.to_proto().encode_to_vec()
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, Validation> {
        let proto = schema::Token::decode(bytes)?;
        Self::from_proto(&proto)
    }
}

fn verify_block_signature(
    block: &SignedBlock,
    verifying_key: &PublicKey,
    previous_signature: Option<&Signature>,
) -> Result<(), error::Token> {
    let input = match block.scheme_version() {
        0 => {
            if block.external_signature.is_some() {
                return Err(Validation::DeprecatedThirdPartySignature.into());
            }
            block_signature_input_v0(&block.data, &block.next_key, None)
        }
        1 => block_signature_input_v1(
            &block.data,
            &block.next_key,
            previous_signature,
            block
                .external_signature
                .as_ref()
                .map(|external| &external.signature),
        ),
        version => return Err(Validation::InvalidVersion(version).into()),
    };
    verifying_key
        .verify(&input, &block.signature)
        .map_err(|err| Validation::InvalidSignature(err.to_string()).into())
}

fn signed_block_to_proto(block: &SignedBlock) -> schema::SignedBlock {
    schema::SignedBlock {
        block: block.data.clone(),
        signature: block.signature.to_bytes().to_vec(),
        next_key: Some(convert::key_to_proto(&block.next_key)),
        version: block.version,
        external_signature: block.external_signature.as_ref().map(|external| {
            schema::ExternalSignature {
                signature: external.signature.to_bytes().to_vec(),
                public_key: Some(convert::key_to_proto(&external.public_key)),
            }
        }),
    }
}

fn signed_block_from_proto(proto: &schema::SignedBlock) -> Result<SignedBlock, Validation> {
    let next_key = proto
        .next_key
        .as_ref()
        .ok_or(Validation::MissingNextKey)
        .and_then(convert::proto_to_key)?;
    if let Some(version) = proto.version {
        if version > CHAIN_VERSION {
            return Err(Validation::InvalidVersion(version));
        }
    }
    let external_signature = proto
        .external_signature
        .as_ref()
        .map(|external| {
            let public_key = external
                .public_key
                .as_ref()
                .ok_or(Validation::MissingPublicKey)
                .and_then(convert::proto_to_key)?;
            Ok::<_, Validation>(ExternalSignature {
                signature: Signature::from_vec(external.signature.clone()),
                public_key,
            })
        })
        .transpose()?;
    Ok(SignedBlock {
        data: proto.block.clone(),
        signature: Signature::from_vec(proto.signature.clone()),
        next_key,
        external_signature,
        version: proto.version,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn root(rng: &mut StdRng) -> KeyPair {
        KeyPair::generate(Algorithm::Ed25519, rng)
    }

    #[test]
    fn chain_signs_and_verifies() {
        let mut rng = StdRng::seed_from_u64(42);
        let root = root(&mut rng);
        let token = SerializedToken::new(
            &mut rng,
            &root.private(),
            None,
            Algorithm::Ed25519,
            b"authority".to_vec(),
        );
        token.verify(&root.public()).unwrap();

        let token = token
            .append(&mut rng, Algorithm::Ed25519, b"block 1".to_vec(), None)
            .unwrap();
        token.verify(&root.public()).unwrap();

        // mixed-algorithm chain
        let token = token
            .append(&mut rng, Algorithm::Secp256r1, b"block 2".to_vec(), None)
            .unwrap();
        let token = token
            .append(&mut rng, Algorithm::Ed25519, b"block 3".to_vec(), None)
            .unwrap();
        token.verify(&root.public()).unwrap();
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let mut rng = StdRng::seed_from_u64(43);
        let root = root(&mut rng);
        let token = SerializedToken::new(
            &mut rng,
            &root.private(),
            None,
            Algorithm::Ed25519,
            b"authority".to_vec(),
        );
        let token = token
            .append(&mut rng, Algorithm::Ed25519, b"block 1".to_vec(), None)
            .unwrap();

        let mut tampered = token.clone();
        tampered.blocks[0].data = b"block 1 altered".to_vec();
        assert!(matches!(
            tampered.verify(&root.public()),
            Err(error::Token::Validation(Validation::InvalidSignature(_)))
        ));
    }

    #[test]
    fn swapped_blocks_are_rejected() {
        let mut rng = StdRng::seed_from_u64(44);
        let root = root(&mut rng);
        let token = SerializedToken::new(
            &mut rng,
            &root.private(),
            None,
            Algorithm::Ed25519,
            b"authority".to_vec(),
        );
        let token = token
            .append(&mut rng, Algorithm::Ed25519, b"block 1".to_vec(), None)
            .unwrap();
        let token = token
            .append(&mut rng, Algorithm::Ed25519, b"block 2".to_vec(), None)
            .unwrap();

        let mut swapped = token.clone();
        swapped.blocks.swap(0, 1);
        assert!(swapped.verify(&root.public()).is_err());
    }

    #[test]
    fn wrong_root_key_is_rejected() {
        let mut rng = StdRng::seed_from_u64(45);
        let root = root(&mut rng);
        let other = KeyPair::generate(Algorithm::Ed25519, &mut rng);
        let token = SerializedToken::new(
            &mut rng,
            &root.private(),
            None,
            Algorithm::Ed25519,
            b"authority".to_vec(),
        );
        assert!(token.verify(&other.public()).is_err());
    }

    #[test]
    fn sealing_is_terminal_and_verifies() {
        let mut rng = StdRng::seed_from_u64(46);
        let root = root(&mut rng);
        let token = SerializedToken::new(
            &mut rng,
            &root.private(),
            None,
            Algorithm::Ed25519,
            b"authority".to_vec(),
        );
        let sealed = token.seal().unwrap();
        sealed.verify(&root.public()).unwrap();

        assert!(matches!(
            sealed.append(&mut rng, Algorithm::Ed25519, b"more".to_vec(), None),
            Err(error::Token::CannotAttenuateSealedToken)
        ));
        assert!(matches!(
            sealed.seal(),
            Err(error::Token::CannotAttenuateSealedToken)
        ));
    }

    #[test]
    fn third_party_signed_authority_is_rejected() {
        let mut rng = StdRng::seed_from_u64(50);
        let root = root(&mut rng);
        let external = KeyPair::generate(Algorithm::Ed25519, &mut rng);
        let mut token = SerializedToken::new(
            &mut rng,
            &root.private(),
            None,
            Algorithm::Ed25519,
            b"authority".to_vec(),
        );
        token.authority.external_signature = Some(ExternalSignature {
            signature: external.sign(b"anything"),
            public_key: external.public(),
        });
        assert!(matches!(
            token.verify(&root.public()),
            Err(error::Token::Validation(
                Validation::ThirdPartySignedAuthority
            ))
        ));
    }

    #[test]
    fn proto_roundtrip_is_byte_exact() {
        let mut rng = StdRng::seed_from_u64(47);
        let root = root(&mut rng);
        let token = SerializedToken::new(
            &mut rng,
            &root.private(),
            Some(4),
            Algorithm::Ed25519,
            b"authority".to_vec(),
        )
        .append(&mut rng, Algorithm::Secp256r1, b"block 1".to_vec(), None)
        .unwrap();

        let bytes = token.to_vec();
        let decoded = SerializedToken::from_slice(&bytes).unwrap();
        decoded.verify(&root.public()).unwrap();
        assert_eq!(decoded.to_vec(), bytes);
        assert_eq!(decoded.root_key_id, Some(4));
    }

    #[test]
    fn proof_must_match_the_last_next_key() {
        let mut rng = StdRng::seed_from_u64(48);
        let root = root(&mut rng);
        let token = SerializedToken::new(
            &mut rng,
            &root.private(),
            None,
            Algorithm::Ed25519,
            b"authority".to_vec(),
        );
        let mut wrong = token.clone();
        wrong.proof = TokenProof::NextSecret(
            KeyPair::generate(Algorithm::Ed25519, &mut rng).private(),
        );
        assert!(matches!(
            wrong.verify(&root.public()),
            Err(error::Token::Validation(Validation::InvalidProof))
        ));
    }

    #[test]
    fn revocation_ids_are_the_block_signatures() {
        let mut rng = StdRng::seed_from_u64(49);
        let root = root(&mut rng);
        let token = SerializedToken::new(
            &mut rng,
            &root.private(),
            None,
            Algorithm::Ed25519,
            b"authority".to_vec(),
        )
        .append(&mut rng, Algorithm::Ed25519, b"block 1".to_vec(), None)
        .unwrap();

        let ids = token.revocation_ids();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[0], token.authority.signature.to_bytes());
        assert_eq!(ids[1], token.blocks[0].signature.to_bytes());
    }
}
