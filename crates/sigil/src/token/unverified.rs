//! Tokens decoded without signature validation.
//!
//! An [`UnverifiedToken`] supports inspection and offline attenuation when
//! the root public key is not at hand; [`UnverifiedToken::verify`] upgrades
//! it into a [`Token`]. Nothing read from an unverified token should be
//! trusted before that upgrade.

use super::{parse_token_blocks, Block, RootKeyProvider, Token};
use crate::builder::BlockBuilder;
use crate::crypto::{Algorithm, PublicKeys};
use crate::error;
use crate::format::{convert, SerializedToken};
use base64::Engine;
use prost::Message;
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use sigil_datalog::SymbolTable;

/// A decoded token whose signatures have not been checked.
#[derive(Debug, Clone)]
pub struct UnverifiedToken {
    root_key_id: Option<u32>,
    symbols: SymbolTable,
    public_keys: PublicKeys,
    blocks: Vec<Block>,
    container: SerializedToken,
}

impl UnverifiedToken {
    /// Decode a token without verifying its chain.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, error::Token> {
        let container = SerializedToken::from_slice(bytes).map_err(error::Token::from)?;
        let (symbols, public_keys, blocks) = parse_token_blocks(&container)?;
        Ok(Self {
            root_key_id: container.root_key_id,
            symbols,
            public_keys,
            blocks,
            container,
        })
    }

    /// Decode a base64url-encoded token without verifying its chain.
    pub fn from_base64(encoded: impl AsRef<[u8]>) -> Result<Self, error::Token> {
        Self::from_bytes(&super::decode_base64url(encoded.as_ref())?)
    }

    /// Check every signature and upgrade into a [`Token`].
    pub fn verify(self, root_key: impl RootKeyProvider) -> Result<Token, error::Token> {
        let root = root_key.choose(self.container.root_key_id)?;
        self.container.verify(&root)?;
        Ok(Token {
            root_key_id: self.root_key_id,
            symbols: self.symbols,
            public_keys: self.public_keys,
            blocks: self.blocks,
            container: self.container,
        })
    }

    /// The wire encoding of this token.
    pub fn serialize(&self) -> Vec<u8> {
        self.container.to_vec()
    }

    /// The unpadded base64url encoding of this token.
    pub fn serialize_base64(&self) -> String {
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(self.serialize())
    }

    /// Append an attenuation block; the chain stays unverified.
    pub fn attenuate(&self, block: BlockBuilder) -> Result<Self, error::Token> {
        self.attenuate_with_rng(&mut OsRng, Algorithm::Ed25519, block)
    }

    /// Append an attenuation block with explicit randomness and algorithm.
    pub fn attenuate_with_rng<T: CryptoRng + RngCore>(
        &self,
        rng: &mut T,
        next_algorithm: Algorithm,
        block: BlockBuilder,
    ) -> Result<Self, error::Token> {
        let mut symbols = self.symbols.clone();
        let mut public_keys = self.public_keys.clone();
        let block = block.build(&mut symbols, &mut public_keys)?;
        let payload = convert::token_block_to_proto(&block).encode_to_vec();
        let container = self.container.append(rng, next_algorithm, payload, None)?;

        let mut blocks = self.blocks.clone();
        blocks.push(block);
        Ok(Self {
            root_key_id: self.root_key_id,
            symbols,
            public_keys,
            blocks,
            container,
        })
    }

    /// Seal the token, making further attenuation impossible.
    pub fn seal(&self) -> Result<Self, error::Token> {
        let container = self.container.seal()?;
        Ok(Self {
            root_key_id: self.root_key_id,
            symbols: self.symbols.clone(),
            public_keys: self.public_keys.clone(),
            blocks: self.blocks.clone(),
            container,
        })
    }

    /// Number of blocks in the chain.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Per-block signatures, usable as revocation identifiers.
    pub fn revocation_identifiers(&self) -> Vec<Vec<u8>> {
        self.container.revocation_ids()
    }

    /// Print the datalog source of one block.
    pub fn print_block_source(&self, index: usize) -> Result<String, error::Token> {
        super::print_block_source_at(&self.blocks, &self.symbols, &self.public_keys, index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{fact, int};
    use crate::crypto::KeyPair;
    use crate::error::Validation;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn open_token(seed: u64) -> (KeyPair, Token) {
        let mut rng = StdRng::seed_from_u64(seed);
        let root = KeyPair::generate(Algorithm::Ed25519, &mut rng);
        let token = Token::new_with_rng(
            &mut rng,
            &root.private(),
            None,
            Algorithm::Ed25519,
            BlockBuilder::new().fact(fact("user", [int(1234)])).unwrap(),
        )
        .unwrap();
        (root, token)
    }

    #[test]
    fn decode_attenuate_then_verify() {
        let mut rng = StdRng::seed_from_u64(21);
        let (root, token) = open_token(20);
        let unverified = UnverifiedToken::from_bytes(&token.serialize()).unwrap();

        let attenuated = unverified
            .attenuate_with_rng(
                &mut rng,
                Algorithm::Ed25519,
                BlockBuilder::new()
                    .check("check if operation(\"read\");")
                    .unwrap(),
            )
            .unwrap();
        assert_eq!(attenuated.block_count(), 2);

        let verified = attenuated.verify(root.public()).unwrap();
        assert_eq!(verified.block_count(), 2);
    }

    #[test]
    fn verify_rejects_the_wrong_key() {
        let (_, token) = open_token(22);
        let mut rng = StdRng::seed_from_u64(23);
        let other = KeyPair::generate(Algorithm::Ed25519, &mut rng);
        let unverified = UnverifiedToken::from_bytes(&token.serialize()).unwrap();
        assert!(unverified.verify(other.public()).is_err());
    }

    #[test]
    fn tampering_is_caught_at_verify_time() {
        let (root, token) = open_token(24);
        let mut bytes = token.serialize();
        // decoding tolerates the bit flip in a signature, verify does not
        let position = bytes.len() - 1;
        bytes[position] ^= 0x01;
        if let Ok(unverified) = UnverifiedToken::from_bytes(&bytes) {
            assert!(unverified.verify(root.public()).is_err());
        }
    }

    #[test]
    fn provider_errors_surface() {
        let (_, token) = open_token(25);
        let unverified = UnverifiedToken::from_bytes(&token.serialize()).unwrap();
        let provider = |id: Option<u32>| -> Result<crate::crypto::PublicKey, error::Token> {
            Err(error::Token::from(Validation::UnknownRootKey(id)))
        };
        let result = unverified.verify(provider);
        assert!(matches!(
            result,
            Err(error::Token::Validation(Validation::UnknownRootKey(None)))
        ));
    }

}
