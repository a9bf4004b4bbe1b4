//! Third-party block exchange.
//!
//! Delegated attenuation is a detachable round trip: the token holder sends
//! a [`ThirdPartyRequest`] carrying the last block signature, the third
//! party assembles a block in an isolated interning table and co-signs it,
//! and the holder attaches the returned [`ThirdPartyBlock`] to the chain.

use crate::builder::BlockBuilder;
use crate::crypto::{PrivateKey, PublicKeys, Signature};
use crate::error::{self, Validation};
use crate::format::{convert, external_signature_input_v1, schema, ExternalSignature};
use base64::Engine;
use prost::Message;
use sigil_datalog::SymbolTable;

/// What a token holder sends to a third party for co-signing.
#[derive(Debug, Clone)]
pub struct ThirdPartyRequest {
    previous_signature: Signature,
}

impl ThirdPartyRequest {
    pub(crate) fn new(previous_signature: Signature) -> Self {
        Self { previous_signature }
    }

    /// The wire encoding of this request.
    pub fn serialize(&self) -> Vec<u8> {
        schema::ThirdPartyBlockRequest {
            previous_signature: self.previous_signature.to_bytes().to_vec(),
        }
        .encode_to_vec()
    }

    /// The unpadded base64url encoding of this request.
    pub fn serialize_base64(&self) -> String {
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(self.serialize())
    }

    /// Decode a request.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, error::Token> {
        let proto = schema::ThirdPartyBlockRequest::decode(bytes).map_err(Validation::from)?;
        Ok(Self {
            previous_signature: Signature::from_vec(proto.previous_signature),
        })
    }

    /// Decode a base64url-encoded request.
    pub fn from_base64(encoded: impl AsRef<[u8]>) -> Result<Self, error::Token> {
        Self::from_bytes(&super::decode_base64url(encoded.as_ref())?)
    }

    /// Build and co-sign a block answering this request.
    ///
    /// The block payload is interned in a fresh, isolated table: nothing
    /// from the requesting token's tables leaks into it, and its symbols
    /// stay private to the block.
    pub fn create_block(
        &self,
        private: &PrivateKey,
        block: BlockBuilder,
    ) -> Result<ThirdPartyBlock, error::Token> {
        let mut symbols = SymbolTable::new();
        let mut keys = PublicKeys::new();
        let block = block.build(&mut symbols, &mut keys)?;
        let payload = convert::token_block_to_proto(&block).encode_to_vec();

        let input = external_signature_input_v1(&payload, &self.previous_signature);
        let signature = private.sign(&input);
        Ok(ThirdPartyBlock {
            payload,
            external_signature: ExternalSignature {
                signature,
                public_key: private.public(),
            },
        })
    }
}

/// A co-signed block, ready to be attached to the requesting token.
#[derive(Debug, Clone)]
pub struct ThirdPartyBlock {
    payload: Vec<u8>,
    external_signature: ExternalSignature,
}

impl ThirdPartyBlock {
    pub(crate) fn into_parts(self) -> (Vec<u8>, ExternalSignature) {
        (self.payload, self.external_signature)
    }

    /// The wire encoding of this block.
    pub fn serialize(&self) -> Vec<u8> {
        schema::ThirdPartyBlockContents {
            payload: self.payload.clone(),
            external_signature: Some(schema::ExternalSignature {
                signature: self.external_signature.signature.to_bytes().to_vec(),
                public_key: Some(convert::key_to_proto(&self.external_signature.public_key)),
            }),
        }
        .encode_to_vec()
    }

    /// The unpadded base64url encoding of this block.
    pub fn serialize_base64(&self) -> String {
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(self.serialize())
    }

    /// Decode a third-party block.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, error::Token> {
        let proto = schema::ThirdPartyBlockContents::decode(bytes).map_err(Validation::from)?;
        let external = proto
            .external_signature
            .ok_or(Validation::MissingPublicKey)?;
        let public_key = external
            .public_key
            .as_ref()
            .ok_or(Validation::MissingPublicKey)
            .and_then(convert::proto_to_key)?;
        Ok(Self {
            payload: proto.payload,
            external_signature: ExternalSignature {
                signature: Signature::from_vec(external.signature),
                public_key,
            },
        })
    }

    /// Decode a base64url-encoded third-party block.
    pub fn from_base64(encoded: impl AsRef<[u8]>) -> Result<Self, error::Token> {
        Self::from_bytes(&super::decode_base64url(encoded.as_ref())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{Algorithm, KeyPair};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn request_and_block_roundtrip_the_wire() {
        let mut rng = StdRng::seed_from_u64(11);
        let request = ThirdPartyRequest::new(Signature::from_vec(vec![7; 64]));
        let bytes = request.serialize();
        let decoded = ThirdPartyRequest::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.serialize(), bytes);

        let external = KeyPair::generate(Algorithm::Ed25519, &mut rng);
        let block = request
            .create_block(
                &external.private(),
                BlockBuilder::new()
                    .check("check if group(2);")
                    .unwrap(),
            )
            .unwrap();
        let bytes = block.serialize();
        let decoded = ThirdPartyBlock::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.serialize(), bytes);

        let encoded = block.serialize_base64();
        ThirdPartyBlock::from_base64(&encoded).unwrap();
    }
}
