//! The token façade.
//!
//! A [`Token`] is an immutable, verified chain of blocks. Attenuation and
//! sealing return new tokens; the original stays usable. Everything a
//! verifier needs is public information: the root public key (chosen
//! through a [`RootKeyProvider`]) and the encoded token itself.

pub(crate) mod third_party;
pub(crate) mod unverified;

use crate::authorizer::Authorizer;
use crate::builder::{BlockBuilder, Check};
use crate::crypto::{Algorithm, PrivateKey, PublicKey, PublicKeys};
use crate::error::{self, Validation};
use crate::format::{convert, schema, SerializedToken};
use base64::Engine;
use prost::Message;
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use sigil_datalog as datalog;
use sigil_datalog::SymbolTable;

pub use third_party::{ThirdPartyBlock, ThirdPartyRequest};
pub use unverified::UnverifiedToken;

/// Parsed datalog payload of one chain block.
///
/// Interned indexes refer to the primary symbol table for first-party
/// blocks, or to the block's own isolated table when `external_key` is set.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Block {
    /// Symbols this block introduced
    pub symbols: Vec<String>,
    /// Public keys this block introduced
    pub public_keys: Vec<PublicKey>,
    pub context: Option<String>,
    pub version: u32,
    pub facts: Vec<datalog::Fact>,
    pub rules: Vec<datalog::Rule>,
    pub checks: Vec<datalog::Check>,
    pub scopes: Vec<datalog::Scope>,
    /// The third-party key whose external signature covers this block
    pub external_key: Option<PublicKey>,
}

/// Chooses the root public key used to verify the authority block.
///
/// Tokens may carry a root key identifier so verifiers can rotate keys;
/// the provider resolves that identifier.
pub trait RootKeyProvider {
    /// Resolve the verification key for the given identifier.
    fn choose(&self, root_key_id: Option<u32>) -> Result<PublicKey, error::Token>;
}

impl RootKeyProvider for PublicKey {
    fn choose(&self, _root_key_id: Option<u32>) -> Result<PublicKey, error::Token> {
        Ok(*self)
    }
}

impl<F> RootKeyProvider for F
where
    F: Fn(Option<u32>) -> Result<PublicKey, error::Token>,
{
    fn choose(&self, root_key_id: Option<u32>) -> Result<PublicKey, error::Token> {
        self(root_key_id)
    }
}

/// A verified bearer token.
#[derive(Debug, Clone)]
pub struct Token {
    pub(crate) root_key_id: Option<u32>,
    /// Primary symbol table: defaults plus every first-party block
    pub(crate) symbols: SymbolTable,
    /// Primary public key table
    pub(crate) public_keys: PublicKeys,
    /// Parsed blocks; index 0 is the authority block
    pub(crate) blocks: Vec<Block>,
    pub(crate) container: SerializedToken,
}

impl Token {
    /// Create a token from a root private key and an authority block,
    /// using the system RNG and an Ed25519 next-keypair.
    pub fn new(root: &PrivateKey, block: BlockBuilder) -> Result<Self, error::Token> {
        Self::new_with_rng(&mut OsRng, root, None, Algorithm::Ed25519, block)
    }

    /// Create a token with explicit randomness, root key identifier, and
    /// next-keypair algorithm.
    pub fn new_with_rng<T: CryptoRng + RngCore>(
        rng: &mut T,
        root: &PrivateKey,
        root_key_id: Option<u32>,
        next_algorithm: Algorithm,
        block: BlockBuilder,
    ) -> Result<Self, error::Token> {
        let mut symbols = SymbolTable::new();
        let mut public_keys = PublicKeys::new();
        let block = block.build(&mut symbols, &mut public_keys)?;
        let payload = convert::token_block_to_proto(&block).encode_to_vec();
        let container = SerializedToken::new(rng, root, root_key_id, next_algorithm, payload);
        Ok(Self {
            root_key_id,
            symbols,
            public_keys,
            blocks: vec![block],
            container,
        })
    }

    /// Decode and verify an encoded token.
    pub fn from_bytes(
        bytes: &[u8],
        root_key: impl RootKeyProvider,
    ) -> Result<Self, error::Token> {
        let container = SerializedToken::from_slice(bytes).map_err(error::Token::from)?;
        let root = root_key.choose(container.root_key_id)?;
        container.verify(&root)?;
        Self::from_container(container)
    }

    /// Decode and verify a base64url-encoded token.
    pub fn from_base64(
        encoded: impl AsRef<[u8]>,
        root_key: impl RootKeyProvider,
    ) -> Result<Self, error::Token> {
        Self::from_bytes(&decode_base64url(encoded.as_ref())?, root_key)
    }

    pub(crate) fn from_container(container: SerializedToken) -> Result<Self, error::Token> {
        let (symbols, public_keys, blocks) = parse_token_blocks(&container)?;
        Ok(Self {
            root_key_id: container.root_key_id,
            symbols,
            public_keys,
            blocks,
            container,
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

    /// Append an attenuation block, using the system RNG and an Ed25519
    /// next-keypair. Open tokens only.
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
        let container = self
            .container
            .append(rng, next_algorithm, payload, None)?;

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

    /// Produce the request a third party needs to co-sign a block for this
    /// token.
    pub fn third_party_request(&self) -> Result<ThirdPartyRequest, error::Token> {
        Ok(ThirdPartyRequest::new(
            self.container.last_signature().clone(),
        ))
    }

    /// Attach a third-party block, using the system RNG and an Ed25519
    /// next-keypair.
    pub fn attenuate_third_party(&self, block: ThirdPartyBlock) -> Result<Self, error::Token> {
        self.attenuate_third_party_with_rng(&mut OsRng, Algorithm::Ed25519, block)
    }

    /// Attach a third-party block with explicit randomness and algorithm.
    ///
    /// The external signature is checked against this token's last block
    /// signature before the block joins the chain.
    pub fn attenuate_third_party_with_rng<T: CryptoRng + RngCore>(
        &self,
        rng: &mut T,
        next_algorithm: Algorithm,
        block: ThirdPartyBlock,
    ) -> Result<Self, error::Token> {
        let (payload, external) = block.into_parts();
        let input = crate::format::external_signature_input_v1(
            &payload,
            self.container.last_signature(),
        );
        external
            .public_key
            .verify(&input, &external.signature)
            .map_err(|_| Validation::InvalidExternalSignature)?;

        let proto = schema::Block::decode(&payload[..]).map_err(Validation::from)?;
        let mut parsed = convert::proto_block_to_token_block(&proto)?;
        validate_isolated_tables(&parsed)?;
        parsed.external_key = Some(external.public_key);

        let container = self
            .container
            .append(rng, next_algorithm, payload, Some(external))?;
        let mut blocks = self.blocks.clone();
        blocks.push(parsed);
        Ok(Self {
            root_key_id: self.root_key_id,
            symbols: self.symbols.clone(),
            public_keys: self.public_keys.clone(),
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

    /// True when the proof is a terminal sealing signature.
    pub fn is_sealed(&self) -> bool {
        matches!(
            self.container.proof,
            crate::format::TokenProof::FinalSignature(_)
        )
    }

    /// Run the authorizer against this token; on success returns the index
    /// of the matching `allow` policy.
    pub fn authorize(&self, authorizer: &Authorizer) -> Result<usize, error::Token> {
        authorizer.authorize(self)
    }

    /// Evaluate a single check against this token's facts, without
    /// requiring an allow policy. Accepts a [`Check`] or source text.
    pub fn query<C>(&self, check: C) -> Result<bool, error::Token>
    where
        C: TryInto<Check>,
        error::Token: From<<C as TryInto<Check>>::Error>,
    {
        Authorizer::new().query(self, check)
    }

    /// Number of blocks in the chain, the authority block included.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// The root key identifier carried by the token, if any.
    pub fn root_key_id(&self) -> Option<u32> {
        self.root_key_id
    }

    /// Context string attached to a block.
    pub fn block_context(&self, index: usize) -> Option<String> {
        self.blocks.get(index).and_then(|block| block.context.clone())
    }

    /// Per-block signatures; verifiers match these against revocation
    /// lists and the synthetic `revocation_id` facts.
    pub fn revocation_identifiers(&self) -> Vec<Vec<u8>> {
        self.container.revocation_ids()
    }

    /// Print the datalog source of one block.
    pub fn print_block_source(&self, index: usize) -> Result<String, error::Token> {
        print_block_source_at(&self.blocks, &self.symbols, &self.public_keys, index)
    }
}

/// Symbol table resolving a block's interned indexes: the primary table for
/// first-party blocks, the block's isolated table otherwise.
pub(crate) fn block_symbol_table(block: &Block, primary: &SymbolTable) -> SymbolTable {
    if block.external_key.is_some() {
        SymbolTable::from_symbols(block.symbols.clone())
    } else {
        primary.clone()
    }
}

/// Key table resolving a block's interned key indexes.
pub(crate) fn block_key_table(block: &Block, primary: &PublicKeys) -> PublicKeys {
    if block.external_key.is_some() {
        let mut keys = PublicKeys::new();
        for key in &block.public_keys {
            keys.insert(key);
        }
        keys
    } else {
        primary.clone()
    }
}

pub(crate) fn print_block_source_at(
    blocks: &[Block],
    primary_symbols: &SymbolTable,
    primary_keys: &PublicKeys,
    index: usize,
) -> Result<String, error::Token> {
    let block = blocks
        .get(index)
        .ok_or_else(|| Validation::DeserializationError(format!("no block {index}")))?;
    let symbols = block_symbol_table(block, primary_symbols);
    let keys = block_key_table(block, primary_keys);
    print_block(block, &symbols, &keys)
}

/// Decode every block payload, extending the primary tables with
/// first-party symbols and keys, and validating isolated third-party
/// tables.
pub(crate) fn parse_token_blocks(
    container: &SerializedToken,
) -> Result<(SymbolTable, PublicKeys, Vec<Block>), error::Token> {
    let mut symbols = SymbolTable::new();
    let mut public_keys = PublicKeys::new();
    let mut blocks = Vec::new();

    let signed_blocks = std::iter::once(&container.authority).chain(container.blocks.iter());
    for signed in signed_blocks {
        let proto = schema::Block::decode(&signed.data[..]).map_err(Validation::from)?;
        let mut block = convert::proto_block_to_token_block(&proto)?;
        match &signed.external_signature {
            Some(external) => {
                validate_isolated_tables(&block)?;
                block.external_key = Some(external.public_key);
            }
            None => {
                symbols.extend(&block.symbols).map_err(Validation::from)?;
                public_keys.extend(&block.public_keys)?;
            }
        }
        blocks.push(block);
    }
    Ok((symbols, public_keys, blocks))
}

/// A third-party block declares its own tables from scratch; duplicates
/// within them (or against the default symbols) are invalid.
fn validate_isolated_tables(block: &Block) -> Result<(), error::Token> {
    let mut symbols = SymbolTable::new();
    symbols.extend(&block.symbols).map_err(Validation::from)?;
    let mut keys = PublicKeys::new();
    keys.extend(&block.public_keys)?;
    Ok(())
}

fn print_block(
    block: &Block,
    symbols: &SymbolTable,
    keys: &PublicKeys,
) -> Result<String, error::Token> {
    use crate::builder;

    let mut lines = Vec::new();
    for fact in &block.facts {
        lines.push(format!("{};", builder::Fact::from_datalog(fact, symbols)?));
    }
    for rule in &block.rules {
        lines.push(format!(
            "{};",
            builder::Rule::from_datalog(rule, symbols, keys)?
        ));
    }
    for check in &block.checks {
        lines.push(format!(
            "{};",
            builder::Check::from_datalog(check, symbols, keys)?
        ));
    }
    Ok(lines.join("\n"))
}

/// RFC 4648 base64url, unpadded on output and padding-tolerant on input.
pub(crate) fn decode_base64url(encoded: &[u8]) -> Result<Vec<u8>, Validation> {
    let trimmed: &[u8] = {
        let mut end = encoded.len();
        while end > 0 && encoded[end - 1] == b'=' {
            end -= 1;
        }
        &encoded[..end]
    };
    base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(trimmed)
        .map_err(|err| Validation::InvalidBase64UrlString(err.to_string()))
}
