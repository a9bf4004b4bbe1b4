//! # Sigil - Attenuable Authorization Tokens
//!
//! **Purpose**: bearer tokens whose holder can irreversibly narrow their
//! authority offline, verified by evaluating a small logic program.
//!
//! A token is a cryptographically chained sequence of blocks. Each block
//! carries a fragment of a datalog program (facts, rules, checks) and the
//! public half of a freshly minted keypair; the block is signed by the
//! previous block's keypair, and the chain terminates in either the last
//! ephemeral secret (an *open* token, which its holder can still attenuate)
//! or a sealing signature (a *sealed* one). Any verifier holding the root
//! public key can validate the whole chain offline.
//!
//! Authorization is decided by the [`Authorizer`]: it combines the token's
//! program with the verifier's own facts, checks and `allow`/`deny`
//! policies, runs the combined program to a fixpoint, and reports exactly
//! which statement denied access when it fails.
//!
//! # Example
//!
//! ```ignore
//! use sigil::{Authorizer, BlockBuilder, KeyPair, Token};
//!
//! let root = KeyPair::generate(sigil::Algorithm::Ed25519, &mut rng);
//! let token = Token::new(
//!     &root.private(),
//!     BlockBuilder::new().fact("user(1234);")?,
//! )?;
//!
//! // the holder narrows the token without contacting the issuer
//! let token = token.attenuate(
//!     BlockBuilder::new().check("check if operation(\"read\");")?,
//! )?;
//!
//! // the verifier decides
//! let mut authorizer = Authorizer::new();
//! authorizer.add_code(r#"operation("read"); allow if user(1234);"#)?;
//! token.authorize(&authorizer)?;
//! ```
//!
//! Third-party blocks let an external authority co-sign an attenuation
//! without seeing the token: see [`Token::third_party_request`]. Tokens
//! decoded without a root key use [`UnverifiedToken`] and must be upgraded
//! with [`UnverifiedToken::verify`] before anything they say is trusted.

#![forbid(unsafe_code)]

mod authorizer;
pub mod builder;
pub mod crypto;
pub mod error;
mod format;
mod parser;
mod token;

pub use authorizer::{Authorizer, AuthorizerLimits};
pub use builder::BlockBuilder;
pub use crypto::{Algorithm, KeyPair, PrivateKey, PublicKey};
pub use token::{
    RootKeyProvider, ThirdPartyBlock, ThirdPartyRequest, Token, UnverifiedToken,
};

/// The datalog engine, re-exported for direct use.
pub use sigil_datalog as datalog;
