//! Boundary errors.
//!
//! Five orthogonal kinds surface from the public API: validation (structural
//! defects found while decoding or checking signatures), attenuation on a
//! sealed token, datalog parse errors, evaluation errors from the resolution
//! engine, and the authorization verdict itself. Everything is returned by
//! value; nothing is recovered internally.

use std::fmt;

pub use sigil_datalog::Evaluation;

/// The single error type returned by token-level operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Token {
    /// Structural defect found during decoding or signature checking
    #[error(transparent)]
    Validation(#[from] Validation),

    /// The token is sealed; its chain can no longer grow
    #[error("cannot attenuate a sealed token")]
    CannotAttenuateSealedToken,

    /// The datalog source text could not be parsed
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The resolution engine failed while evaluating the program
    #[error(transparent)]
    Evaluation(#[from] Evaluation),

    /// The program evaluated cleanly and denied authorization
    #[error(transparent)]
    Authorization(#[from] AuthorizationError),
}

/// Structural defects in an encoded token.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Validation {
    /// The encoded token has no authority block
    #[error("missing authority block")]
    MissingAuthority,

    /// The encoded token has no proof section
    #[error("missing proof")]
    MissingProof,

    /// A signed block is missing its next-block public key
    #[error("missing next key")]
    MissingNextKey,

    /// A message referencing a public key does not carry one
    #[error("missing public key")]
    MissingPublicKey,

    /// A block signature did not verify
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// The terminal sealing signature did not verify
    #[error("invalid sealing signature")]
    InvalidSealingSignature,

    /// A third-party signature did not verify
    #[error("invalid external signature")]
    InvalidExternalSignature,

    /// The proof section contradicts the chain
    #[error("invalid proof")]
    InvalidProof,

    /// Unrecognized block or signature-scheme version
    #[error("invalid version: {0}")]
    InvalidVersion(u32),

    /// The root key resolver knows no key for this identifier
    #[error("unknown root key id: {0:?}")]
    UnknownRootKey(Option<u32>),

    /// A term referenced a symbol index missing from the table
    #[error("unknown symbol index: {0}")]
    UnknownSymbol(u64),

    /// A scope referenced a public key index missing from the table
    #[error("unknown public key index: {0}")]
    UnknownPublicKey(u64),

    /// A block redeclared a symbol already present in the table
    #[error("duplicate symbol: {0}")]
    DuplicateSymbol(String),

    /// A block redeclared a public key already present in the table
    #[error("duplicate public key: {0}")]
    DuplicatePublicKey(String),

    /// A set may not contain another set
    #[error("sets cannot be nested")]
    SetInSet,

    /// A map declared the same key twice
    #[error("duplicate map key")]
    DuplicateMapKey,

    /// A fact carried a variable term
    #[error("facts cannot hold variables")]
    VariableInFact,

    /// A rule head used a variable that no body predicate binds
    #[error("rule head variables have no binding site: {0}")]
    UnboundVariableInHead(String),

    /// The authority block may not carry a third-party signature
    #[error("the authority block cannot be signed by a third party")]
    ThirdPartySignedAuthority,

    /// External signatures on legacy-scheme blocks are not accepted
    #[error("deprecated third-party signature scheme")]
    DeprecatedThirdPartySignature,

    /// The encoded token is not valid base64url
    #[error("invalid base64url string: {0}")]
    InvalidBase64UrlString(String),

    /// A byte-string literal is not valid hexadecimal
    #[error("invalid hex data")]
    InvalidHexData,

    /// A check or policy query must use the reserved `query` head
    #[error("invalid query head")]
    InvalidQueryHead,

    /// A key or signature had the wrong length
    #[error("invalid key size: {0}")]
    InvalidKeySize(usize),

    /// Key bytes did not decode to a valid point
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// The record encoding could not be decoded
    #[error("deserialization error: {0}")]
    DeserializationError(String),
}

impl From<sigil_datalog::DuplicateSymbol> for Validation {
    fn from(err: sigil_datalog::DuplicateSymbol) -> Self {
        Validation::DuplicateSymbol(err.0)
    }
}

impl From<prost::DecodeError> for Validation {
    fn from(err: prost::DecodeError) -> Self {
        Validation::DeserializationError(err.to_string())
    }
}

/// Errors from the text-form datalog parser.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// The lexer could not form a token at this byte offset
    #[error("lexing error at offset {position}")]
    ErrorInLexing {
        /// Byte offset of the offending character
        position: usize,
    },

    /// A statement is not terminated by `;`
    #[error("missing semicolon")]
    MissingSemicolon,

    /// An opened parenthesis is never closed
    #[error("missing right parenthesis")]
    MissingRightParen,

    /// The source ended in the middle of a statement
    #[error("unexpected end of code")]
    UnexpectedEndOfCode,

    /// The statement is not a fact, rule, or check
    #[error("unknown block element: {0}")]
    UnknownBlockElement(String),

    /// `check` must be followed by `if` or `all`
    #[error("unknown check kind: {0}")]
    UnknownCheck(String),

    /// Unrecognized method name after `.`
    #[error("unknown method: {0}")]
    UnknownMethod(String),

    /// `allow`/`deny` must be followed by `if`
    #[error("unknown policy kind: {0}")]
    UnknownPolicy(String),

    /// A predicate was expected here
    #[error("expected a predicate: {0}")]
    UnknownPredicate(String),

    /// The rule body element is neither a predicate nor an expression
    #[error("unknown rule element: {0}")]
    UnknownRuleElement(String),

    /// Unrecognized scope in a `trusting` clause
    #[error("unknown scope: {0}")]
    UnknownScope(String),

    /// A term was expected here
    #[error("unknown term: {0}")]
    UnknownTerm(String),

    /// A fact carried a variable term
    #[error("facts cannot hold variables")]
    VariableInFact,

    /// A rule head used a variable that no body predicate binds
    #[error("variable appears in the head alone: {0}")]
    VariableInHeadAlone(String),

    /// `a < b < c` is ambiguous; comparisons do not chain
    #[error("chained comparisons require parentheses")]
    ChainedComparisonsWithoutParens,

    /// Map keys are integers or strings
    #[error("invalid map key")]
    InvalidMapKey,

    /// A map entry has a key but no value
    #[error("map entry is missing its value")]
    MapMissingValue,

    /// A set may not contain another set
    #[error("sets cannot be nested")]
    SetInSet,

    /// A map declared the same key twice
    #[error("duplicate map key")]
    DuplicateMapKey,

    /// A byte-string literal is not valid hexadecimal
    #[error("invalid hex data")]
    InvalidHexData,
}

/// Why authorization was denied.
///
/// Exactly one of the three cases applies; nothing else about the failure is
/// lost, so callers can report the precise statement that denied access.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthorizationError {
    /// One or more checks had no satisfying binding
    #[error("the following checks failed: {}", display_checks(.0))]
    FailedChecks(Vec<FailedCheck>),

    /// A `deny if` policy matched before any `allow if`
    #[error("a deny policy matched: {policy}")]
    DenyPolicyMatched {
        /// Index of the policy in the authorizer
        policy_id: usize,
        /// Printed source of the policy
        policy: String,
    },

    /// Every policy was evaluated and none matched
    #[error("no policy matched")]
    NoMatchingPolicy,
}

/// One failed check, with enough context to point at its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedCheck {
    /// Index of the block carrying the check; `None` for the authorizer
    pub block_id: Option<usize>,
    /// Index of the check within its block
    pub check_id: usize,
    /// Printed source of the check
    pub source: String,
}

impl fmt::Display for FailedCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.block_id {
            Some(block_id) => write!(f, "block {} check {}: {}", block_id, self.check_id, self.source),
            None => write!(f, "authorizer check {}: {}", self.check_id, self.source),
        }
    }
}

fn display_checks(checks: &[FailedCheck]) -> String {
    checks
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
