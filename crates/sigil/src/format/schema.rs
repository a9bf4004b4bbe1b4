//! Wire record schema.
//!
//! Protobuf message definitions, maintained by hand so the field numbers
//! stay the single source of truth. Signatures bind the exact encoded bytes
//! of [`Block`], so any change here is a breaking change to every issued
//! token.

/// Top-level token record.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Token {
    #[prost(uint32, optional, tag = "1")]
    pub root_key_id: Option<u32>,
    #[prost(message, optional, tag = "2")]
    pub authority: Option<SignedBlock>,
    #[prost(message, repeated, tag = "3")]
    pub blocks: Vec<SignedBlock>,
    #[prost(message, optional, tag = "4")]
    pub proof: Option<Proof>,
}

/// One chain node: the serialized datalog payload plus its signatures.
#[derive(Clone, PartialEq, prost::Message)]
pub struct SignedBlock {
    #[prost(bytes = "vec", tag = "1")]
    pub block: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub signature: Vec<u8>,
    #[prost(message, optional, tag = "3")]
    pub next_key: Option<PublicKey>,
    #[prost(uint32, optional, tag = "4")]
    pub version: Option<u32>,
    #[prost(message, optional, tag = "5")]
    pub external_signature: Option<ExternalSignature>,
}

/// Third-party co-signature on a block.
#[derive(Clone, PartialEq, prost::Message)]
pub struct ExternalSignature {
    #[prost(bytes = "vec", tag = "1")]
    pub signature: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub public_key: Option<PublicKey>,
}

/// Serialized public key.
#[derive(Clone, PartialEq, prost::Message)]
pub struct PublicKey {
    #[prost(enumeration = "Algorithm", tag = "1")]
    pub algorithm: i32,
    #[prost(bytes = "vec", tag = "2")]
    pub key: Vec<u8>,
}

/// Signature algorithm identifiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, prost::Enumeration)]
#[repr(i32)]
pub enum Algorithm {
    Ed25519 = 0,
    Secp256r1 = 1,
}

/// Terminal state of the chain.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Proof {
    #[prost(oneof = "proof::Content", tags = "1, 2")]
    pub content: Option<proof::Content>,
}

pub mod proof {
    /// Either the last ephemeral secret (open) or a sealing signature.
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Content {
        #[prost(bytes, tag = "1")]
        NextSecret(Vec<u8>),
        #[prost(bytes, tag = "2")]
        FinalSignature(Vec<u8>),
    }
}

/// Datalog payload of one block.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Block {
    #[prost(uint32, tag = "1")]
    pub version: u32,
    #[prost(string, repeated, tag = "2")]
    pub symbols: Vec<String>,
    #[prost(string, optional, tag = "3")]
    pub context: Option<String>,
    #[prost(message, repeated, tag = "4")]
    pub facts: Vec<Fact>,
    #[prost(message, repeated, tag = "5")]
    pub rules: Vec<Rule>,
    #[prost(message, repeated, tag = "6")]
    pub checks: Vec<Check>,
    #[prost(message, repeated, tag = "7")]
    pub scope: Vec<Scope>,
    #[prost(message, repeated, tag = "8")]
    pub public_keys: Vec<PublicKey>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Fact {
    #[prost(message, optional, tag = "1")]
    pub predicate: Option<Predicate>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Rule {
    #[prost(message, optional, tag = "1")]
    pub head: Option<Predicate>,
    #[prost(message, repeated, tag = "2")]
    pub body: Vec<Predicate>,
    #[prost(message, repeated, tag = "3")]
    pub expressions: Vec<Expression>,
    #[prost(message, repeated, tag = "4")]
    pub scope: Vec<Scope>,
}

/// A check; `kind` is omitted on the wire for the default so that tokens
/// issued before the field existed keep their signatures.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Check {
    #[prost(message, repeated, tag = "1")]
    pub queries: Vec<Rule>,
    #[prost(enumeration = "CheckKind", optional, tag = "2")]
    pub kind: Option<i32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, prost::Enumeration)]
#[repr(i32)]
pub enum CheckKind {
    One = 0,
    All = 1,
    Reject = 2,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Predicate {
    #[prost(uint64, tag = "1")]
    pub name: u64,
    #[prost(message, repeated, tag = "2")]
    pub terms: Vec<Term>,
}

/// A term; symbol-valued alternatives carry interned indexes.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Term {
    #[prost(oneof = "term::Content", tags = "1, 2, 3, 4, 5, 6, 7, 8, 9, 10")]
    pub content: Option<term::Content>,
}

pub mod term {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Content {
        #[prost(uint32, tag = "1")]
        Variable(u32),
        #[prost(int64, tag = "2")]
        Integer(i64),
        #[prost(uint64, tag = "3")]
        String(u64),
        #[prost(uint64, tag = "4")]
        Date(u64),
        #[prost(bytes, tag = "5")]
        Bytes(Vec<u8>),
        #[prost(bool, tag = "6")]
        Bool(bool),
        #[prost(message, tag = "7")]
        Set(super::TermSet),
        #[prost(message, tag = "8")]
        Null(super::Empty),
        #[prost(message, tag = "9")]
        Array(super::Array),
        #[prost(message, tag = "10")]
        Map(super::Map),
    }
}

/// Set entries, sorted by the canonical term order on the wire.
#[derive(Clone, PartialEq, prost::Message)]
pub struct TermSet {
    #[prost(message, repeated, tag = "1")]
    pub set: Vec<Term>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Array {
    #[prost(message, repeated, tag = "1")]
    pub array: Vec<Term>,
}

/// Map entries, sorted by key on the wire.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Map {
    #[prost(message, repeated, tag = "1")]
    pub entries: Vec<MapEntry>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct MapEntry {
    #[prost(message, optional, tag = "1")]
    pub key: Option<MapKey>,
    #[prost(message, optional, tag = "2")]
    pub value: Option<Term>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct MapKey {
    #[prost(oneof = "map_key::Content", tags = "1, 2")]
    pub content: Option<map_key::Content>,
}

pub mod map_key {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Content {
        #[prost(int64, tag = "1")]
        Integer(i64),
        #[prost(uint64, tag = "2")]
        String(u64),
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Empty {}

/// A postfix op list.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Expression {
    #[prost(message, repeated, tag = "1")]
    pub ops: Vec<Op>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Op {
    #[prost(oneof = "op::Content", tags = "1, 2, 3, 4")]
    pub content: Option<op::Content>,
}

pub mod op {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Content {
        #[prost(message, tag = "1")]
        Value(super::Term),
        #[prost(message, tag = "2")]
        Unary(super::OpUnary),
        #[prost(message, tag = "3")]
        Binary(super::OpBinary),
        #[prost(message, tag = "4")]
        Closure(super::OpClosure),
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct OpUnary {
    #[prost(enumeration = "UnaryKind", tag = "1")]
    pub kind: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, prost::Enumeration)]
#[repr(i32)]
pub enum UnaryKind {
    Negate = 0,
    Length = 1,
    TypeOf = 2,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct OpBinary {
    #[prost(enumeration = "BinaryKind", tag = "1")]
    pub kind: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, prost::Enumeration)]
#[repr(i32)]
pub enum BinaryKind {
    LessThan = 0,
    GreaterThan = 1,
    LessOrEqual = 2,
    GreaterOrEqual = 3,
    Equal = 4,
    Contains = 5,
    Prefix = 6,
    Suffix = 7,
    Regex = 8,
    Add = 9,
    Sub = 10,
    Mul = 11,
    Div = 12,
    And = 13,
    Or = 14,
    Intersection = 15,
    Union = 16,
    BitwiseAnd = 17,
    BitwiseOr = 18,
    BitwiseXor = 19,
    NotEqual = 20,
    HeterogeneousEqual = 21,
    HeterogeneousNotEqual = 22,
    LazyAnd = 23,
    LazyOr = 24,
    All = 25,
    Any = 26,
    Get = 27,
    TryOr = 28,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct OpClosure {
    #[prost(uint32, repeated, tag = "1")]
    pub params: Vec<u32>,
    #[prost(message, repeated, tag = "2")]
    pub ops: Vec<Op>,
}

/// A trust declaration.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Scope {
    #[prost(oneof = "scope::Content", tags = "1, 2")]
    pub content: Option<scope::Content>,
}

pub mod scope {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Content {
        #[prost(enumeration = "super::ScopeType", tag = "1")]
        ScopeType(i32),
        #[prost(int64, tag = "2")]
        PublicKey(i64),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, prost::Enumeration)]
#[repr(i32)]
pub enum ScopeType {
    Authority = 0,
    Previous = 1,
}

/// What a token holder sends to a third party for co-signing.
#[derive(Clone, PartialEq, prost::Message)]
pub struct ThirdPartyBlockRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub previous_signature: Vec<u8>,
}

/// What the third party returns.
#[derive(Clone, PartialEq, prost::Message)]
pub struct ThirdPartyBlockContents {
    #[prost(bytes = "vec", tag = "1")]
    pub payload: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub external_signature: Option<ExternalSignature>,
}
