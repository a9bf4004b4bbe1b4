//! Conversions between the wire schema and the interned datalog model.
//!
//! Terms keep their interned indexes across this boundary; the conversion
//! is structural. Decoding validates what the schema cannot express:
//! version bounds, ground facts, bound rule heads, the reserved query head,
//! set nesting, and duplicate map keys.

use super::schema;
use super::{MAX_BLOCK_VERSION, MIN_BLOCK_VERSION};
use crate::crypto::{Algorithm, PublicKey};
use crate::error::Validation;
use crate::token::Block;
use sigil_datalog as datalog;
use std::collections::{BTreeMap, BTreeSet};

/// Index of the reserved `query` head in the default symbol table.
const QUERY_SYMBOL: u64 = 27;

pub(crate) fn token_block_to_proto(block: &Block) -> schema::Block {
    schema::Block {
        version: block.version,
        symbols: block.symbols.clone(),
        context: block.context.clone(),
        facts: block.facts.iter().map(fact_to_proto).collect(),
        rules: block.rules.iter().map(rule_to_proto).collect(),
        checks: block.checks.iter().map(check_to_proto).collect(),
        scope: block.scopes.iter().map(scope_to_proto).collect(),
        public_keys: block.public_keys.iter().map(key_to_proto).collect(),
    }
}

pub(crate) fn proto_block_to_token_block(proto: &schema::Block) -> Result<Block, Validation> {
    if !(MIN_BLOCK_VERSION..=MAX_BLOCK_VERSION).contains(&proto.version) {
        return Err(Validation::InvalidVersion(proto.version));
    }
    let facts = proto
        .facts
        .iter()
        .map(proto_to_fact)
        .collect::<Result<Vec<_>, _>>()?;
    let rules = proto
        .rules
        .iter()
        .map(proto_to_rule)
        .collect::<Result<Vec<_>, _>>()?;
    let checks = proto
        .checks
        .iter()
        .map(proto_to_check)
        .collect::<Result<Vec<_>, _>>()?;
    let scopes = proto
        .scope
        .iter()
        .map(proto_to_scope)
        .collect::<Result<Vec<_>, _>>()?;
    let public_keys = proto
        .public_keys
        .iter()
        .map(proto_to_key)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Block {
        symbols: proto.symbols.clone(),
        public_keys,
        context: proto.context.clone(),
        version: proto.version,
        facts,
        rules,
        checks,
        scopes,
        external_key: None,
    })
}

pub(crate) fn key_to_proto(key: &PublicKey) -> schema::PublicKey {
    schema::PublicKey {
        algorithm: key.algorithm().to_id(),
        key: key.to_bytes(),
    }
}

pub(crate) fn proto_to_key(proto: &schema::PublicKey) -> Result<PublicKey, Validation> {
    let algorithm = Algorithm::from_id(proto.algorithm)
        .ok_or_else(|| Validation::DeserializationError("unknown algorithm".to_string()))?;
    PublicKey::from_bytes(&proto.key, algorithm)
}

fn fact_to_proto(fact: &datalog::Fact) -> schema::Fact {
    schema::Fact {
        predicate: Some(predicate_to_proto(&fact.predicate)),
    }
}

fn proto_to_fact(proto: &schema::Fact) -> Result<datalog::Fact, Validation> {
    let predicate = proto
        .predicate
        .as_ref()
        .ok_or_else(|| Validation::DeserializationError("fact without predicate".to_string()))?;
    let fact = datalog::Fact {
        predicate: proto_to_predicate(predicate)?,
    };
    if !fact.is_ground() {
        return Err(Validation::VariableInFact);
    }
    Ok(fact)
}

fn rule_to_proto(rule: &datalog::Rule) -> schema::Rule {
    schema::Rule {
        head: Some(predicate_to_proto(&rule.head)),
        body: rule.body.iter().map(predicate_to_proto).collect(),
        expressions: rule.expressions.iter().map(expression_to_proto).collect(),
        scope: rule.scopes.iter().map(scope_to_proto).collect(),
    }
}

fn proto_to_rule(proto: &schema::Rule) -> Result<datalog::Rule, Validation> {
    let head = proto
        .head
        .as_ref()
        .ok_or_else(|| Validation::DeserializationError("rule without head".to_string()))?;
    let rule = datalog::Rule::new(
        proto_to_predicate(head)?,
        proto
            .body
            .iter()
            .map(proto_to_predicate)
            .collect::<Result<_, _>>()?,
        proto
            .expressions
            .iter()
            .map(proto_to_expression)
            .collect::<Result<_, _>>()?,
        proto
            .scope
            .iter()
            .map(proto_to_scope)
            .collect::<Result<_, _>>()?,
    );
    let unbound = rule.unbound_head_variables();
    if !unbound.is_empty() {
        let names = unbound
            .iter()
            .map(|index| format!("#{index}"))
            .collect::<Vec<_>>()
            .join(", ");
        return Err(Validation::UnboundVariableInHead(names));
    }
    Ok(rule)
}

fn check_to_proto(check: &datalog::Check) -> schema::Check {
    schema::Check {
        queries: check.queries.iter().map(rule_to_proto).collect(),
        // the default kind is omitted so that tokens issued before the
        // field existed keep byte-identical payloads
        kind: match check.kind {
            datalog::CheckKind::One => None,
            datalog::CheckKind::All => Some(schema::CheckKind::All as i32),
            datalog::CheckKind::Reject => Some(schema::CheckKind::Reject as i32),
        },
    }
}

fn proto_to_check(proto: &schema::Check) -> Result<datalog::Check, Validation> {
    let kind = match proto.kind {
        None => datalog::CheckKind::One,
        Some(kind) => match schema::CheckKind::try_from(kind) {
            Ok(schema::CheckKind::One) => datalog::CheckKind::One,
            Ok(schema::CheckKind::All) => datalog::CheckKind::All,
            Ok(schema::CheckKind::Reject) => datalog::CheckKind::Reject,
            Err(_) => {
                return Err(Validation::DeserializationError(
                    "unknown check kind".to_string(),
                ))
            }
        },
    };
    let queries = proto
        .queries
        .iter()
        .map(proto_to_rule)
        .collect::<Result<Vec<_>, _>>()?;
    for query in &queries {
        if query.head.name != QUERY_SYMBOL || !query.head.terms.is_empty() {
            return Err(Validation::InvalidQueryHead);
        }
    }
    Ok(datalog::Check::new(queries, kind))
}

fn predicate_to_proto(predicate: &datalog::Predicate) -> schema::Predicate {
    schema::Predicate {
        name: predicate.name,
        terms: predicate.terms.iter().map(term_to_proto).collect(),
    }
}

fn proto_to_predicate(proto: &schema::Predicate) -> Result<datalog::Predicate, Validation> {
    Ok(datalog::Predicate::new(
        proto.name,
        proto
            .terms
            .iter()
            .map(proto_to_term)
            .collect::<Result<_, _>>()?,
    ))
}

pub(crate) fn term_to_proto(term: &datalog::Term) -> schema::Term {
    use schema::term::Content;
    let content = match term {
        datalog::Term::Variable(index) => Content::Variable(*index),
        datalog::Term::Integer(i) => Content::Integer(*i),
        datalog::Term::Str(index) => Content::String(*index),
        datalog::Term::Date(date) => Content::Date(*date),
        datalog::Term::Bytes(bytes) => Content::Bytes(bytes.clone()),
        datalog::Term::Bool(b) => Content::Bool(*b),
        // BTreeSet iteration follows the canonical term order
        datalog::Term::Set(set) => Content::Set(schema::TermSet {
            set: set.iter().map(term_to_proto).collect(),
        }),
        datalog::Term::Null => Content::Null(schema::Empty {}),
        datalog::Term::Array(array) => Content::Array(schema::Array {
            array: array.iter().map(term_to_proto).collect(),
        }),
        datalog::Term::Map(map) => Content::Map(schema::Map {
            entries: map
                .iter()
                .map(|(key, value)| schema::MapEntry {
                    key: Some(schema::MapKey {
                        content: Some(match key {
                            datalog::MapKey::Integer(i) => schema::map_key::Content::Integer(*i),
                            datalog::MapKey::Str(index) => schema::map_key::Content::String(*index),
                        }),
                    }),
                    value: Some(term_to_proto(value)),
                })
                .collect(),
        }),
    };
    schema::Term {
        content: Some(content),
    }
}

pub(crate) fn proto_to_term(proto: &schema::Term) -> Result<datalog::Term, Validation> {
    use schema::term::Content;
    let content = proto
        .content
        .as_ref()
        .ok_or_else(|| Validation::DeserializationError("empty term".to_string()))?;
    Ok(match content {
        Content::Variable(index) => datalog::Term::Variable(*index),
        Content::Integer(i) => datalog::Term::Integer(*i),
        Content::String(index) => datalog::Term::Str(*index),
        Content::Date(date) => datalog::Term::Date(*date),
        Content::Bytes(bytes) => datalog::Term::Bytes(bytes.clone()),
        Content::Bool(b) => datalog::Term::Bool(*b),
        Content::Set(set) => {
            let mut terms = BTreeSet::new();
            for term in &set.set {
                let term = proto_to_term(term)?;
                if matches!(term, datalog::Term::Set(_)) {
                    return Err(Validation::SetInSet);
                }
                terms.insert(term);
            }
            datalog::Term::Set(terms)
        }
        Content::Null(_) => datalog::Term::Null,
        Content::Array(array) => datalog::Term::Array(
            array
                .array
                .iter()
                .map(proto_to_term)
                .collect::<Result<_, _>>()?,
        ),
        Content::Map(map) => {
            let mut entries = BTreeMap::new();
            for entry in &map.entries {
                let key = entry
                    .key
                    .as_ref()
                    .and_then(|key| key.content.as_ref())
                    .ok_or_else(|| {
                        Validation::DeserializationError("map entry without key".to_string())
                    })?;
                let key = match key {
                    schema::map_key::Content::Integer(i) => datalog::MapKey::Integer(*i),
                    schema::map_key::Content::String(index) => datalog::MapKey::Str(*index),
                };
                let value = entry.value.as_ref().ok_or_else(|| {
                    Validation::DeserializationError("map entry without value".to_string())
                })?;
                if entries.insert(key, proto_to_term(value)?).is_some() {
                    return Err(Validation::DuplicateMapKey);
                }
            }
            datalog::Term::Map(entries)
        }
    })
}

fn expression_to_proto(expression: &datalog::Expression) -> schema::Expression {
    schema::Expression {
        ops: expression.ops.iter().map(op_to_proto).collect(),
    }
}

fn proto_to_expression(proto: &schema::Expression) -> Result<datalog::Expression, Validation> {
    Ok(datalog::Expression {
        ops: proto
            .ops
            .iter()
            .map(proto_to_op)
            .collect::<Result<_, _>>()?,
    })
}

fn op_to_proto(op: &datalog::Op) -> schema::Op {
    use schema::op::Content;
    let content = match op {
        datalog::Op::Value(term) => Content::Value(term_to_proto(term)),
        datalog::Op::Unary(kind) => Content::Unary(schema::OpUnary {
            kind: match kind {
                datalog::Unary::Negate => schema::UnaryKind::Negate as i32,
                datalog::Unary::Length => schema::UnaryKind::Length as i32,
                datalog::Unary::TypeOf => schema::UnaryKind::TypeOf as i32,
            },
        }),
        datalog::Op::Binary(kind) => Content::Binary(schema::OpBinary {
            kind: binary_to_proto(*kind) as i32,
        }),
        datalog::Op::Closure(params, body) => Content::Closure(schema::OpClosure {
            params: params.clone(),
            ops: body.iter().map(op_to_proto).collect(),
        }),
    };
    schema::Op {
        content: Some(content),
    }
}

fn proto_to_op(proto: &schema::Op) -> Result<datalog::Op, Validation> {
    use schema::op::Content;
    let content = proto
        .content
        .as_ref()
        .ok_or_else(|| Validation::DeserializationError("empty op".to_string()))?;
    Ok(match content {
        Content::Value(term) => datalog::Op::Value(proto_to_term(term)?),
        Content::Unary(unary) => {
            let kind = schema::UnaryKind::try_from(unary.kind).map_err(|_| {
                Validation::DeserializationError("unknown unary operator".to_string())
            })?;
            datalog::Op::Unary(match kind {
                schema::UnaryKind::Negate => datalog::Unary::Negate,
                schema::UnaryKind::Length => datalog::Unary::Length,
                schema::UnaryKind::TypeOf => datalog::Unary::TypeOf,
            })
        }
        Content::Binary(binary) => {
            let kind = schema::BinaryKind::try_from(binary.kind).map_err(|_| {
                Validation::DeserializationError("unknown binary operator".to_string())
            })?;
            datalog::Op::Binary(proto_to_binary(kind))
        }
        Content::Closure(closure) => datalog::Op::Closure(
            closure.params.clone(),
            closure
                .ops
                .iter()
                .map(proto_to_op)
                .collect::<Result<_, _>>()?,
        ),
    })
}

fn binary_to_proto(kind: datalog::Binary) -> schema::BinaryKind {
    use datalog::Binary::*;
    use schema::BinaryKind as Wire;
    match kind {
        LessThan => Wire::LessThan,
        GreaterThan => Wire::GreaterThan,
        LessOrEqual => Wire::LessOrEqual,
        GreaterOrEqual => Wire::GreaterOrEqual,
        Equal => Wire::Equal,
        Contains => Wire::Contains,
        Prefix => Wire::Prefix,
        Suffix => Wire::Suffix,
        Regex => Wire::Regex,
        Add => Wire::Add,
        Sub => Wire::Sub,
        Mul => Wire::Mul,
        Div => Wire::Div,
        And => Wire::And,
        Or => Wire::Or,
        Intersection => Wire::Intersection,
        Union => Wire::Union,
        BitwiseAnd => Wire::BitwiseAnd,
        BitwiseOr => Wire::BitwiseOr,
        BitwiseXor => Wire::BitwiseXor,
        NotEqual => Wire::NotEqual,
        HeterogeneousEqual => Wire::HeterogeneousEqual,
        HeterogeneousNotEqual => Wire::HeterogeneousNotEqual,
        LazyAnd => Wire::LazyAnd,
        LazyOr => Wire::LazyOr,
        All => Wire::All,
        Any => Wire::Any,
        Get => Wire::Get,
        TryOr => Wire::TryOr,
    }
}

fn proto_to_binary(kind: schema::BinaryKind) -> datalog::Binary {
    use datalog::Binary as Core;
    use schema::BinaryKind::*;
    match kind {
        LessThan => Core::LessThan,
        GreaterThan => Core::GreaterThan,
        LessOrEqual => Core::LessOrEqual,
        GreaterOrEqual => Core::GreaterOrEqual,
        Equal => Core::Equal,
        Contains => Core::Contains,
        Prefix => Core::Prefix,
        Suffix => Core::Suffix,
        Regex => Core::Regex,
        Add => Core::Add,
        Sub => Core::Sub,
        Mul => Core::Mul,
        Div => Core::Div,
        And => Core::And,
        Or => Core::Or,
        Intersection => Core::Intersection,
        Union => Core::Union,
        BitwiseAnd => Core::BitwiseAnd,
        BitwiseOr => Core::BitwiseOr,
        BitwiseXor => Core::BitwiseXor,
        NotEqual => Core::NotEqual,
        HeterogeneousEqual => Core::HeterogeneousEqual,
        HeterogeneousNotEqual => Core::HeterogeneousNotEqual,
        LazyAnd => Core::LazyAnd,
        LazyOr => Core::LazyOr,
        All => Core::All,
        Any => Core::Any,
        Get => Core::Get,
        TryOr => Core::TryOr,
    }
}

pub(crate) fn scope_to_proto(scope: &datalog::Scope) -> schema::Scope {
    use schema::scope::Content;
    let content = match scope {
        datalog::Scope::Authority => Content::ScopeType(schema::ScopeType::Authority as i32),
        datalog::Scope::Previous => Content::ScopeType(schema::ScopeType::Previous as i32),
        datalog::Scope::PublicKey(index) => Content::PublicKey(*index as i64),
    };
    schema::Scope {
        content: Some(content),
    }
}

pub(crate) fn proto_to_scope(proto: &schema::Scope) -> Result<datalog::Scope, Validation> {
    use schema::scope::Content;
    match proto
        .content
        .as_ref()
        .ok_or_else(|| Validation::DeserializationError("empty scope".to_string()))?
    {
        Content::ScopeType(scope_type) => match schema::ScopeType::try_from(*scope_type) {
            Ok(schema::ScopeType::Authority) => Ok(datalog::Scope::Authority),
            Ok(schema::ScopeType::Previous) => Ok(datalog::Scope::Previous),
            Err(_) => Err(Validation::DeserializationError(
                "unknown scope type".to_string(),
            )),
        },
        Content::PublicKey(index) => {
            let index = u64::try_from(*index)
                .map_err(|_| Validation::DeserializationError("negative key index".to_string()))?;
            Ok(datalog::Scope::PublicKey(index))
        }
    }
}
