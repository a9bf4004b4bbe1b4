//! Programmatic construction of block programs.
//!
//! The builder types mirror the datalog core but carry owned strings instead
//! of interned indexes; they are what the text parser produces and what the
//! public API accepts. Conversion into the interned form happens when a
//! block is assembled against a concrete symbol table.
//!
//! Anything accepting `impl TryInto<Fact>` (or rule/check/policy) also takes
//! `&str`, parsed as a single statement of the datalog grammar.

mod display;

use crate::crypto::{PublicKey, PublicKeys};
use crate::error::{self, Validation};
use crate::parser;
use crate::token::Block;
use sigil_datalog as datalog;
use sigil_datalog::SymbolTable;
use std::collections::{BTreeMap, BTreeSet};
use std::convert::Infallible;

pub use sigil_datalog::{Binary, Unary};

/// A term with owned strings.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Term {
    /// Named variable
    Variable(String),
    /// 64-bit signed integer
    Integer(i64),
    /// UTF-8 string
    Str(String),
    /// Seconds since the Unix epoch
    Date(u64),
    /// Raw byte string
    Bytes(Vec<u8>),
    /// Boolean
    Bool(bool),
    /// Absent value
    Null,
    /// Unordered collection
    Set(BTreeSet<Term>),
    /// Ordered collection
    Array(Vec<Term>),
    /// Keyed collection
    Map(BTreeMap<MapKey, Term>),
}

/// Key of a [`Term::Map`] entry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MapKey {
    Integer(i64),
    Str(String),
}

impl Term {
    pub(crate) fn to_datalog(&self, symbols: &mut SymbolTable) -> datalog::Term {
        match self {
            Term::Variable(name) => datalog::Term::Variable(symbols.insert(name) as u32),
            Term::Integer(i) => datalog::Term::Integer(*i),
            Term::Str(s) => datalog::Term::Str(symbols.insert(s)),
            Term::Date(d) => datalog::Term::Date(*d),
            Term::Bytes(b) => datalog::Term::Bytes(b.clone()),
            Term::Bool(b) => datalog::Term::Bool(*b),
            Term::Null => datalog::Term::Null,
            Term::Set(set) => {
                datalog::Term::Set(set.iter().map(|term| term.to_datalog(symbols)).collect())
            }
            Term::Array(array) => datalog::Term::Array(
                array.iter().map(|term| term.to_datalog(symbols)).collect(),
            ),
            Term::Map(map) => datalog::Term::Map(
                map.iter()
                    .map(|(key, value)| {
                        let key = match key {
                            MapKey::Integer(i) => datalog::MapKey::Integer(*i),
                            MapKey::Str(s) => datalog::MapKey::Str(symbols.insert(s)),
                        };
                        (key, value.to_datalog(symbols))
                    })
                    .collect(),
            ),
        }
    }

    pub(crate) fn from_datalog(
        term: &datalog::Term,
        symbols: &SymbolTable,
    ) -> Result<Self, Validation> {
        Ok(match term {
            datalog::Term::Variable(index) => Term::Variable(
                symbols
                    .get_symbol(*index as u64)
                    .ok_or(Validation::UnknownSymbol(*index as u64))?
                    .to_string(),
            ),
            datalog::Term::Integer(i) => Term::Integer(*i),
            datalog::Term::Str(index) => Term::Str(
                symbols
                    .get_symbol(*index)
                    .ok_or(Validation::UnknownSymbol(*index))?
                    .to_string(),
            ),
            datalog::Term::Date(d) => Term::Date(*d),
            datalog::Term::Bytes(b) => Term::Bytes(b.clone()),
            datalog::Term::Bool(b) => Term::Bool(*b),
            datalog::Term::Null => Term::Null,
            datalog::Term::Set(set) => Term::Set(
                set.iter()
                    .map(|term| Term::from_datalog(term, symbols))
                    .collect::<Result<_, _>>()?,
            ),
            datalog::Term::Array(array) => Term::Array(
                array
                    .iter()
                    .map(|term| Term::from_datalog(term, symbols))
                    .collect::<Result<_, _>>()?,
            ),
            datalog::Term::Map(map) => Term::Map(
                map.iter()
                    .map(|(key, value)| {
                        let key = match key {
                            datalog::MapKey::Integer(i) => MapKey::Integer(*i),
                            datalog::MapKey::Str(index) => MapKey::Str(
                                symbols
                                    .get_symbol(*index)
                                    .ok_or(Validation::UnknownSymbol(*index))?
                                    .to_string(),
                            ),
                        };
                        Ok::<_, Validation>((key, Term::from_datalog(value, symbols)?))
                    })
                    .collect::<Result<_, _>>()?,
            ),
        })
    }
}

impl From<i64> for Term {
    fn from(value: i64) -> Self {
        Term::Integer(value)
    }
}

impl From<&str> for Term {
    fn from(value: &str) -> Self {
        Term::Str(value.to_string())
    }
}

impl From<String> for Term {
    fn from(value: String) -> Self {
        Term::Str(value)
    }
}

impl From<bool> for Term {
    fn from(value: bool) -> Self {
        Term::Bool(value)
    }
}

impl From<Vec<u8>> for Term {
    fn from(value: Vec<u8>) -> Self {
        Term::Bytes(value)
    }
}

impl From<&[u8]> for Term {
    fn from(value: &[u8]) -> Self {
        Term::Bytes(value.to_vec())
    }
}

impl From<chrono::DateTime<chrono::Utc>> for Term {
    fn from(value: chrono::DateTime<chrono::Utc>) -> Self {
        Term::Date(value.timestamp().max(0) as u64)
    }
}

/// Shorthand for a variable term.
pub fn var(name: &str) -> Term {
    Term::Variable(name.to_string())
}

/// Shorthand for a string term.
pub fn string(value: &str) -> Term {
    Term::Str(value.to_string())
}

/// Shorthand for an integer term.
pub fn int(value: i64) -> Term {
    Term::Integer(value)
}

/// Shorthand for a date term, in seconds since the epoch.
pub fn date(value: u64) -> Term {
    Term::Date(value)
}

/// Shorthand for a set term.
pub fn set(terms: impl IntoIterator<Item = Term>) -> Term {
    Term::Set(terms.into_iter().collect())
}

/// Shorthand for an array term.
pub fn array(terms: impl IntoIterator<Item = Term>) -> Term {
    Term::Array(terms.into_iter().collect())
}

/// A named tuple of terms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    pub name: String,
    pub terms: Vec<Term>,
}

impl Predicate {
    pub fn new(name: impl Into<String>, terms: impl IntoIterator<Item = Term>) -> Self {
        Self {
            name: name.into(),
            terms: terms.into_iter().collect(),
        }
    }

    pub(crate) fn to_datalog(&self, symbols: &mut SymbolTable) -> datalog::Predicate {
        datalog::Predicate::new(
            symbols.insert(&self.name),
            self.terms
                .iter()
                .map(|term| term.to_datalog(symbols))
                .collect(),
        )
    }

    pub(crate) fn from_datalog(
        predicate: &datalog::Predicate,
        symbols: &SymbolTable,
    ) -> Result<Self, Validation> {
        Ok(Self {
            name: symbols
                .get_symbol(predicate.name)
                .ok_or(Validation::UnknownSymbol(predicate.name))?
                .to_string(),
            terms: predicate
                .terms
                .iter()
                .map(|term| Term::from_datalog(term, symbols))
                .collect::<Result<_, _>>()?,
        })
    }
}

/// Build a predicate.
pub fn pred(name: &str, terms: impl IntoIterator<Item = Term>) -> Predicate {
    Predicate::new(name, terms)
}

/// A ground predicate instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fact {
    pub predicate: Predicate,
}

impl Fact {
    pub fn new(name: impl Into<String>, terms: impl IntoIterator<Item = Term>) -> Self {
        Self {
            predicate: Predicate::new(name, terms),
        }
    }

    /// Reject facts holding variables or nested sets.
    pub fn validate(&self) -> Result<(), Validation> {
        fn has_variable(term: &Term) -> bool {
            match term {
                Term::Variable(_) => true,
                Term::Set(set) => set.iter().any(has_variable),
                Term::Array(array) => array.iter().any(has_variable),
                Term::Map(map) => map.values().any(has_variable),
                _ => false,
            }
        }
        fn nests_a_set(term: &Term, inside_set: bool) -> bool {
            match term {
                Term::Set(set) => inside_set || set.iter().any(|t| nests_a_set(t, true)),
                Term::Array(array) => array.iter().any(|t| nests_a_set(t, inside_set)),
                Term::Map(map) => map.values().any(|t| nests_a_set(t, inside_set)),
                _ => false,
            }
        }
        if self.predicate.terms.iter().any(has_variable) {
            return Err(Validation::VariableInFact);
        }
        if self.predicate.terms.iter().any(|t| nests_a_set(t, false)) {
            return Err(Validation::SetInSet);
        }
        Ok(())
    }

    pub(crate) fn to_datalog(&self, symbols: &mut SymbolTable) -> Result<datalog::Fact, Validation> {
        self.validate()?;
        Ok(datalog::Fact {
            predicate: self.predicate.to_datalog(symbols),
        })
    }

    pub(crate) fn from_datalog(
        fact: &datalog::Fact,
        symbols: &SymbolTable,
    ) -> Result<Self, Validation> {
        Ok(Self {
            predicate: Predicate::from_datalog(&fact.predicate, symbols)?,
        })
    }
}

/// Build a fact.
pub fn fact(name: &str, terms: impl IntoIterator<Item = Term>) -> Fact {
    Fact::new(name, terms)
}

/// One element of a postfix op list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Value(Term),
    Unary(Unary),
    Binary(Binary),
    Closure(Vec<String>, Vec<Op>),
}

impl Op {
    fn to_datalog(&self, symbols: &mut SymbolTable) -> datalog::Op {
        match self {
            Op::Value(term) => datalog::Op::Value(term.to_datalog(symbols)),
            Op::Unary(kind) => datalog::Op::Unary(*kind),
            Op::Binary(kind) => datalog::Op::Binary(*kind),
            Op::Closure(params, body) => datalog::Op::Closure(
                params
                    .iter()
                    .map(|param| symbols.insert(param) as u32)
                    .collect(),
                body.iter().map(|op| op.to_datalog(symbols)).collect(),
            ),
        }
    }

    fn from_datalog(op: &datalog::Op, symbols: &SymbolTable) -> Result<Self, Validation> {
        Ok(match op {
            datalog::Op::Value(term) => Op::Value(Term::from_datalog(term, symbols)?),
            datalog::Op::Unary(kind) => Op::Unary(*kind),
            datalog::Op::Binary(kind) => Op::Binary(*kind),
            datalog::Op::Closure(params, body) => Op::Closure(
                params
                    .iter()
                    .map(|param| {
                        symbols
                            .get_symbol(*param as u64)
                            .map(str::to_string)
                            .ok_or(Validation::UnknownSymbol(*param as u64))
                    })
                    .collect::<Result<_, _>>()?,
                body.iter()
                    .map(|op| Op::from_datalog(op, symbols))
                    .collect::<Result<_, _>>()?,
            ),
        })
    }
}

/// A postfix expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expression {
    pub ops: Vec<Op>,
}

impl Expression {
    pub(crate) fn to_datalog(&self, symbols: &mut SymbolTable) -> datalog::Expression {
        datalog::Expression {
            ops: self.ops.iter().map(|op| op.to_datalog(symbols)).collect(),
        }
    }

    pub(crate) fn from_datalog(
        expression: &datalog::Expression,
        symbols: &SymbolTable,
    ) -> Result<Self, Validation> {
        Ok(Self {
            ops: expression
                .ops
                .iter()
                .map(|op| Op::from_datalog(op, symbols))
                .collect::<Result<_, _>>()?,
        })
    }
}

/// A trust declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// Trust the authority block and the authorizer
    Authority,
    /// Trust every earlier block and the authorizer
    Previous,
    /// Trust blocks co-signed by this key
    PublicKey(PublicKey),
}

impl Scope {
    pub(crate) fn to_datalog(&self, keys: &mut PublicKeys) -> datalog::Scope {
        match self {
            Scope::Authority => datalog::Scope::Authority,
            Scope::Previous => datalog::Scope::Previous,
            Scope::PublicKey(key) => datalog::Scope::PublicKey(keys.insert(key)),
        }
    }

    pub(crate) fn from_datalog(
        scope: &datalog::Scope,
        keys: &PublicKeys,
    ) -> Result<Self, Validation> {
        Ok(match scope {
            datalog::Scope::Authority => Scope::Authority,
            datalog::Scope::Previous => Scope::Previous,
            datalog::Scope::PublicKey(index) => Scope::PublicKey(
                *keys
                    .get_key(*index)
                    .ok_or(Validation::UnknownPublicKey(*index))?,
            ),
        })
    }
}

/// A derivation rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub head: Predicate,
    pub body: Vec<Predicate>,
    pub expressions: Vec<Expression>,
    pub scopes: Vec<Scope>,
}

impl Rule {
    pub fn new(
        head: Predicate,
        body: Vec<Predicate>,
        expressions: Vec<Expression>,
        scopes: Vec<Scope>,
    ) -> Self {
        Self {
            head,
            body,
            expressions,
            scopes,
        }
    }

    /// Reject rules whose head uses a variable with no binding site.
    pub fn validate_variables(&self) -> Result<(), Validation> {
        let bound: std::collections::HashSet<&str> = self
            .body
            .iter()
            .flat_map(|predicate| &predicate.terms)
            .filter_map(|term| match term {
                Term::Variable(name) => Some(name.as_str()),
                _ => None,
            })
            .collect();
        let unbound: Vec<&str> = self
            .head
            .terms
            .iter()
            .filter_map(|term| match term {
                Term::Variable(name) if !bound.contains(name.as_str()) => Some(name.as_str()),
                _ => None,
            })
            .collect();
        if unbound.is_empty() {
            Ok(())
        } else {
            Err(Validation::UnboundVariableInHead(unbound.join(", ")))
        }
    }

    pub(crate) fn to_datalog(
        &self,
        symbols: &mut SymbolTable,
        keys: &mut PublicKeys,
    ) -> datalog::Rule {
        datalog::Rule::new(
            self.head.to_datalog(symbols),
            self.body
                .iter()
                .map(|predicate| predicate.to_datalog(symbols))
                .collect(),
            self.expressions
                .iter()
                .map(|expression| expression.to_datalog(symbols))
                .collect(),
            self.scopes
                .iter()
                .map(|scope| scope.to_datalog(keys))
                .collect(),
        )
    }

    pub(crate) fn from_datalog(
        rule: &datalog::Rule,
        symbols: &SymbolTable,
        keys: &PublicKeys,
    ) -> Result<Self, Validation> {
        Ok(Self {
            head: Predicate::from_datalog(&rule.head, symbols)?,
            body: rule
                .body
                .iter()
                .map(|predicate| Predicate::from_datalog(predicate, symbols))
                .collect::<Result<_, _>>()?,
            expressions: rule
                .expressions
                .iter()
                .map(|expression| Expression::from_datalog(expression, symbols))
                .collect::<Result<_, _>>()?,
            scopes: rule
                .scopes
                .iter()
                .map(|scope| Scope::from_datalog(scope, keys))
                .collect::<Result<_, _>>()?,
        })
    }
}

/// Build a rule with no expressions.
pub fn rule(
    head_name: &str,
    head_terms: impl IntoIterator<Item = Term>,
    body: impl IntoIterator<Item = Predicate>,
) -> Rule {
    Rule::new(
        Predicate::new(head_name, head_terms),
        body.into_iter().collect(),
        vec![],
        vec![],
    )
}

/// Build a rule with expression constraints.
pub fn constrained_rule(
    head_name: &str,
    head_terms: impl IntoIterator<Item = Term>,
    body: impl IntoIterator<Item = Predicate>,
    expressions: impl IntoIterator<Item = Expression>,
) -> Rule {
    Rule::new(
        Predicate::new(head_name, head_terms),
        body.into_iter().collect(),
        expressions.into_iter().collect(),
        vec![],
    )
}

/// Build a check/policy query: a rule with the reserved `query` head.
pub fn query(
    body: impl IntoIterator<Item = Predicate>,
    expressions: impl IntoIterator<Item = Expression>,
) -> Rule {
    Rule::new(
        Predicate::new("query", []),
        body.into_iter().collect(),
        expressions.into_iter().collect(),
        vec![],
    )
}

pub use sigil_datalog::CheckKind;

/// A constraint that must hold for authorization to succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    pub queries: Vec<Rule>,
    pub kind: CheckKind,
}

impl Check {
    pub(crate) fn to_datalog(
        &self,
        symbols: &mut SymbolTable,
        keys: &mut PublicKeys,
    ) -> datalog::Check {
        let query_head = symbols.insert("query");
        let queries = self
            .queries
            .iter()
            .map(|query| {
                let mut converted = query.to_datalog(symbols, keys);
                // the head of a stored query is always the reserved `query`
                // predicate, whatever the builder was handed
                converted.head = datalog::Predicate::new(query_head, vec![]);
                converted
            })
            .collect();
        datalog::Check::new(queries, self.kind)
    }

    pub(crate) fn from_datalog(
        check: &datalog::Check,
        symbols: &SymbolTable,
        keys: &PublicKeys,
    ) -> Result<Self, Validation> {
        Ok(Self {
            queries: check
                .queries
                .iter()
                .map(|query| Rule::from_datalog(query, symbols, keys))
                .collect::<Result<_, _>>()?,
            kind: check.kind,
        })
    }
}

/// A `check if` over the given queries.
pub fn check_if(queries: impl IntoIterator<Item = Rule>) -> Check {
    Check {
        queries: queries.into_iter().collect(),
        kind: CheckKind::One,
    }
}

/// A `check all` over the given queries.
pub fn check_all(queries: impl IntoIterator<Item = Rule>) -> Check {
    Check {
        queries: queries.into_iter().collect(),
        kind: CheckKind::All,
    }
}

/// A `reject if` over the given queries.
pub fn reject_if(queries: impl IntoIterator<Item = Rule>) -> Check {
    Check {
        queries: queries.into_iter().collect(),
        kind: CheckKind::Reject,
    }
}

/// How a policy decides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    Allow,
    Deny,
}

/// An authorizer-side decision rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    pub queries: Vec<Rule>,
    pub kind: PolicyKind,
}

/// An `allow if` policy.
pub fn allow_if(queries: impl IntoIterator<Item = Rule>) -> Policy {
    Policy {
        queries: queries.into_iter().collect(),
        kind: PolicyKind::Allow,
    }
}

/// A `deny if` policy.
pub fn deny_if(queries: impl IntoIterator<Item = Rule>) -> Policy {
    Policy {
        queries: queries.into_iter().collect(),
        kind: PolicyKind::Deny,
    }
}

impl TryFrom<&str> for Fact {
    type Error = error::Token;

    fn try_from(source: &str) -> Result<Self, Self::Error> {
        Ok(parser::parse_fact(source)?)
    }
}

impl TryFrom<&str> for Rule {
    type Error = error::Token;

    fn try_from(source: &str) -> Result<Self, Self::Error> {
        Ok(parser::parse_rule(source)?)
    }
}

impl TryFrom<&str> for Check {
    type Error = error::Token;

    fn try_from(source: &str) -> Result<Self, Self::Error> {
        Ok(parser::parse_check(source)?)
    }
}

impl TryFrom<&str> for Policy {
    type Error = error::Token;

    fn try_from(source: &str) -> Result<Self, Self::Error> {
        Ok(parser::parse_policy(source)?)
    }
}

impl From<Infallible> for error::Token {
    fn from(_: Infallible) -> Self {
        unreachable!("infallible conversion")
    }
}

/// Accumulates the content of one attenuation (or authority) block.
#[derive(Debug, Clone, Default)]
pub struct BlockBuilder {
    pub(crate) facts: Vec<Fact>,
    pub(crate) rules: Vec<Rule>,
    pub(crate) checks: Vec<Check>,
    pub(crate) scopes: Vec<Scope>,
    pub(crate) context: Option<String>,
}

impl BlockBuilder {
    /// Start an empty block.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a fact. Accepts a [`Fact`] or datalog source text.
    pub fn fact<F>(mut self, fact: F) -> Result<Self, error::Token>
    where
        F: TryInto<Fact>,
        error::Token: From<<F as TryInto<Fact>>::Error>,
    {
        let fact = fact.try_into()?;
        fact.validate()?;
        self.facts.push(fact);
        Ok(self)
    }

    /// Add a rule. Accepts a [`Rule`] or datalog source text.
    pub fn rule<R>(mut self, rule: R) -> Result<Self, error::Token>
    where
        R: TryInto<Rule>,
        error::Token: From<<R as TryInto<Rule>>::Error>,
    {
        let rule = rule.try_into()?;
        rule.validate_variables()?;
        self.rules.push(rule);
        Ok(self)
    }

    /// Add a check. Accepts a [`Check`] or datalog source text.
    pub fn check<C>(mut self, check: C) -> Result<Self, error::Token>
    where
        C: TryInto<Check>,
        error::Token: From<<C as TryInto<Check>>::Error>,
    {
        self.checks.push(check.try_into()?);
        Ok(self)
    }

    /// Add a block-level trust declaration.
    #[must_use]
    pub fn scope(mut self, scope: Scope) -> Self {
        self.scopes.push(scope);
        self
    }

    /// Attach a free-form context string.
    #[must_use]
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Parse a whole block program and add its statements.
    pub fn code(mut self, source: &str) -> Result<Self, error::Token> {
        for element in parser::parse_block_source(source)? {
            match element {
                parser::BlockElement::Fact(fact) => {
                    fact.validate()?;
                    self.facts.push(fact);
                }
                parser::BlockElement::Rule(rule) => {
                    rule.validate_variables()?;
                    self.rules.push(rule);
                }
                parser::BlockElement::Check(check) => self.checks.push(check),
            }
        }
        Ok(self)
    }

    /// True when the block carries no statements.
    pub fn is_empty(&self) -> bool {
        self.facts.is_empty() && self.rules.is_empty() && self.checks.is_empty()
    }

    /// Intern the block content against the given tables.
    ///
    /// The produced block records only the symbols and keys it introduced.
    pub(crate) fn build(
        self,
        symbols: &mut SymbolTable,
        keys: &mut PublicKeys,
    ) -> Result<Block, error::Token> {
        let symbols_start = symbols.len();
        let keys_start = keys.len();

        let mut facts = Vec::with_capacity(self.facts.len());
        for fact in &self.facts {
            facts.push(fact.to_datalog(symbols)?);
        }
        let mut rules = Vec::with_capacity(self.rules.len());
        for rule in &self.rules {
            rule.validate_variables()?;
            rules.push(rule.to_datalog(symbols, keys));
        }
        let checks = self
            .checks
            .iter()
            .map(|check| check.to_datalog(symbols, keys))
            .collect();
        let scopes = self
            .scopes
            .iter()
            .map(|scope| scope.to_datalog(keys))
            .collect();

        Ok(Block {
            symbols: symbols.symbols()[symbols_start..].to_vec(),
            public_keys: keys.keys()[keys_start..].to_vec(),
            context: self.context,
            version: crate::format::MAX_BLOCK_VERSION,
            facts,
            rules,
            checks,
            scopes,
            external_key: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn facts_reject_variables() {
        let bad = Fact::new("user", [var("who")]);
        assert_eq!(bad.validate(), Err(Validation::VariableInFact));

        let nested = Fact::new("user", [array([var("who")])]);
        assert_eq!(nested.validate(), Err(Validation::VariableInFact));

        assert!(Fact::new("user", [int(1234)]).validate().is_ok());
    }

    #[test]
    fn rules_reject_unbound_head_variables() {
        let bad = rule("grant", [var("who")], [pred("user", [var("id")])]);
        assert!(matches!(
            bad.validate_variables(),
            Err(Validation::UnboundVariableInHead(names)) if names == "who"
        ));

        let good = rule("grant", [var("id")], [pred("user", [var("id")])]);
        assert!(good.validate_variables().is_ok());
    }

    #[test]
    fn builder_accepts_source_text() {
        let builder = BlockBuilder::new()
            .fact("user(1234);")
            .unwrap()
            .check("check if operation(\"read\");")
            .unwrap();
        assert_eq!(builder.facts.len(), 1);
        assert_eq!(builder.checks.len(), 1);
    }

    #[test]
    fn build_records_only_new_symbols() {
        let mut symbols = SymbolTable::new();
        let mut keys = PublicKeys::new();
        let block = BlockBuilder::new()
            // "user" is a default symbol, "alice" is not
            .fact(fact("user", [string("alice")]))
            .unwrap()
            .build(&mut symbols, &mut keys)
            .unwrap();
        assert_eq!(block.symbols, vec!["alice".to_string()]);
        assert_eq!(block.version, crate::format::MAX_BLOCK_VERSION);
    }

    #[test]
    fn check_queries_get_the_reserved_head() {
        let mut symbols = SymbolTable::new();
        let mut keys = PublicKeys::new();
        let check = check_if([rule("anything", [], [pred("operation", [var("op")])])]);
        let converted = check.to_datalog(&mut symbols, &mut keys);
        let query_index = symbols.get("query").unwrap();
        assert!(converted
            .queries
            .iter()
            .all(|query| query.head.name == query_index && query.head.terms.is_empty()));
    }
}
