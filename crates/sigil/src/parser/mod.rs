//! Text-form datalog parser.
//!
//! The text grammar is the canonical interchange for block programs; the
//! builder API constructs the same AST programmatically. Statements are
//! semicolon-terminated. Blocks accept facts, rules and checks; the
//! authorizer additionally accepts `allow if` / `deny if` policies.

mod lexer;

use crate::builder::{
    Check, CheckKind, Expression, Fact, MapKey, Op, Policy, PolicyKind, Predicate, Rule, Scope,
    Term,
};
use crate::error::ParseError;
use lexer::{lex, Spanned, Token};
use sigil_datalog::{Binary, Unary};
use std::collections::BTreeMap;

/// One statement of a block program.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum BlockElement {
    Fact(Fact),
    Rule(Rule),
    Check(Check),
}

/// One statement of an authorizer program.
#[derive(Debug, Clone)]
pub(crate) enum AuthorizerElement {
    Fact(Fact),
    Rule(Rule),
    Check(Check),
    Policy(Policy),
}

/// Parse a block program: facts, rules, and checks.
pub(crate) fn parse_block_source(source: &str) -> Result<Vec<BlockElement>, ParseError> {
    let mut parser = Parser::new(source)?;
    let mut elements = Vec::new();
    while !parser.at_end() {
        match parser.parse_statement(false)? {
            AuthorizerElement::Fact(fact) => elements.push(BlockElement::Fact(fact)),
            AuthorizerElement::Rule(rule) => elements.push(BlockElement::Rule(rule)),
            AuthorizerElement::Check(check) => elements.push(BlockElement::Check(check)),
            AuthorizerElement::Policy(_) => unreachable!("rejected by parse_statement"),
        }
    }
    Ok(elements)
}

/// Parse an authorizer program: facts, rules, checks, and policies.
pub(crate) fn parse_authorizer_source(source: &str) -> Result<Vec<AuthorizerElement>, ParseError> {
    let mut parser = Parser::new(source)?;
    let mut elements = Vec::new();
    while !parser.at_end() {
        elements.push(parser.parse_statement(true)?);
    }
    Ok(elements)
}

/// Parse a single fact, with or without the trailing semicolon.
pub(crate) fn parse_fact(source: &str) -> Result<Fact, ParseError> {
    let mut parser = Parser::new(source)?;
    let fact = parser.parse_fact_statement()?;
    parser.expect_statement_end()?;
    Ok(fact)
}

/// Parse a single rule.
pub(crate) fn parse_rule(source: &str) -> Result<Rule, ParseError> {
    let mut parser = Parser::new(source)?;
    let rule = parser.parse_rule_statement()?;
    parser.expect_statement_end()?;
    Ok(rule)
}

/// Parse a single check.
pub(crate) fn parse_check(source: &str) -> Result<Check, ParseError> {
    let mut parser = Parser::new(source)?;
    let check = parser.parse_check_statement()?;
    parser.expect_statement_end()?;
    Ok(check)
}

/// Parse a single policy.
pub(crate) fn parse_policy(source: &str) -> Result<Policy, ParseError> {
    let mut parser = Parser::new(source)?;
    let policy = parser.parse_policy_statement()?;
    parser.expect_statement_end()?;
    Ok(policy)
}

struct Parser {
    tokens: Vec<Spanned>,
    position: usize,
}

impl Parser {
    fn new(source: &str) -> Result<Self, ParseError> {
        Ok(Self {
            tokens: lex(source)?,
            position: 0,
        })
    }

    fn at_end(&self) -> bool {
        self.position >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position).map(|spanned| &spanned.token)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens
            .get(self.position + offset)
            .map(|spanned| &spanned.token)
    }

    fn next(&mut self) -> Result<Token, ParseError> {
        let token = self
            .tokens
            .get(self.position)
            .map(|spanned| spanned.token.clone())
            .ok_or(ParseError::UnexpectedEndOfCode)?;
        self.position += 1;
        Ok(token)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn expect_semicolon(&mut self) -> Result<(), ParseError> {
        if self.eat(&Token::Semicolon) {
            Ok(())
        } else {
            Err(ParseError::MissingSemicolon)
        }
    }

    /// Optional semicolon, then end of input.
    fn expect_statement_end(&mut self) -> Result<(), ParseError> {
        self.eat(&Token::Semicolon);
        if self.at_end() {
            Ok(())
        } else {
            Err(ParseError::MissingSemicolon)
        }
    }

    fn parse_statement(&mut self, policies_allowed: bool) -> Result<AuthorizerElement, ParseError> {
        let element = match self.peek().cloned() {
            Some(Token::Ident(ident)) => match ident.as_str() {
                "check" | "reject" => AuthorizerElement::Check(self.parse_check_statement()?),
                "allow" | "deny" => {
                    if !policies_allowed {
                        return Err(ParseError::UnknownBlockElement(ident));
                    }
                    AuthorizerElement::Policy(self.parse_policy_statement()?)
                }
                _ => {
                    // a predicate starts a fact or a rule
                    if self.is_rule_ahead() {
                        AuthorizerElement::Rule(self.parse_rule_statement()?)
                    } else {
                        AuthorizerElement::Fact(self.parse_fact_statement()?)
                    }
                }
            },
            Some(other) => return Err(ParseError::UnknownBlockElement(format!("{other:?}"))),
            None => return Err(ParseError::UnexpectedEndOfCode),
        };
        self.expect_semicolon()?;
        Ok(element)
    }

    /// Look past the head predicate for a `<-`.
    fn is_rule_ahead(&self) -> bool {
        let mut offset = 0;
        let mut depth = 0;
        while let Some(token) = self.peek_at(offset) {
            match token {
                Token::LParen => depth += 1,
                Token::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        return self.peek_at(offset + 1) == Some(&Token::Arrow);
                    }
                }
                Token::Semicolon => return false,
                _ => {}
            }
            offset += 1;
        }
        false
    }

    fn parse_fact_statement(&mut self) -> Result<Fact, ParseError> {
        let predicate = self.parse_predicate()?;
        let has_variable = predicate.terms.iter().any(|term| {
            matches!(term, Term::Variable(_))
        });
        if has_variable {
            return Err(ParseError::VariableInFact);
        }
        Ok(Fact { predicate })
    }

    fn parse_rule_statement(&mut self) -> Result<Rule, ParseError> {
        let head = self.parse_predicate()?;
        if !self.eat(&Token::Arrow) {
            return Err(ParseError::UnknownRuleElement(
                "expected <- after the rule head".to_string(),
            ));
        }
        let (body, expressions, scopes) = self.parse_rule_body()?;
        let rule = Rule::new(head, body, expressions, scopes);
        if let Err(crate::error::Validation::UnboundVariableInHead(names)) =
            rule.validate_variables()
        {
            return Err(ParseError::VariableInHeadAlone(names));
        }
        Ok(rule)
    }

    /// Comma-separated predicates and expressions, then an optional
    /// `trusting` clause.
    fn parse_rule_body(
        &mut self,
    ) -> Result<(Vec<Predicate>, Vec<Expression>, Vec<Scope>), ParseError> {
        let mut body = Vec::new();
        let mut expressions = Vec::new();
        loop {
            if self.is_predicate_ahead() {
                body.push(self.parse_predicate()?);
            } else {
                let ops = self.parse_expression()?;
                expressions.push(Expression { ops });
            }
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        let scopes = self.parse_trusting_clause()?;
        Ok((body, expressions, scopes))
    }

    fn is_predicate_ahead(&self) -> bool {
        match (self.peek(), self.peek_at(1)) {
            (Some(Token::Ident(ident)), Some(Token::LParen)) => {
                !matches!(ident.as_str(), "true" | "false" | "null")
            }
            _ => false,
        }
    }

    fn parse_trusting_clause(&mut self) -> Result<Vec<Scope>, ParseError> {
        if self.peek() != Some(&Token::Ident("trusting".to_string())) {
            return Ok(Vec::new());
        }
        self.position += 1;
        let mut scopes = Vec::new();
        loop {
            match self.next()? {
                Token::Ident(ident) => match ident.as_str() {
                    "authority" => scopes.push(Scope::Authority),
                    "previous" => scopes.push(Scope::Previous),
                    other => return Err(ParseError::UnknownScope(other.to_string())),
                },
                Token::Key(key) => scopes.push(Scope::PublicKey(key)),
                other => return Err(ParseError::UnknownScope(format!("{other:?}"))),
            }
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        Ok(scopes)
    }

    fn parse_check_statement(&mut self) -> Result<Check, ParseError> {
        let kind = match self.next()? {
            Token::Ident(ident) if ident == "check" => match self.next()? {
                Token::Ident(word) if word == "if" => CheckKind::One,
                Token::Ident(word) if word == "all" => CheckKind::All,
                other => return Err(ParseError::UnknownCheck(format!("{other:?}"))),
            },
            Token::Ident(ident) if ident == "reject" => match self.next()? {
                Token::Ident(word) if word == "if" => CheckKind::Reject,
                other => return Err(ParseError::UnknownCheck(format!("{other:?}"))),
            },
            other => return Err(ParseError::UnknownCheck(format!("{other:?}"))),
        };
        let queries = self.parse_queries()?;
        Ok(Check { queries, kind })
    }

    fn parse_policy_statement(&mut self) -> Result<Policy, ParseError> {
        let kind = match self.next()? {
            Token::Ident(ident) if ident == "allow" => PolicyKind::Allow,
            Token::Ident(ident) if ident == "deny" => PolicyKind::Deny,
            other => return Err(ParseError::UnknownPolicy(format!("{other:?}"))),
        };
        match self.next()? {
            Token::Ident(word) if word == "if" => {}
            other => return Err(ParseError::UnknownPolicy(format!("{other:?}"))),
        }
        let queries = self.parse_queries()?;
        Ok(Policy { queries, kind })
    }

    /// Queries separated by `or`, each a rule body with the reserved head.
    fn parse_queries(&mut self) -> Result<Vec<Rule>, ParseError> {
        let mut queries = Vec::new();
        loop {
            let (body, expressions, scopes) = self.parse_rule_body()?;
            queries.push(Rule::new(
                Predicate::new("query", []),
                body,
                expressions,
                scopes,
            ));
            if self.peek() == Some(&Token::Ident("or".to_string())) {
                self.position += 1;
            } else {
                break;
            }
        }
        Ok(queries)
    }

    fn parse_predicate(&mut self) -> Result<Predicate, ParseError> {
        let name = match self.next()? {
            Token::Ident(name) => name,
            other => return Err(ParseError::UnknownPredicate(format!("{other:?}"))),
        };
        if !self.eat(&Token::LParen) {
            return Err(ParseError::UnknownPredicate(name));
        }
        let mut terms = Vec::new();
        if !self.eat(&Token::RParen) {
            loop {
                terms.push(self.parse_term(true)?);
                if self.eat(&Token::Comma) {
                    continue;
                }
                if self.eat(&Token::RParen) {
                    break;
                }
                return Err(ParseError::MissingRightParen);
            }
        }
        Ok(Predicate { name, terms })
    }

    /// Parse one term literal. `variables_allowed` is false inside
    /// containers.
    fn parse_term(&mut self, variables_allowed: bool) -> Result<Term, ParseError> {
        match self.next()? {
            Token::Variable(name) => {
                if variables_allowed {
                    Ok(Term::Variable(name))
                } else {
                    Err(ParseError::UnknownTerm(format!("${name}")))
                }
            }
            Token::Integer(value) => Ok(Term::Integer(value)),
            Token::Minus => match self.next()? {
                Token::Integer(value) => Ok(Term::Integer(-value)),
                other => Err(ParseError::UnknownTerm(format!("{other:?}"))),
            },
            Token::Str(value) => Ok(Term::Str(value)),
            Token::Date(value) => Ok(Term::Date(value)),
            Token::Bytes(value) => Ok(Term::Bytes(value)),
            Token::Ident(ident) => match ident.as_str() {
                "true" => Ok(Term::Bool(true)),
                "false" => Ok(Term::Bool(false)),
                "null" => Ok(Term::Null),
                other => Err(ParseError::UnknownTerm(other.to_string())),
            },
            Token::LBracket => {
                let mut array = Vec::new();
                if self.eat(&Token::RBracket) {
                    return Ok(Term::Array(array));
                }
                loop {
                    array.push(self.parse_term(false)?);
                    if self.eat(&Token::Comma) {
                        continue;
                    }
                    if self.eat(&Token::RBracket) {
                        break;
                    }
                    return Err(ParseError::UnexpectedEndOfCode);
                }
                Ok(Term::Array(array))
            }
            Token::LBrace => self.parse_set_or_map(),
            other => Err(ParseError::UnknownTerm(format!("{other:?}"))),
        }
    }

    /// `{}` is the empty map, `{,}` the empty set; otherwise the first
    /// entry decides.
    fn parse_set_or_map(&mut self) -> Result<Term, ParseError> {
        if self.eat(&Token::RBrace) {
            return Ok(Term::Map(BTreeMap::new()));
        }
        if self.eat(&Token::Comma) {
            if self.eat(&Token::RBrace) {
                return Ok(Term::Set(Default::default()));
            }
            return Err(ParseError::UnknownTerm(",".to_string()));
        }

        let first = self.parse_term(false)?;
        if self.eat(&Token::Colon) {
            // map
            let mut map = BTreeMap::new();
            let key = map_key(first)?;
            if self.peek() == Some(&Token::RBrace) {
                return Err(ParseError::MapMissingValue);
            }
            let value = self.parse_term(false)?;
            map.insert(key, value);
            while self.eat(&Token::Comma) {
                let key = map_key(self.parse_term(false)?)?;
                if !self.eat(&Token::Colon) {
                    return Err(ParseError::MapMissingValue);
                }
                if self.peek() == Some(&Token::RBrace) {
                    return Err(ParseError::MapMissingValue);
                }
                let value = self.parse_term(false)?;
                if map.insert(key, value).is_some() {
                    return Err(ParseError::DuplicateMapKey);
                }
            }
            if self.eat(&Token::RBrace) {
                Ok(Term::Map(map))
            } else {
                Err(ParseError::UnexpectedEndOfCode)
            }
        } else {
            // set
            let mut set = std::collections::BTreeSet::new();
            if matches!(first, Term::Set(_)) {
                return Err(ParseError::SetInSet);
            }
            set.insert(first);
            while self.eat(&Token::Comma) {
                let term = self.parse_term(false)?;
                if matches!(term, Term::Set(_)) {
                    return Err(ParseError::SetInSet);
                }
                set.insert(term);
            }
            if self.eat(&Token::RBrace) {
                Ok(Term::Set(set))
            } else {
                Err(ParseError::UnexpectedEndOfCode)
            }
        }
    }

    // ── expression parsing, loosest binding first ────────────────────────

    fn parse_expression(&mut self) -> Result<Vec<Op>, ParseError> {
        self.parse_lazy_or()
    }

    fn parse_lazy_or(&mut self) -> Result<Vec<Op>, ParseError> {
        let mut ops = self.parse_lazy_and()?;
        while self.eat(&Token::PipePipe) {
            let right = self.parse_lazy_and()?;
            ops.push(Op::Closure(vec![], right));
            ops.push(Op::Binary(Binary::LazyOr));
        }
        Ok(ops)
    }

    fn parse_lazy_and(&mut self) -> Result<Vec<Op>, ParseError> {
        let mut ops = self.parse_comparison()?;
        while self.eat(&Token::AmpAmp) {
            let right = self.parse_comparison()?;
            ops.push(Op::Closure(vec![], right));
            ops.push(Op::Binary(Binary::LazyAnd));
        }
        Ok(ops)
    }

    /// Comparisons are non-associative: `a < b < c` is an error.
    fn parse_comparison(&mut self) -> Result<Vec<Op>, ParseError> {
        let mut ops = self.parse_bitwise_xor()?;
        if let Some(op) = self.comparison_op() {
            self.position += 1;
            let right = self.parse_bitwise_xor()?;
            ops.extend(right);
            ops.push(Op::Binary(op));
            if self.comparison_op().is_some() {
                return Err(ParseError::ChainedComparisonsWithoutParens);
            }
        }
        Ok(ops)
    }

    fn comparison_op(&self) -> Option<Binary> {
        match self.peek() {
            Some(Token::Lt) => Some(Binary::LessThan),
            Some(Token::Gt) => Some(Binary::GreaterThan),
            Some(Token::Le) => Some(Binary::LessOrEqual),
            Some(Token::Ge) => Some(Binary::GreaterOrEqual),
            Some(Token::StrictEq) => Some(Binary::Equal),
            Some(Token::StrictNeq) => Some(Binary::NotEqual),
            Some(Token::HeterogeneousEq) => Some(Binary::HeterogeneousEqual),
            Some(Token::HeterogeneousNeq) => Some(Binary::HeterogeneousNotEqual),
            _ => None,
        }
    }

    fn parse_bitwise_xor(&mut self) -> Result<Vec<Op>, ParseError> {
        let mut ops = self.parse_bitwise_or()?;
        while self.eat(&Token::Caret) {
            let right = self.parse_bitwise_or()?;
            ops.extend(right);
            ops.push(Op::Binary(Binary::BitwiseXor));
        }
        Ok(ops)
    }

    fn parse_bitwise_or(&mut self) -> Result<Vec<Op>, ParseError> {
        let mut ops = self.parse_bitwise_and()?;
        while self.peek() == Some(&Token::Pipe) {
            self.position += 1;
            let right = self.parse_bitwise_and()?;
            ops.extend(right);
            ops.push(Op::Binary(Binary::BitwiseOr));
        }
        Ok(ops)
    }

    fn parse_bitwise_and(&mut self) -> Result<Vec<Op>, ParseError> {
        let mut ops = self.parse_additive()?;
        while self.peek() == Some(&Token::Amp) {
            self.position += 1;
            let right = self.parse_additive()?;
            ops.extend(right);
            ops.push(Op::Binary(Binary::BitwiseAnd));
        }
        Ok(ops)
    }

    fn parse_additive(&mut self) -> Result<Vec<Op>, ParseError> {
        let mut ops = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => Binary::Add,
                Some(Token::Minus) => Binary::Sub,
                _ => break,
            };
            self.position += 1;
            let right = self.parse_multiplicative()?;
            ops.extend(right);
            ops.push(Op::Binary(op));
        }
        Ok(ops)
    }

    fn parse_multiplicative(&mut self) -> Result<Vec<Op>, ParseError> {
        let mut ops = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => Binary::Mul,
                Some(Token::Slash) => Binary::Div,
                _ => break,
            };
            self.position += 1;
            let right = self.parse_unary()?;
            ops.extend(right);
            ops.push(Op::Binary(op));
        }
        Ok(ops)
    }

    fn parse_unary(&mut self) -> Result<Vec<Op>, ParseError> {
        if self.eat(&Token::Bang) {
            let mut ops = self.parse_unary()?;
            ops.push(Op::Unary(Unary::Negate));
            return Ok(ops);
        }
        self.parse_postfix()
    }

    /// Method calls bind tightest and chain left to right.
    fn parse_postfix(&mut self) -> Result<Vec<Op>, ParseError> {
        let mut ops = self.parse_primary()?;
        while self.eat(&Token::Dot) {
            let method = match self.next()? {
                Token::Ident(name) => name,
                other => return Err(ParseError::UnknownMethod(format!("{other:?}"))),
            };
            if !self.eat(&Token::LParen) {
                return Err(ParseError::UnknownMethod(method));
            }
            match method.as_str() {
                "length" => {
                    self.close_method_call()?;
                    ops.push(Op::Unary(Unary::Length));
                }
                "type" => {
                    self.close_method_call()?;
                    ops.push(Op::Unary(Unary::TypeOf));
                }
                "contains" => self.one_arg_method(&mut ops, Binary::Contains)?,
                "starts_with" => self.one_arg_method(&mut ops, Binary::Prefix)?,
                "ends_with" => self.one_arg_method(&mut ops, Binary::Suffix)?,
                "matches" => self.one_arg_method(&mut ops, Binary::Regex)?,
                "intersection" => self.one_arg_method(&mut ops, Binary::Intersection)?,
                "union" => self.one_arg_method(&mut ops, Binary::Union)?,
                "get" => self.one_arg_method(&mut ops, Binary::Get)?,
                "any" => self.closure_method(&mut ops, Binary::Any)?,
                "all" => self.closure_method(&mut ops, Binary::All)?,
                "try_or" => {
                    // the receiver becomes a nullary closure
                    let receiver = std::mem::take(&mut ops);
                    ops.push(Op::Closure(vec![], receiver));
                    let fallback = self.parse_expression()?;
                    self.close_method_call()?;
                    ops.extend(fallback);
                    ops.push(Op::Binary(Binary::TryOr));
                }
                other => return Err(ParseError::UnknownMethod(other.to_string())),
            }
        }
        Ok(ops)
    }

    fn one_arg_method(&mut self, ops: &mut Vec<Op>, op: Binary) -> Result<(), ParseError> {
        let argument = self.parse_expression()?;
        self.close_method_call()?;
        ops.extend(argument);
        ops.push(Op::Binary(op));
        Ok(())
    }

    /// `$param -> body` argument for `any` and `all`.
    fn closure_method(&mut self, ops: &mut Vec<Op>, op: Binary) -> Result<(), ParseError> {
        let param = match self.next()? {
            Token::Variable(name) => name,
            other => return Err(ParseError::UnknownTerm(format!("{other:?}"))),
        };
        if !self.eat(&Token::ClosureArrow) {
            return Err(ParseError::UnknownMethod("missing -> in closure".to_string()));
        }
        let body = self.parse_expression()?;
        self.close_method_call()?;
        ops.push(Op::Closure(vec![param], body));
        ops.push(Op::Binary(op));
        Ok(())
    }

    fn close_method_call(&mut self) -> Result<(), ParseError> {
        if self.eat(&Token::RParen) {
            Ok(())
        } else {
            Err(ParseError::MissingRightParen)
        }
    }

    fn parse_primary(&mut self) -> Result<Vec<Op>, ParseError> {
        if self.eat(&Token::LParen) {
            let ops = self.parse_expression()?;
            if !self.eat(&Token::RParen) {
                return Err(ParseError::MissingRightParen);
            }
            return Ok(ops);
        }
        let term = self.parse_term(true)?;
        Ok(vec![Op::Value(term)])
    }
}

fn map_key(term: Term) -> Result<MapKey, ParseError> {
    match term {
        Term::Integer(i) => Ok(MapKey::Integer(i)),
        Term::Str(s) => Ok(MapKey::Str(s)),
        _ => Err(ParseError::InvalidMapKey),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{fact, int, pred, string, var};

    #[test]
    fn parses_facts() {
        assert_eq!(parse_fact("user(1234)").unwrap(), fact("user", [int(1234)]));
        assert_eq!(
            parse_fact("right(\"file1\", \"read\");").unwrap(),
            fact("right", [string("file1"), string("read")])
        );
        assert_eq!(parse_fact("user($who)"), Err(ParseError::VariableInFact));
    }

    #[test]
    fn parses_rules_with_expressions() {
        let rule = parse_rule("valid($id) <- user($id), $id > 100").unwrap();
        assert_eq!(rule.head, pred("valid", [var("id")]));
        assert_eq!(rule.body, vec![pred("user", [var("id")])]);
        assert_eq!(rule.expressions.len(), 1);
    }

    #[test]
    fn rule_head_variables_must_be_bound() {
        assert_eq!(
            parse_rule("grant($who) <- user($id)"),
            Err(ParseError::VariableInHeadAlone("who".to_string()))
        );
    }

    #[test]
    fn parses_checks_and_policies() {
        let check = parse_check("check if operation(\"read\")").unwrap();
        assert_eq!(check.kind, CheckKind::One);
        assert_eq!(check.queries.len(), 1);

        let check = parse_check("check all fact($x), $x > 0").unwrap();
        assert_eq!(check.kind, CheckKind::All);

        let check = parse_check("reject if revoked(true)").unwrap();
        assert_eq!(check.kind, CheckKind::Reject);

        let policy = parse_policy("allow if user(1234)").unwrap();
        assert_eq!(policy.kind, PolicyKind::Allow);

        let policy = parse_policy("deny if true").unwrap();
        assert_eq!(policy.kind, PolicyKind::Deny);
        assert!(policy.queries[0].body.is_empty());
        assert_eq!(policy.queries[0].expressions.len(), 1);
    }

    #[test]
    fn queries_split_on_or() {
        let check = parse_check("check if admin(true) or operation(\"read\"), resource($r)")
            .unwrap();
        assert_eq!(check.queries.len(), 2);
        assert_eq!(check.queries[1].body.len(), 2);
    }

    #[test]
    fn arithmetic_precedence() {
        let check = parse_check("check if 1 + 2 * 3 - 4 / 2 == 5").unwrap();
        let expression = &check.queries[0].expressions[0];
        // evaluates to true under the datalog engine
        let mut symbols = sigil_datalog::SymbolTable::new();
        let converted = expression.to_datalog(&mut symbols);
        let mut temp = sigil_datalog::TemporarySymbolTable::new(&symbols);
        assert_eq!(
            converted.evaluate(&Default::default(), &mut temp),
            Ok(sigil_datalog::Term::Bool(true))
        );
    }

    #[test]
    fn chained_comparisons_are_rejected() {
        assert_eq!(
            parse_policy("allow if 1 < 2 < 3"),
            Err(ParseError::ChainedComparisonsWithoutParens)
        );
        // parenthesized chains parse
        assert!(parse_policy("allow if (1 < 2) == (2 < 3)").is_ok());
    }

    #[test]
    fn lazy_operators_wrap_the_right_operand() {
        let policy = parse_policy("allow if false || true").unwrap();
        let ops = &policy.queries[0].expressions[0].ops;
        assert!(matches!(ops[1], Op::Closure(ref params, _) if params.is_empty()));
        assert!(matches!(ops[2], Op::Binary(Binary::LazyOr)));
    }

    #[test]
    fn methods_and_closures() {
        let check = parse_check("check if [1, 2, 3].any($p -> $p > 2)").unwrap();
        let ops = &check.queries[0].expressions[0].ops;
        assert!(matches!(ops[1], Op::Closure(ref params, _) if params == &["p".to_string()]));
        assert!(matches!(ops[2], Op::Binary(Binary::Any)));

        let check = parse_check("check if $p.starts_with(\"/files/\")").unwrap();
        let ops = &check.queries[0].expressions[0].ops;
        assert!(matches!(ops[2], Op::Binary(Binary::Prefix)));

        let check = parse_check("check if $x.try_or(false)").unwrap();
        let ops = &check.queries[0].expressions[0].ops;
        assert!(matches!(ops[0], Op::Closure(_, _)));
        assert!(matches!(ops[2], Op::Binary(Binary::TryOr)));
    }

    #[test]
    fn set_and_map_literals() {
        let fact = parse_fact("groups({\"a\", \"b\"})").unwrap();
        assert!(matches!(fact.predicate.terms[0], Term::Set(ref s) if s.len() == 2));

        let fact = parse_fact("empty({,})").unwrap();
        assert!(matches!(fact.predicate.terms[0], Term::Set(ref s) if s.is_empty()));

        let fact = parse_fact("config({\"depth\": 2})").unwrap();
        assert!(matches!(fact.predicate.terms[0], Term::Map(ref m) if m.len() == 1));

        let fact = parse_fact("config({})").unwrap();
        assert!(matches!(fact.predicate.terms[0], Term::Map(ref m) if m.is_empty()));

        assert_eq!(
            parse_fact("nested({{1}, 2})"),
            Err(ParseError::SetInSet)
        );
        assert_eq!(
            parse_fact("dup({\"a\": 1, \"a\": 2})"),
            Err(ParseError::DuplicateMapKey)
        );
        assert_eq!(
            parse_fact("badkey({true: 1})"),
            Err(ParseError::InvalidMapKey)
        );
    }

    #[test]
    fn trusting_clauses() {
        let rule = parse_rule("ok($x) <- user($x) trusting authority").unwrap();
        assert_eq!(rule.scopes, vec![Scope::Authority]);

        let check = parse_check("check if user($x) trusting previous").unwrap();
        assert_eq!(check.queries[0].scopes, vec![Scope::Previous]);

        assert_eq!(
            parse_rule("ok($x) <- user($x) trusting somewhere"),
            Err(ParseError::UnknownScope("somewhere".to_string()))
        );
    }

    #[test]
    fn policies_are_rejected_in_blocks() {
        assert!(matches!(
            parse_block_source("allow if true;"),
            Err(ParseError::UnknownBlockElement(_))
        ));
        assert!(parse_authorizer_source("time(1234); allow if true;").is_ok());
    }

    #[test]
    fn missing_semicolon_in_programs() {
        assert_eq!(
            parse_block_source("user(1234) user(5678);"),
            Err(ParseError::MissingSemicolon)
        );
    }

    #[test]
    fn missing_right_paren() {
        assert_eq!(
            parse_fact("user(1234"),
            Err(ParseError::MissingRightParen)
        );
    }

    #[test]
    fn dates_parse_in_terms() {
        let check = parse_check("check if time($t), $t < 2030-01-01T00:00:00Z").unwrap();
        assert_eq!(check.queries[0].body.len(), 1);
        assert_eq!(check.queries[0].expressions.len(), 1);
    }
}
