//! Verifier-side authorization.
//!
//! An [`Authorizer`] holds the verifier's own facts, rules, checks and
//! policies. Authorizing a token loads every block's program into a fresh
//! evaluation world (translating third-party blocks out of their isolated
//! tables), runs the fixpoint, validates checks, and resolves policies in
//! order. The authorizer itself is reusable: nothing from a previous
//! authorization leaks into the next.

use crate::builder::{self, BlockBuilder, Check, Fact, Policy, PolicyKind, Rule, Term};
use crate::error::{self, AuthorizationError, Evaluation, FailedCheck, Validation};
use crate::crypto::PublicKeys;
use crate::token::{block_key_table, block_symbol_table, Block, Token};
use sigil_datalog as datalog;
use sigil_datalog::{Origin, SymbolTable, TrustedOrigins, World};
use std::collections::HashMap;

pub use sigil_datalog::RunLimits as AuthorizerLimits;

/// The verifier's program and resource limits.
#[derive(Debug, Clone, Default)]
pub struct Authorizer {
    program: BlockBuilder,
    policies: Vec<Policy>,
    limits: AuthorizerLimits,
}

impl Authorizer {
    /// Create an empty authorizer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an ambient fact. Accepts a [`Fact`] or datalog source text.
    pub fn add_fact<F>(&mut self, fact: F) -> Result<(), error::Token>
    where
        F: TryInto<Fact>,
        error::Token: From<<F as TryInto<Fact>>::Error>,
    {
        let fact = fact.try_into()?;
        fact.validate()?;
        self.program.facts.push(fact);
        Ok(())
    }

    /// Add a rule. Accepts a [`Rule`] or datalog source text.
    pub fn add_rule<R>(&mut self, rule: R) -> Result<(), error::Token>
    where
        R: TryInto<Rule>,
        error::Token: From<<R as TryInto<Rule>>::Error>,
    {
        let rule = rule.try_into()?;
        rule.validate_variables()?;
        self.program.rules.push(rule);
        Ok(())
    }

    /// Add a check. Accepts a [`Check`] or datalog source text.
    pub fn add_check<C>(&mut self, check: C) -> Result<(), error::Token>
    where
        C: TryInto<Check>,
        error::Token: From<<C as TryInto<Check>>::Error>,
    {
        self.program.checks.push(check.try_into()?);
        Ok(())
    }

    /// Add a policy. Accepts a [`Policy`] or datalog source text.
    pub fn add_policy<P>(&mut self, policy: P) -> Result<(), error::Token>
    where
        P: TryInto<Policy>,
        error::Token: From<<P as TryInto<Policy>>::Error>,
    {
        self.policies.push(policy.try_into()?);
        Ok(())
    }

    /// Parse a whole authorizer program and add its statements.
    pub fn add_code(&mut self, source: &str) -> Result<(), error::Token> {
        for element in crate::parser::parse_authorizer_source(source)? {
            match element {
                crate::parser::AuthorizerElement::Fact(fact) => {
                    fact.validate()?;
                    self.program.facts.push(fact);
                }
                crate::parser::AuthorizerElement::Rule(rule) => {
                    rule.validate_variables()?;
                    self.program.rules.push(rule);
                }
                crate::parser::AuthorizerElement::Check(check) => {
                    self.program.checks.push(check);
                }
                crate::parser::AuthorizerElement::Policy(policy) => self.policies.push(policy),
            }
        }
        Ok(())
    }

    /// Declare a default trust scope for the authorizer's own rules and
    /// checks, overriding the usual authority-only default.
    pub fn add_scope(&mut self, scope: builder::Scope) {
        self.program.scopes.push(scope);
    }

    /// Supply the current time as an ambient `time()` fact.
    ///
    /// The core has no clock; verifiers inject whatever timestamp their
    /// environment considers current.
    pub fn time(&mut self, seconds_since_epoch: u64) {
        self.program
            .facts
            .push(Fact::new("time", [Term::Date(seconds_since_epoch)]));
    }

    /// Replace the resource limits of the fixpoint run.
    pub fn set_limits(&mut self, limits: AuthorizerLimits) {
        self.limits = limits;
    }

    /// The configured resource limits.
    pub fn limits(&self) -> &AuthorizerLimits {
        &self.limits
    }

    /// Authorize a token: run the combined program to saturation, validate
    /// every check, then resolve policies in order.
    ///
    /// On success returns the index of the matching `allow` policy.
    pub fn authorize(&self, token: &Token) -> Result<usize, error::Token> {
        if self.policies.is_empty() {
            return Err(Evaluation::AuthorizerWithoutPolicy.into());
        }
        let mut session = Session::build(self, Some(token))?;
        session.world.run(&session.symbols, &self.limits)?;

        let mut failed = Vec::new();
        for (block_id, checks, block_scopes) in &session.token_checks {
            for (check_id, check) in checks.iter().enumerate() {
                if !session.check_passes(check, Origin::Block(*block_id), block_scopes)? {
                    failed.push(FailedCheck {
                        block_id: Some(*block_id),
                        check_id,
                        source: session.print_check(check)?,
                    });
                }
            }
        }
        for (check_id, (source, check)) in session.authorizer_checks.iter().enumerate() {
            if !session.check_passes(check, Origin::Authorizer, &session.authorizer_scopes)? {
                failed.push(FailedCheck {
                    block_id: None,
                    check_id,
                    source: source.to_string(),
                });
            }
        }
        if !failed.is_empty() {
            return Err(AuthorizationError::FailedChecks(failed).into());
        }

        for (policy_id, (kind, queries)) in session.policies.iter().enumerate() {
            for query in queries {
                let trusted = TrustedOrigins::from_scopes(
                    &query.scopes,
                    &session.authorizer_scopes,
                    Origin::Authorizer,
                    &session.key_map,
                );
                if session
                    .world
                    .query_match(query, &trusted, &session.symbols)?
                {
                    return match kind {
                        PolicyKind::Allow => Ok(policy_id),
                        PolicyKind::Deny => Err(AuthorizationError::DenyPolicyMatched {
                            policy_id,
                            policy: self.policies[policy_id].to_string(),
                        }
                        .into()),
                    };
                }
            }
        }
        Err(AuthorizationError::NoMatchingPolicy.into())
    }

    /// Evaluate a single check against the resolution context, without
    /// requiring an allow policy. Accepts a [`Check`] or source text.
    pub fn query<C>(&self, token: &Token, check: C) -> Result<bool, error::Token>
    where
        C: TryInto<Check>,
        error::Token: From<<C as TryInto<Check>>::Error>,
    {
        let check = check.try_into()?;
        let mut session = Session::build(self, Some(token))?;
        session.world.run(&session.symbols, &self.limits)?;
        let converted = check.to_datalog(&mut session.symbols, &mut session.keys);
        Ok(session.check_passes(&converted, Origin::Authorizer, &session.authorizer_scopes)?)
    }

    /// Apply one rule against the resolution context and return the facts
    /// it produces, for extracting data out of a token. Accepts a [`Rule`]
    /// or source text.
    pub fn query_facts<R>(&self, token: &Token, rule: R) -> Result<Vec<Fact>, error::Token>
    where
        R: TryInto<Rule>,
        error::Token: From<<R as TryInto<Rule>>::Error>,
    {
        let rule = rule.try_into()?;
        rule.validate_variables()?;
        let mut session = Session::build(self, Some(token))?;
        session.world.run(&session.symbols, &self.limits)?;
        let converted = rule.to_datalog(&mut session.symbols, &mut session.keys);
        let trusted = TrustedOrigins::from_scopes(
            &converted.scopes,
            &session.authorizer_scopes,
            Origin::Authorizer,
            &session.key_map,
        );
        let produced = session
            .world
            .query_rule(&converted, &trusted, &session.symbols)?;
        produced
            .iter()
            .map(|fact| Fact::from_datalog(fact, &session.symbols).map_err(|e: Validation| <error::Token as From<Validation>>::from(e)))
            .collect()
    }
}

/// One authorization run: the world, the tables it interns into, and the
/// programs staged for check/policy validation.
struct Session {
    world: World,
    symbols: SymbolTable,
    keys: PublicKeys,
    /// Interned third-party key index -> blocks it co-signed
    key_map: HashMap<u64, Vec<usize>>,
    /// (block id, checks, block-level scopes), in chain order
    token_checks: Vec<(usize, Vec<datalog::Check>, Vec<datalog::Scope>)>,
    /// Authorizer checks, with their builder form kept for reporting
    authorizer_checks: Vec<(Check, datalog::Check)>,
    authorizer_scopes: Vec<datalog::Scope>,
    policies: Vec<(PolicyKind, Vec<datalog::Rule>)>,
}

impl Session {
    fn build(authorizer: &Authorizer, token: Option<&Token>) -> Result<Self, error::Token> {
        let (mut symbols, mut keys) = match token {
            Some(token) => (token.symbols.clone(), token.public_keys.clone()),
            None => (SymbolTable::new(), PublicKeys::new()),
        };
        let mut world = World::new();
        let mut key_map: HashMap<u64, Vec<usize>> = HashMap::new();
        let mut token_checks = Vec::new();

        if let Some(token) = token {
            for (block_id, block) in token.blocks.iter().enumerate() {
                if let Some(key) = &block.external_key {
                    key_map.entry(keys.insert(key)).or_default().push(block_id);
                }
            }
            for (block_id, block) in token.blocks.iter().enumerate() {
                let (facts, rules, checks, scopes) =
                    load_block(token, block, &mut symbols, &mut keys)?;
                for fact in facts {
                    world.add_fact(Origin::Block(block_id), fact);
                }
                for rule in rules {
                    let trusted = TrustedOrigins::from_scopes(
                        &rule.scopes,
                        &scopes,
                        Origin::Block(block_id),
                        &key_map,
                    );
                    world.add_rule(Origin::Block(block_id), trusted, rule);
                }
                token_checks.push((block_id, checks, scopes));
            }

            // every block contributes its signature as a revocation id fact
            let revocation = symbols.insert("revocation_id");
            for (block_id, signature) in token.revocation_identifiers().into_iter().enumerate() {
                world.add_fact(
                    Origin::Authorizer,
                    datalog::Fact::new(
                        revocation,
                        vec![
                            datalog::Term::Integer(block_id as i64),
                            datalog::Term::Bytes(signature),
                        ],
                    ),
                );
            }
        }

        let authorizer_scopes: Vec<datalog::Scope> = authorizer
            .program
            .scopes
            .iter()
            .map(|scope| scope.to_datalog(&mut keys))
            .collect();
        for fact in &authorizer.program.facts {
            world.add_fact(Origin::Authorizer, fact.to_datalog(&mut symbols)?);
        }
        for rule in &authorizer.program.rules {
            rule.validate_variables()?;
            let converted = rule.to_datalog(&mut symbols, &mut keys);
            let trusted = TrustedOrigins::from_scopes(
                &converted.scopes,
                &authorizer_scopes,
                Origin::Authorizer,
                &key_map,
            );
            world.add_rule(Origin::Authorizer, trusted, converted);
        }
        let authorizer_checks = authorizer
            .program
            .checks
            .iter()
            .map(|check| (check.clone(), check.to_datalog(&mut symbols, &mut keys)))
            .collect();
        let policies = authorizer
            .policies
            .iter()
            .map(|policy| {
                (
                    policy.kind,
                    policy
                        .queries
                        .iter()
                        .map(|query| query.to_datalog(&mut symbols, &mut keys))
                        .collect(),
                )
            })
            .collect();

        Ok(Self {
            world,
            symbols,
            keys,
            key_map,
            token_checks,
            authorizer_checks,
            authorizer_scopes,
            policies,
        })
    }

    /// Decide one check against the saturated world.
    fn check_passes(
        &self,
        check: &datalog::Check,
        origin: Origin,
        block_scopes: &[datalog::Scope],
    ) -> Result<bool, error::Token> {
        let mut any = false;
        for query in &check.queries {
            let trusted =
                TrustedOrigins::from_scopes(&query.scopes, block_scopes, origin, &self.key_map);
            let matched = match check.kind {
                datalog::CheckKind::One | datalog::CheckKind::Reject => {
                    self.world.query_match(query, &trusted, &self.symbols)?
                }
                datalog::CheckKind::All => {
                    self.world.query_match_all(query, &trusted, &self.symbols)?
                }
            };
            if matched {
                any = true;
                break;
            }
        }
        Ok(match check.kind {
            datalog::CheckKind::One | datalog::CheckKind::All => any,
            datalog::CheckKind::Reject => !any,
        })
    }

    fn print_check(&self, check: &datalog::Check) -> Result<String, error::Token> {
        Ok(Check::from_datalog(check, &self.symbols, &self.keys)?.to_string())
    }
}

/// A block's program in session table space: first-party blocks pass
/// through, third-party blocks translate out of their isolated tables.
fn load_block(
    token: &Token,
    block: &Block,
    symbols: &mut SymbolTable,
    keys: &mut PublicKeys,
) -> Result<
    (
        Vec<datalog::Fact>,
        Vec<datalog::Rule>,
        Vec<datalog::Check>,
        Vec<datalog::Scope>,
    ),
    error::Token,
> {
    if block.external_key.is_none() {
        return Ok((
            block.facts.clone(),
            block.rules.clone(),
            block.checks.clone(),
            block.scopes.clone(),
        ));
    }

    let local_symbols = block_symbol_table(block, &token.symbols);
    let local_keys = block_key_table(block, &token.public_keys);

    let mut facts = Vec::with_capacity(block.facts.len());
    for fact in &block.facts {
        facts.push(builder::Fact::from_datalog(fact, &local_symbols)?.to_datalog(symbols)?);
    }
    let mut rules = Vec::with_capacity(block.rules.len());
    for rule in &block.rules {
        rules.push(
            builder::Rule::from_datalog(rule, &local_symbols, &local_keys)?
                .to_datalog(symbols, keys),
        );
    }
    let mut checks = Vec::with_capacity(block.checks.len());
    for check in &block.checks {
        checks.push(
            builder::Check::from_datalog(check, &local_symbols, &local_keys)?
                .to_datalog(symbols, keys),
        );
    }
    let mut scopes = Vec::with_capacity(block.scopes.len());
    for scope in &block.scopes {
        scopes.push(builder::Scope::from_datalog(scope, &local_keys)?.to_datalog(keys));
    }
    Ok((facts, rules, checks, scopes))
}
