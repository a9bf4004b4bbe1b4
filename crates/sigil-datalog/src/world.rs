//! The scoped fact store and the semi-naive fixpoint.
//!
//! Facts are indexed by `(name, arity, origin)`. The evaluator keeps three
//! stores: `stable` (saturated), `recent` (produced last iteration), and the
//! iteration-local `new`. Each pass applies every rule with at least one
//! body predicate matched against `recent` only, which gives the standard
//! semi-naive guarantee that no derivation is recomputed.

use crate::error::Evaluation;
use crate::fact::Fact;
use crate::origin::{Origin, TrustedOrigins};
use crate::rule::Rule;
use crate::symbol::{SymbolIndex, SymbolTable, TemporarySymbolTable};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::ops::ControlFlow;

/// Index key for a group of facts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct FactKey {
    name: SymbolIndex,
    arity: usize,
    origin: Origin,
}

/// Facts grouped by predicate identity and origin, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct FactSet {
    inner: IndexMap<FactKey, IndexSet<Fact>>,
}

impl FactSet {
    /// Insert a fact into an origin. Returns true when the fact is new.
    pub fn insert(&mut self, origin: Origin, fact: Fact) -> bool {
        let key = FactKey {
            name: fact.predicate.name,
            arity: fact.predicate.arity(),
            origin,
        };
        self.inner.entry(key).or_default().insert(fact)
    }

    /// True when the origin already holds the fact.
    pub fn contains(&self, origin: Origin, fact: &Fact) -> bool {
        let key = FactKey {
            name: fact.predicate.name,
            arity: fact.predicate.arity(),
            origin,
        };
        self.inner
            .get(&key)
            .map(|facts| facts.contains(fact))
            .unwrap_or(false)
    }

    /// Total number of facts across all origins.
    pub fn len(&self) -> usize {
        self.inner.values().map(IndexSet::len).sum()
    }

    /// True when no facts are stored.
    pub fn is_empty(&self) -> bool {
        self.inner.values().all(IndexSet::is_empty)
    }

    /// Facts for one predicate identity, restricted to trusted origins.
    pub fn matching<'a>(
        &'a self,
        name: SymbolIndex,
        arity: usize,
        trusted: &'a TrustedOrigins,
    ) -> impl Iterator<Item = &'a Fact> {
        trusted.iter().flat_map(move |origin| {
            let key = FactKey {
                name,
                arity,
                origin: *origin,
            };
            self.inner.get(&key).into_iter().flatten()
        })
    }

    /// All facts with their origin, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (Origin, &Fact)> {
        self.inner
            .iter()
            .flat_map(|(key, facts)| facts.iter().map(move |fact| (key.origin, fact)))
    }

    /// Move every fact of `other` into this set.
    fn absorb(&mut self, other: FactSet) {
        for (key, facts) in other.inner {
            self.inner.entry(key).or_default().extend(facts);
        }
    }
}

/// Hard bounds on a fixpoint run.
///
/// `None` disables the corresponding bound. The defaults match the intended
/// use of tokens small enough to evaluate in a request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunLimits {
    /// Maximum total number of facts, counting the initial ones
    pub max_facts: Option<u64>,
    /// Maximum number of fixpoint iterations
    pub max_iterations: Option<u64>,
}

impl Default for RunLimits {
    fn default() -> Self {
        Self {
            max_facts: Some(1000),
            max_iterations: Some(100),
        }
    }
}

/// The resolution engine: facts, rules, and the fixpoint loop.
#[derive(Debug, Clone, Default)]
pub struct World {
    stable: FactSet,
    recent: FactSet,
    rules: Vec<(Origin, TrustedOrigins, Rule)>,
}

impl World {
    /// Create an empty world.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an initial fact to an origin.
    pub fn add_fact(&mut self, origin: Origin, fact: Fact) {
        self.recent.insert(origin, fact);
    }

    /// Register a rule executing in `origin`, reading `trusted` origins.
    pub fn add_rule(&mut self, origin: Origin, trusted: TrustedOrigins, rule: Rule) {
        self.rules.push((origin, trusted, rule));
    }

    /// Run rules to saturation.
    ///
    /// On success every fact is in the stable store and the world answers
    /// queries. Exceeding a limit aborts before any decision is reached.
    pub fn run(&mut self, symbols: &SymbolTable, limits: &RunLimits) -> Result<(), Evaluation> {
        let max_facts = limits.max_facts.unwrap_or(u64::MAX);
        let max_iterations = limits.max_iterations.unwrap_or(u64::MAX);

        let mut count = (self.stable.len() + self.recent.len()) as u64;
        if count > max_facts {
            return Err(Evaluation::TooManyFacts(max_facts));
        }

        let mut iterations = 0u64;
        while !self.recent.is_empty() {
            let mut new_facts = FactSet::default();
            for (origin, trusted, rule) in &self.rules {
                apply_rule(
                    &self.stable,
                    &self.recent,
                    *origin,
                    trusted,
                    rule,
                    &mut new_facts,
                    symbols,
                    &mut count,
                    max_facts,
                )?;
            }

            let recent = std::mem::take(&mut self.recent);
            self.stable.absorb(recent);
            self.recent = new_facts;

            iterations += 1;
            tracing::trace!(
                iteration = iterations,
                facts = count,
                pending = self.recent.len(),
                "fixpoint pass"
            );
            if !self.recent.is_empty() && iterations >= max_iterations {
                return Err(Evaluation::TooManyIterations(max_iterations));
            }
        }
        tracing::debug!(facts = count, iterations, "fixpoint reached");
        Ok(())
    }

    /// The saturated facts. Meaningful after [`World::run`].
    pub fn facts(&self) -> &FactSet {
        &self.stable
    }

    /// True when some binding satisfies the query's predicates and all of
    /// its expressions.
    pub fn query_match(
        &self,
        query: &Rule,
        trusted: &TrustedOrigins,
        symbols: &SymbolTable,
    ) -> Result<bool, Evaluation> {
        let candidates = self.stable_candidates(query, trusted);
        let mut found = false;
        query.for_each_binding(&candidates, &mut |binding| {
            let mut temp = TemporarySymbolTable::new(symbols);
            for expression in &query.expressions {
                if !expression.evaluate_to_bool(binding, &mut temp)? {
                    return Ok(ControlFlow::Continue(()));
                }
            }
            found = true;
            Ok(ControlFlow::Break(()))
        })?;
        Ok(found)
    }

    /// True when at least one binding satisfies the predicates and every
    /// such binding also satisfies the expressions.
    pub fn query_match_all(
        &self,
        query: &Rule,
        trusted: &TrustedOrigins,
        symbols: &SymbolTable,
    ) -> Result<bool, Evaluation> {
        let candidates = self.stable_candidates(query, trusted);
        let mut found = false;
        let mut all = true;
        query.for_each_binding(&candidates, &mut |binding| {
            found = true;
            let mut temp = TemporarySymbolTable::new(symbols);
            for expression in &query.expressions {
                if !expression.evaluate_to_bool(binding, &mut temp)? {
                    all = false;
                    return Ok(ControlFlow::Break(()));
                }
            }
            Ok(ControlFlow::Continue(()))
        })?;
        Ok(found && all)
    }

    /// Apply a query rule and collect the produced facts, deduplicated, in
    /// derivation order.
    pub fn query_rule(
        &self,
        query: &Rule,
        trusted: &TrustedOrigins,
        symbols: &SymbolTable,
    ) -> Result<Vec<Fact>, Evaluation> {
        let candidates = self.stable_candidates(query, trusted);
        let mut produced: IndexSet<Fact> = IndexSet::new();
        query.for_each_binding(&candidates, &mut |binding| {
            let mut temp = TemporarySymbolTable::new(symbols);
            for expression in &query.expressions {
                if !expression.evaluate_to_bool(binding, &mut temp)? {
                    return Ok(ControlFlow::Continue(()));
                }
            }
            if let Some(fact) = query.substitute_head(binding) {
                produced.insert(fact);
            }
            Ok(ControlFlow::Continue(()))
        })?;
        Ok(produced.into_iter().collect())
    }

    fn stable_candidates<'a>(&'a self, query: &Rule, trusted: &'a TrustedOrigins) -> Vec<Vec<&'a Fact>> {
        query
            .body
            .iter()
            .map(|predicate| {
                self.stable
                    .matching(predicate.name, predicate.arity(), trusted)
                    .collect()
            })
            .collect()
    }
}

/// Apply one rule semi-naively: enumerate bindings where at least one body
/// predicate is matched against the recent store only.
#[allow(clippy::too_many_arguments)]
fn apply_rule(
    stable: &FactSet,
    recent: &FactSet,
    origin: Origin,
    trusted: &TrustedOrigins,
    rule: &Rule,
    new_facts: &mut FactSet,
    symbols: &SymbolTable,
    count: &mut u64,
    max_facts: u64,
) -> Result<(), Evaluation> {
    if rule.body.is_empty() {
        return Ok(());
    }
    for delta_index in 0..rule.body.len() {
        // predicates before the delta read the stable store only, the delta
        // reads recent only, later ones read both; every new derivation is
        // enumerated exactly once
        let candidates: Vec<Vec<&Fact>> = rule
            .body
            .iter()
            .enumerate()
            .map(|(index, predicate)| {
                let name = predicate.name;
                let arity = predicate.arity();
                match index.cmp(&delta_index) {
                    std::cmp::Ordering::Less => stable.matching(name, arity, trusted).collect(),
                    std::cmp::Ordering::Equal => recent.matching(name, arity, trusted).collect(),
                    std::cmp::Ordering::Greater => stable
                        .matching(name, arity, trusted)
                        .chain(recent.matching(name, arity, trusted))
                        .collect(),
                }
            })
            .collect();
        if candidates[delta_index].is_empty() {
            continue;
        }

        rule.for_each_binding(&candidates, &mut |binding| {
            let mut temp = TemporarySymbolTable::new(symbols);
            for expression in &rule.expressions {
                if !expression.evaluate_to_bool(binding, &mut temp)? {
                    return Ok(ControlFlow::Continue(()));
                }
            }
            if let Some(fact) = rule.substitute_head(binding) {
                if !stable.contains(origin, &fact)
                    && !recent.contains(origin, &fact)
                    && !new_facts.contains(origin, &fact)
                {
                    *count += 1;
                    if *count > max_facts {
                        return Err(Evaluation::TooManyFacts(max_facts));
                    }
                    new_facts.insert(origin, fact);
                }
            }
            Ok(ControlFlow::Continue(()))
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::{Binary, Expression, Op};
    use crate::fact::Predicate;
    use crate::term::Term;
    use std::collections::HashMap as StdHashMap;

    fn trusted(origins: impl IntoIterator<Item = Origin>) -> TrustedOrigins {
        origins.into_iter().collect()
    }

    fn authorizer_trust() -> TrustedOrigins {
        trusted([Origin::Authorizer, Origin::Block(0)])
    }

    #[test]
    fn transitive_closure_saturates() {
        // edge facts, reach($a, $b) <- edge($a, $b)
        //             reach($a, $c) <- reach($a, $b), edge($b, $c)
        let mut symbols = SymbolTable::new();
        let edge = symbols.insert("edge");
        let reach = symbols.insert("reach");

        let mut world = World::new();
        for (a, b) in [(1, 2), (2, 3), (3, 4)] {
            world.add_fact(
                Origin::Authorizer,
                Fact::new(edge, vec![Term::Integer(a), Term::Integer(b)]),
            );
        }
        let base = Rule::new(
            Predicate::new(reach, vec![Term::Variable(0), Term::Variable(1)]),
            vec![Predicate::new(
                edge,
                vec![Term::Variable(0), Term::Variable(1)],
            )],
            vec![],
            vec![],
        );
        let step = Rule::new(
            Predicate::new(reach, vec![Term::Variable(0), Term::Variable(2)]),
            vec![
                Predicate::new(reach, vec![Term::Variable(0), Term::Variable(1)]),
                Predicate::new(edge, vec![Term::Variable(1), Term::Variable(2)]),
            ],
            vec![],
            vec![],
        );
        world.add_rule(Origin::Authorizer, authorizer_trust(), base);
        world.add_rule(Origin::Authorizer, authorizer_trust(), step);
        world.run(&symbols, &RunLimits::default()).unwrap();

        // 3 edges + 6 reachable pairs
        assert_eq!(world.facts().len(), 9);
        let query = Rule::new(
            Predicate::new(reach, vec![Term::Integer(1), Term::Integer(4)]),
            vec![Predicate::new(
                reach,
                vec![Term::Integer(1), Term::Integer(4)],
            )],
            vec![],
            vec![],
        );
        assert!(world
            .query_match(&query, &authorizer_trust(), &symbols)
            .unwrap());
    }

    #[test]
    fn scope_restriction_hides_facts() {
        let mut symbols = SymbolTable::new();
        let secret = symbols.insert("secret");

        let mut world = World::new();
        world.add_fact(Origin::Block(2), Fact::new(secret, vec![Term::Integer(1)]));
        world.run(&symbols, &RunLimits::default()).unwrap();

        let query = Rule::new(
            Predicate::new(secret, vec![Term::Variable(0)]),
            vec![Predicate::new(secret, vec![Term::Variable(0)])],
            vec![],
            vec![],
        );
        // a scope that does not list block 2 sees nothing
        assert!(!world
            .query_match(&query, &authorizer_trust(), &symbols)
            .unwrap());
        // trusting block 2 makes it visible
        assert!(world
            .query_match(&query, &trusted([Origin::Block(2)]), &symbols)
            .unwrap());
    }

    #[test]
    fn fact_limit_aborts_the_run() {
        let mut symbols = SymbolTable::new();
        let n = symbols.insert("n");

        // a counter ladder that would generate 50 facts
        let mut world = World::new();
        world.add_fact(Origin::Authorizer, Fact::new(n, vec![Term::Integer(0)]));
        for i in 0..50 {
            world.add_rule(
                Origin::Authorizer,
                authorizer_trust(),
                Rule::new(
                    Predicate::new(n, vec![Term::Integer(i + 1)]),
                    vec![Predicate::new(n, vec![Term::Integer(i)])],
                    vec![],
                    vec![],
                ),
            );
        }

        let limits = RunLimits {
            max_facts: Some(10),
            max_iterations: None,
        };
        assert_eq!(
            world.run(&symbols, &limits),
            Err(Evaluation::TooManyFacts(10))
        );
    }

    #[test]
    fn iteration_limit_aborts_the_run() {
        let mut symbols = SymbolTable::new();
        let n = symbols.insert("n");

        let mut world = World::new();
        world.add_fact(Origin::Authorizer, Fact::new(n, vec![Term::Integer(0)]));
        for i in 0..50 {
            world.add_rule(
                Origin::Authorizer,
                authorizer_trust(),
                Rule::new(
                    Predicate::new(n, vec![Term::Integer(i + 1)]),
                    vec![Predicate::new(n, vec![Term::Integer(i)])],
                    vec![],
                    vec![],
                ),
            );
        }
        let limits = RunLimits {
            max_facts: None,
            max_iterations: Some(5),
        };
        assert_eq!(
            world.run(&symbols, &limits),
            Err(Evaluation::TooManyIterations(5))
        );
    }

    #[test]
    fn query_match_all_requires_every_binding_to_satisfy() {
        let mut symbols = SymbolTable::new();
        let score = symbols.insert("score");

        let mut world = World::new();
        world.add_fact(Origin::Authorizer, Fact::new(score, vec![Term::Integer(5)]));
        world.add_fact(Origin::Authorizer, Fact::new(score, vec![Term::Integer(50)]));
        world.run(&symbols, &RunLimits::default()).unwrap();

        let positive = Rule::new(
            Predicate::new(score, vec![Term::Variable(0)]),
            vec![Predicate::new(score, vec![Term::Variable(0)])],
            vec![Expression {
                ops: vec![
                    Op::Value(Term::Variable(0)),
                    Op::Value(Term::Integer(0)),
                    Op::Binary(Binary::GreaterThan),
                ],
            }],
            vec![],
        );
        let big = Rule::new(
            Predicate::new(score, vec![Term::Variable(0)]),
            vec![Predicate::new(score, vec![Term::Variable(0)])],
            vec![Expression {
                ops: vec![
                    Op::Value(Term::Variable(0)),
                    Op::Value(Term::Integer(10)),
                    Op::Binary(Binary::GreaterThan),
                ],
            }],
            vec![],
        );
        let scope = trusted([Origin::Authorizer]);
        assert!(world.query_match_all(&positive, &scope, &symbols).unwrap());
        assert!(!world.query_match_all(&big, &scope, &symbols).unwrap());

        // no matching facts at all: check all fails
        let missing = Rule::new(
            Predicate::new(score, vec![Term::Variable(0), Term::Variable(1)]),
            vec![Predicate::new(
                score,
                vec![Term::Variable(0), Term::Variable(1)],
            )],
            vec![],
            vec![],
        );
        assert!(!world.query_match_all(&missing, &scope, &symbols).unwrap());
    }

    #[test]
    fn derived_facts_land_in_the_rule_origin() {
        let mut symbols = SymbolTable::new();
        let input = symbols.insert("input");
        let derived = symbols.insert("derived");

        let mut world = World::new();
        world.add_fact(Origin::Block(0), Fact::new(input, vec![Term::Integer(1)]));
        world.add_rule(
            Origin::Block(1),
            trusted([Origin::Block(0), Origin::Block(1), Origin::Authorizer]),
            Rule::new(
                Predicate::new(derived, vec![Term::Variable(0)]),
                vec![Predicate::new(input, vec![Term::Variable(0)])],
                vec![],
                vec![],
            ),
        );
        world.run(&symbols, &RunLimits::default()).unwrap();

        let produced: StdHashMap<Origin, Vec<&Fact>> =
            world
                .facts()
                .iter()
                .fold(StdHashMap::new(), |mut acc, (origin, fact)| {
                    acc.entry(origin).or_default().push(fact);
                    acc
                });
        assert!(produced[&Origin::Block(1)]
            .iter()
            .any(|fact| fact.predicate.name == derived));
    }
}
