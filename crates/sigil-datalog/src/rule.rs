//! Rules, checks, and the binding combinator.

use crate::error::Evaluation;
use crate::expression::Expression;
use crate::fact::{Fact, Predicate};
use crate::origin::Scope;
use crate::term::Term;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::ops::ControlFlow;

/// A derivation rule: `head <- body, expressions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// Produced predicate; its variables must all appear in the body
    pub head: Predicate,
    /// Predicates to match against visible facts
    pub body: Vec<Predicate>,
    /// Constraints evaluated on each candidate binding
    pub expressions: Vec<Expression>,
    /// Trust declarations; empty means the enclosing block's trust applies
    pub scopes: Vec<Scope>,
}

impl Rule {
    /// Create a rule.
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

    /// Variables bound by the body predicates.
    pub fn body_variables(&self) -> HashSet<u32> {
        self.body
            .iter()
            .flat_map(|predicate| predicate.variables())
            .collect()
    }

    /// Head variables with no binding site in the body.
    ///
    /// A non-empty result makes the rule invalid: it could never produce a
    /// ground fact.
    pub fn unbound_head_variables(&self) -> Vec<u32> {
        let bound = self.body_variables();
        self.head
            .variables()
            .filter(|variable| !bound.contains(variable))
            .collect()
    }

    /// Substitute a complete binding into the head, producing a fact.
    ///
    /// Returns `None` when a head variable has no binding; validated rules
    /// never hit that case.
    pub(crate) fn substitute_head(&self, binding: &HashMap<u32, Term>) -> Option<Fact> {
        let mut terms = Vec::with_capacity(self.head.terms.len());
        for term in &self.head.terms {
            match term {
                Term::Variable(index) => terms.push(binding.get(index)?.clone()),
                concrete => terms.push(concrete.clone()),
            }
        }
        Some(Fact::new(self.head.name, terms))
    }

    /// Enumerate every complete binding of the body against the candidate
    /// facts, one candidate list per body predicate.
    ///
    /// Expressions are not evaluated here; callers decide what a binding
    /// must additionally satisfy. The callback can stop the enumeration by
    /// returning `ControlFlow::Break`.
    pub(crate) fn for_each_binding(
        &self,
        candidates: &[Vec<&Fact>],
        f: &mut dyn FnMut(&HashMap<u32, Term>) -> Result<ControlFlow<()>, Evaluation>,
    ) -> Result<ControlFlow<()>, Evaluation> {
        debug_assert_eq!(candidates.len(), self.body.len());
        let variables = MatchedVariables::new(self.body_variables());
        descend(&self.body, candidates, variables, f)
    }
}

fn descend(
    body: &[Predicate],
    candidates: &[Vec<&Fact>],
    variables: MatchedVariables,
    f: &mut dyn FnMut(&HashMap<u32, Term>) -> Result<ControlFlow<()>, Evaluation>,
) -> Result<ControlFlow<()>, Evaluation> {
    let Some((predicate, rest_body)) = body.split_first() else {
        // every predicate matched; hand over the binding if it is complete
        if let Some(binding) = variables.complete() {
            return f(&binding);
        }
        return Ok(ControlFlow::Continue(()));
    };
    let Some((facts, rest_candidates)) = candidates.split_first() else {
        return Ok(ControlFlow::Continue(()));
    };

    for fact in facts {
        let mut next = variables.clone();
        if !match_predicate(predicate, fact, &mut next) {
            continue;
        }
        if descend(rest_body, rest_candidates, next, f)? == ControlFlow::Break(()) {
            return Ok(ControlFlow::Break(()));
        }
    }
    Ok(ControlFlow::Continue(()))
}

/// Structural unification of one predicate against one fact.
///
/// Concrete terms must be equal, variables must stay consistent with any
/// earlier binding. Purely structural, no occurs-check needed.
fn match_predicate(predicate: &Predicate, fact: &Fact, variables: &mut MatchedVariables) -> bool {
    if predicate.name != fact.predicate.name
        || predicate.terms.len() != fact.predicate.terms.len()
    {
        return false;
    }
    for (term, value) in predicate.terms.iter().zip(fact.predicate.terms.iter()) {
        match term {
            Term::Variable(index) => {
                if !variables.bind(*index, value) {
                    return false;
                }
            }
            concrete => {
                if concrete != value {
                    return false;
                }
            }
        }
    }
    true
}

/// Partial variable assignment built up while walking the body.
#[derive(Debug, Clone)]
struct MatchedVariables {
    variables: HashMap<u32, Option<Term>>,
}

impl MatchedVariables {
    fn new(variables: HashSet<u32>) -> Self {
        Self {
            variables: variables.into_iter().map(|v| (v, None)).collect(),
        }
    }

    /// Bind a variable, or confirm an existing binding. False on conflict.
    fn bind(&mut self, variable: u32, value: &Term) -> bool {
        match self.variables.get(&variable) {
            Some(Some(bound)) => bound == value,
            Some(None) => {
                self.variables.insert(variable, Some(value.clone()));
                true
            }
            // a variable that only appears in the head
            None => false,
        }
    }

    fn complete(&self) -> Option<HashMap<u32, Term>> {
        self.variables
            .iter()
            .map(|(k, v)| v.as_ref().map(|term| (*k, term.clone())))
            .collect()
    }
}

/// How a check decides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckKind {
    /// `check if`: at least one query has a satisfying binding
    #[default]
    One,
    /// `check all`: every binding satisfying a query's predicates also
    /// satisfies its expressions (and at least one binding exists)
    All,
    /// `reject if`: no query may have a satisfying binding
    Reject,
}

/// A constraint that must hold for authorization to succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Check {
    /// Alternative queries; stored as rules with the reserved `query` head
    pub queries: Vec<Rule>,
    /// Decision mode
    pub kind: CheckKind,
}

impl Check {
    /// Create a check.
    pub fn new(queries: Vec<Rule>, kind: CheckKind) -> Self {
        Self { queries, kind }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fact(name: u64, terms: Vec<Term>) -> Fact {
        Fact::new(name, terms)
    }

    #[test]
    fn unification_binds_and_stays_consistent() {
        // same($x, $x) against (1, 1) and (1, 2)
        let rule = Rule::new(
            Predicate::new(1024, vec![Term::Variable(0)]),
            vec![Predicate::new(
                1025,
                vec![Term::Variable(0), Term::Variable(0)],
            )],
            vec![],
            vec![],
        );
        let same = fact(1025, vec![Term::Integer(1), Term::Integer(1)]);
        let diff = fact(1025, vec![Term::Integer(1), Term::Integer(2)]);
        let candidates = vec![vec![&same, &diff]];

        let mut matched = Vec::new();
        rule.for_each_binding(&candidates, &mut |binding| {
            matched.push(binding.get(&0).cloned());
            Ok(ControlFlow::Continue(()))
        })
        .unwrap();
        assert_eq!(matched, vec![Some(Term::Integer(1))]);
    }

    #[test]
    fn joins_across_predicates() {
        // pair($x, $y) <- left($x), right($x, $y)
        let rule = Rule::new(
            Predicate::new(1030, vec![Term::Variable(0), Term::Variable(1)]),
            vec![
                Predicate::new(1031, vec![Term::Variable(0)]),
                Predicate::new(1032, vec![Term::Variable(0), Term::Variable(1)]),
            ],
            vec![],
            vec![],
        );
        let l1 = fact(1031, vec![Term::Integer(1)]);
        let l2 = fact(1031, vec![Term::Integer(2)]);
        let r1 = fact(1032, vec![Term::Integer(1), Term::Integer(10)]);
        let r2 = fact(1032, vec![Term::Integer(3), Term::Integer(30)]);
        let candidates = vec![vec![&l1, &l2], vec![&r1, &r2]];

        let mut produced = Vec::new();
        rule.for_each_binding(&candidates, &mut |binding| {
            produced.push(rule.substitute_head(binding).unwrap());
            Ok(ControlFlow::Continue(()))
        })
        .unwrap();
        assert_eq!(
            produced,
            vec![fact(1030, vec![Term::Integer(1), Term::Integer(10)])]
        );
    }

    #[test]
    fn unbound_head_variables_are_reported() {
        let rule = Rule::new(
            Predicate::new(1024, vec![Term::Variable(0), Term::Variable(5)]),
            vec![Predicate::new(1025, vec![Term::Variable(0)])],
            vec![],
            vec![],
        );
        assert_eq!(rule.unbound_head_variables(), vec![5]);
    }

    #[test]
    fn empty_body_yields_one_empty_binding() {
        let rule = Rule::new(Predicate::new(1024, vec![]), vec![], vec![], vec![]);
        let mut calls = 0;
        rule.for_each_binding(&[], &mut |binding| {
            assert!(binding.is_empty());
            calls += 1;
            Ok(ControlFlow::Continue(()))
        })
        .unwrap();
        assert_eq!(calls, 1);
    }
}
