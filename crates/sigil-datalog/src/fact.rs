//! Predicates and ground facts.

use crate::symbol::SymbolIndex;
use crate::term::Term;
use serde::{Deserialize, Serialize};

/// A named tuple of terms.
///
/// Predicate identity for indexing purposes is `(name, arity)` together with
/// the origin the fact lives in; see [`crate::world::FactSet`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Predicate {
    /// Interned predicate name
    pub name: SymbolIndex,
    /// Ordered arguments; variables are allowed here but not in facts
    pub terms: Vec<Term>,
}

impl Predicate {
    /// Create a predicate.
    pub fn new(name: SymbolIndex, terms: Vec<Term>) -> Self {
        Self { name, terms }
    }

    /// Number of arguments.
    pub fn arity(&self) -> usize {
        self.terms.len()
    }

    /// Indexes of the variables appearing in this predicate.
    pub fn variables(&self) -> impl Iterator<Item = u32> + '_ {
        self.terms.iter().filter_map(|term| match term {
            Term::Variable(index) => Some(*index),
            _ => None,
        })
    }
}

/// A ground predicate instance, known true in some origin.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fact {
    /// The predicate; every term is concrete
    pub predicate: Predicate,
}

impl Fact {
    /// Create a fact from an already-ground predicate.
    pub fn new(name: SymbolIndex, terms: Vec<Term>) -> Self {
        Self {
            predicate: Predicate::new(name, terms),
        }
    }

    /// True when no term holds a variable.
    pub fn is_ground(&self) -> bool {
        self.predicate.terms.iter().all(Term::is_ground)
    }
}

impl From<Predicate> for Fact {
    fn from(predicate: Predicate) -> Self {
        Self { predicate }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicate_variables_are_listed_in_order() {
        let predicate = Predicate::new(
            1030,
            vec![Term::Variable(7), Term::Integer(1), Term::Variable(2)],
        );
        assert_eq!(predicate.variables().collect::<Vec<_>>(), vec![7, 2]);
        assert_eq!(predicate.arity(), 3);
    }

    #[test]
    fn fact_groundness() {
        assert!(Fact::new(1024, vec![Term::Integer(1)]).is_ground());
        assert!(!Fact::new(1024, vec![Term::Variable(0)]).is_ground());
    }
}
