//! The typed value algebra.
//!
//! A [`Term`] is either a concrete value or a variable; facts only ever hold
//! concrete terms. Strings are interned symbol indexes, dates are seconds
//! since the epoch, and the container variants (`Set`, `Array`, `Map`) nest
//! arbitrarily except that sets may not contain sets.

use crate::symbol::SymbolIndex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

/// A datalog term: a concrete value or a variable awaiting a binding.
///
/// The declaration order of the variants is also the canonical tag order
/// used for wire-level comparison and for sorting set and map entries:
/// variable < integer < string < date < bytes < bool < set < null < array
/// < map.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Term {
    /// Named variable, as a symbol index of its name
    Variable(u32),
    /// 64-bit signed integer
    Integer(i64),
    /// Interned UTF-8 string
    Str(SymbolIndex),
    /// Seconds since the Unix epoch
    Date(u64),
    /// Raw byte string
    Bytes(Vec<u8>),
    /// Boolean
    Bool(bool),
    /// Unordered collection; elements may be heterogeneous but never sets
    Set(BTreeSet<Term>),
    /// Absent value
    Null,
    /// Ordered collection
    Array(Vec<Term>),
    /// Keyed collection; keys are integers or interned strings
    Map(BTreeMap<MapKey, Term>),
}

/// Key of a [`Term::Map`] entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MapKey {
    /// Integer key
    Integer(i64),
    /// Interned string key
    Str(SymbolIndex),
}

impl Term {
    /// Rank of the variant in the canonical tag order.
    fn tag_rank(&self) -> u8 {
        match self {
            Term::Variable(_) => 0,
            Term::Integer(_) => 1,
            Term::Str(_) => 2,
            Term::Date(_) => 3,
            Term::Bytes(_) => 4,
            Term::Bool(_) => 5,
            Term::Set(_) => 6,
            Term::Null => 7,
            Term::Array(_) => 8,
            Term::Map(_) => 9,
        }
    }

    /// The tag name reported by the `type()` operator.
    pub fn type_name(&self) -> &'static str {
        match self {
            Term::Variable(_) => "variable",
            Term::Integer(_) => "integer",
            Term::Str(_) => "string",
            Term::Date(_) => "date",
            Term::Bytes(_) => "bytes",
            Term::Bool(_) => "bool",
            Term::Set(_) => "set",
            Term::Null => "null",
            Term::Array(_) => "array",
            Term::Map(_) => "map",
        }
    }

    /// True when the term contains no variable at any depth.
    ///
    /// Only top-level terms can be variables (the parser and builder reject
    /// variables inside containers), but ground-ness is checked recursively
    /// anyway so that hand-built programs cannot smuggle one through.
    pub fn is_ground(&self) -> bool {
        match self {
            Term::Variable(_) => false,
            Term::Set(set) => set.iter().all(Term::is_ground),
            Term::Array(array) => array.iter().all(Term::is_ground),
            Term::Map(map) => map.values().all(Term::is_ground),
            _ => true,
        }
    }
}

impl Ord for Term {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Term::Variable(a), Term::Variable(b)) => a.cmp(b),
            (Term::Integer(a), Term::Integer(b)) => a.cmp(b),
            (Term::Str(a), Term::Str(b)) => a.cmp(b),
            (Term::Date(a), Term::Date(b)) => a.cmp(b),
            // Byte strings order shorter-first, then lexicographically
            (Term::Bytes(a), Term::Bytes(b)) => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
            (Term::Bool(a), Term::Bool(b)) => a.cmp(b),
            (Term::Set(a), Term::Set(b)) => a.iter().cmp(b.iter()),
            (Term::Null, Term::Null) => Ordering::Equal,
            (Term::Array(a), Term::Array(b)) => a.iter().cmp(b.iter()),
            (Term::Map(a), Term::Map(b)) => a.iter().cmp(b.iter()),
            _ => self.tag_rank().cmp(&other.tag_rank()),
        }
    }
}

impl PartialOrd for Term {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
