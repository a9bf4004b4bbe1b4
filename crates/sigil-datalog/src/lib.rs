//! # Sigil Datalog - Logic Engine
//!
//! **Purpose**: the pure resolution core that decides authorization for
//! sigil tokens.
//!
//! This crate provides the typed value algebra, the symbol interning table,
//! the postfix expression machine, and the semi-naive fixpoint evaluator.
//! It contains no cryptography, no serialization, and no I/O; the `sigil`
//! crate layers the token chain and wire format on top of it.
//!
//! # Architecture Constraints
//!
//! - Facts, rules and checks are fully interned: strings and variable names
//!   are `u64`/`u32` indexes into a [`SymbolTable`], never owned strings.
//! - Every fact lives in exactly one [`Origin`] (a block index or the
//!   authorizer), and rule application only reads the origins listed in its
//!   [`TrustedOrigins`].
//! - Evaluation is synchronous and deterministic: fact iteration follows
//!   insertion order, so a failing check reports the same binding on every
//!   run.

#![forbid(unsafe_code)]

pub mod error;
pub mod expression;
pub mod fact;
pub mod origin;
pub mod rule;
pub mod symbol;
pub mod term;
pub mod world;

pub use error::Evaluation;
pub use expression::{Binary, Expression, Op, Unary};
pub use fact::{Fact, Predicate};
pub use origin::{Origin, Scope, TrustedOrigins};
pub use rule::{Check, CheckKind, Rule};
pub use symbol::{
    DuplicateSymbol, SymbolIndex, SymbolTable, TemporarySymbolTable, DEFAULT_SYMBOLS,
    DEFAULT_SYMBOLS_OFFSET,
};
pub use term::{MapKey, Term};
pub use world::{FactSet, RunLimits, World};
