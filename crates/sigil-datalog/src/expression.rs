//! Expression evaluation.
//!
//! An [`Expression`] is a postfix op list interpreted over a stack whose
//! entries are values or closures. Closures are first-class only as operands
//! to the lazy operators (`lazy_and`, `lazy_or`, `any`, `all`, `try_or`);
//! everything else consumes plain values.

use crate::error::Evaluation;
use crate::symbol::TemporarySymbolTable;
use crate::term::{MapKey, Term};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::mem::discriminant;

/// Unary operator kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Unary {
    /// Boolean negation
    Negate,
    /// Byte length of strings and bytes, cardinality of containers
    Length,
    /// Tag name of the operand, as a string
    TypeOf,
}

/// Binary operator kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Binary {
    LessThan,
    GreaterThan,
    LessOrEqual,
    GreaterOrEqual,
    /// Strict equality: both operands must carry the same tag
    Equal,
    /// Strict inequality
    NotEqual,
    /// Heterogeneous equality: differing tags compare unequal
    HeterogeneousEqual,
    /// Heterogeneous inequality
    HeterogeneousNotEqual,
    Contains,
    Prefix,
    Suffix,
    Regex,
    Add,
    Sub,
    Mul,
    Div,
    /// Eager boolean and
    And,
    /// Eager boolean or
    Or,
    Intersection,
    Union,
    BitwiseAnd,
    BitwiseOr,
    BitwiseXor,
    /// Lazy and; the right operand is a nullary closure
    LazyAnd,
    /// Lazy or; the right operand is a nullary closure
    LazyOr,
    /// Universal quantification over a container with a unary closure
    All,
    /// Existential quantification over a container with a unary closure
    Any,
    /// Array index or map key lookup, null on miss
    Get,
    /// Evaluate the left closure, substituting the right value on type error
    TryOr,
}

/// One element of a postfix op list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Op {
    /// Push a term, resolving variables against the current bindings
    Value(Term),
    /// Pop one value, push the result
    Unary(Unary),
    /// Pop right then left, push the result
    Binary(Binary),
    /// Push a closure (parameter name indexes and body ops)
    Closure(Vec<u32>, Vec<Op>),
}

/// A compiled expression: an op list evaluated left to right.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Expression {
    pub ops: Vec<Op>,
}

/// Stack entries during evaluation.
enum StackElem<'a> {
    Closure(&'a [u32], &'a [Op]),
    Term(Term),
}

impl Expression {
    /// Evaluate to a single value under the given variable bindings.
    ///
    /// The result may be any value; callers enforcing the top-level boolean
    /// contract map non-booleans to [`Evaluation::NonBooleanExpression`].
    pub fn evaluate(
        &self,
        values: &HashMap<u32, Term>,
        symbols: &mut TemporarySymbolTable,
    ) -> Result<Term, Evaluation> {
        match evaluate_ops(&self.ops, values, symbols)? {
            StackElem::Term(term) => Ok(term),
            StackElem::Closure(_, _) => Err(Evaluation::InvalidExpression),
        }
    }

    /// Evaluate and require a boolean result.
    pub fn evaluate_to_bool(
        &self,
        values: &HashMap<u32, Term>,
        symbols: &mut TemporarySymbolTable,
    ) -> Result<bool, Evaluation> {
        match self.evaluate(values, symbols)? {
            Term::Bool(value) => Ok(value),
            _ => Err(Evaluation::NonBooleanExpression),
        }
    }
}

/// Run an op list and return the single element it leaves on the stack.
fn evaluate_ops<'a>(
    ops: &'a [Op],
    values: &HashMap<u32, Term>,
    symbols: &mut TemporarySymbolTable,
) -> Result<StackElem<'a>, Evaluation> {
    let mut stack: Vec<StackElem> = Vec::new();
    for op in ops {
        match op {
            Op::Value(Term::Variable(index)) => {
                let value = values
                    .get(index)
                    .cloned()
                    .ok_or(Evaluation::UnknownVariable(*index))?;
                stack.push(StackElem::Term(value));
            }
            Op::Value(term) => stack.push(StackElem::Term(term.clone())),
            Op::Closure(params, body) => stack.push(StackElem::Closure(params, body)),
            Op::Unary(unary) => {
                let value = match stack.pop() {
                    Some(StackElem::Term(term)) => term,
                    _ => return Err(Evaluation::InvalidUnaryOp),
                };
                stack.push(StackElem::Term(unary.evaluate(value, symbols)?));
            }
            Op::Binary(binary) => {
                let right = stack.pop().ok_or(Evaluation::InvalidBinaryOp)?;
                let left = stack.pop().ok_or(Evaluation::InvalidBinaryOp)?;
                let result = binary.evaluate_elems(left, right, values, symbols)?;
                stack.push(StackElem::Term(result));
            }
        }
    }
    match stack.pop() {
        Some(element) if stack.is_empty() => Ok(element),
        _ => Err(Evaluation::InvalidExpression),
    }
}

/// Invoke a closure with the given arguments on top of the outer bindings.
fn apply_closure(
    params: &[u32],
    body: &[Op],
    args: &[Term],
    outer: &HashMap<u32, Term>,
    symbols: &mut TemporarySymbolTable,
) -> Result<Term, Evaluation> {
    if params.len() != args.len() {
        return Err(Evaluation::WrongArity {
            expected: params.len(),
            got: args.len(),
        });
    }
    let mut values = outer.clone();
    for (param, arg) in params.iter().zip(args.iter()) {
        if values.insert(*param, arg.clone()).is_some() {
            return Err(Evaluation::VariableShadowing(*param));
        }
    }
    match evaluate_ops(body, &values, symbols)? {
        StackElem::Term(term) => Ok(term),
        StackElem::Closure(_, _) => Err(Evaluation::ClosureEvaluatedToClosure),
    }
}

impl Unary {
    fn evaluate(
        &self,
        value: Term,
        symbols: &mut TemporarySymbolTable,
    ) -> Result<Term, Evaluation> {
        match (self, value) {
            (Unary::Negate, Term::Bool(b)) => Ok(Term::Bool(!b)),
            (Unary::Length, Term::Str(index)) => symbols
                .get_symbol(index)
                .ok_or(Evaluation::UnknownSymbol(index))
                .map(|s| Term::Integer(s.len() as i64)),
            (Unary::Length, Term::Bytes(bytes)) => Ok(Term::Integer(bytes.len() as i64)),
            (Unary::Length, Term::Set(set)) => Ok(Term::Integer(set.len() as i64)),
            (Unary::Length, Term::Array(array)) => Ok(Term::Integer(array.len() as i64)),
            (Unary::Length, Term::Map(map)) => Ok(Term::Integer(map.len() as i64)),
            (Unary::TypeOf, term) => {
                let index = symbols.insert(term.type_name());
                Ok(Term::Str(index))
            }
            _ => Err(Evaluation::TypeError),
        }
    }
}

impl Binary {
    /// Dispatch over stack elements, routing closure-taking operators.
    fn evaluate_elems(
        &self,
        left: StackElem,
        right: StackElem,
        values: &HashMap<u32, Term>,
        symbols: &mut TemporarySymbolTable,
    ) -> Result<Term, Evaluation> {
        match (self, left, right) {
            (Binary::LazyAnd, StackElem::Term(Term::Bool(left)), StackElem::Closure(params, body)) => {
                if !left {
                    return Ok(Term::Bool(false));
                }
                match apply_closure(params, body, &[], values, symbols)? {
                    Term::Bool(value) => Ok(Term::Bool(value)),
                    _ => Err(Evaluation::TypeError),
                }
            }
            (Binary::LazyOr, StackElem::Term(Term::Bool(left)), StackElem::Closure(params, body)) => {
                if left {
                    return Ok(Term::Bool(true));
                }
                match apply_closure(params, body, &[], values, symbols)? {
                    Term::Bool(value) => Ok(Term::Bool(value)),
                    _ => Err(Evaluation::TypeError),
                }
            }
            (Binary::Any, StackElem::Term(collection), StackElem::Closure(params, body)) => {
                for element in iterate_collection(&collection)? {
                    match apply_closure(params, body, &[element], values, symbols)? {
                        Term::Bool(true) => return Ok(Term::Bool(true)),
                        Term::Bool(false) => {}
                        _ => return Err(Evaluation::TypeError),
                    }
                }
                Ok(Term::Bool(false))
            }
            (Binary::All, StackElem::Term(collection), StackElem::Closure(params, body)) => {
                for element in iterate_collection(&collection)? {
                    match apply_closure(params, body, &[element], values, symbols)? {
                        Term::Bool(true) => {}
                        Term::Bool(false) => return Ok(Term::Bool(false)),
                        _ => return Err(Evaluation::TypeError),
                    }
                }
                Ok(Term::Bool(true))
            }
            (Binary::TryOr, StackElem::Closure(params, body), StackElem::Term(fallback)) => {
                match apply_closure(params, body, &[], values, symbols) {
                    Ok(term) => Ok(term),
                    Err(Evaluation::TypeError) => Ok(fallback),
                    Err(other) => Err(other),
                }
            }
            (_, StackElem::Term(left), StackElem::Term(right)) => {
                self.evaluate_terms(left, right, symbols)
            }
            _ => Err(Evaluation::InvalidBinaryOp),
        }
    }

    /// Semantics over two concrete values.
    fn evaluate_terms(
        &self,
        left: Term,
        right: Term,
        symbols: &mut TemporarySymbolTable,
    ) -> Result<Term, Evaluation> {
        match (self, left, right) {
            // ordering: integers and dates only
            (Binary::LessThan, Term::Integer(a), Term::Integer(b)) => Ok(Term::Bool(a < b)),
            (Binary::GreaterThan, Term::Integer(a), Term::Integer(b)) => Ok(Term::Bool(a > b)),
            (Binary::LessOrEqual, Term::Integer(a), Term::Integer(b)) => Ok(Term::Bool(a <= b)),
            (Binary::GreaterOrEqual, Term::Integer(a), Term::Integer(b)) => Ok(Term::Bool(a >= b)),
            (Binary::LessThan, Term::Date(a), Term::Date(b)) => Ok(Term::Bool(a < b)),
            (Binary::GreaterThan, Term::Date(a), Term::Date(b)) => Ok(Term::Bool(a > b)),
            (Binary::LessOrEqual, Term::Date(a), Term::Date(b)) => Ok(Term::Bool(a <= b)),
            (Binary::GreaterOrEqual, Term::Date(a), Term::Date(b)) => Ok(Term::Bool(a >= b)),

            // strict equality requires matching tags
            (Binary::Equal, a, b) => {
                if discriminant(&a) == discriminant(&b) {
                    Ok(Term::Bool(a == b))
                } else {
                    Err(Evaluation::TypeError)
                }
            }
            (Binary::NotEqual, a, b) => {
                if discriminant(&a) == discriminant(&b) {
                    Ok(Term::Bool(a != b))
                } else {
                    Err(Evaluation::TypeError)
                }
            }
            (Binary::HeterogeneousEqual, a, b) => Ok(Term::Bool(a == b)),
            (Binary::HeterogeneousNotEqual, a, b) => Ok(Term::Bool(a != b)),

            // arithmetic, checked; `+` doubles as string concatenation
            (Binary::Add, Term::Integer(a), Term::Integer(b)) => a
                .checked_add(b)
                .map(Term::Integer)
                .ok_or(Evaluation::IntegerOverflow),
            (Binary::Sub, Term::Integer(a), Term::Integer(b)) => a
                .checked_sub(b)
                .map(Term::Integer)
                .ok_or(Evaluation::IntegerOverflow),
            (Binary::Mul, Term::Integer(a), Term::Integer(b)) => a
                .checked_mul(b)
                .map(Term::Integer)
                .ok_or(Evaluation::IntegerOverflow),
            (Binary::Div, Term::Integer(a), Term::Integer(b)) => a
                .checked_div(b)
                .map(Term::Integer)
                .ok_or(Evaluation::IntegerOverflow),
            (Binary::Add, Term::Str(a), Term::Str(b)) => {
                let left = symbols
                    .get_symbol(a)
                    .ok_or(Evaluation::UnknownSymbol(a))?
                    .to_string();
                let right = symbols.get_symbol(b).ok_or(Evaluation::UnknownSymbol(b))?;
                let joined = format!("{left}{right}");
                Ok(Term::Str(symbols.insert(&joined)))
            }

            // bitwise: integers only
            (Binary::BitwiseAnd, Term::Integer(a), Term::Integer(b)) => Ok(Term::Integer(a & b)),
            (Binary::BitwiseOr, Term::Integer(a), Term::Integer(b)) => Ok(Term::Integer(a | b)),
            (Binary::BitwiseXor, Term::Integer(a), Term::Integer(b)) => Ok(Term::Integer(a ^ b)),

            // eager boolean
            (Binary::And, Term::Bool(a), Term::Bool(b)) => Ok(Term::Bool(a && b)),
            (Binary::Or, Term::Bool(a), Term::Bool(b)) => Ok(Term::Bool(a || b)),

            // string and collection containment
            (Binary::Contains, Term::Str(a), Term::Str(b)) => {
                let haystack = symbols.get_symbol(a).ok_or(Evaluation::UnknownSymbol(a))?;
                let needle = symbols.get_symbol(b).ok_or(Evaluation::UnknownSymbol(b))?;
                Ok(Term::Bool(haystack.contains(needle)))
            }
            (Binary::Contains, Term::Set(a), Term::Set(b)) => {
                Ok(Term::Bool(b.is_subset(&a)))
            }
            (Binary::Contains, Term::Set(set), element) => {
                Ok(Term::Bool(set.contains(&element)))
            }
            (Binary::Contains, Term::Array(array), element) => {
                Ok(Term::Bool(array.contains(&element)))
            }
            (Binary::Contains, Term::Map(map), key) => match key {
                Term::Integer(i) => Ok(Term::Bool(map.contains_key(&MapKey::Integer(i)))),
                Term::Str(s) => Ok(Term::Bool(map.contains_key(&MapKey::Str(s)))),
                _ => Err(Evaluation::TypeError),
            },
            (Binary::Prefix, Term::Str(a), Term::Str(b)) => {
                let string = symbols.get_symbol(a).ok_or(Evaluation::UnknownSymbol(a))?;
                let prefix = symbols.get_symbol(b).ok_or(Evaluation::UnknownSymbol(b))?;
                Ok(Term::Bool(string.starts_with(prefix)))
            }
            (Binary::Suffix, Term::Str(a), Term::Str(b)) => {
                let string = symbols.get_symbol(a).ok_or(Evaluation::UnknownSymbol(a))?;
                let suffix = symbols.get_symbol(b).ok_or(Evaluation::UnknownSymbol(b))?;
                Ok(Term::Bool(string.ends_with(suffix)))
            }
            (Binary::Regex, Term::Str(a), Term::Str(b)) => {
                let string = symbols.get_symbol(a).ok_or(Evaluation::UnknownSymbol(a))?;
                let pattern = symbols.get_symbol(b).ok_or(Evaluation::UnknownSymbol(b))?;
                let matched = Regex::new(pattern)
                    .map(|regex| regex.is_match(string))
                    .unwrap_or(false);
                Ok(Term::Bool(matched))
            }

            // set algebra
            (Binary::Intersection, Term::Set(a), Term::Set(b)) => {
                Ok(Term::Set(a.intersection(&b).cloned().collect()))
            }
            (Binary::Union, Term::Set(a), Term::Set(b)) => {
                Ok(Term::Set(a.union(&b).cloned().collect()))
            }

            // indexed access, null on miss
            (Binary::Get, Term::Array(array), Term::Integer(index)) => {
                let element = usize::try_from(index)
                    .ok()
                    .and_then(|index| array.get(index).cloned());
                Ok(element.unwrap_or(Term::Null))
            }
            (Binary::Get, Term::Map(map), key) => {
                let key = match key {
                    Term::Integer(i) => MapKey::Integer(i),
                    Term::Str(s) => MapKey::Str(s),
                    _ => return Err(Evaluation::TypeError),
                };
                Ok(map.get(&key).cloned().unwrap_or(Term::Null))
            }

            _ => Err(Evaluation::TypeError),
        }
    }
}

/// Elements of a container, in canonical order; map entries become
/// `[key, value]` pairs.
fn iterate_collection(collection: &Term) -> Result<Vec<Term>, Evaluation> {
    match collection {
        Term::Set(set) => Ok(set.iter().cloned().collect()),
        Term::Array(array) => Ok(array.clone()),
        Term::Map(map) => Ok(map
            .iter()
            .map(|(key, value)| {
                let key = match key {
                    MapKey::Integer(i) => Term::Integer(*i),
                    MapKey::Str(s) => Term::Str(*s),
                };
                Term::Array(vec![key, value.clone()])
            })
            .collect()),
        _ => Err(Evaluation::TypeError),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::SymbolTable;
    use std::collections::{BTreeMap, BTreeSet};

    fn eval(ops: Vec<Op>) -> Result<Term, Evaluation> {
        let table = SymbolTable::new();
        let mut symbols = TemporarySymbolTable::new(&table);
        Expression { ops }.evaluate(&HashMap::new(), &mut symbols)
    }

    fn eval_with(
        ops: Vec<Op>,
        values: &HashMap<u32, Term>,
        table: &SymbolTable,
    ) -> Result<Term, Evaluation> {
        let mut symbols = TemporarySymbolTable::new(table);
        Expression { ops }.evaluate(values, &mut symbols)
    }

    #[test]
    fn arithmetic_is_checked() {
        let ops = vec![
            Op::Value(Term::Integer(10_000_000_000)),
            Op::Value(Term::Integer(10_000_000_000)),
            Op::Binary(Binary::Mul),
        ];
        assert_eq!(eval(ops), Err(Evaluation::IntegerOverflow));

        let ops = vec![
            Op::Value(Term::Integer(1)),
            Op::Value(Term::Integer(0)),
            Op::Binary(Binary::Div),
        ];
        assert_eq!(eval(ops), Err(Evaluation::IntegerOverflow));
    }

    #[test]
    fn postfix_arithmetic_chain() {
        // 1 + 2 * 3 - 4 / 2 == 5
        let ops = vec![
            Op::Value(Term::Integer(1)),
            Op::Value(Term::Integer(2)),
            Op::Value(Term::Integer(3)),
            Op::Binary(Binary::Mul),
            Op::Binary(Binary::Add),
            Op::Value(Term::Integer(4)),
            Op::Value(Term::Integer(2)),
            Op::Binary(Binary::Div),
            Op::Binary(Binary::Sub),
            Op::Value(Term::Integer(5)),
            Op::Binary(Binary::HeterogeneousEqual),
        ];
        assert_eq!(eval(ops), Ok(Term::Bool(true)));
    }

    #[test]
    fn strict_equality_requires_matching_tags() {
        let ops = vec![
            Op::Value(Term::Integer(1)),
            Op::Value(Term::Bool(true)),
            Op::Binary(Binary::Equal),
        ];
        assert_eq!(eval(ops), Err(Evaluation::TypeError));

        let ops = vec![
            Op::Value(Term::Integer(1)),
            Op::Value(Term::Bool(true)),
            Op::Binary(Binary::HeterogeneousEqual),
        ];
        assert_eq!(eval(ops), Ok(Term::Bool(false)));
    }

    #[test]
    fn string_concat_and_prefix() {
        let mut table = SymbolTable::new();
        let hello = table.insert("hello ");
        let world = table.insert("world");
        let ops = vec![
            Op::Value(Term::Str(hello)),
            Op::Value(Term::Str(world)),
            Op::Binary(Binary::Add),
        ];
        let mut symbols = TemporarySymbolTable::new(&table);
        let result = Expression { ops }
            .evaluate(&HashMap::new(), &mut symbols)
            .unwrap();
        match result {
            Term::Str(index) => assert_eq!(symbols.get_symbol(index), Some("hello world")),
            other => panic!("expected string, got {other:?}"),
        }
    }

    #[test]
    fn variables_resolve_from_bindings() {
        let mut values = HashMap::new();
        values.insert(0u32, Term::Integer(7));
        let ops = vec![
            Op::Value(Term::Variable(0)),
            Op::Value(Term::Integer(7)),
            Op::Binary(Binary::Equal),
        ];
        let table = SymbolTable::new();
        assert_eq!(eval_with(ops, &values, &table), Ok(Term::Bool(true)));

        let ops = vec![Op::Value(Term::Variable(1))];
        assert_eq!(
            eval_with(ops, &values, &table),
            Err(Evaluation::UnknownVariable(1))
        );
    }

    #[test]
    fn lazy_or_skips_the_closure() {
        // true || (1/0 == 0) must not error
        let ops = vec![
            Op::Value(Term::Bool(true)),
            Op::Closure(
                vec![],
                vec![
                    Op::Value(Term::Integer(1)),
                    Op::Value(Term::Integer(0)),
                    Op::Binary(Binary::Div),
                    Op::Value(Term::Integer(0)),
                    Op::Binary(Binary::Equal),
                ],
            ),
            Op::Binary(Binary::LazyOr),
        ];
        assert_eq!(eval(ops), Ok(Term::Bool(true)));
    }

    #[test]
    fn any_iterates_and_short_circuits() {
        let set: BTreeSet<Term> = [Term::Integer(1), Term::Integer(2), Term::Integer(3)]
            .into_iter()
            .collect();
        let ops = vec![
            Op::Value(Term::Set(set)),
            Op::Closure(
                vec![9],
                vec![
                    Op::Value(Term::Variable(9)),
                    Op::Value(Term::Integer(2)),
                    Op::Binary(Binary::Equal),
                ],
            ),
            Op::Binary(Binary::Any),
        ];
        assert_eq!(eval(ops), Ok(Term::Bool(true)));
    }

    #[test]
    fn all_over_map_sees_key_value_pairs() {
        let mut map = BTreeMap::new();
        map.insert(MapKey::Integer(1), Term::Integer(10));
        map.insert(MapKey::Integer(2), Term::Integer(20));
        // all entries have value >= 10: entry.get(1) >= 10
        let ops = vec![
            Op::Value(Term::Map(map)),
            Op::Closure(
                vec![9],
                vec![
                    Op::Value(Term::Variable(9)),
                    Op::Value(Term::Integer(1)),
                    Op::Binary(Binary::Get),
                    Op::Value(Term::Integer(10)),
                    Op::Binary(Binary::GreaterOrEqual),
                ],
            ),
            Op::Binary(Binary::All),
        ];
        assert_eq!(eval(ops), Ok(Term::Bool(true)));
    }

    #[test]
    fn closure_shadowing_is_rejected() {
        let mut values = HashMap::new();
        values.insert(9u32, Term::Integer(1));
        let set: BTreeSet<Term> = [Term::Integer(1)].into_iter().collect();
        let ops = vec![
            Op::Value(Term::Set(set)),
            Op::Closure(vec![9], vec![Op::Value(Term::Bool(true))]),
            Op::Binary(Binary::Any),
        ];
        let table = SymbolTable::new();
        assert_eq!(
            eval_with(ops, &values, &table),
            Err(Evaluation::VariableShadowing(9))
        );
    }

    #[test]
    fn try_or_recovers_type_errors_only() {
        // (1 < "a").try_or(false) -> false
        let mut table = SymbolTable::new();
        let a = table.insert("a");
        let ops = vec![
            Op::Closure(
                vec![],
                vec![
                    Op::Value(Term::Integer(1)),
                    Op::Value(Term::Str(a)),
                    Op::Binary(Binary::LessThan),
                ],
            ),
            Op::Value(Term::Bool(false)),
            Op::Binary(Binary::TryOr),
        ];
        assert_eq!(
            eval_with(ops, &HashMap::new(), &table),
            Ok(Term::Bool(false))
        );

        // overflow is not recovered
        let ops = vec![
            Op::Closure(
                vec![],
                vec![
                    Op::Value(Term::Integer(i64::MAX)),
                    Op::Value(Term::Integer(1)),
                    Op::Binary(Binary::Add),
                ],
            ),
            Op::Value(Term::Bool(false)),
            Op::Binary(Binary::TryOr),
        ];
        assert_eq!(
            eval_with(ops, &HashMap::new(), &table),
            Err(Evaluation::IntegerOverflow)
        );
    }

    #[test]
    fn get_returns_null_out_of_range() {
        let ops = vec![
            Op::Value(Term::Array(vec![Term::Integer(1)])),
            Op::Value(Term::Integer(4)),
            Op::Binary(Binary::Get),
        ];
        assert_eq!(eval(ops), Ok(Term::Null));

        let ops = vec![
            Op::Value(Term::Array(vec![Term::Integer(1)])),
            Op::Value(Term::Integer(-1)),
            Op::Binary(Binary::Get),
        ];
        assert_eq!(eval(ops), Ok(Term::Null));
    }

    #[test]
    fn length_and_type_of() {
        let ops = vec![
            Op::Value(Term::Bytes(vec![1, 2, 3])),
            Op::Unary(Unary::Length),
        ];
        assert_eq!(eval(ops), Ok(Term::Integer(3)));

        let table = SymbolTable::new();
        let mut symbols = TemporarySymbolTable::new(&table);
        let result = Expression {
            ops: vec![Op::Value(Term::Integer(1)), Op::Unary(Unary::TypeOf)],
        }
        .evaluate(&HashMap::new(), &mut symbols)
        .unwrap();
        match result {
            Term::Str(index) => assert_eq!(symbols.get_symbol(index), Some("integer")),
            other => panic!("expected string, got {other:?}"),
        }
    }

    #[test]
    fn leftover_stack_is_invalid() {
        let ops = vec![Op::Value(Term::Integer(1)), Op::Value(Term::Integer(2))];
        assert_eq!(eval(ops), Err(Evaluation::InvalidExpression));
    }

    #[test]
    fn set_subset_containment() {
        let big: BTreeSet<Term> = [Term::Integer(1), Term::Integer(2), Term::Integer(3)]
            .into_iter()
            .collect();
        let small: BTreeSet<Term> = [Term::Integer(1), Term::Integer(3)].into_iter().collect();
        let ops = vec![
            Op::Value(Term::Set(big)),
            Op::Value(Term::Set(small)),
            Op::Binary(Binary::Contains),
        ];
        assert_eq!(eval(ops), Ok(Term::Bool(true)));
    }
}
