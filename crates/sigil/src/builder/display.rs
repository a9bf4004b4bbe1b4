//! Source rendering of builder types.
//!
//! The printed form is re-parseable datalog. Expressions are stored as
//! postfix op lists; rendering rebuilds the infix form with parentheses
//! driven by operator precedence.

use super::{Check, CheckKind, Expression, Fact, MapKey, Op, Policy, PolicyKind, Predicate, Rule, Scope, Term};
use sigil_datalog::{Binary, Unary};
use std::fmt;

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Variable(name) => write!(f, "${name}"),
            Term::Integer(i) => write!(f, "{i}"),
            Term::Str(s) => write!(f, "\"{}\"", s.escape_debug()),
            Term::Date(d) => match chrono::DateTime::from_timestamp(*d as i64, 0) {
                Some(date) => write!(
                    f,
                    "{}",
                    date.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
                ),
                None => write!(f, "{d}"),
            },
            Term::Bytes(b) => write!(f, "hex:{}", hex::encode(b)),
            Term::Bool(true) => write!(f, "true"),
            Term::Bool(false) => write!(f, "false"),
            Term::Null => write!(f, "null"),
            Term::Set(set) => {
                if set.is_empty() {
                    return write!(f, "{{,}}");
                }
                write!(f, "{{")?;
                for (i, term) in set.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{term}")?;
                }
                write!(f, "}}")
            }
            Term::Array(array) => {
                write!(f, "[")?;
                for (i, term) in array.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{term}")?;
                }
                write!(f, "]")
            }
            Term::Map(map) => {
                write!(f, "{{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    match key {
                        MapKey::Integer(k) => write!(f, "{k}: {value}")?,
                        MapKey::Str(k) => write!(f, "\"{}\": {value}", k.escape_debug())?,
                    }
                }
                write!(f, "}}")
            }
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, term) in self.terms.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{term}")?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.predicate)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Authority => write!(f, "authority"),
            Scope::Previous => write!(f, "previous"),
            Scope::PublicKey(key) => write!(f, "{key}"),
        }
    }
}

/// Precedence of the rendered fragment; atoms and method results bind
/// tightest.
const ATOM: u8 = 10;

fn infix_precedence(op: Binary) -> Option<(u8, &'static str)> {
    match op {
        Binary::Mul => Some((8, "*")),
        Binary::Div => Some((8, "/")),
        Binary::Add => Some((7, "+")),
        Binary::Sub => Some((7, "-")),
        Binary::BitwiseAnd => Some((6, "&")),
        Binary::BitwiseOr => Some((5, "|")),
        Binary::BitwiseXor => Some((4, "^")),
        Binary::LessThan => Some((3, "<")),
        Binary::GreaterThan => Some((3, ">")),
        Binary::LessOrEqual => Some((3, "<=")),
        Binary::GreaterOrEqual => Some((3, ">=")),
        Binary::Equal => Some((3, "===")),
        Binary::NotEqual => Some((3, "!==")),
        Binary::HeterogeneousEqual => Some((3, "==")),
        Binary::HeterogeneousNotEqual => Some((3, "!=")),
        Binary::And | Binary::LazyAnd => Some((2, "&&")),
        Binary::Or | Binary::LazyOr => Some((1, "||")),
        _ => None,
    }
}

fn method_name(op: Binary) -> &'static str {
    match op {
        Binary::Contains => "contains",
        Binary::Prefix => "starts_with",
        Binary::Suffix => "ends_with",
        Binary::Regex => "matches",
        Binary::Intersection => "intersection",
        Binary::Union => "union",
        Binary::Get => "get",
        Binary::TryOr => "try_or",
        Binary::All => "all",
        Binary::Any => "any",
        _ => "",
    }
}

/// Render an op list to an infix string plus its outer precedence.
fn render_ops(ops: &[Op]) -> (String, u8) {
    let mut stack: Vec<(String, u8)> = Vec::new();
    for op in ops {
        match op {
            Op::Value(term) => stack.push((term.to_string(), ATOM)),
            Op::Closure(params, body) => {
                let (rendered, precedence) = render_ops(body);
                if params.is_empty() {
                    stack.push((rendered, precedence));
                } else {
                    let params = params
                        .iter()
                        .map(|p| format!("${p}"))
                        .collect::<Vec<_>>()
                        .join(", ");
                    stack.push((format!("{params} -> {rendered}"), 0));
                }
            }
            Op::Unary(kind) => {
                let (operand, precedence) = stack.pop().unwrap_or(("?".to_string(), ATOM));
                match kind {
                    Unary::Negate => {
                        let operand = parenthesize(&operand, precedence < 9);
                        stack.push((format!("!{operand}"), 9));
                    }
                    Unary::Length => {
                        let operand = parenthesize(&operand, precedence < ATOM);
                        stack.push((format!("{operand}.length()"), ATOM));
                    }
                    Unary::TypeOf => {
                        let operand = parenthesize(&operand, precedence < ATOM);
                        stack.push((format!("{operand}.type()"), ATOM));
                    }
                }
            }
            Op::Binary(kind) => {
                let (right, right_precedence) = stack.pop().unwrap_or(("?".to_string(), ATOM));
                let (left, left_precedence) = stack.pop().unwrap_or(("?".to_string(), ATOM));
                if let Some((precedence, symbol)) = infix_precedence(*kind) {
                    let left = parenthesize(&left, left_precedence < precedence);
                    let right = parenthesize(&right, right_precedence <= precedence);
                    stack.push((format!("{left} {symbol} {right}"), precedence));
                } else {
                    let receiver = parenthesize(&left, left_precedence < ATOM);
                    stack.push((format!("{receiver}.{}({right})", method_name(*kind)), ATOM));
                }
            }
        }
    }
    stack.pop().unwrap_or(("?".to_string(), ATOM))
}

fn parenthesize(fragment: &str, wrap: bool) -> String {
    if wrap {
        format!("({fragment})")
    } else {
        fragment.to_string()
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", render_ops(&self.ops).0)
    }
}

/// Body, expressions, and an optional `trusting` clause, shared by rule and
/// query rendering.
fn write_rule_body(f: &mut fmt::Formatter<'_>, rule: &Rule) -> fmt::Result {
    let mut first = true;
    for predicate in &rule.body {
        if !first {
            write!(f, ", ")?;
        }
        first = false;
        write!(f, "{predicate}")?;
    }
    for expression in &rule.expressions {
        if !first {
            write!(f, ", ")?;
        }
        first = false;
        write!(f, "{expression}")?;
    }
    if rule.body.is_empty() && rule.expressions.is_empty() {
        write!(f, "true")?;
    }
    if !rule.scopes.is_empty() {
        write!(f, " trusting ")?;
        for (i, scope) in rule.scopes.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{scope}")?;
        }
    }
    Ok(())
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <- ", self.head)?;
        write_rule_body(f, self)
    }
}

fn write_queries(f: &mut fmt::Formatter<'_>, queries: &[Rule]) -> fmt::Result {
    for (i, query) in queries.iter().enumerate() {
        if i > 0 {
            write!(f, " or ")?;
        }
        write_rule_body(f, query)?;
    }
    Ok(())
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            CheckKind::One => write!(f, "check if ")?,
            CheckKind::All => write!(f, "check all ")?,
            CheckKind::Reject => write!(f, "reject if ")?,
        }
        write_queries(f, &self.queries)
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            PolicyKind::Allow => write!(f, "allow if ")?,
            PolicyKind::Deny => write!(f, "deny if ")?,
        }
        write_queries(f, &self.queries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{check_if, fact, int, pred, query, string, var};

    #[test]
    fn terms_render_as_source() {
        assert_eq!(var("id").to_string(), "$id");
        assert_eq!(string("a\"b").to_string(), "\"a\\\"b\"");
        assert_eq!(Term::Bytes(vec![0xab, 0x01]).to_string(), "hex:ab01");
        assert_eq!(Term::Date(0).to_string(), "1970-01-01T00:00:00Z");
        assert_eq!(
            crate::builder::set([]).to_string(),
            "{,}"
        );
        assert_eq!(
            crate::builder::array([int(1), int(2)]).to_string(),
            "[1, 2]"
        );
    }

    #[test]
    fn facts_and_checks_render_as_source() {
        assert_eq!(fact("user", [int(1234)]).to_string(), "user(1234)");
        let check = check_if([query([pred("operation", [string("read")])], [])]);
        assert_eq!(check.to_string(), "check if operation(\"read\")");
    }

    #[test]
    fn expressions_render_with_precedence() {
        use crate::builder::{Expression, Op};
        use sigil_datalog::Binary;

        // 1 + 2 * 3 in postfix
        let expression = Expression {
            ops: vec![
                Op::Value(int(1)),
                Op::Value(int(2)),
                Op::Value(int(3)),
                Op::Binary(Binary::Mul),
                Op::Binary(Binary::Add),
            ],
        };
        assert_eq!(expression.to_string(), "1 + 2 * 3");

        // (1 + 2) * 3 needs parentheses back
        let expression = Expression {
            ops: vec![
                Op::Value(int(1)),
                Op::Value(int(2)),
                Op::Binary(Binary::Add),
                Op::Value(int(3)),
                Op::Binary(Binary::Mul),
            ],
        };
        assert_eq!(expression.to_string(), "(1 + 2) * 3");
    }

    #[test]
    fn lazy_operators_render_infix() {
        use crate::builder::{Expression, Op};
        use sigil_datalog::Binary;

        let expression = Expression {
            ops: vec![
                Op::Value(Term::Bool(true)),
                Op::Closure(vec![], vec![Op::Value(Term::Bool(false))]),
                Op::Binary(Binary::LazyAnd),
            ],
        };
        assert_eq!(expression.to_string(), "true && false");
    }

    #[test]
    fn methods_render_with_receiver() {
        use crate::builder::{Expression, Op};
        use sigil_datalog::Binary;

        let expression = Expression {
            ops: vec![
                Op::Value(var("path")),
                Op::Value(string("/files/")),
                Op::Binary(Binary::Prefix),
            ],
        };
        assert_eq!(expression.to_string(), "$path.starts_with(\"/files/\")");
    }
}
