//! Evaluation errors surfaced by the resolution engine.

use serde::{Deserialize, Serialize};

/// Error raised while evaluating expressions, applying rules, or running the
/// fixpoint loop.
///
/// These are returned by value and never recovered internally, with one
/// exception: `try_or` swallows [`Evaluation::TypeError`] from the closure it
/// guards and substitutes its fallback value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum Evaluation {
    /// The authorizer was asked for a decision without any allow/deny policy
    #[error("the authorizer has no policy to decide with")]
    AuthorizerWithoutPolicy,

    /// Checked integer arithmetic overflowed (or divided by zero)
    #[error("integer arithmetic overflow")]
    IntegerOverflow,

    /// The op list was malformed: stack underflow or leftover stack entries
    #[error("invalid expression")]
    InvalidExpression,

    /// A binary operator was applied to operands it cannot accept
    #[error("binary operator applied to an invalid operand")]
    InvalidBinaryOp,

    /// A unary operator was applied to an operand it cannot accept
    #[error("unary operator applied to an invalid operand")]
    InvalidUnaryOp,

    /// A top-level expression produced a non-boolean result
    #[error("expression did not evaluate to a boolean")]
    NonBooleanExpression,

    /// An expression referenced a variable with no binding
    #[error("unknown variable: {0}")]
    UnknownVariable(u32),

    /// A term referenced a symbol index missing from the table
    #[error("unknown symbol index: {0}")]
    UnknownSymbol(u64),

    /// An expression called a foreign function that is not registered
    #[error("unknown foreign function: {0}")]
    UnknownForeignFunction(String),

    /// Operand types do not fit the operator
    #[error("type error in expression")]
    TypeError,

    /// A closure was invoked with the wrong number of arguments
    #[error("closure expected {expected} argument(s), got {got}")]
    WrongArity {
        /// Number of parameters the closure declares
        expected: usize,
        /// Number of arguments supplied at the call site
        got: usize,
    },

    /// A closure parameter shadows a variable already visible at the call site
    #[error("closure parameter shadows variable {0}")]
    VariableShadowing(u32),

    /// A closure left another closure on the stack instead of a value
    #[error("closure evaluated to a closure instead of a value")]
    ClosureEvaluatedToClosure,

    /// The fixpoint exceeded the configured fact limit
    #[error("too many facts generated: limit is {0}")]
    TooManyFacts(u64),

    /// The fixpoint exceeded the configured iteration limit
    #[error("too many iterations: limit is {0}")]
    TooManyIterations(u64),
}
