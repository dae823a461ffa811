//! framelisp - a tree-walking evaluator for a small Lisp dialect
//!
//! This crate evaluates parsed expression trees against a chain of lexical
//! frames, producing first-class values including closures. It implements a
//! strict subset of Racket/Scheme semantics where conditions must be real
//! booleans and every primitive validates its argument list before computing.
//!
//! ```scheme
//! (define x 5)
//! (+ x 3)                        ; 8.000000 - arithmetic always yields doubles
//! (let* ((a 1) (b (+ a 1))) b)   ; 2.000000
//! (if (> 3 2) "yes" "no")        ; "yes"
//! (cond ((= 1 2) 'a) (else 'b))  ; b
//! ```
//!
//! ## Strict Typing
//!
//! - `if`, `cond`, `and` and `or` reject non-boolean conditions (no truthiness)
//! - arithmetic and comparison primitives reject non-numeric operands
//! - closures and primitives check their argument count exactly
//!
//! Every error is fatal: evaluation stops at the first failure and the error is
//! threaded back to the caller, which (in the binary) reports it and exits with
//! a non-zero status.
//!
//! ## Modules
//!
//! - `ast`: the runtime value model, shared by the reader and the evaluator
//! - `builtinops`: primitive procedures and the special-form keyword table
//! - `evaluator`: frames, expression dispatch, special forms and closure application
//! - `interpreter`: the top-level driver that evaluates forms and prints results
//! - `scheme`: S-expression reader (feature `reader`)

use std::fmt;

/// Maximum nesting depth accepted by the reader.
/// Deeper input is rejected before evaluation starts.
pub const MAX_PARSE_DEPTH: usize = 256;

/// Default maximum evaluation depth.
/// Each nested `eval` call (argument, branch, body form, closure call) counts
/// one level. No tail calls are eliminated, so recursive programs consume one
/// or more levels per iteration; exceeding the limit is a fatal error rather
/// than a native stack overflow.
pub const DEFAULT_MAX_EVAL_DEPTH: usize = 10_000;

/// Categorizes the different kinds of parsing errors.
#[derive(Debug, PartialEq, Clone)]
pub enum ParseErrorKind {
    /// Invalid or unexpected syntax (bad tokens, stray close parenthesis)
    InvalidSyntax,
    /// Input ended before the expression was complete (EOF, unterminated string, unclosed parens)
    Incomplete,
    /// Expression nesting exceeded the maximum parse depth
    TooDeeplyNested,
    /// Extra input found after a complete, valid expression
    TrailingContent,
    /// Implementation-imposed limit exceeded (integer literal overflow)
    ImplementationLimit,
}

/// A structured error providing detailed information about a parsing failure.
#[derive(Debug, PartialEq, Clone)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    /// Context snippet from the input showing where the error occurred (max 100 chars)
    pub context: Option<String>,
    /// The problematic token or character encountered, if identifiable
    pub found: Option<String>,
}

impl ParseError {
    pub fn new(
        kind: ParseErrorKind,
        message: impl Into<String>,
        context: Option<String>,
        found: Option<String>,
    ) -> Self {
        ParseError {
            kind,
            message: message.into(),
            context,
            found,
        }
    }

    /// Create a simple ParseError with a kind and message but no context
    pub fn from_message(kind: ParseErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind, message, None, None)
    }

    /// Create a ParseError with context extracted from input at a given byte offset
    pub fn with_context_and_found(
        kind: ParseErrorKind,
        message: impl Into<String>,
        input: &str,
        error_offset: usize,
        found: Option<String>,
    ) -> Self {
        const MAX_CONTEXT: usize = 100;

        // Back up a little so the snippet shows what led to the error
        let mut context_start = error_offset.saturating_sub(20).min(input.len());
        while !input.is_char_boundary(context_start) {
            context_start -= 1;
        }

        let context_str: String = input[context_start..].chars().take(MAX_CONTEXT).collect();

        let mut display_context = String::new();
        if context_start > 0 {
            display_context.push_str("[...]");
        }
        display_context.push_str(&context_str);
        if context_start + context_str.len() < input.len() {
            display_context.push_str("[...]");
        }

        let display_context = display_context.replace('\n', "\\n").replace('\r', "");

        Self::new(kind, message, Some(display_context), found)
    }
}

/// Error types for the evaluator. Every variant is fatal to the running program.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    ParseError(ParseError),
    /// Malformed special forms and other evaluation failures
    EvalError(String),
    /// Operand of the wrong kind (non-numeric arithmetic, non-boolean condition, ...)
    TypeError(String),
    /// Symbol not bound anywhere in the frame chain
    UnboundVariable(String),
    /// `set!` on a name with no existing binding
    UndefinedMutation(String),
    /// The head of an application evaluated to a bare symbol
    NotAProcedure(String),
    ArityError {
        expected: usize,
        got: usize,
        expression: Option<String>, // Optional expression context
    },
    /// Evaluation nested deeper than the configured limit
    DepthExceeded(usize),
    /// Failure writing results or reading program text
    Io(String),
}

impl Error {
    /// Create an ArityError without expression context
    pub fn arity_error(expected: usize, got: usize) -> Self {
        Error::ArityError {
            expected,
            got,
            expression: None,
        }
    }

    /// Create an ArityError with expression context
    pub fn arity_error_with_expr(expected: usize, got: usize, expression: String) -> Self {
        Error::ArityError {
            expected,
            got,
            expression: Some(expression),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::ParseError(e) => {
                write!(f, "ParseError: {}", e.message)?;
                if let Some(found) = &e.found {
                    write!(f, "\nFound: {found}")?;
                }
                if let Some(context) = &e.context {
                    write!(f, "\nContext: {context}")?;
                }
                Ok(())
            }
            Error::EvalError(msg) => write!(f, "EvaluationError: {msg}"),
            Error::TypeError(msg) => write!(f, "Type error: {msg}"),
            Error::UnboundVariable(var) => write!(f, "Unbound variable: {var}"),
            Error::UndefinedMutation(var) => {
                write!(f, "set! must modify an existing binding: {var}")
            }
            Error::NotAProcedure(name) => {
                write!(f, "Not a recognized procedure: {name}")
            }
            Error::ArityError {
                expected,
                got,
                expression,
            } => match expression {
                Some(expr) => write!(
                    f,
                    "ArityError: {expr}: expected {expected} arguments, got {got}"
                ),
                None => write!(
                    f,
                    "ArityError: function expected {expected} arguments but got {got}"
                ),
            },
            Error::DepthExceeded(max) => {
                write!(f, "Evaluation depth limit exceeded (max: {max})")
            }
            Error::Io(msg) => write!(f, "I/O error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        Error::ParseError(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

pub mod ast;
pub mod builtinops;
pub mod evaluator;
pub mod interpreter;

#[cfg(feature = "reader")]
pub mod scheme;

pub use ast::Value;
pub use evaluator::{EvalConfig, Environment, Evaluator, apply, create_global_env, eval};
pub use interpreter::{Interpreter, interpret};

#[cfg(feature = "reader")]
pub use interpreter::run_program;
