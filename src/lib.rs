//! Amalgam - an S-expression language with closures, quoting and macros
//!
//! This crate provides a small interpreted language whose programs are S-expressions.
//! Source text is read into located [`ast::Node`] values, and the same values are used
//! as runtime data, so programs can build and evaluate code.
//!
//! ```text
//! (mkfn square [x] (* x x))          ; named function
//! (setn adder (fn [n] (fn [x] (+ x n))))
//! ((adder 2) 40)                     ; closures capture lexically
//! 'quoted                            ; suspended evaluation
//! (macro twice [body] (do (eval body) (eval body)))
//! ```
//!
//! ## Evaluation model
//!
//! - Literals (numbers, strings, atoms such as `:TRUE`) evaluate to themselves
//! - Symbols are looked up through a chain of lexical frames
//! - `(op arg...)` evaluates `op` and applies it; macros receive their arguments
//!   quoted and their expansion is evaluated again in the caller's environment
//! - `break`, `return` and errors travel outward as a [`signal::Signal`] until a
//!   `loop`, a closure call or the top level intercepts them
//!
//! ## Truthiness
//!
//! The empty string, numeric zero, the empty vector, `:FALSE` and `:NIL` are false;
//! everything else is true. Predicates return `:TRUE` or `:FALSE`.
//!
//! ## Modules
//!
//! - `parser`: text to nodes, with an incremental mode for interactive input
//! - `evaluator`: evaluation, macro expansion and special forms
//! - `environment`: lexical frames
//! - `primordials`: registry of built-in callables
//! - `engine`: top-level driver with per-form isolation
//! - `diagnostic`: human-readable error reports

use crate::location::Location;
use crate::primordials::Arity;

/// Maximum nesting of brackets and quotes accepted by the parser
pub const MAX_PARSE_DEPTH: usize = 128;

/// Maximum nesting of evaluation steps before evaluation is aborted.
/// Set higher than the parse depth so that deep data can still be walked by nested calls.
pub const MAX_EVAL_DEPTH: usize = 256;

/// Categorizes the different kinds of parsing errors.
#[derive(Debug, PartialEq, Eq, Clone, Copy, thiserror::Error)]
pub enum ParseErrorKind {
    /// Input ended, or an unexpected token appeared, where a form was required
    #[error("expected expression")]
    ExpectedExpression,
    /// Extra input found after the single form that was requested
    #[error("expected end of input")]
    ExpectedEof,
    /// An opening bracket (or string quote) was never closed; more input may complete it
    #[error("missing closing bracket")]
    MissingClosing,
    /// A closing bracket appeared without a matching opening bracket
    #[error("missing opening bracket")]
    MissingOpening,
    /// Nesting exceeded the configured maximum depth
    #[error("too deeply nested")]
    TooDeeplyNested,
}

/// A structured error providing detailed information about a parsing failure.
#[derive(Debug, PartialEq, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    pub location: Location,
    /// Context snippet from the input showing where the error occurred (max 100 chars)
    pub context: Option<String>,
    /// The problematic token or character encountered, if identifiable
    pub found: Option<String>,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, message: impl Into<String>, location: Location) -> Self {
        ParseError {
            kind,
            message: message.into(),
            location,
            context: None,
            found: None,
        }
    }

    /// Attach a context snippet taken from `input` around `error_offset`
    pub fn with_context(mut self, input: &str, error_offset: usize) -> Self {
        const MAX_CONTEXT: usize = 100;

        let prefix = &input[..floor_char_boundary(input, error_offset)];
        let context_start = prefix.chars().count().saturating_sub(20);

        let context_str: String = input
            .chars()
            .skip(context_start)
            .take(MAX_CONTEXT)
            .collect();

        let mut display_context = String::new();
        if context_start > 0 {
            display_context.push_str("[...]");
        }
        display_context.push_str(&context_str);
        if context_start + context_str.chars().count() < input.chars().count() {
            display_context.push_str("[...]");
        }

        self.context = Some(display_context.replace('\n', "\\n").replace('\r', ""));
        self
    }

    pub fn with_found(mut self, found: impl Into<String>) -> Self {
        self.found = Some(found.into());
        self
    }

    /// True when the input ended inside an unfinished form and more input could complete it
    pub fn needs_more_input(&self) -> bool {
        self.kind == ParseErrorKind::MissingClosing
    }
}

fn floor_char_boundary(text: &str, mut offset: usize) -> usize {
    if offset >= text.len() {
        return text.len();
    }
    while !text.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}

/// Errors raised while evaluating. They travel to the top level inside an error signal.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Parse(#[from] ParseError),
    #[error("unbound name `{0}`")]
    UnboundName(String),
    #[error("`{0}` is not callable")]
    NotCallable(String),
    #[error("`{callee}` expects {expected} argument(s), got {got}")]
    ArityMismatch {
        callee: String,
        expected: Arity,
        got: usize,
    },
    #[error("{0}")]
    WrongType(String),
    #[error("duplicate key `:{0}` in map")]
    DuplicateKey(String),
    #[error("`break` used outside of a loop")]
    BreakOutsideLoop,
    #[error("`return` used outside of a closure")]
    ReturnOutsideClosure,
    #[error("evaluation depth limit exceeded (max: {0})")]
    DepthExceeded(usize),
    #[error("evaluation budget of {0} steps exhausted")]
    BudgetExhausted(u64),
    #[error("{0}")]
    EvalError(String),
}

impl Error {
    pub fn arity_error(callee: impl Into<String>, expected: Arity, got: usize) -> Self {
        Error::ArityMismatch {
            callee: callee.into(),
            expected,
            got,
        }
    }

    pub fn wrong_type(message: impl Into<String>) -> Self {
        Error::WrongType(message.into())
    }

    /// Stable name of the error kind, used as the code in diagnostic reports
    pub fn code(&self) -> &'static str {
        match self {
            Error::Parse(e) => match e.kind {
                ParseErrorKind::ExpectedExpression => "ExpectedExpression",
                ParseErrorKind::ExpectedEof => "ExpectedEOF",
                ParseErrorKind::MissingClosing => "MissingClosing",
                ParseErrorKind::MissingOpening => "MissingOpening",
                ParseErrorKind::TooDeeplyNested => "TooDeeplyNested",
            },
            Error::UnboundName(_) => "UnboundName",
            Error::NotCallable(_) => "NotCallable",
            Error::ArityMismatch { .. } => "ArityMismatch",
            Error::WrongType(_) => "WrongType",
            Error::DuplicateKey(_) => "DuplicateKey",
            Error::BreakOutsideLoop => "BreakOutsideLoop",
            Error::ReturnOutsideClosure => "ReturnOutsideClosure",
            Error::DepthExceeded(_) => "DepthExceeded",
            Error::BudgetExhausted(_) => "BudgetExhausted",
            Error::EvalError(_) => "EvalError",
        }
    }
}

pub mod ast;
pub mod diagnostic;
pub mod engine;
pub mod environment;
pub mod evaluator;
pub mod location;
pub mod parser;
pub mod primordials;
pub mod signal;
mod stack;

pub use ast::{Node, Value};
pub use engine::{Engine, EngineConfig};
pub use environment::Environment;
pub use evaluator::{EvalConfig, Evaluator, evaluate};
pub use parser::{ParseConfig, parse, parse_all, parse_one};
pub use signal::{Outcome, Signal};
