//! Non-local control flow.
//!
//! `break`, `return` and errors do not produce values. They abort the current
//! evaluation step and travel outward through the `Err` arm of [`Outcome`] until a
//! construct intercepts them: `loop` catches `break`, a closure call catches
//! `return`, and the top level turns anything left into an error report. Every
//! s-expression a signal passes through is appended to its trace.

use std::fmt;

use crate::Error;
use crate::ast::{Node, Value};
use crate::location::Location;

/// Result of evaluating a node
pub type Outcome<T = Node> = Result<T, Signal>;

#[derive(Debug, Clone, PartialEq)]
pub enum Control {
    /// Leave the nearest enclosing loop, optionally with a value
    Break(Option<Node>),
    /// Leave the nearest enclosing closure call with a value
    Return(Node),
    Error(Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub control: Control,
    /// Where the signal was raised
    pub origin: Location,
    /// Locations of the forms the signal propagated through, innermost first
    pub trace: Vec<Location>,
}

impl Signal {
    fn new(control: Control, origin: Location) -> Self {
        Signal {
            control,
            origin,
            trace: Vec::new(),
        }
    }

    pub fn error(error: Error, origin: Location) -> Self {
        Signal::new(Control::Error(error), origin)
    }

    pub fn brk(payload: Option<Node>, origin: Location) -> Self {
        Signal::new(Control::Break(payload), origin)
    }

    pub fn ret(payload: Node, origin: Location) -> Self {
        Signal::new(Control::Return(payload), origin)
    }

    /// Record that the signal passed through the form at `loc`
    pub fn traced(mut self, loc: &Location) -> Self {
        if loc.is_runtime() || *loc == self.origin || self.trace.last() == Some(loc) {
            return self;
        }
        self.trace.push(loc.clone());
        self
    }

    pub fn is_break(&self) -> bool {
        matches!(self.control, Control::Break(_))
    }

    pub fn is_return(&self) -> bool {
        matches!(self.control, Control::Return(_))
    }

    pub fn as_error(&self) -> Option<&Error> {
        match &self.control {
            Control::Error(error) => Some(error),
            _ => None,
        }
    }

    /// The value carried by a `break` or `return`; `:NIL` when absent or for errors
    pub fn into_payload(self) -> Node {
        match self.control {
            Control::Break(Some(node)) | Control::Return(node) => node,
            Control::Break(None) | Control::Error(_) => Node::new(Value::nil(), self.origin),
        }
    }

    /// Convert a `break` or `return` that escaped every enclosing construct into an error
    pub fn escaped(self) -> Self {
        let error = match self.control {
            Control::Break(_) => Error::BreakOutsideLoop,
            Control::Return(_) => Error::ReturnOutsideClosure,
            Control::Error(_) => return self,
        };
        Signal {
            control: Control::Error(error),
            origin: self.origin,
            trace: self.trace,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.control {
            Control::Break(_) => write!(f, "break signal at {}", self.origin),
            Control::Return(_) => write!(f, "return signal at {}", self.origin),
            Control::Error(error) => write!(f, "{}: {error}", error.code()),
        }
    }
}

impl std::error::Error for Signal {}

impl From<Signal> for Error {
    /// Collapse a signal into the error it represents, losing its trace
    fn from(signal: Signal) -> Self {
        match signal.escaped().control {
            Control::Error(error) => error,
            Control::Break(_) => Error::BreakOutsideLoop,
            Control::Return(_) => Error::ReturnOutsideClosure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::val;
    use crate::location::Span;
    use std::rc::Rc;

    fn at(start: usize) -> Location {
        Location::new(Rc::from("test"), Span::new(start, start + 1))
    }

    #[test]
    fn test_trace_accumulates_outward() {
        let signal = Signal::error(Error::UnboundName("x".into()), at(5))
            .traced(&at(5))
            .traced(&at(3))
            .traced(&at(3))
            .traced(&Location::runtime())
            .traced(&at(0));
        assert_eq!(signal.trace, vec![at(3), at(0)]);
    }

    #[test]
    fn test_escaped_control_becomes_error() {
        let escaped = Signal::brk(None, at(1)).traced(&at(0)).escaped();
        assert_eq!(escaped.as_error(), Some(&Error::BreakOutsideLoop));
        assert_eq!(escaped.trace, vec![at(0)]);

        let escaped = Signal::ret(val(1), at(1)).escaped();
        assert_eq!(escaped.as_error(), Some(&Error::ReturnOutsideClosure));

        let error = Signal::error(Error::EvalError("boom".into()), at(1));
        assert_eq!(error.clone().escaped(), error);
    }

    #[test]
    fn test_payload() {
        assert_eq!(Signal::brk(Some(val(3)), at(0)).into_payload(), val(3));
        assert_eq!(
            Signal::brk(None, at(0)).into_payload().value,
            Value::nil()
        );
        assert_eq!(Signal::ret(val("r"), at(0)).into_payload(), val("r"));
    }
}
