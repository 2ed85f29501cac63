//! This module defines the value model shared by source code and runtime data.
//! Every parsed or computed datum is a [`Node`]: a [`Value`] plus the [`Location`] it
//! came from. Locations take no part in equality, so a node read from source compares
//! equal to the same value built in Rust with the helpers [`val`], [`sym`], [`atom`],
//! [`sexpr`], [`quoted`] and [`nil`]. Conversion traits for common Rust types make it
//! easy to build vectors and literals in code and tests.

use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use crate::Error;
use crate::environment::Environment;
use crate::location::Location;
use crate::primordials::{Arity, BuiltinOp};

/// Allowed non-alphanumeric characters in symbol names
pub(crate) const SYMBOL_SPECIAL_CHARS: &str = "+-*/\\&<=>?!_$%~";

/// Marker separating positional parameters from the rest parameter in a parameter vector
pub const REST_MARKER: &str = "&";

/// Check if a string is a valid symbol name
/// Valid: non-empty, no leading digit, no "-digit" prefix, alphanumeric + SYMBOL_SPECIAL_CHARS
pub(crate) fn is_valid_symbol(name: &str) -> bool {
    let mut chars = name.chars();

    match chars.next() {
        None => false,
        Some(first_char) => {
            if first_char.is_ascii_digit() {
                return false;
            }

            if first_char == '-'
                && let Some(second_char) = chars.next()
                && second_char.is_ascii_digit()
            {
                return false;
            }

            name.chars().all(is_symbol_char)
        }
    }
}

pub(crate) fn is_symbol_char(c: char) -> bool {
    c.is_alphanumeric() || SYMBOL_SPECIAL_CHARS.contains(c)
}

/// Numeric payload: exact integers, promoted to floats when mixed with a float
#[derive(Debug, Clone, Copy)]
pub enum Number {
    Int(i64),
    Float(f64),
}

macro_rules! checked_arithmetic {
    ($name:ident, $checked:ident, $op:tt, $verb:literal) => {
        pub fn $name(self, rhs: Number) -> Result<Number, Error> {
            match (self, rhs) {
                (Number::Int(a), Number::Int(b)) => a.$checked(b).map(Number::Int).ok_or_else(|| {
                    Error::EvalError(format!("integer overflow in {}", $verb))
                }),
                (a, b) => Ok(Number::Float(a.as_f64() $op b.as_f64())),
            }
        }
    };
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(n) => n as f64,
            Number::Float(f) => f,
        }
    }

    pub fn is_zero(self) -> bool {
        match self {
            Number::Int(n) => n == 0,
            Number::Float(f) => f == 0.0,
        }
    }

    checked_arithmetic!(add, checked_add, +, "addition");
    checked_arithmetic!(sub, checked_sub, -, "subtraction");
    checked_arithmetic!(mul, checked_mul, *, "multiplication");

    /// Division; integer operands stay integral when the division is exact
    pub fn div(self, rhs: Number) -> Result<Number, Error> {
        if rhs.is_zero() {
            return Err(Error::EvalError("division by zero".into()));
        }
        match (self, rhs) {
            (Number::Int(a), Number::Int(b)) if a.checked_rem(b) == Some(0) => a
                .checked_div(b)
                .map(Number::Int)
                .ok_or_else(|| Error::EvalError("integer overflow in division".into())),
            (a, b) => Ok(Number::Float(a.as_f64() / b.as_f64())),
        }
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a == b,
            (a, b) => a.as_f64() == b.as_f64(),
        }
    }
}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a.partial_cmp(b),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(n) => write!(f, "{n}"),
            // Debug formatting keeps the fractional part (`3.0`), so floats re-read as floats
            Number::Float(x) => write!(f, "{x:?}"),
        }
    }
}

/// Parameter list of a closure: positional names plus an optional rest parameter
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Params {
    pub names: Vec<String>,
    pub rest: Option<String>,
}

impl Params {
    pub fn arity(&self) -> Arity {
        match self.rest {
            Some(_) => Arity::AtLeast(self.names.len()),
            None => Arity::Exact(self.names.len()),
        }
    }
}

impl fmt::Display for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        let mut first = true;
        for name in &self.names {
            if !first {
                write!(f, " ")?;
            }
            write!(f, "{name}")?;
            first = false;
        }
        if let Some(rest) = &self.rest {
            if !first {
                write!(f, " ")?;
            }
            write!(f, "{REST_MARKER} {rest}")?;
        }
        write!(f, "]")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosureKind {
    /// Arguments are evaluated before the call
    Function,
    /// Arguments are passed quoted and the result is evaluated again at the call site
    Macro,
}

/// A user-defined callable. The captured environment is fixed when the closure is created.
pub struct Closure {
    pub name: String,
    pub params: Params,
    pub body: Node,
    pub env: Environment,
    pub kind: ClosureKind,
}

impl Closure {
    pub fn is_macro(&self) -> bool {
        self.kind == ClosureKind::Macro
    }
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Closure")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("params", &self.params)
            .field("body", &self.body)
            .finish_non_exhaustive()
    }
}

/// Canonical signature of native callables: evaluated arguments in, value out
pub type PrimordialFn = dyn Fn(&[Node]) -> Result<Value, Error>;

/// A native callable registered under a name. It has no body and receives evaluated arguments.
#[derive(Clone)]
pub struct Primordial {
    pub name: Rc<str>,
    pub arity: Arity,
    pub func: Rc<PrimordialFn>,
}

impl Primordial {
    pub fn new(
        name: &str,
        arity: Arity,
        func: impl Fn(&[Node]) -> Result<Value, Error> + 'static,
    ) -> Self {
        Primordial {
            name: Rc::from(name),
            arity,
            func: Rc::new(func),
        }
    }

    pub fn call(&self, args: &[Node]) -> Result<Value, Error> {
        self.arity.validate(&self.name, args.len())?;
        (self.func)(args)
    }
}

/// Core value type.
///
/// To build values, use the helper functions:
/// - `val(42)`, `val("text")`, `val(true)` for literals
/// - `val([1, 2, 3])` for homogeneous vectors
/// - `val(vec![sym("x"), val(1)])` for mixed vectors
/// - `sexpr(vec![sym("+"), val(1), val(2)])` for call forms
#[derive(Clone)]
pub enum Value {
    Numeric(Number),
    /// Name reference, looked up when evaluated
    Symbol(String),
    String(String),
    /// Keyword-like constant written `:NAME`; booleans and nil are atoms
    Atom(String),
    /// Application form; the first child is the operator
    SExpression(Vec<Node>),
    /// Children are evaluated element-wise; pairs of atom keys and values form a map
    Vector(Vec<Node>),
    /// Suspended node, only unwrapped by `eval`, `unquote` and `setr`
    Quoted(Box<Node>),
    Function(Rc<Closure>),
    Primordial(Primordial),
    /// Evaluator-level primitive receiving its operands unevaluated
    SpecialForm(&'static BuiltinOp),
}

pub const TRUE: &str = "TRUE";
pub const FALSE: &str = "FALSE";
pub const NIL: &str = "NIL";

impl Value {
    pub fn nil() -> Self {
        Value::Atom(NIL.to_owned())
    }

    pub fn boolean(b: bool) -> Self {
        Value::Atom(if b { TRUE } else { FALSE }.to_owned())
    }

    /// Truthiness: `""`, zero, `[]`, `:FALSE` and `:NIL` are false
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::String(s) => !s.is_empty(),
            Value::Numeric(n) => !n.is_zero(),
            Value::Vector(items) => !items.is_empty(),
            Value::Atom(name) => name != FALSE && name != NIL,
            _ => true,
        }
    }

    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Value::Symbol(name) => Some(name),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Numeric(_) => "numeric",
            Value::Symbol(_) => "symbol",
            Value::String(_) => "string",
            Value::Atom(_) => "atom",
            Value::SExpression(_) => "s-expression",
            Value::Vector(_) => "vector",
            Value::Quoted(_) => "quoted",
            Value::Function(closure) if closure.is_macro() => "macro",
            Value::Function(_) => "function",
            Value::Primordial(_) => "primordial",
            Value::SpecialForm(_) => "special form",
        }
    }
}

/// Interpret vector children as a map of atom keys to values.
///
/// Returns `Ok(None)` when the children do not pair up as `:key value`, and
/// `DuplicateKey` when a key repeats.
pub fn as_mapping(items: &[Node]) -> Result<Option<Vec<(&str, &Node)>>, Error> {
    if items.len() % 2 != 0 {
        return Ok(None);
    }

    let mut seen = HashSet::new();
    let mut pairs = Vec::with_capacity(items.len() / 2);
    for pair in items.chunks_exact(2) {
        let Value::Atom(key) = &pair[0].value else {
            return Ok(None);
        };
        if !seen.insert(key.as_str()) {
            return Err(Error::DuplicateKey(key.clone()));
        }
        pairs.push((key.as_str(), &pair[1]));
    }
    Ok(Some(pairs))
}

/// A located value
#[derive(Clone)]
pub struct Node {
    pub value: Value,
    pub loc: Location,
}

impl Node {
    pub fn new(value: Value, loc: Location) -> Self {
        Node { value, loc }
    }

    /// A node created at runtime, without a source position
    pub fn synthetic(value: Value) -> Self {
        Node::new(value, Location::runtime())
    }

    /// Wrap this node in one quoting layer, keeping its location
    pub fn quote(self) -> Node {
        let loc = self.loc.clone();
        Node::new(Value::Quoted(Box::new(self)), loc)
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.value)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Numeric(a), Value::Numeric(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Atom(a), Value::Atom(b)) => a == b,
            (Value::SExpression(a), Value::SExpression(b)) => a == b,
            (Value::Vector(a), Value::Vector(b)) => a == b,
            (Value::Quoted(a), Value::Quoted(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Primordial(a), Value::Primordial(b)) => {
                a.name == b.name && Rc::ptr_eq(&a.func, &b.func)
            }
            (Value::SpecialForm(a), Value::SpecialForm(b)) => a.name == b.name,
            _ => false,
        }
    }
}

fn write_separated(f: &mut fmt::Formatter<'_>, items: &[Node]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, " ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

fn write_escaped(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    write!(f, "\"")?;
    for c in s.chars() {
        match c {
            '\n' => write!(f, "\\n")?,
            '\t' => write!(f, "\\t")?,
            '\r' => write!(f, "\\r")?,
            '\\' => write!(f, "\\\\")?,
            '"' => write!(f, "\\\"")?,
            c => write!(f, "{c}")?,
        }
    }
    write!(f, "\"")
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Numeric(n) => write!(f, "{n}"),
            Value::Symbol(s) => write!(f, "{s}"),
            Value::String(s) => write_escaped(f, s),
            Value::Atom(name) => write!(f, ":{name}"),
            Value::SExpression(items) => {
                write!(f, "(")?;
                write_separated(f, items)?;
                write!(f, ")")
            }
            Value::Vector(items) => {
                write!(f, "[")?;
                write_separated(f, items)?;
                write!(f, "]")
            }
            Value::Quoted(inner) => write!(f, "'{inner}"),
            Value::Function(closure) => match closure.kind {
                ClosureKind::Function => write!(f, "<fn {}>", closure.name),
                ClosureKind::Macro => write!(f, "<macro {}>", closure.name),
            },
            Value::Primordial(p) => write!(f, "<primordial {}>", p.name),
            Value::SpecialForm(op) => write!(f, "<special-form {}>", op.name),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Numeric(n) => write!(f, "Numeric({n})"),
            Value::Symbol(s) => write!(f, "Symbol({s})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Atom(name) => write!(f, "Atom(:{name})"),
            Value::SExpression(items) => f.debug_tuple("SExpression").field(items).finish(),
            Value::Vector(items) => f.debug_tuple("Vector").field(items).finish(),
            Value::Quoted(inner) => write!(f, "Quoted({inner:?})"),
            Value::Function(closure) => write!(
                f,
                "Function({} {} {})",
                closure.name, closure.params, closure.body
            ),
            Value::Primordial(p) => write!(f, "Primordial({})", p.name),
            Value::SpecialForm(op) => write!(f, "SpecialForm({})", op.name),
        }
    }
}

// From trait implementations for Value - enables .into() conversion
impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::boolean(b)
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        Value::Numeric(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Numeric(Number::Float(x))
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Value {
            fn from(n: $int_type) -> Self {
                Value::Numeric(Number::Int(i64::from(n)))
            }
        }
    };
}

impl_from_integer!(i8);
impl_from_integer!(i16);
impl_from_integer!(i32);
impl_from_integer!(i64);
impl_from_integer!(u8);
impl_from_integer!(u16);
impl_from_integer!(u32);

impl From<Node> for Value {
    fn from(node: Node) -> Self {
        node.value
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Vector(v.into_iter().map(|x| Node::synthetic(x.into())).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(arr: [T; N]) -> Self {
        Value::Vector(arr.into_iter().map(|x| Node::synthetic(x.into())).collect())
    }
}

impl<T: Into<Value> + Clone> From<&[T]> for Value {
    fn from(slice: &[T]) -> Self {
        Value::Vector(
            slice
                .iter()
                .cloned()
                .map(|x| Node::synthetic(x.into()))
                .collect(),
        )
    }
}

impl From<Value> for Node {
    fn from(value: Value) -> Self {
        Node::synthetic(value)
    }
}

/// Build a node from any value convertible into [`Value`]
pub fn val<T: Into<Value>>(value: T) -> Node {
    Node::synthetic(value.into())
}

pub fn sym(name: &str) -> Node {
    Node::synthetic(Value::Symbol(name.to_owned()))
}

pub fn atom(name: &str) -> Node {
    Node::synthetic(Value::Atom(name.to_owned()))
}

/// The `:NIL` atom
pub fn nil() -> Node {
    Node::synthetic(Value::nil())
}

pub fn sexpr(items: Vec<Node>) -> Node {
    Node::synthetic(Value::SExpression(items))
}

pub fn quoted(node: Node) -> Node {
    Node::synthetic(Value::Quoted(Box::new(node)))
}
