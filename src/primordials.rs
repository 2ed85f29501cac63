//! Registry of built-in operations.
//!
//! Every built-in is a [`BuiltinOp`] in a single static table, looked up by name and
//! installed into the root environment by
//! [`create_global_env`](crate::environment::create_global_env).
//!
//! ## Primordials vs Special Forms
//!
//! - **Primordials**: receive evaluated arguments (e.g. `+`, `len`, `map-at`)
//! - **Special forms**: receive their operands unevaluated together with the caller's
//!   environment (e.g. `setn`, `fn`, `loop`, `if`). They live in
//!   [`crate::evaluator::forms`]
//!
//! Both kinds are ordinary values once bound, so they can be passed around and
//! shadowed like any other binding.
//!
//! ## Adding New Operations
//!
//! 1. **Implement the function** with the signature `fn(&[Node]) -> Result<Value, Error>`
//! 2. **Add it to BUILTIN_OPS** with its name and arity
//! 3. **Add tests** covering edge cases and error conditions

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use crate::Error;
use crate::ast::{Node, Number, Value, as_mapping};
use crate::evaluator::Call;
use crate::evaluator::forms;
use crate::signal::Outcome;

/// Number of arguments an operation accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    /// Inclusive bounds
    Range(usize, usize),
    Any,
}

impl Arity {
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Arity::Exact(n) => count == n,
            Arity::AtLeast(n) => count >= n,
            Arity::Range(min, max) => (min..=max).contains(&count),
            Arity::Any => true,
        }
    }

    /// Check an argument count, naming the callee in the error
    pub fn validate(self, callee: &str, count: usize) -> Result<(), Error> {
        if self.accepts(count) {
            Ok(())
        } else {
            Err(Error::arity_error(callee, self, count))
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "exactly {n}"),
            Arity::AtLeast(n) => write!(f, "at least {n}"),
            Arity::Range(min, max) => write!(f, "between {min} and {max}"),
            Arity::Any => write!(f, "any number of"),
        }
    }
}

/// Signature of special forms: unevaluated operands plus the calling context
pub type SpecialFormFn = fn(&mut crate::evaluator::Evaluator, &Call<'_>) -> Outcome;

/// Represents the implementation of a built-in operation
#[derive(Clone, Copy)]
pub enum OpKind {
    /// Takes evaluated arguments and returns a value
    Function(fn(&[Node]) -> Result<Value, Error>),
    /// Takes unevaluated arguments, the environment and the evaluation depth
    SpecialForm(SpecialFormFn),
}

impl fmt::Debug for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpKind::Function(_) => write!(f, "Function(<fn>)"),
            OpKind::SpecialForm(_) => write!(f, "SpecialForm(<fn>)"),
        }
    }
}

/// Definition of a built-in operation
#[derive(Debug, Clone)]
pub struct BuiltinOp {
    pub name: &'static str,
    pub op_kind: OpKind,
    pub arity: Arity,
}

impl PartialEq for BuiltinOp {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl BuiltinOp {
    pub fn is_special_form(&self) -> bool {
        matches!(self.op_kind, OpKind::SpecialForm(_))
    }

    pub(crate) fn validate_arity(&self, arg_count: usize) -> Result<(), Error> {
        self.arity.validate(self.name, arg_count)
    }
}

//
// Argument helpers
//

fn type_error(op: &str, expected: &str, found: &Value) -> Error {
    Error::wrong_type(format!(
        "`{op}` expects {expected}, got {} `{found}`",
        found.type_name()
    ))
}

fn number(op: &str, node: &Node) -> Result<Number, Error> {
    match &node.value {
        Value::Numeric(n) => Ok(*n),
        other => Err(type_error(op, "a numeric", other)),
    }
}

fn vector<'a>(op: &str, node: &'a Node) -> Result<&'a [Node], Error> {
    match &node.value {
        Value::Vector(items) => Ok(items),
        other => Err(type_error(op, "a vector", other)),
    }
}

fn string<'a>(op: &str, node: &'a Node) -> Result<&'a str, Error> {
    match &node.value {
        Value::String(s) => Ok(s),
        other => Err(type_error(op, "a string", other)),
    }
}

fn atom<'a>(op: &str, node: &'a Node) -> Result<&'a str, Error> {
    match &node.value {
        Value::Atom(name) => Ok(name),
        other => Err(type_error(op, "an atom", other)),
    }
}

fn integer(op: &str, node: &Node) -> Result<i64, Error> {
    match number(op, node)? {
        Number::Int(n) => Ok(n),
        Number::Float(_) => Err(type_error(op, "an integer", &node.value)),
    }
}

/// Resolve a possibly negative index against `len`
fn position(op: &str, node: &Node, len: usize) -> Result<usize, Error> {
    let index = integer(op, node)?;
    let resolved = if index < 0 {
        i64::try_from(len).ok().and_then(|len| len.checked_add(index))
    } else {
        Some(index)
    };
    resolved
        .and_then(|i| usize::try_from(i).ok())
        .filter(|i| *i < len)
        .ok_or_else(|| Error::EvalError(format!("`{op}`: index {index} out of range")))
}

fn mapping<'a>(op: &str, node: &'a Node) -> Result<Vec<(&'a str, &'a Node)>, Error> {
    as_mapping(vector(op, node)?)?
        .ok_or_else(|| Error::EvalError(format!("`{op}`: the given vector is not a mapping")))
}

fn vector_of(items: impl IntoIterator<Item = Node>) -> Value {
    Value::Vector(items.into_iter().collect())
}

//
// Primordial Function Implementations
//

fn primordial_add(args: &[Node]) -> Result<Value, Error> {
    args.iter()
        .try_fold(Number::Int(0), |acc, arg| acc.add(number("+", arg)?))
        .map(Value::Numeric)
}

/// `(- x y z)` is `x - (y + z)`
fn primordial_sub(args: &[Node]) -> Result<Value, Error> {
    let Some((first, rest)) = args.split_first() else {
        return Err(Error::arity_error("-", Arity::AtLeast(1), 0));
    };
    let subtrahend = rest
        .iter()
        .try_fold(Number::Int(0), |acc, arg| acc.add(number("-", arg)?))?;
    number("-", first)?.sub(subtrahend).map(Value::Numeric)
}

fn primordial_mul(args: &[Node]) -> Result<Value, Error> {
    args.iter()
        .try_fold(Number::Int(1), |acc, arg| acc.mul(number("*", arg)?))
        .map(Value::Numeric)
}

/// `(/ x y z)` is `x / (y * z)`
fn primordial_div(args: &[Node]) -> Result<Value, Error> {
    let Some((first, rest)) = args.split_first() else {
        return Err(Error::arity_error("/", Arity::AtLeast(1), 0));
    };
    let divisor = rest
        .iter()
        .try_fold(Number::Int(1), |acc, arg| acc.mul(number("/", arg)?))?;
    number("/", first)?.div(divisor).map(Value::Numeric)
}

fn compare(op: &str, a: &Node, b: &Node) -> Result<Ordering, Error> {
    match (&a.value, &b.value) {
        (Value::Numeric(x), Value::Numeric(y)) => x
            .partial_cmp(y)
            .ok_or_else(|| Error::EvalError(format!("`{op}`: values are not comparable"))),
        (Value::String(x), Value::String(y)) => Ok(x.cmp(y)),
        (Value::Numeric(_) | Value::String(_), other) | (other, _) => {
            Err(type_error(op, "numeric or string operands of the same kind", other))
        }
    }
}

macro_rules! ordering_comparison {
    ($name:ident, $op_str:literal, $($accepted:pat_param)|+) => {
        fn $name(args: &[Node]) -> Result<Value, Error> {
            let ordering = compare($op_str, &args[0], &args[1])?;
            Ok(Value::boolean(matches!(ordering, $($accepted)|+)))
        }
    };
}

ordering_comparison!(primordial_gt, ">", Ordering::Greater);
ordering_comparison!(primordial_lt, "<", Ordering::Less);
ordering_comparison!(primordial_ge, ">=", Ordering::Greater | Ordering::Equal);
ordering_comparison!(primordial_le, "<=", Ordering::Less | Ordering::Equal);

fn primordial_eq(args: &[Node]) -> Result<Value, Error> {
    Ok(Value::boolean(args[0] == args[1]))
}

fn primordial_ne(args: &[Node]) -> Result<Value, Error> {
    Ok(Value::boolean(args[0] != args[1]))
}

fn primordial_bool(args: &[Node]) -> Result<Value, Error> {
    Ok(Value::boolean(args[0].value.is_truthy()))
}

fn primordial_not(args: &[Node]) -> Result<Value, Error> {
    Ok(Value::boolean(!args[0].value.is_truthy()))
}

fn primordial_concat(args: &[Node]) -> Result<Value, Error> {
    let mut result = String::new();
    for arg in args {
        result.push_str(string("concat", arg)?);
    }
    Ok(Value::String(result))
}

fn primordial_print(args: &[Node]) -> Result<Value, Error> {
    println!("{}", args[0]);
    Ok(args[0].value.clone())
}

fn primordial_putstrln(args: &[Node]) -> Result<Value, Error> {
    let s = string("putstrln", &args[0])?;
    println!("{s}");
    Ok(args[0].value.clone())
}

fn primordial_merge(args: &[Node]) -> Result<Value, Error> {
    let mut merged = Vec::new();
    for arg in args {
        merged.extend_from_slice(vector("merge", arg)?);
    }
    Ok(Value::Vector(merged))
}

/// `(slice vector start stop [step])` with negative bounds counted from the end
fn primordial_slice(args: &[Node]) -> Result<Value, Error> {
    let items = vector("slice", &args[0])?;
    let len = i64::try_from(items.len()).unwrap_or(i64::MAX);
    let clamp = |node: &Node| -> Result<usize, Error> {
        let bound = integer("slice", node)?;
        let bound = if bound < 0 { len.saturating_add(bound) } else { bound };
        Ok(usize::try_from(bound.clamp(0, len)).unwrap_or(0))
    };
    let start = clamp(&args[1])?;
    let stop = clamp(&args[2])?;
    let step = match args.get(3) {
        Some(node) => integer("slice", node)?,
        None => 1,
    };
    let step = usize::try_from(step)
        .ok()
        .filter(|step| *step > 0)
        .ok_or_else(|| Error::EvalError("`slice`: step must be a positive integer".into()))?;

    if start >= stop {
        return Ok(Value::Vector(Vec::new()));
    }
    Ok(vector_of(items[start..stop].iter().step_by(step).cloned()))
}

fn primordial_at(args: &[Node]) -> Result<Value, Error> {
    let items = vector("at", &args[1])?;
    let index = position("at", &args[0], items.len())?;
    Ok(items[index].value.clone())
}

fn primordial_remove(args: &[Node]) -> Result<Value, Error> {
    let mut items = vector("remove", &args[1])?.to_vec();
    let index = position("remove", &args[0], items.len())?;
    items.remove(index);
    Ok(Value::Vector(items))
}

fn primordial_len(args: &[Node]) -> Result<Value, Error> {
    let len = match &args[0].value {
        Value::Vector(items) => items.len(),
        Value::String(s) => s.chars().count(),
        other => return Err(type_error("len", "a vector or a string", other)),
    };
    i64::try_from(len)
        .map(Value::from)
        .map_err(|_| Error::EvalError("`len`: length out of range".into()))
}

fn primordial_cons(args: &[Node]) -> Result<Value, Error> {
    let items = vector("cons", &args[1])?;
    Ok(vector_of(
        std::iter::once(args[0].clone()).chain(items.iter().cloned()),
    ))
}

fn primordial_snoc(args: &[Node]) -> Result<Value, Error> {
    let items = vector("snoc", &args[0])?;
    Ok(vector_of(
        items.iter().cloned().chain(std::iter::once(args[1].clone())),
    ))
}

fn primordial_is_map(args: &[Node]) -> Result<Value, Error> {
    let items = vector("is-map", &args[0])?;
    Ok(Value::boolean(as_mapping(items)?.is_some()))
}

fn primordial_map_in(args: &[Node]) -> Result<Value, Error> {
    let pairs = mapping("map-in", &args[0])?;
    let key = atom("map-in", &args[1])?;
    Ok(Value::boolean(pairs.iter().any(|(name, _)| *name == key)))
}

fn primordial_map_at(args: &[Node]) -> Result<Value, Error> {
    let pairs = mapping("map-at", &args[0])?;
    let key = atom("map-at", &args[1])?;
    pairs
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, node)| node.value.clone())
        .ok_or_else(|| Error::EvalError(format!("`map-at`: key `:{key}` not found")))
}

/// Replace the value under a key in place, or append the pair when the key is new
fn primordial_map_up(args: &[Node]) -> Result<Value, Error> {
    let pairs = mapping("map-up", &args[0])?;
    let key = atom("map-up", &args[1])?;
    let mut items = Vec::with_capacity(pairs.len() * 2 + 2);
    let mut replaced = false;
    for (name, node) in &pairs {
        items.push(Node::synthetic(Value::Atom((*name).to_owned())));
        if *name == key {
            items.push(args[2].clone());
            replaced = true;
        } else {
            items.push((*node).clone());
        }
    }
    if !replaced {
        items.push(args[1].clone());
        items.push(args[2].clone());
    }
    Ok(Value::Vector(items))
}

/// Global registry of all built-in operations, built once on first use.
static BUILTIN_OPS: LazyLock<Vec<BuiltinOp>> = LazyLock::new(|| {
    fn function(
        name: &'static str,
        arity: Arity,
        f: fn(&[Node]) -> Result<Value, Error>,
    ) -> BuiltinOp {
        BuiltinOp {
            name,
            op_kind: OpKind::Function(f),
            arity,
        }
    }

    fn special_form(name: &'static str, arity: Arity, f: SpecialFormFn) -> BuiltinOp {
        BuiltinOp {
            name,
            op_kind: OpKind::SpecialForm(f),
            arity,
        }
    }

    vec![
        // Binding, quoting and closures
        special_form("quote", Arity::Exact(1), forms::eval_quote),
        special_form("setn", Arity::Exact(2), forms::eval_setn),
        special_form("setr", Arity::Exact(2), forms::eval_setr),
        special_form("unquote", Arity::Exact(1), forms::eval_unquote),
        special_form("eval", Arity::Exact(1), forms::eval_eval),
        special_form("fn", Arity::Exact(2), forms::eval_fn),
        special_form("mkfn", Arity::Exact(3), forms::eval_mkfn),
        special_form("macro", Arity::Exact(3), forms::eval_macro),
        special_form("let", Arity::Exact(2), forms::eval_let),
        // Control flow
        special_form("do", Arity::Any, forms::eval_do),
        special_form("loop", Arity::AtLeast(1), forms::eval_loop),
        special_form("break", Arity::Range(0, 1), forms::eval_break),
        special_form("return", Arity::Range(0, 1), forms::eval_return),
        special_form("if", Arity::Range(2, 3), forms::eval_if),
        special_form("when", Arity::Exact(2), forms::eval_when),
        special_form("cond", Arity::Any, forms::eval_cond),
        special_form("and", Arity::Any, forms::eval_and),
        special_form("or", Arity::Any, forms::eval_or),
        // Arithmetic
        function("+", Arity::Any, primordial_add),
        function("-", Arity::AtLeast(1), primordial_sub),
        function("*", Arity::Any, primordial_mul),
        function("/", Arity::AtLeast(1), primordial_div),
        // Comparison and truthiness
        function("=", Arity::Exact(2), primordial_eq),
        function("/=", Arity::Exact(2), primordial_ne),
        function(">", Arity::Exact(2), primordial_gt),
        function("<", Arity::Exact(2), primordial_lt),
        function(">=", Arity::Exact(2), primordial_ge),
        function("<=", Arity::Exact(2), primordial_le),
        function("bool", Arity::Exact(1), primordial_bool),
        function("not", Arity::Exact(1), primordial_not),
        // Strings and output
        function("concat", Arity::Any, primordial_concat),
        function("print", Arity::Exact(1), primordial_print),
        function("putstrln", Arity::Exact(1), primordial_putstrln),
        // Vectors
        function("merge", Arity::Any, primordial_merge),
        function("slice", Arity::Range(3, 4), primordial_slice),
        function("at", Arity::Exact(2), primordial_at),
        function("remove", Arity::Exact(2), primordial_remove),
        function("len", Arity::Exact(1), primordial_len),
        function("cons", Arity::Exact(2), primordial_cons),
        function("snoc", Arity::Exact(2), primordial_snoc),
        // Maps
        function("is-map", Arity::Exact(1), primordial_is_map),
        function("map-in", Arity::Exact(2), primordial_map_in),
        function("map-at", Arity::Exact(2), primordial_map_at),
        function("map-up", Arity::Exact(3), primordial_map_up),
    ]
});

static BUILTIN_BY_NAME: LazyLock<HashMap<&'static str, &'static BuiltinOp>> =
    LazyLock::new(|| {
        let ops: &'static [BuiltinOp] = BUILTIN_OPS.as_slice();
        ops.iter().map(|op| (op.name, op)).collect()
    });

pub fn get_builtin_ops() -> &'static [BuiltinOp] {
    BUILTIN_OPS.as_slice()
}

pub fn find_builtin_op(name: &str) -> Option<&'static BuiltinOp> {
    BUILTIN_BY_NAME.get(name).copied()
}
