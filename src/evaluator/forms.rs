//! Special forms.
//!
//! Each form receives its operands unevaluated through a [`Call`] and decides what to
//! evaluate and where. Arity is validated against the registry before a form runs.

use std::rc::Rc;

use crate::Error;
use crate::ast::{Closure, ClosureKind, Node, Params, REST_MARKER, Value};
use crate::evaluator::{Call, Evaluator};
use crate::primordials::Arity;
use crate::signal::{Outcome, Signal};

/// Name given to closures created by `fn`
const ANONYMOUS: &str = "~lambda~";

fn nil_at(call: &Call<'_>) -> Node {
    Node::new(Value::nil(), call.form.loc.clone())
}

fn boolean_at(call: &Call<'_>, b: bool) -> Node {
    Node::new(Value::boolean(b), call.form.loc.clone())
}

/// A literal symbol operand
fn symbol_operand<'a>(call: &Call<'_>, node: &'a Node) -> Result<&'a str, Signal> {
    node.value.as_symbol().ok_or_else(|| {
        call.fail(Error::wrong_type(format!(
            "`{}` expects a symbol name, got {} `{node}`",
            call.name,
            node.value.type_name()
        )))
    })
}

/// Read a parameter vector such as `[a b & rest]`
fn parse_params(call: &Call<'_>, node: &Node) -> Result<Params, Signal> {
    let Value::Vector(items) = &node.value else {
        return Err(call.fail(Error::wrong_type(format!(
            "`{}` expects a parameter vector, got {} `{node}`",
            call.name,
            node.value.type_name()
        ))));
    };

    let mut params = Params::default();
    let check_duplicate = |params: &Params, name: &str| {
        if params.names.iter().any(|existing| existing == name) {
            Err(call.fail(Error::EvalError(format!("duplicate parameter `{name}`"))))
        } else {
            Ok(())
        }
    };

    let mut iter = items.iter();
    while let Some(item) = iter.next() {
        let Some(name) = item.value.as_symbol() else {
            return Err(call.fail(Error::wrong_type(format!(
                "parameters must be symbols, got {} `{item}`",
                item.value.type_name()
            ))));
        };

        if name == REST_MARKER {
            match (iter.next().and_then(|rest| rest.value.as_symbol()), iter.next()) {
                (Some(rest), None) if rest != REST_MARKER => {
                    check_duplicate(&params, rest)?;
                    params.rest = Some(rest.to_owned());
                }
                _ => {
                    return Err(call.fail(Error::EvalError(format!(
                        "`{REST_MARKER}` must be followed by exactly one rest parameter"
                    ))));
                }
            }
            break;
        }

        check_duplicate(&params, name)?;
        params.names.push(name.to_owned());
    }

    Ok(params)
}

fn make_closure(
    call: &Call<'_>,
    name: &str,
    params: &Node,
    body: &Node,
    kind: ClosureKind,
) -> Result<Node, Signal> {
    let closure = Closure {
        name: name.to_owned(),
        params: parse_params(call, params)?,
        body: body.clone(),
        env: call.env.clone(),
        kind,
    };
    Ok(Node::new(
        Value::Function(Rc::new(closure)),
        call.form.loc.clone(),
    ))
}

//
// Binding and quoting
//

/// `(quote x)` is the same as `'x`
pub(crate) fn eval_quote(_ev: &mut Evaluator, call: &Call<'_>) -> Outcome {
    let [operand] = call.operands()?;
    Ok(Node::new(
        Value::Quoted(Box::new(operand.clone())),
        call.form.loc.clone(),
    ))
}

/// `(setn name value)` binds a literal name in the current frame and returns the value
pub(crate) fn eval_setn(ev: &mut Evaluator, call: &Call<'_>) -> Outcome {
    let [name, value] = call.operands()?;
    let name = symbol_operand(call, name)?;
    let value = call.eval(ev, value)?;
    call.env.define(name, value.clone());
    Ok(value)
}

/// `(setr target value)` binds the name `target` evaluates to.
/// A quoted symbol counts as the symbol itself.
pub(crate) fn eval_setr(ev: &mut Evaluator, call: &Call<'_>) -> Outcome {
    let [target, value] = call.operands()?;
    let resolved = call.eval(ev, target)?;
    let name = match &resolved.value {
        Value::Symbol(name) => Some(name.clone()),
        Value::Quoted(inner) => inner.value.as_symbol().map(str::to_owned),
        _ => None,
    };
    let Some(name) = name else {
        return Err(call.fail(Error::wrong_type(format!(
            "`setr` could not resolve to a symbol, got {} `{resolved}`",
            resolved.value.type_name()
        ))));
    };
    let value = call.eval(ev, value)?;
    call.env.define(name, value.clone());
    Ok(value)
}

/// `(unquote q)` evaluates the node wrapped by the quoted value `q`, once
pub(crate) fn eval_unquote(ev: &mut Evaluator, call: &Call<'_>) -> Outcome {
    let [operand] = call.operands()?;
    let quoted = call.eval(ev, operand)?;
    let Value::Quoted(inner) = &quoted.value else {
        return Err(call.fail(Error::wrong_type(format!(
            "`unquote` expects a quoted value, got {} `{quoted}`",
            quoted.value.type_name()
        ))));
    };
    call.eval(ev, inner)
}

/// `(eval x)` evaluates `x`, then keeps unwrapping and evaluating while the result
/// is quoted. It stops early when a step reproduces the value it started from.
pub(crate) fn eval_eval(ev: &mut Evaluator, call: &Call<'_>) -> Outcome {
    let [operand] = call.operands()?;
    let mut current = call.eval(ev, operand)?;
    while let Value::Quoted(inner) = &current.value {
        let next = call.eval(ev, inner)?;
        if next == current {
            return Ok(next);
        }
        current = next;
    }
    Ok(current)
}

//
// Closures
//

pub(crate) fn eval_fn(_ev: &mut Evaluator, call: &Call<'_>) -> Outcome {
    let [params, body] = call.operands()?;
    make_closure(call, ANONYMOUS, params, body, ClosureKind::Function)
}

/// `(mkfn name [params] body)` creates a named function and binds it
pub(crate) fn eval_mkfn(_ev: &mut Evaluator, call: &Call<'_>) -> Outcome {
    let [name, params, body] = call.operands()?;
    let name = symbol_operand(call, name)?;
    let function = make_closure(call, name, params, body, ClosureKind::Function)?;
    call.env.define(name, function.clone());
    Ok(function)
}

/// `(macro name [params] body)` creates a named macro and binds it
pub(crate) fn eval_macro(_ev: &mut Evaluator, call: &Call<'_>) -> Outcome {
    let [name, params, body] = call.operands()?;
    let name = symbol_operand(call, name)?;
    let function = make_closure(call, name, params, body, ClosureKind::Macro)?;
    call.env.define(name, function.clone());
    Ok(function)
}

/// `(let [[name value]...] body)`: each value is evaluated in a new frame and bound
/// there before the next, so later values see earlier names
pub(crate) fn eval_let(ev: &mut Evaluator, call: &Call<'_>) -> Outcome {
    let [bindings, body] = call.operands()?;
    let Value::Vector(pairs) = &bindings.value else {
        return Err(call.fail(Error::wrong_type(format!(
            "`let` expects a vector of [name value] pairs, got {} `{bindings}`",
            bindings.value.type_name()
        ))));
    };

    let frame = call.env.push_named("let");
    for (pos, pair) in pairs.iter().enumerate() {
        let not_a_pair = || call.fail(Error::wrong_type(format!("`{pair}` at {pos} is not a pair")));
        let Value::Vector(items) = &pair.value else {
            return Err(not_a_pair());
        };
        let [name, value] = items.as_slice() else {
            return Err(not_a_pair());
        };
        let Some(name) = name.value.as_symbol() else {
            return Err(call.fail(Error::wrong_type(format!(
                "`{name}` at {pos} is not a symbol"
            ))));
        };
        let value = call.eval_in(ev, value, &frame)?;
        frame.define(name, value);
    }

    call.eval_in(ev, body, &frame)
}

//
// Control flow
//

/// Evaluate each form in order and return the last value, or `:NIL` with no forms
pub(crate) fn eval_do(ev: &mut Evaluator, call: &Call<'_>) -> Outcome {
    let mut result = nil_at(call);
    for form in call.args {
        result = call.eval(ev, form)?;
    }
    Ok(result)
}

/// Evaluate the body forms repeatedly until a `break` reaches this loop
pub(crate) fn eval_loop(ev: &mut Evaluator, call: &Call<'_>) -> Outcome {
    loop {
        ev.tick(&call.form.loc)?;
        for form in call.args {
            match call.eval(ev, form) {
                Ok(_) => {}
                Err(signal) if signal.is_break() => {
                    tracing::trace!(name = call.name, "loop exited by break");
                    return Ok(signal.into_payload());
                }
                Err(signal) => return Err(signal),
            }
        }
    }
}

pub(crate) fn eval_break(ev: &mut Evaluator, call: &Call<'_>) -> Outcome {
    let payload = call
        .args
        .first()
        .map(|node| call.eval(ev, node))
        .transpose()?;
    Err(Signal::brk(payload, call.form.loc.clone()))
}

pub(crate) fn eval_return(ev: &mut Evaluator, call: &Call<'_>) -> Outcome {
    let payload = match call.args.first() {
        Some(node) => call.eval(ev, node)?,
        None => nil_at(call),
    };
    Err(Signal::ret(payload, call.form.loc.clone()))
}

/// `(if condition then [else])`; a missing else branch yields `:NIL`
pub(crate) fn eval_if(ev: &mut Evaluator, call: &Call<'_>) -> Outcome {
    let (condition, then_branch, else_branch) = match call.args {
        [condition, then_branch] => (condition, then_branch, None),
        [condition, then_branch, else_branch] => (condition, then_branch, Some(else_branch)),
        _ => {
            return Err(call.fail(Error::arity_error(
                call.name,
                Arity::Range(2, 3),
                call.args.len(),
            )));
        }
    };

    if call.eval(ev, condition)?.value.is_truthy() {
        call.eval(ev, then_branch)
    } else {
        match else_branch {
            Some(node) => call.eval(ev, node),
            None => Ok(nil_at(call)),
        }
    }
}

pub(crate) fn eval_when(ev: &mut Evaluator, call: &Call<'_>) -> Outcome {
    let [condition, body] = call.operands()?;
    if call.eval(ev, condition)?.value.is_truthy() {
        call.eval(ev, body)
    } else {
        Ok(nil_at(call))
    }
}

/// `(cond [predicate expression]...)` evaluates the expression of the first true predicate
pub(crate) fn eval_cond(ev: &mut Evaluator, call: &Call<'_>) -> Outcome {
    for clause in call.args {
        let pair = match &clause.value {
            Value::Vector(items) => <&[Node; 2]>::try_from(items.as_slice()).ok(),
            _ => None,
        };
        let Some([predicate, expression]) = pair else {
            return Err(call.fail(Error::wrong_type(format!(
                "`cond` expects [predicate expression] pairs, got `{clause}`"
            ))));
        };
        if call.eval(ev, predicate)?.value.is_truthy() {
            return call.eval(ev, expression);
        }
    }
    Ok(nil_at(call))
}

macro_rules! boolean_logic_op {
    ($name:ident, $short_circuit:literal) => {
        /// Short-circuiting truthiness test returning `:TRUE` or `:FALSE`
        pub(crate) fn $name(ev: &mut Evaluator, call: &Call<'_>) -> Outcome {
            for operand in call.args {
                if call.eval(ev, operand)?.value.is_truthy() == $short_circuit {
                    return Ok(boolean_at(call, $short_circuit));
                }
            }
            Ok(boolean_at(call, !$short_circuit))
        }
    };
}

boolean_logic_op!(eval_and, false);
boolean_logic_op!(eval_or, true);

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use crate::ast::{ClosureKind, Params, Value};
    use crate::environment::create_global_env;
    use crate::evaluator::evaluate;
    use crate::parser::parse_one;

    fn closure_params(source: &str) -> (String, ClosureKind, Params) {
        let env = create_global_env();
        let node = evaluate(&parse_one(source, "test").unwrap(), &env).unwrap();
        match node.value {
            Value::Function(closure) => (
                closure.name.clone(),
                closure.kind,
                closure.params.clone(),
            ),
            other => panic!("expected a closure from '{source}', got {other:?}"),
        }
    }

    #[test]
    fn test_parameter_vectors() {
        let cases = vec![
            ("(fn [] 1)", vec![], None),
            ("(fn [a b] a)", vec!["a", "b"], None),
            ("(fn [a & more] a)", vec!["a"], Some("more")),
            ("(fn [& all] all)", vec![], Some("all")),
        ];
        for (source, names, rest) in cases {
            let (name, kind, params) = closure_params(source);
            assert_eq!(name, "~lambda~");
            assert_eq!(kind, ClosureKind::Function);
            assert_eq!(params.names, names, "{source}");
            assert_eq!(params.rest.as_deref(), rest, "{source}");
        }
    }

    #[test]
    fn test_named_closures() {
        let (name, kind, params) = closure_params("(mkfn square [x] (* x x))");
        assert_eq!(name, "square");
        assert_eq!(kind, ClosureKind::Function);
        assert_eq!(params.to_string(), "[x]");

        let (name, kind, _) = closure_params("(macro unless [c body] c)");
        assert_eq!(name, "unless");
        assert_eq!(kind, ClosureKind::Macro);
    }

    #[test]
    fn test_return_passes_through_let_and_do() {
        let env = create_global_env();
        let source = "((fn [] (let [[x 1]] (do (return (+ x 1)) 99))))";
        let result = evaluate(&parse_one(source, "test").unwrap(), &env).unwrap();
        assert_eq!(result, crate::ast::val(2));
    }
}
