//! Evaluation of nodes.
//!
//! Dispatch is on the node's value:
//!
//! - numbers, strings, atoms, quoted nodes and callables evaluate to themselves
//! - symbols are looked up in the environment chain
//! - vectors evaluate element-wise
//! - s-expressions evaluate their head and apply it
//!
//! Application depends on what the head evaluated to. Special forms receive their
//! operands unevaluated. Functions and primordials receive evaluated arguments.
//! Macros receive their arguments quoted, and what they return is evaluated again in
//! the caller's environment; expansion and re-evaluation are separate steps, so
//! [`Evaluator::expand`] can show the intermediate form.

pub mod forms;

use std::rc::Rc;

use crate::ast::{Closure, Node, Value};
use crate::environment::Environment;
use crate::location::Location;
use crate::primordials::{Arity, BuiltinOp, OpKind};
use crate::signal::{Outcome, Signal};
use crate::stack::ensure_sufficient_stack;
use crate::{Error, MAX_EVAL_DEPTH};

/// Evaluator limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalConfig {
    /// Maximum nesting of evaluation steps
    pub max_depth: usize,
    /// Maximum number of evaluation steps between budget resets; `None` is unlimited
    pub step_budget: Option<u64>,
}

impl Default for EvalConfig {
    fn default() -> Self {
        EvalConfig {
            max_depth: MAX_EVAL_DEPTH,
            step_budget: None,
        }
    }
}

/// Evaluation state shared by every step of a top-level evaluation
#[derive(Debug, Clone, Default)]
pub struct Evaluator {
    config: EvalConfig,
    steps: u64,
}

/// A special form invocation: the unevaluated operands and the calling context
pub struct Call<'a> {
    pub name: &'static str,
    pub args: &'a [Node],
    pub env: &'a Environment,
    /// The whole `(name operand...)` form
    pub form: &'a Node,
    pub depth: usize,
}

impl<'a> Call<'a> {
    /// Evaluate an operand in the caller's environment
    pub fn eval(&self, ev: &mut Evaluator, node: &Node) -> Outcome {
        ev.eval_at(node, self.env, self.depth + 1)
    }

    /// Evaluate a node in another environment, one level deeper than this call
    pub fn eval_in(&self, ev: &mut Evaluator, node: &Node, env: &Environment) -> Outcome {
        ev.eval_at(node, env, self.depth + 1)
    }

    /// Error signal located at this form
    pub fn fail(&self, error: Error) -> Signal {
        Signal::error(error, self.form.loc.clone())
    }

    /// Operands as a fixed-size array
    pub fn operands<const N: usize>(&self) -> Result<&'a [Node; N], Signal> {
        <&[Node; N]>::try_from(self.args)
            .map_err(|_| self.fail(Error::arity_error(self.name, Arity::Exact(N), self.args.len())))
    }
}

impl Evaluator {
    pub fn new(config: EvalConfig) -> Self {
        Evaluator { config, steps: 0 }
    }

    pub fn config(&self) -> EvalConfig {
        self.config
    }

    /// Steps taken since the last budget reset
    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn reset_budget(&mut self) {
        self.steps = 0;
    }

    /// Evaluate a node in an environment
    pub fn eval(&mut self, node: &Node, env: &Environment) -> Outcome {
        self.eval_at(node, env, 0)
    }

    /// Evaluate with depth tracking to prevent stack overflow
    pub(crate) fn eval_at(&mut self, node: &Node, env: &Environment, depth: usize) -> Outcome {
        if depth >= self.config.max_depth {
            return Err(Signal::error(
                Error::DepthExceeded(self.config.max_depth),
                node.loc.clone(),
            ));
        }
        self.tick(&node.loc)?;
        ensure_sufficient_stack(|| self.eval_node(node, env, depth))
    }

    fn eval_node(&mut self, node: &Node, env: &Environment, depth: usize) -> Outcome {
        match &node.value {
            Value::Numeric(_)
            | Value::String(_)
            | Value::Atom(_)
            | Value::Quoted(_)
            | Value::Function(_)
            | Value::Primordial(_)
            | Value::SpecialForm(_) => Ok(node.clone()),

            Value::Symbol(name) => env
                .lookup(name)
                .map_err(|error| Signal::error(error, node.loc.clone())),

            Value::Vector(items) => {
                let evaluated = self.eval_args(items, env, depth)?;
                Ok(Node::new(Value::Vector(evaluated), node.loc.clone()))
            }

            Value::SExpression(items) => self
                .apply(node, items, env, depth)
                .map_err(|signal| signal.traced(&node.loc)),
        }
    }

    /// Count one evaluation step against the budget
    pub(crate) fn tick(&mut self, loc: &Location) -> Result<(), Signal> {
        self.steps += 1;
        match self.config.step_budget {
            Some(budget) if self.steps > budget => Err(Signal::error(
                Error::BudgetExhausted(budget),
                loc.clone(),
            )),
            _ => Ok(()),
        }
    }

    fn eval_args(&mut self, args: &[Node], env: &Environment, depth: usize) -> Outcome<Vec<Node>> {
        args.iter()
            .map(|arg| self.eval_at(arg, env, depth + 1))
            .collect()
    }

    fn apply(&mut self, form: &Node, items: &[Node], env: &Environment, depth: usize) -> Outcome {
        let Some((head, args)) = items.split_first() else {
            return Err(Signal::error(
                Error::wrong_type("cannot evaluate an empty s-expression"),
                form.loc.clone(),
            ));
        };

        let callee = self.eval_at(head, env, depth + 1)?;
        match &callee.value {
            Value::SpecialForm(
                op @ BuiltinOp {
                    op_kind: OpKind::SpecialForm(special_form),
                    ..
                },
            ) => {
                op.validate_arity(args.len())
                    .map_err(|error| Signal::error(error, form.loc.clone()))?;
                let call = Call {
                    name: op.name,
                    args,
                    env,
                    form,
                    depth,
                };
                special_form(self, &call)
            }

            Value::Function(closure) if closure.is_macro() => {
                let expansion = self.expand_call(closure, args, form, depth)?;
                tracing::debug!(
                    macro_name = %closure.name,
                    expansion = %expansion,
                    "macro expanded"
                );
                self.eval_at(&expansion, env, depth + 1)
            }

            Value::Function(closure) => {
                let values = self.eval_args(args, env, depth)?;
                self.call_closure(closure, values, form, depth)
            }

            Value::Primordial(primordial) => {
                let values = self.eval_args(args, env, depth)?;
                primordial
                    .call(&values)
                    .map(|value| Node::new(value, form.loc.clone()))
                    .map_err(|error| Signal::error(error, form.loc.clone()))
            }

            _ => Err(Signal::error(
                Error::NotCallable(head.to_string()),
                head.loc.clone(),
            )),
        }
    }

    /// Bind arguments in a fresh frame of the closure's environment and evaluate its body.
    /// A `return` raised inside the body ends the call with its payload.
    fn call_closure(
        &mut self,
        closure: &Rc<Closure>,
        args: Vec<Node>,
        form: &Node,
        depth: usize,
    ) -> Outcome {
        tracing::trace!(callee = %closure.name, args = args.len(), "call");
        let frame = bind_params(closure, args, form)?;
        match self.eval_at(&closure.body, &frame, depth + 1) {
            Err(signal) if signal.is_return() => Ok(signal.into_payload()),
            other => other,
        }
    }

    fn expand_call(
        &mut self,
        closure: &Rc<Closure>,
        args: &[Node],
        form: &Node,
        depth: usize,
    ) -> Outcome {
        let quoted = args.iter().cloned().map(Node::quote).collect();
        self.call_closure(closure, quoted, form, depth)
    }

    /// Expand a macro call once without evaluating the expansion.
    ///
    /// Returns the node unchanged when it is not an s-expression whose head names a macro.
    pub fn expand(&mut self, node: &Node, env: &Environment) -> Outcome {
        if let Value::SExpression(items) = &node.value
            && let Some((head, args)) = items.split_first()
            && let Value::Symbol(name) = &head.value
            && let Ok(callee) = env.lookup(name)
            && let Value::Function(closure) = &callee.value
            && closure.is_macro()
        {
            return self
                .expand_call(closure, args, node, 0)
                .map_err(|signal| signal.traced(&node.loc));
        }
        Ok(node.clone())
    }
}

fn bind_params(closure: &Closure, args: Vec<Node>, form: &Node) -> Result<Environment, Signal> {
    closure
        .params
        .arity()
        .validate(&closure.name, args.len())
        .map_err(|error| Signal::error(error, form.loc.clone()))?;

    let frame = closure.env.push_named(&closure.name);
    let mut args = args.into_iter();
    for (name, arg) in closure.params.names.iter().zip(args.by_ref()) {
        frame.define(name.clone(), arg);
    }
    if let Some(rest) = &closure.params.rest {
        frame.define(
            rest.clone(),
            Node::new(Value::Vector(args.collect()), form.loc.clone()),
        );
    }
    Ok(frame)
}

/// Evaluate a node with a default [`Evaluator`]
pub fn evaluate(node: &Node, env: &Environment) -> Outcome {
    Evaluator::default().eval(node, env)
}
