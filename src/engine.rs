//! Top-level driver.
//!
//! An [`Engine`] owns a long-lived root environment and evaluates top-level forms
//! against it one at a time. Each form gets a fresh step budget, and a `break` or
//! `return` that escapes a form is turned into an error. Sources are remembered by
//! label so failures can be reported against the text they came from.

use crate::ast::{Node, Value};
use crate::diagnostic::{SourceMap, render_signal};
use crate::environment::{Environment, create_global_env};
use crate::evaluator::{EvalConfig, Evaluator};
use crate::location::Location;
use crate::parser::{Feed, IncrementalParser, ParseConfig, parse_with_config};
use crate::primordials::Arity;
use crate::signal::{Outcome, Signal};
use crate::{Error, ParseError};

/// Label prefix of interactive entries
pub const REPL_LABEL: &str = "repl";

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EngineConfig {
    pub parse: ParseConfig,
    pub eval: EvalConfig,
}

/// Result of feeding one line of interactive input
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// More lines are needed to complete the current form
    Incomplete,
    /// Every form in the entry evaluated; one value per form
    Values(Vec<Node>),
    /// Parsing or evaluation failed; earlier forms of the entry keep their effects
    Failed(Signal),
}

#[derive(Debug)]
pub struct Engine {
    env: Environment,
    evaluator: Evaluator,
    config: EngineConfig,
    sources: SourceMap,
    reader: IncrementalParser,
}

fn parse_signal(error: ParseError) -> Signal {
    let location = error.location.clone();
    Signal::error(Error::Parse(error), location)
}

impl Engine {
    pub fn new() -> Self {
        Engine::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Engine {
            env: create_global_env(),
            evaluator: Evaluator::new(config.eval),
            config,
            sources: SourceMap::new(),
            reader: IncrementalParser::with_config(REPL_LABEL, config.parse),
        }
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    pub fn sources(&self) -> &SourceMap {
        &self.sources
    }

    pub fn config(&self) -> EngineConfig {
        self.config
    }

    /// Make a native function callable by name from every later form
    pub fn register_primordial(
        &self,
        name: &str,
        arity: Arity,
        func: impl Fn(&[Node]) -> Result<Value, Error> + 'static,
    ) {
        self.env.register_primordial(name, arity, func);
    }

    /// Parse and evaluate every top-level form of `text`, left to right.
    ///
    /// Returns the value of the last form, or `:NIL` when there are none. The first
    /// failure stops the run; bindings made by earlier forms remain.
    pub fn parse_and_run(&mut self, text: &str, label: &str) -> Outcome {
        self.sources.add(label, text);
        self.env.set_program(label);
        tracing::debug!(program = label, bytes = text.len(), "run program");

        let mut last = Node::new(Value::nil(), Location::runtime());
        for form in parse_with_config(text, label, self.config.parse) {
            let form = form.map_err(parse_signal)?;
            last = self.evaluate(&form)?;
        }
        Ok(last)
    }

    /// Evaluate one top-level form
    pub fn evaluate(&mut self, node: &Node) -> Outcome {
        self.evaluator.reset_budget();
        tracing::debug!(form = %node, "evaluate top-level form");

        let result = self.evaluator.eval(node, &self.env).map_err(|signal| {
            if signal.as_error().is_none() {
                tracing::warn!(origin = %signal.origin, "{signal} escaped the top-level form");
            }
            signal.escaped()
        });
        match &result {
            Ok(value) => tracing::trace!(steps = self.evaluator.steps(), value = %value, "form done"),
            Err(signal) => tracing::debug!(steps = self.evaluator.steps(), %signal, "form failed"),
        }
        result
    }

    /// Feed one line of interactive input.
    ///
    /// Lines accumulate until they form complete expressions, which are then evaluated
    /// in order. A parse error discards the buffered entry.
    pub fn feed(&mut self, line: &str) -> Reply {
        let label = self.reader.current_label();
        let text = if self.reader.is_pending() {
            format!("{}\n{line}", self.reader.pending())
        } else {
            line.to_owned()
        };
        self.sources.add(&label, &text);

        match self.reader.feed(line) {
            Ok(Feed::Incomplete) => Reply::Incomplete,
            Ok(Feed::Complete { label, nodes, .. }) => {
                self.env.set_program(&label);
                let mut values = Vec::with_capacity(nodes.len());
                for node in &nodes {
                    match self.evaluate(node) {
                        Ok(value) => values.push(value),
                        Err(signal) => return Reply::Failed(signal),
                    }
                }
                Reply::Values(values)
            }
            Err(error) => Reply::Failed(parse_signal(error)),
        }
    }

    /// True while interactive input is waiting for more lines
    pub fn is_pending(&self) -> bool {
        self.reader.is_pending()
    }

    /// Drop any partially entered interactive input
    pub fn reset_input(&mut self) {
        self.reader.reset();
    }

    /// Render a failure against the sources this engine has seen
    pub fn report(&self, signal: &Signal) -> String {
        render_signal(signal, &self.sources)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new()
    }
}
