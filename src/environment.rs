use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::Error;
use crate::ast::{Node, Primordial, Value};
use crate::primordials::{Arity, OpKind, get_builtin_ops};

/// Descriptive data about a frame, copied from parent to child when a frame is pushed
#[derive(Debug, Clone, PartialEq)]
pub struct FrameMeta {
    /// Name of the frame, e.g. the function whose call created it
    pub name: Rc<str>,
    /// Label of the program being run when the frame was created
    pub program: Rc<str>,
    /// Number of ancestors
    pub level: usize,
}

struct Frame {
    bindings: HashMap<String, Node>,
    parent: Option<Environment>,
    meta: FrameMeta,
}

/// A lexical frame of name bindings chained to its parent.
///
/// Cloning an `Environment` clones the handle, not the frame: closures capture
/// the handle, so a frame lives as long as any closure created in it.
#[derive(Clone)]
pub struct Environment(Rc<RefCell<Frame>>);

impl Environment {
    /// A root frame with no parent and no bindings
    pub fn new() -> Self {
        Environment::with_meta(
            None,
            FrameMeta {
                name: Rc::from("global"),
                program: Rc::from("<none>"),
                level: 0,
            },
        )
    }

    fn with_meta(parent: Option<Environment>, meta: FrameMeta) -> Self {
        Environment(Rc::new(RefCell::new(Frame {
            bindings: HashMap::new(),
            parent,
            meta,
        })))
    }

    /// Create a child frame of this one
    pub fn push(&self) -> Environment {
        let name = format!("{}-child", self.0.borrow().meta.name);
        self.push_named(&name)
    }

    /// Create a child frame with the given name. Other metadata is inherited.
    pub fn push_named(&self, name: &str) -> Environment {
        let mut meta = self.meta();
        meta.name = Rc::from(name);
        meta.level += 1;
        tracing::trace!(frame = name, level = meta.level, "push frame");
        Environment::with_meta(Some(self.clone()), meta)
    }

    /// Look a name up in this frame, then in each ancestor
    pub fn lookup(&self, name: &str) -> Result<Node, Error> {
        let frame = self.0.borrow();
        if let Some(node) = frame.bindings.get(name) {
            return Ok(node.clone());
        }
        match &frame.parent {
            Some(parent) => parent.lookup(name),
            None => Err(Error::UnboundName(name.to_owned())),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        let frame = self.0.borrow();
        frame.bindings.contains_key(name)
            || frame.parent.as_ref().is_some_and(|parent| parent.contains(name))
    }

    /// Bind a name in this frame only, replacing any previous binding here
    pub fn define(&self, name: impl Into<String>, value: Node) {
        self.0.borrow_mut().bindings.insert(name.into(), value);
    }

    pub fn parent(&self) -> Option<Environment> {
        self.0.borrow().parent.clone()
    }

    pub fn meta(&self) -> FrameMeta {
        self.0.borrow().meta.clone()
    }

    pub fn name(&self) -> Rc<str> {
        self.0.borrow().meta.name.clone()
    }

    pub fn level(&self) -> usize {
        self.0.borrow().meta.level
    }

    /// Label frames pushed from now on with the program being run
    pub fn set_program(&self, program: &str) {
        self.0.borrow_mut().meta.program = Rc::from(program);
    }

    pub fn same_frame(&self, other: &Environment) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Register a native function in this frame.
    ///
    /// # Example
    /// ```
    /// use amalgam::ast::{Node, Value};
    /// use amalgam::environment::create_global_env;
    /// use amalgam::primordials::Arity;
    ///
    /// let env = create_global_env();
    /// env.register_primordial("count", Arity::Any, |args: &[Node]| {
    ///     Ok(Value::from(args.len() as i64))
    /// });
    /// // Now (count 1 2 3) can be called from evaluated expressions
    /// ```
    pub fn register_primordial(
        &self,
        name: &str,
        arity: Arity,
        func: impl Fn(&[Node]) -> Result<Value, Error> + 'static,
    ) {
        let primordial = Primordial::new(name, arity, func);
        self.define(name, Node::synthetic(Value::Primordial(primordial)));
    }

    /// Get all bindings visible from this frame, sorted by name
    pub fn get_all_bindings(&self) -> Vec<(String, Node)> {
        let mut bindings = HashMap::new();
        let frame = self.0.borrow();

        // Parent bindings first so local ones override them
        if let Some(parent) = &frame.parent {
            for (name, node) in parent.get_all_bindings() {
                bindings.insert(name, node);
            }
        }
        for (name, node) in &frame.bindings {
            bindings.insert(name.clone(), node.clone());
        }

        let mut result: Vec<_> = bindings.into_iter().collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }
}

impl Default for Environment {
    fn default() -> Self {
        Environment::new()
    }
}

impl PartialEq for Environment {
    fn eq(&self, other: &Self) -> bool {
        self.same_frame(other)
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let frame = self.0.borrow();
        f.debug_struct("Environment")
            .field("name", &frame.meta.name)
            .field("level", &frame.meta.level)
            .field("bindings", &frame.bindings.len())
            .finish()
    }
}

/// Create a root environment holding every special form and primordial function
pub fn create_global_env() -> Environment {
    let env = Environment::new();

    for builtin_op in get_builtin_ops() {
        let value = match &builtin_op.op_kind {
            OpKind::Function(func) => {
                let f = *func;
                Value::Primordial(Primordial::new(builtin_op.name, builtin_op.arity, f))
            }
            OpKind::SpecialForm(_) => Value::SpecialForm(builtin_op),
        };
        env.define(builtin_op.name, Node::synthetic(value));
    }

    env
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::val;

    #[test]
    fn test_lookup_walks_parents() {
        let root = Environment::new();
        root.define("x", val(1));
        let child = root.push();
        let grandchild = child.push();

        assert_eq!(grandchild.lookup("x").unwrap(), val(1));
        assert_eq!(
            grandchild.lookup("y").unwrap_err(),
            Error::UnboundName("y".into())
        );
        assert!(grandchild.contains("x"));
        assert!(!grandchild.contains("y"));
    }

    #[test]
    fn test_define_shadows_without_touching_parent() {
        let root = Environment::new();
        root.define("x", val(1));
        let child = root.push();
        child.define("x", val(2));

        assert_eq!(child.lookup("x").unwrap(), val(2));
        assert_eq!(root.lookup("x").unwrap(), val(1));

        // redefinition replaces the binding in the same frame
        child.define("x", val(3));
        assert_eq!(child.lookup("x").unwrap(), val(3));
    }

    #[test]
    fn test_parent_updates_are_visible_to_children() {
        let root = Environment::new();
        let child = root.push();
        root.define("late", val("seen"));
        assert_eq!(child.lookup("late").unwrap(), val("seen"));
    }

    #[test]
    fn test_metadata_is_copied_on_push() {
        let root = Environment::new();
        root.set_program("main.am");
        let child = root.push();
        let named = child.push_named("square");

        assert_eq!(child.meta().program.as_ref(), "main.am");
        assert_eq!(child.name().as_ref(), "global-child");
        assert_eq!(child.level(), 1);
        assert_eq!(named.name().as_ref(), "square");
        assert_eq!(named.level(), 2);
        assert!(named.parent().unwrap().same_frame(&child));

        // metadata is copied, not shared
        root.set_program("other.am");
        assert_eq!(child.meta().program.as_ref(), "main.am");
    }

    #[test]
    fn test_get_all_bindings_sorted_and_overridden() {
        let root = Environment::new();
        root.define("b", val(1));
        root.define("a", val(2));
        let child = root.push();
        child.define("b", val(3));

        let bindings = child.get_all_bindings();
        let names: Vec<_> = bindings.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(bindings[1].1, val(3));
    }

    #[test]
    fn test_global_env_holds_registry() {
        let env = create_global_env();
        assert!(matches!(env.lookup("+").unwrap().value, Value::Primordial(_)));
        assert!(matches!(
            env.lookup("loop").unwrap().value,
            Value::SpecialForm(_)
        ));
        assert!(env.get_all_bindings().len() >= get_builtin_ops().len());
    }
}
