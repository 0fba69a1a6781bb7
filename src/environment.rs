use std::{cell::RefCell, rc::Rc};

use indexmap::IndexMap;

use crate::{diagnostics::RuntimeError, value::Value};

pub type EnvironmentRef = Rc<RefCell<Environment>>;

/// One lexical frame. Frames are shared by the closures that capture them.
#[derive(Debug, Default)]
pub struct Environment {
    parent: Option<EnvironmentRef>,
    bindings: IndexMap<String, Value>,
}

impl Environment {
    pub fn new() -> EnvironmentRef {
        Rc::new(RefCell::new(Self::default()))
    }

    pub fn with_parent(parent: EnvironmentRef) -> EnvironmentRef {
        Rc::new(RefCell::new(Self {
            parent: Some(parent),
            bindings: IndexMap::new(),
        }))
    }

    /// Binds `name` in this frame, overwriting an existing binding here.
    pub fn define(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.insert(name.into(), value);
    }

    pub fn contains_local(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// Names bound in this frame, in definition order.
    pub fn local_names(&self) -> Vec<String> {
        self.bindings.keys().cloned().collect()
    }

    pub fn parent(&self) -> Option<EnvironmentRef> {
        self.parent.clone()
    }

    /// Rebinds `name` in the nearest frame that defines it.
    pub fn assign(env: &EnvironmentRef, name: &str, value: Value) -> Result<(), RuntimeError> {
        if let Some(slot) = env.borrow_mut().bindings.get_mut(name) {
            *slot = value;
            return Ok(());
        }
        let parent = env.borrow().parent.clone();
        match parent {
            Some(parent) => Environment::assign(&parent, name, value),
            None => Err(RuntimeError::undefined(name)),
        }
    }

    pub fn get(env: &EnvironmentRef, name: &str) -> Result<Value, RuntimeError> {
        if let Some(value) = env.borrow().bindings.get(name) {
            return Ok(value.clone());
        }
        let parent = env.borrow().parent.clone();
        match parent {
            Some(parent) => Environment::get(&parent, name),
            None => Err(RuntimeError::undefined(name)),
        }
    }
}
