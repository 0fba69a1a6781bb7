use std::rc::Rc;

use crate::{
    diagnostics::HostError,
    environment::{Environment, EnvironmentRef},
    stdlib,
    value::{Arity, Value},
};

/// Builds the root scope a host hands to the evaluator. Each embedding owns
/// its registry; there is no process-wide table.
pub struct Registry {
    root: EnvironmentRef,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            root: Environment::new(),
        }
    }

    /// A registry pre-populated with the core prelude.
    pub fn with_prelude() -> Self {
        let mut registry = Self::new();
        stdlib::install(&mut registry);
        registry
    }

    /// Binds `name` in the root scope. Redefinition overwrites.
    pub fn define(&mut self, name: impl Into<String>, value: Value) -> &mut Self {
        self.root.borrow_mut().define(name, value);
        self
    }

    pub fn define_native<F>(&mut self, name: &str, arity: Arity, callback: F) -> &mut Self
    where
        F: Fn(&[Value]) -> Result<Value, HostError> + 'static,
    {
        self.define(name, Value::native(name, arity, callback))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.root.borrow().contains_local(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.root.borrow().local_names()
    }

    pub fn environment(&self) -> EnvironmentRef {
        Rc::clone(&self.root)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
