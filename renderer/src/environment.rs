use std::collections::HashMap;

use crate::error::RuntimeError;
use crate::runtime_value::Value;

/// One level of bindings: the data context, or an isolated loop/import scope.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    variables: HashMap<String, Value>,
}

impl Scope {
    pub fn new() -> Self {
        Scope::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    pub fn set(&mut self, name: &str, value: Value) {
        self.variables.insert(name.to_string(), value);
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.variables.get_mut(name)
    }
}

/// The full environment is a stack of scopes. The bottom scope holds the
/// data context and is never popped.
#[derive(Debug)]
pub struct Environment {
    scopes: Vec<Scope>,
}

impl Environment {
    pub fn new(root: Scope) -> Self {
        Environment { scopes: vec![root] }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(Scope::new());
    }

    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Look up a variable, searching from innermost scope outward.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    /// Bind `name` in the innermost scope, shadowing outer bindings.
    pub fn declare(&mut self, name: &str, value: Value) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.set(name, value);
        }
    }

    /// Overwrite the nearest existing binding of `name`.
    pub fn assign(&mut self, name: &str, value: Value) -> Result<(), RuntimeError> {
        for scope in self.scopes.iter_mut().rev() {
            if let Some(slot) = scope.get_mut(name) {
                *slot = value;
                return Ok(());
            }
        }
        Err(RuntimeError::UndeclaredAssignment(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inner_declarations_shadow_and_disappear() {
        let mut root = Scope::new();
        root.set("x", Value::Number(1.0));
        let mut env = Environment::new(root);
        env.push_scope();
        env.declare("x", Value::Number(2.0));
        assert_eq!(env.get("x"), Some(&Value::Number(2.0)));
        env.pop_scope();
        assert_eq!(env.get("x"), Some(&Value::Number(1.0)));
    }

    #[test]
    fn assignment_reaches_the_nearest_binding() {
        let mut root = Scope::new();
        root.set("total", Value::Number(0.0));
        let mut env = Environment::new(root);
        env.push_scope();
        env.assign("total", Value::Number(5.0)).unwrap();
        env.pop_scope();
        assert_eq!(env.get("total"), Some(&Value::Number(5.0)));
        assert_eq!(
            env.assign("missing", Value::Null),
            Err(RuntimeError::UndeclaredAssignment("missing".to_string()))
        );
    }

    #[test]
    fn root_scope_is_never_popped() {
        let mut env = Environment::new(Scope::new());
        env.pop_scope();
        assert_eq!(env.depth(), 1);
    }
}
