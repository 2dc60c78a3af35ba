//! Name resolution.
//!
//! Each function invocation gets a child scope pointing at the scope the
//! function was defined in; lookup and assignment walk that chain. A store
//! that finds no existing binding creates one in the innermost scope.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::value::Value;

pub struct Scope {
    vars: RefCell<HashMap<String, Value>>,
    parent: Option<Rc<Scope>>,
}

impl Scope {
    pub fn root() -> Rc<Self> {
        Rc::new(Self {
            vars: RefCell::new(HashMap::new()),
            parent: None,
        })
    }

    pub fn child(parent: Rc<Scope>) -> Rc<Self> {
        Rc::new(Self {
            vars: RefCell::new(HashMap::new()),
            parent: Some(parent),
        })
    }

    /// Walk the chain for a binding.
    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.vars.borrow().get(name) {
            return Some(value.clone());
        }
        self.parent.as_ref().and_then(|p| p.get(name))
    }

    /// Create or overwrite a binding in this scope.
    pub fn define(&self, name: &str, value: Value) {
        self.vars.borrow_mut().insert(name.to_string(), value);
    }

    /// Update the nearest existing binding, or create one here.
    pub fn assign(&self, name: &str, value: Value) {
        if !self.try_assign(name, &value) {
            self.define(name, value);
        }
    }

    fn try_assign(&self, name: &str, value: &Value) -> bool {
        if let Some(slot) = self.vars.borrow_mut().get_mut(name) {
            *slot = value.clone();
            return true;
        }
        self.parent
            .as_ref()
            .is_some_and(|p| p.try_assign(name, value))
    }

    pub fn has(&self, name: &str) -> bool {
        self.vars.borrow().contains_key(name)
            || self.parent.as_ref().is_some_and(|p| p.has(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_walks_the_chain() {
        let root = Scope::root();
        root.define("x", Value::Number(1.0));
        let inner = Scope::child(root.clone());
        assert_eq!(inner.get("x"), Some(Value::Number(1.0)));
        assert_eq!(inner.get("y"), None);
    }

    #[test]
    fn assignment_updates_the_defining_scope() {
        let root = Scope::root();
        root.define("x", Value::Number(1.0));
        let inner = Scope::child(root.clone());
        inner.assign("x", Value::Number(2.0));
        assert_eq!(root.get("x"), Some(Value::Number(2.0)));
        assert!(!inner.vars.borrow().contains_key("x"));
    }

    #[test]
    fn unbound_assignment_lands_in_the_innermost_scope() {
        let root = Scope::root();
        let inner = Scope::child(root.clone());
        inner.assign("fresh", Value::Bool(true));
        assert!(inner.vars.borrow().contains_key("fresh"));
        assert_eq!(root.get("fresh"), None);
    }
}
