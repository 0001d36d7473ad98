//! Lexical scopes.

use super::value::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Clone)]
pub enum Slot {
    Value { value: Value, mutable: bool },
    /// Declared with `const`/`let` but not yet initialized (temporal dead zone).
    Uninitialized { mutable: bool },
    /// Bound by an import that was not stripped.
    Import { specifier: String },
}

/// Outcome of a lookup through the scope chain.
pub enum Lookup {
    Found(Value),
    Uninitialized,
    Import(String),
    Missing,
}

/// Outcome of assigning to a name.
pub enum Store {
    Done,
    Constant,
    Uninitialized,
    Import(String),
    Missing,
}

#[derive(Default)]
pub struct Scope {
    slots: RefCell<HashMap<String, Slot>>,
    parent: Option<Rc<Scope>>,
}

impl Scope {
    pub fn root() -> Rc<Scope> {
        Rc::new(Scope::default())
    }

    pub fn child(parent: &Rc<Scope>) -> Rc<Scope> {
        Rc::new(Scope {
            slots: RefCell::default(),
            parent: Some(Rc::clone(parent)),
        })
    }

    /// Add a binding to this scope. Returns `false` if the name is taken.
    pub fn declare(&self, name: &str, slot: Slot) -> bool {
        let mut slots = self.slots.borrow_mut();
        if slots.contains_key(name) {
            return false;
        }
        slots.insert(name.to_string(), slot);
        true
    }

    /// Initialize a declared binding (or create it when undeclared).
    pub fn initialize(&self, name: &str, value: Value, mutable: bool) {
        self.slots
            .borrow_mut()
            .insert(name.to_string(), Slot::Value { value, mutable });
    }

    pub fn has_own(&self, name: &str) -> bool {
        self.slots.borrow().contains_key(name)
    }

    pub fn own(&self, name: &str) -> Option<Slot> {
        self.slots.borrow().get(name).cloned()
    }

    pub fn lookup(&self, name: &str) -> Lookup {
        match self.slots.borrow().get(name) {
            Some(Slot::Value { value, .. }) => return Lookup::Found(value.clone()),
            Some(Slot::Uninitialized { .. }) => return Lookup::Uninitialized,
            Some(Slot::Import { specifier }) => return Lookup::Import(specifier.clone()),
            None => {}
        }
        match &self.parent {
            Some(parent) => parent.lookup(name),
            None => Lookup::Missing,
        }
    }

    /// Whether any enclosing scope (not this one) binds `name`.
    pub fn inherited(&self, name: &str) -> bool {
        let mut current = self.parent.as_ref();
        while let Some(scope) = current {
            if scope.has_own(name) {
                return true;
            }
            current = scope.parent.as_ref();
        }
        false
    }

    /// Rebind `name` in the nearest scope that declares it.
    pub fn assign(&self, name: &str, value: Value) -> Store {
        {
            let mut slots = self.slots.borrow_mut();
            match slots.get_mut(name) {
                Some(Slot::Value {
                    value: slot,
                    mutable: true,
                }) => {
                    *slot = value;
                    return Store::Done;
                }
                Some(Slot::Value { mutable: false, .. }) => return Store::Constant,
                Some(Slot::Uninitialized { .. }) => return Store::Uninitialized,
                Some(Slot::Import { specifier }) => return Store::Import(specifier.clone()),
                None => {}
            }
        }
        match &self.parent {
            Some(parent) => parent.assign(name, value),
            None => Store::Missing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_scopes_see_and_shadow_parents() {
        let root = Scope::root();
        root.initialize("a", Value::Number(1.0), false);
        let child = Scope::child(&root);
        assert!(matches!(child.lookup("a"), Lookup::Found(Value::Number(n)) if n == 1.0));
        child.initialize("a", Value::Number(2.0), false);
        assert!(matches!(child.lookup("a"), Lookup::Found(Value::Number(n)) if n == 2.0));
        assert!(matches!(root.lookup("a"), Lookup::Found(Value::Number(n)) if n == 1.0));
        assert!(child.inherited("a"));
        assert!(!root.inherited("a"));
    }

    #[test]
    fn declare_rejects_duplicates() {
        let scope = Scope::root();
        assert!(scope.declare("x", Slot::Uninitialized { mutable: false }));
        assert!(!scope.declare("x", Slot::Uninitialized { mutable: false }));
        assert!(matches!(scope.lookup("x"), Lookup::Uninitialized));
    }

    #[test]
    fn assignment_respects_constness() {
        let scope = Scope::root();
        scope.initialize("c", Value::Null, false);
        scope.initialize("l", Value::Null, true);
        assert!(matches!(scope.assign("c", Value::Bool(true)), Store::Constant));
        assert!(matches!(scope.assign("l", Value::Bool(true)), Store::Done));
        assert!(matches!(scope.assign("nope", Value::Null), Store::Missing));
    }
}
