//! Lexical scopes.
//!
//! A scope is a binding frame with a parent link; closures keep the scope
//! they were created in alive, so scopes are heap entities referenced by
//! [`ScopeId`](core_types::ScopeId) rather than data inlined into frames.

use core_types::{ScopeId, Value};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A variable binding frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scope {
    /// Enclosing scope; `None` only for the global scope
    pub parent: Option<ScopeId>,
    /// Bindings in declaration order
    pub vars: IndexMap<String, Value>,
    /// Names that reject assignment and deletion
    pub read_only: BTreeSet<String>,
}

impl Scope {
    /// Creates a scope with the given parent.
    pub fn new(parent: Option<ScopeId>) -> Self {
        Scope {
            parent,
            vars: IndexMap::new(),
            read_only: BTreeSet::new(),
        }
    }

    /// Declares a binding if not already present.
    ///
    /// Redeclaration keeps the existing value, matching `var` hoisting.
    pub fn declare(&mut self, name: &str, value: Value, read_only: bool) {
        if !self.vars.contains_key(name) {
            self.vars.insert(name.to_string(), value);
            if read_only {
                self.read_only.insert(name.to_string());
            }
        }
    }

    /// Overwrites a binding unconditionally, declaring it if needed.
    pub fn force(&mut self, name: &str, value: Value) {
        self.vars.insert(name.to_string(), value);
    }
}
