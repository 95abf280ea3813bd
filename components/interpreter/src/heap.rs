//! The object heap.
//!
//! Objects live in a dense arena and are referenced by [`ObjectId`]
//! everywhere (prototype links, property values, closures, frames), so the
//! reachable graph is a plain data structure that serializes by dumping the
//! arena in order. Nothing is ever freed; reclamation is the host language's
//! problem and persistence captures the whole arena.

use core_types::{jsnum, ErrorKind, ObjectId, ScopeId, Value};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::scope::Scope;
use core_types::NodeId;

/// Stable tag of a registered native function.
///
/// Tags are assigned in registration order and the registration order is
/// fixed, so a tag stored in a snapshot maps to the same host implementation
/// after a restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NativeTag(pub u32);

/// What kind of callable a function object is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FunctionData {
    /// A closure: a function node plus the scope it was created in.
    Interpreted {
        /// The `Function` syntax-tree node
        node: NodeId,
        /// The captured lexical scope
        scope: ScopeId,
    },
    /// A host function called synchronously.
    Native {
        /// Registration tag
        tag: NativeTag,
        /// Declared parameter count (the `length` property)
        arity: u8,
    },
    /// A host function that pauses the stepper and completes later.
    AsyncNative {
        /// Registration tag
        tag: NativeTag,
        /// Declared parameter count
        arity: u8,
    },
    /// The `eval` marker; calls parse their argument into the current scope.
    Eval,
}

/// Per-tag internal slots of an object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ObjectData {
    /// Ordinary object
    Plain,
    /// Array with its synthetic length
    Array {
        /// Current length; always one past the greatest index present
        length: u32,
    },
    /// Callable object
    Function(FunctionData),
    /// Regular expression
    Regex {
        /// The pattern source
        pattern: String,
        /// The flags string
        flags: String,
    },
    /// Date holding epoch milliseconds (NaN for an invalid date)
    Date {
        /// Milliseconds since the epoch
        #[serde(with = "jsnum")]
        ms: f64,
    },
    /// Error object; the kind selects its prototype
    Error {
        /// The error subkind
        kind: ErrorKind,
    },
}

/// A heap object.
///
/// Property attributes use the negative encoding of the data model: a key
/// is writable/enumerable/configurable unless listed in the corresponding
/// set. The sets are always subsets of the property keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Object {
    /// Prototype link; chains are finite
    pub proto: Option<ObjectId>,
    /// Named properties in insertion order
    pub properties: IndexMap<String, Value>,
    /// Keys that reject writes
    pub non_writable: BTreeSet<String>,
    /// Keys skipped by enumeration
    pub non_enumerable: BTreeSet<String>,
    /// Keys that reject deletion and attribute changes
    pub non_configurable: BTreeSet<String>,
    /// When false, new keys are rejected
    pub extensible: bool,
    /// Internal slots
    pub data: ObjectData,
}

impl Object {
    /// Creates a plain object with the given prototype.
    pub fn plain(proto: Option<ObjectId>) -> Self {
        Object {
            proto,
            properties: IndexMap::new(),
            non_writable: BTreeSet::new(),
            non_enumerable: BTreeSet::new(),
            non_configurable: BTreeSet::new(),
            extensible: true,
            data: ObjectData::Plain,
        }
    }

    /// Creates an object with the given prototype and internal data.
    pub fn with_data(proto: Option<ObjectId>, data: ObjectData) -> Self {
        Object {
            data,
            ..Object::plain(proto)
        }
    }

    /// True when this object is callable.
    pub fn is_function(&self) -> bool {
        matches!(self.data, ObjectData::Function(_))
    }

    /// The array length, if this is an array.
    pub fn array_length(&self) -> Option<u32> {
        match self.data {
            ObjectData::Array { length } => Some(length),
            _ => None,
        }
    }
}

/// Parses a property key as an array index.
///
/// Only canonical decimal forms count ("2" is an index, "02" and "4294967295"
/// are not), matching the language's definition of an array index.
pub fn array_index(key: &str) -> Option<u32> {
    if key == "0" {
        return Some(0);
    }
    if key.is_empty() || !key.bytes().all(|b| b.is_ascii_digit()) || key.starts_with('0') {
        return None;
    }
    match key.parse::<u32>() {
        Ok(n) if n < u32::MAX => Some(n),
        _ => None,
    }
}

/// The heap: object and scope arenas.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Heap {
    objects: Vec<Object>,
    scopes: Vec<Scope>,
}

impl Heap {
    /// Creates an empty heap.
    pub fn new() -> Self {
        Heap::default()
    }

    /// Rebuilds a heap from snapshot arenas.
    pub fn from_parts(objects: Vec<Object>, scopes: Vec<Scope>) -> Self {
        Heap { objects, scopes }
    }

    /// Allocates an object, returning its id.
    pub fn alloc(&mut self, object: Object) -> ObjectId {
        let id = ObjectId(self.objects.len() as u32);
        self.objects.push(object);
        id
    }

    /// Returns the object for an id.
    pub fn object(&self, id: ObjectId) -> &Object {
        &self.objects[id.0 as usize]
    }

    /// Returns the object for an id, mutably.
    pub fn object_mut(&mut self, id: ObjectId) -> &mut Object {
        &mut self.objects[id.0 as usize]
    }

    /// Allocates a scope, returning its id.
    pub fn alloc_scope(&mut self, scope: Scope) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(scope);
        id
    }

    /// Returns the scope for an id.
    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0 as usize]
    }

    /// Returns the scope for an id, mutably.
    pub fn scope_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id.0 as usize]
    }

    /// All objects in arena order.
    pub fn objects(&self) -> &[Object] {
        &self.objects
    }

    /// All scopes in arena order.
    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }

    /// Looks up a property on the object itself, ignoring the prototype
    /// chain and computed properties.
    pub fn own_property(&self, id: ObjectId, key: &str) -> Option<&Value> {
        self.object(id).properties.get(key)
    }

    /// Enumerable own keys of an object in insertion order, with array
    /// indices materialized from the length slot first.
    pub fn own_enumerable_keys(&self, id: ObjectId) -> Vec<String> {
        let object = self.object(id);
        object
            .properties
            .keys()
            .filter(|k| !object.non_enumerable.contains(*k))
            .cloned()
            .collect()
    }

    /// Whether the object (not its prototypes) has the key, counting the
    /// synthetic array length.
    pub fn has_own(&self, id: ObjectId, key: &str) -> bool {
        let object = self.object(id);
        if object.array_length().is_some() && key == "length" {
            return true;
        }
        object.properties.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_array_index_recognition() {
        assert_eq!(array_index("0"), Some(0));
        assert_eq!(array_index("42"), Some(42));
        assert_eq!(array_index("02"), None);
        assert_eq!(array_index(""), None);
        assert_eq!(array_index("-1"), None);
        assert_eq!(array_index("1.5"), None);
        assert_eq!(array_index("4294967295"), None);
    }

    #[test]
    fn test_alloc_and_lookup() {
        let mut heap = Heap::new();
        let a = heap.alloc(Object::plain(None));
        let b = heap.alloc(Object::plain(Some(a)));
        assert_eq!(a, ObjectId(0));
        assert_eq!(heap.object(b).proto, Some(a));
    }

    #[test]
    fn test_own_enumerable_keys_skip_non_enumerable() {
        let mut heap = Heap::new();
        let id = heap.alloc(Object::plain(None));
        let object = heap.object_mut(id);
        object.properties.insert("a".to_string(), Value::Null);
        object.properties.insert("b".to_string(), Value::Null);
        object.non_enumerable.insert("a".to_string());
        assert_eq!(heap.own_enumerable_keys(id), vec!["b".to_string()]);
    }
}
