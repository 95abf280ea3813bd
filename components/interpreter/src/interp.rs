//! The interpreter: runtime state and the public stepping contract.
//!
//! The runtime is one explicit entity holding the syntax-tree arena, the
//! heap, the execution stack and the native-function registry. Everything
//! except the registry and the regex cache is serializable state; the
//! registry is rebuilt at restore time and validated against the snapshot's
//! tag table.

use core_types::{ErrorKind, FatalError, NodeId, ObjectId, ScopeId, Value};
use parser::{Ast, Node, ParseError};
use std::collections::HashMap;

use crate::convert;
use crate::frame::{Completion, Frame, FrameState, Reference, TryPhase};
use crate::heap::{array_index, FunctionData, Heap, NativeTag, Object, ObjectData};
use crate::scope::Scope;
use crate::step;

/// A thrown language-level value travelling through Rust return paths.
///
/// Heap operations and native functions return `Result<_, Thrown>`; the
/// stepper converts a `Thrown` into stack unwinding.
#[derive(Debug, Clone)]
pub struct Thrown(pub Value);

/// A synchronous native function.
pub type NativeFn = fn(&mut Interpreter, Value, &[Value]) -> Result<Value, Thrown>;

/// An asynchronous native function.
///
/// The implementation arranges for [`Interpreter::resolve_pending`] to be
/// called later; the stepper stays paused until then.
pub type AsyncNativeFn = fn(&mut Interpreter, Value, &[Value]) -> Result<(), Thrown>;

/// Either flavor of host implementation.
#[derive(Clone, Copy)]
pub enum NativeImpl {
    /// Called synchronously; its return value is the call result
    Sync(NativeFn),
    /// Pauses the stepper until the host resolves the call
    Async(AsyncNativeFn),
}

/// The native-function registry.
///
/// Registration order is the tag order; the same registration routine must
/// run identically on every boot so tags stored in snapshots keep meaning
/// the same host implementations.
#[derive(Default)]
pub struct NativeRegistry {
    entries: Vec<(String, NativeImpl)>,
    by_name: HashMap<String, u32>,
}

impl NativeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        NativeRegistry::default()
    }

    /// Registers a host implementation under a stable name.
    ///
    /// Registering the same name again returns the original tag.
    pub fn register(&mut self, name: &str, imp: NativeImpl) -> NativeTag {
        if let Some(&tag) = self.by_name.get(name) {
            return NativeTag(tag);
        }
        let tag = self.entries.len() as u32;
        self.entries.push((name.to_string(), imp));
        self.by_name.insert(name.to_string(), tag);
        NativeTag(tag)
    }

    /// Returns the implementation for a tag.
    pub fn get(&self, tag: NativeTag) -> Option<NativeImpl> {
        self.entries.get(tag.0 as usize).map(|(_, imp)| *imp)
    }

    /// The tag table: registered names in tag order.
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|(name, _)| name.clone()).collect()
    }

    /// Number of registered natives.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Interpreter-global singleton objects: the prototype registry.
///
/// Created once by host-binding initialization and carried in the snapshot
/// header. The placeholder ids are only alive between `Interpreter::new`
/// and `install_globals`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Protos {
    /// Object.prototype
    pub object: ObjectId,
    /// Function.prototype
    pub function: ObjectId,
    /// Array.prototype
    pub array: ObjectId,
    /// String.prototype
    pub string: ObjectId,
    /// Number.prototype
    pub number: ObjectId,
    /// Boolean.prototype
    pub boolean: ObjectId,
    /// Date.prototype
    pub date: ObjectId,
    /// RegExp.prototype
    pub regexp: ObjectId,
    /// Error prototypes in [`ErrorKind::all`] order
    pub errors: [ObjectId; 7],
}

impl Protos {
    /// Placeholder ids, replaced by host-binding initialization.
    pub fn placeholder() -> Self {
        Protos {
            object: ObjectId(0),
            function: ObjectId(0),
            array: ObjectId(0),
            string: ObjectId(0),
            number: ObjectId(0),
            boolean: ObjectId(0),
            date: ObjectId(0),
            regexp: ObjectId(0),
            errors: [ObjectId(0); 7],
        }
    }

    /// The prototype object for an error kind.
    pub fn error_proto(&self, kind: ErrorKind) -> ObjectId {
        let index = ErrorKind::all().iter().position(|k| *k == kind).unwrap_or(0);
        self.errors[index]
    }
}

/// Property attributes used when installing properties.
#[derive(Debug, Clone, Copy)]
pub struct PropFlags {
    /// Writable unless false
    pub writable: bool,
    /// Enumerable unless false
    pub enumerable: bool,
    /// Configurable unless false
    pub configurable: bool,
}

impl PropFlags {
    /// Ordinary data property.
    pub fn plain() -> Self {
        PropFlags {
            writable: true,
            enumerable: true,
            configurable: true,
        }
    }

    /// Writable but hidden from enumeration; how builtins are installed.
    pub fn hidden() -> Self {
        PropFlags {
            writable: true,
            enumerable: false,
            configurable: true,
        }
    }

    /// Fully locked, e.g. a function's `length`.
    pub fn frozen() -> Self {
        PropFlags {
            writable: false,
            enumerable: false,
            configurable: false,
        }
    }
}

/// Result of a single step.
#[derive(Debug, Clone, PartialEq)]
pub enum StepResult {
    /// More work remains
    More,
    /// The root program frame is done
    Done,
    /// A throw reached the root uncaught; the stack has been reset
    Uncaught(Value),
}

/// Result of a run loop.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The root program completed
    Done,
    /// The pause flag was observed
    Paused,
    /// A throw reached the root uncaught
    Uncaught(Value),
}

/// Serializable runtime state, as consumed and produced by the snapshot
/// subsystem.
pub struct InterpreterParts {
    /// The syntax-tree arena
    pub ast: Ast,
    /// The heap (objects and scopes)
    pub heap: Heap,
    /// The execution stack
    pub stack: Vec<Frame>,
    /// The global scope id
    pub global_scope: ScopeId,
    /// The prototype registry
    pub protos: Protos,
    /// The last expression-statement value
    pub last_value: Value,
    /// The configured stack-depth limit
    pub stack_limit: usize,
}

/// The virtual machine.
pub struct Interpreter {
    /// Syntax-tree arena; grows across appends and evals
    pub ast: Ast,
    /// Object and scope arenas
    pub heap: Heap,
    /// Execution stack; index 0 is the persistent root Program frame
    pub stack: Vec<Frame>,
    /// The global scope
    pub global_scope: ScopeId,
    /// Prototype registry
    pub protos: Protos,
    /// Value of the most recently completed expression statement; the
    /// program/eval completion value
    pub last_value: Value,
    /// Native registry; rebuilt, not serialized
    pub natives: NativeRegistry,
    stack_limit: usize,
    paused: bool,
    pending_call: bool,
    pub(crate) uncaught: Option<Value>,
    regex_cache: HashMap<(String, String), regex::Regex>,
    log_buffer: Vec<String>,
    checkpoint_requested: bool,
    shutdown_requested: Option<i32>,
}

const DEFAULT_STACK_LIMIT: usize = 10_000;

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    /// Creates a fresh runtime with an empty root program.
    ///
    /// Host bindings are not installed; call the builtins crate's install
    /// routine before running user code.
    pub fn new() -> Self {
        let mut heap = Heap::new();
        let global_scope = heap.alloc_scope(Scope::new(None));
        // Arena slot 0 backs every prototype id until host bindings
        // install the real prototype registry.
        let bootstrap = heap.alloc(Object::plain(None));
        let mut protos = Protos::placeholder();
        protos.object = bootstrap;
        let mut ast = Ast::new();
        let root = ast.push(Node::Program { body: Vec::new() });
        let stack = vec![Frame::new(
            root,
            global_scope,
            Value::Undefined,
            FrameState::Program { index: 0 },
        )];
        Interpreter {
            ast,
            heap,
            stack,
            global_scope,
            protos,
            last_value: Value::Undefined,
            natives: NativeRegistry::new(),
            stack_limit: DEFAULT_STACK_LIMIT,
            paused: false,
            pending_call: false,
            uncaught: None,
            regex_cache: HashMap::new(),
            log_buffer: Vec::new(),
            checkpoint_requested: false,
            shutdown_requested: None,
        }
    }

    /// Reassembles a runtime from snapshot parts and a freshly registered
    /// native registry.
    pub fn from_parts(parts: InterpreterParts, natives: NativeRegistry) -> Self {
        Interpreter {
            ast: parts.ast,
            heap: parts.heap,
            stack: parts.stack,
            global_scope: parts.global_scope,
            protos: parts.protos,
            last_value: parts.last_value,
            natives,
            stack_limit: parts.stack_limit,
            paused: false,
            pending_call: false,
            uncaught: None,
            regex_cache: HashMap::new(),
            log_buffer: Vec::new(),
            checkpoint_requested: false,
            shutdown_requested: None,
        }
    }

    /// The configured stack-depth limit.
    pub fn stack_limit(&self) -> usize {
        self.stack_limit
    }

    /// Sets the stack-depth limit.
    pub fn set_stack_limit(&mut self, limit: usize) {
        self.stack_limit = limit.max(16);
    }

    // ---- stepping contract -------------------------------------------------

    /// True when only the root frame remains and it has run out of
    /// statements.
    pub fn done(&self) -> bool {
        if self.stack.len() != 1 {
            return false;
        }
        let frame = &self.stack[0];
        match (&frame.state, self.ast.node(frame.node)) {
            (FrameState::Program { index }, Node::Program { body }) => *index >= body.len(),
            _ => false,
        }
    }

    /// Advances execution by one small unit.
    pub fn step(&mut self) -> Result<StepResult, FatalError> {
        if self.done() {
            return Ok(StepResult::Done);
        }
        step::dispatch(self)?;
        if let Some(v) = self.uncaught.take() {
            return Ok(StepResult::Uncaught(v));
        }
        Ok(if self.done() {
            StepResult::Done
        } else {
            StepResult::More
        })
    }

    /// Steps until the root completes or the pause flag is observed.
    pub fn run(&mut self) -> Result<RunOutcome, FatalError> {
        loop {
            if self.paused {
                return Ok(RunOutcome::Paused);
            }
            match self.step()? {
                StepResult::More => {}
                StepResult::Done => return Ok(RunOutcome::Done),
                StepResult::Uncaught(v) => return Ok(RunOutcome::Uncaught(v)),
            }
        }
    }

    /// Steps at most `max_steps` times; `None` means the budget ran out
    /// with work remaining. Lets a supervisor interleave timers and signal
    /// checks with execution.
    pub fn run_slice(&mut self, max_steps: usize) -> Result<Option<RunOutcome>, FatalError> {
        for _ in 0..max_steps {
            if self.paused {
                return Ok(Some(RunOutcome::Paused));
            }
            match self.step()? {
                StepResult::More => {}
                StepResult::Done => return Ok(Some(RunOutcome::Done)),
                StepResult::Uncaught(v) => return Ok(Some(RunOutcome::Uncaught(v))),
            }
        }
        Ok(None)
    }

    /// Sets the pause flag; observed before the next step.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Clears the pause flag.
    pub fn resume(&mut self) {
        self.paused = false;
    }

    /// Whether the pause flag is set.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Whether an async native call is waiting for its value.
    pub fn has_pending_call(&self) -> bool {
        self.pending_call
    }

    /// Completes the pending async native call with `value` and unpauses.
    pub fn resolve_pending(&mut self, value: Value) {
        if !self.pending_call {
            return;
        }
        if let Some(frame) = self.stack.last_mut() {
            frame.value = value;
        }
        self.pending_call = false;
        self.paused = false;
    }

    pub(crate) fn begin_pending_call(&mut self) {
        self.pending_call = true;
        self.paused = true;
    }

    /// The completion value: the last expression-statement value.
    pub fn value(&self) -> &Value {
        &self.last_value
    }

    /// Appends top-level statements to the root program, re-opening it.
    ///
    /// Malformed source propagates to the host; nothing is appended then.
    pub fn append_code(&mut self, source: &str) -> Result<(), ParseError> {
        let program = parser::parse_program(&mut self.ast, source)?;
        let new_body = match self.ast.node(program) {
            Node::Program { body } => body.clone(),
            _ => Vec::new(),
        };
        for id in &new_body {
            self.populate_scope(*id, self.global_scope);
        }
        let root_node = self.stack[0].node;
        if let Node::Program { body } = self.ast.node_mut(root_node) {
            body.extend(new_body);
        }
        Ok(())
    }

    /// Parses a program fragment and pushes it as a new Program frame.
    ///
    /// Startup-time variant used by the supervisor: frames execute in LIFO
    /// order, so callers push sources in reverse of the order they should
    /// run in.
    pub fn create_thread_for_src(&mut self, source: &str) -> Result<(), ParseError> {
        let program = parser::parse_program(&mut self.ast, source)?;
        self.populate_scope(program, self.global_scope);
        self.stack.push(Frame::new(
            program,
            self.global_scope,
            Value::Undefined,
            FrameState::Program { index: 0 },
        ));
        Ok(())
    }

    /// Dumps the serializable state.
    pub fn parts(&self) -> InterpreterParts {
        InterpreterParts {
            ast: self.ast.clone(),
            heap: self.heap.clone(),
            stack: self.stack.clone(),
            global_scope: self.global_scope,
            protos: self.protos.clone(),
            last_value: self.last_value.clone(),
            stack_limit: self.stack_limit,
        }
    }

    // ---- host-request surface ---------------------------------------------

    /// Buffers a log line for the host to drain.
    pub fn log(&mut self, line: String) {
        self.log_buffer.push(line);
    }

    /// Takes all buffered log lines.
    pub fn drain_log(&mut self) -> Vec<String> {
        std::mem::take(&mut self.log_buffer)
    }

    /// Requests a checkpoint; the supervisor observes this between steps.
    pub fn request_checkpoint(&mut self) {
        self.checkpoint_requested = true;
    }

    /// Takes the checkpoint request flag.
    pub fn take_checkpoint_request(&mut self) -> bool {
        std::mem::take(&mut self.checkpoint_requested)
    }

    /// Requests an orderly shutdown with an exit code.
    pub fn request_shutdown(&mut self, code: i32) {
        self.shutdown_requested = Some(code);
    }

    /// Takes the shutdown request.
    pub fn take_shutdown_request(&mut self) -> Option<i32> {
        self.shutdown_requested.take()
    }

    // ---- errors ------------------------------------------------------------

    /// Creates a language error object of the given kind.
    pub fn make_error(&mut self, kind: ErrorKind, message: &str) -> ObjectId {
        let id = self.heap.alloc(Object::with_data(
            Some(self.protos.error_proto(kind)),
            ObjectData::Error { kind },
        ));
        if !message.is_empty() {
            let object = self.heap.object_mut(id);
            object
                .properties
                .insert("message".to_string(), Value::String(message.to_string()));
            object.non_enumerable.insert("message".to_string());
        }
        id
    }

    /// Creates and wraps a language error for throwing.
    pub fn throw_error(&mut self, kind: ErrorKind, message: &str) -> Thrown {
        Thrown(Value::Object(self.make_error(kind, message)))
    }

    // ---- object construction ----------------------------------------------

    /// Allocates a plain object with Object.prototype.
    pub fn create_plain_object(&mut self) -> ObjectId {
        self.heap.alloc(Object::plain(Some(self.protos.object)))
    }

    /// Allocates an array of the given length.
    pub fn create_array(&mut self, length: u32) -> ObjectId {
        self.heap.alloc(Object::with_data(
            Some(self.protos.array),
            ObjectData::Array { length },
        ))
    }

    /// Allocates an array populated from values.
    pub fn create_array_from(&mut self, values: &[Value]) -> ObjectId {
        let id = self.create_array(values.len() as u32);
        let object = self.heap.object_mut(id);
        for (i, v) in values.iter().enumerate() {
            object.properties.insert(i.to_string(), v.clone());
        }
        id
    }

    /// Allocates a regex object with a zeroed lastIndex.
    pub fn create_regex(&mut self, pattern: &str, flags: &str) -> ObjectId {
        let id = self.heap.alloc(Object::with_data(
            Some(self.protos.regexp),
            ObjectData::Regex {
                pattern: pattern.to_string(),
                flags: flags.to_string(),
            },
        ));
        let object = self.heap.object_mut(id);
        object
            .properties
            .insert("lastIndex".to_string(), Value::Number(0.0));
        object.non_enumerable.insert("lastIndex".to_string());
        id
    }

    /// Creates a closure over `scope` for a `Function` node, with its
    /// `length` and `prototype` properties.
    pub fn create_function(&mut self, node: NodeId, scope: ScopeId) -> ObjectId {
        let arity = match self.ast.node(node) {
            Node::Function { params, .. } => params.len(),
            _ => 0,
        };
        let func = self.heap.alloc(Object::with_data(
            Some(self.protos.function),
            ObjectData::Function(FunctionData::Interpreted { node, scope }),
        ));
        let proto_obj = self.create_plain_object();
        {
            let object = self.heap.object_mut(proto_obj);
            object
                .properties
                .insert("constructor".to_string(), Value::Object(func));
            object.non_enumerable.insert("constructor".to_string());
        }
        let object = self.heap.object_mut(func);
        object
            .properties
            .insert("length".to_string(), Value::Number(arity as f64));
        object.non_writable.insert("length".to_string());
        object.non_enumerable.insert("length".to_string());
        object.non_configurable.insert("length".to_string());
        object
            .properties
            .insert("prototype".to_string(), Value::Object(proto_obj));
        object.non_enumerable.insert("prototype".to_string());
        func
    }

    /// Creates a native function object for a registered implementation.
    pub fn create_native_function(&mut self, tag: NativeTag, arity: u8, is_async: bool) -> ObjectId {
        let data = if is_async {
            FunctionData::AsyncNative { tag, arity }
        } else {
            FunctionData::Native { tag, arity }
        };
        let func = self.heap.alloc(Object::with_data(
            Some(self.protos.function),
            ObjectData::Function(data),
        ));
        let object = self.heap.object_mut(func);
        object
            .properties
            .insert("length".to_string(), Value::Number(arity as f64));
        object.non_writable.insert("length".to_string());
        object.non_enumerable.insert("length".to_string());
        object.non_configurable.insert("length".to_string());
        func
    }

    // ---- properties --------------------------------------------------------

    fn lookup_on_chain(&self, start: ObjectId, key: &str) -> Option<Value> {
        let mut current = Some(start);
        while let Some(id) = current {
            let object = self.heap.object(id);
            if key == "length" {
                if let Some(length) = object.array_length() {
                    return Some(Value::Number(length as f64));
                }
            }
            if let Some(v) = object.properties.get(key) {
                return Some(v.clone());
            }
            current = object.proto;
        }
        None
    }

    /// Property read, walking the prototype chain. Array `length` and
    /// string `length`/character indices are computed.
    pub fn get_property(&mut self, base: &Value, key: &str) -> Result<Value, Thrown> {
        match base {
            Value::Undefined | Value::Null => Err(self.throw_error(
                ErrorKind::TypeError,
                &format!("Cannot read property '{}' of {}", key, base),
            )),
            Value::String(s) => {
                if key == "length" {
                    return Ok(Value::Number(s.chars().count() as f64));
                }
                if let Some(i) = array_index(key) {
                    return Ok(match s.chars().nth(i as usize) {
                        Some(c) => Value::String(c.to_string()),
                        None => Value::Undefined,
                    });
                }
                Ok(self
                    .lookup_on_chain(self.protos.string, key)
                    .unwrap_or(Value::Undefined))
            }
            Value::Number(_) => Ok(self
                .lookup_on_chain(self.protos.number, key)
                .unwrap_or(Value::Undefined)),
            Value::Boolean(_) => Ok(self
                .lookup_on_chain(self.protos.boolean, key)
                .unwrap_or(Value::Undefined)),
            Value::Object(id) => Ok(self
                .lookup_on_chain(*id, key)
                .unwrap_or(Value::Undefined)),
        }
    }

    /// Property existence test over the prototype chain; primitives fail
    /// with TypeError (`in` requires an object).
    pub fn has_property(&mut self, base: &Value, key: &str) -> Result<bool, Thrown> {
        match base {
            Value::Object(id) => {
                let mut current = Some(*id);
                while let Some(oid) = current {
                    if self.heap.has_own(oid, key) {
                        return Ok(true);
                    }
                    current = self.heap.object(oid).proto;
                }
                Ok(false)
            }
            _ => Err(self.throw_error(
                ErrorKind::TypeError,
                "Cannot use 'in' operator on a non-object",
            )),
        }
    }

    /// Property write with the data-model checks: non-writable and
    /// non-extensible violations are TypeErrors, array length maintains its
    /// invariant, strings reject index and length writes.
    pub fn set_property(&mut self, base: &Value, key: &str, value: Value) -> Result<(), Thrown> {
        let id = match base {
            Value::Undefined | Value::Null => {
                return Err(self.throw_error(
                    ErrorKind::TypeError,
                    &format!("Cannot set property '{}' of {}", key, base),
                ))
            }
            Value::String(_) => {
                if key == "length" || array_index(key).is_some() {
                    return Err(self.throw_error(
                        ErrorKind::TypeError,
                        "Cannot assign to string index or length",
                    ));
                }
                return Ok(()); // silently ignored on primitives
            }
            Value::Number(_) | Value::Boolean(_) => return Ok(()),
            Value::Object(id) => *id,
        };

        if key == "length" {
            if let Some(old_length) = self.heap.object(id).array_length() {
                let requested = convert::to_number_value(&self.heap, &value);
                let new_length = convert::to_uint32(requested);
                if new_length as f64 != requested {
                    return Err(self.throw_error(ErrorKind::RangeError, "Invalid array length"));
                }
                if new_length < old_length {
                    let doomed: Vec<String> = self
                        .heap
                        .object(id)
                        .properties
                        .keys()
                        .filter(|k| matches!(array_index(k), Some(i) if i >= new_length))
                        .cloned()
                        .collect();
                    let object = self.heap.object_mut(id);
                    for k in doomed {
                        object.properties.shift_remove(&k);
                        object.non_writable.remove(&k);
                        object.non_enumerable.remove(&k);
                        object.non_configurable.remove(&k);
                    }
                }
                self.heap.object_mut(id).data = ObjectData::Array { length: new_length };
                return Ok(());
            }
        }

        let object = self.heap.object(id);
        if object.non_writable.contains(key) {
            return Err(self.throw_error(
                ErrorKind::TypeError,
                &format!("Cannot assign to read only property '{}'", key),
            ));
        }
        if !object.properties.contains_key(key) && !object.extensible {
            return Err(self.throw_error(
                ErrorKind::TypeError,
                &format!("Cannot add property '{}', object is not extensible", key),
            ));
        }
        let object = self.heap.object_mut(id);
        object.properties.insert(key.to_string(), value);
        if let ObjectData::Array { length } = &mut object.data {
            if let Some(i) = array_index(key) {
                if i >= *length {
                    *length = i + 1;
                }
            }
        }
        Ok(())
    }

    /// Install-time property definition with explicit attributes.
    ///
    /// Redefining a non-configurable key with different attributes is a
    /// TypeError, per the descriptor rule of the data model.
    pub fn define_property(
        &mut self,
        id: ObjectId,
        key: &str,
        value: Value,
        flags: PropFlags,
    ) -> Result<(), Thrown> {
        let object = self.heap.object(id);
        if object.non_configurable.contains(key) {
            let same = !flags.configurable
                && object.non_writable.contains(key) != flags.writable
                && object.non_enumerable.contains(key) != flags.enumerable;
            if !same {
                return Err(self.throw_error(
                    ErrorKind::TypeError,
                    &format!("Cannot redefine property '{}'", key),
                ));
            }
        }
        let object = self.heap.object_mut(id);
        object.properties.insert(key.to_string(), value);
        let apply = |set: &mut std::collections::BTreeSet<String>, on: bool| {
            if on {
                set.insert(key.to_string());
            } else {
                set.remove(key);
            }
        };
        apply(&mut object.non_writable, !flags.writable);
        apply(&mut object.non_enumerable, !flags.enumerable);
        apply(&mut object.non_configurable, !flags.configurable);
        if let ObjectData::Array { length } = &mut object.data {
            if let Some(i) = array_index(key) {
                if i >= *length {
                    *length = i + 1;
                }
            }
        }
        Ok(())
    }

    /// Property deletion. Refuses for non-writable and non-configurable
    /// keys, for array `length`, and on primitives.
    pub fn delete_property(&mut self, base: &Value, key: &str) -> Result<bool, Thrown> {
        let id = match base {
            Value::Undefined | Value::Null => {
                return Err(self.throw_error(
                    ErrorKind::TypeError,
                    &format!("Cannot delete property '{}' of {}", key, base),
                ))
            }
            Value::Object(id) => *id,
            _ => return Ok(false),
        };
        let object = self.heap.object(id);
        if key == "length" && object.array_length().is_some() {
            return Ok(false);
        }
        if object.non_writable.contains(key) || object.non_configurable.contains(key) {
            return Ok(false);
        }
        let object = self.heap.object_mut(id);
        object.properties.shift_remove(key);
        object.non_writable.remove(key);
        object.non_enumerable.remove(key);
        object.non_configurable.remove(key);
        Ok(true)
    }

    /// Marks an object non-extensible.
    pub fn prevent_extensions(&mut self, id: ObjectId) {
        self.heap.object_mut(id).extensible = false;
    }

    // ---- scopes ------------------------------------------------------------

    /// Resolves a name through the scope chain; ReferenceError when absent.
    pub fn lookup_name(&mut self, scope: ScopeId, name: &str) -> Result<Value, Thrown> {
        match self.lookup_name_opt(scope, name) {
            Some(v) => Ok(v),
            None => Err(self.throw_error(
                ErrorKind::ReferenceError,
                &format!("{} is not defined", name),
            )),
        }
    }

    /// Resolves a name, returning `None` instead of an error; the typeof
    /// path.
    pub fn lookup_name_opt(&self, scope: ScopeId, name: &str) -> Option<Value> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let s = self.heap.scope(id);
            if let Some(v) = s.vars.get(name) {
                return Some(v.clone());
            }
            current = s.parent;
        }
        None
    }

    /// Assigns through the scope chain. Read-only bindings silently keep
    /// their value; an unresolved name becomes a global binding.
    pub fn assign_name(&mut self, scope: ScopeId, name: &str, value: Value) {
        let mut current = Some(scope);
        while let Some(id) = current {
            let s = self.heap.scope(id);
            if s.vars.contains_key(name) {
                if !s.read_only.contains(name) {
                    self.heap.scope_mut(id).force(name, value);
                }
                return;
            }
            current = s.parent;
        }
        self.heap.scope_mut(self.global_scope).force(name, value);
    }

    /// `delete` on an identifier: read-only (builtin) bindings refuse;
    /// user bindings are removed; unresolved names succeed vacuously.
    pub fn delete_name(&mut self, scope: ScopeId, name: &str) -> bool {
        let mut current = Some(scope);
        while let Some(id) = current {
            let s = self.heap.scope(id);
            if s.vars.contains_key(name) {
                if s.read_only.contains(name) {
                    return false;
                }
                self.heap.scope_mut(id).vars.shift_remove(name);
                return true;
            }
            current = s.parent;
        }
        true
    }

    // ---- references --------------------------------------------------------

    /// Reads the value behind a reference.
    pub fn get_reference(&mut self, scope: ScopeId, reference: &Reference) -> Result<Value, Thrown> {
        match reference {
            Reference::Name(name) => self.lookup_name(scope, name),
            Reference::Member { base, key } => {
                let base = base.clone();
                self.get_property(&base, key)
            }
        }
    }

    /// Writes through a reference.
    pub fn put_reference(
        &mut self,
        scope: ScopeId,
        reference: &Reference,
        value: Value,
    ) -> Result<(), Thrown> {
        match reference {
            Reference::Name(name) => {
                self.assign_name(scope, name, value);
                Ok(())
            }
            Reference::Member { base, key } => {
                let base = base.clone();
                self.set_property(&base, key, value)
            }
        }
    }

    // ---- scope population --------------------------------------------------

    /// The hoisting pre-pass: declares every `var` (as undefined) and every
    /// function declaration (bound to its closure) in `scope`, without
    /// descending into nested function bodies or expression statements.
    pub fn populate_scope(&mut self, root: NodeId, scope: ScopeId) {
        let mut queue = vec![root];
        let mut next = 0;
        while next < queue.len() {
            let id = queue[next];
            next += 1;
            match self.ast.node(id).clone() {
                Node::Program { body } | Node::BlockStatement { body } => queue.extend(body),
                Node::VariableDeclaration { declarations } => {
                    for d in &declarations {
                        self.heap
                            .scope_mut(scope)
                            .declare(&d.name, Value::Undefined, false);
                    }
                }
                Node::FunctionDeclaration { function } => {
                    if let Node::Function {
                        name: Some(name), ..
                    } = self.ast.node(function).clone()
                    {
                        let func = self.create_function(function, scope);
                        self.heap.scope_mut(scope).force(&name, Value::Object(func));
                    }
                }
                Node::IfStatement {
                    consequent,
                    alternate,
                    ..
                } => {
                    queue.push(consequent);
                    queue.extend(alternate);
                }
                Node::LabeledStatement { body, .. }
                | Node::WhileStatement { body, .. }
                | Node::DoWhileStatement { body, .. }
                | Node::WithStatement { body, .. } => queue.push(body),
                Node::ForStatement { init, body, .. } => {
                    queue.extend(init);
                    queue.push(body);
                }
                Node::ForInStatement { left, body, .. } => {
                    queue.push(left);
                    queue.push(body);
                }
                Node::TryStatement {
                    block,
                    handler,
                    finalizer,
                } => {
                    queue.push(block);
                    if let Some(h) = &handler {
                        queue.push(h.body);
                    }
                    queue.extend(finalizer);
                }
                Node::SwitchStatement { cases, .. } => {
                    for case in &cases {
                        queue.extend(case.consequent.iter().copied());
                    }
                }
                _ => {}
            }
        }
    }

    // ---- unwinding ---------------------------------------------------------

    /// Unwinds the stack with an abrupt completion, honoring try frames,
    /// loop/switch targets and call boundaries.
    pub(crate) fn unwind(&mut self, completion: Completion) -> Result<(), FatalError> {
        loop {
            let top = match self.stack.len().checked_sub(1) {
                Some(i) => i,
                None => {
                    return Err(FatalError::Internal(
                        "unwind emptied the execution stack".to_string(),
                    ))
                }
            };
            let is_root = top == 0;
            let labels = self.stack[top].labels.clone();
            let label_matches = |label: &Option<String>| match label {
                None => true,
                Some(l) => labels.contains(l),
            };

            // Try frames intercept everything that still has handler or
            // finalizer work to do; a completion out of the finalizer itself
            // replaces any pending one and keeps travelling.
            if let FrameState::Try { phase, .. } = &self.stack[top].state {
                let phase = *phase;
                let (has_handler, has_finalizer) = match self.ast.node(self.stack[top].node) {
                    Node::TryStatement {
                        handler, finalizer, ..
                    } => (handler.is_some(), finalizer.is_some()),
                    _ => (false, false),
                };
                if phase == TryPhase::Block
                    && has_handler
                    && matches!(completion, Completion::Throw(_))
                {
                    self.stack[top].state = FrameState::Try {
                        phase: TryPhase::Handler,
                        entered: false,
                        pending: Some(completion),
                    };
                    return Ok(());
                }
                if phase != TryPhase::Finalizer && has_finalizer {
                    self.stack[top].state = FrameState::Try {
                        phase: TryPhase::Finalizer,
                        entered: false,
                        pending: Some(completion),
                    };
                    return Ok(());
                }
                self.stack.pop();
                continue;
            }

            match &self.stack[top].state {
                FrameState::Call { .. } => match completion {
                    Completion::Return(v) => {
                        self.stack[top].value = v;
                        return Ok(());
                    }
                    Completion::Throw(_) => {
                        self.stack.pop();
                        continue;
                    }
                    Completion::Break(_) | Completion::Continue(_) => {
                        return Err(FatalError::Syntax(
                            "illegal break or continue across a call boundary".to_string(),
                        ))
                    }
                },
                FrameState::While { .. }
                | FrameState::DoWhile { .. }
                | FrameState::For { .. }
                | FrameState::ForIn { .. } => {
                    match &completion {
                        Completion::Break(label) if label_matches(label) => {
                            self.stack.pop();
                            return Ok(());
                        }
                        Completion::Continue(label) if label_matches(label) => {
                            self.reset_loop_for_continue(top);
                            return Ok(());
                        }
                        _ => {
                            self.stack.pop();
                            continue;
                        }
                    }
                }
                FrameState::Switch { .. } => match &completion {
                    Completion::Break(label) if label_matches(label) => {
                        self.stack.pop();
                        return Ok(());
                    }
                    _ => {
                        self.stack.pop();
                        continue;
                    }
                },
                FrameState::Program { .. } if is_root => match completion {
                    Completion::Throw(v) => {
                        // Uncaught: skip the rest of the root program but
                        // keep the frame so appended code can run later.
                        let root_node = self.stack[0].node;
                        let len = match self.ast.node(root_node) {
                            Node::Program { body } => body.len(),
                            _ => 0,
                        };
                        self.stack[0].state = FrameState::Program { index: len };
                        self.uncaught = Some(v);
                        return Ok(());
                    }
                    Completion::Return(_) => {
                        return Err(FatalError::Syntax(
                            "return outside a function".to_string(),
                        ))
                    }
                    Completion::Break(_) | Completion::Continue(_) => {
                        return Err(FatalError::Syntax(
                            "illegal break or continue".to_string(),
                        ))
                    }
                },
                FrameState::Program { .. } | FrameState::EvalProgram { .. } => {
                    // Startup-thread and eval program frames intercept
                    // nothing themselves.
                    match completion {
                        Completion::Throw(_) | Completion::Return(_) => {
                            self.stack.pop();
                            continue;
                        }
                        Completion::Break(_) | Completion::Continue(_) => {
                            return Err(FatalError::Syntax(
                                "illegal break or continue".to_string(),
                            ))
                        }
                    }
                }
                _ => {
                    // A labeled plain statement is a valid labeled-break
                    // target.
                    if let Completion::Break(Some(label)) = &completion {
                        if labels.contains(label) {
                            self.stack.pop();
                            return Ok(());
                        }
                    }
                    self.stack.pop();
                    continue;
                }
            }
        }
    }

    fn reset_loop_for_continue(&mut self, index: usize) {
        use crate::frame::{ForInPhase, ForPhase};
        let state = &mut self.stack[index].state;
        match state {
            FrameState::While { done_test } => *done_test = false,
            FrameState::DoWhile {
                done_body,
                done_test,
            } => {
                *done_body = true;
                *done_test = false;
            }
            FrameState::For { phase, entered } => {
                *phase = ForPhase::Update;
                *entered = false;
            }
            FrameState::ForIn { phase, .. } => *phase = ForInPhase::Next,
            _ => {}
        }
    }

    // ---- regex cache -------------------------------------------------------

    /// Compiles (or fetches) the host regex for a pattern/flags pair.
    ///
    /// The cache is transient; snapshots only carry the pattern text.
    pub fn compiled_regex(&mut self, pattern: &str, flags: &str) -> Result<regex::Regex, Thrown> {
        let key = (pattern.to_string(), flags.to_string());
        if let Some(re) = self.regex_cache.get(&key) {
            return Ok(re.clone());
        }
        let mut translated = String::new();
        if flags.contains('i') {
            translated.push_str("(?i)");
        }
        if flags.contains('m') {
            translated.push_str("(?m)");
        }
        translated.push_str(pattern);
        match regex::Regex::new(&translated) {
            Ok(re) => {
                self.regex_cache.insert(key, re.clone());
                Ok(re)
            }
            Err(e) => Err(self.throw_error(
                ErrorKind::SyntaxError,
                &format!("Invalid regular expression: {}", e),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_tags_are_stable() {
        fn noop(_: &mut Interpreter, _: Value, _: &[Value]) -> Result<Value, Thrown> {
            Ok(Value::Undefined)
        }
        let mut registry = NativeRegistry::new();
        let a = registry.register("a", NativeImpl::Sync(noop));
        let b = registry.register("b", NativeImpl::Sync(noop));
        assert_eq!(a, NativeTag(0));
        assert_eq!(b, NativeTag(1));
        // Re-registration returns the original tag.
        assert_eq!(registry.register("a", NativeImpl::Sync(noop)), a);
        assert_eq!(registry.names(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_scope_assign_creates_global() {
        let mut interp = Interpreter::new();
        let child = interp
            .heap
            .alloc_scope(Scope::new(Some(interp.global_scope)));
        interp.assign_name(child, "x", Value::Number(5.0));
        assert_eq!(
            interp.lookup_name_opt(interp.global_scope, "x"),
            Some(Value::Number(5.0))
        );
    }

    #[test]
    fn test_delete_name_refuses_read_only() {
        let mut interp = Interpreter::new();
        interp
            .heap
            .scope_mut(interp.global_scope)
            .declare("undefined", Value::Undefined, true);
        assert!(!interp.delete_name(interp.global_scope, "undefined"));
        interp
            .heap
            .scope_mut(interp.global_scope)
            .declare("mine", Value::Null, false);
        assert!(interp.delete_name(interp.global_scope, "mine"));
        assert!(interp.delete_name(interp.global_scope, "missing"));
    }

    #[test]
    fn test_array_length_shrink_deletes_indices() {
        let mut interp = Interpreter::new();
        let id = interp.create_array_from(&[
            Value::Number(1.0),
            Value::Number(2.0),
            Value::Number(3.0),
        ]);
        let base = Value::Object(id);
        interp
            .set_property(&base, "length", Value::Number(1.0))
            .unwrap();
        assert_eq!(interp.heap.object(id).array_length(), Some(1));
        assert!(interp.heap.own_property(id, "0").is_some());
        assert!(interp.heap.own_property(id, "1").is_none());
        assert!(interp.heap.own_property(id, "2").is_none());
    }

    #[test]
    fn test_array_index_write_grows_length() {
        let mut interp = Interpreter::new();
        let id = interp.create_array(0);
        let base = Value::Object(id);
        interp
            .set_property(&base, "5", Value::String("x".to_string()))
            .unwrap();
        assert_eq!(interp.heap.object(id).array_length(), Some(6));
    }

    #[test]
    fn test_string_property_reads() {
        let mut interp = Interpreter::new();
        let s = Value::String("abc".to_string());
        assert_eq!(
            interp.get_property(&s, "length").unwrap(),
            Value::Number(3.0)
        );
        assert_eq!(
            interp.get_property(&s, "1").unwrap(),
            Value::String("b".to_string())
        );
        assert_eq!(interp.get_property(&s, "9").unwrap(), Value::Undefined);
        assert!(interp
            .set_property(&s, "0", Value::String("z".to_string()))
            .is_err());
    }

    #[test]
    fn test_get_property_on_nullish_throws() {
        let mut interp = Interpreter::new();
        assert!(interp.get_property(&Value::Undefined, "x").is_err());
        assert!(interp.get_property(&Value::Null, "x").is_err());
    }

    #[test]
    fn test_non_writable_set_throws() {
        let mut interp = Interpreter::new();
        let id = interp.create_plain_object();
        interp
            .define_property(id, "k", Value::Number(1.0), PropFlags::frozen())
            .unwrap();
        let base = Value::Object(id);
        assert!(interp.set_property(&base, "k", Value::Number(2.0)).is_err());
        assert!(!interp.delete_property(&base, "k").unwrap());
    }

    #[test]
    fn test_prevent_extensions_rejects_new_keys() {
        let mut interp = Interpreter::new();
        let id = interp.create_plain_object();
        interp.prevent_extensions(id);
        let base = Value::Object(id);
        assert!(interp
            .set_property(&base, "fresh", Value::Null)
            .is_err());
    }
}
