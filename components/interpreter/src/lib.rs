//! Step-granular tree-walking interpreter for the City VM.
//!
//! The interpreter advances an explicit stack of execution frames, one
//! small unit per [`Interpreter::step`] call. Every piece of runtime state
//! - heap objects, lexical scopes, the frame stack with its mid-expression
//! partial values - is plain serializable data, which is what allows the
//! snapshot subsystem to checkpoint a running program between any two steps
//! and resume it in another process.
//!
//! Host bindings (global constructors, prototype methods, the `cc`
//! namespace) live in the `builtins` crate; this crate only provides the
//! machinery they register into.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod convert;
mod frame;
mod heap;
mod interp;
mod scope;
mod step;

pub use convert::{
    compare, date_to_string, loose_eq, strict_eq, to_int32, to_number_value, to_string_value,
    to_uint32, type_of_value,
};
pub use frame::{Completion, ForInPhase, ForPhase, Frame, FrameState, Reference, TryPhase};
pub use heap::{array_index, FunctionData, Heap, NativeTag, Object, ObjectData};
pub use interp::{
    AsyncNativeFn, Interpreter, InterpreterParts, NativeFn, NativeImpl, NativeRegistry,
    PropFlags, Protos, RunOutcome, StepResult, Thrown,
};
pub use scope::Scope;
