//! Core value and error types for the City VM.
//!
//! This crate provides the foundational types shared by every component of
//! the persistent interpreter:
//!
//! - [`Value`] - Tagged representation of language values
//! - [`ObjectId`] / [`ScopeId`] / [`NodeId`] - Dense arena indices
//! - [`ErrorKind`] - The catchable language error kinds
//! - [`FatalError`] - Host-level failures that user code cannot catch
//!
//! All state types are `serde`-serializable because the entire runtime is
//! periodically flattened into a snapshot file.
//!
//! # Examples
//!
//! ```
//! use core_types::Value;
//!
//! let num = Value::Number(42.0);
//! assert!(num.is_truthy());
//! assert_eq!(num.type_of(), "number");
//! assert_eq!(num.to_string(), "42");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod error;
mod value;

pub use error::{ErrorKind, FatalError};
pub use value::{jsnum, number_to_string, NodeId, ObjectId, ScopeId, Value};
