//! Execution stack frames.
//!
//! A frame is the in-flight evaluation of one syntax-tree node: the node id,
//! the scope and receiver it runs under, and a per-node-kind state variant
//! holding the partial-completion flags and accumulated values needed to
//! resume after any step boundary. Everything here is plain serializable
//! data; that is what makes mid-expression snapshots possible.

use core_types::{NodeId, ObjectId, ScopeId, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// An evaluated reference: the target of an assignment, update, delete or
/// for-in binding, produced by evaluating an expression in "components"
/// mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Reference {
    /// A bare identifier, resolved against the scope chain at access time
    Name(String),
    /// A property of a base value
    Member {
        /// The base the property lives on
        base: Value,
        /// The property key
        key: String,
    },
}

/// An abrupt completion travelling down the stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Completion {
    /// `break`, with its optional label
    Break(Option<String>),
    /// `continue`, with its optional label
    Continue(Option<String>),
    /// `return`, carrying the returned value
    Return(Value),
    /// `throw`, carrying the thrown value
    Throw(Value),
}

/// Phase of a classic for-loop frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForPhase {
    /// Running the initializer
    Init,
    /// Evaluating the test
    Test,
    /// Running the body
    Body,
    /// Evaluating the update expression
    Update,
}

/// Phase of a for-in frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ForInPhase {
    /// Evaluating the enumerated object
    Object {
        /// The right-hand expression has been pushed
        pushed: bool,
    },
    /// Advancing to the next key
    Next,
    /// Evaluating a member-expression target for the pending key
    Target {
        /// The key about to be bound
        key: String,
    },
}

/// Phase of a try frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TryPhase {
    /// Running the protected block
    Block,
    /// Running the catch handler
    Handler,
    /// Running the finally block
    Finalizer,
}

/// Per-node-kind resumable state.
///
/// One variant per node kind that needs more than a push; the flags mirror
/// the order sub-steps complete in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FrameState {
    /// Nodes that complete in a single step (identifiers, literals, `this`,
    /// function expressions, empty/debugger/break/continue statements)
    Start,
    /// Top-level program
    Program {
        /// Next statement to run
        index: usize,
    },
    /// An eval fragment running in the caller's scope
    EvalProgram {
        /// Next statement to run
        index: usize,
    },
    /// An interpreted function body
    FunctionBody {
        /// Next statement to run
        index: usize,
    },
    /// Block statement
    Block {
        /// Next statement to run
        index: usize,
    },
    /// Expression statement
    ExprStmt {
        /// Expression pushed
        done: bool,
    },
    /// Variable declaration list
    VarDecl {
        /// Next declarator
        index: usize,
        /// An initializer is in flight
        waiting: bool,
    },
    /// If statement
    If {
        /// Test evaluated
        done_test: bool,
        /// Chosen branch pushed
        done_branch: bool,
    },
    /// Labeled statement
    Labeled {
        /// Body pushed
        done: bool,
    },
    /// While loop
    While {
        /// Test in flight; reset after each body run
        done_test: bool,
    },
    /// Do-while loop
    DoWhile {
        /// Body completed this iteration
        done_body: bool,
        /// Test in flight
        done_test: bool,
    },
    /// Classic for loop
    For {
        /// Current phase
        phase: ForPhase,
        /// The phase's child has been pushed
        entered: bool,
    },
    /// For-in loop
    ForIn {
        /// Current phase
        phase: ForInPhase,
        /// Object (or primitive) whose keys are being walked; moves up the
        /// prototype chain
        current: Option<Value>,
        /// Own-key snapshot of `current`
        keys: Vec<String>,
        /// Next position in `keys`
        index: usize,
        /// Keys already enumerated anywhere along the chain
        visited: BTreeSet<String>,
    },
    /// Switch statement
    Switch {
        /// Discriminant pushed
        done_disc: bool,
        /// Discriminant captured
        have_disc: bool,
        /// The discriminant value
        disc: Value,
        /// Case whose test is being considered
        case_index: usize,
        /// A test expression is in flight
        testing: bool,
        /// Case execution starts here once matched
        matched_case: Option<usize>,
        /// Next consequent statement within the running case
        exec_index: usize,
    },
    /// Try / catch / finally
    Try {
        /// Current phase
        phase: TryPhase,
        /// The phase's block has been pushed
        entered: bool,
        /// Completion to resume after the finalizer
        pending: Option<Completion>,
    },
    /// Throw statement
    Throw {
        /// Argument pushed
        done: bool,
    },
    /// Return statement
    Return {
        /// Argument pushed
        done: bool,
    },

    /// Binary operator
    Binary {
        /// Left operand evaluated
        done_left: bool,
        /// Right operand pushed
        done_right: bool,
        /// The left operand's value
        left: Value,
    },
    /// Short-circuit logical operator
    Logical {
        /// Left operand pushed
        done_left: bool,
        /// Right operand pushed
        done_right: bool,
    },
    /// Unary operator
    Unary {
        /// Operand pushed
        done: bool,
    },
    /// Prefix/postfix update
    Update {
        /// Target reference evaluated
        done_ref: bool,
        /// The target reference
        target: Option<Reference>,
    },
    /// Assignment
    Assign {
        /// Target reference evaluated
        done_left: bool,
        /// Right side pushed
        done_right: bool,
        /// The target reference
        target: Option<Reference>,
        /// Current value read through the reference (compound operators)
        current: Value,
    },
    /// Conditional (ternary) expression
    Conditional {
        /// Test evaluated
        done_test: bool,
        /// Chosen branch pushed
        done_branch: bool,
    },
    /// Comma expression
    Sequence {
        /// Next sub-expression
        index: usize,
    },
    /// Array literal
    ArrayLit {
        /// The array being filled
        object: Option<ObjectId>,
        /// Next element
        index: usize,
        /// An element expression is in flight
        waiting: bool,
    },
    /// Object literal
    ObjectLit {
        /// The object being filled
        object: Option<ObjectId>,
        /// Next property
        index: usize,
        /// A value expression is in flight
        waiting: bool,
    },
    /// Member access
    Member {
        /// Base evaluated
        done_object: bool,
        /// Computed key pushed
        done_property: bool,
        /// The base value
        object: Value,
    },
    /// Call or construction
    Call {
        /// Callee evaluated
        done_callee: bool,
        /// All arguments evaluated
        done_args: bool,
        /// The function has been dispatched
        done_exec: bool,
        /// The materialized function value
        func: Value,
        /// The receiver
        this_val: Value,
        /// Evaluated arguments
        args: Vec<Value>,
        /// Next argument index
        n: usize,
        /// An argument expression is in flight
        waiting_arg: bool,
        /// The object under construction, for `new`
        construct: Option<ObjectId>,
    },
}

/// One entry on the execution stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// The node being evaluated
    pub node: NodeId,
    /// The scope the node runs in
    pub scope: ScopeId,
    /// The receiver (`this`)
    pub this: Value,
    /// Labels attached by enclosing labeled statements
    pub labels: Vec<String>,
    /// When set, identifier and member evaluation yield a [`Reference`]
    /// instead of a value
    pub components: bool,
    /// Result slot written by completed children
    pub value: Value,
    /// Reference slot written by children evaluated in components mode
    pub reference: Option<Reference>,
    /// Resumable per-kind state
    pub state: FrameState,
}

impl Frame {
    /// Creates a frame with empty result slots.
    pub fn new(node: NodeId, scope: ScopeId, this: Value, state: FrameState) -> Self {
        Frame {
            node,
            scope,
            this,
            labels: Vec::new(),
            components: false,
            value: Value::Undefined,
            reference: None,
            state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_serde_round_trip() {
        let frame = Frame {
            node: NodeId(7),
            scope: ScopeId(0),
            this: Value::Undefined,
            labels: vec!["outer".to_string()],
            components: true,
            value: Value::Number(3.0),
            reference: Some(Reference::Member {
                base: Value::Object(ObjectId(2)),
                key: "x".to_string(),
            }),
            state: FrameState::Binary {
                done_left: true,
                done_right: false,
                left: Value::Number(1.0),
            },
        };
        let text = serde_json::to_string(&frame).unwrap();
        let back: Frame = serde_json::from_str(&text).unwrap();
        assert_eq!(frame, back);
    }

    #[test]
    fn test_completion_serde() {
        let c = Completion::Return(Value::String("done".to_string()));
        let text = serde_json::to_string(&c).unwrap();
        let back: Completion = serde_json::from_str(&text).unwrap();
        assert_eq!(c, back);
    }
}
