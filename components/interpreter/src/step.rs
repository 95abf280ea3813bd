//! Step dispatch: one handler per node kind.
//!
//! Each handler inspects the top frame's state and either pushes a child
//! frame, updates its own state, or pops itself and delivers its result to
//! the new top frame. No handler ever blocks or recurses into stepping, so
//! the whole computation is plain data between any two steps.

use core_types::{ErrorKind, FatalError, NodeId, Value};
use parser::{AssignOp, BinaryOp, Literal, LogicalOp, Node, UnaryOp, UpdateOp};
use std::collections::BTreeSet;

use crate::convert::{
    self, loose_eq, strict_eq, to_int32, to_number_value, to_string_value, to_uint32,
    type_of_value,
};
use crate::frame::{
    Completion, ForInPhase, ForPhase, Frame, FrameState, Reference, TryPhase,
};
use crate::heap::{FunctionData, Object, ObjectData};
use crate::interp::{Interpreter, NativeImpl, Thrown};
use crate::scope::Scope;

/// Converts a thrown language value into unwinding and leaves the handler.
macro_rules! throwing {
    ($interp:expr, $expr:expr) => {
        match $expr {
            Ok(v) => v,
            Err(Thrown(v)) => {
                $interp.unwind(Completion::Throw(v))?;
                return Ok(());
            }
        }
    };
}

/// The initial state for a freshly pushed frame.
fn initial_state(node: &Node) -> FrameState {
    match node {
        Node::Program { .. } => FrameState::Program { index: 0 },
        Node::ExpressionStatement { .. } => FrameState::ExprStmt { done: false },
        Node::VariableDeclaration { .. } => FrameState::VarDecl {
            index: 0,
            waiting: false,
        },
        Node::BlockStatement { .. } => FrameState::Block { index: 0 },
        Node::IfStatement { .. } => FrameState::If {
            done_test: false,
            done_branch: false,
        },
        Node::LabeledStatement { .. } => FrameState::Labeled { done: false },
        Node::WhileStatement { .. } => FrameState::While { done_test: false },
        Node::DoWhileStatement { .. } => FrameState::DoWhile {
            done_body: false,
            done_test: false,
        },
        Node::ForStatement { .. } => FrameState::For {
            phase: ForPhase::Init,
            entered: false,
        },
        Node::ForInStatement { .. } => FrameState::ForIn {
            phase: ForInPhase::Object { pushed: false },
            current: None,
            keys: Vec::new(),
            index: 0,
            visited: BTreeSet::new(),
        },
        Node::SwitchStatement { .. } => FrameState::Switch {
            done_disc: false,
            have_disc: false,
            disc: Value::Undefined,
            case_index: 0,
            testing: false,
            matched_case: None,
            exec_index: 0,
        },
        Node::TryStatement { .. } => FrameState::Try {
            phase: TryPhase::Block,
            entered: false,
            pending: None,
        },
        Node::ThrowStatement { .. } => FrameState::Throw { done: false },
        Node::ReturnStatement { .. } => FrameState::Return { done: false },
        Node::UnaryExpression { .. } => FrameState::Unary { done: false },
        Node::UpdateExpression { .. } => FrameState::Update {
            done_ref: false,
            target: None,
        },
        Node::BinaryExpression { .. } => FrameState::Binary {
            done_left: false,
            done_right: false,
            left: Value::Undefined,
        },
        Node::LogicalExpression { .. } => FrameState::Logical {
            done_left: false,
            done_right: false,
        },
        Node::AssignmentExpression { .. } => FrameState::Assign {
            done_left: false,
            done_right: false,
            target: None,
            current: Value::Undefined,
        },
        Node::ConditionalExpression { .. } => FrameState::Conditional {
            done_test: false,
            done_branch: false,
        },
        Node::SequenceExpression { .. } => FrameState::Sequence { index: 0 },
        Node::ArrayExpression { .. } => FrameState::ArrayLit {
            object: None,
            index: 0,
            waiting: false,
        },
        Node::ObjectExpression { .. } => FrameState::ObjectLit {
            object: None,
            index: 0,
            waiting: false,
        },
        Node::MemberExpression { .. } => FrameState::Member {
            done_object: false,
            done_property: false,
            object: Value::Undefined,
        },
        Node::CallExpression { .. } | Node::NewExpression { .. } => FrameState::Call {
            done_callee: false,
            done_args: false,
            done_exec: false,
            func: Value::Undefined,
            this_val: Value::Undefined,
            args: Vec::new(),
            n: 0,
            waiting_arg: false,
            construct: None,
        },
        _ => FrameState::Start,
    }
}

fn push_child(interp: &mut Interpreter, node: NodeId, components: bool) {
    let parent = interp.stack.last().expect("push_child with empty stack");
    let scope = parent.scope;
    let this = parent.this.clone();
    let state = initial_state(interp.ast.node(node));
    let mut frame = Frame::new(node, scope, this, state);
    frame.components = components;
    interp.stack.push(frame);
}

fn pop_value(interp: &mut Interpreter, value: Value) {
    interp.stack.pop();
    if let Some(parent) = interp.stack.last_mut() {
        parent.value = value;
    }
}

fn pop_ref(interp: &mut Interpreter, reference: Reference) {
    interp.stack.pop();
    if let Some(parent) = interp.stack.last_mut() {
        parent.reference = Some(reference);
    }
}

fn pop_silent(interp: &mut Interpreter) {
    interp.stack.pop();
}

/// Steps the top frame once.
pub(crate) fn dispatch(interp: &mut Interpreter) -> Result<(), FatalError> {
    let idx = interp.stack.len() - 1;
    let node_id = interp.stack[idx].node;
    let node = interp.ast.node(node_id).clone();
    match node {
        Node::Program { body } => step_program(interp, idx, &body),
        Node::ExpressionStatement { expression } => step_expr_stmt(interp, idx, expression),
        Node::VariableDeclaration { declarations } => {
            step_var_decl(interp, idx, &declarations)
        }
        Node::FunctionDeclaration { .. }
        | Node::EmptyStatement
        | Node::DebuggerStatement => {
            pop_silent(interp);
            Ok(())
        }
        Node::BlockStatement { body } => step_block(interp, idx, &body),
        Node::IfStatement {
            test,
            consequent,
            alternate,
        } => step_if(interp, idx, test, consequent, alternate),
        Node::LabeledStatement { label, body } => step_labeled(interp, idx, &label, body),
        Node::WhileStatement { test, body } => step_while(interp, idx, test, body),
        Node::DoWhileStatement { body, test } => step_do_while(interp, idx, body, test),
        Node::ForStatement {
            init,
            test,
            update,
            body,
        } => step_for(interp, idx, init, test, update, body),
        Node::ForInStatement { left, right, body } => {
            step_for_in(interp, idx, left, right, body)
        }
        Node::ContinueStatement { label } => interp.unwind(Completion::Continue(label)),
        Node::BreakStatement { label } => interp.unwind(Completion::Break(label)),
        Node::ReturnStatement { argument } => step_return(interp, idx, argument),
        Node::WithStatement { .. } => Err(FatalError::Syntax(
            "with statement is not supported".to_string(),
        )),
        Node::SwitchStatement {
            discriminant,
            cases,
        } => step_switch(interp, idx, discriminant, &cases),
        Node::ThrowStatement { argument } => step_throw(interp, idx, argument),
        Node::TryStatement {
            block,
            handler,
            finalizer,
        } => step_try(interp, idx, block, &handler, finalizer),
        Node::Identifier { name } => step_identifier(interp, idx, &name),
        Node::Literal { value } => step_literal(interp, &value),
        Node::ThisExpression => {
            let this = interp.stack[idx].this.clone();
            pop_value(interp, this);
            Ok(())
        }
        Node::ArrayExpression { elements } => step_array(interp, idx, &elements),
        Node::ObjectExpression { properties } => step_object(interp, idx, &properties),
        Node::Function { name, .. } => step_function(interp, idx, node_id, &name),
        Node::UnaryExpression { operator, argument } => {
            step_unary(interp, idx, operator, argument)
        }
        Node::UpdateExpression {
            operator,
            prefix,
            argument,
        } => step_update(interp, idx, operator, prefix, argument),
        Node::BinaryExpression {
            operator,
            left,
            right,
        } => step_binary(interp, idx, operator, left, right),
        Node::LogicalExpression {
            operator,
            left,
            right,
        } => step_logical(interp, idx, operator, left, right),
        Node::AssignmentExpression {
            operator,
            left,
            right,
        } => step_assign(interp, idx, operator, left, right),
        Node::ConditionalExpression {
            test,
            consequent,
            alternate,
        } => step_conditional(interp, idx, test, consequent, alternate),
        Node::CallExpression { callee, arguments } => {
            step_call(interp, idx, callee, &arguments, false)
        }
        Node::NewExpression { callee, arguments } => {
            step_call(interp, idx, callee, &arguments, true)
        }
        Node::MemberExpression {
            object,
            property,
            computed,
        } => step_member(interp, idx, object, property, computed),
        Node::SequenceExpression { expressions } => {
            step_sequence(interp, idx, &expressions)
        }
    }
}

fn step_program(
    interp: &mut Interpreter,
    idx: usize,
    body: &[NodeId],
) -> Result<(), FatalError> {
    // A Program node frame is either a root/thread program or an eval
    // fragment; the state distinguishes them.
    match interp.stack[idx].state.clone() {
        FrameState::Program { index } => {
            if index < body.len() {
                interp.stack[idx].state = FrameState::Program { index: index + 1 };
                push_child(interp, body[index], false);
            } else if idx > 0 {
                pop_silent(interp);
            }
            Ok(())
        }
        FrameState::EvalProgram { index } => {
            if index < body.len() {
                interp.stack[idx].state = FrameState::EvalProgram { index: index + 1 };
                push_child(interp, body[index], false);
            } else {
                let v = interp.last_value.clone();
                pop_value(interp, v);
            }
            Ok(())
        }
        other => Err(FatalError::Internal(format!(
            "program frame in foreign state {:?}",
            other
        ))),
    }
}

fn step_block(interp: &mut Interpreter, idx: usize, body: &[NodeId]) -> Result<(), FatalError> {
    let index = match interp.stack[idx].state {
        FrameState::Block { index } => index,
        _ => return Err(FatalError::Internal("block state mismatch".to_string())),
    };
    if index < body.len() {
        interp.stack[idx].state = FrameState::Block { index: index + 1 };
        push_child(interp, body[index], false);
    } else {
        pop_silent(interp);
    }
    Ok(())
}

fn step_expr_stmt(
    interp: &mut Interpreter,
    idx: usize,
    expression: NodeId,
) -> Result<(), FatalError> {
    let done = matches!(interp.stack[idx].state, FrameState::ExprStmt { done: true });
    if !done {
        interp.stack[idx].state = FrameState::ExprStmt { done: true };
        push_child(interp, expression, false);
    } else {
        interp.last_value = interp.stack[idx].value.clone();
        pop_silent(interp);
    }
    Ok(())
}

fn step_var_decl(
    interp: &mut Interpreter,
    idx: usize,
    declarations: &[parser::Declarator],
) -> Result<(), FatalError> {
    let (mut index, waiting) = match interp.stack[idx].state {
        FrameState::VarDecl { index, waiting } => (index, waiting),
        _ => return Err(FatalError::Internal("var state mismatch".to_string())),
    };
    if waiting {
        let value = interp.stack[idx].value.clone();
        let scope = interp.stack[idx].scope;
        interp.assign_name(scope, &declarations[index].name, value);
        index += 1;
    }
    while index < declarations.len() && declarations[index].init.is_none() {
        index += 1;
    }
    if index < declarations.len() {
        let init = declarations[index].init.expect("checked above");
        interp.stack[idx].state = FrameState::VarDecl {
            index,
            waiting: true,
        };
        push_child(interp, init, false);
    } else {
        pop_silent(interp);
    }
    Ok(())
}

fn step_if(
    interp: &mut Interpreter,
    idx: usize,
    test: NodeId,
    consequent: NodeId,
    alternate: Option<NodeId>,
) -> Result<(), FatalError> {
    let (done_test, done_branch) = match interp.stack[idx].state {
        FrameState::If {
            done_test,
            done_branch,
        } => (done_test, done_branch),
        _ => return Err(FatalError::Internal("if state mismatch".to_string())),
    };
    if !done_test {
        interp.stack[idx].state = FrameState::If {
            done_test: true,
            done_branch: false,
        };
        push_child(interp, test, false);
        return Ok(());
    }
    if !done_branch {
        interp.stack[idx].state = FrameState::If {
            done_test: true,
            done_branch: true,
        };
        if interp.stack[idx].value.is_truthy() {
            push_child(interp, consequent, false);
        } else if let Some(alternate) = alternate {
            push_child(interp, alternate, false);
        } else {
            pop_silent(interp);
        }
        return Ok(());
    }
    pop_silent(interp);
    Ok(())
}

fn step_labeled(
    interp: &mut Interpreter,
    idx: usize,
    label: &str,
    body: NodeId,
) -> Result<(), FatalError> {
    let done = matches!(interp.stack[idx].state, FrameState::Labeled { done: true });
    if !done {
        interp.stack[idx].state = FrameState::Labeled { done: true };
        let mut labels = interp.stack[idx].labels.clone();
        labels.push(label.to_string());
        push_child(interp, body, false);
        if let Some(child) = interp.stack.last_mut() {
            child.labels = labels;
        }
    } else {
        pop_silent(interp);
    }
    Ok(())
}

fn step_while(
    interp: &mut Interpreter,
    idx: usize,
    test: NodeId,
    body: NodeId,
) -> Result<(), FatalError> {
    let done_test = matches!(interp.stack[idx].state, FrameState::While { done_test: true });
    if !done_test {
        interp.stack[idx].state = FrameState::While { done_test: true };
        push_child(interp, test, false);
    } else if interp.stack[idx].value.is_truthy() {
        interp.stack[idx].state = FrameState::While { done_test: false };
        push_child(interp, body, false);
    } else {
        pop_silent(interp);
    }
    Ok(())
}

fn step_do_while(
    interp: &mut Interpreter,
    idx: usize,
    body: NodeId,
    test: NodeId,
) -> Result<(), FatalError> {
    let (done_body, done_test) = match interp.stack[idx].state {
        FrameState::DoWhile {
            done_body,
            done_test,
        } => (done_body, done_test),
        _ => return Err(FatalError::Internal("do-while state mismatch".to_string())),
    };
    if !done_body {
        interp.stack[idx].state = FrameState::DoWhile {
            done_body: true,
            done_test: false,
        };
        push_child(interp, body, false);
    } else if !done_test {
        interp.stack[idx].state = FrameState::DoWhile {
            done_body: true,
            done_test: true,
        };
        push_child(interp, test, false);
    } else if interp.stack[idx].value.is_truthy() {
        interp.stack[idx].state = FrameState::DoWhile {
            done_body: false,
            done_test: false,
        };
    } else {
        pop_silent(interp);
    }
    Ok(())
}

fn step_for(
    interp: &mut Interpreter,
    idx: usize,
    init: Option<NodeId>,
    test: Option<NodeId>,
    update: Option<NodeId>,
    body: NodeId,
) -> Result<(), FatalError> {
    let (phase, entered) = match interp.stack[idx].state {
        FrameState::For { phase, entered } => (phase, entered),
        _ => return Err(FatalError::Internal("for state mismatch".to_string())),
    };
    let set = |interp: &mut Interpreter, phase: ForPhase, entered: bool| {
        interp.stack[idx].state = FrameState::For { phase, entered };
    };
    match phase {
        ForPhase::Init => {
            if let Some(init) = init {
                if !entered {
                    set(interp, ForPhase::Init, true);
                    push_child(interp, init, false);
                    return Ok(());
                }
            }
            set(interp, ForPhase::Test, false);
        }
        ForPhase::Test => {
            if let Some(test) = test {
                if !entered {
                    set(interp, ForPhase::Test, true);
                    push_child(interp, test, false);
                    return Ok(());
                }
                if !interp.stack[idx].value.is_truthy() {
                    pop_silent(interp);
                    return Ok(());
                }
            }
            set(interp, ForPhase::Body, false);
        }
        ForPhase::Body => {
            if !entered {
                set(interp, ForPhase::Body, true);
                push_child(interp, body, false);
                return Ok(());
            }
            set(interp, ForPhase::Update, false);
        }
        ForPhase::Update => {
            if let Some(update) = update {
                if !entered {
                    set(interp, ForPhase::Update, true);
                    push_child(interp, update, false);
                    return Ok(());
                }
            }
            set(interp, ForPhase::Test, false);
        }
    }
    Ok(())
}

/// Enumerable own keys of a value, for for-in.
fn own_keys_of(interp: &Interpreter, value: &Value) -> Vec<String> {
    match value {
        Value::Object(id) => interp.heap.own_enumerable_keys(*id),
        Value::String(s) => (0..s.chars().count()).map(|i| i.to_string()).collect(),
        _ => Vec::new(),
    }
}

/// Whether the key still exists and is enumerable on the enumerated value.
fn still_enumerable(interp: &Interpreter, value: &Value, key: &str) -> bool {
    match value {
        Value::Object(id) => {
            let object = interp.heap.object(*id);
            object.properties.contains_key(key) && !object.non_enumerable.contains(key)
        }
        Value::String(s) => match key.parse::<usize>() {
            Ok(i) => i < s.chars().count(),
            Err(_) => false,
        },
        _ => false,
    }
}

/// The next prototype hop for for-in chain walking.
fn proto_of_value(interp: &Interpreter, value: &Value) -> Option<core_types::ObjectId> {
    match value {
        Value::Object(id) => interp.heap.object(*id).proto,
        Value::String(_) => Some(interp.protos.string),
        Value::Number(_) => Some(interp.protos.number),
        Value::Boolean(_) => Some(interp.protos.boolean),
        _ => None,
    }
}

fn step_for_in(
    interp: &mut Interpreter,
    idx: usize,
    left: NodeId,
    right: NodeId,
    body: NodeId,
) -> Result<(), FatalError> {
    let (phase, mut current, mut keys, mut index, mut visited) =
        match interp.stack[idx].state.clone() {
            FrameState::ForIn {
                phase,
                current,
                keys,
                index,
                visited,
            } => (phase, current, keys, index, visited),
            _ => return Err(FatalError::Internal("for-in state mismatch".to_string())),
        };

    match phase {
        ForInPhase::Object { pushed: false } => {
            interp.stack[idx].state = FrameState::ForIn {
                phase: ForInPhase::Object { pushed: true },
                current,
                keys,
                index,
                visited,
            };
            push_child(interp, right, false);
            Ok(())
        }
        ForInPhase::Object { pushed: true } => {
            let value = interp.stack[idx].value.clone();
            if value.is_nullish() {
                pop_silent(interp);
                return Ok(());
            }
            let keys = own_keys_of(interp, &value);
            interp.stack[idx].state = FrameState::ForIn {
                phase: ForInPhase::Next,
                current: Some(value),
                keys,
                index: 0,
                visited,
            };
            Ok(())
        }
        ForInPhase::Next => {
            loop {
                if index >= keys.len() {
                    let cur = match &current {
                        Some(v) => v.clone(),
                        None => {
                            pop_silent(interp);
                            return Ok(());
                        }
                    };
                    match proto_of_value(interp, &cur) {
                        Some(proto) => {
                            let next = Value::Object(proto);
                            keys = own_keys_of(interp, &next);
                            current = Some(next);
                            index = 0;
                            continue;
                        }
                        None => {
                            pop_silent(interp);
                            return Ok(());
                        }
                    }
                }
                let key = keys[index].clone();
                index += 1;
                if visited.contains(&key) {
                    continue;
                }
                let cur = current.clone().expect("enumeration without a target");
                if !still_enumerable(interp, &cur, &key) {
                    continue;
                }
                visited.insert(key.clone());

                // Bind the key to the loop target, then run the body.
                match interp.ast.node(left).clone() {
                    Node::VariableDeclaration { declarations } => {
                        let name = declarations[0].name.clone();
                        let scope = interp.stack[idx].scope;
                        interp.assign_name(scope, &name, Value::String(key));
                        interp.stack[idx].state = FrameState::ForIn {
                            phase: ForInPhase::Next,
                            current,
                            keys,
                            index,
                            visited,
                        };
                        push_child(interp, body, false);
                    }
                    Node::Identifier { name } => {
                        let scope = interp.stack[idx].scope;
                        interp.assign_name(scope, &name, Value::String(key));
                        interp.stack[idx].state = FrameState::ForIn {
                            phase: ForInPhase::Next,
                            current,
                            keys,
                            index,
                            visited,
                        };
                        push_child(interp, body, false);
                    }
                    Node::MemberExpression { .. } => {
                        interp.stack[idx].state = FrameState::ForIn {
                            phase: ForInPhase::Target { key },
                            current,
                            keys,
                            index,
                            visited,
                        };
                        push_child(interp, left, true);
                    }
                    other => {
                        return Err(FatalError::Internal(format!(
                            "invalid for-in target {:?}",
                            other
                        )))
                    }
                }
                return Ok(());
            }
        }
        ForInPhase::Target { key } => {
            let reference = match interp.stack[idx].reference.take() {
                Some(r) => r,
                None => {
                    return Err(FatalError::Internal(
                        "for-in target produced no reference".to_string(),
                    ))
                }
            };
            let scope = interp.stack[idx].scope;
            throwing!(
                interp,
                interp.put_reference(scope, &reference, Value::String(key))
            );
            interp.stack[idx].state = FrameState::ForIn {
                phase: ForInPhase::Next,
                current,
                keys,
                index,
                visited,
            };
            push_child(interp, body, false);
            Ok(())
        }
    }
}

fn step_switch(
    interp: &mut Interpreter,
    idx: usize,
    discriminant: NodeId,
    cases: &[parser::SwitchCase],
) -> Result<(), FatalError> {
    let (done_disc, have_disc, mut disc, mut case_index, testing, mut matched_case, mut exec_index) =
        match interp.stack[idx].state.clone() {
            FrameState::Switch {
                done_disc,
                have_disc,
                disc,
                case_index,
                testing,
                matched_case,
                exec_index,
            } => (
                done_disc, have_disc, disc, case_index, testing, matched_case, exec_index,
            ),
            _ => return Err(FatalError::Internal("switch state mismatch".to_string())),
        };
    let save = |interp: &mut Interpreter,
                disc: Value,
                case_index: usize,
                testing: bool,
                matched_case: Option<usize>,
                exec_index: usize| {
        interp.stack[idx].state = FrameState::Switch {
            done_disc: true,
            have_disc: true,
            disc,
            case_index,
            testing,
            matched_case,
            exec_index,
        };
    };

    if !done_disc {
        interp.stack[idx].state = FrameState::Switch {
            done_disc: true,
            have_disc: false,
            disc,
            case_index,
            testing,
            matched_case,
            exec_index,
        };
        push_child(interp, discriminant, false);
        return Ok(());
    }
    if !have_disc {
        disc = interp.stack[idx].value.clone();
    }

    if matched_case.is_none() {
        if testing {
            let test_value = interp.stack[idx].value.clone();
            if loose_eq(&interp.heap, &disc, &test_value) {
                matched_case = Some(case_index);
                exec_index = 0;
            } else {
                case_index += 1;
            }
        }
        if matched_case.is_none() {
            while case_index < cases.len() && cases[case_index].test.is_none() {
                case_index += 1;
            }
            if case_index >= cases.len() {
                // No test matched; run the default clause if there is one.
                match cases.iter().position(|c| c.test.is_none()) {
                    Some(default_index) => {
                        matched_case = Some(default_index);
                        exec_index = 0;
                    }
                    None => {
                        pop_silent(interp);
                        return Ok(());
                    }
                }
            } else {
                let test = cases[case_index].test.expect("checked above");
                save(interp, disc, case_index, true, None, 0);
                push_child(interp, test, false);
                return Ok(());
            }
        }
    }

    // Execute consequents with fall-through until a break unwinds us.
    let mc = matched_case.expect("matched case set above");
    if mc >= cases.len() {
        pop_silent(interp);
        return Ok(());
    }
    if exec_index < cases[mc].consequent.len() {
        let stmt = cases[mc].consequent[exec_index];
        save(interp, disc, case_index, false, Some(mc), exec_index + 1);
        push_child(interp, stmt, false);
        return Ok(());
    }
    if mc + 1 >= cases.len() {
        pop_silent(interp);
        return Ok(());
    }
    save(interp, disc, case_index, false, Some(mc + 1), 0);
    Ok(())
}

fn step_try(
    interp: &mut Interpreter,
    idx: usize,
    block: NodeId,
    handler: &Option<parser::CatchClause>,
    finalizer: Option<NodeId>,
) -> Result<(), FatalError> {
    let (phase, entered, pending) = match interp.stack[idx].state.clone() {
        FrameState::Try {
            phase,
            entered,
            pending,
        } => (phase, entered, pending),
        _ => return Err(FatalError::Internal("try state mismatch".to_string())),
    };
    match phase {
        TryPhase::Block => {
            if !entered {
                interp.stack[idx].state = FrameState::Try {
                    phase: TryPhase::Block,
                    entered: true,
                    pending: None,
                };
                push_child(interp, block, false);
            } else if finalizer.is_some() {
                interp.stack[idx].state = FrameState::Try {
                    phase: TryPhase::Finalizer,
                    entered: false,
                    pending: None,
                };
            } else {
                pop_silent(interp);
            }
            Ok(())
        }
        TryPhase::Handler => {
            if !entered {
                let thrown = match pending {
                    Some(Completion::Throw(v)) => v,
                    _ => Value::Undefined,
                };
                let clause = match handler {
                    Some(clause) => clause.clone(),
                    None => {
                        return Err(FatalError::Internal(
                            "handler phase without catch clause".to_string(),
                        ))
                    }
                };
                let parent_scope = interp.stack[idx].scope;
                let catch_scope = interp.heap.alloc_scope(Scope::new(Some(parent_scope)));
                interp
                    .heap
                    .scope_mut(catch_scope)
                    .declare(&clause.param, thrown, false);
                interp.stack[idx].state = FrameState::Try {
                    phase: TryPhase::Handler,
                    entered: true,
                    pending: None,
                };
                push_child(interp, clause.body, false);
                if let Some(child) = interp.stack.last_mut() {
                    child.scope = catch_scope;
                }
            } else if finalizer.is_some() {
                interp.stack[idx].state = FrameState::Try {
                    phase: TryPhase::Finalizer,
                    entered: false,
                    pending: None,
                };
            } else {
                pop_silent(interp);
            }
            Ok(())
        }
        TryPhase::Finalizer => {
            if !entered {
                let finalizer = match finalizer {
                    Some(f) => f,
                    None => {
                        return Err(FatalError::Internal(
                            "finalizer phase without finally block".to_string(),
                        ))
                    }
                };
                interp.stack[idx].state = FrameState::Try {
                    phase: TryPhase::Finalizer,
                    entered: true,
                    pending,
                };
                push_child(interp, finalizer, false);
                Ok(())
            } else {
                pop_silent(interp);
                match pending {
                    Some(completion) => interp.unwind(completion),
                    None => Ok(()),
                }
            }
        }
    }
}

fn step_throw(interp: &mut Interpreter, idx: usize, argument: NodeId) -> Result<(), FatalError> {
    let done = matches!(interp.stack[idx].state, FrameState::Throw { done: true });
    if !done {
        interp.stack[idx].state = FrameState::Throw { done: true };
        push_child(interp, argument, false);
        Ok(())
    } else {
        let value = interp.stack[idx].value.clone();
        interp.unwind(Completion::Throw(value))
    }
}

fn step_return(
    interp: &mut Interpreter,
    idx: usize,
    argument: Option<NodeId>,
) -> Result<(), FatalError> {
    match argument {
        None => interp.unwind(Completion::Return(Value::Undefined)),
        Some(argument) => {
            let done = matches!(interp.stack[idx].state, FrameState::Return { done: true });
            if !done {
                interp.stack[idx].state = FrameState::Return { done: true };
                push_child(interp, argument, false);
                Ok(())
            } else {
                let value = interp.stack[idx].value.clone();
                interp.unwind(Completion::Return(value))
            }
        }
    }
}

fn step_identifier(interp: &mut Interpreter, idx: usize, name: &str) -> Result<(), FatalError> {
    if interp.stack[idx].components {
        pop_ref(interp, Reference::Name(name.to_string()));
        return Ok(());
    }
    let scope = interp.stack[idx].scope;
    let value = throwing!(interp, interp.lookup_name(scope, name));
    pop_value(interp, value);
    Ok(())
}

fn step_literal(interp: &mut Interpreter, literal: &Literal) -> Result<(), FatalError> {
    let value = match literal {
        Literal::Null => Value::Null,
        Literal::Boolean(b) => Value::Boolean(*b),
        Literal::Number(n) => Value::Number(*n),
        Literal::String(s) => Value::String(s.clone()),
        Literal::Regex { pattern, flags } => {
            Value::Object(interp.create_regex(pattern, flags))
        }
    };
    pop_value(interp, value);
    Ok(())
}

fn step_function(
    interp: &mut Interpreter,
    idx: usize,
    node_id: NodeId,
    name: &Option<String>,
) -> Result<(), FatalError> {
    // A Function node frame is either a function-expression evaluation or a
    // running function body.
    match interp.stack[idx].state.clone() {
        FrameState::Start => {
            let scope = interp.stack[idx].scope;
            let func = match name {
                // A named function expression sees its own name as a
                // read-only binding in a private scope.
                Some(name) => {
                    let inner = interp.heap.alloc_scope(Scope::new(Some(scope)));
                    let func = interp.create_function(node_id, inner);
                    interp
                        .heap
                        .scope_mut(inner)
                        .declare(name, Value::Object(func), true);
                    func
                }
                None => interp.create_function(node_id, scope),
            };
            pop_value(interp, Value::Object(func));
            Ok(())
        }
        FrameState::FunctionBody { index } => {
            let body = match interp.ast.node(node_id) {
                Node::Function { body, .. } => body.clone(),
                _ => return Err(FatalError::Internal("function body mismatch".to_string())),
            };
            if index < body.len() {
                interp.stack[idx].state = FrameState::FunctionBody { index: index + 1 };
                push_child(interp, body[index], false);
            } else {
                pop_silent(interp);
            }
            Ok(())
        }
        other => Err(FatalError::Internal(format!(
            "function frame in foreign state {:?}",
            other
        ))),
    }
}

fn step_unary(
    interp: &mut Interpreter,
    idx: usize,
    operator: UnaryOp,
    argument: NodeId,
) -> Result<(), FatalError> {
    let done = matches!(interp.stack[idx].state, FrameState::Unary { done: true });
    if !done {
        interp.stack[idx].state = FrameState::Unary { done: true };
        let components = matches!(operator, UnaryOp::Delete)
            || (matches!(operator, UnaryOp::Typeof)
                && matches!(interp.ast.node(argument), Node::Identifier { .. }));
        push_child(interp, argument, components);
        return Ok(());
    }
    match operator {
        UnaryOp::Typeof => {
            let value = match interp.stack[idx].reference.take() {
                Some(Reference::Name(name)) => {
                    let scope = interp.stack[idx].scope;
                    interp
                        .lookup_name_opt(scope, &name)
                        .unwrap_or(Value::Undefined)
                }
                Some(Reference::Member { .. }) | None => interp.stack[idx].value.clone(),
            };
            let tag = type_of_value(&interp.heap, &value);
            pop_value(interp, Value::String(tag.to_string()));
        }
        UnaryOp::Delete => match interp.stack[idx].reference.take() {
            Some(Reference::Name(name)) => {
                let scope = interp.stack[idx].scope;
                let removed = interp.delete_name(scope, &name);
                pop_value(interp, Value::Boolean(removed));
            }
            Some(Reference::Member { base, key }) => {
                let removed = throwing!(interp, interp.delete_property(&base, &key));
                pop_value(interp, Value::Boolean(removed));
            }
            None => pop_value(interp, Value::Boolean(true)),
        },
        UnaryOp::Void => pop_value(interp, Value::Undefined),
        UnaryOp::Not => {
            let truthy = interp.stack[idx].value.is_truthy();
            pop_value(interp, Value::Boolean(!truthy));
        }
        UnaryOp::Minus => {
            let n = to_number_value(&interp.heap, &interp.stack[idx].value.clone());
            pop_value(interp, Value::Number(-n));
        }
        UnaryOp::Plus => {
            let n = to_number_value(&interp.heap, &interp.stack[idx].value.clone());
            pop_value(interp, Value::Number(n));
        }
        UnaryOp::BitNot => {
            let n = to_number_value(&interp.heap, &interp.stack[idx].value.clone());
            pop_value(interp, Value::Number(!to_int32(n) as f64));
        }
    }
    Ok(())
}

fn step_update(
    interp: &mut Interpreter,
    idx: usize,
    operator: UpdateOp,
    prefix: bool,
    argument: NodeId,
) -> Result<(), FatalError> {
    let done_ref = matches!(
        interp.stack[idx].state,
        FrameState::Update { done_ref: true, .. }
    );
    if !done_ref {
        interp.stack[idx].state = FrameState::Update {
            done_ref: true,
            target: None,
        };
        push_child(interp, argument, true);
        return Ok(());
    }
    let reference = match interp.stack[idx].reference.take() {
        Some(r) => r,
        None => {
            return Err(FatalError::Internal(
                "update target produced no reference".to_string(),
            ))
        }
    };
    let scope = interp.stack[idx].scope;
    let old_value = throwing!(interp, interp.get_reference(scope, &reference));
    let old = to_number_value(&interp.heap, &old_value);
    let new = match operator {
        UpdateOp::Increment => old + 1.0,
        UpdateOp::Decrement => old - 1.0,
    };
    throwing!(
        interp,
        interp.put_reference(scope, &reference, Value::Number(new))
    );
    pop_value(interp, Value::Number(if prefix { new } else { old }));
    Ok(())
}

fn step_binary(
    interp: &mut Interpreter,
    idx: usize,
    operator: BinaryOp,
    left: NodeId,
    right: NodeId,
) -> Result<(), FatalError> {
    let (done_left, done_right, left_value) = match interp.stack[idx].state.clone() {
        FrameState::Binary {
            done_left,
            done_right,
            left,
        } => (done_left, done_right, left),
        _ => return Err(FatalError::Internal("binary state mismatch".to_string())),
    };
    if !done_left {
        interp.stack[idx].state = FrameState::Binary {
            done_left: true,
            done_right: false,
            left: Value::Undefined,
        };
        push_child(interp, left, false);
        return Ok(());
    }
    if !done_right {
        let left_value = interp.stack[idx].value.clone();
        interp.stack[idx].state = FrameState::Binary {
            done_left: true,
            done_right: true,
            left: left_value,
        };
        push_child(interp, right, false);
        return Ok(());
    }
    let right_value = interp.stack[idx].value.clone();
    let result = throwing!(interp, apply_binary(interp, operator, &left_value, &right_value));
    pop_value(interp, result);
    Ok(())
}

fn step_logical(
    interp: &mut Interpreter,
    idx: usize,
    operator: LogicalOp,
    left: NodeId,
    right: NodeId,
) -> Result<(), FatalError> {
    let (done_left, done_right) = match interp.stack[idx].state {
        FrameState::Logical {
            done_left,
            done_right,
        } => (done_left, done_right),
        _ => return Err(FatalError::Internal("logical state mismatch".to_string())),
    };
    if !done_left {
        interp.stack[idx].state = FrameState::Logical {
            done_left: true,
            done_right: false,
        };
        push_child(interp, left, false);
        return Ok(());
    }
    if !done_right {
        let value = interp.stack[idx].value.clone();
        let short_circuit = match operator {
            LogicalOp::And => !value.is_truthy(),
            LogicalOp::Or => value.is_truthy(),
        };
        if short_circuit {
            pop_value(interp, value);
            return Ok(());
        }
        interp.stack[idx].state = FrameState::Logical {
            done_left: true,
            done_right: true,
        };
        push_child(interp, right, false);
        return Ok(());
    }
    let value = interp.stack[idx].value.clone();
    pop_value(interp, value);
    Ok(())
}

fn step_assign(
    interp: &mut Interpreter,
    idx: usize,
    operator: AssignOp,
    left: NodeId,
    right: NodeId,
) -> Result<(), FatalError> {
    let (done_left, done_right, mut target, mut current) = match interp.stack[idx].state.clone() {
        FrameState::Assign {
            done_left,
            done_right,
            target,
            current,
        } => (done_left, done_right, target, current),
        _ => return Err(FatalError::Internal("assign state mismatch".to_string())),
    };
    if !done_left {
        interp.stack[idx].state = FrameState::Assign {
            done_left: true,
            done_right: false,
            target: None,
            current: Value::Undefined,
        };
        push_child(interp, left, true);
        return Ok(());
    }
    if !done_right {
        let reference = match interp.stack[idx].reference.take() {
            Some(r) => r,
            None => {
                return Err(FatalError::Internal(
                    "assignment target produced no reference".to_string(),
                ))
            }
        };
        if operator.binary().is_some() {
            let scope = interp.stack[idx].scope;
            current = throwing!(interp, interp.get_reference(scope, &reference));
        }
        target = Some(reference);
        interp.stack[idx].state = FrameState::Assign {
            done_left: true,
            done_right: true,
            target,
            current,
        };
        push_child(interp, right, false);
        return Ok(());
    }
    let rhs = interp.stack[idx].value.clone();
    let result = match operator.binary() {
        Some(op) => throwing!(interp, apply_binary(interp, op, &current, &rhs)),
        None => rhs,
    };
    let reference = match target {
        Some(r) => r,
        None => {
            return Err(FatalError::Internal(
                "assignment lost its target".to_string(),
            ))
        }
    };
    let scope = interp.stack[idx].scope;
    throwing!(
        interp,
        interp.put_reference(scope, &reference, result.clone())
    );
    pop_value(interp, result);
    Ok(())
}

fn step_conditional(
    interp: &mut Interpreter,
    idx: usize,
    test: NodeId,
    consequent: NodeId,
    alternate: NodeId,
) -> Result<(), FatalError> {
    let (done_test, done_branch) = match interp.stack[idx].state {
        FrameState::Conditional {
            done_test,
            done_branch,
        } => (done_test, done_branch),
        _ => {
            return Err(FatalError::Internal(
                "conditional state mismatch".to_string(),
            ))
        }
    };
    if !done_test {
        interp.stack[idx].state = FrameState::Conditional {
            done_test: true,
            done_branch: false,
        };
        push_child(interp, test, false);
    } else if !done_branch {
        interp.stack[idx].state = FrameState::Conditional {
            done_test: true,
            done_branch: true,
        };
        let branch = if interp.stack[idx].value.is_truthy() {
            consequent
        } else {
            alternate
        };
        push_child(interp, branch, false);
    } else {
        let value = interp.stack[idx].value.clone();
        pop_value(interp, value);
    }
    Ok(())
}

fn step_sequence(
    interp: &mut Interpreter,
    idx: usize,
    expressions: &[NodeId],
) -> Result<(), FatalError> {
    let index = match interp.stack[idx].state {
        FrameState::Sequence { index } => index,
        _ => return Err(FatalError::Internal("sequence state mismatch".to_string())),
    };
    if index < expressions.len() {
        interp.stack[idx].state = FrameState::Sequence { index: index + 1 };
        push_child(interp, expressions[index], false);
    } else {
        let value = interp.stack[idx].value.clone();
        pop_value(interp, value);
    }
    Ok(())
}

fn step_array(
    interp: &mut Interpreter,
    idx: usize,
    elements: &[Option<NodeId>],
) -> Result<(), FatalError> {
    let (object, mut index, waiting) = match interp.stack[idx].state {
        FrameState::ArrayLit {
            object,
            index,
            waiting,
        } => (object, index, waiting),
        _ => return Err(FatalError::Internal("array state mismatch".to_string())),
    };
    let object = match object {
        Some(id) => id,
        None => interp.create_array(elements.len() as u32),
    };
    if waiting {
        let value = interp.stack[idx].value.clone();
        interp
            .heap
            .object_mut(object)
            .properties
            .insert(index.to_string(), value);
        index += 1;
    }
    while index < elements.len() && elements[index].is_none() {
        index += 1;
    }
    if index < elements.len() {
        let element = elements[index].expect("checked above");
        interp.stack[idx].state = FrameState::ArrayLit {
            object: Some(object),
            index,
            waiting: true,
        };
        push_child(interp, element, false);
    } else {
        pop_value(interp, Value::Object(object));
    }
    Ok(())
}

fn step_object(
    interp: &mut Interpreter,
    idx: usize,
    properties: &[(String, NodeId)],
) -> Result<(), FatalError> {
    let (object, mut index, waiting) = match interp.stack[idx].state {
        FrameState::ObjectLit {
            object,
            index,
            waiting,
        } => (object, index, waiting),
        _ => return Err(FatalError::Internal("object state mismatch".to_string())),
    };
    let object = match object {
        Some(id) => id,
        None => interp.create_plain_object(),
    };
    if waiting {
        let value = interp.stack[idx].value.clone();
        interp
            .heap
            .object_mut(object)
            .properties
            .insert(properties[index].0.clone(), value);
        index += 1;
    }
    if index < properties.len() {
        let value_node = properties[index].1;
        interp.stack[idx].state = FrameState::ObjectLit {
            object: Some(object),
            index,
            waiting: true,
        };
        push_child(interp, value_node, false);
    } else {
        pop_value(interp, Value::Object(object));
    }
    Ok(())
}

fn step_member(
    interp: &mut Interpreter,
    idx: usize,
    object: NodeId,
    property: NodeId,
    computed: bool,
) -> Result<(), FatalError> {
    let (done_object, done_property, mut base) = match interp.stack[idx].state.clone() {
        FrameState::Member {
            done_object,
            done_property,
            object,
        } => (done_object, done_property, object),
        _ => return Err(FatalError::Internal("member state mismatch".to_string())),
    };
    if !done_object {
        interp.stack[idx].state = FrameState::Member {
            done_object: true,
            done_property: false,
            object: Value::Undefined,
        };
        push_child(interp, object, false);
        return Ok(());
    }
    if !done_property {
        base = interp.stack[idx].value.clone();
        interp.stack[idx].state = FrameState::Member {
            done_object: true,
            done_property: true,
            object: base.clone(),
        };
        if computed {
            push_child(interp, property, false);
            return Ok(());
        }
    }
    let key = if computed {
        to_string_value(&interp.heap, &interp.stack[idx].value.clone())
    } else {
        match interp.ast.node(property) {
            Node::Identifier { name } => name.clone(),
            other => {
                return Err(FatalError::Internal(format!(
                    "non-identifier member property {:?}",
                    other
                )))
            }
        }
    };
    if interp.stack[idx].components {
        pop_ref(interp, Reference::Member { base, key });
    } else {
        let value = throwing!(interp, interp.get_property(&base, &key));
        pop_value(interp, value);
    }
    Ok(())
}

#[allow(clippy::too_many_lines)]
fn step_call(
    interp: &mut Interpreter,
    idx: usize,
    callee: NodeId,
    arguments: &[NodeId],
    is_new: bool,
) -> Result<(), FatalError> {
    let (done_callee, mut done_args, done_exec, mut func, mut this_val, mut args, n, waiting_arg, mut construct) =
        match interp.stack[idx].state.clone() {
            FrameState::Call {
                done_callee,
                done_args,
                done_exec,
                func,
                this_val,
                args,
                n,
                waiting_arg,
                construct,
            } => (
                done_callee, done_args, done_exec, func, this_val, args, n, waiting_arg,
                construct,
            ),
            _ => return Err(FatalError::Internal("call state mismatch".to_string())),
        };
    let save = |interp: &mut Interpreter,
                done_args: bool,
                done_exec: bool,
                func: Value,
                this_val: Value,
                args: Vec<Value>,
                n: usize,
                waiting_arg: bool,
                construct: Option<core_types::ObjectId>| {
        interp.stack[idx].state = FrameState::Call {
            done_callee: true,
            done_args,
            done_exec,
            func,
            this_val,
            args,
            n,
            waiting_arg,
            construct,
        };
    };

    if !done_callee {
        save(
            interp,
            false,
            false,
            Value::Undefined,
            Value::Undefined,
            Vec::new(),
            0,
            false,
            None,
        );
        push_child(interp, callee, true);
        return Ok(());
    }

    if !done_args {
        if waiting_arg {
            args.push(interp.stack[idx].value.clone());
        } else if n == 0 {
            // The callee's value (and receiver) materialize exactly once.
            let scope = interp.stack[idx].scope;
            match interp.stack[idx].reference.take() {
                Some(reference @ Reference::Member { .. }) => {
                    let f = throwing!(interp, interp.get_reference(scope, &reference));
                    let base = match reference {
                        Reference::Member { base, .. } => base,
                        Reference::Name(_) => unreachable!(),
                    };
                    func = f;
                    this_val = base;
                }
                Some(reference @ Reference::Name(_)) => {
                    func = throwing!(interp, interp.get_reference(scope, &reference));
                    this_val = Value::Undefined;
                }
                None => {
                    func = interp.stack[idx].value.clone();
                    this_val = Value::Undefined;
                }
            }
        }
        if n < arguments.len() {
            let arg = arguments[n];
            save(
                interp,
                false,
                false,
                func,
                this_val,
                args,
                n + 1,
                true,
                construct,
            );
            push_child(interp, arg, false);
            return Ok(());
        }
        done_args = true;
    }

    if !done_exec {
        let callable = match func.as_object() {
            Some(id) if interp.heap.object(id).is_function() => id,
            _ => {
                let shown = to_string_value(&interp.heap, &func);
                let thrown =
                    interp.throw_error(ErrorKind::TypeError, &format!("{} is not a function", shown));
                let Thrown(v) = thrown;
                interp.unwind(Completion::Throw(v))?;
                return Ok(());
            }
        };
        let data = match &interp.heap.object(callable).data {
            ObjectData::Function(data) => data.clone(),
            _ => unreachable!("checked above"),
        };

        if is_new {
            if matches!(data, FunctionData::Eval) {
                let thrown = interp.throw_error(ErrorKind::TypeError, "eval is not a constructor");
                let Thrown(v) = thrown;
                interp.unwind(Completion::Throw(v))?;
                return Ok(());
            }
            let proto = match throwing!(interp, interp.get_property(&func, "prototype")) {
                Value::Object(p) => p,
                _ => interp.protos.object,
            };
            let fresh = interp.heap.alloc(Object::plain(Some(proto)));
            construct = Some(fresh);
            this_val = Value::Object(fresh);
        }

        // Nothing below writes the result slot except return unwinding and
        // the eval completion, so clear the stale argument value now.
        interp.stack[idx].value = Value::Undefined;

        match data {
            FunctionData::Interpreted { node, scope: captured } => {
                if interp.stack.len() >= interp.stack_limit() {
                    let thrown = interp.throw_error(
                        ErrorKind::RangeError,
                        "Maximum call stack size exceeded",
                    );
                    let Thrown(v) = thrown;
                    interp.unwind(Completion::Throw(v))?;
                    return Ok(());
                }
                let (params, body) = match interp.ast.node(node) {
                    Node::Function { params, body, .. } => (params.clone(), body.clone()),
                    _ => {
                        return Err(FatalError::Internal(
                            "closure references a non-function node".to_string(),
                        ))
                    }
                };
                let fscope = interp.heap.alloc_scope(Scope::new(Some(captured)));
                for (i, param) in params.iter().enumerate() {
                    let value = args.get(i).cloned().unwrap_or(Value::Undefined);
                    interp.heap.scope_mut(fscope).declare(param, value, false);
                }
                let arguments_array = interp.create_array_from(&args);
                interp.heap.scope_mut(fscope).declare(
                    "arguments",
                    Value::Object(arguments_array),
                    true,
                );
                for stmt in &body {
                    interp.populate_scope(*stmt, fscope);
                }
                save(
                    interp,
                    true,
                    true,
                    func,
                    this_val.clone(),
                    args,
                    n,
                    false,
                    construct,
                );
                interp.stack.push(Frame::new(
                    node,
                    fscope,
                    this_val,
                    FrameState::FunctionBody { index: 0 },
                ));
                return Ok(());
            }
            FunctionData::Native { tag, .. } => {
                let imp = interp.natives.get(tag).ok_or_else(|| {
                    FatalError::Internal(format!("native tag {} is not registered", tag.0))
                })?;
                let f = match imp {
                    NativeImpl::Sync(f) => f,
                    NativeImpl::Async(_) => {
                        return Err(FatalError::Internal(
                            "sync native resolved to async implementation".to_string(),
                        ))
                    }
                };
                let result = throwing!(interp, f(interp, this_val, &args));
                let final_value = match construct {
                    Some(obj) => match result {
                        Value::Object(_) => result,
                        _ => Value::Object(obj),
                    },
                    None => result,
                };
                pop_value(interp, final_value);
                return Ok(());
            }
            FunctionData::AsyncNative { tag, .. } => {
                let imp = interp.natives.get(tag).ok_or_else(|| {
                    FatalError::Internal(format!("native tag {} is not registered", tag.0))
                })?;
                let f = match imp {
                    NativeImpl::Async(f) => f,
                    NativeImpl::Sync(_) => {
                        return Err(FatalError::Internal(
                            "async native resolved to sync implementation".to_string(),
                        ))
                    }
                };
                save(
                    interp,
                    true,
                    true,
                    func,
                    this_val.clone(),
                    args.clone(),
                    n,
                    false,
                    construct,
                );
                interp.begin_pending_call();
                match f(interp, this_val, &args) {
                    Ok(()) => {}
                    Err(Thrown(v)) => {
                        interp.resolve_pending(Value::Undefined);
                        interp.unwind(Completion::Throw(v))?;
                    }
                }
                return Ok(());
            }
            FunctionData::Eval => {
                match args.first() {
                    Some(Value::String(src)) => {
                        let src = src.clone();
                        let program = parser::parse_program(&mut interp.ast, &src)
                            .map_err(|e| FatalError::Syntax(format!("eval: {}", e)))?;
                        let scope = interp.stack[idx].scope;
                        let this = interp.stack[idx].this.clone();
                        interp.populate_scope(program, scope);
                        save(interp, true, true, func, this_val, args, n, false, construct);
                        interp.stack.push(Frame::new(
                            program,
                            scope,
                            this,
                            FrameState::EvalProgram { index: 0 },
                        ));
                    }
                    other => {
                        let value = other.cloned().unwrap_or(Value::Undefined);
                        pop_value(interp, value);
                    }
                }
                return Ok(());
            }
        }
    }

    // done_exec: the body (or pending call) delivered its value.
    let result = match construct {
        Some(obj) => match interp.stack[idx].value.clone() {
            v @ Value::Object(_) => v,
            _ => Value::Object(obj),
        },
        None => interp.stack[idx].value.clone(),
    };
    pop_value(interp, result);
    Ok(())
}

/// Applies a binary operator to two evaluated operands.
fn apply_binary(
    interp: &mut Interpreter,
    operator: BinaryOp,
    left: &Value,
    right: &Value,
) -> Result<Value, Thrown> {
    use std::cmp::Ordering;

    let to_primitive = |interp: &Interpreter, v: &Value| -> Value {
        match v {
            Value::Object(_) => Value::String(to_string_value(&interp.heap, v)),
            other => other.clone(),
        }
    };

    Ok(match operator {
        BinaryOp::Add => {
            let a = to_primitive(interp, left);
            let b = to_primitive(interp, right);
            if matches!(a, Value::String(_)) || matches!(b, Value::String(_)) {
                Value::String(format!("{}{}", a, b))
            } else {
                let x = to_number_value(&interp.heap, &a);
                let y = to_number_value(&interp.heap, &b);
                Value::Number(x + y)
            }
        }
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            let x = to_number_value(&interp.heap, left);
            let y = to_number_value(&interp.heap, right);
            Value::Number(match operator {
                BinaryOp::Sub => x - y,
                BinaryOp::Mul => x * y,
                BinaryOp::Div => x / y,
                _ => x % y,
            })
        }
        BinaryOp::Shl | BinaryOp::Shr | BinaryOp::UShr => {
            let x = to_number_value(&interp.heap, left);
            let y = to_number_value(&interp.heap, right);
            let shift = to_uint32(y) & 31;
            Value::Number(match operator {
                BinaryOp::Shl => to_int32(x).wrapping_shl(shift) as f64,
                BinaryOp::Shr => (to_int32(x) >> shift) as f64,
                _ => (to_uint32(x) >> shift) as f64,
            })
        }
        BinaryOp::BitOr | BinaryOp::BitXor | BinaryOp::BitAnd => {
            let x = to_int32(to_number_value(&interp.heap, left));
            let y = to_int32(to_number_value(&interp.heap, right));
            Value::Number(match operator {
                BinaryOp::BitOr => (x | y) as f64,
                BinaryOp::BitXor => (x ^ y) as f64,
                _ => (x & y) as f64,
            })
        }
        BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
            let ordering = convert::compare(&interp.heap, left, right);
            Value::Boolean(match (operator, ordering) {
                (_, None) => false,
                (BinaryOp::Lt, Some(o)) => o == Ordering::Less,
                (BinaryOp::LtEq, Some(o)) => o != Ordering::Greater,
                (BinaryOp::Gt, Some(o)) => o == Ordering::Greater,
                (_, Some(o)) => o != Ordering::Less,
            })
        }
        BinaryOp::Eq => Value::Boolean(loose_eq(&interp.heap, left, right)),
        BinaryOp::NotEq => Value::Boolean(!loose_eq(&interp.heap, left, right)),
        BinaryOp::StrictEq => Value::Boolean(strict_eq(left, right)),
        BinaryOp::StrictNotEq => Value::Boolean(!strict_eq(left, right)),
        BinaryOp::In => {
            let key = to_string_value(&interp.heap, left);
            Value::Boolean(interp.has_property(right, &key)?)
        }
        BinaryOp::Instanceof => {
            let callable = match right.as_object() {
                Some(id) if interp.heap.object(id).is_function() => id,
                _ => {
                    return Err(interp.throw_error(
                        ErrorKind::TypeError,
                        "Right-hand side of 'instanceof' is not callable",
                    ))
                }
            };
            let target_proto = match interp.get_property(&Value::Object(callable), "prototype")? {
                Value::Object(p) => p,
                _ => {
                    return Err(interp.throw_error(
                        ErrorKind::TypeError,
                        "Function has non-object prototype in instanceof check",
                    ))
                }
            };
            let mut found = false;
            if let Value::Object(mut id) = left.clone() {
                while let Some(proto) = interp.heap.object(id).proto {
                    if proto == target_proto {
                        found = true;
                        break;
                    }
                    id = proto;
                }
            }
            Value::Boolean(found)
        }
    })
}
