//! The `cc` host namespace: logging, checkpoint and shutdown triggers,
//! hashing, and the meta-parse utilities.
//!
//! `cc.checkpoint` and `cc.shutdown` only set request flags; the
//! supervisor observes them between steps, which keeps natives free of
//! I/O.

use core_types::{ErrorKind, NodeId, Value};
use interpreter::{Interpreter, Thrown};
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};

use parser::{Literal, Node};

use crate::{arg, install_method, to_num, to_str};

pub(crate) fn install(interp: &mut Interpreter) {
    let cc = interp.create_plain_object();
    install_method(interp, cc, "log", "cc.log");
    install_method(interp, cc, "checkpoint", "cc.checkpoint");
    install_method(interp, cc, "shutdown", "cc.shutdown");
    install_method(interp, cc, "hash", "cc.hash");
    install_method(interp, cc, "parse", "cc.parse");
    install_method(interp, cc, "parseExpressionAt", "cc.parseExpressionAt");
    let scope = interp.global_scope;
    interp
        .heap
        .scope_mut(scope)
        .declare("cc", Value::Object(cc), true);
}

pub(crate) fn log(interp: &mut Interpreter, _t: Value, args: &[Value]) -> Result<Value, Thrown> {
    let line = args
        .iter()
        .map(|v| to_str(interp, v))
        .collect::<Vec<_>>()
        .join(" ");
    interp.log(line);
    Ok(Value::Undefined)
}

pub(crate) fn checkpoint(
    interp: &mut Interpreter,
    _t: Value,
    _args: &[Value],
) -> Result<Value, Thrown> {
    interp.request_checkpoint();
    Ok(Value::Undefined)
}

pub(crate) fn shutdown(
    interp: &mut Interpreter,
    _t: Value,
    args: &[Value],
) -> Result<Value, Thrown> {
    let code = interpreter::to_int32(to_num(interp, &arg(args, 0)));
    interp.request_shutdown(code);
    Ok(Value::Undefined)
}

/// cc.hash(algorithm, data): lowercased hex digest; unknown algorithm
/// names are RangeErrors.
pub(crate) fn hash(interp: &mut Interpreter, _t: Value, args: &[Value]) -> Result<Value, Thrown> {
    let algorithm = to_str(interp, &arg(args, 0));
    let data = to_str(interp, &arg(args, 1));
    let digest = match algorithm.as_str() {
        "md5" => hex(&Md5::digest(data.as_bytes())),
        "sha1" => hex(&Sha1::digest(data.as_bytes())),
        "sha256" => hex(&Sha256::digest(data.as_bytes())),
        "sha512" => hex(&Sha512::digest(data.as_bytes())),
        other => {
            return Err(interp.throw_error(
                ErrorKind::RangeError,
                &format!("Unknown hash algorithm '{}'", other),
            ))
        }
    };
    Ok(Value::String(digest))
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

pub(crate) fn parse(interp: &mut Interpreter, _t: Value, args: &[Value]) -> Result<Value, Thrown> {
    let source = to_str(interp, &arg(args, 0));
    let program = match parser::parse_program(&mut interp.ast, &source) {
        Ok(node) => node,
        Err(e) => {
            return Err(
                interp.throw_error(ErrorKind::SyntaxError, &format!("Parse error: {}", e))
            )
        }
    };
    Ok(node_to_value(interp, program))
}

pub(crate) fn parse_expression_at(
    interp: &mut Interpreter,
    _t: Value,
    args: &[Value],
) -> Result<Value, Thrown> {
    let source = to_str(interp, &arg(args, 0));
    let offset = to_num(interp, &arg(args, 1)).max(0.0) as usize;
    let (node, end) = match parser::parse_expression_at(&mut interp.ast, &source, offset) {
        Ok(result) => result,
        Err(e) => {
            return Err(
                interp.throw_error(ErrorKind::SyntaxError, &format!("Parse error: {}", e))
            )
        }
    };
    let value = node_to_value(interp, node);
    if let Some(id) = value.as_object() {
        interp
            .heap
            .object_mut(id)
            .properties
            .insert("end".to_string(), Value::Number(end as f64));
    }
    Ok(value)
}

// ---- syntax tree reification ----------------------------------------------

fn new_node(interp: &mut Interpreter, kind: &str) -> core_types::ObjectId {
    let id = interp.create_plain_object();
    interp
        .heap
        .object_mut(id)
        .properties
        .insert("type".to_string(), Value::String(kind.to_string()));
    id
}

fn set(interp: &mut Interpreter, id: core_types::ObjectId, key: &str, value: Value) {
    interp.heap.object_mut(id).properties.insert(key.to_string(), value);
}

fn list(interp: &mut Interpreter, nodes: &[NodeId]) -> Value {
    let values: Vec<Value> = nodes.iter().map(|n| node_to_value(interp, *n)).collect();
    Value::Object(interp.create_array_from(&values))
}

fn opt(interp: &mut Interpreter, node: Option<NodeId>) -> Value {
    match node {
        Some(n) => node_to_value(interp, n),
        None => Value::Null,
    }
}

/// Reifies a syntax-tree node as a language object, the shape `cc.parse`
/// hands back to user code.
pub(crate) fn node_to_value(interp: &mut Interpreter, node: NodeId) -> Value {
    let n = interp.ast.node(node).clone();
    let id = match n {
        Node::Program { body } => {
            let id = new_node(interp, "Program");
            let body = list(interp, &body);
            set(interp, id, "body", body);
            id
        }
        Node::ExpressionStatement { expression } => {
            let id = new_node(interp, "ExpressionStatement");
            let e = node_to_value(interp, expression);
            set(interp, id, "expression", e);
            id
        }
        Node::VariableDeclaration { declarations } => {
            let id = new_node(interp, "VariableDeclaration");
            let decls: Vec<Value> = declarations
                .iter()
                .map(|d| {
                    let decl = new_node(interp, "VariableDeclarator");
                    let name = new_node(interp, "Identifier");
                    set(interp, name, "name", Value::String(d.name.clone()));
                    set(interp, decl, "id", Value::Object(name));
                    let init = opt(interp, d.init);
                    set(interp, decl, "init", init);
                    Value::Object(decl)
                })
                .collect();
            let array = interp.create_array_from(&decls);
            set(interp, id, "declarations", Value::Object(array));
            set(interp, id, "kind", Value::String("var".to_string()));
            id
        }
        Node::FunctionDeclaration { function } => {
            let id = new_node(interp, "FunctionDeclaration");
            let f = node_to_value(interp, function);
            set(interp, id, "function", f);
            id
        }
        Node::BlockStatement { body } => {
            let id = new_node(interp, "BlockStatement");
            let body = list(interp, &body);
            set(interp, id, "body", body);
            id
        }
        Node::EmptyStatement => new_node(interp, "EmptyStatement"),
        Node::DebuggerStatement => new_node(interp, "DebuggerStatement"),
        Node::IfStatement {
            test,
            consequent,
            alternate,
        } => {
            let id = new_node(interp, "IfStatement");
            let t = node_to_value(interp, test);
            let c = node_to_value(interp, consequent);
            let a = opt(interp, alternate);
            set(interp, id, "test", t);
            set(interp, id, "consequent", c);
            set(interp, id, "alternate", a);
            id
        }
        Node::LabeledStatement { label, body } => {
            let id = new_node(interp, "LabeledStatement");
            set(interp, id, "label", Value::String(label));
            let b = node_to_value(interp, body);
            set(interp, id, "body", b);
            id
        }
        Node::WhileStatement { test, body } => {
            let id = new_node(interp, "WhileStatement");
            let t = node_to_value(interp, test);
            let b = node_to_value(interp, body);
            set(interp, id, "test", t);
            set(interp, id, "body", b);
            id
        }
        Node::DoWhileStatement { body, test } => {
            let id = new_node(interp, "DoWhileStatement");
            let b = node_to_value(interp, body);
            let t = node_to_value(interp, test);
            set(interp, id, "body", b);
            set(interp, id, "test", t);
            id
        }
        Node::ForStatement {
            init,
            test,
            update,
            body,
        } => {
            let id = new_node(interp, "ForStatement");
            let i = opt(interp, init);
            let t = opt(interp, test);
            let u = opt(interp, update);
            let b = node_to_value(interp, body);
            set(interp, id, "init", i);
            set(interp, id, "test", t);
            set(interp, id, "update", u);
            set(interp, id, "body", b);
            id
        }
        Node::ForInStatement { left, right, body } => {
            let id = new_node(interp, "ForInStatement");
            let l = node_to_value(interp, left);
            let r = node_to_value(interp, right);
            let b = node_to_value(interp, body);
            set(interp, id, "left", l);
            set(interp, id, "right", r);
            set(interp, id, "body", b);
            id
        }
        Node::ContinueStatement { label } => {
            let id = new_node(interp, "ContinueStatement");
            let l = label.map(Value::String).unwrap_or(Value::Null);
            set(interp, id, "label", l);
            id
        }
        Node::BreakStatement { label } => {
            let id = new_node(interp, "BreakStatement");
            let l = label.map(Value::String).unwrap_or(Value::Null);
            set(interp, id, "label", l);
            id
        }
        Node::ReturnStatement { argument } => {
            let id = new_node(interp, "ReturnStatement");
            let a = opt(interp, argument);
            set(interp, id, "argument", a);
            id
        }
        Node::WithStatement { object, body } => {
            let id = new_node(interp, "WithStatement");
            let o = node_to_value(interp, object);
            let b = node_to_value(interp, body);
            set(interp, id, "object", o);
            set(interp, id, "body", b);
            id
        }
        Node::SwitchStatement {
            discriminant,
            cases,
        } => {
            let id = new_node(interp, "SwitchStatement");
            let d = node_to_value(interp, discriminant);
            set(interp, id, "discriminant", d);
            let case_values: Vec<Value> = cases
                .iter()
                .map(|case| {
                    let c = new_node(interp, "SwitchCase");
                    let t = match case.test {
                        Some(t) => node_to_value(interp, t),
                        None => Value::Null,
                    };
                    set(interp, c, "test", t);
                    let body = list(interp, &case.consequent);
                    set(interp, c, "consequent", body);
                    Value::Object(c)
                })
                .collect();
            let array = interp.create_array_from(&case_values);
            set(interp, id, "cases", Value::Object(array));
            id
        }
        Node::ThrowStatement { argument } => {
            let id = new_node(interp, "ThrowStatement");
            let a = node_to_value(interp, argument);
            set(interp, id, "argument", a);
            id
        }
        Node::TryStatement {
            block,
            handler,
            finalizer,
        } => {
            let id = new_node(interp, "TryStatement");
            let b = node_to_value(interp, block);
            set(interp, id, "block", b);
            let h = match handler {
                Some(clause) => {
                    let c = new_node(interp, "CatchClause");
                    let param = new_node(interp, "Identifier");
                    set(interp, param, "name", Value::String(clause.param.clone()));
                    set(interp, c, "param", Value::Object(param));
                    let body = node_to_value(interp, clause.body);
                    set(interp, c, "body", body);
                    Value::Object(c)
                }
                None => Value::Null,
            };
            set(interp, id, "handler", h);
            let f = opt(interp, finalizer);
            set(interp, id, "finalizer", f);
            id
        }
        Node::Identifier { name } => {
            let id = new_node(interp, "Identifier");
            set(interp, id, "name", Value::String(name));
            id
        }
        Node::Literal { value } => {
            let id = new_node(interp, "Literal");
            let v = match value {
                Literal::Null => Value::Null,
                Literal::Boolean(b) => Value::Boolean(b),
                Literal::Number(n) => Value::Number(n),
                Literal::String(s) => Value::String(s),
                Literal::Regex { pattern, flags } => {
                    Value::Object(interp.create_regex(&pattern, &flags))
                }
            };
            set(interp, id, "value", v);
            id
        }
        Node::ThisExpression => new_node(interp, "ThisExpression"),
        Node::ArrayExpression { elements } => {
            let id = new_node(interp, "ArrayExpression");
            let values: Vec<Value> = elements
                .iter()
                .map(|e| opt(interp, *e))
                .collect();
            let array = interp.create_array_from(&values);
            set(interp, id, "elements", Value::Object(array));
            id
        }
        Node::ObjectExpression { properties } => {
            let id = new_node(interp, "ObjectExpression");
            let props: Vec<Value> = properties
                .iter()
                .map(|(key, value_node)| {
                    let p = new_node(interp, "Property");
                    set(interp, p, "key", Value::String(key.clone()));
                    let v = node_to_value(interp, *value_node);
                    set(interp, p, "value", v);
                    Value::Object(p)
                })
                .collect();
            let array = interp.create_array_from(&props);
            set(interp, id, "properties", Value::Object(array));
            id
        }
        Node::Function { name, params, body } => {
            let id = new_node(interp, "FunctionExpression");
            let n = name.map(Value::String).unwrap_or(Value::Null);
            set(interp, id, "name", n);
            let param_values: Vec<Value> = params
                .iter()
                .map(|p| {
                    let ident = new_node(interp, "Identifier");
                    set(interp, ident, "name", Value::String(p.clone()));
                    Value::Object(ident)
                })
                .collect();
            let array = interp.create_array_from(&param_values);
            set(interp, id, "params", Value::Object(array));
            let b = list(interp, &body);
            set(interp, id, "body", b);
            id
        }
        Node::UnaryExpression { operator, argument } => {
            let id = new_node(interp, "UnaryExpression");
            set(
                interp,
                id,
                "operator",
                Value::String(format!("{:?}", operator)),
            );
            let a = node_to_value(interp, argument);
            set(interp, id, "argument", a);
            id
        }
        Node::UpdateExpression {
            operator,
            prefix,
            argument,
        } => {
            let id = new_node(interp, "UpdateExpression");
            set(
                interp,
                id,
                "operator",
                Value::String(format!("{:?}", operator)),
            );
            set(interp, id, "prefix", Value::Boolean(prefix));
            let a = node_to_value(interp, argument);
            set(interp, id, "argument", a);
            id
        }
        Node::BinaryExpression {
            operator,
            left,
            right,
        } => {
            let id = new_node(interp, "BinaryExpression");
            set(
                interp,
                id,
                "operator",
                Value::String(format!("{:?}", operator)),
            );
            let l = node_to_value(interp, left);
            let r = node_to_value(interp, right);
            set(interp, id, "left", l);
            set(interp, id, "right", r);
            id
        }
        Node::LogicalExpression {
            operator,
            left,
            right,
        } => {
            let id = new_node(interp, "LogicalExpression");
            set(
                interp,
                id,
                "operator",
                Value::String(format!("{:?}", operator)),
            );
            let l = node_to_value(interp, left);
            let r = node_to_value(interp, right);
            set(interp, id, "left", l);
            set(interp, id, "right", r);
            id
        }
        Node::AssignmentExpression {
            operator,
            left,
            right,
        } => {
            let id = new_node(interp, "AssignmentExpression");
            set(
                interp,
                id,
                "operator",
                Value::String(format!("{:?}", operator)),
            );
            let l = node_to_value(interp, left);
            let r = node_to_value(interp, right);
            set(interp, id, "left", l);
            set(interp, id, "right", r);
            id
        }
        Node::ConditionalExpression {
            test,
            consequent,
            alternate,
        } => {
            let id = new_node(interp, "ConditionalExpression");
            let t = node_to_value(interp, test);
            let c = node_to_value(interp, consequent);
            let a = node_to_value(interp, alternate);
            set(interp, id, "test", t);
            set(interp, id, "consequent", c);
            set(interp, id, "alternate", a);
            id
        }
        Node::CallExpression { callee, arguments } => {
            let id = new_node(interp, "CallExpression");
            let c = node_to_value(interp, callee);
            set(interp, id, "callee", c);
            let a = list(interp, &arguments);
            set(interp, id, "arguments", a);
            id
        }
        Node::NewExpression { callee, arguments } => {
            let id = new_node(interp, "NewExpression");
            let c = node_to_value(interp, callee);
            set(interp, id, "callee", c);
            let a = list(interp, &arguments);
            set(interp, id, "arguments", a);
            id
        }
        Node::MemberExpression {
            object,
            property,
            computed,
        } => {
            let id = new_node(interp, "MemberExpression");
            let o = node_to_value(interp, object);
            let p = node_to_value(interp, property);
            set(interp, id, "object", o);
            set(interp, id, "property", p);
            set(interp, id, "computed", Value::Boolean(computed));
            id
        }
        Node::SequenceExpression { expressions } => {
            let id = new_node(interp, "SequenceExpression");
            let e = list(interp, &expressions);
            set(interp, id, "expressions", e);
            id
        }
    };
    Value::Object(id)
}

#[cfg(test)]
mod tests {
    use crate::tests::eval_source;
    use core_types::Value;

    #[test]
    fn test_log_lines_are_buffered() {
        let (mut interp, _) = eval_source("cc.log('hello', 42); cc.log('bye');");
        assert_eq!(interp.drain_log(), vec!["hello 42".to_string(), "bye".to_string()]);
        assert!(interp.drain_log().is_empty());
    }

    #[test]
    fn test_checkpoint_and_shutdown_flags() {
        let (mut interp, _) = eval_source("cc.checkpoint(); cc.shutdown(3);");
        assert!(interp.take_checkpoint_request());
        assert_eq!(interp.take_shutdown_request(), Some(3));
        assert!(!interp.take_checkpoint_request());
    }

    #[test]
    fn test_hash_known_vectors() {
        let (_, value) = eval_source("cc.hash('md5', 'abc');");
        assert_eq!(
            value,
            Value::String("900150983cd24fb0d6963f7d28e17f72".to_string())
        );
        let (_, value) = eval_source("cc.hash('sha1', 'abc');");
        assert_eq!(
            value,
            Value::String("a9993e364706816aba3e25717850c26c9cd0d89d".to_string())
        );
        let (_, value) = eval_source("cc.hash('sha256', 'abc');");
        assert_eq!(
            value,
            Value::String(
                "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad".to_string()
            )
        );
    }

    #[test]
    fn test_unknown_hash_algorithm() {
        let (_, value) = eval_source(
            "var k = ''; try { cc.hash('crc32', 'x'); } catch (e) { k = e.name; } k;",
        );
        assert_eq!(value, Value::String("RangeError".to_string()));
    }

    #[test]
    fn test_parse_produces_tree_values() {
        let (_, value) = eval_source(
            "var tree = cc.parse('var a = 1 + 2;');\
             tree.type + ':' + tree.body.length + ':' + tree.body[0].type;",
        );
        assert_eq!(
            value,
            Value::String("Program:1:VariableDeclaration".to_string())
        );
    }

    #[test]
    fn test_parse_expression_at_offset_and_end() {
        let (_, value) = eval_source(
            "var e = cc.parseExpressionAt('xx; 1 + 2', 4);\
             e.type + ':' + e.end;",
        );
        assert_eq!(value, Value::String("BinaryExpression:9".to_string()));
    }

    #[test]
    fn test_parse_error_is_catchable() {
        let (_, value) = eval_source(
            "var k = ''; try { cc.parse('var = ;'); } catch (e) { k = e.name; } k;",
        );
        assert_eq!(value, Value::String("SyntaxError".to_string()));
    }
}
