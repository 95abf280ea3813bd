//! Object and Function constructors and Object.prototype methods.

use core_types::{ErrorKind, Value};
use interpreter::{Interpreter, Thrown};

use crate::{arg, install_constructor, install_method, to_str};

pub(crate) fn install(interp: &mut Interpreter) {
    let object_proto = interp.protos.object;
    let ctor = install_constructor(interp, "Object", "Object", object_proto);
    for (key, name) in [
        ("preventExtensions", "Object.preventExtensions"),
        ("isExtensible", "Object.isExtensible"),
    ] {
        let func = crate::native_fn(interp, name);
        interp
            .define_property(ctor, key, Value::Object(func), interpreter::PropFlags::hidden())
            .expect("installing Object statics cannot fail");
    }
    install_method(interp, object_proto, "hasOwnProperty", "Object.prototype.hasOwnProperty");
    install_method(interp, object_proto, "toString", "Object.prototype.toString");
    install_method(interp, object_proto, "valueOf", "Object.prototype.valueOf");

    let function_proto = interp.protos.function;
    install_constructor(interp, "Function", "Function", function_proto);
}

/// Object.preventExtensions(o): rejects new keys from now on.
pub(crate) fn prevent_extensions(
    interp: &mut Interpreter,
    _this: Value,
    args: &[Value],
) -> Result<Value, Thrown> {
    let target = arg(args, 0);
    if let Some(id) = target.as_object() {
        interp.prevent_extensions(id);
    }
    Ok(target)
}

/// Object.isExtensible(o)
pub(crate) fn is_extensible(
    interp: &mut Interpreter,
    _this: Value,
    args: &[Value],
) -> Result<Value, Thrown> {
    Ok(Value::Boolean(match arg(args, 0).as_object() {
        Some(id) => interp.heap.object(id).extensible,
        None => false,
    }))
}

/// Object(value): boxes nothing; returns the value if it is already an
/// object, else a fresh plain object.
pub(crate) fn constructor(
    interp: &mut Interpreter,
    _this: Value,
    args: &[Value],
) -> Result<Value, Thrown> {
    Ok(match arg(args, 0) {
        v @ Value::Object(_) => v,
        _ => Value::Object(interp.create_plain_object()),
    })
}

pub(crate) fn has_own_property(
    interp: &mut Interpreter,
    this: Value,
    args: &[Value],
) -> Result<Value, Thrown> {
    let key = to_str(interp, &arg(args, 0));
    let result = match &this {
        Value::Object(id) => interp.heap.has_own(*id, &key),
        Value::String(s) => {
            key == "length"
                || matches!(key.parse::<usize>(), Ok(i) if i < s.chars().count())
        }
        _ => false,
    };
    Ok(Value::Boolean(result))
}

pub(crate) fn to_string(
    interp: &mut Interpreter,
    this: Value,
    _args: &[Value],
) -> Result<Value, Thrown> {
    Ok(Value::String(to_str(interp, &this)))
}

pub(crate) fn value_of(
    _interp: &mut Interpreter,
    this: Value,
    _args: &[Value],
) -> Result<Value, Thrown> {
    Ok(this)
}

/// Function(p1, ..., pn, body): parses a fresh function closed over the
/// global scope. A malformed body is a catchable SyntaxError.
pub(crate) fn function_constructor(
    interp: &mut Interpreter,
    _this: Value,
    args: &[Value],
) -> Result<Value, Thrown> {
    let (params, body) = match args.split_last() {
        Some((body, params)) => {
            let names: Vec<String> = params.iter().map(|p| to_str(interp, p)).collect();
            (names.join(","), to_str(interp, body))
        }
        None => (String::new(), String::new()),
    };
    let source = format!("(function({}) {{ {} }})", params, body);
    let node = match parser::parse_expression_at(&mut interp.ast, &source, 0) {
        Ok((node, _)) => node,
        Err(e) => {
            return Err(interp.throw_error(
                ErrorKind::SyntaxError,
                &format!("Invalid function body: {}", e),
            ))
        }
    };
    let global = interp.global_scope;
    let func = interp.create_function(node, global);
    Ok(Value::Object(func))
}

#[cfg(test)]
mod tests {
    use crate::tests::eval_source;
    use core_types::Value;

    #[test]
    fn test_has_own_property_ignores_prototype() {
        let (_, value) = eval_source(
            "function B() {} B.prototype.inherited = 1;\
             var o = new B(); o.own = 2;\
             o.hasOwnProperty('own') + ':' + o.hasOwnProperty('inherited');",
        );
        assert_eq!(value, Value::String("true:false".to_string()));
    }

    #[test]
    fn test_object_constructor() {
        let (_, value) = eval_source("var o = {}; Object(o) === o;");
        assert_eq!(value, Value::Boolean(true));
        let (_, value) = eval_source("typeof Object();");
        assert_eq!(value, Value::String("object".to_string()));
    }

    #[test]
    fn test_function_constructor_builds_callable() {
        let (_, value) = eval_source("var f = new Function('a', 'b', 'return a + b;'); f(2, 3);");
        assert_eq!(value, Value::Number(5.0));
    }

    #[test]
    fn test_prevent_extensions() {
        let (_, value) = eval_source(
            "var o = { a: 1 };\
             Object.preventExtensions(o);\
             var k = '';\
             try { o.b = 2; } catch (e) { k = e.name; }\
             o.a = 10;\
             k + ':' + o.a + ':' + Object.isExtensible(o) + ':' + Object.isExtensible({});",
        );
        assert_eq!(value, Value::String("TypeError:10:false:true".to_string()));
    }

    #[test]
    fn test_function_constructor_rejects_bad_body() {
        let (_, value) = eval_source(
            "var kind = '';\
             try { new Function('return ;;;('); } catch (e) { kind = e.name; }\
             kind;",
        );
        assert_eq!(value, Value::String("SyntaxError".to_string()));
    }
}
