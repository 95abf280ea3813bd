//! The Error constructor family.
//!
//! Each subkind's prototype chains to Error.prototype, carries its `name`,
//! and the constructors accept an optional message. Interpreter-raised
//! errors use the same prototypes, so user code cannot tell them apart
//! from `new TypeError(...)`.

use core_types::{ErrorKind, Value};
use interpreter::{Interpreter, PropFlags, Thrown};

use crate::{arg, install_constructor, install_method, to_str};

pub(crate) fn install(interp: &mut Interpreter) {
    for (i, kind) in ErrorKind::all().into_iter().enumerate() {
        let proto = interp.protos.errors[i];
        interp
            .define_property(
                proto,
                "name",
                Value::String(kind.name().to_string()),
                PropFlags::hidden(),
            )
            .expect("installing error name cannot fail");
        interp
            .define_property(
                proto,
                "message",
                Value::String(String::new()),
                PropFlags::hidden(),
            )
            .expect("installing error message cannot fail");
        install_constructor(interp, kind.name(), kind.name(), proto);
    }
    let error_proto = interp.protos.errors[0];
    install_method(interp, error_proto, "toString", "Error.prototype.toString");
}

fn construct(interp: &mut Interpreter, kind: ErrorKind, args: &[Value]) -> Result<Value, Thrown> {
    let message = match arg(args, 0) {
        Value::Undefined => String::new(),
        v => to_str(interp, &v),
    };
    Ok(Value::Object(interp.make_error(kind, &message)))
}

pub(crate) fn error(interp: &mut Interpreter, _t: Value, args: &[Value]) -> Result<Value, Thrown> {
    construct(interp, ErrorKind::Error, args)
}

pub(crate) fn eval_error(
    interp: &mut Interpreter,
    _t: Value,
    args: &[Value],
) -> Result<Value, Thrown> {
    construct(interp, ErrorKind::EvalError, args)
}

pub(crate) fn range_error(
    interp: &mut Interpreter,
    _t: Value,
    args: &[Value],
) -> Result<Value, Thrown> {
    construct(interp, ErrorKind::RangeError, args)
}

pub(crate) fn reference_error(
    interp: &mut Interpreter,
    _t: Value,
    args: &[Value],
) -> Result<Value, Thrown> {
    construct(interp, ErrorKind::ReferenceError, args)
}

pub(crate) fn syntax_error(
    interp: &mut Interpreter,
    _t: Value,
    args: &[Value],
) -> Result<Value, Thrown> {
    construct(interp, ErrorKind::SyntaxError, args)
}

pub(crate) fn type_error(
    interp: &mut Interpreter,
    _t: Value,
    args: &[Value],
) -> Result<Value, Thrown> {
    construct(interp, ErrorKind::TypeError, args)
}

pub(crate) fn uri_error(
    interp: &mut Interpreter,
    _t: Value,
    args: &[Value],
) -> Result<Value, Thrown> {
    construct(interp, ErrorKind::URIError, args)
}

pub(crate) fn to_string(
    interp: &mut Interpreter,
    this: Value,
    _args: &[Value],
) -> Result<Value, Thrown> {
    Ok(Value::String(to_str(interp, &this)))
}

#[cfg(test)]
mod tests {
    use crate::tests::eval_source;
    use core_types::Value;

    #[test]
    fn test_subkind_prototype_chain() {
        let (_, value) = eval_source(
            "var e = new TypeError('bad');\
             (e instanceof TypeError) + ':' + (e instanceof Error) + ':' + e.name;",
        );
        assert_eq!(value, Value::String("true:true:TypeError".to_string()));
    }

    #[test]
    fn test_message_formats() {
        let (_, value) = eval_source("new Error('m').toString();");
        assert_eq!(value, Value::String("Error: m".to_string()));
        let (_, value) = eval_source("new Error().toString();");
        assert_eq!(value, Value::String("Error".to_string()));
    }

    #[test]
    fn test_interpreter_errors_share_prototypes() {
        let (_, value) = eval_source(
            "var got = '';\
             try { null.x; } catch (e) { got = (e instanceof TypeError) + ':' + e.name; }\
             got;",
        );
        assert_eq!(value, Value::String("true:TypeError".to_string()));
    }

    #[test]
    fn test_error_without_new() {
        let (_, value) = eval_source("var e = RangeError('r'); e.name + ':' + e.message;");
        assert_eq!(value, Value::String("RangeError:r".to_string()));
    }
}
