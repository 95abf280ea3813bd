//! Free global functions and the eval marker.

use core_types::Value;
use interpreter::{FunctionData, Interpreter, Object, ObjectData, Thrown};

use crate::{arg, native_fn, to_num, to_str};

pub(crate) fn install(interp: &mut Interpreter) {
    for (key, name) in [
        ("isNaN", "isNaN"),
        ("isFinite", "isFinite"),
        ("parseInt", "parseInt"),
        ("parseFloat", "parseFloat"),
    ] {
        let func = native_fn(interp, name);
        let scope = interp.global_scope;
        interp
            .heap
            .scope_mut(scope)
            .declare(key, Value::Object(func), true);
    }

    // eval is not a native: calls to it are dispatched specially so the
    // fragment runs in the caller's scope.
    let eval_fn = interp.heap.alloc(Object::with_data(
        Some(interp.protos.function),
        ObjectData::Function(FunctionData::Eval),
    ));
    let scope = interp.global_scope;
    interp
        .heap
        .scope_mut(scope)
        .declare("eval", Value::Object(eval_fn), true);
}

pub(crate) fn is_nan(interp: &mut Interpreter, _t: Value, args: &[Value]) -> Result<Value, Thrown> {
    Ok(Value::Boolean(to_num(interp, &arg(args, 0)).is_nan()))
}

pub(crate) fn is_finite(
    interp: &mut Interpreter,
    _t: Value,
    args: &[Value],
) -> Result<Value, Thrown> {
    Ok(Value::Boolean(to_num(interp, &arg(args, 0)).is_finite()))
}

pub(crate) fn parse_int(
    interp: &mut Interpreter,
    _t: Value,
    args: &[Value],
) -> Result<Value, Thrown> {
    let text = to_str(interp, &arg(args, 0));
    let mut radix = match arg(args, 1) {
        Value::Undefined => 0,
        v => to_num(interp, &v) as i64,
    };
    if radix != 0 && !(2..=36).contains(&radix) {
        return Ok(Value::Number(f64::NAN));
    }

    let mut rest = text.trim_start();
    let negative = match rest.as_bytes().first() {
        Some(b'-') => {
            rest = &rest[1..];
            true
        }
        Some(b'+') => {
            rest = &rest[1..];
            false
        }
        _ => false,
    };
    if (radix == 0 || radix == 16)
        && (rest.starts_with("0x") || rest.starts_with("0X"))
    {
        rest = &rest[2..];
        radix = 16;
    }
    if radix == 0 {
        radix = 10;
    }

    let mut value = 0f64;
    let mut any = false;
    for c in rest.chars() {
        let digit = match c.to_digit(36) {
            Some(d) if (d as i64) < radix => d as f64,
            _ => break,
        };
        value = value * radix as f64 + digit;
        any = true;
    }
    Ok(Value::Number(if !any {
        f64::NAN
    } else if negative {
        -value
    } else {
        value
    }))
}

pub(crate) fn parse_float(
    interp: &mut Interpreter,
    _t: Value,
    args: &[Value],
) -> Result<Value, Thrown> {
    let text = to_str(interp, &arg(args, 0));
    let rest = text.trim_start();
    if rest.starts_with("Infinity") || rest.starts_with("+Infinity") {
        return Ok(Value::Number(f64::INFINITY));
    }
    if rest.starts_with("-Infinity") {
        return Ok(Value::Number(f64::NEG_INFINITY));
    }

    // Longest valid float prefix: sign, digits, fraction, exponent.
    let bytes = rest.as_bytes();
    let mut end = 0;
    let mut seen_digit = false;
    let mut seen_dot = false;
    let mut seen_exp = false;
    while end < bytes.len() {
        let b = bytes[end];
        match b {
            b'0'..=b'9' => seen_digit = true,
            b'+' | b'-' if end == 0 => {}
            b'.' if !seen_dot && !seen_exp => seen_dot = true,
            b'e' | b'E' if seen_digit && !seen_exp => {
                // Only take the exponent if digits follow it.
                let mut peek = end + 1;
                if peek < bytes.len() && matches!(bytes[peek], b'+' | b'-') {
                    peek += 1;
                }
                if peek >= bytes.len() || !bytes[peek].is_ascii_digit() {
                    break;
                }
                seen_exp = true;
            }
            _ => break,
        }
        end += 1;
    }
    if !seen_digit {
        return Ok(Value::Number(f64::NAN));
    }
    Ok(Value::Number(
        rest[..end].parse::<f64>().unwrap_or(f64::NAN),
    ))
}

#[cfg(test)]
mod tests {
    use crate::tests::eval_source;
    use core_types::Value;

    #[test]
    fn test_parse_int_forms() {
        let (_, value) = eval_source("parseInt('  42px');");
        assert_eq!(value, Value::Number(42.0));
        let (_, value) = eval_source("parseInt('0xff');");
        assert_eq!(value, Value::Number(255.0));
        let (_, value) = eval_source("parseInt('101', 2);");
        assert_eq!(value, Value::Number(5.0));
        let (_, value) = eval_source("parseInt('-8');");
        assert_eq!(value, Value::Number(-8.0));
        let (_, value) = eval_source("isNaN(parseInt('px'));");
        assert_eq!(value, Value::Boolean(true));
    }

    #[test]
    fn test_parse_float_prefix() {
        let (_, value) = eval_source("parseFloat('3.5e2rest');");
        assert_eq!(value, Value::Number(350.0));
        let (_, value) = eval_source("parseFloat('.5');");
        assert_eq!(value, Value::Number(0.5));
        let (_, value) = eval_source("parseFloat('1e');");
        assert_eq!(value, Value::Number(1.0));
        let (_, value) = eval_source("isNaN(parseFloat('x'));");
        assert_eq!(value, Value::Boolean(true));
    }

    #[test]
    fn test_is_nan_is_finite() {
        let (_, value) = eval_source("isNaN('abc') + ':' + isFinite('12') + ':' + isFinite(1/0);");
        assert_eq!(value, Value::String("true:true:false".to_string()));
    }
}
