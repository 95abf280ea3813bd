//! Number and Boolean constructors and prototype methods.

use core_types::{number_to_string, ErrorKind, Value};
use interpreter::{Interpreter, Thrown};

use crate::{arg, install_constructor, install_method, to_num};

pub(crate) fn install(interp: &mut Interpreter) {
    let number_proto = interp.protos.number;
    install_constructor(interp, "Number", "Number", number_proto);
    install_method(interp, number_proto, "toString", "Number.prototype.toString");
    install_method(interp, number_proto, "toFixed", "Number.prototype.toFixed");
    install_method(interp, number_proto, "valueOf", "Number.prototype.valueOf");

    let boolean_proto = interp.protos.boolean;
    install_constructor(interp, "Boolean", "Boolean", boolean_proto);
    install_method(interp, boolean_proto, "toString", "Boolean.prototype.toString");
}

pub(crate) fn constructor(
    interp: &mut Interpreter,
    _this: Value,
    args: &[Value],
) -> Result<Value, Thrown> {
    Ok(Value::Number(match args.first() {
        None => 0.0,
        Some(v) => to_num(interp, v),
    }))
}

/// Digits for radix conversion.
const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Renders a number in an arbitrary radix; fractional digits are truncated
/// after a fixed precision.
fn to_radix_string(mut n: f64, radix: u32) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    let negative = n < 0.0;
    if negative {
        n = -n;
    }
    let mut integer = n.trunc();
    let mut fraction = n - integer;
    let mut digits = Vec::new();
    if integer == 0.0 {
        digits.push(b'0');
    }
    while integer >= 1.0 {
        let d = (integer % radix as f64) as usize;
        digits.push(DIGITS[d]);
        integer = (integer / radix as f64).trunc();
    }
    digits.reverse();
    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.push_str(std::str::from_utf8(&digits).expect("radix digits are ascii"));
    if fraction > 0.0 {
        out.push('.');
        for _ in 0..20 {
            fraction *= radix as f64;
            let d = fraction.trunc() as usize;
            out.push(DIGITS[d] as char);
            fraction -= fraction.trunc();
            if fraction <= 0.0 {
                break;
            }
        }
    }
    out
}

pub(crate) fn to_string(
    interp: &mut Interpreter,
    this: Value,
    args: &[Value],
) -> Result<Value, Thrown> {
    let n = to_num(interp, &this);
    let radix = match arg(args, 0) {
        Value::Undefined => 10,
        v => to_num(interp, &v) as i64,
    };
    if !(2..=36).contains(&radix) {
        return Err(interp.throw_error(
            ErrorKind::RangeError,
            "toString() radix must be between 2 and 36",
        ));
    }
    Ok(Value::String(if radix == 10 {
        number_to_string(n)
    } else {
        to_radix_string(n, radix as u32)
    }))
}

pub(crate) fn to_fixed(
    interp: &mut Interpreter,
    this: Value,
    args: &[Value],
) -> Result<Value, Thrown> {
    let n = to_num(interp, &this);
    let digits = match arg(args, 0) {
        Value::Undefined => 0.0,
        v => to_num(interp, &v),
    };
    if !(0.0..=100.0).contains(&digits) {
        return Err(interp.throw_error(
            ErrorKind::RangeError,
            "toFixed() digits argument must be between 0 and 100",
        ));
    }
    if n.is_nan() {
        return Ok(Value::String("NaN".to_string()));
    }
    Ok(Value::String(format!("{:.*}", digits as usize, n)))
}

pub(crate) fn value_of(
    interp: &mut Interpreter,
    this: Value,
    _args: &[Value],
) -> Result<Value, Thrown> {
    Ok(Value::Number(to_num(interp, &this)))
}

pub(crate) fn boolean_constructor(
    _interp: &mut Interpreter,
    _this: Value,
    args: &[Value],
) -> Result<Value, Thrown> {
    Ok(Value::Boolean(arg(args, 0).is_truthy()))
}

pub(crate) fn boolean_to_string(
    _interp: &mut Interpreter,
    this: Value,
    _args: &[Value],
) -> Result<Value, Thrown> {
    Ok(Value::String(
        if this.is_truthy() { "true" } else { "false" }.to_string(),
    ))
}
