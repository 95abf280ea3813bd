//! The Math object.

use core_types::Value;
use interpreter::{Interpreter, PropFlags, Thrown};

use crate::{arg, install_method, to_num};

pub(crate) fn install(interp: &mut Interpreter) {
    let math = interp.create_plain_object();
    for (key, name) in [
        ("abs", "Math.abs"),
        ("ceil", "Math.ceil"),
        ("floor", "Math.floor"),
        ("round", "Math.round"),
        ("sqrt", "Math.sqrt"),
        ("pow", "Math.pow"),
        ("sin", "Math.sin"),
        ("cos", "Math.cos"),
        ("tan", "Math.tan"),
        ("asin", "Math.asin"),
        ("acos", "Math.acos"),
        ("atan", "Math.atan"),
        ("atan2", "Math.atan2"),
        ("log", "Math.log"),
        ("exp", "Math.exp"),
        ("min", "Math.min"),
        ("max", "Math.max"),
        ("random", "Math.random"),
    ] {
        install_method(interp, math, key, name);
    }
    for (key, value) in [
        ("PI", std::f64::consts::PI),
        ("E", std::f64::consts::E),
        ("LN2", std::f64::consts::LN_2),
        ("LN10", std::f64::consts::LN_10),
        ("LOG2E", std::f64::consts::LOG2_E),
        ("LOG10E", std::f64::consts::LOG10_E),
        ("SQRT2", std::f64::consts::SQRT_2),
        ("SQRT1_2", std::f64::consts::FRAC_1_SQRT_2),
    ] {
        interp
            .define_property(math, key, Value::Number(value), PropFlags::frozen())
            .expect("installing Math constants cannot fail");
    }
    let scope = interp.global_scope;
    interp
        .heap
        .scope_mut(scope)
        .declare("Math", Value::Object(math), true);
}

fn unary(
    interp: &mut Interpreter,
    args: &[Value],
    f: impl FnOnce(f64) -> f64,
) -> Result<Value, Thrown> {
    let n = to_num(interp, &arg(args, 0));
    Ok(Value::Number(f(n)))
}

pub(crate) fn abs(interp: &mut Interpreter, _t: Value, args: &[Value]) -> Result<Value, Thrown> {
    unary(interp, args, f64::abs)
}

pub(crate) fn ceil(interp: &mut Interpreter, _t: Value, args: &[Value]) -> Result<Value, Thrown> {
    unary(interp, args, f64::ceil)
}

pub(crate) fn floor(interp: &mut Interpreter, _t: Value, args: &[Value]) -> Result<Value, Thrown> {
    unary(interp, args, f64::floor)
}

pub(crate) fn round(interp: &mut Interpreter, _t: Value, args: &[Value]) -> Result<Value, Thrown> {
    // Halfway cases round toward positive infinity, so -1.5 rounds to -1.
    unary(interp, args, |x| {
        if x.fract() == 0.5 || x.fract() == -0.5 {
            x.ceil()
        } else {
            x.round()
        }
    })
}

pub(crate) fn sqrt(interp: &mut Interpreter, _t: Value, args: &[Value]) -> Result<Value, Thrown> {
    unary(interp, args, f64::sqrt)
}

pub(crate) fn pow(interp: &mut Interpreter, _t: Value, args: &[Value]) -> Result<Value, Thrown> {
    let base = to_num(interp, &arg(args, 0));
    let exponent = to_num(interp, &arg(args, 1));
    Ok(Value::Number(base.powf(exponent)))
}

pub(crate) fn sin(interp: &mut Interpreter, _t: Value, args: &[Value]) -> Result<Value, Thrown> {
    unary(interp, args, f64::sin)
}

pub(crate) fn cos(interp: &mut Interpreter, _t: Value, args: &[Value]) -> Result<Value, Thrown> {
    unary(interp, args, f64::cos)
}

pub(crate) fn tan(interp: &mut Interpreter, _t: Value, args: &[Value]) -> Result<Value, Thrown> {
    unary(interp, args, f64::tan)
}

pub(crate) fn asin(interp: &mut Interpreter, _t: Value, args: &[Value]) -> Result<Value, Thrown> {
    unary(interp, args, f64::asin)
}

pub(crate) fn acos(interp: &mut Interpreter, _t: Value, args: &[Value]) -> Result<Value, Thrown> {
    unary(interp, args, f64::acos)
}

pub(crate) fn atan(interp: &mut Interpreter, _t: Value, args: &[Value]) -> Result<Value, Thrown> {
    unary(interp, args, f64::atan)
}

pub(crate) fn atan2(interp: &mut Interpreter, _t: Value, args: &[Value]) -> Result<Value, Thrown> {
    let y = to_num(interp, &arg(args, 0));
    let x = to_num(interp, &arg(args, 1));
    Ok(Value::Number(y.atan2(x)))
}

pub(crate) fn log(interp: &mut Interpreter, _t: Value, args: &[Value]) -> Result<Value, Thrown> {
    unary(interp, args, f64::ln)
}

pub(crate) fn exp(interp: &mut Interpreter, _t: Value, args: &[Value]) -> Result<Value, Thrown> {
    unary(interp, args, f64::exp)
}

pub(crate) fn min(interp: &mut Interpreter, _t: Value, args: &[Value]) -> Result<Value, Thrown> {
    let mut result = f64::INFINITY;
    for v in args {
        let n = to_num(interp, v);
        if n.is_nan() {
            return Ok(Value::Number(f64::NAN));
        }
        if n < result {
            result = n;
        }
    }
    Ok(Value::Number(result))
}

pub(crate) fn max(interp: &mut Interpreter, _t: Value, args: &[Value]) -> Result<Value, Thrown> {
    let mut result = f64::NEG_INFINITY;
    for v in args {
        let n = to_num(interp, v);
        if n.is_nan() {
            return Ok(Value::Number(f64::NAN));
        }
        if n > result {
            result = n;
        }
    }
    Ok(Value::Number(result))
}

pub(crate) fn random(
    _interp: &mut Interpreter,
    _t: Value,
    _args: &[Value],
) -> Result<Value, Thrown> {
    // Time-seeded linear congruential step; good enough for scripting use.
    use std::time::{SystemTime, UNIX_EPOCH};
    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let x = (seed.wrapping_mul(1103515245).wrapping_add(12345)) as f64;
    Ok(Value::Number((x / u128::MAX as f64).abs() % 1.0))
}

#[cfg(test)]
mod tests {
    use crate::tests::eval_source;
    use core_types::Value;

    #[test]
    fn test_basic_functions() {
        let (_, value) = eval_source("Math.abs(-4) + Math.floor(2.9) + Math.sqrt(9);");
        assert_eq!(value, Value::Number(9.0));
    }

    #[test]
    fn test_round_halfway() {
        let (_, value) = eval_source("Math.round(1.5) + ':' + Math.round(-1.5);");
        assert_eq!(value, Value::String("2:-1".to_string()));
    }

    #[test]
    fn test_min_max_with_nan() {
        let (_, value) = eval_source("Math.max(1, 5, 3) + Math.min(4, 2);");
        assert_eq!(value, Value::Number(7.0));
        let (_, value) = eval_source("isNaN(Math.max(1, NaN));");
        assert_eq!(value, Value::Boolean(true));
    }

    #[test]
    fn test_constants() {
        let (_, value) = eval_source("Math.PI > 3.14 && Math.PI < 3.15;");
        assert_eq!(value, Value::Boolean(true));
    }

    #[test]
    fn test_random_range() {
        let (_, value) = eval_source("var r = Math.random(); r >= 0 && r < 1;");
        assert_eq!(value, Value::Boolean(true));
    }
}
