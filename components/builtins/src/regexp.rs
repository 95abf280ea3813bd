//! RegExp constructor and prototype methods.
//!
//! Patterns compile lazily through the interpreter's regex cache; only the
//! pattern source and flags live on the heap object, so snapshots carry no
//! compiled state. Global regexes advance `lastIndex` the way the language
//! specifies.

use core_types::{ErrorKind, Value};
use interpreter::{Interpreter, Thrown};

use crate::string::{match_result, regex_of};
use crate::{arg, install_constructor, install_method, to_num, to_str};

pub(crate) fn install(interp: &mut Interpreter) {
    let proto = interp.protos.regexp;
    install_constructor(interp, "RegExp", "RegExp", proto);
    install_method(interp, proto, "test", "RegExp.prototype.test");
    install_method(interp, proto, "exec", "RegExp.prototype.exec");
    install_method(interp, proto, "toString", "RegExp.prototype.toString");
}

pub(crate) fn constructor(
    interp: &mut Interpreter,
    _this: Value,
    args: &[Value],
) -> Result<Value, Thrown> {
    let (pattern, flags) = match regex_of(interp, &arg(args, 0)) {
        Some((_, pattern, flags)) => {
            // Re-wrapping an existing regex copies it; explicit flags win.
            let flags = match arg(args, 1) {
                Value::Undefined => flags,
                v => to_str(interp, &v),
            };
            (pattern, flags)
        }
        None => {
            let pattern = match arg(args, 0) {
                Value::Undefined => String::new(),
                v => to_str(interp, &v),
            };
            let flags = match arg(args, 1) {
                Value::Undefined => String::new(),
                v => to_str(interp, &v),
            };
            (pattern, flags)
        }
    };
    for flag in flags.chars() {
        if !"gim".contains(flag) {
            return Err(interp.throw_error(
                ErrorKind::SyntaxError,
                &format!("Invalid regular expression flag '{}'", flag),
            ));
        }
    }
    // Compile now so a bad pattern fails at construction time.
    interp.compiled_regex(&pattern, &flags)?;
    Ok(Value::Object(interp.create_regex(&pattern, &flags)))
}

/// The receiver's regex internals, or a TypeError.
fn this_regex(
    interp: &mut Interpreter,
    this: &Value,
) -> Result<(core_types::ObjectId, String, String), Thrown> {
    regex_of(interp, this)
        .ok_or_else(|| interp.throw_error(ErrorKind::TypeError, "Receiver is not a RegExp"))
}

/// Byte offset of the character index `n`, clamping past the end.
fn byte_offset(s: &str, n: usize) -> usize {
    s.char_indices()
        .nth(n)
        .map(|(off, _)| off)
        .unwrap_or(s.len())
}

fn char_count(s: &str, byte_offset: usize) -> usize {
    s[..byte_offset].chars().count()
}

/// Runs the receiver against `input` honoring lastIndex for /g/ regexes;
/// returns the captures and updates lastIndex.
fn run_match(
    interp: &mut Interpreter,
    this: &Value,
    input: &str,
) -> Result<Option<(usize, usize)>, Thrown> {
    let (_id, pattern, flags) = this_regex(interp, this)?;
    let global = flags.contains('g');
    let re = interp.compiled_regex(&pattern, &flags)?;

    let last_index = if global {
        let v = interp.get_property(this, "lastIndex")?;
        let n = to_num(interp, &v);
        if n < 0.0 || n.is_nan() {
            0
        } else {
            n as usize
        }
    } else {
        0
    };
    if last_index > input.chars().count() {
        if global {
            interp.set_property(this, "lastIndex", Value::Number(0.0))?;
        }
        return Ok(None);
    }

    let start = byte_offset(input, last_index);
    match re.find_at(input, start) {
        Some(m) => {
            if global {
                let end = char_count(input, m.end());
                interp.set_property(this, "lastIndex", Value::Number(end as f64))?;
            }
            Ok(Some((m.start(), m.end())))
        }
        None => {
            if global {
                interp.set_property(this, "lastIndex", Value::Number(0.0))?;
            }
            Ok(None)
        }
    }
}

pub(crate) fn test(interp: &mut Interpreter, this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let input = to_str(interp, &arg(args, 0));
    Ok(Value::Boolean(run_match(interp, &this, &input)?.is_some()))
}

pub(crate) fn exec(interp: &mut Interpreter, this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let input = to_str(interp, &arg(args, 0));
    let matched = run_match(interp, &this, &input)?;
    let (start, _) = match matched {
        Some(span) => span,
        None => return Ok(Value::Null),
    };
    // Re-run capture groups at the matched position.
    let (_, pattern, flags) = this_regex(interp, &this)?;
    let re = interp.compiled_regex(&pattern, &flags)?;
    match re.captures_at(&input, start) {
        Some(captures) => Ok(match_result(interp, &input, &captures)),
        None => Ok(Value::Null),
    }
}

pub(crate) fn to_string(
    interp: &mut Interpreter,
    this: Value,
    _args: &[Value],
) -> Result<Value, Thrown> {
    let (_, pattern, flags) = this_regex(interp, &this)?;
    Ok(Value::String(format!("/{}/{}", pattern, flags)))
}

#[cfg(test)]
mod tests {
    use crate::tests::eval_source;
    use core_types::Value;

    #[test]
    fn test_test_and_flags() {
        let (_, value) = eval_source("/ab+c/.test('xabbc') + ':' + /ab/.test('xy');");
        assert_eq!(value, Value::String("true:false".to_string()));
        let (_, value) = eval_source("/ABC/i.test('abc');");
        assert_eq!(value, Value::Boolean(true));
    }

    #[test]
    fn test_exec_captures_and_index() {
        let (_, value) = eval_source(
            "var m = /(\\d+)-(\\d+)/.exec('a 12-34 z');\
             m[0] + '|' + m[1] + '|' + m[2] + '|' + m.index;",
        );
        assert_eq!(value, Value::String("12-34|12|34|2".to_string()));
    }

    #[test]
    fn test_global_last_index_advances() {
        let (_, value) = eval_source(
            "var re = /\\d+/g;\
             var a = re.exec('x1 22 y')[0];\
             var b = re.exec('x1 22 y')[0];\
             var c = re.exec('x1 22 y');\
             a + ',' + b + ',' + (c === null) + ',' + re.lastIndex;",
        );
        assert_eq!(value, Value::String("1,22,true,0".to_string()));
    }

    #[test]
    fn test_constructor_from_string() {
        let (_, value) = eval_source("new RegExp('a.c').test('abc');");
        assert_eq!(value, Value::Boolean(true));
        let (_, value) = eval_source(
            "var k = ''; try { new RegExp('a', 'z'); } catch (e) { k = e.name; } k;",
        );
        assert_eq!(value, Value::String("SyntaxError".to_string()));
    }

    #[test]
    fn test_to_string_shows_source() {
        let (_, value) = eval_source("/a[b]/gi.toString();");
        assert_eq!(value, Value::String("/a[b]/gi".to_string()));
    }
}
