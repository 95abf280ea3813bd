//! The URI encoding family and the legacy escape/unescape pair.

use core_types::{ErrorKind, Value};
use interpreter::{Interpreter, Thrown};

use crate::{arg, native_fn, to_str};

pub(crate) fn install(interp: &mut Interpreter) {
    for name in [
        "encodeURI",
        "decodeURI",
        "encodeURIComponent",
        "decodeURIComponent",
        "escape",
        "unescape",
    ] {
        let func = native_fn(interp, name);
        let scope = interp.global_scope;
        interp
            .heap
            .scope_mut(scope)
            .declare(name, Value::Object(func), true);
    }
}

const UNRESERVED: &str = "-_.!~*'()";
const URI_RESERVED: &str = "#$&+,/:;=?@";

fn percent_encode(input: &str, keep_reserved: bool) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        let keep = c.is_ascii_alphanumeric()
            || UNRESERVED.contains(c)
            || (keep_reserved && URI_RESERVED.contains(c));
        if keep {
            out.push(c);
        } else {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).as_bytes() {
                out.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    out
}

fn percent_decode(interp: &mut Interpreter, input: &str) -> Result<String, Thrown> {
    let malformed = |interp: &mut Interpreter| {
        interp.throw_error(ErrorKind::URIError, "URI malformed")
    };
    let bytes = input.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if i + 3 > bytes.len() {
                return Err(malformed(interp));
            }
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3])
                .ok()
                .and_then(|h| u8::from_str_radix(h, 16).ok());
            match hex {
                Some(byte) => decoded.push(byte),
                None => return Err(malformed(interp)),
            }
            i += 3;
        } else {
            decoded.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(decoded).map_err(|_| malformed(interp))
}

pub(crate) fn encode_uri(
    interp: &mut Interpreter,
    _t: Value,
    args: &[Value],
) -> Result<Value, Thrown> {
    let s = to_str(interp, &arg(args, 0));
    Ok(Value::String(percent_encode(&s, true)))
}

pub(crate) fn encode_uri_component(
    interp: &mut Interpreter,
    _t: Value,
    args: &[Value],
) -> Result<Value, Thrown> {
    let s = to_str(interp, &arg(args, 0));
    Ok(Value::String(percent_encode(&s, false)))
}

pub(crate) fn decode_uri(
    interp: &mut Interpreter,
    _t: Value,
    args: &[Value],
) -> Result<Value, Thrown> {
    let s = to_str(interp, &arg(args, 0));
    percent_decode(interp, &s).map(Value::String)
}

pub(crate) fn decode_uri_component(
    interp: &mut Interpreter,
    _t: Value,
    args: &[Value],
) -> Result<Value, Thrown> {
    let s = to_str(interp, &arg(args, 0));
    percent_decode(interp, &s).map(Value::String)
}

pub(crate) fn escape(interp: &mut Interpreter, _t: Value, args: &[Value]) -> Result<Value, Thrown> {
    let s = to_str(interp, &arg(args, 0));
    let mut out = String::new();
    for c in s.chars() {
        if c.is_ascii_alphanumeric() || "@*_+-./".contains(c) {
            out.push(c);
        } else {
            let code = c as u32;
            if code < 256 {
                out.push_str(&format!("%{:02X}", code));
            } else {
                out.push_str(&format!("%u{:04X}", code));
            }
        }
    }
    Ok(Value::String(out))
}

pub(crate) fn unescape(
    interp: &mut Interpreter,
    _t: Value,
    args: &[Value],
) -> Result<Value, Thrown> {
    let s = to_str(interp, &arg(args, 0));
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::new();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '%' {
            if i + 6 <= chars.len() && chars.get(i + 1) == Some(&'u') {
                let hex: String = chars[i + 2..i + 6].iter().collect();
                if let Ok(code) = u32::from_str_radix(&hex, 16) {
                    if let Some(c) = char::from_u32(code) {
                        out.push(c);
                        i += 6;
                        continue;
                    }
                }
            }
            if i + 2 < chars.len() {
                let hex: String = chars[i + 1..i + 3].iter().collect();
                if let Ok(code) = u32::from_str_radix(&hex, 16) {
                    if let Some(c) = char::from_u32(code) {
                        out.push(c);
                        i += 3;
                        continue;
                    }
                }
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    Ok(Value::String(out))
}

#[cfg(test)]
mod tests {
    use crate::tests::eval_source;
    use core_types::Value;

    #[test]
    fn test_component_round_trip() {
        let (_, value) = eval_source(
            "decodeURIComponent(encodeURIComponent('a b/č?'));",
        );
        assert_eq!(value, Value::String("a b/č?".to_string()));
    }

    #[test]
    fn test_encode_uri_keeps_reserved() {
        let (_, value) = eval_source("encodeURI('http://x.y/a b?q=1');");
        assert_eq!(
            value,
            Value::String("http://x.y/a%20b?q=1".to_string())
        );
        let (_, value) = eval_source("encodeURIComponent('a/b');");
        assert_eq!(value, Value::String("a%2Fb".to_string()));
    }

    #[test]
    fn test_malformed_uri_error() {
        let (_, value) = eval_source(
            "var k = ''; try { decodeURIComponent('%zz'); } catch (e) { k = e.name; } k;",
        );
        assert_eq!(value, Value::String("URIError".to_string()));
    }

    #[test]
    fn test_escape_unescape() {
        let (_, value) = eval_source("escape('a b');");
        assert_eq!(value, Value::String("a%20b".to_string()));
        let (_, value) = eval_source("unescape('%41%u0042');");
        assert_eq!(value, Value::String("AB".to_string()));
    }
}
