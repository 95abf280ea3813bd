//! String constructor and String.prototype methods.
//!
//! The receiver of a string method is the primitive string itself (there
//! are no wrapper objects in the value model); indices are character
//! based.

use core_types::{ErrorKind, ObjectId, Value};
use interpreter::{Interpreter, ObjectData, Thrown};

use crate::{arg, install_constructor, install_method, to_num, to_str};

pub(crate) fn install(interp: &mut Interpreter) {
    let proto = interp.protos.string;
    install_constructor(interp, "String", "String", proto);
    install_method(interp, proto, "charAt", "String.prototype.charAt");
    install_method(interp, proto, "substring", "String.prototype.substring");
    install_method(interp, proto, "slice", "String.prototype.slice");
    install_method(interp, proto, "indexOf", "String.prototype.indexOf");
    install_method(interp, proto, "search", "String.prototype.search");
    install_method(interp, proto, "match", "String.prototype.match");
    install_method(interp, proto, "replace", "String.prototype.replace");
    install_method(interp, proto, "split", "String.prototype.split");
    install_method(interp, proto, "toLowerCase", "String.prototype.toLowerCase");
    install_method(interp, proto, "toUpperCase", "String.prototype.toUpperCase");
    install_method(interp, proto, "trim", "String.prototype.trim");
    install_method(interp, proto, "toString", "String.prototype.toString");
}

pub(crate) fn constructor(
    interp: &mut Interpreter,
    _this: Value,
    args: &[Value],
) -> Result<Value, Thrown> {
    Ok(Value::String(match args.first() {
        None => String::new(),
        Some(v) => to_str(interp, v),
    }))
}

pub(crate) fn to_string(
    interp: &mut Interpreter,
    this: Value,
    _args: &[Value],
) -> Result<Value, Thrown> {
    Ok(Value::String(to_str(interp, &this)))
}

/// The regex internals of a value, when it is a regex object.
pub(crate) fn regex_of(interp: &Interpreter, value: &Value) -> Option<(ObjectId, String, String)> {
    let id = value.as_object()?;
    match &interp.heap.object(id).data {
        ObjectData::Regex { pattern, flags } => Some((id, pattern.clone(), flags.clone())),
        _ => None,
    }
}

fn chars_of(s: &str) -> Vec<char> {
    s.chars().collect()
}

/// Clamps a relative index; negatives count from the end for slice-style
/// methods.
fn clamp_relative(n: f64, length: usize) -> usize {
    if n.is_nan() {
        return 0;
    }
    if n < 0.0 {
        let from_end = length as f64 + n;
        if from_end < 0.0 {
            0
        } else {
            from_end as usize
        }
    } else if n >= length as f64 {
        length
    } else {
        n as usize
    }
}

pub(crate) fn char_at(interp: &mut Interpreter, this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let s = to_str(interp, &this);
    let i = to_num(interp, &arg(args, 0));
    let chars = chars_of(&s);
    Ok(Value::String(
        if i.is_nan() || i < 0.0 || i >= chars.len() as f64 {
            String::new()
        } else {
            chars[i as usize].to_string()
        },
    ))
}

pub(crate) fn substring(
    interp: &mut Interpreter,
    this: Value,
    args: &[Value],
) -> Result<Value, Thrown> {
    let s = to_str(interp, &this);
    let chars = chars_of(&s);
    let a = to_num(interp, &arg(args, 0));
    let mut start = if a.is_nan() || a < 0.0 {
        0
    } else {
        (a as usize).min(chars.len())
    };
    let mut end = match arg(args, 1) {
        Value::Undefined => chars.len(),
        v => {
            let b = to_num(interp, &v);
            if b.is_nan() || b < 0.0 {
                0
            } else {
                (b as usize).min(chars.len())
            }
        }
    };
    if start > end {
        std::mem::swap(&mut start, &mut end);
    }
    Ok(Value::String(chars[start..end].iter().collect()))
}

pub(crate) fn slice(interp: &mut Interpreter, this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let s = to_str(interp, &this);
    let chars = chars_of(&s);
    let start = clamp_relative(to_num(interp, &arg(args, 0)), chars.len());
    let end = match arg(args, 1) {
        Value::Undefined => chars.len(),
        v => clamp_relative(to_num(interp, &v), chars.len()),
    };
    Ok(Value::String(if start < end {
        chars[start..end].iter().collect()
    } else {
        String::new()
    }))
}

/// Character index of `needle` in `haystack` at or after `from`.
fn find_from(haystack: &[char], needle: &[char], from: usize) -> Option<usize> {
    if needle.is_empty() {
        return Some(from.min(haystack.len()));
    }
    if needle.len() > haystack.len() {
        return None;
    }
    (from..=haystack.len() - needle.len()).find(|&i| haystack[i..i + needle.len()] == *needle)
}

pub(crate) fn index_of(
    interp: &mut Interpreter,
    this: Value,
    args: &[Value],
) -> Result<Value, Thrown> {
    let s = to_str(interp, &this);
    let needle = to_str(interp, &arg(args, 0));
    let haystack = chars_of(&s);
    let from = match arg(args, 1) {
        Value::Undefined => 0,
        v => clamp_relative(to_num(interp, &v).max(0.0), haystack.len()),
    };
    Ok(Value::Number(
        match find_from(&haystack, &chars_of(&needle), from) {
            Some(i) => i as f64,
            None => -1.0,
        },
    ))
}

/// Byte offset to character index conversion for regex match positions.
fn char_index(s: &str, byte_offset: usize) -> usize {
    s[..byte_offset].chars().count()
}

/// The compiled regex for a pattern argument; a plain string argument is
/// escaped literally.
fn regex_argument(
    interp: &mut Interpreter,
    value: &Value,
) -> Result<(regex::Regex, bool), Thrown> {
    match regex_of(interp, value) {
        Some((_, pattern, flags)) => {
            let re = interp.compiled_regex(&pattern, &flags)?;
            Ok((re, flags.contains('g')))
        }
        None => {
            let literal = regex::escape(&to_str(interp, value));
            let re = interp.compiled_regex(&literal, "")?;
            Ok((re, false))
        }
    }
}

pub(crate) fn search(interp: &mut Interpreter, this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let s = to_str(interp, &this);
    let (re, _) = regex_argument(interp, &arg(args, 0))?;
    Ok(Value::Number(match re.find(&s) {
        Some(m) => char_index(&s, m.start()) as f64,
        None => -1.0,
    }))
}

/// Builds the exec-style result array: full match plus capture groups,
/// with `index` and `input` properties.
pub(crate) fn match_result(
    interp: &mut Interpreter,
    input: &str,
    captures: &regex::Captures,
) -> Value {
    let values: Vec<Value> = captures
        .iter()
        .map(|m| match m {
            Some(m) => Value::String(m.as_str().to_string()),
            None => Value::Undefined,
        })
        .collect();
    let array = interp.create_array_from(&values);
    let whole = captures.get(0).expect("group 0 always exists");
    let object = interp.heap.object_mut(array);
    object.properties.insert(
        "index".to_string(),
        Value::Number(char_index(input, whole.start()) as f64),
    );
    object
        .properties
        .insert("input".to_string(), Value::String(input.to_string()));
    Value::Object(array)
}

pub(crate) fn match_(interp: &mut Interpreter, this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let s = to_str(interp, &this);
    let (re, global) = regex_argument(interp, &arg(args, 0))?;
    if global {
        let values: Vec<Value> = re
            .find_iter(&s)
            .map(|m| Value::String(m.as_str().to_string()))
            .collect();
        if values.is_empty() {
            return Ok(Value::Null);
        }
        return Ok(Value::Object(interp.create_array_from(&values)));
    }
    match re.captures(&s) {
        Some(captures) => Ok(match_result(interp, &s, &captures)),
        None => Ok(Value::Null),
    }
}

/// Expands `$&`, `$1`-`$9` and `$$` in a replacement template.
fn expand_replacement(template: &str, captures: &regex::Captures) -> String {
    let mut out = String::new();
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('$') => {
                chars.next();
                out.push('$');
            }
            Some('&') => {
                chars.next();
                out.push_str(captures.get(0).map_or("", |m| m.as_str()));
            }
            Some(d) if d.is_ascii_digit() && *d != '0' => {
                let group = d.to_digit(10).expect("digit checked") as usize;
                chars.next();
                out.push_str(captures.get(group).map_or("", |m| m.as_str()));
            }
            _ => out.push('$'),
        }
    }
    out
}

pub(crate) fn replace(
    interp: &mut Interpreter,
    this: Value,
    args: &[Value],
) -> Result<Value, Thrown> {
    let s = to_str(interp, &this);
    let replacement = arg(args, 1);
    if replacement
        .as_object()
        .map(|id| interp.heap.object(id).is_function())
        .unwrap_or(false)
    {
        return Err(interp.throw_error(
            ErrorKind::TypeError,
            "Function replacement values are not supported",
        ));
    }
    let template = to_str(interp, &replacement);
    let (re, global) = regex_argument(interp, &arg(args, 0))?;
    let limit = if global { 0 } else { 1 };
    let result = re.replacen(&s, limit, |captures: &regex::Captures| {
        expand_replacement(&template, captures)
    });
    Ok(Value::String(result.into_owned()))
}

pub(crate) fn split(interp: &mut Interpreter, this: Value, args: &[Value]) -> Result<Value, Thrown> {
    let s = to_str(interp, &this);
    let separator = arg(args, 0);
    let limit = match arg(args, 1) {
        Value::Undefined => u32::MAX,
        v => interpreter::to_uint32(to_num(interp, &v)),
    };
    if matches!(separator, Value::Undefined) || limit == 0 {
        let values = if limit == 0 {
            Vec::new()
        } else {
            vec![Value::String(s)]
        };
        return Ok(Value::Object(interp.create_array_from(&values)));
    }
    let parts: Vec<String> = match regex_of(interp, &separator) {
        Some((_, pattern, flags)) => {
            let re = interp.compiled_regex(&pattern, &flags)?;
            re.split(&s).map(|p| p.to_string()).collect()
        }
        None => {
            let sep = to_str(interp, &separator);
            if sep.is_empty() {
                s.chars().map(|c| c.to_string()).collect()
            } else {
                s.split(&sep).map(|p| p.to_string()).collect()
            }
        }
    };
    let values: Vec<Value> = parts
        .into_iter()
        .take(limit as usize)
        .map(Value::String)
        .collect();
    Ok(Value::Object(interp.create_array_from(&values)))
}

pub(crate) fn to_lower_case(
    interp: &mut Interpreter,
    this: Value,
    _args: &[Value],
) -> Result<Value, Thrown> {
    let s = to_str(interp, &this);
    Ok(Value::String(s.to_lowercase()))
}

pub(crate) fn to_upper_case(
    interp: &mut Interpreter,
    this: Value,
    _args: &[Value],
) -> Result<Value, Thrown> {
    let s = to_str(interp, &this);
    Ok(Value::String(s.to_uppercase()))
}

pub(crate) fn trim(interp: &mut Interpreter, this: Value, _args: &[Value]) -> Result<Value, Thrown> {
    let s = to_str(interp, &this);
    Ok(Value::String(s.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use crate::tests::eval_source;
    use core_types::Value;

    #[test]
    fn test_char_at_and_indexing() {
        let (_, value) = eval_source("'hello'.charAt(1) + 'hello'[0] + 'hello'.length;");
        assert_eq!(value, Value::String("eh5".to_string()));
    }

    #[test]
    fn test_substring_swaps_and_clamps() {
        let (_, value) = eval_source("'abcdef'.substring(4, 1);");
        assert_eq!(value, Value::String("bcd".to_string()));
    }

    #[test]
    fn test_slice_negative() {
        let (_, value) = eval_source("'abcdef'.slice(-3, -1);");
        assert_eq!(value, Value::String("de".to_string()));
    }

    #[test]
    fn test_index_of() {
        let (_, value) = eval_source("'banana'.indexOf('an', 2);");
        assert_eq!(value, Value::Number(3.0));
        let (_, value) = eval_source("'banana'.indexOf('x');");
        assert_eq!(value, Value::Number(-1.0));
    }

    #[test]
    fn test_search_and_match() {
        let (_, value) = eval_source("'a1b22c'.search(/\\d+/);");
        assert_eq!(value, Value::Number(1.0));
        let (_, value) = eval_source("'a1b22c'.match(/\\d+/g).join('-');");
        assert_eq!(value, Value::String("1-22".to_string()));
        let (_, value) = eval_source("'a1b22c'.match(/x/);");
        assert_eq!(value, Value::Null);
    }

    #[test]
    fn test_replace_with_groups() {
        let (_, value) = eval_source("'john smith'.replace(/(\\w+) (\\w+)/, '$2 $1');");
        assert_eq!(value, Value::String("smith john".to_string()));
        // Non-global replaces only the first occurrence.
        let (_, value) = eval_source("'aaa'.replace('a', 'b');");
        assert_eq!(value, Value::String("baa".to_string()));
        let (_, value) = eval_source("'aaa'.replace(/a/g, 'b');");
        assert_eq!(value, Value::String("bbb".to_string()));
    }

    #[test]
    fn test_split() {
        let (_, value) = eval_source("'a,b,,c'.split(',').length;");
        assert_eq!(value, Value::Number(4.0));
        let (_, value) = eval_source("'abc'.split('').join('|');");
        assert_eq!(value, Value::String("a|b|c".to_string()));
        let (_, value) = eval_source("'a1b2c'.split(/\\d/).join('');");
        assert_eq!(value, Value::String("abc".to_string()));
    }

    #[test]
    fn test_case_and_trim() {
        let (_, value) = eval_source("'  MiXeD  '.trim().toLowerCase() + 'x'.toUpperCase();");
        assert_eq!(value, Value::String("mixedX".to_string()));
    }
}
