//! The JSON object, backed by serde_json.

use core_types::{ErrorKind, ObjectId, Value};
use interpreter::{Interpreter, ObjectData, Thrown};
use serde_json::Value as Json;

use crate::{arg, install_method, to_num, to_str};

pub(crate) fn install(interp: &mut Interpreter) {
    let json = interp.create_plain_object();
    install_method(interp, json, "parse", "JSON.parse");
    install_method(interp, json, "stringify", "JSON.stringify");
    let scope = interp.global_scope;
    interp
        .heap
        .scope_mut(scope)
        .declare("JSON", Value::Object(json), true);
}

fn json_to_value(interp: &mut Interpreter, json: &Json) -> Value {
    match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Boolean(*b),
        Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        Json::String(s) => Value::String(s.clone()),
        Json::Array(items) => {
            let values: Vec<Value> = items.iter().map(|j| json_to_value(interp, j)).collect();
            Value::Object(interp.create_array_from(&values))
        }
        Json::Object(map) => {
            let id = interp.create_plain_object();
            for (key, item) in map {
                let value = json_to_value(interp, item);
                interp
                    .heap
                    .object_mut(id)
                    .properties
                    .insert(key.clone(), value);
            }
            Value::Object(id)
        }
    }
}

pub(crate) fn parse(interp: &mut Interpreter, _t: Value, args: &[Value]) -> Result<Value, Thrown> {
    let text = to_str(interp, &arg(args, 0));
    match serde_json::from_str::<Json>(&text) {
        Ok(json) => Ok(json_to_value(interp, &json)),
        Err(e) => Err(interp.throw_error(ErrorKind::SyntaxError, &format!("Invalid JSON: {}", e))),
    }
}

/// Converts a runtime value to a JSON tree; `None` means the value is not
/// representable (undefined or a function) and should be skipped or
/// nulled by the caller.
fn value_to_json(
    interp: &mut Interpreter,
    value: &Value,
    visiting: &mut Vec<ObjectId>,
) -> Result<Option<Json>, Thrown> {
    Ok(match value {
        Value::Undefined => None,
        Value::Null => Some(Json::Null),
        Value::Boolean(b) => Some(Json::Bool(*b)),
        Value::Number(n) => Some(match serde_json::Number::from_f64(*n) {
            Some(num) => Json::Number(num),
            None => Json::Null, // NaN and infinities serialize as null
        }),
        Value::String(s) => Some(Json::String(s.clone())),
        Value::Object(id) => {
            if visiting.contains(id) {
                return Err(interp.throw_error(
                    ErrorKind::TypeError,
                    "Converting circular structure to JSON",
                ));
            }
            let data = interp.heap.object(*id).data.clone();
            match data {
                ObjectData::Function(_) => None,
                ObjectData::Date { .. } => Some(Json::String(to_str(interp, value))),
                ObjectData::Array { length } => {
                    visiting.push(*id);
                    let mut items = Vec::with_capacity(length as usize);
                    for i in 0..length {
                        let element = interp.get_property(value, &i.to_string())?;
                        items.push(
                            value_to_json(interp, &element, visiting)?.unwrap_or(Json::Null),
                        );
                    }
                    visiting.pop();
                    Some(Json::Array(items))
                }
                _ => {
                    visiting.push(*id);
                    let keys = interp.heap.own_enumerable_keys(*id);
                    let mut map = serde_json::Map::new();
                    for key in keys {
                        let prop = interp.get_property(value, &key)?;
                        if let Some(json) = value_to_json(interp, &prop, visiting)? {
                            map.insert(key, json);
                        }
                    }
                    visiting.pop();
                    Some(Json::Object(map))
                }
            }
        }
    })
}

pub(crate) fn stringify(
    interp: &mut Interpreter,
    _t: Value,
    args: &[Value],
) -> Result<Value, Thrown> {
    let value = arg(args, 0);
    // The replacer argument is accepted and ignored; function replacers
    // cannot run inside a native call.
    let indent = match arg(args, 2) {
        Value::Undefined | Value::Null => None,
        v @ Value::Number(_) => {
            let n = to_num(interp, &v).clamp(0.0, 10.0) as usize;
            if n == 0 {
                None
            } else {
                Some(" ".repeat(n))
            }
        }
        v => {
            let s = to_str(interp, &v);
            let s: String = s.chars().take(10).collect();
            if s.is_empty() {
                None
            } else {
                Some(s)
            }
        }
    };
    let mut visiting = Vec::new();
    let json = match value_to_json(interp, &value, &mut visiting)? {
        Some(json) => json,
        None => return Ok(Value::Undefined),
    };
    let text = match indent {
        None => serde_json::to_string(&json),
        Some(indent) => {
            let mut out = Vec::new();
            let formatter =
                serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
            let mut serializer =
                serde_json::Serializer::with_formatter(&mut out, formatter);
            serde::Serialize::serialize(&json, &mut serializer)
                .map(|_| String::from_utf8_lossy(&out).into_owned())
        }
    };
    match text {
        Ok(text) => Ok(Value::String(text)),
        Err(e) => Err(interp.throw_error(ErrorKind::TypeError, &format!("JSON error: {}", e))),
    }
}

#[cfg(test)]
mod tests {
    use crate::tests::eval_source;
    use core_types::Value;

    #[test]
    fn test_parse_object() {
        let (_, value) = eval_source(
            "var o = JSON.parse('{\"a\": [1, 2, {\"b\": true}], \"c\": null}');\
             o.a[2].b + ':' + o.a.length + ':' + (o.c === null);",
        );
        assert_eq!(value, Value::String("true:3:true".to_string()));
    }

    #[test]
    fn test_parse_error_is_syntax_error() {
        let (_, value) = eval_source(
            "var k = ''; try { JSON.parse('{oops'); } catch (e) { k = e.name; } k;",
        );
        assert_eq!(value, Value::String("SyntaxError".to_string()));
    }

    #[test]
    fn test_stringify_round_trip() {
        let (_, value) = eval_source(
            "JSON.stringify({ a: 1, b: 'x', c: [true, null], d: undefined });",
        );
        assert_eq!(
            value,
            Value::String("{\"a\":1,\"b\":\"x\",\"c\":[true,null]}".to_string())
        );
    }

    #[test]
    fn test_stringify_skips_functions_and_nulls_in_arrays() {
        let (_, value) = eval_source("JSON.stringify([1, function(){}, 2]);");
        assert_eq!(value, Value::String("[1,null,2]".to_string()));
    }

    #[test]
    fn test_stringify_cycle_is_type_error() {
        let (_, value) = eval_source(
            "var o = {}; o.me = o;\
             var k = ''; try { JSON.stringify(o); } catch (e) { k = e.name; } k;",
        );
        assert_eq!(value, Value::String("TypeError".to_string()));
    }

    #[test]
    fn test_stringify_with_space() {
        let (_, value) = eval_source("JSON.stringify({ a: 1 }, null, 2);");
        assert_eq!(value, Value::String("{\n  \"a\": 1\n}".to_string()));
    }

    #[test]
    fn test_stringify_top_level_undefined() {
        let (_, value) = eval_source("typeof JSON.stringify(undefined);");
        assert_eq!(value, Value::String("undefined".to_string()));
    }
}
