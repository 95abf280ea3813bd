//! Heap-aware coercions, equality and ordering.
//!
//! Primitive coercions live on `Value`; everything here needs to see the
//! heap because object conversion is tag-dispatched (arrays join their
//! elements, errors format as "Name: message", dates render as date
//! strings) and equality must distinguish object references.

use chrono::{Local, TimeZone};
use core_types::{number_to_string, ObjectId, Value};
use std::cmp::Ordering;

use crate::heap::{Heap, ObjectData};

/// Converts any value to its string form.
///
/// Cycles encountered while stringifying arrays or errors yield an empty
/// substring at the cycle point.
pub fn to_string_value(heap: &Heap, value: &Value) -> String {
    let mut visiting = Vec::new();
    to_string_guarded(heap, value, &mut visiting)
}

fn to_string_guarded(heap: &Heap, value: &Value, visiting: &mut Vec<ObjectId>) -> String {
    let id = match value {
        Value::Object(id) => *id,
        primitive => return primitive.to_string(),
    };
    if visiting.contains(&id) {
        return String::new();
    }
    visiting.push(id);
    let result = match &heap.object(id).data {
        ObjectData::Array { length } => {
            let mut parts = Vec::with_capacity(*length as usize);
            for i in 0..*length {
                let element = heap.own_property(id, &i.to_string());
                let text = match element {
                    None | Some(Value::Undefined) | Some(Value::Null) => String::new(),
                    Some(v) => to_string_guarded(heap, &v.clone(), visiting),
                };
                parts.push(text);
            }
            parts.join(",")
        }
        ObjectData::Error { .. } => {
            let name = match lookup_plain(heap, id, "name") {
                Some(v) => to_string_guarded(heap, &v, visiting),
                None => "Error".to_string(),
            };
            let message = match lookup_plain(heap, id, "message") {
                Some(v) => to_string_guarded(heap, &v, visiting),
                None => String::new(),
            };
            if message.is_empty() {
                name
            } else {
                format!("{}: {}", name, message)
            }
        }
        ObjectData::Date { ms } => date_to_string(*ms),
        ObjectData::Regex { pattern, flags } => format!("/{}/{}", pattern, flags),
        ObjectData::Plain | ObjectData::Function(_) => "[object]".to_string(),
    };
    visiting.pop();
    result
}

/// Walks the prototype chain reading stored properties only (no computed
/// properties); used for error name/message lookup during stringification.
fn lookup_plain(heap: &Heap, mut id: ObjectId, key: &str) -> Option<Value> {
    loop {
        if let Some(v) = heap.own_property(id, key) {
            return Some(v.clone());
        }
        id = heap.object(id).proto?;
    }
}

/// Renders epoch milliseconds in the host's date-string format.
pub fn date_to_string(ms: f64) -> String {
    if ms.is_nan() {
        return "Invalid Date".to_string();
    }
    match Local.timestamp_millis_opt(ms as i64).single() {
        Some(dt) => dt.format("%a %b %d %Y %H:%M:%S GMT%z").to_string(),
        None => "Invalid Date".to_string(),
    }
}

/// Converts any value to a number; objects go through their string form.
pub fn to_number_value(heap: &Heap, value: &Value) -> f64 {
    match value.to_number_primitive() {
        Some(n) => n,
        None => {
            let s = to_string_value(heap, value);
            Value::String(s).to_number_primitive().unwrap_or(f64::NAN)
        }
    }
}

/// Three-way comparison: `None` means incomparable.
///
/// NaN on either side is incomparable. Two numbers compare numerically;
/// any other pair compares by string form, except that two distinct objects
/// whose string forms match are still incomparable (they are not the same
/// object, but neither orders before the other).
pub fn compare(heap: &Heap, a: &Value, b: &Value) -> Option<Ordering> {
    if let Value::Number(n) = a {
        if n.is_nan() {
            return None;
        }
    }
    if let Value::Number(n) = b {
        if n.is_nan() {
            return None;
        }
    }
    if let (Value::Number(x), Value::Number(y)) = (a, b) {
        return x.partial_cmp(y);
    }
    if let (Value::Object(x), Value::Object(y)) = (a, b) {
        if x == y {
            return Some(Ordering::Equal);
        }
        let sa = to_string_value(heap, a);
        let sb = to_string_value(heap, b);
        return if sa == sb { None } else { Some(sa.cmp(&sb)) };
    }
    let sa = to_string_value(heap, a);
    let sb = to_string_value(heap, b);
    Some(sa.cmp(&sb))
}

/// Abstract (`==`) equality: equal exactly when [`compare`] says so.
///
/// Distinct objects are never equal, even when their string forms match.
pub fn loose_eq(heap: &Heap, a: &Value, b: &Value) -> bool {
    compare(heap, a, b) == Some(Ordering::Equal)
}

/// Strict (`===`) equality: same type tag, value equality on primitives,
/// reference equality on objects.
pub fn strict_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Undefined, Value::Undefined) => true,
        (Value::Null, Value::Null) => true,
        (Value::Boolean(x), Value::Boolean(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => x == y, // NaN !== NaN
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Object(x), Value::Object(y)) => x == y,
        _ => false,
    }
}

/// ToInt32 modular conversion.
pub fn to_int32(n: f64) -> i32 {
    let u = to_uint32(n);
    if u >= 0x8000_0000 {
        (u as i64 - 0x1_0000_0000) as i32
    } else {
        u as i32
    }
}

/// ToUint32 modular conversion.
pub fn to_uint32(n: f64) -> u32 {
    if !n.is_finite() || n == 0.0 {
        return 0;
    }
    let m = n.trunc() % 4_294_967_296.0;
    let m = if m < 0.0 { m + 4_294_967_296.0 } else { m };
    m as u32
}

/// The `typeof` tag, refining callables to "function".
pub fn type_of_value(heap: &Heap, value: &Value) -> &'static str {
    if let Value::Object(id) = value {
        if heap.object(*id).is_function() {
            return "function";
        }
    }
    value.type_of()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::Object;

    #[test]
    fn test_array_to_string_joins_with_commas() {
        let mut heap = Heap::new();
        let id = heap.alloc(Object::with_data(None, ObjectData::Array { length: 3 }));
        let object = heap.object_mut(id);
        object.properties.insert("0".to_string(), Value::Number(1.0));
        object.properties.insert("2".to_string(), Value::String("x".to_string()));
        assert_eq!(to_string_value(&heap, &Value::Object(id)), "1,,x");
    }

    #[test]
    fn test_cyclic_array_to_string() {
        let mut heap = Heap::new();
        let id = heap.alloc(Object::with_data(None, ObjectData::Array { length: 2 }));
        let object = heap.object_mut(id);
        object.properties.insert("0".to_string(), Value::Number(7.0));
        object.properties.insert("1".to_string(), Value::Object(id));
        assert_eq!(to_string_value(&heap, &Value::Object(id)), "7,");
    }

    #[test]
    fn test_error_to_string() {
        let mut heap = Heap::new();
        let id = heap.alloc(Object::with_data(
            None,
            ObjectData::Error {
                kind: core_types::ErrorKind::RangeError,
            },
        ));
        let object = heap.object_mut(id);
        object
            .properties
            .insert("name".to_string(), Value::String("RangeError".to_string()));
        object
            .properties
            .insert("message".to_string(), Value::String("r".to_string()));
        assert_eq!(to_string_value(&heap, &Value::Object(id)), "RangeError: r");

        heap.object_mut(id).properties.remove("message");
        assert_eq!(to_string_value(&heap, &Value::Object(id)), "RangeError");
    }

    #[test]
    fn test_compare_numbers_and_strings() {
        let heap = Heap::new();
        assert_eq!(
            compare(&heap, &Value::Number(1.0), &Value::Number(2.0)),
            Some(Ordering::Less)
        );
        assert_eq!(
            compare(&heap, &Value::Number(f64::NAN), &Value::Number(1.0)),
            None
        );
        // Mixed primitives compare by string form.
        assert_eq!(
            compare(
                &heap,
                &Value::String("10".to_string()),
                &Value::Number(5.0)
            ),
            Some(Ordering::Less)
        );
    }

    #[test]
    fn test_distinct_objects_stringify_equal_are_incomparable() {
        let mut heap = Heap::new();
        let a = heap.alloc(Object::plain(None));
        let b = heap.alloc(Object::plain(None));
        assert_eq!(compare(&heap, &Value::Object(a), &Value::Object(b)), None);
        assert!(!loose_eq(&heap, &Value::Object(a), &Value::Object(b)));
        assert!(loose_eq(&heap, &Value::Object(a), &Value::Object(a)));
    }

    #[test]
    fn test_strict_eq() {
        assert!(strict_eq(&Value::Number(0.0), &Value::Number(-0.0)));
        assert!(!strict_eq(
            &Value::Number(f64::NAN),
            &Value::Number(f64::NAN)
        ));
        assert!(!strict_eq(&Value::Number(1.0), &Value::String("1".into())));
    }

    #[test]
    fn test_int32_conversions() {
        assert_eq!(to_int32(0.0), 0);
        assert_eq!(to_int32(-1.0), -1);
        assert_eq!(to_int32(4_294_967_296.0), 0);
        assert_eq!(to_int32(2_147_483_648.0), -2_147_483_648);
        assert_eq!(to_uint32(-1.0), 4_294_967_295);
        assert_eq!(to_uint32(f64::NAN), 0);
    }
}
