//! Standard library and host bindings for the City VM.
//!
//! Two entry points:
//!
//! - [`register_natives`] installs every host implementation into a
//!   [`NativeRegistry`] in a fixed order. The order defines the stable
//!   native-function tags stored in snapshots, so it must be identical on
//!   every boot; new natives are only ever appended.
//! - [`install_globals`] runs on a fresh (non-restored) runtime and builds
//!   the prototype registry, the global constructors and free functions,
//!   and the `cc` host namespace. A restored runtime skips it: those
//!   objects come back out of the snapshot.
//!
//! [`install`] combines both for the common fresh-boot path.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod array;
mod cc;
mod date;
mod error;
mod global_fns;
mod json;
mod math;
mod number;
mod object;
mod regexp;
mod string;
mod uri;

use core_types::{ErrorKind, ObjectId, Value};
use interpreter::{
    Interpreter, NativeImpl, NativeRegistry, Object, PropFlags, Protos, Thrown,
};

/// The complete native catalog: (stable name, arity, implementation).
///
/// Appending is the only allowed change; reordering or removing entries
/// would break the tag table of existing snapshots.
fn catalog() -> Vec<(&'static str, u8, NativeImpl)> {
    use NativeImpl::Sync;
    vec![
        ("Object", 1, Sync(object::constructor)),
        ("Object.preventExtensions", 1, Sync(object::prevent_extensions)),
        ("Object.isExtensible", 1, Sync(object::is_extensible)),
        ("Object.prototype.hasOwnProperty", 1, Sync(object::has_own_property)),
        ("Object.prototype.toString", 0, Sync(object::to_string)),
        ("Object.prototype.valueOf", 0, Sync(object::value_of)),
        ("Function", 1, Sync(object::function_constructor)),
        ("Array", 1, Sync(array::constructor)),
        ("Array.prototype.push", 1, Sync(array::push)),
        ("Array.prototype.pop", 0, Sync(array::pop)),
        ("Array.prototype.shift", 0, Sync(array::shift)),
        ("Array.prototype.unshift", 1, Sync(array::unshift)),
        ("Array.prototype.splice", 2, Sync(array::splice)),
        ("Array.prototype.slice", 2, Sync(array::slice)),
        ("Array.prototype.concat", 1, Sync(array::concat)),
        ("Array.prototype.indexOf", 1, Sync(array::index_of)),
        ("Array.prototype.lastIndexOf", 1, Sync(array::last_index_of)),
        ("Array.prototype.reverse", 0, Sync(array::reverse)),
        ("Array.prototype.join", 1, Sync(array::join)),
        ("Array.prototype.toString", 0, Sync(array::to_string)),
        ("String", 1, Sync(string::constructor)),
        ("String.prototype.charAt", 1, Sync(string::char_at)),
        ("String.prototype.substring", 2, Sync(string::substring)),
        ("String.prototype.slice", 2, Sync(string::slice)),
        ("String.prototype.indexOf", 1, Sync(string::index_of)),
        ("String.prototype.search", 1, Sync(string::search)),
        ("String.prototype.match", 1, Sync(string::match_)),
        ("String.prototype.replace", 2, Sync(string::replace)),
        ("String.prototype.split", 2, Sync(string::split)),
        ("String.prototype.toLowerCase", 0, Sync(string::to_lower_case)),
        ("String.prototype.toUpperCase", 0, Sync(string::to_upper_case)),
        ("String.prototype.trim", 0, Sync(string::trim)),
        ("String.prototype.toString", 0, Sync(string::to_string)),
        ("Number", 1, Sync(number::constructor)),
        ("Number.prototype.toString", 1, Sync(number::to_string)),
        ("Number.prototype.toFixed", 1, Sync(number::to_fixed)),
        ("Number.prototype.valueOf", 0, Sync(number::value_of)),
        ("Boolean", 1, Sync(number::boolean_constructor)),
        ("Boolean.prototype.toString", 0, Sync(number::boolean_to_string)),
        ("Date", 7, Sync(date::constructor)),
        ("Date.now", 0, Sync(date::now)),
        ("Date.parse", 1, Sync(date::parse)),
        ("Date.prototype.getTime", 0, Sync(date::get_time)),
        ("Date.prototype.valueOf", 0, Sync(date::get_time)),
        ("Date.prototype.getFullYear", 0, Sync(date::get_full_year)),
        ("Date.prototype.getMonth", 0, Sync(date::get_month)),
        ("Date.prototype.getDate", 0, Sync(date::get_date)),
        ("Date.prototype.getDay", 0, Sync(date::get_day)),
        ("Date.prototype.getHours", 0, Sync(date::get_hours)),
        ("Date.prototype.getMinutes", 0, Sync(date::get_minutes)),
        ("Date.prototype.getSeconds", 0, Sync(date::get_seconds)),
        ("Date.prototype.getMilliseconds", 0, Sync(date::get_milliseconds)),
        ("Date.prototype.setTime", 1, Sync(date::set_time)),
        ("Date.prototype.setFullYear", 3, Sync(date::set_full_year)),
        ("Date.prototype.setMonth", 2, Sync(date::set_month)),
        ("Date.prototype.setDate", 1, Sync(date::set_date)),
        ("Date.prototype.setHours", 4, Sync(date::set_hours)),
        ("Date.prototype.setMinutes", 3, Sync(date::set_minutes)),
        ("Date.prototype.setSeconds", 2, Sync(date::set_seconds)),
        ("Date.prototype.setMilliseconds", 1, Sync(date::set_milliseconds)),
        ("Date.prototype.toString", 0, Sync(date::to_string)),
        ("Date.prototype.toISOString", 0, Sync(date::to_iso_string)),
        ("RegExp", 2, Sync(regexp::constructor)),
        ("RegExp.prototype.test", 1, Sync(regexp::test)),
        ("RegExp.prototype.exec", 1, Sync(regexp::exec)),
        ("RegExp.prototype.toString", 0, Sync(regexp::to_string)),
        ("Math.abs", 1, Sync(math::abs)),
        ("Math.ceil", 1, Sync(math::ceil)),
        ("Math.floor", 1, Sync(math::floor)),
        ("Math.round", 1, Sync(math::round)),
        ("Math.sqrt", 1, Sync(math::sqrt)),
        ("Math.pow", 2, Sync(math::pow)),
        ("Math.sin", 1, Sync(math::sin)),
        ("Math.cos", 1, Sync(math::cos)),
        ("Math.tan", 1, Sync(math::tan)),
        ("Math.asin", 1, Sync(math::asin)),
        ("Math.acos", 1, Sync(math::acos)),
        ("Math.atan", 1, Sync(math::atan)),
        ("Math.atan2", 2, Sync(math::atan2)),
        ("Math.log", 1, Sync(math::log)),
        ("Math.exp", 1, Sync(math::exp)),
        ("Math.min", 2, Sync(math::min)),
        ("Math.max", 2, Sync(math::max)),
        ("Math.random", 0, Sync(math::random)),
        ("JSON.parse", 1, Sync(json::parse)),
        ("JSON.stringify", 3, Sync(json::stringify)),
        ("Error", 1, Sync(error::error)),
        ("EvalError", 1, Sync(error::eval_error)),
        ("RangeError", 1, Sync(error::range_error)),
        ("ReferenceError", 1, Sync(error::reference_error)),
        ("SyntaxError", 1, Sync(error::syntax_error)),
        ("TypeError", 1, Sync(error::type_error)),
        ("URIError", 1, Sync(error::uri_error)),
        ("Error.prototype.toString", 0, Sync(error::to_string)),
        ("isNaN", 1, Sync(global_fns::is_nan)),
        ("isFinite", 1, Sync(global_fns::is_finite)),
        ("parseInt", 2, Sync(global_fns::parse_int)),
        ("parseFloat", 1, Sync(global_fns::parse_float)),
        ("encodeURI", 1, Sync(uri::encode_uri)),
        ("decodeURI", 1, Sync(uri::decode_uri)),
        ("encodeURIComponent", 1, Sync(uri::encode_uri_component)),
        ("decodeURIComponent", 1, Sync(uri::decode_uri_component)),
        ("escape", 1, Sync(uri::escape)),
        ("unescape", 1, Sync(uri::unescape)),
        ("cc.log", 1, Sync(cc::log)),
        ("cc.checkpoint", 0, Sync(cc::checkpoint)),
        ("cc.shutdown", 1, Sync(cc::shutdown)),
        ("cc.hash", 2, Sync(cc::hash)),
        ("cc.parse", 1, Sync(cc::parse)),
        ("cc.parseExpressionAt", 2, Sync(cc::parse_expression_at)),
    ]
}

/// Registers every native implementation in tag order.
pub fn register_natives(registry: &mut NativeRegistry) {
    for (name, _, imp) in catalog() {
        registry.register(name, imp);
    }
}

/// Registers natives and installs the global environment; the fresh-boot
/// path.
pub fn install(interp: &mut Interpreter) {
    let mut registry = std::mem::take(&mut interp.natives);
    register_natives(&mut registry);
    interp.natives = registry;
    install_globals(interp);
}

/// Creates a function object for a registered native, by stable name.
pub(crate) fn native_fn(interp: &mut Interpreter, name: &str) -> ObjectId {
    let entry = catalog()
        .into_iter()
        .find(|(n, _, _)| *n == name)
        .unwrap_or_else(|| panic!("native '{}' is not in the catalog", name));
    let tag = interp.natives.register(name, entry.2);
    let is_async = matches!(entry.2, NativeImpl::Async(_));
    interp.create_native_function(tag, entry.1, is_async)
}

/// Installs a native as a non-enumerable property (the prototype-method
/// convention).
pub(crate) fn install_method(interp: &mut Interpreter, target: ObjectId, key: &str, name: &str) {
    let func = native_fn(interp, name);
    interp
        .define_property(target, key, Value::Object(func), PropFlags::hidden())
        .expect("installing a method on a fresh object cannot fail");
}

/// Declares a read-only global binding.
fn bind_global(interp: &mut Interpreter, name: &str, value: Value) {
    let scope = interp.global_scope;
    interp.heap.scope_mut(scope).declare(name, value, true);
}

/// Builds the prototype registry, global constructors, free functions and
/// the `cc` namespace on a fresh runtime.
pub fn install_globals(interp: &mut Interpreter) {
    // Prototype objects first; everything else hangs off them.
    let object_proto = interp.heap.alloc(Object::plain(None));
    let function_proto = interp.heap.alloc(Object::plain(Some(object_proto)));
    let array_proto = interp.heap.alloc(Object::plain(Some(object_proto)));
    let string_proto = interp.heap.alloc(Object::plain(Some(object_proto)));
    let number_proto = interp.heap.alloc(Object::plain(Some(object_proto)));
    let boolean_proto = interp.heap.alloc(Object::plain(Some(object_proto)));
    let date_proto = interp.heap.alloc(Object::plain(Some(object_proto)));
    let regexp_proto = interp.heap.alloc(Object::plain(Some(object_proto)));
    let error_proto = interp.heap.alloc(Object::plain(Some(object_proto)));
    let mut errors = [error_proto; 7];
    for slot in errors.iter_mut().skip(1) {
        *slot = interp.heap.alloc(Object::plain(Some(error_proto)));
    }
    interp.protos = Protos {
        object: object_proto,
        function: function_proto,
        array: array_proto,
        string: string_proto,
        number: number_proto,
        boolean: boolean_proto,
        date: date_proto,
        regexp: regexp_proto,
        errors,
    };

    object::install(interp);
    array::install(interp);
    string::install(interp);
    number::install(interp);
    date::install(interp);
    regexp::install(interp);
    math::install(interp);
    json::install(interp);
    error::install(interp);
    global_fns::install(interp);
    uri::install(interp);
    cc::install(interp);

    // Global value singletons are read-only bindings; `delete` must refuse
    // them.
    bind_global(interp, "undefined", Value::Undefined);
    bind_global(interp, "NaN", Value::Number(f64::NAN));
    bind_global(interp, "Infinity", Value::Number(f64::INFINITY));
}

/// Wires a constructor to its prototype and binds it globally.
pub(crate) fn install_constructor(
    interp: &mut Interpreter,
    global_name: &str,
    native_name: &str,
    proto: ObjectId,
) -> ObjectId {
    let ctor = native_fn(interp, native_name);
    interp
        .define_property(ctor, "prototype", Value::Object(proto), PropFlags::frozen())
        .expect("constructor prototype installation cannot fail");
    interp
        .define_property(proto, "constructor", Value::Object(ctor), PropFlags::hidden())
        .expect("prototype constructor installation cannot fail");
    bind_global(interp, global_name, Value::Object(ctor));
    ctor
}

// ---- shared native helpers -------------------------------------------------

/// The i-th argument, or undefined.
pub(crate) fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or(Value::Undefined)
}

/// String form of a value.
pub(crate) fn to_str(interp: &Interpreter, v: &Value) -> String {
    interpreter::to_string_value(&interp.heap, v)
}

/// Numeric form of a value.
pub(crate) fn to_num(interp: &Interpreter, v: &Value) -> f64 {
    interpreter::to_number_value(&interp.heap, v)
}

/// Requires an array receiver, returning its id and length.
pub(crate) fn this_array(interp: &mut Interpreter, this: &Value) -> Result<(ObjectId, u32), Thrown> {
    if let Some(id) = this.as_object() {
        if let Some(length) = interp.heap.object(id).array_length() {
            return Ok((id, length));
        }
    }
    Err(interp.throw_error(ErrorKind::TypeError, "Receiver is not an array"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use interpreter::RunOutcome;

    pub(crate) fn boot() -> Interpreter {
        let mut interp = Interpreter::new();
        install(&mut interp);
        interp
    }

    pub(crate) fn eval_source(src: &str) -> (Interpreter, Value) {
        let mut interp = boot();
        interp.append_code(src).expect("parse failed");
        match interp.run().expect("fatal error") {
            RunOutcome::Done => {}
            other => panic!("program did not finish: {:?}", other),
        }
        let value = interp.value().clone();
        (interp, value)
    }

    #[test]
    fn test_catalog_names_are_unique() {
        let names: Vec<&str> = catalog().iter().map(|(n, _, _)| *n).collect();
        let mut deduped = names.clone();
        deduped.sort_unstable();
        deduped.dedup();
        assert_eq!(names.len(), deduped.len());
    }

    #[test]
    fn test_registration_is_idempotent_and_ordered() {
        let mut a = NativeRegistry::new();
        register_natives(&mut a);
        let first = a.names();
        register_natives(&mut a);
        assert_eq!(a.names(), first);

        let mut b = NativeRegistry::new();
        register_natives(&mut b);
        assert_eq!(b.names(), first);
    }

    #[test]
    fn test_install_binds_globals_read_only() {
        let (mut interp, _) = eval_source("1;");
        let scope = interp.global_scope;
        for name in ["Object", "Array", "JSON", "undefined", "cc", "eval"] {
            assert!(
                interp.lookup_name_opt(scope, name).is_some(),
                "missing global {}",
                name
            );
            assert!(!interp.delete_name(scope, name), "{} was deletable", name);
        }
    }

    #[test]
    fn test_literal_scenario_error_catch() {
        // Literal scenario 2 from the property list.
        let (_, value) = eval_source(
            "(function(){ try { throw new RangeError(\"r\"); } catch(e) { return e.name + \":\" + e.message; } })();",
        );
        assert_eq!(value, Value::String("RangeError:r".to_string()));
    }

    #[test]
    fn test_literal_scenario_array_truncate_join() {
        // Literal scenario 3 from the property list.
        let (_, value) =
            eval_source("var a = [1,2,3]; a.push(4); a.length = 2; a.join(\",\");");
        assert_eq!(value, Value::String("1,2".to_string()));
    }
}
