//! Date constructor, static functions and prototype accessors.
//!
//! A date object is an epoch-millisecond slot; getters and setters work in
//! the host's local time zone via chrono, matching the language's
//! local-time accessor semantics. An invalid date holds NaN.

use chrono::{DateTime, Datelike, Local, NaiveDate, TimeZone, Timelike, Utc};
use core_types::{ErrorKind, ObjectId, Value};
use interpreter::{date_to_string, Interpreter, Object, ObjectData, Thrown};

use crate::{arg, install_constructor, install_method, native_fn, to_num, to_str};

pub(crate) fn install(interp: &mut Interpreter) {
    let proto = interp.protos.date;
    let ctor = install_constructor(interp, "Date", "Date", proto);
    for (key, name) in [("now", "Date.now"), ("parse", "Date.parse")] {
        let func = native_fn(interp, name);
        interp
            .define_property(ctor, key, Value::Object(func), interpreter::PropFlags::hidden())
            .expect("installing Date statics cannot fail");
    }
    for (key, name) in [
        ("getTime", "Date.prototype.getTime"),
        ("valueOf", "Date.prototype.valueOf"),
        ("getFullYear", "Date.prototype.getFullYear"),
        ("getMonth", "Date.prototype.getMonth"),
        ("getDate", "Date.prototype.getDate"),
        ("getDay", "Date.prototype.getDay"),
        ("getHours", "Date.prototype.getHours"),
        ("getMinutes", "Date.prototype.getMinutes"),
        ("getSeconds", "Date.prototype.getSeconds"),
        ("getMilliseconds", "Date.prototype.getMilliseconds"),
        ("setTime", "Date.prototype.setTime"),
        ("setFullYear", "Date.prototype.setFullYear"),
        ("setMonth", "Date.prototype.setMonth"),
        ("setDate", "Date.prototype.setDate"),
        ("setHours", "Date.prototype.setHours"),
        ("setMinutes", "Date.prototype.setMinutes"),
        ("setSeconds", "Date.prototype.setSeconds"),
        ("setMilliseconds", "Date.prototype.setMilliseconds"),
        ("toString", "Date.prototype.toString"),
        ("toISOString", "Date.prototype.toISOString"),
    ] {
        install_method(interp, proto, key, name);
    }
}

fn create_date(interp: &mut Interpreter, ms: f64) -> ObjectId {
    interp.heap.alloc(Object::with_data(
        Some(interp.protos.date),
        ObjectData::Date { ms },
    ))
}

fn this_date(interp: &mut Interpreter, this: &Value) -> Result<(ObjectId, f64), Thrown> {
    if let Some(id) = this.as_object() {
        if let ObjectData::Date { ms } = interp.heap.object(id).data {
            return Ok((id, ms));
        }
    }
    Err(interp.throw_error(ErrorKind::TypeError, "Receiver is not a Date"))
}

fn local_datetime(ms: f64) -> Option<DateTime<Local>> {
    if ms.is_nan() {
        return None;
    }
    Local.timestamp_millis_opt(ms as i64).single()
}

fn parse_date_string(text: &str) -> f64 {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return dt.timestamp_millis() as f64;
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return dt.timestamp_millis() as f64;
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        if let Some(dt) = date.and_hms_opt(0, 0, 0) {
            return Utc.from_utc_datetime(&dt).timestamp_millis() as f64;
        }
    }
    f64::NAN
}

/// Epoch milliseconds for local calendar components.
fn ms_from_components(parts: &[f64]) -> f64 {
    if parts.iter().any(|p| p.is_nan()) {
        return f64::NAN;
    }
    let year = {
        let y = parts[0] as i32;
        if (0..=99).contains(&y) {
            1900 + y
        } else {
            y
        }
    };
    let month = parts.get(1).copied().unwrap_or(0.0) as u32;
    let day = parts.get(2).copied().unwrap_or(1.0) as u32;
    let hour = parts.get(3).copied().unwrap_or(0.0) as u32;
    let minute = parts.get(4).copied().unwrap_or(0.0) as u32;
    let second = parts.get(5).copied().unwrap_or(0.0) as u32;
    let milli = parts.get(6).copied().unwrap_or(0.0) as u32;
    match Local.with_ymd_and_hms(year, month + 1, day, hour, minute, second) {
        chrono::offset::LocalResult::Single(dt) => {
            dt.timestamp_millis() as f64 + milli as f64
        }
        _ => f64::NAN,
    }
}

pub(crate) fn constructor(
    interp: &mut Interpreter,
    _this: Value,
    args: &[Value],
) -> Result<Value, Thrown> {
    let ms = match args.len() {
        0 => Utc::now().timestamp_millis() as f64,
        1 => match &args[0] {
            Value::String(s) => parse_date_string(s),
            v => to_num(interp, v),
        },
        _ => {
            let parts: Vec<f64> = args.iter().map(|v| to_num(interp, v)).collect();
            ms_from_components(&parts)
        }
    };
    Ok(Value::Object(create_date(interp, ms)))
}

pub(crate) fn now(_interp: &mut Interpreter, _t: Value, _args: &[Value]) -> Result<Value, Thrown> {
    Ok(Value::Number(Utc::now().timestamp_millis() as f64))
}

pub(crate) fn parse(interp: &mut Interpreter, _t: Value, args: &[Value]) -> Result<Value, Thrown> {
    let text = to_str(interp, &arg(args, 0));
    Ok(Value::Number(parse_date_string(&text)))
}

pub(crate) fn get_time(interp: &mut Interpreter, this: Value, _a: &[Value]) -> Result<Value, Thrown> {
    let (_, ms) = this_date(interp, &this)?;
    Ok(Value::Number(ms))
}

fn get_field(
    interp: &mut Interpreter,
    this: &Value,
    f: impl FnOnce(&DateTime<Local>) -> f64,
) -> Result<Value, Thrown> {
    let (_, ms) = this_date(interp, this)?;
    Ok(Value::Number(match local_datetime(ms) {
        Some(dt) => f(&dt),
        None => f64::NAN,
    }))
}

pub(crate) fn get_full_year(
    interp: &mut Interpreter,
    this: Value,
    _a: &[Value],
) -> Result<Value, Thrown> {
    get_field(interp, &this, |dt| dt.year() as f64)
}

pub(crate) fn get_month(
    interp: &mut Interpreter,
    this: Value,
    _a: &[Value],
) -> Result<Value, Thrown> {
    get_field(interp, &this, |dt| dt.month0() as f64)
}

pub(crate) fn get_date(interp: &mut Interpreter, this: Value, _a: &[Value]) -> Result<Value, Thrown> {
    get_field(interp, &this, |dt| dt.day() as f64)
}

pub(crate) fn get_day(interp: &mut Interpreter, this: Value, _a: &[Value]) -> Result<Value, Thrown> {
    get_field(interp, &this, |dt| dt.weekday().num_days_from_sunday() as f64)
}

pub(crate) fn get_hours(
    interp: &mut Interpreter,
    this: Value,
    _a: &[Value],
) -> Result<Value, Thrown> {
    get_field(interp, &this, |dt| dt.hour() as f64)
}

pub(crate) fn get_minutes(
    interp: &mut Interpreter,
    this: Value,
    _a: &[Value],
) -> Result<Value, Thrown> {
    get_field(interp, &this, |dt| dt.minute() as f64)
}

pub(crate) fn get_seconds(
    interp: &mut Interpreter,
    this: Value,
    _a: &[Value],
) -> Result<Value, Thrown> {
    get_field(interp, &this, |dt| dt.second() as f64)
}

pub(crate) fn get_milliseconds(
    interp: &mut Interpreter,
    this: Value,
    _a: &[Value],
) -> Result<Value, Thrown> {
    get_field(interp, &this, |dt| dt.timestamp_subsec_millis() as f64)
}

fn store(interp: &mut Interpreter, id: ObjectId, ms: f64) -> Value {
    if let ObjectData::Date { ms: slot } = &mut interp.heap.object_mut(id).data {
        *slot = ms;
    }
    Value::Number(ms)
}

pub(crate) fn set_time(
    interp: &mut Interpreter,
    this: Value,
    args: &[Value],
) -> Result<Value, Thrown> {
    let (id, _) = this_date(interp, &this)?;
    let ms = to_num(interp, &arg(args, 0));
    Ok(store(interp, id, ms))
}

/// Rebuilds the epoch from current local components with some fields
/// replaced.
fn set_fields(
    interp: &mut Interpreter,
    this: &Value,
    args: &[Value],
    first: usize,
) -> Result<Value, Thrown> {
    let (id, ms) = this_date(interp, this)?;
    let dt = match local_datetime(ms) {
        Some(dt) => dt,
        None => return Ok(store(interp, id, f64::NAN)),
    };
    let mut parts = [
        dt.year() as f64,
        dt.month0() as f64,
        dt.day() as f64,
        dt.hour() as f64,
        dt.minute() as f64,
        dt.second() as f64,
        dt.timestamp_subsec_millis() as f64,
    ];
    for (offset, value) in args.iter().enumerate() {
        let slot = first + offset;
        if slot >= parts.len() {
            break;
        }
        parts[slot] = to_num(interp, value);
    }
    // Years below 100 passed to setters are literal, not 1900-relative.
    let new_ms = if parts.iter().any(|p| p.is_nan()) {
        f64::NAN
    } else {
        match Local.with_ymd_and_hms(
            parts[0] as i32,
            parts[1] as u32 + 1,
            parts[2] as u32,
            parts[3] as u32,
            parts[4] as u32,
            parts[5] as u32,
        ) {
            chrono::offset::LocalResult::Single(dt) => {
                dt.timestamp_millis() as f64 + parts[6]
            }
            _ => f64::NAN,
        }
    };
    Ok(store(interp, id, new_ms))
}

pub(crate) fn set_full_year(
    interp: &mut Interpreter,
    this: Value,
    args: &[Value],
) -> Result<Value, Thrown> {
    set_fields(interp, &this, args, 0)
}

pub(crate) fn set_month(
    interp: &mut Interpreter,
    this: Value,
    args: &[Value],
) -> Result<Value, Thrown> {
    set_fields(interp, &this, args, 1)
}

pub(crate) fn set_date(
    interp: &mut Interpreter,
    this: Value,
    args: &[Value],
) -> Result<Value, Thrown> {
    set_fields(interp, &this, args, 2)
}

pub(crate) fn set_hours(
    interp: &mut Interpreter,
    this: Value,
    args: &[Value],
) -> Result<Value, Thrown> {
    set_fields(interp, &this, args, 3)
}

pub(crate) fn set_minutes(
    interp: &mut Interpreter,
    this: Value,
    args: &[Value],
) -> Result<Value, Thrown> {
    set_fields(interp, &this, args, 4)
}

pub(crate) fn set_seconds(
    interp: &mut Interpreter,
    this: Value,
    args: &[Value],
) -> Result<Value, Thrown> {
    set_fields(interp, &this, args, 5)
}

pub(crate) fn set_milliseconds(
    interp: &mut Interpreter,
    this: Value,
    args: &[Value],
) -> Result<Value, Thrown> {
    set_fields(interp, &this, args, 6)
}

pub(crate) fn to_string(
    interp: &mut Interpreter,
    this: Value,
    _a: &[Value],
) -> Result<Value, Thrown> {
    let (_, ms) = this_date(interp, &this)?;
    Ok(Value::String(date_to_string(ms)))
}

pub(crate) fn to_iso_string(
    interp: &mut Interpreter,
    this: Value,
    _a: &[Value],
) -> Result<Value, Thrown> {
    let (_, ms) = this_date(interp, &this)?;
    if ms.is_nan() {
        return Err(interp.throw_error(ErrorKind::RangeError, "Invalid time value"));
    }
    match Utc.timestamp_millis_opt(ms as i64).single() {
        Some(dt) => Ok(Value::String(
            dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
        )),
        None => Err(interp.throw_error(ErrorKind::RangeError, "Invalid time value")),
    }
}

#[cfg(test)]
mod tests {
    use super::parse_date_string;
    use crate::tests::eval_source;
    use core_types::Value;

    #[test]
    fn test_parse_rfc3339() {
        let ms = parse_date_string("1970-01-01T00:00:01Z");
        assert_eq!(ms, 1000.0);
        assert!(parse_date_string("not a date").is_nan());
    }

    #[test]
    fn test_epoch_round_trip() {
        let (_, value) = eval_source("new Date(86400000).getTime();");
        assert_eq!(value, Value::Number(86_400_000.0));
    }

    #[test]
    fn test_component_constructor_and_getters() {
        let (_, value) = eval_source(
            "var d = new Date(2018, 10, 9, 18, 49, 50);\
             d.getFullYear() + ':' + d.getMonth() + ':' + d.getDate() + ':' + d.getHours();",
        );
        assert_eq!(value, Value::String("2018:10:9:18".to_string()));
    }

    #[test]
    fn test_setters_update_epoch() {
        let (_, value) = eval_source(
            "var d = new Date(2020, 0, 15);\
             d.setMonth(5);\
             d.getMonth() + ':' + d.getDate();",
        );
        assert_eq!(value, Value::String("5:15".to_string()));
    }

    #[test]
    fn test_invalid_date() {
        let (_, value) = eval_source("new Date('garbage').toString();");
        assert_eq!(value, Value::String("Invalid Date".to_string()));
        let (_, value) = eval_source(
            "var k = ''; try { new Date(NaN).toISOString(); } catch (e) { k = e.name; } k;",
        );
        assert_eq!(value, Value::String("RangeError".to_string()));
    }

    #[test]
    fn test_iso_string_format() {
        let (_, value) = eval_source("new Date(1000).toISOString();");
        assert_eq!(value, Value::String("1970-01-01T00:00:01.000Z".to_string()));
    }

    #[test]
    fn test_now_is_recent() {
        let (_, value) = eval_source("Date.now() > 1500000000000;");
        assert_eq!(value, Value::Boolean(true));
    }
}
