//! Snapshot round-trip and idempotence properties.
//!
//! The load-bearing guarantees: a state serialized mid-execution resumes
//! to the same observable results, and re-serializing a restored state
//! reproduces the record list structurally.

use core_types::Value;
use interpreter::{Interpreter, NativeRegistry, RunOutcome, StepResult};
use snapshot::{
    decode, encode, read_snapshot, restore, serialize, write_snapshot, Record,
};

fn boot(src: &str) -> Interpreter {
    let mut interp = Interpreter::new();
    builtins::install(&mut interp);
    interp.append_code(src).expect("parse failed");
    interp
}

fn registry() -> NativeRegistry {
    let mut registry = NativeRegistry::new();
    builtins::register_natives(&mut registry);
    registry
}

/// Steps `n` times (or until done), snapshots, restores in a fresh
/// runtime, then runs both to completion and compares results.
fn check_resume_equivalence(src: &str, pause_after: usize, expected: &Value) {
    let mut original = boot(src);
    for _ in 0..pause_after {
        match original.step().expect("fatal error") {
            StepResult::More => {}
            other => panic!("program ended early: {:?}", other),
        }
    }
    original.pause();

    let records = serialize(&original);
    let text = encode(&records).unwrap();
    let mut restored = restore(decode(&text).unwrap(), registry()).unwrap();

    original.resume();
    assert_eq!(original.run().unwrap(), RunOutcome::Done);
    assert_eq!(original.value(), expected);

    assert_eq!(restored.run().unwrap(), RunOutcome::Done);
    assert_eq!(restored.value(), expected);
}

#[test]
fn resume_mid_loop_matches_uninterrupted_run() {
    // Literal scenario 4: pause inside the loop of scenario 1, restore in
    // a fresh process, resume; the final value is still 3.
    let src = "var x = 0; for (var i = 0; i < 3; i++) x += i; x;";
    let expected = Value::Number(3.0);
    // Sample several pause points, including deep inside iterations.
    for pause_after in [1, 5, 10, 20, 35, 50] {
        check_resume_equivalence(src, pause_after, &expected);
    }
}

#[test]
fn resume_mid_recursion() {
    let src = "function f(n){ return n<2?n:f(n-1)+f(n-2); } f(10);";
    check_resume_equivalence(src, 500, &Value::Number(55.0));
}

#[test]
fn resume_mid_try_finally() {
    let src = "var log = '';\
               try { log += 'a'; throw 'x'; } catch (e) { log += 'b' + e; } finally { log += 'c'; }\
               log;";
    for pause_after in [3, 8, 15] {
        check_resume_equivalence(src, pause_after, &Value::String("abxc".to_string()));
    }
}

#[test]
fn resume_mid_for_in() {
    let src = "var o = { a: 1, b: 2, c: 3 };\
               var keys = '';\
               for (var k in o) keys += k;\
               keys;";
    for pause_after in [5, 12, 20] {
        check_resume_equivalence(src, pause_after, &Value::String("abc".to_string()));
    }
}

#[test]
fn closures_survive_restore() {
    let mut interp = boot(
        "function counter() { var n = 0; return function() { n += 1; return n; }; }\
         var c = counter(); c(); c();",
    );
    assert_eq!(interp.run().unwrap(), RunOutcome::Done);
    interp.pause();

    let records = serialize(&interp);
    let mut restored = restore(records, registry()).unwrap();

    // The closure keeps its captured scope: the counter continues from 2.
    restored.append_code("c();").unwrap();
    assert_eq!(restored.run().unwrap(), RunOutcome::Done);
    assert_eq!(restored.value(), &Value::Number(3.0));
}

#[test]
fn heap_contents_survive_restore() {
    let mut interp = boot(
        "var data = { list: [1, 2, 3], nested: { deep: 'yes' } };\
         data.self = data;\
         var when = new Date(86400000);\
         var re = /ab+/gi;\
         1;",
    );
    assert_eq!(interp.run().unwrap(), RunOutcome::Done);
    interp.pause();

    let mut restored = restore(serialize(&interp), registry()).unwrap();
    restored
        .append_code(
            "data.list.join('-') + '|' + data.nested.deep + '|' + (data.self === data) + '|' +\
             when.getTime() + '|' + re.toString();",
        )
        .unwrap();
    assert_eq!(restored.run().unwrap(), RunOutcome::Done);
    assert_eq!(
        restored.value(),
        &Value::String("1-2-3|yes|true|86400000|/ab+/gi".to_string())
    );
}

#[test]
fn reserialization_is_idempotent() {
    // serialize(deserialize(serialize(S))) equals serialize(S).
    let mut interp = boot("var x = 0; for (var i = 0; i < 3; i++) x += i; x;");
    for _ in 0..7 {
        let _ = interp.step().unwrap();
    }
    interp.pause();

    let first = serialize(&interp);
    let restored = restore(first.clone(), registry()).unwrap();
    let second = serialize(&restored);
    assert_eq!(first, second);

    // And the textual form agrees too.
    assert_eq!(encode(&first).unwrap(), encode(&second).unwrap());
}

#[test]
fn idempotence_holds_with_rich_heap() {
    let mut interp = boot(
        "var bag = { arr: [1, , 'three'], nan: NaN, inf: -Infinity };\
         bag.cycle = bag;\
         var err = new TypeError('t');\
         function f(a) { return a; }\
         1;",
    );
    assert_eq!(interp.run().unwrap(), RunOutcome::Done);
    interp.pause();

    let first = serialize(&interp);
    let restored = restore(first.clone(), registry()).unwrap();
    assert_eq!(first, serialize(&restored));
}

#[test]
fn native_tag_prefix_rule() {
    let mut interp = boot("1;");
    assert_eq!(interp.run().unwrap(), RunOutcome::Done);
    interp.pause();
    let records = serialize(&interp);

    // Identical table: fine.
    assert!(restore(records.clone(), registry()).is_ok());

    // A build with MORE natives (appended) still loads the snapshot.
    let mut extended = registry();
    fn extra(
        _: &mut Interpreter,
        _: Value,
        _: &[Value],
    ) -> Result<Value, interpreter::Thrown> {
        Ok(Value::Undefined)
    }
    extended.register("test.extra", interpreter::NativeImpl::Sync(extra));
    assert!(restore(records.clone(), extended).is_ok());

    // A build MISSING natives must refuse.
    let truncated = NativeRegistry::new();
    assert!(restore(records, truncated).is_err());
}

#[test]
fn snapshot_files_round_trip_on_disk() {
    use chrono::{TimeZone, Utc};

    let dir = tempfile::tempdir().unwrap();
    let mut interp = boot("var x = 41; x + 1;");
    assert_eq!(interp.run().unwrap(), RunOutcome::Done);
    interp.pause();

    let time = Utc.with_ymd_and_hms(2018, 11, 9, 18, 49, 50).unwrap();
    let path = write_snapshot(&interp, dir.path(), time).unwrap();
    assert!(path.to_string_lossy().ends_with(".city"));
    assert!(path.exists());
    // No partial file is left behind.
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".partial"))
        .collect();
    assert!(leftovers.is_empty());

    let mut restored = read_snapshot(&path, registry()).unwrap();
    restored.append_code("x;").unwrap();
    assert_eq!(restored.run().unwrap(), RunOutcome::Done);
    assert_eq!(restored.value(), &Value::Number(41.0));
}

#[test]
fn snapshot_text_is_line_per_record() {
    let mut interp = boot("1;");
    interp.pause();
    let records = serialize(&interp);
    let text = encode(&records).unwrap();
    // One line per record plus the enclosing brackets.
    assert_eq!(text.lines().count(), records.len() + 2);
    let reparsed = decode(&text).unwrap();
    assert_eq!(reparsed.len(), records.len());
    assert!(matches!(reparsed[0], Record::Header(_)));
}

#[test]
fn corrupt_snapshot_is_a_format_error() {
    assert!(decode("[{\"bogus\": 1}]").is_err());
    assert!(restore(Vec::new(), registry()).is_err());
}
