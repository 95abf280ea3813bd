//! Integration tests for the stepper, independent of host bindings.
//!
//! These programs deliberately avoid global constructors and prototype
//! methods; the full standard-library behavior is covered by the builtins
//! and supervisor test suites.

use core_types::Value;
use interpreter::{Interpreter, RunOutcome};

fn run_source(src: &str) -> (Interpreter, RunOutcome) {
    let mut interp = Interpreter::new();
    interp.append_code(src).expect("parse failure");
    let outcome = interp.run().expect("fatal error");
    (interp, outcome)
}

fn final_number(src: &str) -> f64 {
    let (interp, outcome) = run_source(src);
    assert_eq!(outcome, RunOutcome::Done, "program did not finish cleanly");
    match interp.value() {
        Value::Number(n) => *n,
        other => panic!("expected number, got {:?}", other),
    }
}

fn final_string(src: &str) -> String {
    let (interp, outcome) = run_source(src);
    assert_eq!(outcome, RunOutcome::Done);
    match interp.value() {
        Value::String(s) => s.clone(),
        other => panic!("expected string, got {:?}", other),
    }
}

#[test]
fn for_loop_accumulates() {
    // Literal scenario: var x = 0; for (var i = 0; i < 3; i++) x += i; x;
    let result = final_number("var x = 0; for (var i = 0; i < 3; i++) x += i; x;");
    assert_eq!(result, 3.0);
}

#[test]
fn recursive_fibonacci() {
    // Literal scenario: fib(10) is 55.
    let result = final_number("function f(n){ return n<2?n:f(n-1)+f(n-2); } f(10);");
    assert_eq!(result, 55.0);
}

#[test]
fn closures_capture_mutable_scope() {
    let result = final_number(
        "function counter() { var n = 0; return function() { n = n + 1; return n; }; }\
         var c = counter(); c(); c(); c();",
    );
    assert_eq!(result, 3.0);
}

#[test]
fn while_and_do_while() {
    assert_eq!(final_number("var n = 0; while (n < 5) n++; n;"), 5.0);
    assert_eq!(final_number("var n = 0; do { n++; } while (n < 5); n;"), 5.0);
    // A do-while body runs at least once.
    assert_eq!(final_number("var n = 9; do { n++; } while (false); n;"), 10.0);
}

#[test]
fn break_and_continue_with_labels() {
    let result = final_number(
        "var total = 0;\
         outer: for (var i = 0; i < 5; i++) {\
           for (var j = 0; j < 5; j++) {\
             if (j > i) continue outer;\
             if (i === 4) break outer;\
             total++;\
           }\
         }\
         total;",
    );
    // i=0:1, i=1:2, i=2:3, i=3:4, i=4 breaks immediately.
    assert_eq!(result, 10.0);
}

#[test]
fn switch_falls_through_and_honors_default() {
    let src = "function pick(v) {\
                 var out = '';\
                 switch (v) {\
                   case 1: out += 'one ';\
                   case 2: out += 'two '; break;\
                   case 3: out += 'three '; break;\
                   default: out += 'other ';\
                 }\
                 return out;\
               }\
               pick(1) + '|' + pick(2) + '|' + pick(3) + '|' + pick(9);";
    assert_eq!(
        final_string(src),
        "one two |two |three |other |".to_string()
    );
}

#[test]
fn try_catch_finally_ordering() {
    let result = final_string(
        "var log = '';\
         function f() {\
           try {\
             log += 'try ';\
             throw 'boom';\
           } catch (e) {\
             log += 'catch:' + e + ' ';\
             return 'from-catch';\
           } finally {\
             log += 'finally ';\
           }\
         }\
         log + f() + ' ' + log;",
    );
    // The first reading of log happens before the call.
    assert_eq!(result, "from-catch try catch:boom finally ");
}

#[test]
fn finally_runs_on_return_path() {
    let result = final_number(
        "var marks = 0;\
         function f() { try { return 1; } finally { marks = marks + 10; } }\
         f() + marks;",
    );
    assert_eq!(result, 11.0);
}

#[test]
fn finally_throw_replaces_pending_completion() {
    let result = final_string(
        "var seen = '';\
         try {\
           try { throw 'first'; } finally { throw 'second'; }\
         } catch (e) { seen = e; }\
         seen;",
    );
    assert_eq!(result, "second");
}

#[test]
fn throw_value_is_observed_exactly() {
    let result = final_number(
        "var got = 0;\
         var thrown = { marker: 42 };\
         try { throw thrown; } catch (e) { if (e === thrown) got = e.marker; }\
         got;",
    );
    assert_eq!(result, 42.0);
}

#[test]
fn uncaught_throw_surfaces_and_reopens() {
    let mut interp = Interpreter::new();
    interp.append_code("var x = 1; throw 'bad'; x = 99;").unwrap();
    let outcome = interp.run().unwrap();
    match outcome {
        RunOutcome::Uncaught(Value::String(s)) => assert_eq!(s, "bad"),
        other => panic!("expected uncaught, got {:?}", other),
    }
    // The statement after the throw was skipped, but the world survives and
    // appended code still runs against the same globals.
    interp.append_code("x = x + 1; x;").unwrap();
    assert_eq!(interp.run().unwrap(), RunOutcome::Done);
    assert_eq!(interp.value(), &Value::Number(2.0));
}

#[test]
fn append_code_reopens_finished_program() {
    // Literal scenario: x ends at 3, appended code adds 10.
    let mut interp = Interpreter::new();
    interp
        .append_code("var x = 0; for (var i = 0; i < 3; i++) x += i; x;")
        .unwrap();
    assert_eq!(interp.run().unwrap(), RunOutcome::Done);
    assert!(interp.done());
    interp.append_code("x = x + 10;").unwrap();
    assert!(!interp.done());
    assert_eq!(interp.run().unwrap(), RunOutcome::Done);
    assert_eq!(interp.value(), &Value::Number(13.0));
}

#[test]
fn pause_is_transparent_to_results() {
    let src = "var x = 0; for (var i = 0; i < 3; i++) x += i; x;";
    let mut interp = Interpreter::new();
    interp.append_code(src).unwrap();
    let mut pauses = 0;
    loop {
        interp.pause();
        match interp.run().unwrap() {
            RunOutcome::Paused => {
                pauses += 1;
                interp.resume();
                // Take a couple of raw steps between pauses.
                let _ = interp.step().unwrap();
            }
            RunOutcome::Done => break,
            other => panic!("unexpected outcome {:?}", other),
        }
        if interp.done() {
            break;
        }
    }
    assert!(pauses > 0);
    assert_eq!(interp.value(), &Value::Number(3.0));
}

#[test]
fn for_in_enumerates_own_then_prototype_once() {
    let result = final_string(
        "function Base() {}\
         Base.prototype.a = 1;\
         Base.prototype.b = 2;\
         var o = new Base();\
         o.b = 20;\
         o.c = 30;\
         var seen = '';\
         for (var k in o) { seen += k + ';'; }\
         seen;",
    );
    // Own keys first (b shadows the prototype's b), then unshadowed
    // prototype keys, each exactly once.
    assert_eq!(result, "b;c;a;");
}

#[test]
fn for_in_over_string_indices() {
    let result = final_string(
        "var s = 'abc'; var keys = ''; for (var i in s) { keys += i + ','; } keys;",
    );
    assert_eq!(result, "0,1,2,");
}

#[test]
fn typeof_suppresses_reference_errors() {
    assert_eq!(final_string("typeof missing;"), "undefined");
    assert_eq!(final_string("typeof null;"), "object");
    assert_eq!(final_string("typeof 'x';"), "string");
    assert_eq!(final_string("function g() {} typeof g;"), "function");
}

#[test]
fn plain_reference_error_is_catchable() {
    let result = final_string(
        "var kind = ''; try { missing; } catch (e) { kind = typeof e; } kind;",
    );
    // The error object is a heap object even without installed bindings.
    assert_eq!(result, "object");
}

#[test]
fn delete_semantics() {
    assert_eq!(
        final_string("var o = { a: 1 }; delete o.a; typeof o.a;"),
        "undefined"
    );
    // Deleting a declared variable succeeds for ordinary bindings.
    assert_eq!(
        final_string("var v = 1; delete v; typeof v;"),
        "undefined"
    );
}

#[test]
fn assignment_operators_combine() {
    assert_eq!(final_number("var n = 7; n -= 2; n *= 3; n %= 4; n;"), 3.0);
    assert_eq!(final_string("var s = 'a'; s += 1; s += 'b'; s;"), "a1b");
    assert_eq!(final_number("var b = 6; b &= 3; b |= 8; b ^= 1; b;"), 11.0);
}

#[test]
fn string_addition_rule() {
    assert_eq!(final_string("1 + '2';"), "12");
    assert_eq!(final_number("1 + 2;"), 3.0);
    assert_eq!(final_number("'3' * '4';"), 12.0);
}

#[test]
fn member_call_receiver() {
    let result = final_number(
        "var o = { n: 5, get: function() { return this.n; } }; o.get();",
    );
    assert_eq!(result, 5.0);
}

#[test]
fn constructor_and_instanceof() {
    let result = final_string(
        "function Point(x, y) { this.x = x; this.y = y; }\
         Point.prototype.sum = function() { return this.x + this.y; };\
         var p = new Point(2, 3);\
         (p instanceof Point) + ':' + p.sum();",
    );
    assert_eq!(result, "true:5");
}

#[test]
fn constructor_object_result_overrides_this() {
    let result = final_number(
        "function F() { this.a = 1; return { a: 9 }; } (new F()).a;",
    );
    assert_eq!(result, 9.0);
}

#[test]
fn arguments_array_is_available() {
    let result = final_number(
        "function sum() {\
           var total = 0;\
           for (var i = 0; i < arguments.length; i++) total += arguments[i];\
           return total;\
         }\
         sum(1, 2, 3, 4);",
    );
    assert_eq!(result, 10.0);
}

#[test]
fn missing_parameters_are_undefined() {
    assert_eq!(final_string("function t(a, b) { return typeof b; } t(1);"), "undefined");
}

#[test]
fn stack_overflow_is_catchable() {
    let mut interp = Interpreter::new();
    interp.set_stack_limit(64);
    interp
        .append_code(
            "var caught = '';\
             function loop() { return loop(); }\
             try { loop(); } catch (e) { caught = 'depth'; }\
             caught;",
        )
        .unwrap();
    assert_eq!(interp.run().unwrap(), RunOutcome::Done);
    assert_eq!(interp.value(), &Value::String("depth".to_string()));
}

#[test]
fn named_function_expression_sees_itself() {
    let result = final_number(
        "var f = function fact(n) { return n < 2 ? 1 : n * fact(n - 1); }; f(5);",
    );
    assert_eq!(result, 120.0);
}

#[test]
fn sequence_and_conditional() {
    assert_eq!(final_number("var a = (1, 2, 3); a;"), 3.0);
    assert_eq!(final_string("true ? 'yes' : 'no';"), "yes");
    assert_eq!(final_string("0 ? 'yes' : 'no';"), "no");
}

#[test]
fn logical_operators_return_operands() {
    assert_eq!(final_number("0 || 7;"), 7.0);
    assert_eq!(final_number("3 && 9;"), 9.0);
    assert_eq!(final_number("0 && 9;"), 0.0);
}

#[test]
fn with_statement_is_a_host_error() {
    let mut interp = Interpreter::new();
    interp.append_code("with ({}) {}").unwrap();
    assert!(interp.run().is_err());
}

#[test]
fn break_outside_loop_is_a_host_error() {
    let mut interp = Interpreter::new();
    interp.append_code("break;").unwrap();
    assert!(interp.run().is_err());
}

#[test]
fn hoisting_declares_vars_and_functions() {
    // Both the var and the function are visible before their statements.
    assert_eq!(final_string("typeof later;", ), "undefined");
    assert_eq!(
        final_string("var t = typeof f; function f() {} t;"),
        "function"
    );
    assert_eq!(
        final_number("var r = early(); function early() { return 4; } r;"),
        4.0
    );
}

#[test]
fn array_literal_holes() {
    assert_eq!(final_number("[1, , 3].length;"), 3.0);
    assert_eq!(final_string("typeof [1, , 3][1];"), "undefined");
}

#[test]
fn async_native_pauses_and_resumes() {
    use interpreter::{NativeImpl, Thrown};

    fn sleepish(
        interp: &mut Interpreter,
        _this: Value,
        _args: &[Value],
    ) -> Result<(), Thrown> {
        // A real host would schedule this; the test resolves it from
        // outside the run loop instead.
        interp.log("pending".to_string());
        Ok(())
    }

    let mut interp = Interpreter::new();
    let tag = interp
        .natives
        .register("test.sleepish", NativeImpl::Async(sleepish));
    let func = interp.create_native_function(tag, 0, true);
    interp
        .heap
        .scope_mut(interp.global_scope)
        .declare("sleepish", Value::Object(func), true);

    interp.append_code("var got = sleepish(); got;").unwrap();
    assert_eq!(interp.run().unwrap(), RunOutcome::Paused);
    assert!(interp.has_pending_call());

    interp.resolve_pending(Value::Number(123.0));
    assert_eq!(interp.run().unwrap(), RunOutcome::Done);
    assert_eq!(interp.value(), &Value::Number(123.0));
}

#[test]
fn eval_runs_in_current_scope() {
    use interpreter::{FunctionData, Object, ObjectData};

    let mut interp = Interpreter::new();
    let eval_fn = interp.heap.alloc(Object::with_data(
        Some(interp.protos.function),
        ObjectData::Function(FunctionData::Eval),
    ));
    interp
        .heap
        .scope_mut(interp.global_scope)
        .declare("eval", Value::Object(eval_fn), true);

    interp
        .append_code(
            "var a = 1;\
             function f() { var b = 10; return eval('a + b;'); }\
             var hoisted = f();\
             eval('var c = 5;');\
             hoisted + a + c;",
        )
        .unwrap();
    assert_eq!(interp.run().unwrap(), RunOutcome::Done);
    assert_eq!(interp.value(), &Value::Number(17.0));
}
