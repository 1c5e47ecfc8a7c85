use super::{eval, eval_throws};

#[test]
fn let_loop_closures_capture_each_iteration() {
    let out = eval(
        "var fs = [];
         for (let i = 0; i < 3; i++) { fs.push(() => i); }
         fs.map(f => f())",
    );
    assert_eq!(out, "[0, 1, 2]");
}

#[test]
fn var_loop_closures_share_one_binding() {
    let out = eval(
        "var fs = [];
         for (var i = 0; i < 3; i++) { fs.push(function () { return i; }); }
         fs.map(f => f())",
    );
    assert_eq!(out, "[3, 3, 3]");
}

#[test]
fn sum_loop() {
    assert_eq!(eval("let s = 0; for (let i = 0; i < 10; i++) { s += i; } s"), "45");
}

#[test]
fn reading_let_before_declaration_is_a_reference_error() {
    let thrown = eval_throws("{ x; let x = 1; }");
    assert_eq!(thrown, "ReferenceError: Cannot access 'x' before initialization");
}

#[test]
fn tdz_applies_to_closures_called_early() {
    let thrown = eval_throws("function read() { return value; } read(); const value = 1;");
    assert!(thrown.starts_with("ReferenceError"), "{thrown}");
}

#[test]
fn assignment_to_const_is_a_type_error() {
    let thrown = eval_throws("const c = 1; c = 2;");
    assert!(thrown.starts_with("TypeError"), "{thrown}");
}

#[test]
fn finally_return_overrides_try_return() {
    assert_eq!(eval("function f() { try { return 't'; } finally { return 'f'; } } f()"), "f");
}

#[test]
fn finally_without_abrupt_completion_keeps_the_try_result() {
    let out = eval(
        "var log = [];
         function f() { try { return 't'; } finally { log.push('cleanup'); } }
         [f(), log.length]",
    );
    assert_eq!(out, "['t', 1]");
}

#[test]
fn finally_can_swallow_a_throw() {
    assert_eq!(eval("function f() { try { throw 1; } finally { return 2; } } f()"), "2");
}

#[test]
fn catch_binds_the_thrown_value() {
    let out = eval("let r; try { null.x; } catch (e) { r = e instanceof TypeError; } r");
    assert_eq!(out, "true");
}

#[test]
fn var_escapes_blocks_but_let_does_not() {
    assert_eq!(eval("{ var a = 1; let b = 2; } typeof a + ',' + typeof b"), "number,undefined");
}

#[test]
fn function_declarations_are_hoisted() {
    assert_eq!(eval("early(); function early() { return 'hoisted'; } early()"), "hoisted");
}

#[test]
fn labelled_continue_targets_the_outer_loop() {
    let out = eval(
        "var pairs = [];
         outer: for (let i = 0; i < 3; i++) {
             for (let j = 0; j < 3; j++) {
                 if (j === 1) continue outer;
                 pairs.push(i * 10 + j);
             }
         }
         pairs",
    );
    assert_eq!(out, "[0, 10, 20]");
}

#[test]
fn switch_falls_through_until_break() {
    let out = eval(
        "function pick(n) {
             var seen = [];
             switch (n) {
                 case 1: seen.push('one');
                 case 2: seen.push('two'); break;
                 default: seen.push('other');
             }
             return seen.join('+');
         }
         [pick(1), pick(2), pick(3)]",
    );
    assert_eq!(out, "['one+two', 'two', 'other']");
}

#[test]
fn destructuring_with_defaults_and_rest() {
    let out = eval(
        "const { a, b: [first, ...others], c = 'dflt' } = { a: 1, b: [2, 3, 4] };
         [a, first, others, c]",
    );
    assert_eq!(out, "[1, 2, [3, 4], 'dflt']");
}

#[test]
fn classes_with_inheritance_and_super() {
    let out = eval(
        "class Animal {
             constructor(name) { this.name = name; }
             speak() { return this.name + ' makes a sound'; }
         }
         class Dog extends Animal {
             speak() { return super.speak() + ' (woof)'; }
         }
         new Dog('Rex').speak()",
    );
    assert_eq!(out, "Rex makes a sound (woof)");
}

#[test]
fn getters_and_setters_run_as_calls() {
    let out = eval(
        "const o = { _v: 1, get v() { return this._v * 10; }, set v(x) { this._v = x; } };
         o.v = 4;
         o.v",
    );
    assert_eq!(out, "40");
}

#[test]
fn closures_keep_private_state() {
    let out = eval(
        "function counter() { let n = 0; return () => ++n; }
         const c = counter(); c(); c();
         c()",
    );
    assert_eq!(out, "3");
}

#[test]
fn for_of_walks_arrays_and_strings() {
    let out = eval(
        "let parts = [];
         for (const x of [1, 2]) parts.push(x);
         for (const ch of 'ab') parts.push(ch);
         parts",
    );
    assert_eq!(out, "[1, 2, 'a', 'b']");
}

#[test]
fn for_in_lists_enumerable_keys() {
    let out = eval("var keys = []; for (var k in { x: 1, y: 2 }) keys.push(k); keys.join()");
    assert_eq!(out, "x,y");
}

#[test]
fn generators_resume_with_sent_values() {
    let out = eval(
        "function* g() { const x = yield 1; yield x * 2; }
         const it = g();
         [it.next().value, it.next(5).value, it.next().done]",
    );
    assert_eq!(out, "[1, 10, true]");
}

#[test]
fn generator_return_runs_finally_blocks() {
    let out = eval(
        "var log = [];
         function* g() { try { yield 1; yield 2; } finally { log.push('closed'); } }
         const it = g();
         it.next();
         const r = it.return(9);
         [r.value, r.done, log]",
    );
    assert_eq!(out, "[9, true, ['closed']]");
}

#[test]
fn spread_of_a_generator() {
    assert_eq!(eval("function* three() { yield 1; yield 2; yield 3; } [...three()]"), "[1, 2, 3]");
}

#[test]
fn uncaught_errors_carry_their_message() {
    assert_eq!(eval_throws("throw new RangeError('too far')"), "RangeError: too far");
    assert_eq!(eval_throws("undefinedName"), "ReferenceError: undefinedName is not defined");
}

#[test]
fn strict_mode_forbids_implicit_globals() {
    let thrown = eval_throws("'use strict'; implicit = 1;");
    assert!(thrown.starts_with("ReferenceError"), "{thrown}");
    assert_eq!(eval("implicit = 1; implicit"), "1");
}

#[test]
fn syntax_errors_are_reported_before_running() {
    let mut realm = crate::Realm::new(crate::RealmConfig::default());
    let err = realm.evaluate_program("let x = ;").unwrap_err();
    assert!(matches!(err, crate::EngineError::Syntax(_)));
    assert!(err.to_string().starts_with("SyntaxError: 1:"), "{err}");
}

#[test]
fn finally_break_discards_a_pending_return() {
    let out = eval(
        "function f() { for (;;) { try { return 1; } finally { break; } } return 'after'; }
         function g() { var n = 0; while (n < 3) { n++; try { return 'early'; } finally { continue; } } return n; }
         [f(), g()]",
    );
    assert_eq!(out, "['after', 3]");
}

#[test]
fn finally_jump_replaces_a_pending_jump() {
    let out = eval(
        "var log = [];
         outer: for (var i = 0; i < 2; i++) {
             inner: for (;;) { try { break outer; } finally { break inner; } }
             log.push(i);
         }
         log",
    );
    assert_eq!(out, "[0, 1]");
}

#[test]
fn labelled_break_leaves_a_plain_block() {
    let out = eval(
        "var log = [];
         found: {
             log.push('in');
             if (log.length) break found;
             log.push('skipped');
         }
         log",
    );
    assert_eq!(out, "['in']");
}

#[test]
fn labelled_switch_can_be_left_by_name() {
    let out = eval(
        "function pick(n) {
             var seen = [];
             outer: switch (n) {
                 case 1:
                     for (var i = 0; i < 5; i++) { if (i === 2) break outer; seen.push(i); }
                     seen.push('unreached');
                 default: seen.push('default');
             }
             return seen.join();
         }
         [pick(1), pick(2)]",
    );
    assert_eq!(out, "['0,1', 'default']");
}

#[test]
fn break_keeps_the_completion_value_of_its_loop() {
    assert_eq!(eval("a: while (true) { 1; break a; }"), "1");
    assert_eq!(eval("while (true) { 'plain'; break; }"), "plain");
    assert_eq!(eval("b: { 'block'; break b; }"), "block");
    assert_eq!(eval("var i = 0; do { i++; 'kept'; continue; } while (i < 2)"), "kept");
}

#[test]
fn unknown_labels_are_rejected_before_running() {
    let mut realm = crate::Realm::new(crate::RealmConfig::default());
    let err = realm.evaluate_program("while (true) { break nowhere; }").unwrap_err();
    assert!(matches!(err, crate::EngineError::Syntax(_)), "{err}");
    let err = realm.evaluate_program("plain: { continue plain; }").unwrap_err();
    assert!(matches!(err, crate::EngineError::Syntax(_)), "{err}");
}

#[test]
fn thrown_objects_reach_the_host_unchanged() {
    let mut realm = crate::Realm::new(crate::RealmConfig::default());
    let err = realm.evaluate_program("var payload = { a: 1 }; throw payload;").unwrap_err();
    let thrown = err.thrown().cloned().expect("a guest throw");
    assert_eq!(thrown.as_object(), realm.get_global("payload").and_then(|v| v.as_object()));
    assert_eq!(realm.display(&thrown), "{ a: 1 }");

    let err = realm.evaluate_program("throw { a: 1 }").unwrap_err();
    let crate::EngineError::Throw(thrown) = err else {
        panic!("expected a guest throw, got {err}");
    };
    assert_eq!(thrown.rendered, "{ a: 1 }");
}

#[test]
fn runaway_recursion_throws_a_range_error() {
    assert_eq!(
        eval("function f() { return f(); } try { f(); } catch (e) { [e instanceof RangeError, e.message].join(': ') }"),
        "true: Maximum call stack size exceeded"
    );
    assert!(eval_throws("function f() { return f(); } f()").starts_with("RangeError"));
}

#[test]
fn call_depth_limit_is_configurable() {
    let config = crate::RealmConfig::builder().max_call_depth(5).build();
    let mut realm = crate::Realm::new(config);
    let depth = realm
        .evaluate_program(
            "let deepest = 0;
             function down(n) { deepest = n; down(n + 1); }
             try { down(1); } catch (e) {}
             deepest",
        )
        .unwrap();
    assert_eq!(depth.as_number(), Some(5.0));
    // The stack unwound: ordinary calls work again.
    let sum = realm.evaluate_expression("[1, 2, 3].map(x => x * 2).reduce((a, b) => a + b)").unwrap();
    assert_eq!(sum.as_number(), Some(12.0));
}
