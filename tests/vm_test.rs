use isojs::vm::{Vm, RESTRICTED_GLOBALS};
use serde_json::json;

#[test]
fn test_basic_eval() {
    let vm = Vm::new().unwrap();
    assert_eq!(vm.evaluate(b"1 + 2").unwrap(), json!(3));
}

#[test]
fn test_string_eval() {
    let vm = Vm::new().unwrap();
    assert_eq!(
        vm.evaluate(b"'Hello' + ' ' + 'World'").unwrap(),
        json!("Hello World")
    );
}

#[test]
fn test_last_expression_is_the_result() {
    let vm = Vm::new().unwrap();
    let result = vm
        .evaluate(
            br#"
        var x = 20;
        x;
    "#,
        )
        .unwrap();
    assert_eq!(result, json!(20));
}

#[test]
fn test_float_export() {
    let vm = Vm::new().unwrap();
    assert_eq!(vm.evaluate(b"1.5 + 2.25").unwrap(), json!(3.75));
}

#[test]
fn test_bool_export() {
    let vm = Vm::new().unwrap();
    assert_eq!(vm.evaluate(b"1 < 2").unwrap(), json!(true));
}

#[test]
fn test_array_export() {
    let vm = Vm::new().unwrap();
    assert_eq!(
        vm.evaluate(b"[1, 'two', [3]]").unwrap(),
        json!([1, "two", [3]])
    );
}

#[test]
fn test_object_export() {
    let vm = Vm::new().unwrap();
    let result = vm
        .evaluate(b"({ name: 'test', value: 42, nested: { ok: true } });")
        .unwrap();
    assert_eq!(result, json!({ "name": "test", "value": 42, "nested": { "ok": true } }));
}

#[test]
fn test_undefined_exports_as_null() {
    let vm = Vm::new().unwrap();
    assert_eq!(vm.evaluate(b"undefined").unwrap(), json!(null));
    assert_eq!(vm.evaluate(b"var y = 1;").unwrap(), json!(null));
}

#[test]
fn test_capability_strip() {
    let vm = Vm::new().unwrap();
    for name in RESTRICTED_GLOBALS {
        if name.contains('.') {
            continue;
        }
        let result = vm.evaluate(format!("typeof {name};").as_bytes()).unwrap();
        assert_eq!(result, json!("undefined"), "global {name} is reachable");
    }
}

#[test]
fn test_multiple_globals_stripped_in_one_script() {
    let vm = Vm::new().unwrap();
    let result = vm.evaluate(b"typeof fetch === 'undefined' && typeof require === 'undefined'");
    assert_eq!(result.unwrap(), json!(true));
}

#[test]
fn test_thrown_error_carries_message() {
    let vm = Vm::new().unwrap();
    let err = vm.evaluate(b"throw new Error('boom');").unwrap_err();
    assert!(err.contains("boom"), "unexpected error text: {err}");
}

#[test]
fn test_syntax_error_is_reported() {
    let vm = Vm::new().unwrap();
    assert!(vm.evaluate(b"function {").is_err());
}

#[test]
fn test_interrupt_stops_infinite_loop() {
    let vm = Vm::new().unwrap();
    let handle = vm.handle();

    let evaluator = std::thread::spawn(move || vm.evaluate(b"while (true) {}"));
    std::thread::sleep(std::time::Duration::from_millis(100));

    handle.interrupt("test");
    // Idempotent: a second trigger changes nothing.
    handle.interrupt("test again");

    let result = evaluator.join().unwrap();
    assert!(result.is_err());
}

#[test]
fn test_fresh_vm_is_unaffected_by_old_interrupt() {
    let vm = Vm::new().unwrap();
    vm.handle().interrupt("stale");

    let fresh = Vm::new().unwrap();
    assert_eq!(fresh.evaluate(b"40 + 2").unwrap(), json!(42));
}
