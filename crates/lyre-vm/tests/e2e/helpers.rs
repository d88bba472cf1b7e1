use lyre_core::value::Variant;
use lyre_vm::Runtime;

/// Run a script to completion, panicking on any error.
pub fn run(source: &str) -> Runtime {
    let mut rt = Runtime::new();
    rt.capture_output(true);
    if let Err(e) = rt.do_string(source) {
        panic!("runtime error: {e}");
    }
    rt
}

/// Run a script and return everything it printed.
pub fn output(source: &str) -> String {
    let mut rt = run(source);
    rt.take_output()
}

/// Run a script that must fail, returning the formatted error.
pub fn run_err(source: &str) -> String {
    let mut rt = Runtime::new();
    rt.capture_output(true);
    match rt.do_string(source) {
        Err(e) => format!("{e}"),
        Ok(v) => panic!("expected an error, got {v:?}"),
    }
}

/// Run a script ending in `return`, checking the integer result.
pub fn returns_int(source: &str, expected: i64) {
    let mut rt = Runtime::new();
    rt.capture_output(true);
    let v = rt
        .do_string(source)
        .unwrap_or_else(|e| panic!("runtime error: {e}"));
    match rt.heap.deref(v) {
        Variant::Integer(i) => assert_eq!(i, expected),
        other => panic!("expected integer {expected}, got {other:?}"),
    }
}

/// Run a script ending in `return`, checking the string result.
pub fn returns_str(source: &str, expected: &str) {
    let mut rt = Runtime::new();
    rt.capture_output(true);
    let v = rt
        .do_string(source)
        .unwrap_or_else(|e| panic!("runtime error: {e}"));
    assert_eq!(rt.to_string_value(&v), expected);
}
