use lyre_vm::Runtime;

/// A runtime with the full standard library registered.
pub fn make_runtime() -> Runtime {
    let mut rt = Runtime::new();
    lyre_stdlib::register_all(&mut rt);
    rt.capture_output(true);
    rt
}

/// Run a script to completion, panicking on any error.
pub fn run(source: &str) -> Runtime {
    let mut rt = make_runtime();
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
    let mut rt = make_runtime();
    match rt.do_string(source) {
        Err(e) => format!("{e}"),
        Ok(v) => panic!("expected an error, got {v:?}"),
    }
}
