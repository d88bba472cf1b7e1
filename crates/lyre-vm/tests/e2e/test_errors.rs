use super::helpers::*;

#[test]
fn test_assert_failure() {
    let e = run_err("assert false\n");
    assert!(e.contains("[Assertion error] Assertion failed"), "{e}");
}

#[test]
fn test_assert_with_message() {
    let e = run_err("assert 1 == 2, \"math is broken\"\n");
    assert!(e.contains("[Assertion error] math is broken"), "{e}");
}

#[test]
fn test_assert_success_is_silent() {
    run("assert true\nassert 1 == 1, \"never shown\"\n");
}

#[test]
fn test_throw_with_string() {
    let e = run_err("throw \"boom\"\n");
    assert!(e.contains("boom"), "{e}");
}

#[test]
fn test_reserved_words_cannot_be_identifiers() {
    let e = run_err("local super = 1\n");
    assert!(e.contains("Expected an identifier"), "{e}");
    let e = run_err("local explicit = 2\n");
    assert!(e.contains("Expected an identifier"), "{e}");
}

#[test]
fn test_unhashable_key_error_names_the_class() {
    let e = run_err("local t = {[1, 2]: 3}\n");
    assert!(e.contains("[Type error] List is not hashable"), "{e}");
}

#[test]
fn test_incomparable_error_names_both_classes() {
    let e = run_err("local x = [1] < [2]\n");
    assert!(e.contains("[Type error] Cannot compare List and List"), "{e}");
}

#[test]
fn test_break_outside_loop_is_reported() {
    let e = run_err("break\n");
    assert!(e.contains("\"break\" outside of a loop"), "{e}");
}

#[test]
fn test_error_carries_line_number() {
    let e = run_err("local x = 1\nassert false\n");
    assert!(e.starts_with("Error at line 2:"), "{e}");
}

#[test]
fn test_undefined_variable() {
    let e = run_err("print y\n");
    assert!(
        e.contains("[Name error] Undefined variable \"y\""),
        "{e}"
    );
}

#[test]
fn test_compile_error_reports_line() {
    let mut rt = lyre_vm::Runtime::new();
    let e = rt.do_string("local x = 1\nlocal x = 2\n").unwrap_err();
    assert_eq!(e.line, Some(2));
    assert!(e.message.contains("already defined"), "{}", e.message);
}

#[test]
fn test_error_inside_function_reports_call_line() {
    let source = r#"
function fail()
    throw "inner"
end
fail()
"#;
    let e = run_err(source);
    assert!(e.contains("inner"), "{e}");
    assert!(e.contains("line 3"), "{e}");
}

#[test]
fn test_runtime_survives_an_error() {
    let mut rt = lyre_vm::Runtime::new();
    rt.capture_output(true);
    assert!(rt.do_string("throw \"first\"\n").is_err());
    rt.do_string("print \"still alive\"\n").unwrap();
    assert_eq!(rt.take_output(), "still alive\n");
}
