use super::helpers::*;

#[test]
fn test_simple_call() {
    let source = r#"
function double(x)
    return x * 2
end
return double(21)
"#;
    returns_int(source, 42);
}

#[test]
fn test_recursion() {
    let source = r#"
function fib(n)
    if n < 2 then
        return n
    end
    return fib(n - 1) + fib(n - 2)
end
return fib(15)
"#;
    returns_int(source, 610);
}

#[test]
fn test_function_without_return_yields_null() {
    let source = r#"
function noop()
    pass
end
assert noop() == null
"#;
    run(source);
}

#[test]
fn test_typed_parameters_dispatch() {
    let source = r#"
function describe(x as Integer)
    return "int"
end
function describe(x as String)
    return "str"
end
function describe(x as List)
    return "list"
end
assert describe(1) == "int"
assert describe("a") == "str"
assert describe([1]) == "list"
"#;
    run(source);
}

#[test]
fn test_overload_prefers_most_specific() {
    let source = r#"
function describe(x as Object)
    return "object"
end
function describe(x as Number)
    return "number"
end
function describe(x as Integer)
    return "integer"
end
assert describe(1) == "integer"
assert describe(1.5) == "number"
assert describe(true) == "object"
"#;
    run(source);
}

#[test]
fn test_no_matching_overload_raises() {
    let source = r#"
function half(x as Number)
    return x / 2
end
half("oops")
"#;
    let e = run_err(source);
    assert!(e.contains("[Type error] Cannot resolve call"), "{e}");
}

#[test]
fn test_function_expression() {
    let source = r#"
local twice = function (f, x)
    return f(f(x))
end
local inc = function (n)
    return n + 1
end
return twice(inc, 5)
"#;
    returns_int(source, 7);
}

#[test]
fn test_upvalue_capture() {
    let source = r#"
function make_counter()
    local n = 0
    function bump()
        n += 1
        return n
    end
    return bump
end
local c = make_counter()
assert c() == 1
assert c() == 2
assert c() == 3
"#;
    run(source);
}

#[test]
fn test_counters_are_independent() {
    let source = r#"
function make_counter()
    local n = 0
    function bump()
        n += 1
        return n
    end
    return bump
end
local a = make_counter()
local b = make_counter()
a()
a()
assert a() == 3
assert b() == 1
"#;
    run(source);
}

#[test]
fn test_calling_a_non_function_raises() {
    let e = run_err("local x = 3\nx()\n");
    assert!(e.contains("is not callable"), "{e}");
}

#[test]
fn test_runaway_recursion_overflows() {
    let source = r#"
function loop()
    return loop()
end
loop()
"#;
    let e = run_err(source);
    assert!(e.contains("Call stack overflow"), "{e}");
}
