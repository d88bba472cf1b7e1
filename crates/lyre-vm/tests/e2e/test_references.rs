use super::helpers::*;

#[test]
fn test_ref_parameter_mutates_caller_local() {
    let source = r#"
function bump(ref x)
    x += 1
end
local n = 41
bump(n)
assert n == 42
"#;
    run(source);
}

#[test]
fn test_ref_parameter_mutates_global() {
    let source = r#"
counter = 0
function bump(ref x)
    x += 1
end
bump(counter)
bump(counter)
assert counter == 2
"#;
    run(source);
}

#[test]
fn test_ref_parameter_replaces_whole_value() {
    let source = r#"
function clear(ref x)
    x = []
end
local xs = [1, 2, 3]
clear(xs)
local n = 0
foreach v in xs do
    n += 1
end
assert n == 0
"#;
    run(source);
}

#[test]
fn test_ref_parameter_into_list_element() {
    let source = r#"
function bump(ref x)
    x += 1
end
local xs = [1, 2, 3]
bump(xs[2])
assert xs[2] == 3
"#;
    run(source);
}

#[test]
fn test_ref_parameter_into_table_value() {
    let source = r#"
function bump(ref x)
    x += 1
end
local t = {"hits": 0}
bump(t["hits"])
assert t["hits"] == 1
"#;
    run(source);
}

#[test]
fn test_literal_argument_to_ref_parameter_raises() {
    let source = r#"
function bump(ref x)
    x += 1
end
bump(5)
"#;
    let e = run_err(source);
    assert!(e.contains("[Reference error]"), "{e}");
}

#[test]
fn test_value_parameter_copies_scalars() {
    let source = r#"
function bump(x)
    x += 1
    return x
end
local n = 1
assert bump(n) == 2
assert n == 1
"#;
    run(source);
}

#[test]
fn test_mixed_ref_and_value_parameters() {
    let source = r#"
function swapmax(ref target, candidate)
    if candidate > target then
        target = candidate
    end
end
local best = 3
swapmax(best, 10)
assert best == 10
swapmax(best, 7)
assert best == 10
"#;
    run(source);
}

#[test]
fn test_returned_ref_parameter_is_dereferenced() {
    let source = r#"
function tie(ref a)
    return a
end
local x = [1]
local y = tie(x)
y = null
assert x != null
"#;
    run(source);
}
