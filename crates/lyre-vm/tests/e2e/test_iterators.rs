use super::helpers::*;

#[test]
fn test_foreach_list_values() {
    returns_int(
        "local total = 0\nforeach v in [10, 20, 30] do\ntotal += v\nend\nreturn total\n",
        60,
    );
}

#[test]
fn test_foreach_list_keys_are_positions() {
    let source = r#"
local keys = ""
foreach k, v in ["a", "b", "c"] do
    keys &= k
end
assert keys == "123"
"#;
    run(source);
}

#[test]
fn test_foreach_table_preserves_insertion_order() {
    let source = r#"
local t = {"a": 1, "b": 2, "c": 3}
local keys = ""
local sum = 0
foreach k, v in t do
    keys &= k
    sum += v
end
assert keys == "abc"
assert sum == 6
"#;
    run(source);
}

#[test]
fn test_foreach_string_yields_graphemes() {
    let source = r#"
local out = ""
local count = 0
foreach c in "héllo" do
    out &= c
    count += 1
end
assert out == "héllo"
assert count == 5
"#;
    run(source);
}

#[test]
fn test_foreach_ref_mutates_list_in_place() {
    let source = r#"
local xs = [1, 2, 3]
foreach ref v in xs do
    v *= 2
end
assert xs[1] == 2
assert xs[2] == 4
assert xs[3] == 6
"#;
    run(source);
}

#[test]
fn test_foreach_ref_mutates_table_values() {
    let source = r#"
local t = {"a": 1, "b": 2}
foreach k, ref v in t do
    v += 10
end
assert t["a"] == 11
assert t["b"] == 12
"#;
    run(source);
}

#[test]
fn test_foreach_without_ref_leaves_list_alone() {
    let source = r#"
local xs = [1, 2, 3]
foreach v in xs do
    v = v * 2
end
assert xs[1] == 1
"#;
    run(source);
}

#[test]
fn test_foreach_ref_over_string_raises() {
    let e = run_err("foreach ref c in \"abc\" do\npass\nend\n");
    assert!(e.contains("[Reference error]"), "{e}");
}

#[test]
fn test_foreach_set() {
    let source = r#"
local sum = 0
foreach v in {1, 2, 3} do
    sum += v
end
assert sum == 6
"#;
    run(source);
}

#[test]
fn test_foreach_array() {
    let source = r#"
local sum = 0.0
foreach x in @[1, 2, 3] do
    sum += x
end
assert sum == 6.0
"#;
    run(source);
}

#[test]
fn test_foreach_empty_collection() {
    returns_int("local n = 0\nforeach v in [] do\nn += 1\nend\nreturn n\n", 0);
}

#[test]
fn test_iterating_a_scalar_raises() {
    let e = run_err("foreach v in 42 do\npass\nend\n");
    assert!(e.contains("is not iterable"), "{e}");
}
