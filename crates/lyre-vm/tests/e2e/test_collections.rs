use super::helpers::*;

#[test]
fn test_list_literal_and_indexing() {
    let source = r#"
local xs = [10, 20, 30]
assert xs[1] == 10
assert xs[3] == 30
assert xs[-1] == 30
assert xs[-3] == 10
"#;
    run(source);
}

#[test]
fn test_list_index_out_of_range() {
    let e = run_err("local xs = [1, 2]\nreturn xs[5]\n");
    assert!(e.contains("[Index error] Index 5 out of range"), "{e}");
}

#[test]
fn test_list_element_assignment() {
    returns_int("local xs = [1, 2, 3]\nxs[2] = 99\nreturn xs[2]\n", 99);
}

#[test]
fn test_list_copy_on_write() {
    let source = r#"
local a = [1, 2]
local b = a
b[1] = 99
assert a[1] == 1
assert b[1] == 99
"#;
    run(source);
}

#[test]
fn test_nested_list_assignment() {
    let source = r#"
local grid = [[1, 2], [3, 4]]
grid[2][1] = 30
assert grid[2][1] == 30
assert grid[1][1] == 1
"#;
    run(source);
}

#[test]
fn test_table_literal_and_keys() {
    let source = r#"
local t = {"name": "lyre", "version": 1}
assert t["name"] == "lyre"
assert t["version"] == 1
"#;
    run(source);
}

#[test]
fn test_table_field_sugar() {
    let source = r#"
local t = {}
t.name = "lyre"
assert t.name == "lyre"
assert t["name"] == "lyre"
"#;
    run(source);
}

#[test]
fn test_table_missing_key_raises() {
    let e = run_err("local t = {\"a\": 1}\nreturn t[\"b\"]\n");
    assert!(e.contains("[Index error] Missing key"), "{e}");
}

#[test]
fn test_table_mixed_key_types() {
    let source = r#"
local t = {1: "one", "two": 2, true: "yes"}
assert t[1] == "one"
assert t["two"] == 2
assert t[true] == "yes"
"#;
    run(source);
}

#[test]
fn test_set_literal_membership_via_iteration() {
    let source = r#"
local s = {1, 2, 2, 3}
local count = 0
foreach v in s do
    count += 1
end
assert count == 3
"#;
    run(source);
}

#[test]
fn test_string_indexing_is_grapheme_based() {
    let source = r#"
local s = "héllo"
assert s[1] == "h"
assert s[2] == "é"
assert s[-1] == "o"
"#;
    run(source);
}

#[test]
fn test_array_literal_and_indexing() {
    let source = r#"
local v = @[1, 2, 3]
assert v[2] == 2.0
local m = @[1, 2; 3, 4]
assert m[2, 1] == 3.0
m[2, 1] = 30
assert m[2, 1] == 30.0
"#;
    run(source);
}

#[test]
fn test_indexing_a_scalar_raises() {
    let e = run_err("local x = 5\nreturn x[1]\n");
    assert!(e.contains("cannot be indexed"), "{e}");
}

#[test]
fn test_deep_value_copy_keeps_nested_lists_apart() {
    let source = r#"
local a = [[1], [2]]
local b = a
b[1][1] = 99
assert a[1][1] == 1
"#;
    run(source);
}
