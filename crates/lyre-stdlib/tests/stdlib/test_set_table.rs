use super::helpers::*;

#[test]
fn test_table_keys_preserve_order() {
    let source = r#"
local t = {"b": 2, "a": 1}
local ks = t.keys()
assert ks[1] == "b"
assert ks[2] == "a"
"#;
    run(source);
}

#[test]
fn test_table_values() {
    let source = r#"
local t = {"a": 1, "b": 2}
local vs = t.values()
assert vs[1] == 1
assert vs[2] == 2
"#;
    run(source);
}

#[test]
fn test_table_get_is_lenient() {
    let source = r#"
local t = {"a": 1}
assert t.get("a") == 1
assert t.get("missing") == null
assert t.get("missing", 0) == 0
"#;
    run(source);
}

#[test]
fn test_table_contains_remove() {
    let source = r#"
local t = {"a": 1, "b": 2}
assert t.contains("a")
t.remove("a")
assert not t.contains("a")
assert t.contains("b")
"#;
    run(source);
}

#[test]
fn test_table_clear_and_is_empty() {
    let source = r#"
local t = {"a": 1}
assert not t.is_empty()
t.clear()
assert t.is_empty()
"#;
    run(source);
}

#[test]
fn test_set_insert_remove_contains() {
    let source = r#"
local s = {1, 2}
assert s.contains(1)
s.insert(3)
assert s.contains(3)
assert len(s) == 3
s.remove(1)
assert not s.contains(1)
"#;
    run(source);
}

#[test]
fn test_set_is_empty() {
    let source = r#"
local s = {1}
assert not s.is_empty()
s.remove(1)
assert s.is_empty()
"#;
    run(source);
}

#[test]
fn test_unhashable_set_member_raises() {
    let e = run_err("local s = {1}\ns.insert([1])\n");
    assert!(e.contains("[Type error]"), "{e}");
}
