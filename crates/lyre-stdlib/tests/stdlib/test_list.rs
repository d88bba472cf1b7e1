use super::helpers::*;

#[test]
fn test_append_and_prepend() {
    let source = r#"
local xs = [2]
xs.append(3)
xs.prepend(1)
assert len(xs) == 3
assert xs[1] == 1
assert xs[3] == 3
"#;
    run(source);
}

#[test]
fn test_first_and_last() {
    run("local xs = [10, 20, 30]\nassert xs.first() == 10\nassert xs.last() == 30\n");
}

#[test]
fn test_first_on_empty_raises() {
    let e = run_err("[].first()\n");
    assert!(e.contains("List is empty"), "{e}");
}

#[test]
fn test_sorted_returns_a_copy() {
    let source = r#"
local xs = [3, 1, 2]
local ys = xs.sorted()
assert ys[1] == 1
assert ys[3] == 3
assert xs[1] == 3
"#;
    run(source);
}

#[test]
fn test_sorted_strings() {
    let source = r#"
local ys = ["pear", "apple", "fig"].sorted()
assert ys[1] == "apple"
assert ys[3] == "pear"
"#;
    run(source);
}

#[test]
fn test_sorted_mixed_types_raises() {
    let e = run_err("[1, \"a\"].sorted()\n");
    assert!(e.contains("[Type error]"), "{e}");
}

#[test]
fn test_reversed() {
    let source = r#"
local ys = [1, 2, 3].reversed()
assert ys[1] == 3
assert ys[3] == 1
"#;
    run(source);
}

#[test]
fn test_join() {
    run("assert [1, 2, 3].join(\", \") == \"1, 2, 3\"\n");
}

#[test]
fn test_contains() {
    run("assert [1, 2].contains(2)\nassert not [1, 2].contains(5)\n");
}

#[test]
fn test_pop() {
    let source = r#"
local xs = [1, 2, 3]
assert xs.pop() == 3
assert len(xs) == 2
"#;
    run(source);
}

#[test]
fn test_pop_empty_raises() {
    let e = run_err("[].pop()\n");
    assert!(e.contains("Cannot pop an empty list"), "{e}");
}

#[test]
fn test_clear() {
    run("local xs = [1, 2]\nxs.clear()\nassert len(xs) == 0\n");
}
