use super::helpers::*;

#[test]
fn test_type_returns_the_class() {
    run("assert type(3) == Integer\nassert type(3.5) == Float\nassert type(\"s\") == String\n");
    run("assert type([1]) == List\nassert type({}) == Table\nassert type(null) == Null\n");
}

#[test]
fn test_type_prints_class_name() {
    assert_eq!(output("print type(true)\n"), "<class Boolean>\n");
}

#[test]
fn test_len() {
    run("assert len(\"héllo\") == 5\nassert len([1, 2, 3]) == 3\nassert len({\"a\": 1}) == 1\n");
    run("assert len({1, 2, 2}) == 2\n");
}

#[test]
fn test_len_of_scalar_raises() {
    let e = run_err("len(42)\n");
    assert!(e.contains("[Type error]"), "{e}");
}

#[test]
fn test_str_conversion() {
    run("assert str(42) == \"42\"\nassert str(true) == \"true\"\nassert str(null) == \"null\"\n");
}

#[test]
fn test_min_max() {
    run("assert min(1, 2) == 1\nassert max(1, 2) == 2\nassert min(1.5, 1) == 1\n");
}

#[test]
fn test_contains_generic() {
    run("assert contains(\"hello\", \"ell\")\nassert contains([1, 2], 2)\n");
    run("assert contains({\"a\": 1}, \"a\")\nassert not contains({1, 2}, 3)\n");
}
