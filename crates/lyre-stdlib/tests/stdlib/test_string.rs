use super::helpers::*;

#[test]
fn test_length_accessor() {
    run("local s = \"héllo\"\nassert s.length == 5\nassert \"\".length == 0\n");
}

#[test]
fn test_contains_and_affixes() {
    let source = r#"
local s = "phonetics"
assert s.contains("net")
assert not s.contains("xyz")
assert s.starts_with("phone")
assert s.ends_with("tics")
"#;
    run(source);
}

#[test]
fn test_case_conversion() {
    run("assert \"AbC\".to_upper() == \"ABC\"\nassert \"AbC\".to_lower() == \"abc\"\n");
}

#[test]
fn test_reverse_is_grapheme_aware() {
    run("assert \"héllo\".reverse() == \"olléh\"\n");
}

#[test]
fn test_trim() {
    run("assert \"  padded \".trim() == \"padded\"\n");
}

#[test]
fn test_split_and_join_round_trip() {
    let source = r#"
local parts = "a,b,c".split(",")
assert len(parts) == 3
assert parts[1] == "a"
assert parts[3] == "c"
assert parts.join("-") == "a-b-c"
"#;
    run(source);
}

#[test]
fn test_split_on_empty_separator_raises() {
    let e = run_err("\"abc\".split(\"\")\n");
    assert!(e.contains("[Value error]"), "{e}");
}

#[test]
fn test_find_returns_one_based_position() {
    let source = r#"
assert "hello".find("ll") == 3
assert "hello".find("zz") == 0
assert "héllo".find("llo") == 3
"#;
    run(source);
}

#[test]
fn test_methods_do_not_mutate_receiver() {
    let source = r#"
local s = "abc"
local t = s.to_upper()
assert s == "abc"
assert t == "ABC"
"#;
    run(source);
}
