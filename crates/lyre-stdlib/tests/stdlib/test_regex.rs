use super::helpers::*;

#[test]
fn test_construct_and_pattern() {
    run("local re = Regex(\"a(b+)c\")\nassert re.pattern == \"a(b+)c\"\n");
}

#[test]
fn test_invalid_pattern_raises() {
    let e = run_err("Regex(\"(unclosed\")\n");
    assert!(e.contains("[Regex error]"), "{e}");
}

#[test]
fn test_match_and_groups() {
    let source = r#"
local re = Regex("(\\w+)@(\\w+)")
assert re.match("write to ada@lovelace today")
assert re.has_match()
assert re.count() == 2
assert re.group(0) == "ada@lovelace"
assert re.group(1) == "ada"
assert re.group(2) == "lovelace"
"#;
    run(source);
}

#[test]
fn test_failed_match_clears_captures() {
    let source = r#"
local re = Regex("\\d+")
assert re.match("42")
assert not re.match("none")
assert not re.has_match()
assert re.count() == 0
"#;
    run(source);
}

#[test]
fn test_group_out_of_range_raises() {
    let source = r#"
local re = Regex("(a)")
re.match("a")
re.group(5)
"#;
    let e = run_err(source);
    assert!(e.contains("Invalid group index"), "{e}");
}

#[test]
fn test_optional_group_yields_null() {
    let source = r#"
local re = Regex("(a)(b)?")
assert re.match("a")
assert re.group(2) == null
"#;
    run(source);
}

#[test]
fn test_iterating_a_regex_yields_capture_groups() {
    let source = r#"
local re = Regex("(\\d+)-(\\d+)")
assert re.match("10-20")
local got = []
foreach g in re do
    got.append(g)
end
assert len(got) == 2
assert got[1] == "10"
assert got[2] == "20"
"#;
    run(source);
}
