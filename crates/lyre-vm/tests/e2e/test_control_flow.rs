use super::helpers::*;

#[test]
fn test_if_else() {
    returns_str(
        "local x = 10\nif x > 5 then\nreturn \"big\"\nelse\nreturn \"small\"\nend\n",
        "big",
    );
}

#[test]
fn test_elsif_chain() {
    let source = r#"
function grade(n)
    if n >= 90 then
        return "A"
    elsif n >= 80 then
        return "B"
    elsif n >= 70 then
        return "C"
    else
        return "F"
    end
end
assert grade(95) == "A"
assert grade(85) == "B"
assert grade(71) == "C"
assert grade(10) == "F"
"#;
    run(source);
}

#[test]
fn test_while_loop() {
    returns_int("local n = 0\nwhile n < 10 do\nn += 1\nend\nreturn n\n", 10);
}

#[test]
fn test_repeat_until_runs_at_least_once() {
    returns_int("local n = 100\nrepeat\nn += 1\nuntil true\nreturn n\n", 101);
}

#[test]
fn test_repeat_until() {
    returns_int("local n = 0\nrepeat\nn += 1\nuntil n >= 3\nreturn n\n", 3);
}

#[test]
fn test_for_to() {
    returns_int("local sum = 0\nfor i = 1 to 5 do\nsum += i\nend\nreturn sum\n", 15);
}

#[test]
fn test_for_to_with_step() {
    // 1, 3, 5, 7, 9
    returns_int("local sum = 0\nfor i = 1 to 10 step 2 do\nsum += i\nend\nreturn sum\n", 25);
}

#[test]
fn test_for_downto() {
    returns_str(
        "local s = \"\"\nfor i = 3 downto 1 do\ns &= i\nend\nreturn s\n",
        "321",
    );
}

#[test]
fn test_for_downto_with_step() {
    // 10, 7, 4, 1
    returns_int(
        "local hits = 0\nfor i = 10 downto 1 step 3 do\nhits += 1\nend\nreturn hits\n",
        4,
    );
}

#[test]
fn test_empty_for_range_does_not_run() {
    returns_int("local hits = 0\nfor i = 5 to 1 do\nhits += 1\nend\nreturn hits\n", 0);
}

#[test]
fn test_break() {
    let source = r#"
local n = 0
while true do
    n += 1
    if n == 4 then
        break
    end
end
return n
"#;
    returns_int(source, 4);
}

#[test]
fn test_continue() {
    let source = r#"
local sum = 0
for i = 1 to 10 do
    if i % 2 == 0 then
        continue
    end
    sum += i
end
return sum
"#;
    returns_int(source, 25);
}

#[test]
fn test_nested_loops_break_inner_only() {
    let source = r#"
local count = 0
for i = 1 to 3 do
    for j = 1 to 10 do
        if j == 2 then
            break
        end
        count += 1
    end
end
return count
"#;
    returns_int(source, 3);
}

#[test]
fn test_conditional_expression() {
    returns_str("local x = 10\nreturn \"big\" if x > 5 else \"small\"\n", "big");
    returns_str("local x = 1\nreturn \"big\" if x > 5 else \"small\"\n", "small");
}

#[test]
fn test_and_or_short_circuit() {
    let source = r#"
function boom()
    throw "should not run"
end
assert not (false and boom())
assert true or boom()
"#;
    run(source);
}

#[test]
fn test_condition_must_be_boolean() {
    let e = run_err("if 1 then\npass\nend\n");
    assert!(e.contains("[Type error]"), "{e}");
}

#[test]
fn test_do_block_scopes_locals() {
    let source = r#"
local x = 1
do
    local x = 2
    assert x == 2
end
assert x == 1
"#;
    run(source);
}
