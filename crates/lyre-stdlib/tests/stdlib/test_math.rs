use super::helpers::*;

#[test]
fn test_abs() {
    run("assert abs(-3) == 3\nassert abs(3) == 3\nassert abs(-2.5) == 2.5\n");
}

#[test]
fn test_rounding() {
    run("assert ceil(1.2) == 2.0\nassert floor(1.8) == 1.0\nassert round(1.5) == 2.0\n");
}

#[test]
fn test_sqrt_and_exp_log() {
    let source = r#"
assert sqrt(16) == 4.0
assert log2(8) == 3.0
assert log10(1000) == 3.0
assert abs(log(exp(1)) - 1.0) < 0.000000000001
"#;
    run(source);
}

#[test]
fn test_trig_identity() {
    run("local x = 0.7\nassert abs(sin(x) ^ 2 + cos(x) ^ 2 - 1.0) < 0.000000000001\n");
}

#[test]
fn test_constants() {
    run("assert PI > 3.14 and PI < 3.15\nassert E > 2.71 and E < 2.72\n");
}

#[test]
fn test_random_is_in_unit_interval() {
    let source = r#"
for i = 1 to 100 do
    local x = random()
    assert x >= 0.0 and x < 1.0
end
"#;
    run(source);
}

#[test]
fn test_random_range_is_inclusive() {
    let source = r#"
set_seed(7)
for i = 1 to 200 do
    local n = random(1, 3)
    assert n >= 1 and n <= 3
end
"#;
    run(source);
}

#[test]
fn test_set_seed_makes_runs_reproducible() {
    let script = "set_seed(42)\nlocal out = \"\"\nfor i = 1 to 5 do\nout &= random(0, 9)\nend\nreturn out\n";
    let mut a = make_runtime();
    let mut b = make_runtime();
    let x = a.do_string(script).unwrap();
    let y = b.do_string(script).unwrap();
    assert_eq!(a.to_string_value(&x), b.to_string_value(&y));
}
