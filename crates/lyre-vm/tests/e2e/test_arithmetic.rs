use super::helpers::*;

#[test]
fn test_integer_add() {
    returns_int("return 1 + 2\n", 3);
}

#[test]
fn test_locals_add() {
    returns_int("local x = 10\nlocal y = 20\nreturn x + y\n", 30);
}

#[test]
fn test_precedence() {
    returns_int("return 2 + 3 * 4\n", 14);
    returns_int("return (2 + 3) * 4\n", 20);
}

#[test]
fn test_division_is_float() {
    run("assert 7 / 2 == 3.5\nassert 4 / 2 == 2.0\n");
}

#[test]
fn test_power_is_float() {
    run("assert 2 ^ 10 == 1024.0\n");
}

#[test]
fn test_mixed_arithmetic_promotes() {
    run("assert 1 + 0.5 == 1.5\nassert 2 * 1.5 == 3.0\n");
}

#[test]
fn test_modulus() {
    returns_int("return 10 % 3\n", 1);
}

#[test]
fn test_negation() {
    returns_int("local x = 5\nreturn -x\n", -5);
}

#[test]
fn test_integer_overflow_raises() {
    let e = run_err("return 9223372036854775807 + 1\n");
    assert!(e.contains("[Math error] Integer overflow"), "{e}");
}

#[test]
fn test_integer_modulus_by_zero_raises() {
    let e = run_err("return 1 % 0\n");
    assert!(e.contains("[Math error] Division by zero"), "{e}");
}

#[test]
fn test_float_division_by_zero_is_inf() {
    run("assert 1 / 0 > 99999999999999999999.0\n");
}

#[test]
fn test_comparison_operators() {
    run("assert 1 < 2\nassert 2 <= 2\nassert 3 > 2\nassert 3 >= 3\nassert 1 != 2\n");
}

#[test]
fn test_three_way_comparison() {
    run("assert (1 <=> 2) == -1\nassert (2 <=> 2) == 0\nassert (3 <=> 2) == 1\n");
}

#[test]
fn test_compound_assignment() {
    returns_int("local x = 1\nx += 2\nx *= 3\nx -= 4\nreturn x\n", 5);
}

#[test]
fn test_concat() {
    returns_str("return \"a\" & 1 & true\n", "a1true");
}

#[test]
fn test_concat_assignment() {
    returns_str("local s = \"ab\"\ns &= \"cd\"\nreturn s\n", "abcd");
}

#[test]
fn test_type_error_on_bad_operands() {
    let e = run_err("return 1 + \"a\"\n");
    assert!(e.contains("[Type error]"), "{e}");
}
