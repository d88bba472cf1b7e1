use super::helpers::*;

#[test]
fn test_print_adds_newline() {
    assert_eq!(output("print \"hello\"\n"), "hello\n");
}

#[test]
fn test_print_concatenates_arguments() {
    assert_eq!(output("print \"a\", \"b\", \"c\"\n"), "abc\n");
}

#[test]
fn test_trailing_comma_suppresses_newline() {
    assert_eq!(output("print \"a\",\nprint \"b\"\n"), "ab\n");
}

#[test]
fn test_print_formats_scalars() {
    assert_eq!(output("print 42\n"), "42\n");
    assert_eq!(output("print 3.5\n"), "3.5\n");
    assert_eq!(output("print 2.0\n"), "2.0\n");
    assert_eq!(output("print true\n"), "true\n");
    assert_eq!(output("print null\n"), "null\n");
}

#[test]
fn test_print_list_quotes_inner_strings() {
    assert_eq!(output("print [1, \"two\"]\n"), "[1, \"two\"]\n");
}

#[test]
fn test_print_table() {
    assert_eq!(output("print {\"a\": 1}\n"), "{a: 1}\n");
}

#[test]
fn test_output_accumulates() {
    assert_eq!(output("for i = 1 to 3 do\nprint i\nend\n"), "1\n2\n3\n");
}
