use super::helpers::*;
use std::path::PathBuf;

fn scratch_path(name: &str) -> PathBuf {
    let mut p = std::env::temp_dir();
    p.push(format!("lyre_test_{}_{name}", std::process::id()));
    p
}

#[test]
fn test_write_then_read_back() {
    let path = scratch_path("roundtrip.txt");
    let path_str = path.display().to_string();
    let source = format!(
        r#"
local f = File("{path_str}", "w")
f.write_line("first")
f.write_line("second")
f.close()
local g = File("{path_str}")
assert g.read_line() == "first"
assert g.read_line() == "second"
assert g.read_line() == null
assert g.eof()
g.close()
"#
    );
    run(&source);
    std::fs::remove_file(&path).ok();
}

#[test]
fn test_read_all() {
    let path = scratch_path("read_all.txt");
    std::fs::write(&path, "one\ntwo\n").unwrap();
    let source = format!(
        "local f = File(\"{}\")\nassert f.read_all() == \"one\\ntwo\\n\"\nf.close()\n",
        path.display()
    );
    run(&source);
    std::fs::remove_file(&path).ok();
}

#[test]
fn test_iterate_lines() {
    let path = scratch_path("lines.txt");
    std::fs::write(&path, "alpha\nbeta\ngamma\n").unwrap();
    let source = format!(
        r#"
local f = File("{}")
local numbered = []
foreach n, line in f do
    numbered.append(n & ":" & line)
end
assert len(numbered) == 3
assert numbered[1] == "1:alpha"
assert numbered[3] == "3:gamma"
"#,
        path.display()
    );
    run(&source);
    std::fs::remove_file(&path).ok();
}

#[test]
fn test_rewind() {
    let path = scratch_path("rewind.txt");
    std::fs::write(&path, "top\nrest\n").unwrap();
    let source = format!(
        r#"
local f = File("{}")
assert f.read_line() == "top"
f.rewind()
assert f.read_line() == "top"
"#,
        path.display()
    );
    run(&source);
    std::fs::remove_file(&path).ok();
}

#[test]
fn test_missing_file_raises() {
    let e = run_err("File(\"/nonexistent/lyre/file.txt\")\n");
    assert!(e.contains("[Input/Output error]"), "{e}");
}

#[test]
fn test_write_to_read_file_raises() {
    let path = scratch_path("readonly.txt");
    std::fs::write(&path, "x\n").unwrap();
    let source = format!(
        "local f = File(\"{}\")\nf.write(\"nope\")\n",
        path.display()
    );
    let e = run_err(&source);
    assert!(e.contains("not open for writing"), "{e}");
    std::fs::remove_file(&path).ok();
}

#[test]
fn test_closed_file_raises() {
    let path = scratch_path("closed.txt");
    std::fs::write(&path, "x\n").unwrap();
    let source = format!(
        "local f = File(\"{}\")\nf.close()\nf.read_line()\n",
        path.display()
    );
    let e = run_err(&source);
    assert!(e.contains("is closed"), "{e}");
    std::fs::remove_file(&path).ok();
}

#[test]
fn test_append_mode() {
    let path = scratch_path("append.txt");
    std::fs::write(&path, "old\n").unwrap();
    let source = format!(
        r#"
local f = File("{p}", "a")
f.write_line("new")
f.close()
local g = File("{p}")
assert g.read_line() == "old"
assert g.read_line() == "new"
"#,
        p = path.display()
    );
    run(&source);
    std::fs::remove_file(&path).ok();
}

#[test]
fn test_invalid_mode_raises() {
    let e = run_err("File(\"whatever.txt\", \"x\")\n");
    assert!(e.contains("Invalid file mode"), "{e}");
}
