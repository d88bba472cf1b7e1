use std::io::Read;

use lyre_compiler::{compiler, disasm};
use lyre_core::value::Variant;
use lyre_vm::Runtime;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    let mut script_file: Option<String> = None;
    let mut exec_statements: Vec<String> = Vec::new();
    let mut show_disasm = false;
    let mut show_version = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-v" | "--version" => {
                show_version = true;
                i += 1;
            }
            "--disasm" => {
                show_disasm = true;
                i += 1;
            }
            "-e" => {
                if i + 1 >= args.len() {
                    eprintln!("lyre: '-e' needs argument");
                    std::process::exit(1);
                }
                exec_statements.push(args[i + 1].clone());
                i += 2;
            }
            _ => {
                if args[i].starts_with('-') && args[i] != "-" {
                    // Combined form like -e"print 1"
                    if args[i].starts_with("-e") && args[i].len() > 2 {
                        exec_statements.push(args[i][2..].to_string());
                        i += 1;
                    } else {
                        eprintln!("lyre: unrecognized option '{}'", args[i]);
                        std::process::exit(1);
                    }
                } else {
                    script_file = Some(args[i].clone());
                    if i + 1 < args.len() {
                        eprintln!("lyre: unexpected argument '{}'", args[i + 1]);
                        std::process::exit(1);
                    }
                    break;
                }
            }
        }
    }

    if show_version {
        println!("Lyre {}", env!("CARGO_PKG_VERSION"));
        if script_file.is_none() && exec_statements.is_empty() {
            return;
        }
    }

    if show_disasm {
        for stat in &exec_statements {
            disassemble_source(stat);
        }
        if let Some(ref path) = script_file {
            let source = read_source(path);
            disassemble_source(&source);
        }
        if script_file.is_none() && exec_statements.is_empty() {
            eprintln!("lyre: '--disasm' needs a script or '-e' statement");
            std::process::exit(1);
        }
        return;
    }

    if !exec_statements.is_empty() || script_file.is_some() {
        let mut rt = create_runtime();
        for stat in &exec_statements {
            if let Err(e) = rt.do_string(stat) {
                eprintln!("lyre: {e}");
                std::process::exit(1);
            }
        }
        if let Some(ref path) = script_file {
            let result = if path == "-" {
                let source = read_stdin();
                rt.do_string(&source)
            } else {
                rt.do_file(path)
            };
            if let Err(e) = result {
                eprintln!("lyre: {e}");
                std::process::exit(1);
            }
        }
    } else if stdin_is_tty() {
        println!("Lyre {}", env!("CARGO_PKG_VERSION"));
        run_repl(create_runtime());
    } else {
        let source = read_stdin();
        let mut rt = create_runtime();
        if let Err(e) = rt.do_string(&source) {
            eprintln!("lyre: {e}");
            std::process::exit(1);
        }
    }
}

fn create_runtime() -> Runtime {
    let mut rt = Runtime::new();
    lyre_stdlib::register_all(&mut rt);
    rt
}

fn read_source(path: &str) -> String {
    if path == "-" {
        return read_stdin();
    }
    match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("lyre: cannot open {path}: {e}");
            std::process::exit(1);
        }
    }
}

fn read_stdin() -> String {
    let mut buf = String::new();
    if let Err(e) = std::io::stdin().read_to_string(&mut buf) {
        eprintln!("lyre: cannot read stdin: {e}");
        std::process::exit(1);
    }
    buf
}

fn disassemble_source(source: &str) {
    match compiler::compile(source) {
        Ok(routine) => print!("{}", disasm::disassemble(&routine)),
        Err(e) => {
            eprintln!("lyre: {e}");
            std::process::exit(1);
        }
    }
}

fn run_repl(mut rt: Runtime) {
    let config = rustyline::config::Config::builder()
        .auto_add_history(true)
        .build();

    let mut rl = match rustyline::DefaultEditor::with_config(config) {
        Ok(rl) => rl,
        Err(e) => {
            eprintln!("lyre: cannot initialize line editor: {e}");
            return;
        }
    };

    loop {
        match rl.readline("> ") {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                // Echo expression values by evaluating `return <line>` first.
                // Only lines that parse as an expression take this path, so a
                // failing call is not run a second time below.
                let as_expr = format!("return {line}");
                if compiler::compile(&as_expr).is_ok() {
                    match rt.do_string(&as_expr) {
                        Ok(value) => {
                            if !matches!(value, Variant::Null) {
                                println!("{}", rt.to_string_value(&value));
                            }
                            rt.heap.release(&value);
                        }
                        Err(e) => eprintln!("{e}"),
                    }
                    continue;
                }
                let mut source = line;
                loop {
                    match rt.do_string(&source) {
                        Ok(value) => {
                            if !matches!(value, Variant::Null) {
                                println!("{}", rt.to_string_value(&value));
                            }
                            rt.heap.release(&value);
                            break;
                        }
                        Err(e) => {
                            // A block cut off mid-statement wants more input
                            if e.to_string().contains("Unexpected end of file") {
                                match rl.readline(">> ") {
                                    Ok(cont) => {
                                        source.push('\n');
                                        source.push_str(&cont);
                                    }
                                    Err(_) => {
                                        eprintln!("{e}");
                                        break;
                                    }
                                }
                            } else {
                                eprintln!("{e}");
                                break;
                            }
                        }
                    }
                }
            }
            Err(rustyline::error::ReadlineError::Interrupted) => continue,
            Err(rustyline::error::ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("lyre: readline error: {e}");
                break;
            }
        }
    }
}

/// Piped input runs as a script instead of opening the prompt.
fn stdin_is_tty() -> bool {
    #[cfg(unix)]
    {
        extern "C" {
            fn isatty(fd: i32) -> i32;
        }
        unsafe { isatty(0) != 0 }
    }
    #[cfg(not(unix))]
    {
        true
    }
}
