//! The `File` class: line-oriented text IO.

use crate::support::*;
use lyre_core::class::{CLASS_FILE, CLASS_STRING};
use lyre_core::gc::{FileMode, FileObj, NativeContext, Payload};
use lyre_core::value::{Handle, Variant};
use lyre_vm::Runtime;
use std::fs;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};

pub fn register(rt: &mut Runtime) {
    rt.add_initializer(CLASS_FILE, native_open_read, &[CLASS_STRING]);
    rt.add_initializer(CLASS_FILE, native_open_mode, &[CLASS_STRING, CLASS_STRING]);
    rt.add_accessor(CLASS_FILE, "path", native_path);
    rt.add_method(CLASS_FILE, "read_line", native_read_line, &[CLASS_FILE]);
    rt.add_method(CLASS_FILE, "read_all", native_read_all, &[CLASS_FILE]);
    rt.add_method(CLASS_FILE, "write", native_write, &[CLASS_FILE, CLASS_STRING]);
    rt.add_method(CLASS_FILE, "write_line", native_write_line, &[CLASS_FILE, CLASS_STRING]);
    rt.add_method(CLASS_FILE, "eof", native_eof, &[CLASS_FILE]);
    rt.add_method(CLASS_FILE, "close", native_close, &[CLASS_FILE]);
    rt.add_method(CLASS_FILE, "rewind", native_rewind, &[CLASS_FILE]);
}

fn io_error(path: &str, e: std::io::Error) -> String {
    format!("[Input/Output error] Cannot access \"{path}\": {e}")
}

fn open(ctx: &mut NativeContext, path: String, mode: &str) -> Result<Variant, String> {
    let file_mode = match mode {
        "r" => FileMode::Read(BufReader::new(
            fs::File::open(&path).map_err(|e| io_error(&path, e))?,
        )),
        "w" => FileMode::Write(BufWriter::new(
            fs::File::create(&path).map_err(|e| io_error(&path, e))?,
        )),
        "a" => FileMode::Write(BufWriter::new(
            fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|e| io_error(&path, e))?,
        )),
        other => return Err(format!("[Value error] Invalid file mode \"{other}\"")),
    };
    let obj = FileObj {
        path,
        mode: file_mode,
    };
    Ok(Variant::Ref(ctx.heap.alloc(Payload::File(obj))))
}

fn native_open_read(ctx: &mut NativeContext, args: &mut [Variant]) -> Result<Variant, String> {
    let path = check_string(ctx, &args[0], "path")?;
    open(ctx, path, "r")
}

fn native_open_mode(ctx: &mut NativeContext, args: &mut [Variant]) -> Result<Variant, String> {
    let path = check_string(ctx, &args[0], "path")?;
    let mode = check_string(ctx, &args[1], "mode")?;
    open(ctx, path, &mode)
}

fn check_file<'a>(
    ctx: &'a mut NativeContext,
    v: &Variant,
) -> Result<(Handle, &'a mut FileObj), String> {
    let h = check_handle(ctx, v)?;
    match &mut ctx.heap.get_mut(h).payload {
        Payload::File(f) => Ok((h, f)),
        _ => Err("[Type error] Expected a File receiver".to_string()),
    }
}

fn reader_of<'a>(f: &'a mut FileObj) -> Result<&'a mut BufReader<fs::File>, String> {
    match &mut f.mode {
        FileMode::Read(r) => Ok(r),
        FileMode::Write(_) => Err(format!(
            "[Input/Output error] File \"{}\" is not open for reading",
            f.path
        )),
        FileMode::Closed => Err(format!("[Input/Output error] File \"{}\" is closed", f.path)),
    }
}

fn writer_of<'a>(f: &'a mut FileObj) -> Result<&'a mut BufWriter<fs::File>, String> {
    match &mut f.mode {
        FileMode::Write(w) => Ok(w),
        FileMode::Read(_) => Err(format!(
            "[Input/Output error] File \"{}\" is not open for writing",
            f.path
        )),
        FileMode::Closed => Err(format!("[Input/Output error] File \"{}\" is closed", f.path)),
    }
}

fn native_path(ctx: &mut NativeContext, args: &mut [Variant]) -> Result<Variant, String> {
    let (_, f) = check_file(ctx, &args[0])?;
    let path = f.path.clone();
    Ok(ctx.heap.new_string(path))
}

/// One line, without the trailing newline. Returns null at end of file.
fn native_read_line(ctx: &mut NativeContext, args: &mut [Variant]) -> Result<Variant, String> {
    let (_, f) = check_file(ctx, &args[0])?;
    let path = f.path.clone();
    let reader = reader_of(f)?;
    let mut line = String::new();
    let n = reader
        .read_line(&mut line)
        .map_err(|e| io_error(&path, e))?;
    if n == 0 {
        return Ok(Variant::Null);
    }
    if line.ends_with('\n') {
        line.pop();
        if line.ends_with('\r') {
            line.pop();
        }
    }
    Ok(ctx.heap.new_string(line))
}

/// Everything from the current position to the end of the file.
fn native_read_all(ctx: &mut NativeContext, args: &mut [Variant]) -> Result<Variant, String> {
    let (_, f) = check_file(ctx, &args[0])?;
    let path = f.path.clone();
    let reader = reader_of(f)?;
    let mut out = String::new();
    reader
        .read_to_string(&mut out)
        .map_err(|e| io_error(&path, e))?;
    Ok(ctx.heap.new_string(out))
}

fn native_write(ctx: &mut NativeContext, args: &mut [Variant]) -> Result<Variant, String> {
    let text = check_string(ctx, &args[1], "text")?;
    let (_, f) = check_file(ctx, &args[0])?;
    let path = f.path.clone();
    let writer = writer_of(f)?;
    writer
        .write_all(text.as_bytes())
        .map_err(|e| io_error(&path, e))?;
    Ok(Variant::Null)
}

fn native_write_line(ctx: &mut NativeContext, args: &mut [Variant]) -> Result<Variant, String> {
    let text = check_string(ctx, &args[1], "text")?;
    let (_, f) = check_file(ctx, &args[0])?;
    let path = f.path.clone();
    let writer = writer_of(f)?;
    writer
        .write_all(text.as_bytes())
        .and_then(|_| writer.write_all(b"\n"))
        .map_err(|e| io_error(&path, e))?;
    Ok(Variant::Null)
}

fn native_eof(ctx: &mut NativeContext, args: &mut [Variant]) -> Result<Variant, String> {
    let (_, f) = check_file(ctx, &args[0])?;
    let path = f.path.clone();
    let reader = reader_of(f)?;
    let at_end = reader
        .fill_buf()
        .map(|b| b.is_empty())
        .map_err(|e| io_error(&path, e))?;
    Ok(Variant::Boolean(at_end))
}

/// Closing flushes pending writes; further operations fail.
fn native_close(ctx: &mut NativeContext, args: &mut [Variant]) -> Result<Variant, String> {
    let (_, f) = check_file(ctx, &args[0])?;
    let path = f.path.clone();
    if let FileMode::Write(w) = &mut f.mode {
        w.flush().map_err(|e| io_error(&path, e))?;
    }
    f.mode = FileMode::Closed;
    Ok(Variant::Null)
}

/// Reopen a read-mode file at the beginning.
fn native_rewind(ctx: &mut NativeContext, args: &mut [Variant]) -> Result<Variant, String> {
    let (_, f) = check_file(ctx, &args[0])?;
    let path = f.path.clone();
    match f.mode {
        FileMode::Read(_) | FileMode::Closed => {
            f.mode = FileMode::Read(BufReader::new(
                fs::File::open(&path).map_err(|e| io_error(&path, e))?,
            ));
            Ok(Variant::Null)
        }
        FileMode::Write(_) => Err(format!(
            "[Input/Output error] Cannot rewind \"{path}\": file is open for writing"
        )),
    }
}
