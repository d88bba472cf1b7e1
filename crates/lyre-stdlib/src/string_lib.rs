//! Methods on the `String` class.
//!
//! Positions are 1-based grapheme indices, matching string indexing in
//! the language itself.

use crate::support::*;
use lyre_core::class::CLASS_STRING;
use lyre_core::gc::NativeContext;
use lyre_core::value::Variant;
use lyre_vm::Runtime;
use unicode_segmentation::UnicodeSegmentation;

pub fn register(rt: &mut Runtime) {
    rt.add_accessor(CLASS_STRING, "length", native_length);
    rt.add_method(CLASS_STRING, "contains", native_contains, &[CLASS_STRING, CLASS_STRING]);
    rt.add_method(CLASS_STRING, "starts_with", native_starts_with, &[CLASS_STRING, CLASS_STRING]);
    rt.add_method(CLASS_STRING, "ends_with", native_ends_with, &[CLASS_STRING, CLASS_STRING]);
    rt.add_method(CLASS_STRING, "to_upper", native_to_upper, &[CLASS_STRING]);
    rt.add_method(CLASS_STRING, "to_lower", native_to_lower, &[CLASS_STRING]);
    rt.add_method(CLASS_STRING, "reverse", native_reverse, &[CLASS_STRING]);
    rt.add_method(CLASS_STRING, "trim", native_trim, &[CLASS_STRING]);
    rt.add_method(CLASS_STRING, "split", native_split, &[CLASS_STRING, CLASS_STRING]);
    rt.add_method(CLASS_STRING, "find", native_find, &[CLASS_STRING, CLASS_STRING]);
}

fn native_length(ctx: &mut NativeContext, args: &mut [Variant]) -> Result<Variant, String> {
    let s = check_string(ctx, &args[0], "receiver")?;
    Ok(Variant::Integer(s.graphemes(true).count() as i64))
}

fn native_contains(ctx: &mut NativeContext, args: &mut [Variant]) -> Result<Variant, String> {
    let s = check_string(ctx, &args[0], "receiver")?;
    let sub = check_string(ctx, &args[1], "to search for")?;
    Ok(Variant::Boolean(s.contains(&sub)))
}

fn native_starts_with(ctx: &mut NativeContext, args: &mut [Variant]) -> Result<Variant, String> {
    let s = check_string(ctx, &args[0], "receiver")?;
    let prefix = check_string(ctx, &args[1], "prefix")?;
    Ok(Variant::Boolean(s.starts_with(&prefix)))
}

fn native_ends_with(ctx: &mut NativeContext, args: &mut [Variant]) -> Result<Variant, String> {
    let s = check_string(ctx, &args[0], "receiver")?;
    let suffix = check_string(ctx, &args[1], "suffix")?;
    Ok(Variant::Boolean(s.ends_with(&suffix)))
}

fn native_to_upper(ctx: &mut NativeContext, args: &mut [Variant]) -> Result<Variant, String> {
    let s = check_string(ctx, &args[0], "receiver")?;
    Ok(ctx.heap.new_string(s.to_uppercase()))
}

fn native_to_lower(ctx: &mut NativeContext, args: &mut [Variant]) -> Result<Variant, String> {
    let s = check_string(ctx, &args[0], "receiver")?;
    Ok(ctx.heap.new_string(s.to_lowercase()))
}

fn native_reverse(ctx: &mut NativeContext, args: &mut [Variant]) -> Result<Variant, String> {
    let s = check_string(ctx, &args[0], "receiver")?;
    let out: String = s.graphemes(true).rev().collect();
    Ok(ctx.heap.new_string(out))
}

fn native_trim(ctx: &mut NativeContext, args: &mut [Variant]) -> Result<Variant, String> {
    let s = check_string(ctx, &args[0], "receiver")?;
    Ok(ctx.heap.new_string(s.trim().to_string()))
}

fn native_split(ctx: &mut NativeContext, args: &mut [Variant]) -> Result<Variant, String> {
    let s = check_string(ctx, &args[0], "receiver")?;
    let sep = check_string(ctx, &args[1], "separator")?;
    if sep.is_empty() {
        return Err("[Value error] Cannot split on an empty separator".to_string());
    }
    let parts: Vec<Variant> = s
        .split(&sep)
        .map(|p| ctx.heap.new_string(p.to_string()))
        .collect();
    Ok(ctx.heap.new_list(parts))
}

/// 1-based grapheme position of the first occurrence, or 0 when absent.
fn native_find(ctx: &mut NativeContext, args: &mut [Variant]) -> Result<Variant, String> {
    let s = check_string(ctx, &args[0], "receiver")?;
    let sub = check_string(ctx, &args[1], "to search for")?;
    let pos = match s.find(&sub) {
        Some(byte_pos) => s[..byte_pos].graphemes(true).count() as i64 + 1,
        None => 0,
    };
    Ok(Variant::Integer(pos))
}
