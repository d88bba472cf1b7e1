//! The `Regex` class: construction, matching and capture access.
//!
//! A regex object remembers the captures of its last successful match;
//! `group`, `count` and iteration read that state.

use crate::support::*;
use lyre_core::class::{CLASS_INTEGER, CLASS_REGEX, CLASS_STRING};
use lyre_core::gc::{NativeContext, Payload, RegexObj};
use lyre_core::value::Variant;
use lyre_vm::Runtime;

pub fn register(rt: &mut Runtime) {
    rt.add_initializer(CLASS_REGEX, native_new, &[CLASS_STRING]);
    rt.add_accessor(CLASS_REGEX, "pattern", native_pattern);
    rt.add_method(CLASS_REGEX, "match", native_match, &[CLASS_REGEX, CLASS_STRING]);
    rt.add_method(CLASS_REGEX, "has_match", native_has_match, &[CLASS_REGEX]);
    rt.add_method(CLASS_REGEX, "group", native_group, &[CLASS_REGEX, CLASS_INTEGER]);
    rt.add_method(CLASS_REGEX, "count", native_count, &[CLASS_REGEX]);
}

fn check_regex<'a>(ctx: &'a NativeContext, v: &Variant) -> Result<&'a RegexObj, String> {
    let h = check_handle(ctx, v)?;
    match &ctx.heap.get(h).payload {
        Payload::Regex(re) => Ok(re),
        _ => Err("[Type error] Expected a Regex receiver".to_string()),
    }
}

fn native_new(ctx: &mut NativeContext, args: &mut [Variant]) -> Result<Variant, String> {
    let pattern = check_string(ctx, &args[0], "pattern")?;
    let re = regex::Regex::new(&pattern)
        .map_err(|e| format!("[Regex error] Invalid pattern: {e}"))?;
    let obj = RegexObj {
        pattern,
        re,
        captures: Vec::new(),
    };
    Ok(Variant::Ref(ctx.heap.alloc(Payload::Regex(obj))))
}

fn native_pattern(ctx: &mut NativeContext, args: &mut [Variant]) -> Result<Variant, String> {
    let pattern = check_regex(ctx, &args[0])?.pattern.clone();
    Ok(ctx.heap.new_string(pattern))
}

/// Match against a subject, remembering the captures. Returns whether
/// the pattern matched.
fn native_match(ctx: &mut NativeContext, args: &mut [Variant]) -> Result<Variant, String> {
    let h = check_handle(ctx, &args[0])?;
    let subject = check_string(ctx, &args[1], "subject")?;
    let captures = match &ctx.heap.get(h).payload {
        Payload::Regex(obj) => obj.re.captures(&subject).map(|caps| {
            caps.iter()
                .map(|g| g.map(|m| m.as_str().to_string()))
                .collect::<Vec<_>>()
        }),
        _ => return Err("[Type error] Expected a Regex receiver".to_string()),
    };
    let matched = captures.is_some();
    if let Payload::Regex(obj) = &mut ctx.heap.get_mut(h).payload {
        obj.captures = captures.unwrap_or_default();
    }
    Ok(Variant::Boolean(matched))
}

fn native_has_match(ctx: &mut NativeContext, args: &mut [Variant]) -> Result<Variant, String> {
    let obj = check_regex(ctx, &args[0])?;
    Ok(Variant::Boolean(!obj.captures.is_empty()))
}

/// Capture group of the last match; group 0 is the whole match.
fn native_group(ctx: &mut NativeContext, args: &mut [Variant]) -> Result<Variant, String> {
    let index = check_integer(ctx, &args[1], "group index")?;
    let obj = check_regex(ctx, &args[0])?;
    if index < 0 || index as usize >= obj.captures.len().max(1) {
        return Err(format!("[Index error] Invalid group index {index}"));
    }
    match obj.captures.get(index as usize).cloned().flatten() {
        Some(s) => Ok(ctx.heap.new_string(s)),
        None => Ok(Variant::Null),
    }
}

/// Number of capture groups in the last match, excluding group 0.
fn native_count(ctx: &mut NativeContext, args: &mut [Variant]) -> Result<Variant, String> {
    let obj = check_regex(ctx, &args[0])?;
    Ok(Variant::Integer(obj.captures.len().saturating_sub(1) as i64))
}
