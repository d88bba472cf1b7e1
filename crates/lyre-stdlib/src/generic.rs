//! Generic functions available on every value.

use crate::support::*;
use lyre_core::class::{CLASS_NUMBER, CLASS_OBJECT};
use lyre_core::gc::{NativeContext, Payload};
use lyre_core::value::Variant;
use lyre_vm::Runtime;
use unicode_segmentation::UnicodeSegmentation;

pub fn register(rt: &mut Runtime) {
    rt.add_global_function("type", native_type, &[CLASS_OBJECT]);
    rt.add_global_function("len", native_len, &[CLASS_OBJECT]);
    rt.add_global_function("str", native_str, &[CLASS_OBJECT]);
    rt.add_global_function("min", native_min, &[CLASS_NUMBER, CLASS_NUMBER]);
    rt.add_global_function("max", native_max, &[CLASS_NUMBER, CLASS_NUMBER]);
    rt.add_global_function("contains", native_contains, &[CLASS_OBJECT, CLASS_OBJECT]);
}

/// The class of a value, as a first-class `Class`.
fn native_type(ctx: &mut NativeContext, args: &mut [Variant]) -> Result<Variant, String> {
    let id = ctx.heap.class_of(&args[0]);
    let name = ctx.classes.get(id).name.clone();
    Ok(ctx.heap.new_class(id, name))
}

fn native_len(ctx: &mut NativeContext, args: &mut [Variant]) -> Result<Variant, String> {
    let h = check_handle(ctx, &args[0])?;
    let n = match &ctx.heap.get(h).payload {
        Payload::Str(s) => s.graphemes(true).count(),
        Payload::List(items) => items.len(),
        Payload::Table(map) => map.len(),
        Payload::Set(set) => set.len(),
        Payload::Array(arr) => arr.len(),
        _ => {
            return Err(format!(
                "[Type error] Type {} has no length",
                ctx.heap.type_name(&args[0])
            ))
        }
    };
    Ok(Variant::Integer(n as i64))
}

fn native_str(ctx: &mut NativeContext, args: &mut [Variant]) -> Result<Variant, String> {
    let s = ctx.heap.stringify(&args[0]);
    Ok(ctx.heap.new_string(s))
}

fn native_min(ctx: &mut NativeContext, args: &mut [Variant]) -> Result<Variant, String> {
    pick(ctx, args, true)
}

fn native_max(ctx: &mut NativeContext, args: &mut [Variant]) -> Result<Variant, String> {
    pick(ctx, args, false)
}

fn pick(ctx: &mut NativeContext, args: &mut [Variant], smaller: bool) -> Result<Variant, String> {
    let ord = ctx.compare_values(&args[0], &args[1])?;
    let keep_first = if smaller { ord.is_le() } else { ord.is_ge() };
    let winner = if keep_first { args[0] } else { args[1] };
    Ok(retained(ctx, winner))
}

fn native_contains(ctx: &mut NativeContext, args: &mut [Variant]) -> Result<Variant, String> {
    let h = check_handle(ctx, &args[0])?;
    let found = match &ctx.heap.get(h).payload {
        Payload::Str(_) => {
            let haystack = check_string(ctx, &args[0], "to search")?;
            let needle = check_string(ctx, &args[1], "to search for")?;
            haystack.contains(&needle)
        }
        Payload::List(items) => items.iter().any(|v| ctx.heap.equal(v, &args[1])),
        Payload::Table(map) => {
            let key = ctx.key_of(&args[1])?;
            map.contains_key(&key)
        }
        Payload::Set(set) => {
            let key = ctx.key_of(&args[1])?;
            set.contains(&key)
        }
        _ => {
            return Err(format!(
                "[Type error] Type {} is not a searchable container",
                ctx.heap.type_name(&args[0])
            ))
        }
    };
    Ok(Variant::Boolean(found))
}
