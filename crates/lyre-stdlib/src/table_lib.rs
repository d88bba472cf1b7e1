//! Methods on the `Table` class.

use crate::support::*;
use lyre_core::class::{CLASS_OBJECT, CLASS_TABLE};
use lyre_core::gc::NativeContext;
use lyre_core::value::Variant;
use lyre_vm::Runtime;

pub fn register(rt: &mut Runtime) {
    rt.add_method(CLASS_TABLE, "keys", native_keys, &[CLASS_TABLE]);
    rt.add_method(CLASS_TABLE, "values", native_values, &[CLASS_TABLE]);
    rt.add_method(CLASS_TABLE, "get", native_get, &[CLASS_TABLE, CLASS_OBJECT]);
    rt.add_method(
        CLASS_TABLE,
        "get",
        native_get_default,
        &[CLASS_TABLE, CLASS_OBJECT, CLASS_OBJECT],
    );
    rt.add_method(CLASS_TABLE, "contains", native_contains, &[CLASS_TABLE, CLASS_OBJECT]);
    rt.add_method(CLASS_TABLE, "remove", native_remove, &[CLASS_TABLE, CLASS_OBJECT]);
    rt.add_method(CLASS_TABLE, "clear", native_clear, &[CLASS_TABLE]);
    rt.add_method(CLASS_TABLE, "is_empty", native_is_empty, &[CLASS_TABLE]);
}

fn native_keys(ctx: &mut NativeContext, args: &mut [Variant]) -> Result<Variant, String> {
    let h = check_handle(ctx, &args[0])?;
    let keys = match ctx.heap.as_table(h) {
        Some(map) => map.keys().cloned().collect::<Vec<_>>(),
        None => return Err("[Type error] Expected a Table receiver".to_string()),
    };
    let items: Vec<Variant> = keys.iter().map(|k| ctx.heap.key_to_variant(k)).collect();
    Ok(ctx.heap.new_list(items))
}

fn native_values(ctx: &mut NativeContext, args: &mut [Variant]) -> Result<Variant, String> {
    let h = check_handle(ctx, &args[0])?;
    let values = match ctx.heap.as_table(h) {
        Some(map) => map.values().copied().collect::<Vec<_>>(),
        None => return Err("[Type error] Expected a Table receiver".to_string()),
    };
    let items: Vec<Variant> = values.into_iter().map(|v| retained(ctx, v)).collect();
    Ok(ctx.heap.new_list(items))
}

/// `t.get(key)` is a lenient lookup: missing keys yield null.
fn native_get(ctx: &mut NativeContext, args: &mut [Variant]) -> Result<Variant, String> {
    let h = check_handle(ctx, &args[0])?;
    let key = ctx.key_of(&args[1])?;
    match ctx.heap.as_table(h).and_then(|map| map.get(&key)).copied() {
        Some(v) => Ok(retained(ctx, v)),
        None => Ok(Variant::Null),
    }
}

fn native_get_default(ctx: &mut NativeContext, args: &mut [Variant]) -> Result<Variant, String> {
    let h = check_handle(ctx, &args[0])?;
    let key = ctx.key_of(&args[1])?;
    match ctx.heap.as_table(h).and_then(|map| map.get(&key)).copied() {
        Some(v) => Ok(retained(ctx, v)),
        None => Ok(retained(ctx, args[2])),
    }
}

fn native_contains(ctx: &mut NativeContext, args: &mut [Variant]) -> Result<Variant, String> {
    let h = check_handle(ctx, &args[0])?;
    let key = ctx.key_of(&args[1])?;
    let found = ctx
        .heap
        .as_table(h)
        .map(|map| map.contains_key(&key))
        .unwrap_or(false);
    Ok(Variant::Boolean(found))
}

/// Remove a key if present; order of the remaining entries is preserved.
fn native_remove(ctx: &mut NativeContext, args: &mut [Variant]) -> Result<Variant, String> {
    let h = check_handle(ctx, &args[0])?;
    let key = ctx.key_of(&args[1])?;
    let removed = match ctx.heap.as_table_mut(h) {
        Some(map) => map.shift_remove(&key),
        None => return Err("[Type error] Expected a Table receiver".to_string()),
    };
    if let Some(v) = removed {
        ctx.heap.release(&v);
    }
    Ok(Variant::Null)
}

fn native_clear(ctx: &mut NativeContext, args: &mut [Variant]) -> Result<Variant, String> {
    let h = check_handle(ctx, &args[0])?;
    let old = match ctx.heap.as_table_mut(h) {
        Some(map) => std::mem::take(map),
        None => return Err("[Type error] Expected a Table receiver".to_string()),
    };
    for v in old.values() {
        ctx.heap.release(v);
    }
    Ok(Variant::Null)
}

fn native_is_empty(ctx: &mut NativeContext, args: &mut [Variant]) -> Result<Variant, String> {
    let h = check_handle(ctx, &args[0])?;
    let empty = ctx.heap.as_table(h).map(|m| m.is_empty()).unwrap_or(true);
    Ok(Variant::Boolean(empty))
}
