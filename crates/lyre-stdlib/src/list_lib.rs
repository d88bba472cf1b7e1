//! Methods on the `List` class.

use crate::support::*;
use lyre_core::class::{CLASS_LIST, CLASS_OBJECT, CLASS_STRING};
use lyre_core::gc::NativeContext;
use lyre_core::value::Variant;
use lyre_vm::Runtime;

pub fn register(rt: &mut Runtime) {
    rt.add_method(CLASS_LIST, "append", native_append, &[CLASS_LIST, CLASS_OBJECT]);
    rt.add_method(CLASS_LIST, "prepend", native_prepend, &[CLASS_LIST, CLASS_OBJECT]);
    rt.add_method(CLASS_LIST, "first", native_first, &[CLASS_LIST]);
    rt.add_method(CLASS_LIST, "last", native_last, &[CLASS_LIST]);
    rt.add_method(CLASS_LIST, "sorted", native_sorted, &[CLASS_LIST]);
    rt.add_method(CLASS_LIST, "reversed", native_reversed, &[CLASS_LIST]);
    rt.add_method(CLASS_LIST, "join", native_join, &[CLASS_LIST, CLASS_STRING]);
    rt.add_method(CLASS_LIST, "contains", native_contains, &[CLASS_LIST, CLASS_OBJECT]);
    rt.add_method(CLASS_LIST, "pop", native_pop, &[CLASS_LIST]);
    rt.add_method(CLASS_LIST, "clear", native_clear, &[CLASS_LIST]);
}

fn native_append(ctx: &mut NativeContext, args: &mut [Variant]) -> Result<Variant, String> {
    let h = check_handle(ctx, &args[0])?;
    let item = retained(ctx, args[1]);
    match ctx.heap.as_list_mut(h) {
        Some(items) => {
            items.push(item);
            Ok(Variant::Null)
        }
        None => Err("[Type error] Expected a List receiver".to_string()),
    }
}

fn native_prepend(ctx: &mut NativeContext, args: &mut [Variant]) -> Result<Variant, String> {
    let h = check_handle(ctx, &args[0])?;
    let item = retained(ctx, args[1]);
    match ctx.heap.as_list_mut(h) {
        Some(items) => {
            items.insert(0, item);
            Ok(Variant::Null)
        }
        None => Err("[Type error] Expected a List receiver".to_string()),
    }
}

fn native_first(ctx: &mut NativeContext, args: &mut [Variant]) -> Result<Variant, String> {
    let h = check_handle(ctx, &args[0])?;
    let v = ctx
        .heap
        .as_list(h)
        .and_then(|items| items.first().copied())
        .ok_or_else(|| "[Index error] List is empty".to_string())?;
    Ok(retained(ctx, v))
}

fn native_last(ctx: &mut NativeContext, args: &mut [Variant]) -> Result<Variant, String> {
    let h = check_handle(ctx, &args[0])?;
    let v = ctx
        .heap
        .as_list(h)
        .and_then(|items| items.last().copied())
        .ok_or_else(|| "[Index error] List is empty".to_string())?;
    Ok(retained(ctx, v))
}

/// A sorted copy; elements must be mutually comparable.
fn native_sorted(ctx: &mut NativeContext, args: &mut [Variant]) -> Result<Variant, String> {
    let h = check_handle(ctx, &args[0])?;
    let mut items = match ctx.heap.as_list(h) {
        Some(items) => items.iter().map(|v| ctx.heap.deref(*v)).collect::<Vec<_>>(),
        None => return Err("[Type error] Expected a List receiver".to_string()),
    };
    let mut failure = None;
    items.sort_by(|a, b| match ctx.compare_values(a, b) {
        Ok(ord) => ord,
        Err(e) => {
            failure.get_or_insert(e);
            std::cmp::Ordering::Equal
        }
    });
    if let Some(e) = failure {
        return Err(e);
    }
    for item in &items {
        ctx.heap.retain(item);
    }
    Ok(ctx.heap.new_list(items))
}

fn native_reversed(ctx: &mut NativeContext, args: &mut [Variant]) -> Result<Variant, String> {
    let h = check_handle(ctx, &args[0])?;
    let mut items = match ctx.heap.as_list(h) {
        Some(items) => items.iter().map(|v| ctx.heap.deref(*v)).collect::<Vec<_>>(),
        None => return Err("[Type error] Expected a List receiver".to_string()),
    };
    items.reverse();
    for item in &items {
        ctx.heap.retain(item);
    }
    Ok(ctx.heap.new_list(items))
}

fn native_join(ctx: &mut NativeContext, args: &mut [Variant]) -> Result<Variant, String> {
    let h = check_handle(ctx, &args[0])?;
    let sep = check_string(ctx, &args[1], "separator")?;
    let parts: Vec<String> = match ctx.heap.as_list(h) {
        Some(items) => items.iter().map(|v| ctx.heap.stringify(v)).collect(),
        None => return Err("[Type error] Expected a List receiver".to_string()),
    };
    Ok(ctx.heap.new_string(parts.join(&sep)))
}

fn native_contains(ctx: &mut NativeContext, args: &mut [Variant]) -> Result<Variant, String> {
    let h = check_handle(ctx, &args[0])?;
    let found = match ctx.heap.as_list(h) {
        Some(items) => items.iter().any(|v| ctx.heap.equal(v, &args[1])),
        None => return Err("[Type error] Expected a List receiver".to_string()),
    };
    Ok(Variant::Boolean(found))
}

/// Remove and return the last element.
fn native_pop(ctx: &mut NativeContext, args: &mut [Variant]) -> Result<Variant, String> {
    let h = check_handle(ctx, &args[0])?;
    let v = ctx
        .heap
        .as_list_mut(h)
        .and_then(|items| items.pop())
        .ok_or_else(|| "[Index error] Cannot pop an empty list".to_string())?;
    // ownership moves from the list to the caller; boxed elements are
    // unwrapped so the cell does not escape
    if matches!(v, Variant::Alias(_)) {
        let inner = ctx.heap.deref(v);
        ctx.heap.retain(&inner);
        ctx.heap.release(&v);
        return Ok(inner);
    }
    Ok(v)
}

fn native_clear(ctx: &mut NativeContext, args: &mut [Variant]) -> Result<Variant, String> {
    let h = check_handle(ctx, &args[0])?;
    let old = match ctx.heap.as_list_mut(h) {
        Some(items) => std::mem::take(items),
        None => return Err("[Type error] Expected a List receiver".to_string()),
    };
    for v in &old {
        ctx.heap.release(v);
    }
    Ok(Variant::Null)
}
