//! Methods on the `Set` class.

use crate::support::*;
use lyre_core::class::{CLASS_OBJECT, CLASS_SET};
use lyre_core::gc::{NativeContext, Payload};
use lyre_core::value::Variant;
use lyre_vm::Runtime;

pub fn register(rt: &mut Runtime) {
    rt.add_method(CLASS_SET, "insert", native_insert, &[CLASS_SET, CLASS_OBJECT]);
    rt.add_method(CLASS_SET, "remove", native_remove, &[CLASS_SET, CLASS_OBJECT]);
    rt.add_method(CLASS_SET, "contains", native_contains, &[CLASS_SET, CLASS_OBJECT]);
    rt.add_method(CLASS_SET, "is_empty", native_is_empty, &[CLASS_SET]);
}

fn native_insert(ctx: &mut NativeContext, args: &mut [Variant]) -> Result<Variant, String> {
    let h = check_handle(ctx, &args[0])?;
    let key = ctx.key_of(&args[1])?;
    match &mut ctx.heap.get_mut(h).payload {
        Payload::Set(set) => {
            set.insert(key);
            Ok(Variant::Null)
        }
        _ => Err("[Type error] Expected a Set receiver".to_string()),
    }
}

fn native_remove(ctx: &mut NativeContext, args: &mut [Variant]) -> Result<Variant, String> {
    let h = check_handle(ctx, &args[0])?;
    let key = ctx.key_of(&args[1])?;
    match &mut ctx.heap.get_mut(h).payload {
        Payload::Set(set) => {
            set.shift_remove(&key);
            Ok(Variant::Null)
        }
        _ => Err("[Type error] Expected a Set receiver".to_string()),
    }
}

fn native_contains(ctx: &mut NativeContext, args: &mut [Variant]) -> Result<Variant, String> {
    let h = check_handle(ctx, &args[0])?;
    let key = ctx.key_of(&args[1])?;
    let found = match &ctx.heap.get(h).payload {
        Payload::Set(set) => set.contains(&key),
        _ => return Err("[Type error] Expected a Set receiver".to_string()),
    };
    Ok(Variant::Boolean(found))
}

fn native_is_empty(ctx: &mut NativeContext, args: &mut [Variant]) -> Result<Variant, String> {
    let h = check_handle(ctx, &args[0])?;
    let empty = match &ctx.heap.get(h).payload {
        Payload::Set(set) => set.is_empty(),
        _ => return Err("[Type error] Expected a Set receiver".to_string()),
    };
    Ok(Variant::Boolean(empty))
}
