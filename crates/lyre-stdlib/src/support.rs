//! Argument extraction shared by the library modules.

use lyre_core::gc::{NativeContext, Payload};
use lyre_core::value::{Handle, Variant};

pub(crate) fn check_integer(
    ctx: &NativeContext,
    v: &Variant,
    what: &str,
) -> Result<i64, String> {
    ctx.heap
        .deref(*v)
        .as_integer()
        .ok_or_else(|| format!("[Type error] Expected an Integer {what}"))
}

pub(crate) fn check_float(ctx: &NativeContext, v: &Variant, what: &str) -> Result<f64, String> {
    ctx.heap
        .deref(*v)
        .as_float()
        .ok_or_else(|| format!("[Type error] Expected a Number {what}"))
}

pub(crate) fn check_string(
    ctx: &NativeContext,
    v: &Variant,
    what: &str,
) -> Result<String, String> {
    let handle = check_handle(ctx, v)?;
    match &ctx.heap.get(handle).payload {
        Payload::Str(s) => Ok(s.clone()),
        _ => Err(format!("[Type error] Expected a String {what}")),
    }
}

/// The heap handle behind a reference value.
pub(crate) fn check_handle(ctx: &NativeContext, v: &Variant) -> Result<Handle, String> {
    match ctx.heap.deref(*v) {
        Variant::Ref(h) => Ok(h),
        other => Err(format!(
            "[Type error] Expected an object, got {}",
            ctx.heap.type_name(&other)
        )),
    }
}

/// Return an element owned by a container, retained for the caller.
pub(crate) fn retained(ctx: &mut NativeContext, v: Variant) -> Variant {
    let v = ctx.heap.deref(v);
    ctx.heap.retain(&v);
    v
}
