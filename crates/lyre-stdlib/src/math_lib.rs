//! Mathematical functions, registered as globals.
//!
//! `random` and `set_seed` use the xorshift generator owned by the
//! runtime, so embedders get reproducible runs by seeding it.

use crate::support::*;
use lyre_core::class::{CLASS_INTEGER, CLASS_NUMBER};
use lyre_core::gc::NativeContext;
use lyre_core::value::Variant;
use lyre_vm::Runtime;

pub fn register(rt: &mut Runtime) {
    rt.add_global_function("abs", native_abs, &[CLASS_NUMBER]);
    rt.add_global_function("ceil", native_ceil, &[CLASS_NUMBER]);
    rt.add_global_function("floor", native_floor, &[CLASS_NUMBER]);
    rt.add_global_function("round", native_round, &[CLASS_NUMBER]);
    rt.add_global_function("sqrt", native_sqrt, &[CLASS_NUMBER]);
    rt.add_global_function("exp", native_exp, &[CLASS_NUMBER]);
    rt.add_global_function("log", native_log, &[CLASS_NUMBER]);
    rt.add_global_function("log2", native_log2, &[CLASS_NUMBER]);
    rt.add_global_function("log10", native_log10, &[CLASS_NUMBER]);
    rt.add_global_function("sin", native_sin, &[CLASS_NUMBER]);
    rt.add_global_function("cos", native_cos, &[CLASS_NUMBER]);
    rt.add_global_function("tan", native_tan, &[CLASS_NUMBER]);
    rt.add_global_function("random", native_random, &[]);
    rt.add_global_function("random", native_random_range, &[CLASS_INTEGER, CLASS_INTEGER]);
    rt.add_global_function("set_seed", native_set_seed, &[CLASS_INTEGER]);
    rt.set_global("PI", Variant::Float(std::f64::consts::PI));
    rt.set_global("E", Variant::Float(std::f64::consts::E));
}

/// Absolute value, keeping integers integral.
fn native_abs(ctx: &mut NativeContext, args: &mut [Variant]) -> Result<Variant, String> {
    match ctx.heap.deref(args[0]) {
        Variant::Integer(i) => i
            .checked_abs()
            .map(Variant::Integer)
            .ok_or_else(|| "[Math error] Integer overflow".to_string()),
        Variant::Float(x) => Ok(Variant::Float(x.abs())),
        other => Err(format!(
            "[Type error] Expected a Number, got {}",
            ctx.heap.type_name(&other)
        )),
    }
}

macro_rules! float_fn {
    ($name:ident, $method:ident) => {
        fn $name(ctx: &mut NativeContext, args: &mut [Variant]) -> Result<Variant, String> {
            let x = check_float(ctx, &args[0], "argument")?;
            Ok(Variant::Float(x.$method()))
        }
    };
}

float_fn!(native_ceil, ceil);
float_fn!(native_floor, floor);
float_fn!(native_round, round);
float_fn!(native_sqrt, sqrt);
float_fn!(native_exp, exp);
float_fn!(native_log, ln);
float_fn!(native_log2, log2);
float_fn!(native_log10, log10);
float_fn!(native_sin, sin);
float_fn!(native_cos, cos);
float_fn!(native_tan, tan);

/// Uniform float in `[0, 1)`.
fn native_random(ctx: &mut NativeContext, _args: &mut [Variant]) -> Result<Variant, String> {
    Ok(Variant::Float(ctx.rng.next_float()))
}

/// Uniform integer in `[lo, hi]` inclusive.
fn native_random_range(ctx: &mut NativeContext, args: &mut [Variant]) -> Result<Variant, String> {
    let lo = check_integer(ctx, &args[0], "lower bound")?;
    let hi = check_integer(ctx, &args[1], "upper bound")?;
    if lo > hi {
        return Err("[Value error] Empty random range".to_string());
    }
    Ok(Variant::Integer(ctx.rng.next_range(lo, hi)))
}

fn native_set_seed(ctx: &mut NativeContext, args: &mut [Variant]) -> Result<Variant, String> {
    let seed = check_integer(ctx, &args[0], "seed")?;
    ctx.rng.seed(seed as u64);
    Ok(Variant::Null)
}
