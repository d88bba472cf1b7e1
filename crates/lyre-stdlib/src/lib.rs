//! Lyre standard library: native bindings for the builtin classes.
//!
//! Each module registers its functions, methods and accessors into a
//! [`Runtime`]; [`register_all`] wires up everything.

pub mod file_lib;
pub mod generic;
pub mod list_lib;
pub mod math_lib;
pub mod regex_lib;
pub mod set_lib;
pub mod string_lib;
pub mod table_lib;
mod support;

use lyre_vm::Runtime;

/// Register every standard library module.
pub fn register_all(rt: &mut Runtime) {
    generic::register(rt);
    string_lib::register(rt);
    list_lib::register(rt);
    table_lib::register(rt);
    set_lib::register(rt);
    regex_lib::register(rt);
    file_lib::register(rt);
    math_lib::register(rt);
}
