//! The Lyre virtual machine.
//!
//! [`Runtime`] owns the heap, the class registry and the global scope,
//! and runs compiled routines on a value stack. Embedders drive it with
//! [`Runtime::do_string`] and register native functions, methods and
//! classes through the `add_*` family.

pub mod error;
mod iterator;
pub mod runtime;
mod vm;

pub use error::RuntimeError;
pub use runtime::Runtime;
