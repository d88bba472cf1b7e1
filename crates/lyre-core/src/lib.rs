//! Core value model for the Lyre scripting runtime: the `Variant` tagged
//! value, the slot-arena GC heap with reference counting and cycle
//! collection, and the class registry.

pub mod array;
pub mod class;
pub mod gc;
pub mod rng;
pub mod value;
