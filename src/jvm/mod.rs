//! JVM classes, as far as verifying their methods is concerned
//!
//! The model here starts after class file parsing: instructions are already decoded (see
//! [`Instruction`]), constant pool member references are already resolved against the class
//! hierarchy (see [`ConstantPool`]), and the hierarchy itself is queried through the
//! [`TypeGraph`] trait. [`class_graph::ClassGraph`] is an in-memory implementation of it.

mod access_flags;
mod bytecode;
pub mod class_graph;
mod code;
mod constants;
mod descriptors;
mod errors;
mod model;
mod names;
mod type_graph;
pub mod verifier;

pub use access_flags::*;
pub use bytecode::*;
pub use code::*;
pub use constants::*;
pub use descriptors::*;
pub use errors::*;
pub use model::*;
pub use names::*;
pub use type_graph::*;
