//! Bytecode verification for JVM methods
//!
//! Given the code of a method, the constant pool of its class, and a view of the class hierarchy
//! (see [`jvm::TypeGraph`]), [`jvm::verifier::verify_method`] runs a type-inference dataflow over
//! the instructions. The outcome is one of:
//!
//!   - a structural failure ([`jvm::Error`]) naming the class, method, offset, and instruction
//!   - a [`jvm::verifier::MethodAnalysis`] describing the inferred stack and locals at every
//!     instruction, which instructions are reachable, and which local variable slots belong
//!     together
//!
//! Problems which only surface at runtime on a real JVM (missing classes, inaccessible members,
//! loader constraint violations, etc.) do not fail verification. Instead, the offending
//! instruction is rewritten in place into a deferred failure which records the kind of error to
//! throw and its message.

pub mod jvm;
pub mod util;
