//! Primitive operations of the expression language.
//!
//! Primitives are looked up by name at typing and evaluation time. Each
//! carries a [`TypeScheme`](crate::typing::ty::TypeScheme) whose generics
//! are instantiated fresh at every use.

pub mod builtin;
pub mod registry;

pub use registry::{Category, FnPrimitive, PrimitiveOp, PrimitiveRegistry, PrimitiveSignature};
