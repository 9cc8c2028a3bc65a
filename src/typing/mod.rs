//! Static types of the expression language.
//!
//! This module contains:
//! - The type algebra and primitive type schemes
//! - Union-find type variables with unification
//! - The inference visitor and node-level typing

pub mod infer;
pub mod ty;
pub mod unify;

pub use infer::{infer_expression, infer_node, InputType, TypeInferencer};
pub use ty::{BaseType, Type, TypeScheme, TypeVar};
pub use unify::{TypeVarTable, UnifyError};
