//! The expression language parameterizing graph nodes.
//!
//! This module contains:
//! - The expression tree and its builders
//! - The visitor trait every interpretation implements
//! - Evaluation and pretty-printing interpretations
//!
//! Type inference lives in [`crate::typing`] and foreign compilation in
//! [`crate::bridge`]; both are visitors too.

pub mod ast;
pub mod eval;
pub mod printer;
pub mod visitor;

pub use ast::{input_slot, input_variable, Expression, OUTPUT_PARAMETER};
pub use eval::{Env, Evaluator};
pub use visitor::ExpressionVisitor;
