//! Validation module for whole-graph checking.
//!
//! Edits keep the graph structurally sound on their own; the pipeline is
//! run on loaded graphs and before evaluation to report what is left:
//! unknown primitives, stored type failures and suspicious wiring.

pub mod pipeline;
pub mod stages;

pub use pipeline::ValidationPipeline;
pub use stages::{ExpressionValidation, StructuralValidation, TypeValidation, ValidationStage};
