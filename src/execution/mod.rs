//! Execution module for evaluating graphs.
//!
//! Handles:
//! - Evaluation planning, running and committing
//! - Parallel batch evaluation
//! - Value caching by node revision
//! - Background evaluation on a worker thread

pub mod cache;
pub mod engine;
pub mod worker;

pub use cache::{CacheKey, CacheStats, SharedCache, ValueCache};
pub use engine::{
    ComputedValue, EvaluationOutcome, EvaluationPlan, ExecutionEngine, ExecutionOptions,
    NodeSnapshot,
};
pub use worker::BackgroundEvaluator;
