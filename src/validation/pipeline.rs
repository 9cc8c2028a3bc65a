//! Validation pipeline implementation.

use crate::core::error::ValidationReport;
use crate::graph::structure::Graph;
use crate::validation::stages::{
    ExpressionValidation, StructuralValidation, TypeValidation, ValidationStage,
};
use std::time::Instant;

/// Multi-stage validation pipeline.
///
/// Runs a series of validation stages on a graph and gathers their
/// errors and warnings into one report.
pub struct ValidationPipeline {
    stages: Vec<Box<dyn ValidationStage>>,
}

impl ValidationPipeline {
    /// Create a new pipeline with the given stages.
    pub fn new(stages: Vec<Box<dyn ValidationStage>>) -> Self {
        Self { stages }
    }

    /// Create the default validation pipeline with all standard stages.
    pub fn default_pipeline() -> Self {
        Self {
            stages: vec![
                Box::new(StructuralValidation),
                Box::new(ExpressionValidation),
                Box::new(TypeValidation),
            ],
        }
    }

    /// Create a minimal pipeline (just structural and type checks).
    pub fn minimal_pipeline() -> Self {
        Self {
            stages: vec![Box::new(StructuralValidation), Box::new(TypeValidation)],
        }
    }

    /// Add a custom validation stage.
    pub fn add_stage(&mut self, stage: Box<dyn ValidationStage>) {
        self.stages.push(stage);
    }

    /// Names of the stages, in order.
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Validate a graph through all stages.
    ///
    /// A fatal error stops the pipeline; later stages would only repeat it.
    pub fn validate(&self, graph: &Graph) -> ValidationReport {
        let start = Instant::now();
        let mut report = ValidationReport::new();

        for stage in &self.stages {
            match stage.validate(graph) {
                Ok(warnings) => {
                    for warning in warnings {
                        report.add_warning(warning);
                    }
                }
                Err(errors) => {
                    log::debug!("{} found {} error(s)", stage.name(), errors.len());
                    for error in errors {
                        let is_fatal = error.is_fatal();
                        report.add_error(error);

                        if is_fatal {
                            report.duration_ms = start.elapsed().as_millis() as u64;
                            return report;
                        }
                    }
                }
            }
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        report
    }

    /// Quick validation - check if every node can be evaluated.
    pub fn can_execute(&self, graph: &Graph) -> bool {
        self.validate(graph).is_usable()
    }
}

impl Default for ValidationPipeline {
    fn default() -> Self {
        Self::default_pipeline()
    }
}
