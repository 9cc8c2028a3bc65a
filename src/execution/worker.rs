//! Background evaluation worker.
//!
//! A single worker thread receives [`EvaluationPlan`]s over a channel and
//! sends back their outcomes. The graph owner keeps editing meanwhile and
//! decides on receipt whether an outcome is still current.

use crate::core::error::FlowResult;
use crate::execution::engine::{EvaluationOutcome, EvaluationPlan};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Owner side of the background worker.
pub struct BackgroundEvaluator {
    /// Plans to run; dropped to stop the worker.
    requests: Option<Sender<EvaluationPlan>>,
    /// Finished outcomes.
    results: Receiver<EvaluationOutcome>,
    /// Worker thread.
    handle: Option<JoinHandle<()>>,
    /// Plans submitted and not yet received back.
    pending: Arc<AtomicUsize>,
}

impl BackgroundEvaluator {
    /// Start the worker thread.
    pub fn spawn() -> FlowResult<Self> {
        let (request_tx, request_rx) = channel::unbounded::<EvaluationPlan>();
        let (result_tx, result_rx) = channel::unbounded();

        let handle = thread::Builder::new()
            .name("imageflow-eval".to_string())
            .spawn(move || {
                for plan in request_rx.iter() {
                    let outcome = plan.run();
                    if result_tx.send(outcome).is_err() {
                        break;
                    }
                }
                log::debug!("Background evaluator stopped");
            })?;

        Ok(Self {
            requests: Some(request_tx),
            results: result_rx,
            handle: Some(handle),
            pending: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Queue a plan. Returns false once the worker has stopped.
    pub fn submit(&self, plan: EvaluationPlan) -> bool {
        let Some(requests) = &self.requests else {
            return false;
        };
        let target = plan.target;
        // Counted before sending so a fast worker cannot be received first.
        self.pending.fetch_add(1, Ordering::SeqCst);
        if requests.send(plan).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return false;
        }
        log::debug!("Queued background evaluation of node {}", target);
        true
    }

    /// Take one finished outcome, if any, without blocking.
    pub fn try_recv(&self) -> Option<EvaluationOutcome> {
        let outcome = self.results.try_recv().ok()?;
        self.pending.fetch_sub(1, Ordering::SeqCst);
        Some(outcome)
    }

    /// Wait up to `timeout` for one finished outcome.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<EvaluationOutcome> {
        match self.results.recv_timeout(timeout) {
            Ok(outcome) => {
                self.pending.fetch_sub(1, Ordering::SeqCst);
                Some(outcome)
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Take every finished outcome without blocking.
    pub fn drain(&self) -> Vec<EvaluationOutcome> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    /// Number of plans whose outcome has not been received.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Stop the worker after the queued plans, and wait for it.
    pub fn shutdown(&mut self) {
        self.requests.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Background evaluator panicked");
            }
        }
    }
}

impl Drop for BackgroundEvaluator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Value;
    use crate::execution::engine::ExecutionEngine;
    use crate::expr::ast::Expression;
    use crate::graph::structure::Graph;

    #[test]
    fn test_runs_plans_off_thread() {
        let mut graph = Graph::new();
        graph.add_output_node(Expression::constant(4.0)).unwrap();
        graph
            .add_output_node(Expression::primitive("sqrt", vec![Expression::input(0)]))
            .unwrap();
        graph.add_edge(1, 0, 0).unwrap();

        let engine = ExecutionEngine::default();
        let worker = BackgroundEvaluator::spawn().unwrap();
        assert!(worker.submit(engine.plan(&graph, 1).unwrap()));

        let outcome = worker.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(outcome.target, 1);
        assert_eq!(outcome.value, Value::Number(2.0));
        assert_eq!(worker.pending(), 0);
        assert!(worker.drain().is_empty());
    }

    #[test]
    fn test_submit_after_shutdown() {
        let graph = {
            let mut graph = Graph::new();
            graph.add_output_node(Expression::constant(1.0)).unwrap();
            graph
        };
        let engine = ExecutionEngine::default();
        let mut worker = BackgroundEvaluator::spawn().unwrap();
        worker.shutdown();
        assert!(!worker.submit(engine.plan(&graph, 0).unwrap()));
        assert_eq!(worker.pending(), 0);
    }

    #[test]
    fn test_pending_never_exceeds_submitted() {
        let mut graph = Graph::new();
        graph.add_output_node(Expression::constant(1.0)).unwrap();
        let engine = ExecutionEngine::default();
        let worker = BackgroundEvaluator::spawn().unwrap();

        let submitted = 32;
        for _ in 0..submitted {
            assert!(worker.submit(engine.plan(&graph, 0).unwrap()));
            assert!(worker.pending() <= submitted);
        }
        for received in 1..=submitted {
            assert!(worker.recv_timeout(Duration::from_secs(5)).is_some());
            assert_eq!(worker.pending(), submitted - received);
        }
    }
}
