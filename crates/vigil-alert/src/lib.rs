//! Alert rule evaluation and alert lifecycle engine.
//!
//! The engine periodically evaluates registered [`AlertRule`]s through an
//! injected [`MetricEvaluator`], tracks the resulting alerts by a
//! deterministic fingerprint, applies the pending/firing/suppressed/resolved
//! state machine and hands every state edge to the dispatch collaborators
//! (notification, escalation) without blocking evaluation.
//!
//! ```text
//! EvaluationScheduler -> MetricEvaluator -> LifecycleManager -> Dispatcher -> Notifier / Escalator
//!         ^                                      |
//!    RuleRegistry                            AlertStore <- RetentionSweeper
//! ```
//!
//! [`AlertRule`]: vigil_common::types::AlertRule

pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod lifecycle;
pub mod registry;
pub mod rules;
pub mod scheduler;
pub mod store;
pub mod sweeper;
pub mod window;


use anyhow::Result;
use async_trait::async_trait;
use vigil_common::types::AlertRule;

/// Outcome of evaluating a rule's condition once.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub should_fire: bool,
    /// Observed value reported alongside the outcome.
    pub value: f64,
}

/// Decides whether a rule's condition currently holds.
///
/// Implementations must not touch engine state; they are called
/// concurrently for different rules, never concurrently for the same rule.
/// Query timeouts are the implementation's responsibility.
#[async_trait]
pub trait MetricEvaluator: Send + Sync {
    /// # Errors
    ///
    /// Returns an error when the metric backend cannot answer. The engine
    /// leaves alert state untouched and retries on the next tick.
    async fn evaluate(&self, rule: &AlertRule) -> Result<Evaluation>;
}
