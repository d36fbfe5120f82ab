use crate::lifecycle::LifecycleManager;
use crate::registry::RuleRegistry;
use crate::MetricEvaluator;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use vigil_common::types::AlertRule;

/// Drives periodic evaluation of every enabled rule.
///
/// Each tick fans out one task per rule. A semaphore bounds how many
/// evaluations run at once and a per-rule guard skips rules whose previous
/// evaluation has not finished yet.
pub struct EvaluationScheduler {
    rules: Arc<RuleRegistry>,
    lifecycle: Arc<LifecycleManager>,
    evaluator: Arc<dyn MetricEvaluator>,
    semaphore: Arc<Semaphore>,
    in_flight: Arc<Mutex<HashSet<String>>>,
    interval: Duration,
    errors: Arc<AtomicU64>,
    skipped: Arc<AtomicU64>,
}

/// Holds a rule's single-flight slot; releasing it on drop covers panics too.
struct InFlightGuard {
    set: Arc<Mutex<HashSet<String>>>,
    rule_id: String,
}

impl InFlightGuard {
    fn acquire(set: &Arc<Mutex<HashSet<String>>>, rule_id: &str) -> Option<Self> {
        if !set.lock().insert(rule_id.to_string()) {
            return None;
        }
        Some(Self {
            set: set.clone(),
            rule_id: rule_id.to_string(),
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.lock().remove(&self.rule_id);
    }
}

impl EvaluationScheduler {
    pub fn new(
        rules: Arc<RuleRegistry>,
        lifecycle: Arc<LifecycleManager>,
        evaluator: Arc<dyn MetricEvaluator>,
        max_concurrent: usize,
        interval: Duration,
    ) -> Self {
        Self {
            rules,
            lifecycle,
            evaluator,
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            interval,
            errors: Arc::new(AtomicU64::new(0)),
            skipped: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn evaluation_errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Rules skipped because their previous evaluation was still running.
    pub fn skipped_evaluations(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Spawns one evaluation task per enabled, idle rule onto `tasks` and
    /// returns how many were spawned.
    pub fn tick(&self, tasks: &mut JoinSet<()>) -> usize {
        let mut spawned = 0;
        for rule in self.rules.enabled_rules() {
            let Some(guard) = InFlightGuard::acquire(&self.in_flight, &rule.id) else {
                self.skipped.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(rule_id = %rule.id, "Previous evaluation still running, skipping");
                continue;
            };
            tasks.spawn(self.evaluate_task(rule, guard));
            spawned += 1;
        }
        spawned
    }

    fn evaluate_task(
        &self,
        rule: AlertRule,
        guard: InFlightGuard,
    ) -> impl std::future::Future<Output = ()> + Send + 'static {
        let semaphore = self.semaphore.clone();
        let evaluator = self.evaluator.clone();
        let rules = self.rules.clone();
        let lifecycle = self.lifecycle.clone();
        let errors = self.errors.clone();

        async move {
            let _guard = guard;
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return;
            };
            let result = evaluator.evaluate(&rule).await;
            rules.record_evaluation(&rule.id, Utc::now());
            match result {
                Ok(evaluation) => {
                    lifecycle.process(&rule, evaluation.should_fire, evaluation.value);
                }
                Err(e) => {
                    errors.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(rule_id = %rule.id, rule = %rule.name, error = %e, "Rule evaluation failed");
                }
            }
        }
    }

    /// Ticks until `shutdown` fires, then waits for in-flight evaluations.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut tasks = JoinSet::new();

        tracing::info!(interval_secs = self.interval.as_secs(), "Evaluation scheduler started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    while let Some(res) = tasks.try_join_next() {
                        log_join(res);
                    }
                    let spawned = self.tick(&mut tasks);
                    tracing::debug!(spawned, "Evaluation tick");
                }
                _ = shutdown.recv() => {
                    tracing::info!(pending = tasks.len(), "Evaluation scheduler stopping");
                    break;
                }
            }
        }

        while let Some(res) = tasks.join_next().await {
            log_join(res);
        }
        tracing::info!("Evaluation scheduler stopped");
    }
}

fn log_join(res: Result<(), tokio::task::JoinError>) {
    if let Err(e) = res {
        if e.is_panic() {
            tracing::error!(error = %e, "Evaluation task panicked");
        }
    }
}
