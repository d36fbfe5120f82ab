use crate::{Evaluation, MetricEvaluator};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use vigil_common::types::{self, format_labels, Aggregation, AlertCondition, AlertRule, Labels};

/// Backend answering aggregated queries over a time window.
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// `Ok(None)` means the window holds no samples.
    async fn query(
        &self,
        metric: &str,
        labels: &Labels,
        window: Duration,
        aggregation: Aggregation,
        now: DateTime<Utc>,
    ) -> Result<Option<f64>>;
}

/// Evaluates a rule's threshold conditions against a [`MetricSource`].
///
/// All conditions must hold for the rule to fire. The reported value is the
/// first condition's aggregated value, or `0.0` when it had no data. A
/// condition whose window is empty never holds.
pub struct ThresholdEvaluator {
    source: Arc<dyn MetricSource>,
}

impl ThresholdEvaluator {
    pub fn new(source: Arc<dyn MetricSource>) -> Self {
        Self { source }
    }

    async fn check(&self, condition: &AlertCondition, now: DateTime<Utc>) -> Result<(bool, Option<f64>)> {
        let threshold = condition
            .threshold
            .ok_or_else(|| anyhow!("condition on '{}' has no threshold", condition.metric))?;
        let window = types::seconds(condition.window_secs).ok_or_else(|| {
            anyhow!(
                "condition on '{}' has an out-of-range window of {}s",
                condition.metric,
                condition.window_secs
            )
        })?;
        let observed = self
            .source
            .query(&condition.metric, &condition.labels, window, condition.aggregation, now)
            .await?;

        let holds = observed.is_some_and(|v| condition.operator.check(v, threshold));
        if observed.is_none() {
            tracing::debug!(
                metric = %condition.metric,
                labels = %format_labels(&condition.labels),
                "No samples in condition window"
            );
        }
        Ok((holds, observed))
    }
}

#[async_trait]
impl MetricEvaluator for ThresholdEvaluator {
    async fn evaluate(&self, rule: &AlertRule) -> Result<Evaluation> {
        if rule.conditions.is_empty() {
            return Err(anyhow!(
                "rule '{}' has no threshold conditions to evaluate",
                rule.name
            ));
        }

        let now = Utc::now();
        let mut should_fire = true;
        let mut value = None;
        for (i, condition) in rule.conditions.iter().enumerate() {
            let (holds, observed) = self.check(condition, now).await?;
            if i == 0 {
                value = observed;
            }
            should_fire &= holds;
        }

        Ok(Evaluation {
            should_fire,
            value: value.unwrap_or(0.0),
        })
    }
}
