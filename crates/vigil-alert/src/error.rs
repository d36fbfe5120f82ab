/// Errors surfaced by the alerting engine's administrative operations.
///
/// Evaluation failures never reach callers of the admin surface; the
/// scheduler logs and counts them. They use [`AlertError::Evaluation`] only
/// when a rule is dry-run through [`crate::engine::AlertEngine::test_rule`].
///
/// # Examples
///
/// ```rust
/// use vigil_alert::error::AlertError;
///
/// let err = AlertError::RuleNotFound("cpu-high".to_string());
/// assert!(err.to_string().contains("cpu-high"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    /// The rule definition is malformed and was not registered.
    #[error("Alert: invalid rule: {0}")]
    InvalidRule(String),

    /// The rule references an escalation policy that is not configured.
    #[error("Alert: unknown escalation policy '{0}'")]
    UnknownEscalationPolicy(String),

    /// A rule with the same ID is already registered.
    #[error("Alert: rule '{0}' already exists")]
    DuplicateRule(String),

    #[error("Alert: rule '{0}' not found")]
    RuleNotFound(String),

    /// No alert with the given fingerprint is held in the registry.
    #[error("Alert: alert '{0}' not found")]
    AlertNotFound(String),

    /// The metric evaluator failed for a dry-run evaluation.
    #[error("Alert: evaluation failed: {0}")]
    Evaluation(String),
}

impl AlertError {
    /// Not-found errors map to 404 at the HTTP layer, the rest to 400.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::RuleNotFound(_) | Self::AlertNotFound(_))
    }
}

/// Convenience `Result` alias for engine operations.
pub type Result<T> = std::result::Result<T, AlertError>;
