/// Errors raised while configuring or administering notification delivery.
///
/// Transport failures inside a [`crate::NotificationChannel`] stay
/// `anyhow::Error`; they are wrapped here once the manager gives up on a
/// delivery.
///
/// # Examples
///
/// ```rust
/// use vigil_notify::error::NotifyError;
///
/// let err = NotifyError::InvalidConfig("missing routing_key".to_string());
/// assert!(err.to_string().contains("routing_key"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// Channel, policy or silence configuration is missing a required field
    /// or contains an invalid value.
    #[error("Notify: invalid configuration: {0}")]
    InvalidConfig(String),

    /// The channel type is not registered in the plugin registry.
    #[error("Notify: unknown channel type '{0}'")]
    UnknownChannelType(String),

    /// Two configured channels share an ID.
    #[error("Notify: duplicate channel id '{0}'")]
    DuplicateChannel(String),

    #[error("Notify: HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Notify: JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// The external API returned a non-success response.
    #[error("Notify: API error from {service}: status={status}, body={body}")]
    ApiError {
        service: String,
        status: u16,
        body: String,
    },

    /// Every attempt for a channel failed or timed out.
    #[error("Notify: delivery through '{channel}' failed after {attempts} attempt(s): {reason}")]
    DeliveryFailed {
        channel: String,
        attempts: u32,
        reason: String,
    },

    #[error("Notify: silence '{0}' not found")]
    SilenceNotFound(String),
}

/// Convenience `Result` alias for notification operations.
pub type Result<T> = std::result::Result<T, NotifyError>;
