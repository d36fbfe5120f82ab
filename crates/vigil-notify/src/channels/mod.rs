pub mod pagerduty;
pub mod slack;
pub mod webhook;

use crate::error::NotifyError;
use crate::utils::{truncate_string, MAX_BODY_LENGTH};

/// Turns a non-success HTTP response into an [`NotifyError::ApiError`].
pub(crate) async fn check_response(service: &str, resp: reqwest::Response) -> anyhow::Result<()> {
    let status = resp.status();
    if status.is_success() {
        return Ok(());
    }
    let body = match resp.text().await {
        Ok(text) => truncate_string(&text, MAX_BODY_LENGTH),
        Err(e) => format!("[failed to read response body: {e}]"),
    };
    Err(NotifyError::ApiError {
        service: service.to_string(),
        status: status.as_u16(),
        body,
    }
    .into())
}
