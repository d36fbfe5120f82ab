//! Helpers shared by the channel implementations.

use serde_json::Value;

/// Upper bound for response bodies quoted in errors and logs.
pub const MAX_BODY_LENGTH: usize = 2000;

/// Setting names whose values are credentials. Slack-style incoming webhook
/// URLs embed their secret, so `webhook_url` is included.
const SENSITIVE_KEYS: &[&str] = &[
    "password",
    "token",
    "secret",
    "api_key",
    "apikey",
    "routing_key",
    "webhook_url",
    "authorization",
];

/// Truncates `s` to at most `max_len` bytes without splitting a character.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... [truncated]", &s[..end])
}

fn is_sensitive(key: &str) -> bool {
    let key = key.to_lowercase();
    SENSITIVE_KEYS.iter().any(|k| key.contains(k))
}

/// Returns a copy of channel settings with credential values replaced by
/// `"***"`, recursing into nested objects and arrays.
pub fn redact_settings(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, val)| {
                    let val = if is_sensitive(key) {
                        Value::String("***".to_string())
                    } else {
                        redact_settings(val)
                    };
                    (key.clone(), val)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_settings).collect()),
        _ => value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_string("hello", 10), "hello");
        assert_eq!(truncate_string("hello world", 5), "hello... [truncated]");
        assert_eq!(truncate_string("héllo", 2), "h... [truncated]");
    }

    #[test]
    fn redacts_nested_credentials() {
        let settings = serde_json::json!({
            "url": "https://hooks.example.com/alert",
            "routing_key": "R0UT1NG",
            "headers": { "Authorization": "Bearer abc", "X-Team": "ops" },
            "targets": [{ "api_key": "k" }]
        });
        let redacted = redact_settings(&settings);
        assert_eq!(redacted["url"], "https://hooks.example.com/alert");
        assert_eq!(redacted["routing_key"], "***");
        assert_eq!(redacted["headers"]["Authorization"], "***");
        assert_eq!(redacted["headers"]["X-Team"], "ops");
        assert_eq!(redacted["targets"][0]["api_key"], "***");
    }
}
