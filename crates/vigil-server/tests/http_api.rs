mod common;

use axum::http::StatusCode;
use common::*;
use serde_json::json;
use vigil_common::types::Severity;
use vigil_server::config::{RulesSeedFile, ServerConfig};

#[tokio::test]
async fn health_uses_envelope_and_trace_header() {
    let ctx = build_test_context().expect("context should build");
    let (status, body, trace_id) = request_no_body(&ctx.app, "GET", "/v1/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["err_code"], 0);
    assert_eq!(body["err_msg"], "success");
    assert_eq!(body["data"]["rule_count"], 0);
    assert_eq!(body["data"]["engine_running"], false);

    let trace_id = trace_id.expect("trace id header should be set");
    assert_eq!(trace_id.len(), 16);
    assert_eq!(body["trace_id"], trace_id);
}

#[tokio::test]
async fn rule_crud_round() {
    let ctx = build_test_context().expect("context should build");
    let created = create_rule(&ctx.app, threshold_rule("cpu-web-1", "cpu_usage", 80.0, "web-1")).await;
    assert_eq!(created["id"], "cpu-web-1");
    // No severity given: the configured default applies.
    assert_eq!(created["severity"], "medium");

    let (status, body, _) = request_no_body(&ctx.app, "GET", "/v1/rules/cpu-web-1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["conditions"][0]["threshold"], 80.0);

    let mut update = threshold_rule("cpu-web-1", "cpu_usage", 90.0, "web-1");
    update["severity"] = json!("critical");
    let (status, body, _) = request_json(&ctx.app, "PUT", "/v1/rules/cpu-web-1", Some(update)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["severity"], "critical");
    assert_eq!(body["data"]["created_at"], created["created_at"]);

    let (status, body, _) = request_no_body(&ctx.app, "GET", "/v1/rules").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().map(Vec::len), Some(1));

    let (status, _, _) = request_no_body(&ctx.app, "DELETE", "/v1/rules/cpu-web-1").await;
    assert_eq!(status, StatusCode::OK);
    let (status, body, _) = request_no_body(&ctx.app, "GET", "/v1/rules/cpu-web-1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["err_code"], 1004);
}

#[tokio::test]
async fn rule_without_usable_threshold_is_rejected() {
    let ctx = build_test_context().expect("context should build");
    let rule = json!({
        "name": "unknown metric",
        "conditions": [{ "metric": "queue_depth", "operator": "gt" }]
    });
    let (status, body, _) = request_json(&ctx.app, "POST", "/v1/rules", Some(rule)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["err_code"], 1201);

    // Known metric: the configured default threshold fills in.
    let rule = json!({
        "name": "cpu default",
        "conditions": [{ "metric": "cpu_usage", "operator": "gt" }]
    });
    let created = create_rule(&ctx.app, rule).await;
    assert_eq!(created["conditions"][0]["threshold"], 80.0);
}

#[tokio::test]
async fn out_of_range_durations_are_rejected() {
    let ctx = build_test_context().expect("context should build");

    let mut endless = threshold_rule("endless", "cpu_usage", 90.0, "web-1");
    endless["for_secs"] = json!(10_000_000_000_000_000u64);
    let (status, body, _) = request_json(&ctx.app, "POST", "/v1/rules", Some(endless)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["err_code"], 1201);

    let mut wide = threshold_rule("wide", "cpu_usage", 90.0, "web-1");
    wide["conditions"][0]["window_secs"] = json!(10_000_000_000_000u64);
    let (status, body, _) = request_json(&ctx.app, "POST", "/v1/rules", Some(wide)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["err_code"], 1201);

    let (_, body, _) = request_no_body(&ctx.app, "GET", "/v1/rules").await;
    assert_eq!(body["data"].as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn duplicate_rule_and_unknown_policy() {
    let ctx = build_test_context().expect("context should build");
    create_rule(&ctx.app, threshold_rule("dup", "cpu_usage", 80.0, "web-1")).await;

    let (status, _, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/rules",
        Some(threshold_rule("dup", "cpu_usage", 80.0, "web-1")),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let mut rule = threshold_rule("paged", "cpu_usage", 80.0, "web-1");
    rule["escalation_policy"] = json!("no-such-policy");
    let (status, body, _) = request_json(&ctx.app, "POST", "/v1/rules", Some(rule)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["err_code"], 1202);
}

#[tokio::test]
async fn metrics_drive_alert_lifecycle() {
    let ctx = build_test_context().expect("context should build");
    create_rule(&ctx.app, threshold_rule("cpu-web-1", "cpu_usage", 80.0, "web-1")).await;

    push_metric(&ctx.app, "cpu_usage", "web-1", 95.0).await;
    ctx.state.engine.evaluate_once().await;

    let firing = list_alerts(&ctx.app, "state=firing").await;
    assert_eq!(firing.len(), 1);
    let alert = &firing[0];
    assert_eq!(alert["rule_id"], "cpu-web-1");
    assert_eq!(alert["value"], 95.0);
    let fp = alert["fingerprint"].as_str().expect("fingerprint").to_string();

    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        &format!("/v1/alerts/{fp}/acknowledge"),
        Some(json!({ "user": "alice" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["acknowledged_by"], "alice");
    assert_eq!(body["data"]["state"], "firing");

    // Condition clears: the alert resolves on the next pass.
    push_metric(&ctx.app, "cpu_usage", "web-1", 20.0).await;
    ctx.state.engine.evaluate_once().await;

    let (status, body, _) = request_no_body(&ctx.app, "GET", &format!("/v1/alerts/{fp}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["state"], "resolved");
    assert!(body["data"]["ends_at"].is_string());

    let (status, body, _) = request_no_body(&ctx.app, "GET", "/v1/alerts/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total_rules"], 1);
    assert_eq!(body["data"]["by_state"]["resolved"], 1);
    assert_eq!(body["data"]["dispatched"]["firing"], 1);
    assert_eq!(body["data"]["dispatched"]["resolved"], 1);
}

#[tokio::test]
async fn manual_resolve_requires_user_and_known_alert() {
    let ctx = build_test_context().expect("context should build");
    create_rule(&ctx.app, threshold_rule("cpu-web-2", "cpu_usage", 80.0, "web-2")).await;
    push_metric(&ctx.app, "cpu_usage", "web-2", 99.0).await;
    ctx.state.engine.evaluate_once().await;

    let fp = list_alerts(&ctx.app, "source=cpu-web-2").await[0]["fingerprint"]
        .as_str()
        .expect("fingerprint")
        .to_string();

    let (status, _, _) = request_json(
        &ctx.app,
        "POST",
        &format!("/v1/alerts/{fp}/resolve"),
        Some(json!({ "user": "" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        &format!("/v1/alerts/{fp}/resolve"),
        Some(json!({ "user": "bob" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["state"], "resolved");
    assert_eq!(body["data"]["resolved_by"], "bob");

    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/alerts/does-not-exist/resolve",
        Some(json!({ "user": "bob" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["err_code"], 1004);
}

#[tokio::test]
async fn dry_run_does_not_create_alerts() {
    let ctx = build_test_context().expect("context should build");
    create_rule(&ctx.app, threshold_rule("mem", "memory_usage", 85.0, "db-1")).await;
    push_metric(&ctx.app, "memory_usage", "db-1", 91.5).await;

    let (status, body, _) = request_no_body(&ctx.app, "POST", "/v1/rules/mem/test").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["should_fire"], true);
    assert_eq!(body["data"]["value"], 91.5);
    assert!(list_alerts(&ctx.app, "").await.is_empty());

    let (status, _, _) = request_no_body(&ctx.app, "POST", "/v1/rules/missing/test").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn disabled_rule_is_not_evaluated() {
    let ctx = build_test_context().expect("context should build");
    create_rule(&ctx.app, threshold_rule("disk", "disk_usage", 90.0, "web-1")).await;

    let (status, body, _) = request_json(
        &ctx.app,
        "PUT",
        "/v1/rules/disk/enable",
        Some(json!({ "enabled": false })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["enabled"], false);

    push_metric(&ctx.app, "disk_usage", "web-1", 99.0).await;
    assert_eq!(ctx.state.engine.evaluate_once().await, 0);
    assert!(list_alerts(&ctx.app, "").await.is_empty());
}

#[tokio::test]
async fn silence_suppresses_matching_alerts() {
    let ctx = build_test_context().expect("context should build");
    create_rule(&ctx.app, threshold_rule("cpu-web-1", "cpu_usage", 80.0, "web-1")).await;

    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/silences",
        Some(json!({
            "name": "web-1 maintenance",
            "matchers": [{ "name": "host", "value": "web-1" }],
            "ends_at": (chrono::Utc::now() + chrono::Duration::hours(1)).to_rfc3339(),
            "created_by": "alice"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "unexpected body: {body}");
    let silence_id = body["data"]["id"].as_str().expect("silence id").to_string();
    assert!(silence_id.starts_with("silence-"));

    push_metric(&ctx.app, "cpu_usage", "web-1", 95.0).await;
    ctx.state.engine.evaluate_once().await;

    let alerts = list_alerts(&ctx.app, "").await;
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0]["state"], "suppressed");
    assert_eq!(alerts[0]["inhibited"], true);
    assert_eq!(alerts[0]["inhibited_by"][0], silence_id.as_str());

    let (status, body, _) = request_no_body(&ctx.app, "GET", "/v1/alerts/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["dispatched"]["firing"], 0);

    let uri = format!("/v1/silences/{silence_id}");
    let (status, _, _) = request_no_body(&ctx.app, "DELETE", &uri).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _, _) = request_no_body(&ctx.app, "DELETE", &uri).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Silence gone and condition still true: the alert fires.
    ctx.state.engine.evaluate_once().await;
    let alerts = list_alerts(&ctx.app, "state=firing").await;
    assert_eq!(alerts.len(), 1);
}

#[tokio::test]
async fn invalid_silence_is_rejected() {
    let ctx = build_test_context().expect("context should build");
    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/silences",
        Some(json!({
            "matchers": [],
            "ends_at": (chrono::Utc::now() + chrono::Duration::hours(1)).to_rfc3339()
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["err_code"], 1301);
}

#[tokio::test]
async fn metric_batch_validation() {
    let ctx = build_test_context().expect("context should build");
    let (status, _, _) = request_json(&ctx.app, "POST", "/v1/metrics", Some(json!([]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/metrics",
        Some(json!([{ "metric_name": " ", "value": 1.0 }])),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body, _) = request_json(
        &ctx.app,
        "POST",
        "/v1/metrics",
        Some(json!([
            { "metric_name": "cpu_usage", "value": 10.0, "labels": { "host": "a" } },
            { "metric_name": "cpu_usage", "value": 12.0, "labels": { "host": "b" } }
        ])),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["accepted"], 2);
    assert_eq!(body["data"]["series"], 2);
}

#[tokio::test]
async fn config_file_wires_channels_policies_and_silences() {
    let toml = r#"
http_port = 9100

[alerting]
evaluation_interval_secs = 15
default_severity = "high"

[[channels]]
id = "ops-hook"
channel_type = "webhook"
settings = { url = "http://127.0.0.1:9/hook" }

[[escalation_policies]]
id = "page-ops"
steps = [{ order = 1, channels = ["ops-hook"] }]

[[suppression_rules]]
id = "maint"
matchers = [{ name = "env", value = "staging" }]
starts_at = "2024-01-01T00:00:00Z"
ends_at = "2099-01-01T00:00:00Z"
"#;
    let file = write_temp_file(toml, ".toml").expect("temp file");
    let config = ServerConfig::load(file.path().to_str().expect("utf-8 path")).expect("config loads");
    assert_eq!(config.http_port, 9100);
    assert_eq!(config.alerting.default_severity, Severity::High);
    assert_eq!(config.alerting.max_concurrent_evaluations, 10);

    let ctx = build_test_context_with(config).expect("context should build");
    assert!(ctx.state.notifications.has_channel("ops-hook"));
    assert_eq!(ctx.state.silences.list().len(), 1);

    let mut rule = threshold_rule("paged", "cpu_usage", 80.0, "web-1");
    rule["escalation_policy"] = json!("page-ops");
    let created = create_rule(&ctx.app, rule).await;
    assert_eq!(created["severity"], "high");
}

#[tokio::test]
async fn unknown_channel_type_fails_startup() {
    let mut config = ServerConfig::default();
    config.channels = vec![serde_json::from_value(json!({
        "id": "carrier-pigeon",
        "channel_type": "pigeon"
    }))
    .expect("channel config")];
    assert!(build_test_context_with(config).is_err());
}

#[tokio::test]
async fn rules_seed_file_applies_default_severity() {
    let seed = json!({
        "rules": [
            threshold_rule("a", "cpu_usage", 80.0, "web-1"),
            { "name": "b", "severity": "critical", "conditions": [{ "metric": "error_rate", "operator": "gte" }] }
        ]
    });
    let file = write_temp_file(&seed.to_string(), ".json").expect("temp file");
    let seed = RulesSeedFile::load(file.path().to_str().expect("utf-8 path")).expect("seed loads");
    assert_eq!(seed.rules.len(), 2);

    let rules: Vec<_> = seed
        .rules
        .into_iter()
        .map(|r| r.into_rule(Severity::Low))
        .collect();
    assert_eq!(rules[0].severity, Severity::Low);
    assert_eq!(rules[1].severity, Severity::Critical);
    assert!(rules[1].id.is_empty());
}

#[tokio::test]
async fn shipped_example_config_and_rules_are_valid() {
    let root = concat!(env!("CARGO_MANIFEST_DIR"), "/../../config");
    let config = ServerConfig::load(&format!("{root}/server.example.toml")).expect("example config loads");
    let seed = RulesSeedFile::load(&format!("{root}/rules.example.json")).expect("example rules load");

    let default_severity = config.alerting.default_severity;
    let ctx = build_test_context_with(config).expect("context should build");
    for req in seed.rules {
        ctx.state
            .engine
            .add_rule(req.into_rule(default_severity))
            .expect("example rule is valid");
    }
    assert_eq!(ctx.state.engine.list_rules().len(), 2);
}
