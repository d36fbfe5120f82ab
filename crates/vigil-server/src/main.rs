use anyhow::Result;
use chrono::Utc;
use std::net::SocketAddr;
use tokio::signal;
use tokio::time::{interval, MissedTickBehavior};
use tracing_subscriber::EnvFilter;

use vigil_alert::engine::AlertEngine;
use vigil_alert::rules::ThresholdEvaluator;
use vigil_alert::window::MetricStore;
use vigil_server::app;
use vigil_server::config::{RulesSeedFile, ServerConfig};
use vigil_server::state::AppState;

#[allow(clippy::print_stderr)]
fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  vigil-server [config.toml]                          Start the server");
    eprintln!("  vigil-server check-rules <config.toml> <rules.json> Validate a rules file and exit");
}

#[tokio::main]
async fn main() -> Result<()> {
    vigil_common::id::init(1, 1);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("vigil=info".parse()?))
        .init();

    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        Some("check-rules") => {
            let config_path = args.get(2).ok_or_else(|| {
                print_usage();
                anyhow::anyhow!("check-rules requires <config.toml> and <rules.json> arguments")
            })?;
            let rules_path = args.get(3).ok_or_else(|| {
                print_usage();
                anyhow::anyhow!("check-rules requires <rules.json> argument")
            })?;
            run_check_rules(config_path, rules_path)
        }
        Some("--help" | "-h") => {
            print_usage();
            Ok(())
        }
        _ => {
            let config_path = args
                .get(1)
                .map(|s| s.as_str())
                .unwrap_or("config/server.toml");
            run_server(config_path).await
        }
    }
}

/// Registers every rule of the file against a throwaway engine built from
/// the config, so thresholds and escalation policy references are checked
/// exactly as at startup.
fn run_check_rules(config_path: &str, rules_path: &str) -> Result<()> {
    let config = ServerConfig::load(config_path)?;
    let seed = RulesSeedFile::load(rules_path)?;

    let evaluator = std::sync::Arc::new(ThresholdEvaluator::new(std::sync::Arc::new(
        MetricStore::new(config.metric_retention_secs),
    )));
    let engine = AlertEngine::builder(config.alerting.clone(), evaluator)
        .escalation_policies(config.escalation_policies.iter().map(|p| p.id.clone()))
        .build();

    let total = seed.rules.len();
    let mut failed = 0usize;
    for req in seed.rules {
        let name = req.name.clone();
        if let Err(e) = engine.add_rule(req.into_rule(config.alerting.default_severity)) {
            failed += 1;
            tracing::error!(rule = %name, error = %e, "Invalid rule");
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {total} rule(s) in '{rules_path}' are invalid");
    }
    tracing::info!(total, "All rules valid");
    Ok(())
}

fn load_rules(state: &AppState, path: &str) -> Result<()> {
    let seed = RulesSeedFile::load(path)?;
    let default_severity = state.config.alerting.default_severity;
    let mut loaded = 0u32;
    let mut skipped = 0u32;

    for req in seed.rules {
        let name = req.name.clone();
        match state.engine.add_rule(req.into_rule(default_severity)) {
            Ok(_) => loaded += 1,
            Err(e) => {
                skipped += 1;
                tracing::warn!(rule = %name, error = %e, "Skipping invalid rule from seed");
            }
        }
    }
    tracing::info!(path = %path, loaded, skipped, "Rules loaded");
    Ok(())
}

async fn run_server(config_path: &str) -> Result<()> {
    let config = ServerConfig::load(config_path)?;

    tracing::info!(
        http_port = config.http_port,
        alerting_enabled = config.alerting.enabled,
        evaluation_interval_secs = config.alerting.evaluation_interval_secs,
        "Starting vigil-server"
    );

    let rules_file = config.rules_file.clone();
    let state = AppState::build(config)?;
    if let Some(path) = rules_file.as_deref() {
        load_rules(&state, path)?;
    }

    state.engine.start();

    // Housekeeping for the in-memory stores the engine does not own.
    let housekeeping_state = state.clone();
    let housekeeping_handle = tokio::spawn(async move {
        let mut tick = interval(housekeeping_state.engine.config().sweep_interval());
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tick.tick().await;
            let now = Utc::now();
            housekeeping_state.metrics.compact(now);
            let purged = housekeeping_state.silences.purge_expired(now);
            if purged > 0 {
                tracing::info!(purged, "Purged expired silences");
            }
        }
    });

    let http_addr: SocketAddr = format!("0.0.0.0:{}", state.config.http_port).parse()?;
    let app = app::build_http_app(state.clone());
    let http_listener = tokio::net::TcpListener::bind(http_addr).await?;
    tracing::info!(addr = %http_addr, "HTTP server listening");

    if let Err(e) = axum::serve(http_listener, app)
        .with_graceful_shutdown(async {
            signal::ctrl_c().await.ok();
            tracing::info!("Shutting down gracefully");
        })
        .await
    {
        tracing::error!(error = %e, "HTTP server error");
    }

    housekeeping_handle.abort();
    state.engine.stop().await;
    state.escalation.shutdown();

    tracing::info!("vigil-server stopped");
    Ok(())
}
