//! HTTP admin surface and process wiring for the vigil alerting engine.

pub mod api;
pub mod app;
pub mod config;
pub mod logging;
pub mod state;
