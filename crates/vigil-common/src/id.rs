use snowflake::SnowflakeIdBucket;
use std::sync::Mutex;

static ID_GENERATOR: Mutex<Option<SnowflakeIdBucket>> = Mutex::new(None);

/// Initializes the process-wide snowflake generator.
///
/// `machine_id` and `node_id` must each be in `0..32`. Calling this again
/// replaces the generator, which is only safe before any IDs are handed out.
pub fn init(machine_id: i32, node_id: i32) {
    let mut gen = ID_GENERATOR.lock().unwrap_or_else(|e| e.into_inner());
    *gen = Some(SnowflakeIdBucket::new(machine_id, node_id));
}

/// Returns a new unique, time-ordered ID in decimal form.
///
/// Falls back to machine/node `1/1` when [`init`] was never called.
pub fn next_id() -> String {
    let mut gen = ID_GENERATOR.lock().unwrap_or_else(|e| e.into_inner());
    let bucket = gen.get_or_insert_with(|| SnowflakeIdBucket::new(1, 1));
    bucket.get_id().to_string()
}

/// Returns a new ID carrying a short human-readable prefix, e.g. `rule-7312...`.
pub fn prefixed_id(prefix: &str) -> String {
    format!("{prefix}-{}", next_id())
}
