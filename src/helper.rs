use std::env;
use std::time::{SystemTime, UNIX_EPOCH};
use rand::Rng;
use uuid::Uuid;
use crate::constants::ROOT_SERIAL;

/// Current UNIX timestamp in milliseconds.
pub(crate) fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// Fresh signing request id: 32 lowercase hex digits.
pub(crate) fn new_request_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Serial for a self-signed certificate.
/// Drawn from above the root's serial, far out of reach of the sequential counter.
pub(crate) fn random_serial() -> i64 {
    rand::rng().random_range((ROOT_SERIAL + 1)..i64::MAX)
}

/// Read a non-empty environment variable
pub(crate) fn get_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
