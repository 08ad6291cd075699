//! Environment variable helpers

use std::str::FromStr;
use std::time::Duration;

/// Read a non-empty environment variable
pub fn var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Read and parse an environment variable, logging values that do not parse
pub fn parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = var(key)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring unparseable value for {}: {:?}", key, raw);
            None
        }
    }
}

/// Read a duration given in whole seconds
pub fn seconds(key: &str) -> Option<Duration> {
    parse::<u64>(key).map(Duration::from_secs)
}
