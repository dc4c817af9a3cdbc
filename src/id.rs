//! ID generation utilities
//!
//! Provides functions for generating unique identifiers for tools and requests.

use rand::Rng;

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Generate a unique tool ID
///
/// Format: `tool-{timestamp_ms}-{random_hex}`
/// Example: `tool-1738300800123-a1b2c3d4`
pub fn generate_tool_id() -> String {
    let timestamp = now_ms();
    let random: u32 = rand::rng().random();
    format!("tool-{}-{:08x}", timestamp, random)
}

/// Generate a request ID for one orchestration
///
/// Format: `req-{timestamp_ms}-{random_hex}`
pub fn generate_request_id() -> String {
    let timestamp = now_ms();
    let random: u16 = rand::rng().random();
    format!("req-{}-{:04x}", timestamp, random)
}
