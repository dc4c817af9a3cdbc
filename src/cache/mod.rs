//! Response cache with in-flight request coalescing

mod coalescer;
mod fingerprint;

pub use coalescer::{CacheStats, ResponseCache};
pub use fingerprint::{canonical_json, fingerprint, fingerprint_value};
