//! Process-wide tuning constants. These are read-only runtime
//! configuration; changing a value that affects an on-wire or
//! on-disk encoding is a protocol-breaking change.

use std::time::Duration;

/// Tuning knobs for one running node. `Default` matches the published
/// defaults exactly; tests override individual fields
/// (e.g. a small `chunk_cache_size`) without touching process-wide
/// state.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum size of one sync-diff chunk, in bytes.
    pub chunk_size: usize,
    /// Capacity of the per-peer chunk LRU.
    pub chunk_cache_size: usize,
    /// How long a cached chunk may sit idle before eviction.
    pub chunk_cache_ttl: Duration,
    /// WASM linear memory pages (64 KiB each) granted to a processor.
    pub vm_pages: u32,
    /// WASM table size granted to a processor.
    pub vm_table_size: u32,
    /// Fuel budget for one `run()` call; exceeding it aborts with
    /// `ProcessorError::Exhausted`.
    pub vm_fuel: u64,
    /// Consensus query timeout; an expired query is a non-vote.
    pub query_timeout: Duration,
    pub max_eligible_parents_depth_diff: u64,
    pub minimum_difficulty: u64,
    pub median_timestamp_num_ancestors: usize,
    /// Directory scanned at startup for `*.wasm` guest binaries.
    pub processor_dir: std::path::PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_size: 1 << 20,
            chunk_cache_size: 1024,
            chunk_cache_ttl: Duration::from_secs(60),
            vm_pages: 128,
            vm_table_size: 65_536,
            vm_fuel: 10_000_000,
            query_timeout: Duration::from_millis(10_000),
            max_eligible_parents_depth_diff: 5,
            minimum_difficulty: 7,
            median_timestamp_num_ancestors: 10,
            processor_dir: std::path::PathBuf::from("processors"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_published_tuning_constants() {
        let config = Config::default();
        assert_eq!(config.chunk_size, 1_048_576);
        assert_eq!(config.chunk_cache_size, 1024);
        assert_eq!(config.vm_pages, 128);
        assert_eq!(config.vm_table_size, 65_536);
        assert_eq!(config.query_timeout.as_millis(), 10_000);
        assert_eq!(config.max_eligible_parents_depth_diff, 5);
        assert_eq!(config.minimum_difficulty, 7);
        assert_eq!(config.median_timestamp_num_ancestors, 10);
    }
}
