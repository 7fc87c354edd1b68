/**
 * Configuration constants for watch sessions, change aggregation and write retries
 */
use std::time::Duration;

/// Fixed wait between a watch failure and the next list+watch cycle, in seconds
pub const RECONNECT_BACKOFF_SECONDS: u64 = 10;

/// Watch stream timeout in seconds (294 vs 300 to allow 6 seconds for graceful shutdown)
pub const WATCH_TIMEOUT_SECONDS: u32 = 294;

/// Channel buffer size for session notifications, per subscriber
pub const NOTIFICATION_CHANNEL_CAPACITY: usize = 100;

/// Default quiet period before an aggregated change notification fires, in milliseconds
pub const DEFAULT_DEBOUNCE_MILLIS: u64 = 1000;

/// Delay between read-modify-write attempts after a version conflict, in milliseconds
pub const CONFLICT_RETRY_DELAY_MILLIS: u64 = 1000;

/// Configuration of a single watch session
#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub reconnect_backoff: Duration,
    pub channel_capacity: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            reconnect_backoff: Duration::from_secs(RECONNECT_BACKOFF_SECONDS),
            channel_capacity: NOTIFICATION_CHANNEL_CAPACITY,
        }
    }
}

/// Configuration of a change aggregator
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    pub debounce: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MILLIS),
        }
    }
}

/// Configuration of optimistic read-modify-write updates
#[derive(Debug, Clone)]
pub struct UpdateConfig {
    pub conflict_retry_delay: Duration,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            conflict_retry_delay: Duration::from_millis(CONFLICT_RETRY_DELAY_MILLIS),
        }
    }
}

/// Configuration of the kube-backed collection
#[derive(Debug, Clone)]
pub struct KubeCollectionConfig {
    /// Server-side timeout after which a watch stream completes normally
    pub watch_timeout_secs: u32,
}

impl Default for KubeCollectionConfig {
    fn default() -> Self {
        Self {
            watch_timeout_secs: WATCH_TIMEOUT_SECONDS,
        }
    }
}

/// Everything a mirroring process needs, grouped
#[derive(Debug, Clone, Default)]
pub struct MirrorConfig {
    pub watch: WatchConfig,
    pub aggregator: AggregatorConfig,
    pub update: UpdateConfig,
    pub collection: KubeCollectionConfig,
}

/// Validate configuration constants at compile time
const _: () = {
    assert!(RECONNECT_BACKOFF_SECONDS > 0, "RECONNECT_BACKOFF_SECONDS must be greater than 0");
    assert!(WATCH_TIMEOUT_SECONDS > 0, "WATCH_TIMEOUT_SECONDS must be greater than 0");
    assert!(WATCH_TIMEOUT_SECONDS < 295, "WATCH_TIMEOUT_SECONDS must stay below the client read timeout");
    assert!(NOTIFICATION_CHANNEL_CAPACITY > 0, "NOTIFICATION_CHANNEL_CAPACITY must be greater than 0");
    assert!(DEFAULT_DEBOUNCE_MILLIS > 0, "DEFAULT_DEBOUNCE_MILLIS must be greater than 0");
    assert!(CONFLICT_RETRY_DELAY_MILLIS > 0, "CONFLICT_RETRY_DELAY_MILLIS must be greater than 0");
};
