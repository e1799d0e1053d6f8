use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Reconciliation driver configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ControllerConfig {
    /// Deadline for a single reconciliation, including the MySQL round trips.
    /// TOML: `controller.reconcile_timeout_secs`. Default: `30`.
    #[serde(default = "default_reconcile_timeout_secs")]
    pub reconcile_timeout_secs: u64,

    /// Interval at which every known intent is re-enqueued.
    /// TOML: `controller.resync_interval_secs`. Default: `300`. `0` disables resync.
    #[serde(default = "default_resync_interval_secs")]
    pub resync_interval_secs: u64,

    /// Upper bound of reconciliations running in parallel (distinct keys only).
    /// TOML: `controller.max_concurrent_reconciles`. Default: `4`.
    #[serde(default = "default_max_concurrent_reconciles")]
    pub max_concurrent_reconciles: usize,

    /// Reconciliations started per second across all keys.
    /// TOML: `controller.reconciles_per_second`. Default: `10`.
    #[serde(default = "default_reconciles_per_second")]
    pub reconciles_per_second: u32,

    /// TOML: `controller.retry_min_delay_ms`. Default: `500`.
    #[serde(default = "default_retry_min_delay_ms")]
    pub retry_min_delay_ms: u64,

    /// TOML: `controller.retry_max_delay_ms`. Default: `300000` (5 minutes).
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,

    /// Exponential steps before a failing key settles at `retry_max_delay_ms`.
    /// TOML: `controller.retry_max_times`. Default: `12`.
    #[serde(default = "default_retry_max_times")]
    pub retry_max_times: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            reconcile_timeout_secs: default_reconcile_timeout_secs(),
            resync_interval_secs: default_resync_interval_secs(),
            max_concurrent_reconciles: default_max_concurrent_reconciles(),
            reconciles_per_second: default_reconciles_per_second(),
            retry_min_delay_ms: default_retry_min_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            retry_max_times: default_retry_max_times(),
        }
    }
}

impl ControllerConfig {
    pub fn reconcile_timeout(&self) -> Duration {
        Duration::from_secs(self.reconcile_timeout_secs.max(1))
    }

    pub fn resync_interval(&self) -> Option<Duration> {
        (self.resync_interval_secs > 0).then(|| Duration::from_secs(self.resync_interval_secs))
    }

    pub fn retry_min_delay(&self) -> Duration {
        Duration::from_millis(self.retry_min_delay_ms)
    }

    pub fn retry_max_delay(&self) -> Duration {
        Duration::from_millis(self.retry_max_delay_ms.max(self.retry_min_delay_ms))
    }
}

fn default_reconcile_timeout_secs() -> u64 {
    30
}

fn default_resync_interval_secs() -> u64 {
    300
}

fn default_max_concurrent_reconciles() -> usize {
    4
}

fn default_reconciles_per_second() -> u32 {
    10
}

fn default_retry_min_delay_ms() -> u64 {
    500
}

fn default_retry_max_delay_ms() -> u64 {
    300_000
}

fn default_retry_max_times() -> usize {
    12
}

/// MySQL gateway configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayConfig {
    /// TOML: `gateway.connect_timeout_secs`. Default: `10`.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl GatewayConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.max(1))
    }
}

fn default_connect_timeout_secs() -> u64 {
    10
}
