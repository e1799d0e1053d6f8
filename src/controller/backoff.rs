use backon::{BackoffBuilder, ExponentialBackoff, ExponentialBuilder};
use dbprov_api::ObjectKey;
use std::{collections::HashMap, time::Duration};

use crate::config::ControllerConfig;

/// Per-key exponential retry delays.
///
/// Once a key has used up its exponential steps it keeps retrying at the max
/// delay; a successful reconciliation resets it.
pub(crate) struct RetryTracker {
    policy: ExponentialBuilder,
    max_delay: Duration,
    backoffs: HashMap<ObjectKey, ExponentialBackoff>,
}

impl RetryTracker {
    pub(crate) fn new(cfg: &ControllerConfig) -> Self {
        let policy = ExponentialBuilder::default()
            .with_min_delay(cfg.retry_min_delay())
            .with_max_delay(cfg.retry_max_delay())
            .with_max_times(cfg.retry_max_times)
            .with_jitter();

        Self {
            policy,
            max_delay: cfg.retry_max_delay(),
            backoffs: HashMap::new(),
        }
    }

    pub(crate) fn next_delay(&mut self, key: &ObjectKey) -> Duration {
        let policy = self.policy;
        self.backoffs
            .entry(key.clone())
            .or_insert_with(|| policy.build())
            .next()
            .unwrap_or(self.max_delay)
    }

    pub(crate) fn reset(&mut self, key: &ObjectKey) {
        self.backoffs.remove(key);
    }

    pub(crate) fn backing_off(&self) -> Vec<ObjectKey> {
        let mut keys: Vec<ObjectKey> = self.backoffs.keys().cloned().collect();
        keys.sort();
        keys
    }
}
