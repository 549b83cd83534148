//! Scheduler runtime configuration

use std::time::Duration;

/// How often the pool probes its solvers
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// How long an unanswered probe may stay outstanding before eviction
const DEFAULT_PROBE_GRACE: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Interval between health sweeps over the solver pool
    pub sweep_interval: Duration,

    /// Grace period a probed solver gets before it is presumed dead
    pub probe_grace: Duration,

    /// Upper bound on correlation RPC waits; `None` waits indefinitely
    pub rpc_timeout: Option<Duration>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            probe_grace: DEFAULT_PROBE_GRACE,
            rpc_timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_platform_timings() {
        let config = SchedulerConfig::default();
        assert_eq!(config.sweep_interval, Duration::from_secs(300));
        assert_eq!(config.probe_grace, Duration::from_secs(3600));
        assert!(config.rpc_timeout.is_none());
    }
}
