//! Operational knobs. Loading these from a file or environment is delegated
//! to the caller; this struct only carries the values the engine's
//! components need, with sensible production defaults.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: i32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of concurrent generation workers.
    pub worker_count: usize,
    /// How often an idle worker polls for the next job.
    pub poll_interval: Duration,
    /// How long a claimed job's lease is valid before it is reclaimable.
    pub lease_ttl: Duration,
    /// How often a running job's heartbeat extends its lease. Must be
    /// strictly less than `lease_ttl`.
    pub heartbeat_interval: Duration,
    /// Number of days processed per generation batch.
    pub batch_days: i64,
    pub retry: RetryConfig,
    /// How often the reconciliation loop scans for stale templates.
    pub reconciliation_interval: Duration,
    /// Upper bound on reconciliation worker startup jitter.
    pub reconciliation_startup_jitter: Duration,
    /// A template updated more recently than this is assumed to already
    /// have a job scheduled by the service layer, so reconciliation skips it.
    pub template_grace_period: Duration,
    /// Delay between processing consecutive templates in a reconciliation
    /// cycle, to avoid saturating storage.
    pub reconciliation_rate_limit_delay: Duration,
    /// Max templates considered per reconciliation cycle.
    pub reconciliation_batch_size: usize,
    pub default_sync_horizon_days: i64,
    pub default_generation_horizon_days: i64,
    pub default_page_size: i64,
    pub max_page_size: i64,
    pub operation_timeout: Duration,
    pub shutdown_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            poll_interval: Duration::from_millis(500),
            lease_ttl: Duration::from_secs(60),
            heartbeat_interval: Duration::from_secs(20),
            batch_days: 100,
            retry: RetryConfig::default(),
            reconciliation_interval: Duration::from_secs(60),
            reconciliation_startup_jitter: Duration::from_secs(10),
            template_grace_period: Duration::from_secs(5 * 60),
            reconciliation_rate_limit_delay: Duration::from_millis(200),
            reconciliation_batch_size: 50,
            default_sync_horizon_days: 14,
            default_generation_horizon_days: 365,
            default_page_size: 25,
            max_page_size: 100,
            operation_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl EngineConfig {
    /// Panics are a programmer error in configuration, not a runtime
    /// condition, so this is an assertion rather than a `Result`: it is
    /// meant to be called once at startup.
    pub fn validate(&self) {
        assert!(
            self.heartbeat_interval < self.lease_ttl,
            "heartbeat_interval must be strictly less than lease_ttl"
        );
        assert!(self.worker_count > 0, "worker_count must be positive");
        assert!(self.batch_days > 0, "batch_days must be positive");
    }
}
