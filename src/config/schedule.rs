use std::time::Duration;

/// Timer cadence for the background jobs
#[derive(Debug, Clone)]
pub struct JobSchedule {
    /// Draft polling interval (default: 60s)
    pub draft_interval: Duration,
    /// Recurring notification interval (default: 1h, aligned to the UTC hour)
    pub intelligent_interval: Duration,
    /// Matchup cache refresh interval (default: 5 min)
    pub refresh_interval: Duration,
    /// Cache retention sweep interval (default: 1 day)
    pub cleanup_interval: Duration,
    /// Pause between two upstream requests in a refresh batch (default: 500ms)
    pub refresh_delay: Duration,
    /// Age after which cached matchups are purged (default: 14 days)
    pub cache_retention: chrono::Duration,
}

impl Default for JobSchedule {
    fn default() -> Self {
        Self {
            draft_interval: Duration::from_secs(60),
            intelligent_interval: Duration::from_secs(60 * 60),
            refresh_interval: Duration::from_secs(5 * 60),
            cleanup_interval: Duration::from_secs(24 * 60 * 60),
            refresh_delay: Duration::from_millis(500),
            cache_retention: chrono::Duration::days(14),
        }
    }
}

impl JobSchedule {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            draft_interval: env_secs("DRAFT_INTERVAL_SECS").unwrap_or(defaults.draft_interval),
            intelligent_interval: env_secs("INTELLIGENT_INTERVAL_SECS")
                .unwrap_or(defaults.intelligent_interval),
            refresh_interval: env_secs("REFRESH_INTERVAL_SECS").unwrap_or(defaults.refresh_interval),
            cleanup_interval: env_secs("CLEANUP_INTERVAL_SECS").unwrap_or(defaults.cleanup_interval),
            refresh_delay: std::env::var("REFRESH_DELAY_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.refresh_delay),
            cache_retention: std::env::var("CACHE_RETENTION_DAYS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(chrono::Duration::days)
                .unwrap_or(defaults.cache_retention),
        }
    }
}

/// Time-to-live for each kind of upstream resource
#[derive(Debug, Clone)]
pub struct CacheTtls {
    pub state: chrono::Duration,
    pub drafts: chrono::Duration,
    pub picks: chrono::Duration,
    pub rosters: chrono::Duration,
    pub players: chrono::Duration,
    pub schedule: chrono::Duration,
    pub matchups: chrono::Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            state: chrono::Duration::minutes(5),
            drafts: chrono::Duration::seconds(30),
            picks: chrono::Duration::seconds(15),
            rosters: chrono::Duration::minutes(2),
            players: chrono::Duration::hours(6),
            schedule: chrono::Duration::hours(1),
            matchups: chrono::Duration::seconds(60),
        }
    }
}

/// Capped exponential backoff for upstream calls
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the given failed attempt (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

fn env_secs(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}
