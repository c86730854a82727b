pub mod schedule;

pub use schedule::{CacheTtls, JobSchedule, RetryPolicy};

use crate::error::{BotError, Result};

/// Process configuration, read once at startup
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Telegram Bot API token (platform A)
    pub telegram_token: Option<String>,
    /// Discord bot token (platform B)
    pub discord_token: Option<String>,
    /// Base URL of the Sleeper REST API
    pub sleeper_base_url: String,
    /// NFL schedule source, `{season}` is substituted
    pub schedule_url: String,
    /// Sport tag used for state/players lookups
    pub sport: String,
    /// Directory holding the JSON database
    pub state_path: String,
    /// Port for the ops HTTP server
    pub web_port: u16,
    /// Shared secret for admin and cron routes (routes disabled when unset)
    pub admin_token: Option<String>,
    pub schedule: JobSchedule,
    pub cache_ttls: CacheTtls,
    pub retry: RetryPolicy,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            telegram_token: None,
            discord_token: None,
            sleeper_base_url: "https://api.sleeper.app/v1".to_string(),
            schedule_url: "https://api.sleeper.app/schedule/nfl/regular/{season}".to_string(),
            sport: "nfl".to_string(),
            state_path: "state".to_string(),
            web_port: 3000,
            admin_token: None,
            schedule: JobSchedule::default(),
            cache_ttls: CacheTtls::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl BotConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            telegram_token: non_empty_env("TELEGRAM_BOT_TOKEN"),
            discord_token: non_empty_env("DISCORD_TOKEN"),
            sleeper_base_url: non_empty_env("SLEEPER_BASE_URL")
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or(defaults.sleeper_base_url),
            schedule_url: non_empty_env("SCHEDULE_URL").unwrap_or(defaults.schedule_url),
            sport: non_empty_env("SPORT").unwrap_or(defaults.sport),
            state_path: non_empty_env("STATE_PATH").unwrap_or(defaults.state_path),
            web_port: std::env::var("WEB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.web_port),
            admin_token: non_empty_env("ADMIN_TOKEN"),
            schedule: JobSchedule::from_env(),
            cache_ttls: defaults.cache_ttls,
            retry: defaults.retry,
        }
    }

    /// Reject configurations the bot cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.telegram_token.is_none() && self.discord_token.is_none() {
            return Err(BotError::ConfigValidation {
                message: "set TELEGRAM_BOT_TOKEN and/or DISCORD_TOKEN".to_string(),
            });
        }
        if !self.schedule_url.contains("{season}") {
            return Err(BotError::ConfigValidation {
                message: format!("SCHEDULE_URL must contain {{season}}: {}", self.schedule_url),
            });
        }
        Ok(())
    }

    /// Path of the JSON database inside the state directory
    pub fn database_path(&self) -> String {
        format!("{}/bot_database.json", self.state_path)
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.trim().is_empty())
}
