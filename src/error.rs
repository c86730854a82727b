use thiserror::Error;

#[derive(Error, Debug)]
pub enum BotError {
    // Configuration errors
    #[error("Invalid config: {message}")]
    ConfigValidation { message: String },

    // State errors
    #[error("Failed to parse state file '{path}': {source}")]
    StateParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("State file '{path}' has schema version {found}, this build supports up to {supported}")]
    StateVersion {
        path: String,
        found: u32,
        supported: u32,
    },

    #[error("Failed to save state to '{path}': {source}")]
    StateSave {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to load state from '{path}': {source}")]
    StateLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    // Upstream errors
    #[error("Upstream request to '{url}' failed: {message}")]
    Upstream { url: String, message: String },

    #[error("Upstream returned HTTP {status} for '{url}'")]
    UpstreamStatus { url: String, status: u16 },

    #[error("Failed to decode upstream response from '{url}': {message}")]
    UpstreamDecode { url: String, message: String },

    // Chat platform errors
    #[error("Telegram API error: {message}")]
    Telegram { message: String },

    #[error("Discord API error: {message}")]
    Discord { message: String },

    // Store errors
    #[error("User not found: {user_id}")]
    UserNotFound { user_id: String },

    #[error("League not found: {league_id}")]
    LeagueNotFound { league_id: String },

    #[error("Unknown timezone: {timezone}")]
    InvalidTimezone { timezone: String },

    // Generic errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl BotError {
    /// Whether a retry of the same upstream call could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            BotError::Upstream { .. } => true,
            BotError::UpstreamStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<serenity::Error> for BotError {
    fn from(err: serenity::Error) -> Self {
        BotError::Discord {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for BotError {
    fn from(err: std::io::Error) -> Self {
        BotError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for BotError {
    fn from(err: serde_json::Error) -> Self {
        BotError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for BotError {
    fn from(err: reqwest::Error) -> Self {
        let url = err
            .url()
            .map(|u| u.to_string())
            .unwrap_or_else(|| "<unknown>".to_string());
        match err.status() {
            Some(status) => BotError::UpstreamStatus {
                url,
                status: status.as_u16(),
            },
            None if err.is_decode() => BotError::UpstreamDecode {
                url,
                message: err.to_string(),
            },
            None => BotError::Upstream {
                url,
                message: err.to_string(),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, BotError>;
