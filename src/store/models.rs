use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Chat platform a user talks to the bot on
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Telegram,
    Discord,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Telegram => write!(f, "telegram"),
            Platform::Discord => write!(f, "discord"),
        }
    }
}

/// A chat user of the bot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    /// Platform chat ID (Telegram chat ID or Discord user snowflake)
    pub id: String,

    pub display_name: String,

    /// Language code for templated messages
    #[serde(default = "default_language")]
    pub language: String,

    /// IANA timezone name
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Explicit platform tag; ID-shape detection is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,

    /// Linked Sleeper account
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sleeper_user_id: Option<String>,

    pub created_at: DateTime<Utc>,
}

fn default_language() -> String {
    "en".to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl User {
    pub fn new(id: &str, display_name: &str, platform: Option<Platform>) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            language: default_language(),
            timezone: default_timezone(),
            platform,
            sleeper_user_id: None,
            created_at: Utc::now(),
        }
    }

    /// Parsed timezone, falling back to UTC for unparseable stored values
    pub fn tz(&self) -> Tz {
        self.timezone.parse().unwrap_or(Tz::UTC)
    }
}

/// An upstream league, shared by every user in it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct League {
    /// Sleeper league ID
    pub league_id: String,
    pub name: String,
    pub season: String,
    #[serde(default = "default_sport")]
    pub sport: String,
}

fn default_sport() -> String {
    "nfl".to_string()
}

/// A user's team in a league
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserLeague {
    pub user_id: String,
    pub league_id: String,
    pub roster_id: u32,
}

/// Per user and league alert switches
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertPreferences {
    pub user_id: String,
    pub league_id: String,
    pub pregame: bool,
    pub scoring: bool,
    pub waivers: bool,
}

impl AlertPreferences {
    /// Everything enabled
    pub fn new(user_id: &str, league_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            league_id: league_id.to_string(),
            pregame: true,
            scoring: true,
            waivers: true,
        }
    }

    pub fn set(&mut self, kind: AlertKind, enabled: bool) {
        match kind {
            AlertKind::Pregame => self.pregame = enabled,
            AlertKind::Scoring => self.scoring = enabled,
            AlertKind::Waivers => self.waivers = enabled,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Pregame,
    Scoring,
    Waivers,
}

/// Cached matchup payload for one league and week
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchupsCacheEntry {
    pub league_id: String,
    pub week: u32,
    pub payload: Vec<serde_json::Value>,
    pub fetched_at: DateTime<Utc>,
}

/// A league member as seen by the draft job
#[derive(Debug, Clone)]
pub struct LeagueMember {
    pub user: User,
    pub membership: UserLeague,
}

#[derive(Debug, Clone)]
pub struct LeagueWithMembers {
    pub league: League,
    pub members: Vec<LeagueMember>,
}

/// One of a user's leagues together with its alert switches
#[derive(Debug, Clone)]
pub struct MembershipWithAlerts {
    pub league: League,
    pub membership: UserLeague,
    pub alerts: AlertPreferences,
}

#[derive(Debug, Clone)]
pub struct UserWithLeagues {
    pub user: User,
    pub leagues: Vec<MembershipWithAlerts>,
}
