use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::models::{
    AlertKind, AlertPreferences, League, LeagueMember, LeagueWithMembers, MatchupsCacheEntry,
    MembershipWithAlerts, User, UserLeague, UserWithLeagues,
};
use crate::error::{BotError, Result};

const SCHEMA_VERSION: u32 = 1;

/// Everything the bot persists, stored as one JSON document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotDatabase {
    /// Schema version for migrations
    pub version: u32,

    /// Last update timestamp
    pub last_updated: DateTime<Utc>,

    /// Chat user ID -> user
    #[serde(default)]
    pub users: BTreeMap<String, User>,

    /// Sleeper league ID -> league
    #[serde(default)]
    pub leagues: BTreeMap<String, League>,

    #[serde(default)]
    pub memberships: Vec<UserLeague>,

    #[serde(default)]
    pub alerts: Vec<AlertPreferences>,

    /// "{league_id}:{week}" -> cached matchups
    #[serde(default)]
    pub matchups_cache: BTreeMap<String, MatchupsCacheEntry>,
}

impl Default for BotDatabase {
    fn default() -> Self {
        Self {
            version: SCHEMA_VERSION,
            last_updated: Utc::now(),
            users: BTreeMap::new(),
            leagues: BTreeMap::new(),
            memberships: Vec::new(),
            alerts: Vec::new(),
            matchups_cache: BTreeMap::new(),
        }
    }
}

impl BotDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a JSON file, or create new if not exists
    pub async fn load(path: &str) -> Result<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => {
                let db: Self =
                    serde_json::from_str(&content).map_err(|e| BotError::StateParse {
                        path: path.to_string(),
                        source: e,
                    })?;
                if db.version > SCHEMA_VERSION {
                    return Err(BotError::StateVersion {
                        path: path.to_string(),
                        found: db.version,
                        supported: SCHEMA_VERSION,
                    });
                }
                Ok(db)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::new()),
            Err(e) => Err(BotError::StateLoad {
                path: path.to_string(),
                source: e,
            }),
        }
    }

    /// Save to a JSON file atomically
    pub async fn save(&self, path: &str) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;

        // Write to temp file first, then rename for atomicity
        let temp_path = format!("{}.tmp", path);
        tokio::fs::write(&temp_path, &content)
            .await
            .map_err(|e| BotError::StateSave {
                path: path.to_string(),
                source: e,
            })?;

        tokio::fs::rename(&temp_path, path)
            .await
            .map_err(|e| BotError::StateSave {
                path: path.to_string(),
                source: e,
            })?;

        Ok(())
    }

    fn touch(&mut self) {
        self.last_updated = Utc::now();
    }

    pub fn upsert_user(&mut self, user: User) {
        self.users.insert(user.id.clone(), user);
        self.touch();
    }

    pub fn user_mut(&mut self, user_id: &str) -> Result<&mut User> {
        self.users
            .get_mut(user_id)
            .ok_or_else(|| BotError::UserNotFound {
                user_id: user_id.to_string(),
            })
    }

    /// Link a user to a league with default alerts.
    ///
    /// Re-linking updates the roster and league metadata but keeps the
    /// user's existing alert switches.
    pub fn link_league(&mut self, user_id: &str, league: League, roster_id: u32) -> Result<()> {
        if !self.users.contains_key(user_id) {
            return Err(BotError::UserNotFound {
                user_id: user_id.to_string(),
            });
        }
        let league_id = league.league_id.clone();
        self.leagues.insert(league_id.clone(), league);

        match self
            .memberships
            .iter_mut()
            .find(|m| m.user_id == user_id && m.league_id == league_id)
        {
            Some(existing) => existing.roster_id = roster_id,
            None => self.memberships.push(UserLeague {
                user_id: user_id.to_string(),
                league_id: league_id.clone(),
                roster_id,
            }),
        }

        if self.alerts_for(user_id, &league_id).is_none() {
            self.alerts.push(AlertPreferences::new(user_id, &league_id));
        }

        self.touch();
        Ok(())
    }

    /// Remove a user's league; returns false if the user was not in it
    pub fn remove_league(&mut self, user_id: &str, league_id: &str) -> bool {
        let before = self.memberships.len();
        self.memberships
            .retain(|m| !(m.user_id == user_id && m.league_id == league_id));
        self.alerts
            .retain(|a| !(a.user_id == user_id && a.league_id == league_id));
        let removed = self.memberships.len() < before;
        if removed {
            self.touch();
        }
        removed
    }

    pub fn set_alert(
        &mut self,
        user_id: &str,
        league_id: &str,
        kind: AlertKind,
        enabled: bool,
    ) -> Result<()> {
        let alerts = self
            .alerts
            .iter_mut()
            .find(|a| a.user_id == user_id && a.league_id == league_id)
            .ok_or_else(|| BotError::LeagueNotFound {
                league_id: league_id.to_string(),
            })?;
        alerts.set(kind, enabled);
        self.touch();
        Ok(())
    }

    pub fn alerts_for(&self, user_id: &str, league_id: &str) -> Option<&AlertPreferences> {
        self.alerts
            .iter()
            .find(|a| a.user_id == user_id && a.league_id == league_id)
    }

    /// Leagues with at least one member, members in user order
    pub fn leagues_with_members(&self) -> Vec<LeagueWithMembers> {
        self.leagues
            .values()
            .filter_map(|league| {
                let members: Vec<LeagueMember> = self
                    .memberships
                    .iter()
                    .filter(|m| m.league_id == league.league_id)
                    .filter_map(|m| {
                        self.users.get(&m.user_id).map(|user| LeagueMember {
                            user: user.clone(),
                            membership: m.clone(),
                        })
                    })
                    .collect();
                if members.is_empty() {
                    None
                } else {
                    Some(LeagueWithMembers {
                        league: league.clone(),
                        members,
                    })
                }
            })
            .collect()
    }

    pub fn users_with_leagues(&self) -> Vec<UserWithLeagues> {
        self.users
            .values()
            .map(|user| {
                let leagues = self
                    .memberships
                    .iter()
                    .filter(|m| m.user_id == user.id)
                    .filter_map(|m| {
                        let league = self.leagues.get(&m.league_id)?;
                        let alerts = self
                            .alerts_for(&user.id, &m.league_id)
                            .cloned()
                            .unwrap_or_else(|| AlertPreferences::new(&user.id, &m.league_id));
                        Some(MembershipWithAlerts {
                            league: league.clone(),
                            membership: m.clone(),
                            alerts,
                        })
                    })
                    .collect();
                UserWithLeagues {
                    user: user.clone(),
                    leagues,
                }
            })
            .collect()
    }

    /// Chat user linked to the given Sleeper account
    pub fn find_provider_link(&self, sleeper_user_id: &str) -> Option<&User> {
        self.users
            .values()
            .find(|u| u.sleeper_user_id.as_deref() == Some(sleeper_user_id))
    }

    /// Leagues of the given season and sport with at least one linked user
    pub fn active_leagues(&self, season: &str, sport: &str) -> Vec<League> {
        self.leagues
            .values()
            .filter(|l| l.season == season && l.sport.eq_ignore_ascii_case(sport))
            .filter(|l| self.memberships.iter().any(|m| m.league_id == l.league_id))
            .cloned()
            .collect()
    }

    pub fn cached_matchups(&self, league_id: &str, week: u32) -> Option<&MatchupsCacheEntry> {
        self.matchups_cache.get(&cache_key(league_id, week))
    }

    pub fn put_matchups(&mut self, entry: MatchupsCacheEntry) {
        self.matchups_cache
            .insert(cache_key(&entry.league_id, entry.week), entry);
        self.touch();
    }

    /// Delete cache rows fetched strictly before `cutoff`
    pub fn delete_cache_older_than(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.matchups_cache.len();
        self.matchups_cache.retain(|_, entry| entry.fetched_at >= cutoff);
        let removed = before - self.matchups_cache.len();
        if removed > 0 {
            self.touch();
        }
        removed
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn league_count(&self) -> usize {
        self.leagues.len()
    }
}

fn cache_key(league_id: &str, week: u32) -> String {
    format!("{}:{}", league_id, week)
}
