//! Persistent users, leagues, alert switches and the matchup cache

pub mod database;
pub mod models;

pub use database::BotDatabase;
pub use models::{
    AlertKind, League, LeagueWithMembers, MatchupsCacheEntry, Platform, User, UserWithLeagues,
};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

use crate::error::{BotError, Result};

/// Async access to the database, persisting after every mutation
pub struct Store {
    db: RwLock<BotDatabase>,
    /// None keeps everything in memory
    path: Option<String>,
}

impl Store {
    /// Open the JSON database at `path`, starting empty if it does not exist
    pub async fn open(path: &str) -> Result<Self> {
        let db = BotDatabase::load(path).await?;
        debug!(
            "Loaded database from {}: {} users, {} leagues",
            path,
            db.user_count(),
            db.league_count()
        );
        Ok(Self {
            db: RwLock::new(db),
            path: Some(path.to_string()),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            db: RwLock::new(BotDatabase::new()),
            path: None,
        }
    }

    async fn read(&self) -> RwLockReadGuard<'_, BotDatabase> {
        self.db.read().await
    }

    /// Apply a mutation and persist it while still holding the write lock,
    /// so multi-row updates are saved as one unit. The change is applied to a
    /// copy and only becomes visible once it is on disk.
    async fn mutate<T>(&self, f: impl FnOnce(&mut BotDatabase) -> Result<T>) -> Result<T> {
        let mut db: RwLockWriteGuard<'_, BotDatabase> = self.db.write().await;
        let Some(path) = &self.path else {
            return f(&mut *db);
        };
        let mut next = db.clone();
        let value = f(&mut next)?;
        next.save(path).await?;
        *db = next;
        Ok(value)
    }

    pub async fn save(&self) -> Result<()> {
        match &self.path {
            Some(path) => self.read().await.save(path).await,
            None => Ok(()),
        }
    }

    pub async fn upsert_user(&self, user: User) -> Result<()> {
        self.mutate(|db| {
            db.upsert_user(user);
            Ok(())
        })
        .await
    }

    pub async fn get_user(&self, user_id: &str) -> Option<User> {
        self.read().await.users.get(user_id).cloned()
    }

    pub async fn set_timezone(&self, user_id: &str, timezone: &str) -> Result<()> {
        let tz: Tz = timezone.trim().parse().map_err(|_| BotError::InvalidTimezone {
            timezone: timezone.to_string(),
        })?;
        self.mutate(|db| {
            db.user_mut(user_id)?.timezone = tz.name().to_string();
            Ok(())
        })
        .await
    }

    pub async fn set_language(&self, user_id: &str, language: &str) -> Result<()> {
        self.mutate(|db| {
            db.user_mut(user_id)?.language = language.trim().to_lowercase();
            Ok(())
        })
        .await
    }

    pub async fn link_sleeper_account(&self, user_id: &str, sleeper_user_id: &str) -> Result<()> {
        self.mutate(|db| {
            db.user_mut(user_id)?.sleeper_user_id = Some(sleeper_user_id.to_string());
            Ok(())
        })
        .await
    }

    /// Link a user to a league; membership and default alerts are written together
    pub async fn link_league(&self, user_id: &str, league: League, roster_id: u32) -> Result<()> {
        self.mutate(|db| db.link_league(user_id, league, roster_id))
            .await
    }

    pub async fn remove_league(&self, user_id: &str, league_id: &str) -> Result<bool> {
        self.mutate(|db| Ok(db.remove_league(user_id, league_id)))
            .await
    }

    pub async fn set_alert(
        &self,
        user_id: &str,
        league_id: &str,
        kind: AlertKind,
        enabled: bool,
    ) -> Result<()> {
        self.mutate(|db| db.set_alert(user_id, league_id, kind, enabled))
            .await
    }

    pub async fn list_leagues_with_members(&self) -> Vec<LeagueWithMembers> {
        self.read().await.leagues_with_members()
    }

    pub async fn list_users_with_leagues_and_alerts(&self) -> Vec<UserWithLeagues> {
        self.read().await.users_with_leagues()
    }

    /// Chat user ID linked to a Sleeper account
    pub async fn find_provider_link(&self, sleeper_user_id: &str) -> Option<String> {
        self.read()
            .await
            .find_provider_link(sleeper_user_id)
            .map(|u| u.id.clone())
    }

    pub async fn list_active_leagues(&self, season: &str, sport: &str) -> Vec<League> {
        self.read().await.active_leagues(season, sport)
    }

    #[cfg(test)]
    pub async fn get_league(&self, league_id: &str) -> Option<League> {
        self.read().await.leagues.get(league_id).cloned()
    }

    pub async fn get_cached_matchups(&self, league_id: &str, week: u32) -> Option<MatchupsCacheEntry> {
        self.read().await.cached_matchups(league_id, week).cloned()
    }

    pub async fn put_cached_matchups(
        &self,
        league_id: &str,
        week: u32,
        payload: Vec<serde_json::Value>,
        fetched_at: DateTime<Utc>,
    ) -> Result<()> {
        self.mutate(|db| {
            db.put_matchups(MatchupsCacheEntry {
                league_id: league_id.to_string(),
                week,
                payload,
                fetched_at,
            });
            Ok(())
        })
        .await
    }

    pub async fn delete_cache_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let removed = self
            .mutate(|db| Ok(db.delete_cache_older_than(cutoff)))
            .await?;
        if removed > 0 {
            debug!("Deleted {} cached matchup rows older than {}", removed, cutoff);
        }
        Ok(removed)
    }

    pub async fn user_count(&self) -> usize {
        self.read().await.user_count()
    }

    pub async fn league_count(&self) -> usize {
        self.read().await.league_count()
    }
}

/// Shared store type
pub type SharedStore = Arc<Store>;

/// Open the shared store. A missing file starts empty; a file that cannot be
/// read or parsed is an error and is left untouched on disk.
pub async fn create_shared_store(path: &str) -> Result<SharedStore> {
    Ok(Arc::new(Store::open(path).await?))
}
