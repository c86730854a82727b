//! Keeps matchup data for active leagues warm and prunes old rows.

use chrono::Duration;
use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};

use super::guard::TickGuard;
use crate::clock::SharedClock;
use crate::config::JobSchedule;
use crate::error::Result;
use crate::sleeper::SharedSportsApi;
use crate::store::SharedStore;

#[derive(Debug, Clone, Default, Serialize)]
pub struct RefreshReport {
    pub skipped: bool,
    pub week: u32,
    pub leagues: usize,
    pub refreshed: usize,
    pub failed: usize,
}

impl fmt::Display for RefreshReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.skipped {
            return write!(f, "skipped (previous refresh still running)");
        }
        write!(
            f,
            "week {}: {}/{} leagues refreshed, {} failed",
            self.week, self.refreshed, self.leagues, self.failed
        )
    }
}

/// Result of refreshing a single league
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LeagueRefresh {
    pub league_id: String,
    pub week: u32,
    pub matchups: usize,
}

pub struct CacheRefresher {
    api: SharedSportsApi,
    store: SharedStore,
    clock: SharedClock,
    sport: String,
    /// Pause between two leagues of a batch
    refresh_delay: std::time::Duration,
    retention: Duration,
    refresh_guard: TickGuard,
    cleanup_guard: TickGuard,
}

impl CacheRefresher {
    pub fn new(
        api: SharedSportsApi,
        store: SharedStore,
        clock: SharedClock,
        sport: &str,
        schedule: &JobSchedule,
    ) -> Self {
        Self {
            api,
            store,
            clock,
            sport: sport.to_string(),
            refresh_delay: schedule.refresh_delay,
            retention: schedule.cache_retention,
            refresh_guard: TickGuard::new(),
            cleanup_guard: TickGuard::new(),
        }
    }

    async fn current_week(&self) -> Result<u32> {
        Ok(self.api.get_state(&self.sport).await?.week)
    }

    /// Refresh the current week for every league with a linked user, one at a time
    pub async fn refresh_active_leagues(&self) -> Result<RefreshReport> {
        let Some(_token) = self.refresh_guard.try_begin() else {
            debug!("Cache refresh still running, skipping");
            return Ok(RefreshReport {
                skipped: true,
                ..Default::default()
            });
        };

        let state = self.api.get_state(&self.sport).await?;
        let leagues = self
            .store
            .list_active_leagues(&state.season, &self.sport)
            .await;

        let mut report = RefreshReport {
            week: state.week,
            leagues: leagues.len(),
            ..Default::default()
        };

        for (i, league) in leagues.iter().enumerate() {
            if i > 0 && !self.refresh_delay.is_zero() {
                tokio::time::sleep(self.refresh_delay).await;
            }
            match self.refresh_league(&league.league_id, Some(state.week)).await {
                Ok(_) => report.refreshed += 1,
                Err(e) => {
                    warn!(league_id = %league.league_id, week = state.week, "Matchup refresh failed: {}", e);
                    report.failed += 1;
                }
            }
        }

        if report.leagues > 0 {
            info!("Cache refresh: {}", report);
        }
        Ok(report)
    }

    /// Refresh one league; `week` defaults to the current upstream week
    pub async fn refresh_league(&self, league_id: &str, week: Option<u32>) -> Result<LeagueRefresh> {
        let week = match week {
            Some(week) => week,
            None => self.current_week().await?,
        };

        let payload = self.api.get_matchups(league_id, week).await?;
        let matchups = payload.len();
        self.store
            .put_cached_matchups(league_id, week, payload, self.clock.now())
            .await?;

        debug!(league_id, week, matchups, "Matchups cached");
        Ok(LeagueRefresh {
            league_id: league_id.to_string(),
            week,
            matchups,
        })
    }

    /// Delete cached matchups older than the retention window
    pub async fn clean_old_cache(&self) -> Result<usize> {
        let Some(_token) = self.cleanup_guard.try_begin() else {
            debug!("Cache cleanup still running, skipping");
            return Ok(0);
        };

        let cutoff = self.clock.now() - self.retention;
        let removed = self.store.delete_cache_older_than(cutoff).await?;
        let purged = self.api.purge_expired();
        info!(
            "Cache cleanup: {} matchup rows older than {} removed, {} expired upstream entries purged",
            removed,
            cutoff.format("%Y-%m-%d %H:%M"),
            purged
        );
        Ok(removed)
    }

    /// Cached matchups no older than `max_age`, refreshing them otherwise
    pub async fn matchups(
        &self,
        league_id: &str,
        week: u32,
        max_age: Duration,
    ) -> Result<Vec<serde_json::Value>> {
        if let Some(entry) = self.store.get_cached_matchups(league_id, week).await {
            if self.clock.now() - entry.fetched_at <= max_age {
                return Ok(entry.payload);
            }
        }
        self.refresh_league(league_id, Some(week)).await?;
        Ok(self
            .store
            .get_cached_matchups(league_id, week)
            .await
            .map(|entry| entry.payload)
            .unwrap_or_default())
    }
}
