//! Upstream fantasy-sports data (Sleeper API)

pub mod cache;
pub mod client;
pub mod types;

pub use client::SleeperClient;
pub use types::{Draft, DraftPick, DraftStatus, Game, PickPosition, PlayerMap, Roster, SportState};

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;

/// Reads the engines need from the upstream API.
///
/// Implementations are expected to cache; callers tolerate data that is
/// stale by up to the resource TTL.
#[async_trait]
pub trait SportsApi: Send + Sync {
    async fn get_state(&self, sport: &str) -> Result<SportState>;

    async fn get_drafts(&self, league_id: &str) -> Result<Vec<Draft>>;

    /// Picks made so far, in pick order
    async fn get_draft_picks(&self, draft_id: &str) -> Result<Vec<DraftPick>>;

    async fn get_rosters(&self, league_id: &str) -> Result<Vec<Roster>>;

    async fn get_players(&self, sport: &str) -> Result<Arc<PlayerMap>>;

    /// Games of the given week of the current NFL season
    async fn get_nfl_schedule(&self, week: u32) -> Result<Vec<Game>>;

    /// Raw matchup records, stored opaquely by the cache refresh job
    async fn get_matchups(&self, league_id: &str, week: u32) -> Result<Vec<serde_json::Value>>;

    /// Drop expired cache entries; returns how many were removed
    fn purge_expired(&self) -> usize {
        0
    }
}

pub type SharedSportsApi = Arc<dyn SportsApi>;
