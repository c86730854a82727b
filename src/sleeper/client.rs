//! HTTP client for the Sleeper API with per-resource TTL caching

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, warn};

use super::cache::TtlCache;
use super::types::{Draft, DraftPick, Game, PlayerMap, Roster, SportState};
use super::SportsApi;
use crate::clock::SharedClock;
use crate::config::{BotConfig, CacheTtls, RetryPolicy};
use crate::error::{BotError, Result};

pub struct SleeperClient {
    http: reqwest::Client,
    base_url: String,
    schedule_url: String,
    schedule_sport: String,
    retry: RetryPolicy,
    state: TtlCache<SportState>,
    drafts: TtlCache<Vec<Draft>>,
    picks: TtlCache<Vec<DraftPick>>,
    rosters: TtlCache<Vec<Roster>>,
    players: TtlCache<Arc<PlayerMap>>,
    schedule: TtlCache<Arc<Vec<Game>>>,
    matchups: TtlCache<Vec<serde_json::Value>>,
}

impl SleeperClient {
    pub fn new(
        base_url: &str,
        schedule_url: &str,
        ttls: &CacheTtls,
        retry: RetryPolicy,
        clock: SharedClock,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .user_agent(concat!("gridiron-bot/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BotError::ConfigValidation {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            schedule_url: schedule_url.to_string(),
            schedule_sport: "nfl".to_string(),
            retry,
            state: TtlCache::new(ttls.state, clock.clone()),
            drafts: TtlCache::new(ttls.drafts, clock.clone()),
            picks: TtlCache::new(ttls.picks, clock.clone()),
            rosters: TtlCache::new(ttls.rosters, clock.clone()),
            players: TtlCache::new(ttls.players, clock.clone()),
            schedule: TtlCache::new(ttls.schedule, clock.clone()),
            matchups: TtlCache::new(ttls.matchups, clock),
        })
    }

    pub fn from_config(config: &BotConfig, clock: SharedClock) -> Result<Self> {
        Self::new(
            &config.sleeper_base_url,
            &config.schedule_url,
            &config.cache_ttls,
            config.retry.clone(),
            clock,
        )
    }

    /// GET with retry on transient failures
    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.get_json_once(url).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        url,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Upstream request failed, retrying: {}",
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn get_json_once<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        debug!(url, "GET");
        let response = self.http.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(BotError::UpstreamStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| BotError::UpstreamDecode {
                url: url.to_string(),
                message: e.to_string(),
            })
    }

    async fn season_schedule(&self, season: &str) -> Result<Arc<Vec<Game>>> {
        let key = format!("{}:{}", self.schedule_sport, season);
        if let Some(games) = self.schedule.get(&key) {
            return Ok(games);
        }
        let url = self.schedule_url.replace("{season}", season);
        let records: Option<Vec<serde_json::Value>> = self.get_json(&url).await?;
        let (games, skipped) = Game::parse_schedule(records.unwrap_or_default());
        if skipped > 0 {
            warn!(url, skipped, "Skipped schedule records without teams or a date");
        }
        let games = Arc::new(games);
        self.schedule.insert(key, games.clone());
        Ok(games)
    }
}

#[async_trait]
impl SportsApi for SleeperClient {
    async fn get_state(&self, sport: &str) -> Result<SportState> {
        if let Some(state) = self.state.get(sport) {
            return Ok(state);
        }
        let url = format!("{}/state/{}", self.base_url, sport);
        let state: SportState = self.get_json(&url).await?;
        self.state.insert(sport, state.clone());
        Ok(state)
    }

    async fn get_drafts(&self, league_id: &str) -> Result<Vec<Draft>> {
        if let Some(drafts) = self.drafts.get(league_id) {
            return Ok(drafts);
        }
        let url = format!("{}/league/{}/drafts", self.base_url, league_id);
        let drafts: Option<Vec<Draft>> = self.get_json(&url).await?;
        let drafts = drafts.unwrap_or_default();
        self.drafts.insert(league_id, drafts.clone());
        Ok(drafts)
    }

    async fn get_draft_picks(&self, draft_id: &str) -> Result<Vec<DraftPick>> {
        if let Some(picks) = self.picks.get(draft_id) {
            return Ok(picks);
        }
        let url = format!("{}/draft/{}/picks", self.base_url, draft_id);
        let picks: Option<Vec<DraftPick>> = self.get_json(&url).await?;
        let picks = picks.unwrap_or_default();
        self.picks.insert(draft_id, picks.clone());
        Ok(picks)
    }

    async fn get_rosters(&self, league_id: &str) -> Result<Vec<Roster>> {
        if let Some(rosters) = self.rosters.get(league_id) {
            return Ok(rosters);
        }
        let url = format!("{}/league/{}/rosters", self.base_url, league_id);
        let rosters: Option<Vec<Roster>> = self.get_json(&url).await?;
        let rosters = rosters.unwrap_or_default();
        self.rosters.insert(league_id, rosters.clone());
        Ok(rosters)
    }

    async fn get_players(&self, sport: &str) -> Result<Arc<PlayerMap>> {
        if let Some(players) = self.players.get(sport) {
            return Ok(players);
        }
        let url = format!("{}/players/{}", self.base_url, sport);
        let players: PlayerMap = self.get_json(&url).await?;
        let players = Arc::new(players);
        self.players.insert(sport, players.clone());
        Ok(players)
    }

    async fn get_nfl_schedule(&self, week: u32) -> Result<Vec<Game>> {
        let state = self.get_state(&self.schedule_sport).await?;
        let games = self.season_schedule(&state.season).await?;
        Ok(games.iter().filter(|g| g.week == week).cloned().collect())
    }

    async fn get_matchups(&self, league_id: &str, week: u32) -> Result<Vec<serde_json::Value>> {
        let key = format!("{}:{}", league_id, week);
        if let Some(matchups) = self.matchups.get(&key) {
            return Ok(matchups);
        }
        let url = format!("{}/league/{}/matchups/{}", self.base_url, league_id, week);
        let matchups: Option<Vec<serde_json::Value>> = self.get_json(&url).await?;
        let matchups = matchups.unwrap_or_default();
        self.matchups.insert(key, matchups.clone());
        Ok(matchups)
    }

    fn purge_expired(&self) -> usize {
        self.state.purge_expired()
            + self.drafts.purge_expired()
            + self.picks.purge_expired()
            + self.rosters.purge_expired()
            + self.players.purge_expired()
            + self.schedule.purge_expired()
            + self.matchups.purge_expired()
    }
}
