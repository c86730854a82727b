//! Test doubles for the upstream API and the chat platforms

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::clock::ManualClock;
use crate::config::JobSchedule;
use crate::error::{BotError, Result};
use crate::jobs::{CacheRefresher, DraftNotifier, IntelligentNotifier, JobManager, JobRunner};
use crate::messenger::{ChatAdapter, Messenger, SendOptions};
use crate::sleeper::{Draft, DraftPick, Game, PlayerMap, Roster, SportState, SportsApi};
use crate::store::{Platform, SharedStore};

/// Scripted upstream with per-call counters
pub struct MockSportsApi {
    state: Mutex<SportState>,
    drafts: Mutex<HashMap<String, Vec<Draft>>>,
    picks: Mutex<HashMap<String, Vec<DraftPick>>>,
    rosters: Mutex<HashMap<String, Vec<Roster>>>,
    players: Mutex<Arc<PlayerMap>>,
    schedule: Mutex<HashMap<u32, Vec<Game>>>,
    matchups: Mutex<HashMap<String, Vec<serde_json::Value>>>,
    failing: Mutex<HashSet<String>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl MockSportsApi {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SportState {
                week: 1,
                season: "2025".to_string(),
                season_start_date: None,
            }),
            drafts: Mutex::new(HashMap::new()),
            picks: Mutex::new(HashMap::new()),
            rosters: Mutex::new(HashMap::new()),
            players: Mutex::new(Arc::new(PlayerMap::new())),
            schedule: Mutex::new(HashMap::new()),
            matchups: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            calls: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_state(&self, state: SportState) {
        *self.state.lock() = state;
    }

    pub fn set_drafts(&self, league_id: &str, drafts: Vec<Draft>) {
        self.drafts.lock().insert(league_id.to_string(), drafts);
    }

    /// Record `count` picks as made in the draft
    pub fn set_pick_count(&self, draft_id: &str, count: u32) {
        let picks = (1..=count)
            .map(|n| DraftPick {
                pick_no: n,
                round: 0,
                draft_slot: 0,
                picked_by: None,
                player_id: Some(format!("p{}", n)),
            })
            .collect();
        self.picks.lock().insert(draft_id.to_string(), picks);
    }

    pub fn set_rosters(&self, league_id: &str, rosters: Vec<Roster>) {
        self.rosters.lock().insert(league_id.to_string(), rosters);
    }

    pub fn set_players(&self, players: PlayerMap) {
        *self.players.lock() = Arc::new(players);
    }

    pub fn set_schedule(&self, week: u32, games: Vec<Game>) {
        self.schedule.lock().insert(week, games);
    }

    pub fn set_matchups(&self, league_id: &str, week: u32, matchups: Vec<serde_json::Value>) {
        self.matchups
            .lock()
            .insert(format!("{}:{}", league_id, week), matchups);
    }

    /// Make every call naming this league or draft fail
    pub fn fail_on(&self, id: &str) {
        self.failing.lock().insert(id.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing.lock().clear();
    }

    /// Number of calls to `method` (e.g. "get_drafts") or `method:id`
    pub fn calls(&self, key: &str) -> usize {
        self.calls.lock().get(key).copied().unwrap_or(0)
    }

    fn record(&self, method: &str, id: &str) -> Result<()> {
        let mut calls = self.calls.lock();
        *calls.entry(method.to_string()).or_default() += 1;
        *calls.entry(format!("{}:{}", method, id)).or_default() += 1;
        drop(calls);

        if self.failing.lock().contains(id) {
            return Err(BotError::UpstreamStatus {
                url: format!("mock://{}/{}", method, id),
                status: 500,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SportsApi for MockSportsApi {
    async fn get_state(&self, sport: &str) -> Result<SportState> {
        self.record("get_state", sport)?;
        Ok(self.state.lock().clone())
    }

    async fn get_drafts(&self, league_id: &str) -> Result<Vec<Draft>> {
        self.record("get_drafts", league_id)?;
        Ok(self.drafts.lock().get(league_id).cloned().unwrap_or_default())
    }

    async fn get_draft_picks(&self, draft_id: &str) -> Result<Vec<DraftPick>> {
        self.record("get_draft_picks", draft_id)?;
        Ok(self.picks.lock().get(draft_id).cloned().unwrap_or_default())
    }

    async fn get_rosters(&self, league_id: &str) -> Result<Vec<Roster>> {
        self.record("get_rosters", league_id)?;
        Ok(self.rosters.lock().get(league_id).cloned().unwrap_or_default())
    }

    async fn get_players(&self, sport: &str) -> Result<Arc<PlayerMap>> {
        self.record("get_players", sport)?;
        Ok(self.players.lock().clone())
    }

    async fn get_nfl_schedule(&self, week: u32) -> Result<Vec<Game>> {
        self.record("get_nfl_schedule", &week.to_string())?;
        Ok(self.schedule.lock().get(&week).cloned().unwrap_or_default())
    }

    async fn get_matchups(&self, league_id: &str, week: u32) -> Result<Vec<serde_json::Value>> {
        self.record("get_matchups", league_id)?;
        Ok(self
            .matchups
            .lock()
            .get(&format!("{}:{}", league_id, week))
            .cloned()
            .unwrap_or_default())
    }
}

/// Chat adapter that keeps every message instead of sending it
pub struct RecordingAdapter {
    platform: Platform,
    sent: Mutex<Vec<(String, String)>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingAdapter {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            sent: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
        }
    }

    /// (chat_id, text) pairs in send order
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().clone()
    }

    pub fn sent_to(&self, chat_id: &str) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter(|(id, _)| id == chat_id)
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub fn fail_for(&self, chat_id: &str) {
        self.failing.lock().insert(chat_id.to_string());
    }

    pub fn recover(&self, chat_id: &str) {
        self.failing.lock().remove(chat_id);
    }
}

#[async_trait]
impl ChatAdapter for RecordingAdapter {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn send(&self, chat_id: &str, text: &str, _options: &SendOptions) -> Result<()> {
        if self.failing.lock().contains(chat_id) {
            return Err(BotError::Telegram {
                message: format!("recording adapter refused {}", chat_id),
            });
        }
        self.sent
            .lock()
            .push((chat_id.to_string(), text.to_string()));
        Ok(())
    }
}

/// Job manager over the mock upstream, a Telegram recorder and a fixed clock
/// (2025-09-07 12:30 UTC), with no delay between refreshed leagues
pub fn job_manager(api: Arc<MockSportsApi>, store: SharedStore) -> JobManager {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 9, 7, 12, 30, 0).unwrap(),
    ));
    let adapter = Arc::new(RecordingAdapter::new(Platform::Telegram));
    let messenger = Arc::new(Messenger::new(store.clone()).with_adapter(adapter));
    let schedule = JobSchedule {
        refresh_delay: std::time::Duration::ZERO,
        ..Default::default()
    };

    let runner = JobRunner::new(
        DraftNotifier::new(api.clone(), store.clone(), messenger.clone(), clock.clone()),
        IntelligentNotifier::new(api.clone(), store.clone(), messenger, clock.clone(), "nfl"),
        CacheRefresher::new(api, store, clock.clone(), "nfl", &schedule),
        clock,
    );
    JobManager::new(runner, schedule)
}
