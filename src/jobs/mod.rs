//! Background jobs: the notification engines, the cache refresher and the
//! manager that drives them on timers.

pub mod cache_refresh;
pub mod draft;
pub mod guard;
pub mod intelligent;

pub use cache_refresh::{CacheRefresher, LeagueRefresh, RefreshReport};
pub use draft::{DraftNotifier, DraftTickReport};
pub use intelligent::{IntelligentNotifier, IntelligentTickReport};

use chrono::{DateTime, Timelike, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::clock::SharedClock;
use crate::config::JobSchedule;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Draft start and turn notices
    Draft,
    /// Hourly recurring notifications
    Intelligent,
    /// Matchup cache refresh for active leagues
    Refresh,
    /// Cache retention sweep
    Cleanup,
}

impl JobKind {
    pub const ALL: [JobKind; 4] = [
        JobKind::Draft,
        JobKind::Intelligent,
        JobKind::Refresh,
        JobKind::Cleanup,
    ];
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Draft => write!(f, "draft"),
            JobKind::Intelligent => write!(f, "intelligent"),
            JobKind::Refresh => write!(f, "refresh"),
            JobKind::Cleanup => write!(f, "cleanup"),
        }
    }
}

/// What a single job run produced
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "job", rename_all = "snake_case")]
pub enum JobOutcome {
    Draft(DraftTickReport),
    Intelligent(IntelligentTickReport),
    Refresh(RefreshReport),
    Cleanup { removed: usize },
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobOutcome::Draft(report) => write!(f, "{}", report),
            JobOutcome::Intelligent(report) => write!(f, "{}", report),
            JobOutcome::Refresh(report) => write!(f, "{}", report),
            JobOutcome::Cleanup { removed } => write!(f, "{} cached rows removed", removed),
        }
    }
}

/// Bookkeeping for one job, shown on the status endpoint
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobRun {
    pub runs: u64,
    pub failures: u64,
    pub last_started: Option<DateTime<Utc>>,
    pub last_duration_ms: Option<u64>,
    pub last_outcome: Option<String>,
    pub last_error: Option<String>,
}

/// The engines, plus per-job run statistics
pub struct JobRunner {
    draft: DraftNotifier,
    intelligent: IntelligentNotifier,
    refresher: CacheRefresher,
    clock: SharedClock,
    runs: DashMap<JobKind, JobRun>,
}

impl JobRunner {
    pub fn new(
        draft: DraftNotifier,
        intelligent: IntelligentNotifier,
        refresher: CacheRefresher,
        clock: SharedClock,
    ) -> Self {
        Self {
            draft,
            intelligent,
            refresher,
            clock,
            runs: DashMap::new(),
        }
    }

    pub fn refresher(&self) -> &CacheRefresher {
        &self.refresher
    }

    /// Run one tick of a job and record how it went
    pub async fn run(&self, kind: JobKind) -> Result<JobOutcome> {
        let started_at = self.clock.now();
        let started = Instant::now();

        let result = match kind {
            JobKind::Draft => Ok(JobOutcome::Draft(self.draft.process_tick().await)),
            JobKind::Intelligent => Ok(JobOutcome::Intelligent(self.intelligent.process_tick().await)),
            JobKind::Refresh => self
                .refresher
                .refresh_active_leagues()
                .await
                .map(JobOutcome::Refresh),
            JobKind::Cleanup => self
                .refresher
                .clean_old_cache()
                .await
                .map(|removed| JobOutcome::Cleanup { removed }),
        };

        let mut run = self.runs.entry(kind).or_default();
        run.runs += 1;
        run.last_started = Some(started_at);
        run.last_duration_ms = Some(started.elapsed().as_millis() as u64);
        match &result {
            Ok(outcome) => {
                run.last_outcome = Some(outcome.to_string());
                run.last_error = None;
            }
            Err(e) => {
                run.failures += 1;
                run.last_error = Some(e.to_string());
            }
        }
        result
    }

    pub fn stats(&self) -> BTreeMap<String, JobRun> {
        JobKind::ALL
            .iter()
            .map(|kind| {
                let run = self.runs.get(kind).map(|r| r.clone()).unwrap_or_default();
                (kind.to_string(), run)
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub running: bool,
    pub tracked_drafts: usize,
    pub jobs: BTreeMap<String, JobRun>,
}

/// Time until the next top of the UTC hour (zero when exactly on it)
pub fn until_next_hour(now: DateTime<Utc>) -> Duration {
    let into_hour = u64::from(now.minute() * 60 + now.second());
    Duration::from_secs((3600 - into_hour) % 3600)
}

/// Owns the four job timers
pub struct JobManager {
    runner: Arc<JobRunner>,
    schedule: JobSchedule,
    shutdown: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    running: AtomicBool,
}

impl JobManager {
    pub fn new(runner: JobRunner, schedule: JobSchedule) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            runner: Arc::new(runner),
            schedule,
            shutdown,
            handles: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Spawn the timers. Calling it again while running does nothing.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::AcqRel) {
            warn!("Jobs already running");
            return;
        }
        self.shutdown.send_replace(false);

        let now = Instant::now();
        let aligned = now + until_next_hour(self.runner.clock.now());
        let schedule = &self.schedule;
        let timers = [
            (JobKind::Draft, schedule.draft_interval, now),
            (JobKind::Intelligent, schedule.intelligent_interval, aligned),
            (JobKind::Refresh, schedule.refresh_interval, now),
            (JobKind::Cleanup, schedule.cleanup_interval, now + schedule.cleanup_interval),
        ];

        let mut handles = self.handles.lock();
        for (kind, period, first_tick) in timers {
            info!(
                "Scheduling {} job every {}s (first run in {}s)",
                kind,
                period.as_secs(),
                first_tick.saturating_duration_since(now).as_secs()
            );
            handles.push(self.spawn_timer(kind, period, first_tick));
        }
    }

    fn spawn_timer(&self, kind: JobKind, period: Duration, first_tick: Instant) -> JoinHandle<()> {
        let runner = self.runner.clone();
        let mut shutdown = self.shutdown.subscribe();

        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval_at(tokio::time::Instant::from_std(first_tick), period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => break,
                    _ = interval.tick() => {
                        if let Err(e) = runner.run(kind).await {
                            error!("{} job failed: {}", kind, e);
                        }
                    }
                }
            }
            info!("{} job stopped", kind);
        })
    }

    /// Stop the timers; a tick already in progress runs to completion
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        self.shutdown.send_replace(true);

        let handles = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                error!("Job task ended abnormally: {}", e);
            }
        }
        info!("All jobs stopped");
    }

    /// Manual single-league matchup refresh
    pub async fn refresh_league(&self, league_id: &str, week: Option<u32>) -> Result<LeagueRefresh> {
        self.runner.refresher().refresh_league(league_id, week).await
    }

    /// Cached matchups for a league and week, refreshed when older than `max_age`
    pub async fn matchups(
        &self,
        league_id: &str,
        week: u32,
        max_age: chrono::Duration,
    ) -> Result<Vec<serde_json::Value>> {
        self.runner.refresher().matchups(league_id, week, max_age).await
    }

    pub async fn run_once(&self, kind: JobKind) -> Result<JobOutcome> {
        self.runner.run(kind).await
    }

    pub async fn status(&self) -> JobStatus {
        JobStatus {
            running: self.is_running(),
            tracked_drafts: self.runner.draft.tracked_drafts().await,
            jobs: self.runner.stats(),
        }
    }
}

pub type SharedJobManager = Arc<JobManager>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sleeper::types::DraftSettings;
    use crate::sleeper::{Draft, DraftStatus};
    use crate::store::{League, Platform, Store, User};
    use crate::testing::{job_manager as manager, MockSportsApi};
    use chrono::TimeZone;
    use std::collections::HashMap;

    async fn store_with_league() -> Arc<Store> {
        let store = Arc::new(Store::in_memory());
        store
            .upsert_user(User::new("10", "A", Some(Platform::Telegram)))
            .await
            .unwrap();
        store
            .link_league(
                "10",
                League {
                    league_id: "L1".to_string(),
                    name: "Main".to_string(),
                    season: "2025".to_string(),
                    sport: "nfl".to_string(),
                },
                1,
            )
            .await
            .unwrap();
        store
    }

    #[test]
    fn test_until_next_hour() {
        let at = |m, s| Utc.with_ymd_and_hms(2025, 9, 7, 12, m, s).unwrap();
        assert_eq!(until_next_hour(at(30, 0)), Duration::from_secs(1800));
        assert_eq!(until_next_hour(at(59, 59)), Duration::from_secs(1));
        assert_eq!(until_next_hour(at(0, 0)), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_run_once_records_stats() {
        let api = Arc::new(MockSportsApi::new());
        let store = store_with_league().await;
        api.set_drafts(
            "L1",
            vec![Draft {
                draft_id: "D1".to_string(),
                status: DraftStatus::InProgress,
                start_time: None,
                settings: DraftSettings {
                    teams: 1,
                    rounds: 1,
                    pick_timer: 60,
                },
                draft_order: Some(HashMap::new()),
            }],
        );
        let manager = manager(api, store);

        let outcome = manager.run_once(JobKind::Draft).await.unwrap();
        assert!(matches!(outcome, JobOutcome::Draft(ref r) if r.drafts_seen == 1));

        let status = manager.status().await;
        assert!(!status.running);
        assert_eq!(status.tracked_drafts, 1);
        assert_eq!(status.jobs["draft"].runs, 1);
        assert_eq!(status.jobs["refresh"].runs, 0);
        assert!(status.jobs["draft"].last_outcome.is_some());
    }

    #[tokio::test]
    async fn test_failed_run_is_recorded() {
        let api = Arc::new(MockSportsApi::new());
        api.fail_on("nfl");
        let manager = manager(api, store_with_league().await);

        assert!(manager.run_once(JobKind::Refresh).await.is_err());

        let status = manager.status().await;
        assert_eq!(status.jobs["refresh"].failures, 1);
        assert!(status.jobs["refresh"].last_error.is_some());
    }

    #[tokio::test]
    async fn test_refresh_league_goes_through_the_refresher() {
        let api = Arc::new(MockSportsApi::new());
        api.set_matchups("L1", 1, vec![serde_json::json!({"matchup_id": 1})]);
        let store = store_with_league().await;
        let manager = manager(api, store.clone());

        let refreshed = manager.refresh_league("L1", None).await.unwrap();
        assert_eq!(refreshed.week, 1);
        assert_eq!(refreshed.matchups, 1);
        assert!(store.get_cached_matchups("L1", 1).await.is_some());
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let api = Arc::new(MockSportsApi::new());
        let manager = manager(api.clone(), store_with_league().await);

        manager.start();
        manager.start();
        assert!(manager.is_running());
        assert_eq!(manager.handles.lock().len(), 4);

        // Let the immediate draft and refresh ticks run
        tokio::time::sleep(Duration::from_millis(50)).await;
        manager.stop().await;

        assert!(!manager.is_running());
        assert!(manager.handles.lock().is_empty());
        assert!(api.calls("get_drafts:L1") >= 1);
        assert!(api.calls("get_matchups:L1") >= 1);

        // A stopped manager can be started again
        manager.start();
        assert!(manager.is_running());
        manager.stop().await;
    }
}
