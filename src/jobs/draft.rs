//! Draft notifications: "starting soon" notices and "you're on the clock" turns.

use chrono::Duration;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::guard::TickGuard;
use crate::clock::SharedClock;
use crate::error::Result;
use crate::messages::format_pick_timer;
use crate::messenger::{Delivery, SharedMessenger};
use crate::sleeper::{Draft, DraftStatus, PickPosition, SharedSportsApi};
use crate::store::{LeagueWithMembers, SharedStore};

/// How far ahead of the start time the "starting soon" notice goes out
const START_NOTICE_WINDOW_MINUTES: i64 = 60;

/// What has already been sent for one draft
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DraftNotificationState {
    /// Every member has been given the start notice
    pub start_notice_sent: bool,
    /// Chat IDs whose start notice is settled
    pub start_notified: HashSet<String>,
    /// Pick count seen on the previous tick
    pub last_pick_count: usize,
    /// Sleeper user IDs notified for the pick currently on the clock
    pub users_notified: HashSet<String>,
}

/// Per-draft notification state, keyed by Sleeper draft ID.
///
/// Lives in memory only; after a restart at most one in-flight notice is
/// sent again.
#[derive(Debug, Default)]
pub struct DraftTracker {
    states: HashMap<String, DraftNotificationState>,
}

impl DraftTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state_mut(&mut self, draft_id: &str) -> &mut DraftNotificationState {
        self.states.entry(draft_id.to_string()).or_default()
    }

    pub fn get(&self, draft_id: &str) -> Option<&DraftNotificationState> {
        self.states.get(draft_id)
    }

    /// Returns true if the draft was tracked
    pub fn remove(&mut self, draft_id: &str) -> bool {
        self.states.remove(draft_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Forget drafts not in `seen`; returns how many were dropped
    pub fn retain_seen(&mut self, seen: &HashSet<String>) -> usize {
        let before = self.states.len();
        self.states.retain(|draft_id, _| seen.contains(draft_id));
        before - self.states.len()
    }

    /// Record the current pick count, forgetting who was notified if it moved
    fn observe_pick_count(&mut self, draft_id: &str, pick_count: usize) -> &mut DraftNotificationState {
        let state = self.state_mut(draft_id);
        if state.last_pick_count != pick_count {
            state.users_notified.clear();
            state.last_pick_count = pick_count;
        }
        state
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DraftTickReport {
    pub skipped: bool,
    pub leagues_checked: usize,
    pub leagues_failed: usize,
    pub drafts_seen: usize,
    pub drafts_failed: usize,
    pub notifications_sent: usize,
}

impl fmt::Display for DraftTickReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.skipped {
            return write!(f, "skipped (previous tick still running)");
        }
        write!(
            f,
            "{} leagues ({} failed), {} drafts ({} failed), {} notifications",
            self.leagues_checked,
            self.leagues_failed,
            self.drafts_seen,
            self.drafts_failed,
            self.notifications_sent
        )
    }
}

pub struct DraftNotifier {
    api: SharedSportsApi,
    store: SharedStore,
    messenger: SharedMessenger,
    clock: SharedClock,
    tracker: Mutex<DraftTracker>,
    guard: TickGuard,
}

impl DraftNotifier {
    pub fn new(
        api: SharedSportsApi,
        store: SharedStore,
        messenger: SharedMessenger,
        clock: SharedClock,
    ) -> Self {
        Self {
            api,
            store,
            messenger,
            clock,
            tracker: Mutex::new(DraftTracker::new()),
            guard: TickGuard::new(),
        }
    }

    pub async fn tracked_drafts(&self) -> usize {
        self.tracker.lock().await.len()
    }

    #[cfg(test)]
    pub async fn draft_state(&self, draft_id: &str) -> Option<DraftNotificationState> {
        self.tracker.lock().await.get(draft_id).cloned()
    }

    /// One polling pass over every league that has members
    pub async fn process_tick(&self) -> DraftTickReport {
        let Some(_token) = self.guard.try_begin() else {
            debug!("Draft tick still running, skipping");
            return DraftTickReport {
                skipped: true,
                ..Default::default()
            };
        };

        let mut report = DraftTickReport::default();
        let mut seen = HashSet::new();
        let leagues = self.store.list_leagues_with_members().await;

        for entry in &leagues {
            report.leagues_checked += 1;
            let league_id = entry.league.league_id.as_str();

            let drafts = match self.api.get_drafts(league_id).await {
                Ok(drafts) => drafts,
                Err(e) => {
                    warn!(league_id, "Failed to fetch drafts: {}", e);
                    report.leagues_failed += 1;
                    continue;
                }
            };

            for draft in &drafts {
                report.drafts_seen += 1;
                seen.insert(draft.draft_id.clone());
                match self.process_draft(draft, entry).await {
                    Ok(sent) => report.notifications_sent += sent,
                    Err(e) => {
                        warn!(league_id, draft_id = %draft.draft_id, "Failed to process draft: {}", e);
                        report.drafts_failed += 1;
                    }
                }
            }
        }

        // Only a tick that saw every league can tell a draft is gone
        if report.leagues_failed == 0 {
            let dropped = self.tracker.lock().await.retain_seen(&seen);
            if dropped > 0 {
                debug!("Forgot {} drafts no longer listed upstream", dropped);
            }
        }

        if report.notifications_sent > 0 || report.leagues_failed > 0 {
            info!("Draft tick: {}", report);
        } else {
            debug!("Draft tick: {}", report);
        }
        report
    }

    /// Apply the start-notice, turn and completion rules to one draft.
    /// Returns the number of messages sent.
    pub async fn process_draft(&self, draft: &Draft, league: &LeagueWithMembers) -> Result<usize> {
        if draft.status == DraftStatus::Complete {
            if self.tracker.lock().await.remove(&draft.draft_id) {
                info!(draft_id = %draft.draft_id, "Draft complete, state cleared");
            }
            return Ok(0);
        }

        let mut sent = 0;
        let now = self.clock.now();
        if let Some(start) = draft.start_time() {
            let until_start = start - now;
            if until_start > Duration::zero()
                && until_start <= Duration::minutes(START_NOTICE_WINDOW_MINUTES)
            {
                sent += self.send_start_notices(draft, league, until_start).await;
            }
        }

        if draft.status == DraftStatus::InProgress {
            sent += self.check_turn(draft, league).await?;
        }

        Ok(sent)
    }

    async fn send_start_notices(
        &self,
        draft: &Draft,
        league: &LeagueWithMembers,
        until_start: Duration,
    ) -> usize {
        let pending: Vec<String> = {
            let mut tracker = self.tracker.lock().await;
            let state = tracker.state_mut(&draft.draft_id);
            if state.start_notice_sent {
                return 0;
            }
            league
                .members
                .iter()
                .map(|m| m.user.id.clone())
                .filter(|id| !state.start_notified.contains(id))
                .collect()
        };

        let minutes = ((until_start.num_seconds() + 59) / 60).max(1);
        let variables = [
            ("league", league.league.name.clone()),
            ("minutes", minutes.to_string()),
        ];

        let mut sent = 0;
        let mut settled = Vec::new();
        for user_id in pending {
            let delivery = self
                .messenger
                .send_templated(&user_id, "draft_starting_soon", &variables)
                .await;
            if delivery == Delivery::Sent {
                sent += 1;
            }
            if delivery.is_settled() {
                settled.push(user_id);
            }
        }

        let mut tracker = self.tracker.lock().await;
        let state = tracker.state_mut(&draft.draft_id);
        state.start_notified.extend(settled);
        state.start_notice_sent = league
            .members
            .iter()
            .all(|m| state.start_notified.contains(&m.user.id));
        if state.start_notice_sent {
            info!(
                draft_id = %draft.draft_id,
                league = %league.league.name,
                "Start notice sent to {} members",
                league.members.len()
            );
        }
        sent
    }

    async fn check_turn(&self, draft: &Draft, league: &LeagueWithMembers) -> Result<usize> {
        let pick_count = self.api.get_draft_picks(&draft.draft_id).await?.len();
        self.tracker
            .lock()
            .await
            .observe_pick_count(&draft.draft_id, pick_count);

        let Some(position) = PickPosition::snake(pick_count as u32 + 1, draft.settings.teams) else {
            debug!(draft_id = %draft.draft_id, "Draft has no team count, cannot compute turn");
            return Ok(0);
        };
        if draft.settings.rounds > 0 && position.round > draft.settings.rounds {
            return Ok(0);
        }
        let Some(owner) = draft.slot_owner(position.slot).map(str::to_string) else {
            debug!(draft_id = %draft.draft_id, slot = position.slot, "No user in draft slot");
            return Ok(0);
        };

        let already_notified = self
            .tracker
            .lock()
            .await
            .get(&draft.draft_id)
            .is_some_and(|state| state.users_notified.contains(&owner));
        if already_notified {
            return Ok(0);
        }

        let Some(chat_id) = self.store.find_provider_link(&owner).await else {
            debug!(sleeper_user = %owner, "On the clock but not linked to a chat user");
            return Ok(0);
        };

        let delivery = self
            .messenger
            .send_templated(
                &chat_id,
                "draft_your_turn",
                &[
                    ("league", league.league.name.clone()),
                    ("round", position.round.to_string()),
                    ("pick", position.pick_in_round.to_string()),
                    ("overall", position.overall.to_string()),
                    ("timer", format_pick_timer(draft.settings.pick_timer)),
                ],
            )
            .await;

        if delivery.is_settled() {
            self.tracker
                .lock()
                .await
                .state_mut(&draft.draft_id)
                .users_notified
                .insert(owner);
        }
        Ok(usize::from(delivery == Delivery::Sent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::messenger::Messenger;
    use crate::sleeper::types::DraftSettings;
    use crate::store::{League, Platform, Store, User};
    use crate::testing::{MockSportsApi, RecordingAdapter};
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    struct Harness {
        api: Arc<MockSportsApi>,
        adapter: Arc<RecordingAdapter>,
        clock: Arc<ManualClock>,
        notifier: DraftNotifier,
    }

    async fn harness(leagues: &[&str]) -> Harness {
        let store = Arc::new(Store::in_memory());
        for (chat_id, sleeper_id) in [("101", "s1"), ("102", "s2")] {
            store
                .upsert_user(User::new(chat_id, chat_id, Some(Platform::Telegram)))
                .await
                .unwrap();
            store.link_sleeper_account(chat_id, sleeper_id).await.unwrap();
            for (i, league_id) in leagues.iter().enumerate() {
                store
                    .link_league(
                        chat_id,
                        League {
                            league_id: league_id.to_string(),
                            name: format!("League {}", league_id),
                            season: "2025".to_string(),
                            sport: "nfl".to_string(),
                        },
                        i as u32 + 1,
                    )
                    .await
                    .unwrap();
            }
        }

        let api = Arc::new(MockSportsApi::new());
        let adapter = Arc::new(RecordingAdapter::new(Platform::Telegram));
        let messenger = Arc::new(Messenger::new(store.clone()).with_adapter(adapter.clone()));
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 8, 30, 18, 0, 0).unwrap(),
        ));
        let notifier = DraftNotifier::new(api.clone(), store, messenger, clock.clone());
        Harness {
            api,
            adapter,
            clock,
            notifier,
        }
    }

    fn draft(id: &str, status: DraftStatus, start_in: Option<Duration>, clock: &ManualClock) -> Draft {
        Draft {
            draft_id: id.to_string(),
            status,
            start_time: start_in.map(|d| (clock.now() + d).timestamp_millis()),
            settings: DraftSettings {
                teams: 2,
                rounds: 3,
                pick_timer: 90,
            },
            draft_order: Some(HashMap::from([("s1".to_string(), 1), ("s2".to_string(), 2)])),
        }
    }

    fn start_notices(adapter: &RecordingAdapter, chat_id: &str) -> usize {
        adapter
            .sent_to(chat_id)
            .iter()
            .filter(|t| t.contains("starts in"))
            .count()
    }

    fn turn_notices(adapter: &RecordingAdapter, chat_id: &str) -> usize {
        adapter
            .sent_to(chat_id)
            .iter()
            .filter(|t| t.contains("on the clock"))
            .count()
    }

    #[tokio::test]
    async fn test_start_notice_is_sent_once() {
        let h = harness(&["L1"]).await;
        h.api.set_drafts(
            "L1",
            vec![draft("D1", DraftStatus::PreDraft, Some(Duration::minutes(30)), &h.clock)],
        );

        for _ in 0..5 {
            h.notifier.process_tick().await;
            h.clock.advance(Duration::minutes(1));
        }

        assert_eq!(start_notices(&h.adapter, "101"), 1);
        assert_eq!(start_notices(&h.adapter, "102"), 1);
        assert!(h.adapter.sent_to("101")[0].contains("30 minutes"));
        assert!(h.notifier.draft_state("D1").await.unwrap().start_notice_sent);
    }

    #[tokio::test]
    async fn test_no_start_notice_outside_window() {
        let h = harness(&["L1"]).await;
        h.api.set_drafts(
            "L1",
            vec![
                draft("late", DraftStatus::PreDraft, Some(Duration::minutes(-5)), &h.clock),
                draft("early", DraftStatus::PreDraft, Some(Duration::minutes(61)), &h.clock),
            ],
        );

        h.notifier.process_tick().await;
        assert!(h.adapter.sent().is_empty());

        // "early" enters the window, "late" stays missed
        h.clock.advance(Duration::minutes(2));
        h.notifier.process_tick().await;
        assert_eq!(start_notices(&h.adapter, "101"), 1);
        assert_eq!(start_notices(&h.adapter, "102"), 1);
        assert!(h.notifier.draft_state("late").await.is_none());
    }

    #[tokio::test]
    async fn test_failed_start_notice_is_retried_for_that_member_only() {
        let h = harness(&["L1"]).await;
        h.api.set_drafts(
            "L1",
            vec![draft("D1", DraftStatus::PreDraft, Some(Duration::minutes(45)), &h.clock)],
        );
        h.adapter.fail_for("102");

        h.notifier.process_tick().await;
        assert_eq!(start_notices(&h.adapter, "101"), 1);
        assert_eq!(start_notices(&h.adapter, "102"), 0);
        assert!(!h.notifier.draft_state("D1").await.unwrap().start_notice_sent);

        h.adapter.recover("102");
        h.notifier.process_tick().await;
        h.notifier.process_tick().await;
        assert_eq!(start_notices(&h.adapter, "101"), 1);
        assert_eq!(start_notices(&h.adapter, "102"), 1);
    }

    #[tokio::test]
    async fn test_turn_notification_once_per_pick() {
        let h = harness(&["L1"]).await;
        h.api
            .set_drafts("L1", vec![draft("D1", DraftStatus::InProgress, None, &h.clock)]);

        // Pick 1 -> slot 1 (s1)
        h.api.set_pick_count("D1", 0);
        for _ in 0..3 {
            h.notifier.process_tick().await;
        }
        assert_eq!(turn_notices(&h.adapter, "101"), 1);
        assert_eq!(turn_notices(&h.adapter, "102"), 0);
        assert!(h.adapter.sent_to("101")[0].contains("Round 1, pick 1"));
        assert!(h.adapter.sent_to("101")[0].contains("90 seconds"));

        // Pick 2 -> slot 2 (s2)
        h.api.set_pick_count("D1", 1);
        h.notifier.process_tick().await;
        h.notifier.process_tick().await;
        assert_eq!(turn_notices(&h.adapter, "102"), 1);

        // Pick 3 is the snake turn: slot 2 picks again
        h.api.set_pick_count("D1", 2);
        h.notifier.process_tick().await;
        h.notifier.process_tick().await;
        assert_eq!(turn_notices(&h.adapter, "102"), 2);
        assert!(h.adapter.sent_to("102")[1].contains("Round 2, pick 1"));

        // Pick 4 -> slot 1
        h.api.set_pick_count("D1", 3);
        h.notifier.process_tick().await;
        assert_eq!(turn_notices(&h.adapter, "101"), 2);

        let state = h.notifier.draft_state("D1").await.unwrap();
        assert_eq!(state.last_pick_count, 3);
        assert!(state.users_notified.contains("s1"));
    }

    #[tokio::test]
    async fn test_no_turn_after_last_round() {
        let h = harness(&["L1"]).await;
        h.api
            .set_drafts("L1", vec![draft("D1", DraftStatus::InProgress, None, &h.clock)]);
        h.api.set_pick_count("D1", 6);

        h.notifier.process_tick().await;
        assert!(h.adapter.sent().is_empty());
    }

    #[tokio::test]
    async fn test_complete_draft_clears_state() {
        let h = harness(&["L1"]).await;
        h.api
            .set_drafts("L1", vec![draft("D1", DraftStatus::InProgress, None, &h.clock)]);
        h.notifier.process_tick().await;
        assert_eq!(h.notifier.tracked_drafts().await, 1);

        h.api
            .set_drafts("L1", vec![draft("D1", DraftStatus::Complete, None, &h.clock)]);
        h.notifier.process_tick().await;
        assert_eq!(h.notifier.tracked_drafts().await, 0);

        // Still listed upstream on later ticks: nothing is re-created
        h.notifier.process_tick().await;
        assert_eq!(h.notifier.tracked_drafts().await, 0);
    }

    #[tokio::test]
    async fn test_failing_league_does_not_stop_the_tick() {
        let h = harness(&["L1", "L2", "L3"]).await;
        for league_id in ["L1", "L3"] {
            h.api.set_drafts(
                league_id,
                vec![draft(
                    &format!("D-{}", league_id),
                    DraftStatus::PreDraft,
                    Some(Duration::minutes(20)),
                    &h.clock,
                )],
            );
        }
        h.api.fail_on("L2");

        let report = h.notifier.process_tick().await;

        assert_eq!(h.api.calls("get_drafts:L1"), 1);
        assert_eq!(h.api.calls("get_drafts:L2"), 1);
        assert_eq!(h.api.calls("get_drafts:L3"), 1);
        assert_eq!(report.leagues_checked, 3);
        assert_eq!(report.leagues_failed, 1);
        assert_eq!(report.notifications_sent, 4);
        assert_eq!(start_notices(&h.adapter, "101"), 2);
    }

    #[tokio::test]
    async fn test_failing_pick_fetch_is_counted_per_draft() {
        let h = harness(&["L1"]).await;
        h.api.set_drafts(
            "L1",
            vec![
                draft("broken", DraftStatus::InProgress, None, &h.clock),
                draft("ok", DraftStatus::InProgress, None, &h.clock),
            ],
        );
        h.api.fail_on("broken");

        let report = h.notifier.process_tick().await;
        assert_eq!(report.drafts_failed, 1);
        assert_eq!(turn_notices(&h.adapter, "101"), 1);
    }

    #[tokio::test]
    async fn test_vanished_drafts_are_forgotten_after_full_tick() {
        let h = harness(&["L1", "L2"]).await;
        h.api.set_drafts("L1", vec![draft("D1", DraftStatus::InProgress, None, &h.clock)]);
        h.api.set_drafts("L2", vec![draft("D2", DraftStatus::InProgress, None, &h.clock)]);
        h.notifier.process_tick().await;
        assert_eq!(h.notifier.tracked_drafts().await, 2);

        // L2 unreachable: D2 might still exist, so it is kept
        h.api.set_drafts("L1", vec![]);
        h.api.fail_on("L2");
        h.notifier.process_tick().await;
        assert_eq!(h.notifier.tracked_drafts().await, 2);

        h.api.set_drafts("L2", vec![]);
        h.api.clear_failures();
        h.notifier.process_tick().await;
        assert_eq!(h.notifier.tracked_drafts().await, 0);
    }

    #[test]
    fn test_tracker_resets_notified_users_when_pick_count_moves() {
        let mut tracker = DraftTracker::new();
        tracker
            .observe_pick_count("D", 4)
            .users_notified
            .insert("s1".to_string());
        assert!(tracker.observe_pick_count("D", 4).users_notified.contains("s1"));
        assert!(tracker.observe_pick_count("D", 5).users_notified.is_empty());
        assert!(tracker.remove("D"));
        assert!(!tracker.remove("D"));
    }
}
