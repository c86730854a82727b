//! Hourly recurring notifications, evaluated in each user's own timezone.
//!
//! Nothing is remembered between ticks: a rule matches exactly one hour per
//! qualifying local day, so the hourly cadence alone keeps it to one message.

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use tracing::{debug, info, warn};

use super::guard::TickGuard;
use crate::clock::SharedClock;
use crate::error::Result;
use crate::messages::escape_markdown;
use crate::messenger::{Delivery, SendOptions, SharedMessenger};
use crate::sleeper::{Game, PlayerMap, SharedSportsApi, SportState};
use crate::store::{SharedStore, UserWithLeagues};

const MAX_INJURED_LISTED: usize = 5;
const MAX_PLAYERS_LISTED: usize = 10;

const EVENING_HOUR: u32 = 18;
const MORNING_HOUR: u32 = 8;

/// One of the user's leagues with its alert switches
#[derive(Debug, Clone, PartialEq)]
pub struct LeagueView {
    pub league_id: String,
    pub name: String,
    pub roster_id: u32,
    pub pregame: bool,
    pub scoring: bool,
    pub waivers: bool,
}

/// Everything the hourly rules need to know about one user
#[derive(Debug, Clone, PartialEq)]
pub struct UserView {
    pub user_id: String,
    pub timezone: Tz,
    pub leagues: Vec<LeagueView>,
}

impl From<&UserWithLeagues> for UserView {
    fn from(entry: &UserWithLeagues) -> Self {
        Self {
            user_id: entry.user.id.clone(),
            timezone: entry.user.tz(),
            leagues: entry
                .leagues
                .iter()
                .map(|m| LeagueView {
                    league_id: m.league.league_id.clone(),
                    name: m.league.name.clone(),
                    roster_id: m.membership.roster_id,
                    pregame: m.alerts.pregame,
                    scoring: m.alerts.scoring,
                    waivers: m.alerts.waivers,
                })
                .collect(),
        }
    }
}

impl UserView {
    fn pregame_leagues(&self) -> impl Iterator<Item = &LeagueView> {
        self.leagues.iter().filter(|l| l.pregame)
    }

    fn waiver_leagues(&self) -> impl Iterator<Item = &LeagueView> {
        self.leagues.iter().filter(|l| l.waivers)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurringKind {
    /// Wednesday 18:00: injuries and byes before lineups lock
    TeamManagement,
    /// Tuesday 18:00: waiver claims are due
    Waivers,
    /// Thursday to Monday 08:00: who plays today
    GameDay,
}

impl fmt::Display for RecurringKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecurringKind::TeamManagement => write!(f, "team_management"),
            RecurringKind::Waivers => write!(f, "waivers"),
            RecurringKind::GameDay => write!(f, "game_day"),
        }
    }
}

/// Local weekday and hour of `now` in `tz`
pub fn local_slot(now: DateTime<Utc>, tz: Tz) -> (Weekday, u32) {
    let local = now.with_timezone(&tz);
    (local.weekday(), local.hour())
}

/// Rules that are due in the given local hour
pub fn scheduled_kinds(weekday: Weekday, hour: u32) -> Vec<RecurringKind> {
    let mut kinds = Vec::new();
    if hour == EVENING_HOUR {
        match weekday {
            Weekday::Wed => kinds.push(RecurringKind::TeamManagement),
            Weekday::Tue => kinds.push(RecurringKind::Waivers),
            _ => {}
        }
    }
    if hour == MORNING_HOUR
        && matches!(
            weekday,
            Weekday::Thu | Weekday::Fri | Weekday::Sat | Weekday::Sun | Weekday::Mon
        )
    {
        kinds.push(RecurringKind::GameDay);
    }
    kinds
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IntelligentTickReport {
    pub skipped: bool,
    pub users_checked: usize,
    pub users_failed: usize,
    pub notifications_sent: usize,
}

impl fmt::Display for IntelligentTickReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.skipped {
            return write!(f, "skipped (previous tick still running)");
        }
        write!(
            f,
            "{} users ({} failed), {} notifications",
            self.users_checked, self.users_failed, self.notifications_sent
        )
    }
}

pub struct IntelligentNotifier {
    api: SharedSportsApi,
    messenger: SharedMessenger,
    store: SharedStore,
    clock: SharedClock,
    sport: String,
    guard: TickGuard,
}

impl IntelligentNotifier {
    pub fn new(
        api: SharedSportsApi,
        store: SharedStore,
        messenger: SharedMessenger,
        clock: SharedClock,
        sport: &str,
    ) -> Self {
        Self {
            api,
            messenger,
            store,
            clock,
            sport: sport.to_string(),
            guard: TickGuard::new(),
        }
    }

    pub async fn process_tick(&self) -> IntelligentTickReport {
        let Some(_token) = self.guard.try_begin() else {
            debug!("Intelligent tick still running, skipping");
            return IntelligentTickReport {
                skipped: true,
                ..Default::default()
            };
        };

        let mut report = IntelligentTickReport::default();
        let users = self.store.list_users_with_leagues_and_alerts().await;

        for entry in &users {
            let view = UserView::from(entry);
            report.users_checked += 1;
            match self.process_user(&view).await {
                Ok(sent) => report.notifications_sent += sent,
                Err(e) => {
                    warn!(user_id = %view.user_id, "Recurring notifications failed: {}", e);
                    report.users_failed += 1;
                }
            }
        }

        if report.notifications_sent > 0 || report.users_failed > 0 {
            info!("Intelligent tick: {}", report);
        } else {
            debug!("Intelligent tick: {}", report);
        }
        report
    }

    /// Evaluate every rule due for this user right now; returns messages sent
    pub async fn process_user(&self, view: &UserView) -> Result<usize> {
        let now = self.clock.now();
        let (weekday, hour) = local_slot(now, view.timezone);
        let today = now.with_timezone(&view.timezone).date_naive();

        let mut sent = 0;
        for kind in scheduled_kinds(weekday, hour) {
            let delivery = match kind {
                RecurringKind::TeamManagement => self.send_team_management(view, today).await?,
                RecurringKind::Waivers => self.send_waiver_reminder(view).await,
                RecurringKind::GameDay => self.send_game_day(view, today).await?,
            };
            if let Some(delivery) = delivery {
                debug!(user_id = %view.user_id, %kind, ?delivery, "Recurring notification");
                if delivery == Delivery::Sent {
                    sent += 1;
                }
            }
        }
        Ok(sent)
    }

    /// Current state, or None before the season opens
    async fn started_season(&self, today: NaiveDate) -> Result<Option<SportState>> {
        let state = self.api.get_state(&self.sport).await?;
        if state.season_started(today) {
            Ok(Some(state))
        } else {
            debug!(season = %state.season, "Season has not started");
            Ok(None)
        }
    }

    /// Player IDs on the user's roster in a league
    async fn roster_players(&self, view: &UserView, league: &LeagueView) -> Result<Vec<String>> {
        let rosters = self.api.get_rosters(&league.league_id).await?;
        Ok(rosters
            .into_iter()
            .find(|r| r.roster_id == league.roster_id)
            .map(|r| r.players().to_vec())
            .unwrap_or_else(|| {
                debug!(
                    user_id = %view.user_id,
                    league_id = %league.league_id,
                    roster_id = league.roster_id,
                    "Roster not found"
                );
                Vec::new()
            }))
    }

    async fn send_team_management(&self, view: &UserView, today: NaiveDate) -> Result<Option<Delivery>> {
        if view.pregame_leagues().next().is_none() {
            return Ok(None);
        }
        let Some(state) = self.started_season(today).await? else {
            return Ok(None);
        };

        let players = self.api.get_players(&self.sport).await?;
        let schedule = self.api.get_nfl_schedule(state.week).await?;

        let mut injured = Vec::new();
        let mut seen = HashSet::new();
        let mut roster_teams = BTreeSet::new();
        for league in view.pregame_leagues() {
            for player_id in self.roster_players(view, league).await? {
                let Some(player) = players.get(&player_id) else {
                    continue;
                };
                if let Some(team) = &player.team {
                    roster_teams.insert(team.to_uppercase());
                }
                if player.has_concerning_injury() && seen.insert(player_id.clone()) {
                    injured.push(format!(
                        "• {} ({}) - {}",
                        escape_markdown(&player.full_name()),
                        player.team.as_deref().unwrap_or("FA"),
                        player.injury_status.as_deref().unwrap_or_default()
                    ));
                }
            }
        }

        let byes: Vec<String> = if schedule.is_empty() {
            Vec::new()
        } else {
            roster_teams
                .into_iter()
                .filter(|team| !schedule.iter().any(|g| g.involves(team)))
                .collect()
        };

        let user_id = view.user_id.as_str();
        let mut lines = vec![self.messenger.localize(user_id, "team_management_title", &[]).await];
        if injured.is_empty() && byes.is_empty() {
            lines.push(String::new());
            lines.push(
                self.messenger
                    .localize(user_id, "team_management_all_clear", &[])
                    .await,
            );
        }
        if !injured.is_empty() {
            lines.push(String::new());
            lines.push(
                self.messenger
                    .localize(user_id, "team_management_injuries", &[])
                    .await,
            );
            lines.extend(injured.iter().take(MAX_INJURED_LISTED).cloned());
            if injured.len() > MAX_INJURED_LISTED {
                lines.push(self.and_more(user_id, injured.len() - MAX_INJURED_LISTED).await);
            }
        }
        if !byes.is_empty() {
            lines.push(String::new());
            lines.push(self.messenger.localize(user_id, "team_management_byes", &[]).await);
            lines.push(byes.join(", "));
        }

        Ok(Some(
            self.messenger
                .send_raw(user_id, &lines.join("\n"), &SendOptions::default())
                .await,
        ))
    }

    async fn send_waiver_reminder(&self, view: &UserView) -> Option<Delivery> {
        let names: Vec<&str> = view.waiver_leagues().map(|l| l.name.as_str()).collect();
        if names.is_empty() {
            return None;
        }
        Some(
            self.messenger
                .send_templated(&view.user_id, "waiver_reminder", &[("leagues", names.join(", "))])
                .await,
        )
    }

    async fn send_game_day(&self, view: &UserView, today: NaiveDate) -> Result<Option<Delivery>> {
        if view.pregame_leagues().next().is_none() {
            return Ok(None);
        }
        let Some(state) = self.started_season(today).await? else {
            return Ok(None);
        };

        let mut games: Vec<Game> = self
            .api
            .get_nfl_schedule(state.week)
            .await?
            .into_iter()
            .filter(|g| g.local_date(view.timezone) == Some(today))
            .collect();
        if games.is_empty() {
            return Ok(None);
        }
        // Known kickoffs first, in order; date-only games keep schedule order
        games.sort_by_key(|g| (g.start_time.is_none(), g.start_time));

        let players = self.api.get_players(&self.sport).await?;
        let playing = self.playing_today(view, &games, &players).await?;
        if playing.is_empty() {
            debug!(user_id = %view.user_id, "No rostered players in today's games");
            return Ok(None);
        }

        let user_id = view.user_id.as_str();
        let mut lines = vec![
            self.messenger.localize(user_id, "game_day_title", &[]).await,
            String::new(),
            self.messenger.localize(user_id, "game_day_players", &[]).await,
        ];
        lines.extend(playing.iter().take(MAX_PLAYERS_LISTED).map(|p| format!("• {}", p)));
        if playing.len() > MAX_PLAYERS_LISTED {
            lines.push(self.and_more(user_id, playing.len() - MAX_PLAYERS_LISTED).await);
        }
        lines.push(String::new());
        lines.push(self.messenger.localize(user_id, "game_day_games", &[]).await);
        lines.extend(games.iter().map(|g| format_game(g, view.timezone)));

        Ok(Some(
            self.messenger
                .send_raw(user_id, &lines.join("\n"), &SendOptions::default())
                .await,
        ))
    }

    /// "Name (TEAM)" for every rostered player whose team plays in `games`
    async fn playing_today(&self, view: &UserView, games: &[Game], players: &PlayerMap) -> Result<Vec<String>> {
        let mut seen = HashSet::new();
        let mut playing = Vec::new();
        for league in view.pregame_leagues() {
            for player_id in self.roster_players(view, league).await? {
                let Some(player) = players.get(&player_id) else {
                    continue;
                };
                let Some(team) = player.team.as_deref() else {
                    continue;
                };
                if games.iter().any(|g| g.involves(team)) && seen.insert(player_id.clone()) {
                    playing.push(format!("{} ({})", escape_markdown(&player.full_name()), team));
                }
            }
        }
        Ok(playing)
    }

    async fn and_more(&self, user_id: &str, count: usize) -> String {
        self.messenger
            .localize(user_id, "and_more", &[("count", count.to_string())])
            .await
    }
}

/// "AWAY @ HOME · 1:00 PM EST" in the user's timezone, "AWAY @ HOME" without a kickoff time
fn format_game(game: &Game, tz: Tz) -> String {
    match game.start_time {
        Some(kickoff) => format!(
            "{} @ {} · {}",
            game.away,
            game.home,
            kickoff.with_timezone(&tz).format("%-I:%M %p %Z")
        ),
        None => format!("{} @ {}", game.away, game.home),
    }
}
