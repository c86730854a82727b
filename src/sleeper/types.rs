//! Sleeper API response shapes.
//!
//! Only the fields the notification engines read are modelled; everything
//! else in the upstream JSON is ignored.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

/// `GET /state/{sport}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SportState {
    #[serde(default)]
    pub week: u32,
    #[serde(default)]
    pub season: String,
    #[serde(default, deserialize_with = "lenient_date")]
    pub season_start_date: Option<NaiveDate>,
}

impl SportState {
    /// A missing start date is treated as "already started"
    pub fn season_started(&self, today: NaiveDate) -> bool {
        match self.season_start_date {
            Some(start) => start <= today,
            None => true,
        }
    }
}

fn lenient_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()))
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DraftStatus {
    PreDraft,
    #[serde(alias = "drafting")]
    InProgress,
    Paused,
    Complete,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DraftSettings {
    #[serde(default)]
    pub teams: u32,
    #[serde(default)]
    pub rounds: u32,
    /// Seconds per pick
    #[serde(default)]
    pub pick_timer: u32,
}

/// `GET /league/{id}/drafts`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Draft {
    pub draft_id: String,
    pub status: DraftStatus,
    /// Milliseconds since epoch
    #[serde(default)]
    pub start_time: Option<i64>,
    #[serde(default)]
    pub settings: DraftSettings,
    /// Upstream user ID -> draft slot (1-based)
    #[serde(default)]
    pub draft_order: Option<HashMap<String, u32>>,
}

impl Draft {
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
    }

    /// Upstream user holding the given draft slot
    pub fn slot_owner(&self, slot: u32) -> Option<&str> {
        self.draft_order
            .as_ref()?
            .iter()
            .find(|(_, s)| **s == slot)
            .map(|(user_id, _)| user_id.as_str())
    }
}

/// `GET /draft/{id}/picks`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DraftPick {
    #[serde(default)]
    pub pick_no: u32,
    #[serde(default)]
    pub round: u32,
    #[serde(default)]
    pub draft_slot: u32,
    #[serde(default)]
    pub picked_by: Option<String>,
    #[serde(default)]
    pub player_id: Option<String>,
}

/// Where the next pick falls in a snake draft
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PickPosition {
    /// Overall pick number (1-based)
    pub overall: u32,
    pub round: u32,
    /// Pick number within the round (1-based)
    pub pick_in_round: u32,
    /// Draft slot that owns this pick
    pub slot: u32,
}

impl PickPosition {
    /// Snake order: odd rounds pick slots 1..N, even rounds N..1.
    pub fn snake(overall: u32, teams: u32) -> Option<Self> {
        if teams == 0 || overall == 0 {
            return None;
        }
        let index = overall - 1;
        let round = index / teams + 1;
        let pick_in_round = index % teams + 1;
        let slot = if round % 2 == 1 {
            pick_in_round
        } else {
            teams - index % teams
        };
        Some(Self {
            overall,
            round,
            pick_in_round,
            slot,
        })
    }
}

/// `GET /league/{id}/rosters`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Roster {
    pub roster_id: u32,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub players: Option<Vec<String>>,
}

impl Roster {
    pub fn players(&self) -> &[String] {
        self.players.as_deref().unwrap_or(&[])
    }
}

/// Entry of `GET /players/{sport}`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Player {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub injury_status: Option<String>,
}

/// Injury designations worth a lineup change
const CONCERNING_INJURIES: [&str; 3] = ["out", "ir", "doubtful"];

impl Player {
    pub fn full_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => format!("{} {}", first, last),
            (Some(name), None) | (None, Some(name)) => name.clone(),
            (None, None) => "Unknown player".to_string(),
        }
    }

    pub fn has_concerning_injury(&self) -> bool {
        self.injury_status
            .as_deref()
            .map(|status| {
                let status = status.trim().to_lowercase();
                CONCERNING_INJURIES.contains(&status.as_str())
            })
            .unwrap_or(false)
    }
}

pub type PlayerMap = HashMap<String, Player>;

/// One NFL game from the schedule source.
///
/// Sleeper's schedule only publishes the calendar date (US Eastern); other
/// sources may carry a kickoff timestamp in milliseconds instead.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Game {
    #[serde(default)]
    pub week: u32,
    pub home: String,
    pub away: String,
    #[serde(default, deserialize_with = "lenient_date")]
    pub date: Option<NaiveDate>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub start_time: Option<DateTime<Utc>>,
}

impl Game {
    pub fn involves(&self, team: &str) -> bool {
        self.home.eq_ignore_ascii_case(team) || self.away.eq_ignore_ascii_case(team)
    }

    /// Day the game is played on in `tz`; the published date when there is no kickoff time
    pub fn local_date(&self, tz: Tz) -> Option<NaiveDate> {
        self.start_time
            .map(|kickoff| kickoff.with_timezone(&tz).date_naive())
            .or(self.date)
    }

    /// Decode a schedule payload, skipping records without teams or a usable date
    pub fn parse_schedule(records: Vec<serde_json::Value>) -> (Vec<Game>, usize) {
        let total = records.len();
        let games: Vec<Game> = records
            .into_iter()
            .filter_map(|record| serde_json::from_value::<Game>(record).ok())
            .filter(|game| game.date.is_some() || game.start_time.is_some())
            .collect();
        let skipped = total - games.len();
        (games, skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snake_order_even_teams() {
        let first = PickPosition::snake(7, 10).unwrap();
        assert_eq!((first.round, first.pick_in_round, first.slot), (1, 7, 7));

        let second = PickPosition::snake(17, 10).unwrap();
        assert_eq!((second.round, second.pick_in_round, second.slot), (2, 7, 4));

        let turn = PickPosition::snake(11, 10).unwrap();
        assert_eq!(turn.slot, 10);
        let round_three = PickPosition::snake(21, 10).unwrap();
        assert_eq!((round_three.round, round_three.slot), (3, 1));
    }

    #[test]
    fn test_snake_order_odd_teams() {
        let pos = PickPosition::snake(10, 9).unwrap();
        assert_eq!((pos.round, pos.pick_in_round, pos.slot), (2, 1, 9));

        let last_of_round_two = PickPosition::snake(18, 9).unwrap();
        assert_eq!(last_of_round_two.slot, 1);
    }

    #[test]
    fn test_snake_order_rejects_empty_draft() {
        assert!(PickPosition::snake(1, 0).is_none());
        assert!(PickPosition::snake(0, 10).is_none());
    }

    #[test]
    fn test_parse_schedule_accepts_date_only_records() {
        let records: Vec<serde_json::Value> = serde_json::from_str(
            r#"[
                {"week":1,"date":"2025-09-04","home":"PHI","away":"DAL","status":"complete","game_id":"202510101"},
                {"week":1,"home":"KC","away":"LAC","start_time":1757117100000},
                {"week":1,"date":"TBD","home":"SF","away":"SEA"},
                {"week":1,"date":"2025-09-07"}
            ]"#,
        )
        .unwrap();

        let (games, skipped) = Game::parse_schedule(records);
        assert_eq!(skipped, 2);
        assert_eq!(games.len(), 2);
        assert_eq!(games[0].date, NaiveDate::from_ymd_opt(2025, 9, 4));
        assert!(games[0].start_time.is_none());
        assert!(games[1].start_time.is_some());
    }

    #[test]
    fn test_local_date_prefers_kickoff() {
        let late = Game {
            week: 1,
            home: "LV".to_string(),
            away: "DEN".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 9, 8),
            start_time: Some(Utc.with_ymd_and_hms(2025, 9, 9, 1, 15, 0).unwrap()),
        };
        let ny: Tz = "America/New_York".parse().unwrap();
        assert_eq!(late.local_date(ny), NaiveDate::from_ymd_opt(2025, 9, 8));
        assert_eq!(late.local_date(Tz::UTC), NaiveDate::from_ymd_opt(2025, 9, 9));

        let date_only = Game {
            start_time: None,
            ..late
        };
        assert_eq!(date_only.local_date(Tz::UTC), NaiveDate::from_ymd_opt(2025, 9, 8));
    }

    #[test]
    fn test_parse_draft() {
        let json = r#"{
            "draft_id": "1001",
            "status": "drafting",
            "type": "snake",
            "start_time": 1725580800000,
            "settings": {"teams": 12, "rounds": 15, "pick_timer": 90, "slots_wr": 2},
            "draft_order": {"u1": 1, "u2": 2}
        }"#;

        let draft: Draft = serde_json::from_str(json).unwrap();
        assert_eq!(draft.status, DraftStatus::InProgress);
        assert_eq!(draft.settings.teams, 12);
        assert_eq!(draft.settings.pick_timer, 90);
        assert_eq!(draft.slot_owner(2), Some("u2"));
        assert_eq!(draft.slot_owner(3), None);
        assert_eq!(
            draft.start_time().unwrap(),
            Utc.with_ymd_and_hms(2024, 9, 6, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_parse_draft_with_nulls() {
        let json = r#"{
            "draft_id": "1002",
            "status": "pre_draft",
            "start_time": null,
            "draft_order": null
        }"#;

        let draft: Draft = serde_json::from_str(json).unwrap();
        assert_eq!(draft.status, DraftStatus::PreDraft);
        assert!(draft.start_time().is_none());
        assert!(draft.slot_owner(1).is_none());
    }

    #[test]
    fn test_parse_state() {
        let json = r#"{"week": 3, "season": "2025", "season_type": "regular", "season_start_date": "2025-09-04"}"#;
        let state: SportState = serde_json::from_str(json).unwrap();
        assert_eq!(state.week, 3);
        assert!(state.season_started(NaiveDate::from_ymd_opt(2025, 9, 4).unwrap()));
        assert!(!state.season_started(NaiveDate::from_ymd_opt(2025, 9, 3).unwrap()));

        let offseason: SportState =
            serde_json::from_str(r#"{"week": 0, "season": "2026", "season_start_date": null}"#)
                .unwrap();
        assert!(offseason.season_start_date.is_none());
    }

    #[test]
    fn test_injury_classification() {
        let player = |status: Option<&str>| Player {
            first_name: Some("A".to_string()),
            last_name: Some("B".to_string()),
            team: Some("KC".to_string()),
            injury_status: status.map(|s| s.to_string()),
        };

        assert!(player(Some("Out")).has_concerning_injury());
        assert!(player(Some("IR")).has_concerning_injury());
        assert!(player(Some("Doubtful")).has_concerning_injury());
        assert!(!player(Some("Questionable")).has_concerning_injury());
        assert!(!player(None).has_concerning_injury());
    }

    #[test]
    fn test_player_name_fallbacks() {
        let defense = Player {
            last_name: Some("Chiefs".to_string()),
            ..Default::default()
        };
        assert_eq!(defense.full_name(), "Chiefs");
        assert_eq!(Player::default().full_name(), "Unknown player");
    }
}
