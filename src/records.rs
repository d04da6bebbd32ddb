use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LineupError;

pub const DEFAULT_DIFFICULTY: u8 = 3;
pub const DEFAULT_STRENGTH: f64 = 50.0;
pub const DEFAULT_PRICE: f64 = 5.0;
pub const DEFAULT_CHANCE_PLAYING: u8 = 100;
pub const INJURY_CHANCE_THRESHOLD: u8 = 75;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Position {
    #[serde(rename = "GK")]
    Goalkeeper,
    #[serde(rename = "DEF")]
    Defender,
    #[serde(rename = "MID")]
    Midfielder,
    #[serde(rename = "FWD")]
    Forward,
}

impl Position {
    /// Fill order used by both selectors.
    pub const ALL: [Position; 4] = [
        Position::Goalkeeper,
        Position::Defender,
        Position::Midfielder,
        Position::Forward,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Position::Goalkeeper => "GK",
            Position::Defender => "DEF",
            Position::Midfielder => "MID",
            Position::Forward => "FWD",
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Position {
    type Err = LineupError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "GK" => Ok(Position::Goalkeeper),
            "DEF" => Ok(Position::Defender),
            "MID" => Ok(Position::Midfielder),
            "FWD" => Ok(Position::Forward),
            other => Err(LineupError::validation(format!(
                "unknown position token {other:?}"
            ))),
        }
    }
}

/// One player's observed performance in one gameweek.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatRecord {
    pub week: u32,
    pub player_id: u32,
    pub team_id: u32,
    pub opponent_team_id: Option<u32>,
    pub was_home: bool,
    pub difficulty: u8,
    pub started: bool,
    pub minutes: u32,
    pub total_points: i32,
    pub goals: u32,
    pub assists: u32,
    pub clean_sheet: u32,
    pub saves: u32,
    pub yellow: u32,
    pub red: u32,
    pub bonus: u32,
    pub bps: i32,
    pub influence: f64,
    pub creativity: f64,
    pub threat: f64,
    pub ict_index: f64,
    pub xg: f64,
    pub xa: f64,
}

impl StatRecord {
    /// Blank appearance used as a base by loaders and tests.
    pub fn empty(week: u32, player_id: u32, team_id: u32) -> Self {
        Self {
            week,
            player_id,
            team_id,
            opponent_team_id: None,
            was_home: false,
            difficulty: DEFAULT_DIFFICULTY,
            started: false,
            minutes: 0,
            total_points: 0,
            goals: 0,
            assists: 0,
            clean_sheet: 0,
            saves: 0,
            yellow: 0,
            red: 0,
            bonus: 0,
            bps: 0,
            influence: 0.0,
            creativity: 0.0,
            threat: 0.0,
            ict_index: 0.0,
            xg: 0.0,
            xa: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: u32,
    pub name: String,
    pub short_name: Option<String>,
    pub strength_attack: f64,
    pub strength_defense: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub id: u32,
    pub name: String,
    pub team_id: u32,
    pub position: Position,
    pub price: f64,
    pub status: String,
    pub chance_playing_next: Option<u8>,
}

impl PlayerInfo {
    /// Flagged when the player is not fit or is unlikely to play next week.
    pub fn injury_flag(&self) -> bool {
        let chance = self.chance_playing_next.unwrap_or(DEFAULT_CHANCE_PLAYING);
        self.status != "fit" || chance < INJURY_CHANCE_THRESHOLD
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledFixture {
    pub id: u32,
    pub week: u32,
    pub home_team_id: u32,
    pub away_team_id: u32,
    pub home_difficulty: Option<u8>,
    pub away_difficulty: Option<u8>,
}

/// Fixture as seen from one side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixtureSide {
    pub fixture_id: u32,
    pub opponent_team_id: u32,
    pub is_home: bool,
    pub difficulty: u8,
}

impl ScheduledFixture {
    pub fn side_for(&self, team_id: u32) -> Option<FixtureSide> {
        if self.home_team_id == team_id {
            Some(FixtureSide {
                fixture_id: self.id,
                opponent_team_id: self.away_team_id,
                is_home: true,
                difficulty: self.home_difficulty.unwrap_or(DEFAULT_DIFFICULTY),
            })
        } else if self.away_team_id == team_id {
            Some(FixtureSide {
                fixture_id: self.id,
                opponent_team_id: self.home_team_id,
                is_home: false,
                difficulty: self.away_difficulty.unwrap_or(DEFAULT_DIFFICULTY),
            })
        } else {
            None
        }
    }
}

/// Static registry the feature pipeline joins against. Built once per call
/// by the data collaborator and only ever read.
#[derive(Debug, Clone, Default)]
pub struct LeagueSnapshot {
    teams: HashMap<u32, Team>,
    players: HashMap<u32, PlayerInfo>,
    fixtures: Vec<ScheduledFixture>,
}

impl LeagueSnapshot {
    pub fn new(teams: Vec<Team>, players: Vec<PlayerInfo>, fixtures: Vec<ScheduledFixture>) -> Self {
        let mut fixtures = fixtures;
        fixtures.sort_by_key(|f| (f.week, f.id));
        Self {
            teams: teams.into_iter().map(|t| (t.id, t)).collect(),
            players: players.into_iter().map(|p| (p.id, p)).collect(),
            fixtures,
        }
    }

    pub fn team(&self, id: u32) -> Option<&Team> {
        self.teams.get(&id)
    }

    pub fn player(&self, id: u32) -> Option<&PlayerInfo> {
        self.players.get(&id)
    }

    /// Registered players ordered by id.
    pub fn players(&self) -> Vec<&PlayerInfo> {
        let mut out: Vec<&PlayerInfo> = self.players.values().collect();
        out.sort_by_key(|p| p.id);
        out
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn fixtures(&self) -> &[ScheduledFixture] {
        &self.fixtures
    }

    pub fn fixtures_in_week(&self, week: u32) -> impl Iterator<Item = &ScheduledFixture> {
        self.fixtures.iter().filter(move |f| f.week == week)
    }

    pub fn attack_strength(&self, team_id: u32) -> f64 {
        self.team(team_id)
            .map(|t| t.strength_attack)
            .unwrap_or(DEFAULT_STRENGTH)
    }

    pub fn defense_strength(&self, team_id: u32) -> f64 {
        self.team(team_id)
            .map(|t| t.strength_defense)
            .unwrap_or(DEFAULT_STRENGTH)
    }
}
