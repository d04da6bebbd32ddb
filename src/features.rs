//! Leakage-safe temporal features.
//!
//! Records are grouped per player into week-ordered sequences. Each row is
//! built from the rolling state *before* the row's own record is pushed, so
//! a player's n-th appearance only ever sees their first n-1 appearances.

use std::collections::{BTreeMap, VecDeque};

use log::debug;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::records::{DEFAULT_PRICE, DEFAULT_STRENGTH, LeagueSnapshot, Position, StatRecord};

pub const SHORT_WINDOW: usize = 3;
pub const LONG_WINDOW: usize = 5;
pub const STAT_COUNT: usize = 12;

pub const CONTEXT_COLUMNS: [&str; 7] = [
    "is_home",
    "difficulty",
    "opp_strength_def",
    "team_att",
    "team_def",
    "injury_flag",
    "price",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RolledStat {
    Minutes,
    TotalPoints,
    Goals,
    Assists,
    Xg,
    Xa,
    IctIndex,
    Influence,
    Creativity,
    Threat,
    Bonus,
    Bps,
}

impl RolledStat {
    pub const ALL: [RolledStat; STAT_COUNT] = [
        RolledStat::Minutes,
        RolledStat::TotalPoints,
        RolledStat::Goals,
        RolledStat::Assists,
        RolledStat::Xg,
        RolledStat::Xa,
        RolledStat::IctIndex,
        RolledStat::Influence,
        RolledStat::Creativity,
        RolledStat::Threat,
        RolledStat::Bonus,
        RolledStat::Bps,
    ];

    pub fn column_prefix(self) -> &'static str {
        match self {
            RolledStat::Minutes => "minutes",
            // Kept under the label name used when the models were first fitted.
            RolledStat::TotalPoints => "expected_points_actual",
            RolledStat::Goals => "goals",
            RolledStat::Assists => "assists",
            RolledStat::Xg => "xg",
            RolledStat::Xa => "xa",
            RolledStat::IctIndex => "ict_index",
            RolledStat::Influence => "influence",
            RolledStat::Creativity => "creativity",
            RolledStat::Threat => "threat",
            RolledStat::Bonus => "bonus",
            RolledStat::Bps => "bps",
        }
    }

    pub fn value(self, r: &StatRecord) -> f64 {
        match self {
            RolledStat::Minutes => r.minutes as f64,
            RolledStat::TotalPoints => r.total_points as f64,
            RolledStat::Goals => r.goals as f64,
            RolledStat::Assists => r.assists as f64,
            RolledStat::Xg => r.xg,
            RolledStat::Xa => r.xa,
            RolledStat::IctIndex => r.ict_index,
            RolledStat::Influence => r.influence,
            RolledStat::Creativity => r.creativity,
            RolledStat::Threat => r.threat,
            RolledStat::Bonus => r.bonus as f64,
            RolledStat::Bps => r.bps as f64,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowStats {
    pub avg_3: f64,
    pub avg_5: f64,
    pub trend: f64,
}

/// Capped buffer of a player's most recent observations.
#[derive(Debug, Clone, Default)]
pub struct RollingWindow {
    recent: VecDeque<[f64; STAT_COUNT]>,
}

impl RollingWindow {
    pub fn push(&mut self, record: &StatRecord) {
        let mut values = [0.0; STAT_COUNT];
        for stat in RolledStat::ALL {
            values[stat.index()] = stat.value(record);
        }
        if self.recent.len() == LONG_WINDOW {
            self.recent.pop_front();
        }
        self.recent.push_back(values);
    }

    pub fn observations(&self) -> usize {
        self.recent.len()
    }

    /// Trailing means over whatever history exists (partial windows allowed).
    /// No history yields all zeros.
    pub fn snapshot(&self) -> [WindowStats; STAT_COUNT] {
        let mut out = [WindowStats::default(); STAT_COUNT];
        let n = self.recent.len();
        if n == 0 {
            return out;
        }
        let short_n = n.min(SHORT_WINDOW);
        for (idx, stats) in out.iter_mut().enumerate() {
            let long_sum: f64 = self.recent.iter().map(|v| v[idx]).sum();
            let short_sum: f64 = self.recent.iter().skip(n - short_n).map(|v| v[idx]).sum();
            stats.avg_3 = short_sum / short_n as f64;
            stats.avg_5 = long_sum / n as f64;
            stats.trend = stats.avg_3 - stats.avg_5;
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContextFeatures {
    pub is_home: bool,
    pub difficulty: f64,
    pub opp_strength_def: f64,
    pub team_att: f64,
    pub team_def: f64,
    pub injury_flag: bool,
    pub price: f64,
}

impl ContextFeatures {
    fn values(&self) -> [f64; 7] {
        [
            bool_to_f64(self.is_home),
            self.difficulty,
            self.opp_strength_def,
            self.team_att,
            self.team_def,
            bool_to_f64(self.injury_flag),
            self.price,
        ]
    }
}

/// Model-ready row for one (player, week).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub player_id: u32,
    pub week: u32,
    pub team_id: u32,
    pub position: Option<Position>,
    pub opponent_team_id: Option<u32>,
    pub rolling: [WindowStats; STAT_COUNT],
    pub context: ContextFeatures,
}

impl FeatureRow {
    /// Column names in the order `values` emits them.
    pub fn column_names() -> Vec<String> {
        let mut names = Vec::with_capacity(STAT_COUNT * 3 + CONTEXT_COLUMNS.len());
        for stat in RolledStat::ALL {
            let prefix = stat.column_prefix();
            names.push(format!("{prefix}_avg_3"));
            names.push(format!("{prefix}_avg_5"));
            names.push(format!("{prefix}_trend"));
        }
        names.extend(CONTEXT_COLUMNS.iter().map(|c| c.to_string()));
        names
    }

    pub fn values(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(STAT_COUNT * 3 + CONTEXT_COLUMNS.len());
        for w in &self.rolling {
            out.extend([w.avg_3, w.avg_5, w.trend]);
        }
        out.extend(self.context.values());
        out
    }

    pub fn stat(&self, stat: RolledStat) -> WindowStats {
        self.rolling[stat.index()]
    }
}

/// Groups records per player into week-ordered sequences.
pub fn group_by_player(history: &[StatRecord]) -> BTreeMap<u32, Vec<&StatRecord>> {
    let mut by_player: BTreeMap<u32, Vec<&StatRecord>> = BTreeMap::new();
    for record in history {
        by_player.entry(record.player_id).or_default().push(record);
    }
    for seq in by_player.values_mut() {
        seq.sort_by_key(|r| r.week);
    }
    by_player
}

/// Rolling state after consuming every record in `seq`.
pub fn rolling_state(seq: &[&StatRecord]) -> RollingWindow {
    let mut window = RollingWindow::default();
    for record in seq {
        window.push(record);
    }
    window
}

/// One row per historical record, ordered by (player, week).
pub fn assemble_features(history: &[StatRecord], league: &LeagueSnapshot) -> Vec<FeatureRow> {
    let by_player = group_by_player(history);
    let sequences: Vec<(u32, Vec<&StatRecord>)> = by_player.into_iter().collect();

    let rows: Vec<FeatureRow> = sequences
        .par_iter()
        .flat_map_iter(|(_, seq)| player_rows(seq, league))
        .collect();
    debug!(
        "assembled {} feature rows for {} players",
        rows.len(),
        sequences.len()
    );
    rows
}

fn player_rows(seq: &[&StatRecord], league: &LeagueSnapshot) -> Vec<FeatureRow> {
    let mut window = RollingWindow::default();
    let mut out = Vec::with_capacity(seq.len());
    for record in seq {
        out.push(FeatureRow {
            player_id: record.player_id,
            week: record.week,
            team_id: record.team_id,
            position: league.player(record.player_id).map(|p| p.position),
            opponent_team_id: record.opponent_team_id,
            rolling: window.snapshot(),
            context: historical_context(record, league),
        });
        window.push(record);
    }
    out
}

fn historical_context(record: &StatRecord, league: &LeagueSnapshot) -> ContextFeatures {
    let player = league.player(record.player_id);
    ContextFeatures {
        is_home: record.was_home,
        difficulty: record.difficulty as f64,
        opp_strength_def: record
            .opponent_team_id
            .map(|id| league.defense_strength(id))
            .unwrap_or(DEFAULT_STRENGTH),
        team_att: league.attack_strength(record.team_id),
        team_def: league.defense_strength(record.team_id),
        injury_flag: player.is_some_and(|p| p.injury_flag()),
        price: player.map(|p| p.price).unwrap_or(DEFAULT_PRICE),
    }
}

fn bool_to_f64(v: bool) -> f64 {
    if v { 1.0 } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(week: u32, player_id: u32, minutes: u32, points: i32) -> StatRecord {
        let mut r = StatRecord::empty(week, player_id, 1);
        r.minutes = minutes;
        r.total_points = points;
        r
    }

    #[test]
    fn window_snapshot_is_zero_without_history() {
        let window = RollingWindow::default();
        for stats in window.snapshot() {
            assert_eq!(stats, WindowStats::default());
        }
    }

    #[test]
    fn window_keeps_only_the_long_horizon() {
        let mut window = RollingWindow::default();
        for week in 1..=7 {
            window.push(&record(week, 1, week * 10, 0));
        }
        assert_eq!(window.observations(), LONG_WINDOW);
        let minutes = window.snapshot()[RolledStat::Minutes.index()];
        // Last five: 30..70, last three: 50..70.
        assert!((minutes.avg_5 - 50.0).abs() < 1e-12);
        assert!((minutes.avg_3 - 60.0).abs() < 1e-12);
        assert!((minutes.trend - 10.0).abs() < 1e-12);
    }

    #[test]
    fn column_names_match_value_width() {
        let names = FeatureRow::column_names();
        assert_eq!(names.len(), STAT_COUNT * 3 + CONTEXT_COLUMNS.len());
        assert_eq!(names[0], "minutes_avg_3");
        assert_eq!(names[5], "expected_points_actual_trend");
        assert_eq!(names.last().map(String::as_str), Some("price"));
    }

    #[test]
    fn rows_are_shifted_within_each_player() {
        let history = vec![
            record(1, 7, 90, 6),
            record(4, 7, 30, 2),
            record(2, 8, 60, 1),
        ];
        let rows = assemble_features(&history, &LeagueSnapshot::default());
        assert_eq!(rows.len(), 3);

        let first = rows.iter().find(|r| r.player_id == 7 && r.week == 1).unwrap();
        assert_eq!(first.stat(RolledStat::Minutes), WindowStats::default());

        // Week 4 is the player's second appearance and sees week 1 only.
        let second = rows.iter().find(|r| r.player_id == 7 && r.week == 4).unwrap();
        let pts = second.stat(RolledStat::TotalPoints);
        assert_eq!(pts.avg_3, 6.0);
        assert_eq!(pts.avg_5, 6.0);
        assert_eq!(pts.trend, 0.0);

        let other = rows.iter().find(|r| r.player_id == 8).unwrap();
        assert_eq!(other.stat(RolledStat::Minutes), WindowStats::default());
    }
}
