//! Serving path: one feature row per registered player for a target week.

use log::{debug, warn};

use crate::error::LineupError;
use crate::features::{ContextFeatures, FeatureRow, RollingWindow, group_by_player, rolling_state};
use crate::records::{
    DEFAULT_DIFFICULTY, DEFAULT_STRENGTH, FixtureSide, LeagueSnapshot, PlayerInfo, StatRecord,
};

/// Builds serving rows for `target_week` using only history strictly before it.
///
/// Players without history get all-zero rolling features; players whose team
/// has no scheduled fixture get neutral context.
pub fn features_for_week(
    history: &[StatRecord],
    league: &LeagueSnapshot,
    target_week: u32,
) -> Result<Vec<FeatureRow>, LineupError> {
    let prior: Vec<StatRecord> = history
        .iter()
        .filter(|r| r.week < target_week)
        .cloned()
        .collect();
    if prior.is_empty() {
        return Err(LineupError::unavailable(format!(
            "no stat history before gameweek {target_week}"
        )));
    }
    if league.player_count() == 0 {
        return Err(LineupError::unavailable("no registered players"));
    }

    let by_player = group_by_player(&prior);
    let mut missing_fixture = 0usize;
    let mut rows = Vec::with_capacity(league.player_count());

    for player in league.players() {
        // Every record before the target week is rolled in, including the
        // latest one. Reusing the last training row's shifted window instead
        // would drop that most recent appearance.
        let window = by_player
            .get(&player.id)
            .map(|seq| rolling_state(seq))
            .unwrap_or_default();
        let side = fixture_side(league, player.team_id, target_week);
        if side.is_none() {
            missing_fixture += 1;
        }
        rows.push(serving_row(player, league, target_week, &window, side));
    }

    if missing_fixture > 0 {
        warn!(
            "gameweek {target_week}: {missing_fixture} players without a scheduled fixture, using neutral context"
        );
    }
    debug!("gameweek {target_week}: built {} serving rows", rows.len());
    Ok(rows)
}

/// First fixture (lowest id) for the team in that week.
pub fn fixture_side(league: &LeagueSnapshot, team_id: u32, week: u32) -> Option<FixtureSide> {
    let mut sides = league
        .fixtures_in_week(week)
        .filter_map(|f| f.side_for(team_id))
        .collect::<Vec<_>>();
    sides.sort_by_key(|s| s.fixture_id);
    if sides.len() > 1 {
        warn!(
            "team {team_id} has {} fixtures in gameweek {week}, using fixture {}",
            sides.len(),
            sides[0].fixture_id
        );
    }
    sides.into_iter().next()
}

fn serving_row(
    player: &PlayerInfo,
    league: &LeagueSnapshot,
    week: u32,
    window: &RollingWindow,
    side: Option<FixtureSide>,
) -> FeatureRow {
    let (is_home, difficulty, opponent, opp_strength_def) = match side {
        Some(side) => (
            side.is_home,
            side.difficulty,
            Some(side.opponent_team_id),
            league.defense_strength(side.opponent_team_id),
        ),
        None => (false, DEFAULT_DIFFICULTY, None, DEFAULT_STRENGTH),
    };

    FeatureRow {
        player_id: player.id,
        week,
        team_id: player.team_id,
        position: Some(player.position),
        opponent_team_id: opponent,
        rolling: window.snapshot(),
        context: ContextFeatures {
            is_home,
            difficulty: difficulty as f64,
            opp_strength_def,
            team_att: league.attack_strength(player.team_id),
            team_def: league.defense_strength(player.team_id),
            injury_flag: player.injury_flag(),
            price: player.price,
        },
    }
}
