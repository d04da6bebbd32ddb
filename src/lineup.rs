//! Predictive lineup selector: greedy over `expected_points * start_probability`
//! under budget, team cap and formation quotas.
//!
//! Picks are never revisited. When the positional pass leaves slots open, a
//! second pass fills them from the whole ranked pool regardless of position,
//! and anything still open is reported as `shortfall`.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::LineupError;
use crate::formation::Formation;
use crate::records::Position;
use crate::roster::{LineupPlayer, LineupResult, RosterState, by_score_then_id, validate_cap};

pub const INJURED_STATUS: &str = "injured";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectedCandidate {
    pub player_id: u32,
    pub team_id: u32,
    pub position: Position,
    pub price: f64,
    pub start_probability: f64,
    pub expected_points: f64,
    pub status: String,
}

impl ProjectedCandidate {
    pub fn score(&self) -> f64 {
        self.expected_points * self.start_probability
    }

    fn check_projection(&self) -> Result<(), LineupError> {
        if !(0.0..=1.0).contains(&self.start_probability) {
            return Err(LineupError::validation(format!(
                "player {}: start probability {} is outside [0, 1]",
                self.player_id, self.start_probability
            )));
        }
        if !self.expected_points.is_finite() {
            return Err(LineupError::validation(format!(
                "player {}: expected points {} is not finite",
                self.player_id, self.expected_points
            )));
        }
        Ok(())
    }

    fn is_injured(&self) -> bool {
        self.status.trim().eq_ignore_ascii_case(INJURED_STATUS)
    }

    fn to_pick(&self, fallback: bool) -> LineupPlayer {
        LineupPlayer {
            player_id: self.player_id,
            team_id: self.team_id,
            position: self.position,
            price: self.price,
            start_probability: Some(self.start_probability),
            expected_points: Some(self.expected_points),
            total_points: None,
            score: self.score(),
            fallback,
        }
    }
}

pub fn generate_optimal_lineup(
    candidates: &[ProjectedCandidate],
    formation: &Formation,
    budget: f64,
    max_per_team: u32,
) -> Result<LineupResult, LineupError> {
    if !budget.is_finite() || budget < 0.0 {
        return Err(LineupError::validation(format!(
            "budget must be a non-negative amount, got {budget}"
        )));
    }
    validate_cap(max_per_team)?;
    for c in candidates {
        c.check_projection()?;
    }

    let mut ranked: Vec<&ProjectedCandidate> =
        candidates.iter().filter(|c| !c.is_injured()).collect();
    if ranked.is_empty() {
        return Err(LineupError::unavailable(
            "no eligible candidates after removing injured players",
        ));
    }
    ranked.sort_by(|a, b| by_score_then_id((a.score(), a.player_id), (b.score(), b.player_id)));

    let mut state = RosterState::new(formation, Some(budget), max_per_team);

    for position in Position::ALL {
        for c in ranked.iter().filter(|c| c.position == position) {
            if state.remaining(position) == 0 {
                break;
            }
            if state.admits(c.player_id, c.team_id, c.price) {
                state.take(c.to_pick(false), position);
            }
        }
    }

    if state.open_slots() > 0 {
        warn!(
            "{formation}: {} slots open after positional pass, filling regardless of position",
            state.open_slots()
        );
        for c in &ranked {
            let Some(slot) = state.first_open_slot() else {
                break;
            };
            if state.admits(c.player_id, c.team_id, c.price) {
                state.take(c.to_pick(true), slot);
            }
        }
    }

    let result = state.finish(formation);
    if result.shortfall > 0 {
        warn!(
            "{formation}: lineup is {} players short of {}",
            result.shortfall,
            formation.total_players()
        );
    }
    debug!(
        "{formation}: picked {} players, spend {:.1}/{budget:.1}, score {:.2}",
        result.len(),
        result.total_spend,
        result.total_score
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(id: u32, team_id: u32, position: Position, price: f64, ep: f64) -> ProjectedCandidate {
        ProjectedCandidate {
            player_id: id,
            team_id,
            position,
            price,
            start_probability: 1.0,
            expected_points: ep,
            status: "fit".to_string(),
        }
    }

    #[test]
    fn score_weights_points_by_start_probability() {
        let mut c = cand(1, 1, Position::Forward, 8.0, 6.0);
        c.start_probability = 0.5;
        assert_eq!(c.score(), 3.0);
    }

    #[test]
    fn fallback_fills_from_other_positions() {
        let formation = Formation::parse("1-0-0").unwrap();
        let pool = vec![
            cand(1, 1, Position::Goalkeeper, 4.0, 3.0),
            cand(2, 2, Position::Midfielder, 5.0, 6.0),
        ];
        let result = generate_optimal_lineup(&pool, &formation, 100.0, 3).unwrap();
        assert_eq!(result.len(), 2);
        let def_slot = result.players.iter().find(|p| p.player_id == 2).unwrap();
        assert!(def_slot.fallback);
        assert_eq!(result.shortfall, 0);
    }

    #[test]
    fn negative_budget_and_zero_cap_are_rejected() {
        let pool = vec![cand(1, 1, Position::Goalkeeper, 4.0, 3.0)];
        let f = Formation::default();
        assert!(matches!(
            generate_optimal_lineup(&pool, &f, -1.0, 3),
            Err(LineupError::Validation(_))
        ));
        assert!(matches!(
            generate_optimal_lineup(&pool, &f, 10.0, 0),
            Err(LineupError::Validation(_))
        ));
    }
}
