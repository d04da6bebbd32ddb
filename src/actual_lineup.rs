//! Retrospective lineup selector: the best lineup a week actually produced,
//! scored by realized points. Each position is filled only from its own
//! players; an unmeetable quota is an error.

use std::collections::BTreeMap;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::LineupError;
use crate::formation::Formation;
use crate::records::Position;
use crate::roster::{LineupPlayer, LineupResult, RosterState, by_score_then_id, validate_cap};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealizedCandidate {
    pub player_id: u32,
    pub team_id: u32,
    pub position: Position,
    pub price: f64,
    pub total_points: i32,
}

impl RealizedCandidate {
    fn to_pick(&self) -> LineupPlayer {
        LineupPlayer {
            player_id: self.player_id,
            team_id: self.team_id,
            position: self.position,
            price: self.price,
            start_probability: None,
            expected_points: None,
            total_points: Some(self.total_points),
            score: self.total_points as f64,
            fallback: false,
        }
    }
}

pub fn generate_actual_lineup(
    candidates: &[RealizedCandidate],
    formation: &Formation,
    max_per_team: u32,
) -> Result<LineupResult, LineupError> {
    validate_cap(max_per_team)?;
    if candidates.is_empty() {
        return Err(LineupError::unavailable("no realized results to select from"));
    }

    let mut by_position: BTreeMap<Position, Vec<&RealizedCandidate>> = BTreeMap::new();
    for c in candidates {
        by_position.entry(c.position).or_default().push(c);
    }
    for partition in by_position.values_mut() {
        partition.sort_by(|a, b| {
            by_score_then_id(
                (a.total_points as f64, a.player_id),
                (b.total_points as f64, b.player_id),
            )
        });
    }

    let mut state = RosterState::new(formation, None, max_per_team);
    for position in Position::ALL {
        let partition = by_position.get(&position).map(Vec::as_slice).unwrap_or(&[]);
        for c in partition {
            if state.remaining(position) == 0 {
                break;
            }
            if state.admits(c.player_id, c.team_id, c.price) {
                state.take(c.to_pick(), position);
            }
        }
        if state.remaining(position) > 0 {
            return Err(LineupError::UnderFill { position });
        }
    }

    let result = state.finish(formation);
    debug!(
        "{formation}: best realized lineup scored {:.0} points",
        result.total_points
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(id: u32, team_id: u32, position: Position, pts: i32) -> RealizedCandidate {
        RealizedCandidate {
            player_id: id,
            team_id,
            position,
            price: 5.0,
            total_points: pts,
        }
    }

    #[test]
    fn quota_of_zero_needs_no_candidates() {
        let formation = Formation::parse("0-0-0").unwrap();
        let pool = vec![cand(1, 1, Position::Goalkeeper, 2)];
        let result = generate_actual_lineup(&pool, &formation, 1).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.total_points, 2.0);
    }

    #[test]
    fn missing_goalkeeper_names_goalkeeper() {
        let pool = vec![cand(1, 1, Position::Defender, 2)];
        let err = generate_actual_lineup(&pool, &Formation::default(), 3).unwrap_err();
        assert_eq!(
            err,
            LineupError::UnderFill {
                position: Position::Goalkeeper
            }
        );
    }
}
