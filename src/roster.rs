//! Constraint bookkeeping shared by both lineup selectors.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::LineupError;
use crate::formation::{Formation, slot_index};
use crate::records::Position;

/// One selected player as reported back to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineupPlayer {
    pub player_id: u32,
    pub team_id: u32,
    pub position: Position,
    pub price: f64,
    pub start_probability: Option<f64>,
    pub expected_points: Option<f64>,
    pub total_points: Option<i32>,
    pub score: f64,
    /// Picked by the position-agnostic fallback pass.
    #[serde(default)]
    pub fallback: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineupResult {
    pub formation: String,
    pub players: Vec<LineupPlayer>,
    pub total_spend: f64,
    pub total_points: f64,
    pub total_score: f64,
    #[serde(default)]
    pub shortfall: u32,
}

impl LineupResult {
    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn count_at(&self, position: Position) -> usize {
        self.players.iter().filter(|p| p.position == position).count()
    }
}

pub fn validate_cap(max_per_team: u32) -> Result<(), LineupError> {
    if max_per_team == 0 {
        return Err(LineupError::validation("max_per_team must be at least 1"));
    }
    Ok(())
}

/// Descending score, then player id ascending.
pub fn by_score_then_id(a: (f64, u32), b: (f64, u32)) -> Ordering {
    b.0.total_cmp(&a.0).then(a.1.cmp(&b.1))
}

/// Running state of one selection: who is in, per-team counts, spend and
/// what each position still needs.
#[derive(Debug, Clone)]
pub struct RosterState {
    picked: HashSet<u32>,
    team_counts: HashMap<u32, u32>,
    remaining: [u32; 4],
    spent: f64,
    budget: Option<f64>,
    max_per_team: u32,
    players: Vec<LineupPlayer>,
}

impl RosterState {
    pub fn new(formation: &Formation, budget: Option<f64>, max_per_team: u32) -> Self {
        let mut remaining = [0; 4];
        for (position, quota) in formation.quotas() {
            remaining[slot_index(position)] = quota;
        }
        Self {
            picked: HashSet::new(),
            team_counts: HashMap::new(),
            remaining,
            spent: 0.0,
            budget,
            max_per_team,
            players: Vec::new(),
        }
    }

    pub fn remaining(&self, position: Position) -> u32 {
        self.remaining[slot_index(position)]
    }

    pub fn open_slots(&self) -> u32 {
        self.remaining.iter().sum()
    }

    pub fn spent(&self) -> f64 {
        self.spent
    }

    pub fn team_full(&self, team_id: u32) -> bool {
        self.team_counts.get(&team_id).copied().unwrap_or(0) >= self.max_per_team
    }

    /// Uniqueness, team cap and budget. Quota is checked by the caller since
    /// the fallback pass ignores it.
    pub fn admits(&self, player_id: u32, team_id: u32, price: f64) -> bool {
        if self.picked.contains(&player_id) || self.team_full(team_id) {
            return false;
        }
        match self.budget {
            Some(budget) => self.spent + price <= budget,
            None => true,
        }
    }

    /// Records the pick against `slot`, the quota it consumes.
    pub fn take(&mut self, player: LineupPlayer, slot: Position) {
        let idx = slot_index(slot);
        self.remaining[idx] = self.remaining[idx].saturating_sub(1);
        self.picked.insert(player.player_id);
        *self.team_counts.entry(player.team_id).or_insert(0) += 1;
        self.spent += player.price;
        self.players.push(player);
    }

    /// First position (in fill order) that still has an open slot.
    pub fn first_open_slot(&self) -> Option<Position> {
        Position::ALL.into_iter().find(|p| self.remaining(*p) > 0)
    }

    pub fn finish(self, formation: &Formation) -> LineupResult {
        let shortfall = self.open_slots();
        let total_points = self
            .players
            .iter()
            .map(|p| {
                p.expected_points
                    .or(p.total_points.map(f64::from))
                    .unwrap_or(0.0)
            })
            .sum();
        let total_score = self.players.iter().map(|p| p.score).sum();
        LineupResult {
            formation: formation.name().to_string(),
            players: self.players,
            total_spend: self.spent,
            total_points,
            total_score,
            shortfall,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(id: u32, team_id: u32, price: f64) -> LineupPlayer {
        LineupPlayer {
            player_id: id,
            team_id,
            position: Position::Midfielder,
            price,
            start_probability: None,
            expected_points: Some(1.0),
            total_points: None,
            score: 1.0,
            fallback: false,
        }
    }

    #[test]
    fn admits_enforces_cap_budget_and_uniqueness() {
        let formation = Formation::default();
        let mut state = RosterState::new(&formation, Some(10.0), 1);
        assert!(state.admits(1, 1, 6.0));
        state.take(player(1, 1, 6.0), Position::Midfielder);
        assert!(!state.admits(1, 2, 1.0), "already picked");
        assert!(!state.admits(2, 1, 1.0), "team full");
        assert!(!state.admits(3, 2, 4.5), "over budget");
        assert!(state.admits(3, 2, 4.0));
        assert_eq!(state.remaining(Position::Midfielder), 3);
    }

    #[test]
    fn ordering_breaks_ties_by_id() {
        let mut v = vec![(2.0, 9), (3.0, 4), (2.0, 1)];
        v.sort_by(|a, b| by_score_then_id(*a, *b));
        assert_eq!(v, vec![(3.0, 4), (2.0, 1), (2.0, 9)]);
    }

    #[test]
    fn finish_reports_shortfall() {
        let formation = Formation::default();
        let mut state = RosterState::new(&formation, None, 3);
        state.take(player(1, 1, 5.0), Position::Goalkeeper);
        let result = state.finish(&formation);
        assert_eq!(result.shortfall, 10);
        assert_eq!(result.total_spend, 5.0);
        assert_eq!(result.total_points, 1.0);
    }
}
