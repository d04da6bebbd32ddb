//! Seeded synthetic league: teams, squads, a round-robin schedule and weekly
//! stats scored the FPL way. Used for demos, tests and benches.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::records::{LeagueSnapshot, PlayerInfo, Position, ScheduledFixture, StatRecord, Team};

const TEAM_NAMES: [&str; 20] = [
    "Arsenal", "Aston Villa", "Bournemouth", "Brentford", "Brighton", "Burnley", "Chelsea",
    "Crystal Palace", "Everton", "Fulham", "Leeds", "Liverpool", "Man City", "Man Utd",
    "Newcastle", "Nott'm Forest", "Sunderland", "Spurs", "West Ham", "Wolves",
];

#[derive(Debug, Clone, Copy)]
pub struct SyntheticConfig {
    pub seed: u64,
    pub teams: u32,
    /// Weeks with a schedule. Stats are generated for the first `played_weeks`.
    pub weeks: u32,
    pub played_weeks: u32,
    /// Squad size per position: GK, DEF, MID, FWD.
    pub squad: [u32; 4],
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            teams: 10,
            weeks: 12,
            played_weeks: 10,
            squad: [2, 6, 6, 4],
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyntheticLeague {
    pub teams: Vec<Team>,
    pub players: Vec<PlayerInfo>,
    pub fixtures: Vec<ScheduledFixture>,
    pub records: Vec<StatRecord>,
}

impl SyntheticLeague {
    pub fn generate(cfg: SyntheticConfig) -> Self {
        let mut rng = StdRng::seed_from_u64(cfg.seed);
        let teams = make_teams(&mut rng, cfg.teams);
        let players = make_players(&mut rng, &teams, cfg.squad);
        let fixtures = round_robin(&teams, cfg.weeks);
        let strengths: HashMap<u32, &Team> = teams.iter().map(|t| (t.id, t)).collect();

        let mut records = Vec::new();
        for fixture in fixtures.iter().filter(|f| f.week <= cfg.played_weeks) {
            let (Some(home), Some(away)) = (
                strengths.get(&fixture.home_team_id),
                strengths.get(&fixture.away_team_id),
            ) else {
                continue;
            };
            let home_goals = sample_goals(&mut rng, home.strength_attack + 5.0, away.strength_defense);
            let away_goals = sample_goals(&mut rng, away.strength_attack, home.strength_defense + 5.0);
            for (team, opp, is_home, goals_for, goals_against) in [
                (home, away, true, home_goals, away_goals),
                (away, home, false, away_goals, home_goals),
            ] {
                let squad: Vec<&PlayerInfo> =
                    players.iter().filter(|p| p.team_id == team.id).collect();
                let difficulty = if is_home {
                    fixture.home_difficulty
                } else {
                    fixture.away_difficulty
                };
                records.extend(team_week(
                    &mut rng,
                    fixture.week,
                    team.id,
                    opp.id,
                    is_home,
                    difficulty.unwrap_or(3),
                    &squad,
                    goals_for,
                    goals_against,
                ));
            }
        }

        Self {
            teams,
            players,
            fixtures,
            records,
        }
    }

    pub fn snapshot(&self) -> LeagueSnapshot {
        LeagueSnapshot::new(
            self.teams.clone(),
            self.players.clone(),
            self.fixtures.clone(),
        )
    }
}

/// Fantasy points for one appearance.
#[allow(clippy::too_many_arguments)]
pub fn fpl_like_points(
    position: Position,
    minutes: u32,
    goals: u32,
    assists: u32,
    clean_sheet: u32,
    saves: u32,
    yellow: u32,
    red: u32,
) -> i32 {
    let mut pts = 0i32;
    if minutes >= 60 {
        pts += 2;
    } else if minutes > 0 {
        pts += 1;
    }
    let per_goal = match position {
        Position::Goalkeeper | Position::Defender => 6,
        Position::Midfielder => 5,
        Position::Forward => 4,
    };
    pts += goals as i32 * per_goal;
    pts += assists as i32 * 3;
    if clean_sheet > 0 {
        pts += match position {
            Position::Goalkeeper | Position::Defender => 4,
            Position::Midfielder => 1,
            Position::Forward => 0,
        };
    }
    if position == Position::Goalkeeper {
        pts += (saves / 3) as i32;
    }
    pts - yellow as i32 - red as i32 * 3
}

fn make_teams(rng: &mut StdRng, count: u32) -> Vec<Team> {
    (1..=count)
        .map(|id| {
            let name = TEAM_NAMES
                .get((id - 1) as usize)
                .map(|s| s.to_string())
                .unwrap_or_else(|| format!("Team {id}"));
            let short_name: String = name
                .chars()
                .filter(|c| c.is_ascii_alphabetic())
                .take(3)
                .collect::<String>()
                .to_ascii_uppercase();
            Team {
                id,
                short_name: Some(short_name),
                name,
                strength_attack: rng.gen_range(35.0..85.0_f64).round(),
                strength_defense: rng.gen_range(35.0..85.0_f64).round(),
            }
        })
        .collect()
}

fn make_players(rng: &mut StdRng, teams: &[Team], squad: [u32; 4]) -> Vec<PlayerInfo> {
    let mut out = Vec::new();
    let mut next_id = 1u32;
    for team in teams {
        for (position, count) in Position::ALL.into_iter().zip(squad) {
            for slot in 0..count {
                let base: f64 = match position {
                    Position::Goalkeeper => 4.5,
                    Position::Defender => 4.5,
                    Position::Midfielder => 5.5,
                    Position::Forward => 6.5,
                };
                // First-choice players cost more.
                let premium: f64 = if slot == 0 {
                    rng.gen_range(0.5..3.5)
                } else {
                    rng.gen_range(0.0..1.5)
                };
                let roll: f64 = rng.r#gen();
                let (status, chance) = if roll < 0.04 {
                    ("injured", Some(0))
                } else if roll < 0.09 {
                    ("doubt", Some(50))
                } else {
                    ("fit", None)
                };
                out.push(PlayerInfo {
                    id: next_id,
                    name: format!("{} {}{}", team.short_name.as_deref().unwrap_or("TM"), position.code(), slot + 1),
                    team_id: team.id,
                    position,
                    price: ((base + premium) * 10.0).round() / 10.0,
                    status: status.to_string(),
                    chance_playing_next: chance,
                });
                next_id += 1;
            }
        }
    }
    out
}

/// Circle-method schedule; later cycles swap home and away.
fn round_robin(teams: &[Team], weeks: u32) -> Vec<ScheduledFixture> {
    let mut ids: Vec<Option<u32>> = teams.iter().map(|t| Some(t.id)).collect();
    if ids.len() % 2 == 1 {
        ids.push(None);
    }
    let n = ids.len();
    if n < 2 {
        return Vec::new();
    }
    let strength: HashMap<u32, f64> = teams
        .iter()
        .map(|t| (t.id, (t.strength_attack + t.strength_defense) / 2.0))
        .collect();

    let mut fixtures = Vec::new();
    let mut next_id = 1u32;
    let rounds = (n - 1) as u32;
    for week in 1..=weeks {
        let round = (week - 1) % rounds;
        let swap = ((week - 1) / rounds) % 2 == 1;
        let mut order = ids.clone();
        order[1..].rotate_right(round as usize);
        for i in 0..n / 2 {
            let (Some(a), Some(b)) = (order[i], order[n - 1 - i]) else {
                continue;
            };
            let (home, away) = if ((i + round as usize) % 2 == 0) != swap { (a, b) } else { (b, a) };
            fixtures.push(ScheduledFixture {
                id: next_id,
                week,
                home_team_id: home,
                away_team_id: away,
                home_difficulty: Some(difficulty_against(strength.get(&away).copied())),
                away_difficulty: Some(difficulty_against(strength.get(&home).copied())),
            });
            next_id += 1;
        }
    }
    fixtures
}

fn difficulty_against(opponent_strength: Option<f64>) -> u8 {
    let s = opponent_strength.unwrap_or(50.0);
    (1.0 + (s - 35.0) / 12.5).round().clamp(1.0, 5.0) as u8
}

fn sample_goals(rng: &mut StdRng, attack: f64, defense: f64) -> u32 {
    let rate = (1.4 * attack / defense.max(1.0)).clamp(0.2, 3.5);
    // Knuth's method is fine at these rates.
    let limit = (-rate).exp();
    let mut k = 0;
    let mut p = 1.0;
    loop {
        p *= rng.r#gen::<f64>();
        if p <= limit {
            return k;
        }
        k += 1;
    }
}

#[allow(clippy::too_many_arguments)]
fn team_week(
    rng: &mut StdRng,
    week: u32,
    team_id: u32,
    opponent_id: u32,
    is_home: bool,
    difficulty: u8,
    squad: &[&PlayerInfo],
    goals_for: u32,
    goals_against: u32,
) -> Vec<StatRecord> {
    let mut starters: Vec<&PlayerInfo> = Vec::new();
    for (position, need) in [
        (Position::Goalkeeper, 1),
        (Position::Defender, 4),
        (Position::Midfielder, 4),
        (Position::Forward, 2),
    ] {
        let mut options: Vec<&PlayerInfo> = squad
            .iter()
            .copied()
            .filter(|p| p.position == position && p.status != "injured")
            .collect();
        // Occasional rotation: a first-choice player drops to the bench.
        if options.len() > need && rng.gen_bool(0.15) {
            let idx = rng.gen_range(0..need);
            let rotated = options.remove(idx);
            options.push(rotated);
        }
        starters.extend(options.into_iter().take(need));
    }

    let attackers: Vec<u32> = starters
        .iter()
        .filter(|p| matches!(p.position, Position::Midfielder | Position::Forward))
        .map(|p| p.id)
        .collect();
    let mut goals: HashMap<u32, u32> = HashMap::new();
    let mut assists: HashMap<u32, u32> = HashMap::new();
    for _ in 0..goals_for {
        if attackers.is_empty() {
            break;
        }
        let scorer = attackers[rng.gen_range(0..attackers.len())];
        *goals.entry(scorer).or_insert(0) += 1;
        if rng.gen_bool(0.7) {
            let assister = attackers[rng.gen_range(0..attackers.len())];
            if assister != scorer {
                *assists.entry(assister).or_insert(0) += 1;
            }
        }
    }

    let clean = u32::from(goals_against == 0);
    squad
        .iter()
        .map(|p| {
            let started = starters.iter().any(|s| s.id == p.id);
            let mut r = StatRecord::empty(week, p.id, team_id);
            r.opponent_team_id = Some(opponent_id);
            r.was_home = is_home;
            r.difficulty = difficulty;
            r.started = started;
            r.minutes = if started {
                rng.gen_range(70..=95)
            } else if p.status != "injured" && rng.gen_bool(0.35) {
                rng.gen_range(5..=30)
            } else {
                0
            };
            r.goals = goals.get(&p.id).copied().unwrap_or(0);
            r.assists = assists.get(&p.id).copied().unwrap_or(0);
            let shots = rng.gen_range(0..=4) + r.goals * 2;
            let key_passes = rng.gen_range(0..=3) + r.assists;
            if r.minutes > 0 {
                r.xg = (shots as f64 * 0.12 + r.goals as f64 * 0.3 + rng.gen_range(0.0..0.2_f64)).min(3.5);
                r.xa = (key_passes as f64 * 0.10 + r.assists as f64 * 0.25 + rng.gen_range(0.0..0.15_f64)).min(2.5);
            }
            r.clean_sheet = if started && matches!(p.position, Position::Goalkeeper | Position::Defender) {
                clean
            } else {
                0
            };
            r.saves = if p.position == Position::Goalkeeper && r.minutes > 0 {
                rng.gen_range(0..=6)
            } else {
                0
            };
            r.yellow = u32::from(r.minutes > 0 && rng.gen_bool(0.08));
            r.red = u32::from(r.minutes > 0 && rng.gen_bool(0.01));
            r.total_points = fpl_like_points(
                p.position, r.minutes, r.goals, r.assists, r.clean_sheet, r.saves, r.yellow, r.red,
            );
            r.bonus = if r.goals + r.assists >= 2 { 3 } else if r.goals > 0 { 1 } else { 0 };
            r.total_points += r.bonus as i32;
            r.bps = r.total_points * 3 + (r.minutes / 10) as i32;
            r.influence = (r.goals * 20 + r.assists * 12 + r.saves * 4) as f64 + r.minutes as f64 / 9.0;
            r.creativity = key_passes as f64 * 9.0 + r.assists as f64 * 10.0;
            r.threat = shots as f64 * 11.0 + r.goals as f64 * 15.0;
            r.ict_index = ((r.influence + r.creativity + r.threat) / 10.0 * 10.0).round() / 10.0;
            r
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scoring_follows_position_rules() {
        assert_eq!(fpl_like_points(Position::Defender, 90, 1, 0, 1, 0, 0, 0), 12);
        assert_eq!(fpl_like_points(Position::Forward, 30, 1, 1, 1, 0, 1, 0), 7);
        assert_eq!(fpl_like_points(Position::Goalkeeper, 90, 0, 0, 0, 7, 0, 1), 1);
        assert_eq!(fpl_like_points(Position::Midfielder, 0, 0, 0, 0, 0, 0, 0), 0);
    }

    #[test]
    fn generation_is_deterministic_per_seed() {
        let a = SyntheticLeague::generate(SyntheticConfig::default());
        let b = SyntheticLeague::generate(SyntheticConfig::default());
        assert_eq!(a.records, b.records);
        let c = SyntheticLeague::generate(SyntheticConfig {
            seed: 7,
            ..SyntheticConfig::default()
        });
        assert_ne!(a.records, c.records);
    }

    #[test]
    fn schedule_gives_every_team_one_game_per_week() {
        let league = SyntheticLeague::generate(SyntheticConfig::default());
        for week in 1..=12 {
            let mut seen = std::collections::HashSet::new();
            for f in league.fixtures.iter().filter(|f| f.week == week) {
                assert!(seen.insert(f.home_team_id));
                assert!(seen.insert(f.away_team_id));
            }
            assert_eq!(seen.len(), 10);
        }
    }

    #[test]
    fn one_record_per_player_per_played_week() {
        let cfg = SyntheticConfig::default();
        let league = SyntheticLeague::generate(cfg);
        assert_eq!(
            league.records.len(),
            league.players.len() * cfg.played_weeks as usize
        );
    }
}
