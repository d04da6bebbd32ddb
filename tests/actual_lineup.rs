use std::collections::{HashMap, HashSet};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use fpl_lineup::actual_lineup::{RealizedCandidate, generate_actual_lineup};
use fpl_lineup::formation::Formation;
use fpl_lineup::records::Position;
use fpl_lineup::LineupError;

fn cand(id: u32, team_id: u32, position: Position, total_points: i32) -> RealizedCandidate {
    RealizedCandidate {
        player_id: id,
        team_id,
        position,
        price: 5.0,
        total_points,
    }
}

#[test]
fn capped_defenders_fail_naming_def() {
    let mut pool = vec![cand(1, 1, Position::Goalkeeper, 6)];
    // Two teams, two defenders each, cap of one per team.
    pool.extend([
        cand(2, 10, Position::Defender, 9),
        cand(3, 10, Position::Defender, 8),
        cand(4, 11, Position::Defender, 7),
        cand(5, 11, Position::Defender, 6),
    ]);
    for i in 0..6 {
        pool.push(cand(20 + i, 20 + i, Position::Midfielder, 3));
        pool.push(cand(40 + i, 40 + i, Position::Forward, 3));
    }

    let formation = Formation::parse("4-3-3").unwrap();
    let err = generate_actual_lineup(&pool, &formation, 1).unwrap_err();
    assert_eq!(
        err,
        LineupError::UnderFill {
            position: Position::Defender
        }
    );
    assert!(err.to_string().contains("DEF"), "{err}");
}

#[test]
fn never_borrows_from_other_positions() {
    let pool = vec![
        cand(1, 1, Position::Goalkeeper, 2),
        cand(2, 2, Position::Midfielder, 15),
        cand(3, 3, Position::Midfielder, 14),
    ];
    let formation = Formation::parse("0-1-0").unwrap();
    let result = generate_actual_lineup(&pool, &formation, 3).unwrap();
    let ids: Vec<u32> = result.players.iter().map(|p| p.player_id).collect();
    assert_eq!(ids, vec![1, 2]);

    let formation = Formation::parse("1-1-0").unwrap();
    assert!(matches!(
        generate_actual_lineup(&pool, &formation, 3),
        Err(LineupError::UnderFill {
            position: Position::Defender
        })
    ));
}

#[test]
fn highest_points_win_each_position() {
    let pool = vec![
        cand(1, 1, Position::Goalkeeper, 2),
        cand(2, 2, Position::Goalkeeper, 11),
        cand(3, 3, Position::Forward, 4),
        cand(4, 4, Position::Forward, 13),
        cand(5, 5, Position::Forward, 4),
    ];
    let formation = Formation::parse("0-0-2").unwrap();
    let result = generate_actual_lineup(&pool, &formation, 3).unwrap();
    let ids: Vec<u32> = result.players.iter().map(|p| p.player_id).collect();
    // Equal-points forwards resolve to the lower id.
    assert_eq!(ids, vec![2, 4, 3]);
    assert_eq!(result.total_points, 28.0);
    assert_eq!(result.total_score, 28.0);
    assert_eq!(result.shortfall, 0);
}

#[test]
fn empty_pool_is_data_unavailable() {
    assert!(matches!(
        generate_actual_lineup(&[], &Formation::default(), 3),
        Err(LineupError::DataUnavailable(_))
    ));
}

#[test]
fn successful_lineups_match_quotas_exactly() {
    let formations: Vec<Formation> = Formation::catalog().cloned().collect();
    let mut successes = 0;
    for seed in 0..60u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let pool: Vec<RealizedCandidate> = (0..rng.gen_range(10..50))
            .map(|i| {
                cand(
                    i + 1,
                    rng.gen_range(1..12),
                    Position::ALL[rng.gen_range(0..4)],
                    rng.gen_range(-2..16),
                )
            })
            .collect();
        let formation = &formations[rng.gen_range(0..formations.len())];
        let cap = rng.gen_range(1..4);

        match generate_actual_lineup(&pool, formation, cap) {
            Ok(result) => {
                successes += 1;
                for (position, quota) in formation.quotas() {
                    assert_eq!(result.count_at(position) as u32, quota, "seed {seed}");
                }
                let ids: HashSet<u32> = result.players.iter().map(|p| p.player_id).collect();
                assert_eq!(ids.len(), result.len());
                let mut per_team: HashMap<u32, u32> = HashMap::new();
                for p in &result.players {
                    *per_team.entry(p.team_id).or_insert(0) += 1;
                }
                assert!(per_team.values().all(|c| *c <= cap), "seed {seed}");
            }
            Err(LineupError::UnderFill { .. }) => {}
            Err(other) => panic!("seed {seed}: unexpected {other:?}"),
        }
    }
    assert!(successes > 0);
}
