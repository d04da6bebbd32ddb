use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Result, bail};

use fpl_lineup::actual_lineup::RealizedCandidate;
use fpl_lineup::config::Settings;
use fpl_lineup::formation::Formation;
use fpl_lineup::lineup::ProjectedCandidate;
use fpl_lineup::predictor::predict_for_week;
use fpl_lineup::records::{LeagueSnapshot, StatRecord};
use fpl_lineup::store;
use fpl_lineup::synthetic::{SyntheticConfig, SyntheticLeague};
use fpl_lineup::training::{MIN_TRAINING_WEEKS, TrainingConfig, train_models};
use fpl_lineup::{generate_actual_lineup, generate_optimal_lineup};

#[derive(Debug, Clone)]
struct WeekOutcome {
    week: u32,
    picked_points: i32,
    best_points: Option<f64>,
    shortfall: u32,
}

/// Walk-forward: for each week, fit on strictly earlier weeks, pick a lineup,
/// then score it with what actually happened.
fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let settings = Settings::from_env();

    let formation = match parse_str_arg("--formation") {
        Some(raw) => Formation::parse(&raw)?,
        None => settings.formation.clone(),
    };
    let budget = parse_f64_arg("--budget").unwrap_or(settings.budget);
    let max_per_team = parse_u32_arg("--max-per-team").unwrap_or(settings.max_per_team);

    let (history, league) = if has_flag("--synthetic") {
        let league = SyntheticLeague::generate(SyntheticConfig {
            seed: parse_u32_arg("--seed").map(u64::from).unwrap_or(42),
            ..SyntheticConfig::default()
        });
        let snapshot = league.snapshot();
        (league.records, snapshot)
    } else {
        let db_path = parse_str_arg("--db").map(PathBuf::from).unwrap_or(settings.db_path.clone());
        let conn = store::open_db(&db_path)?;
        let Some(latest) = store::latest_week(&conn)? else {
            bail!("no stat records in {}", db_path.display());
        };
        (
            store::load_stat_records(&conn, 1, latest)?,
            store::load_league_snapshot(&conn)?,
        )
    };

    let Some(last_week) = history.iter().map(|r| r.week).max() else {
        bail!("no stat records to backtest");
    };
    let first_week = parse_u32_arg("--from").unwrap_or(MIN_TRAINING_WEEKS as u32 + 1);

    let mut outcomes = Vec::new();
    for week in first_week..=last_week {
        let prior: Vec<StatRecord> = history.iter().filter(|r| r.week < week).cloned().collect();
        let (bundle, _) = match train_models(&prior, &league, &settings.model_version, TrainingConfig::default()) {
            Ok(trained) => trained,
            Err(err) => {
                eprintln!("[WARN] gw {week}: skipped ({err})");
                continue;
            }
        };
        let predictions = predict_for_week(&prior, &league, week, &bundle)?;
        let candidates = projected_candidates(&predictions, &league);
        let lineup = generate_optimal_lineup(&candidates, &formation, budget, max_per_team)?;

        let realized: HashMap<u32, &StatRecord> = history
            .iter()
            .filter(|r| r.week == week)
            .map(|r| (r.player_id, r))
            .collect();
        let picked_points: i32 = lineup
            .players
            .iter()
            .filter_map(|p| realized.get(&p.player_id))
            .map(|r| r.total_points)
            .sum();
        let best_points = generate_actual_lineup(
            &realized_candidates(realized.values().copied(), &league),
            &formation,
            max_per_team,
        )
        .map(|best| best.total_points)
        .ok();

        outcomes.push(WeekOutcome {
            week,
            picked_points,
            best_points,
            shortfall: lineup.shortfall,
        });
    }

    if outcomes.is_empty() {
        bail!("no gameweek had enough history to backtest (first tested gw {first_week})");
    }

    println!("gw  picked  best   ratio");
    let mut total_picked = 0i64;
    let mut total_best = 0.0;
    for o in &outcomes {
        total_picked += i64::from(o.picked_points);
        let ratio = o.best_points.filter(|b| *b > 0.0).map(|b| o.picked_points as f64 / b);
        if let Some(best) = o.best_points {
            total_best += best;
        }
        println!(
            "{:>2}  {:>6}  {:>5}  {:>5}{}",
            o.week,
            o.picked_points,
            o.best_points.map(|b| format!("{b:.0}")).unwrap_or_else(|| "-".to_string()),
            ratio.map(|r| format!("{r:.2}")).unwrap_or_else(|| "-".to_string()),
            if o.shortfall > 0 { format!("  (short {})", o.shortfall) } else { String::new() }
        );
    }
    println!(
        "total picked {total_picked} / best {total_best:.0} over {} gameweeks",
        outcomes.len()
    );
    Ok(())
}

fn projected_candidates(
    predictions: &[fpl_lineup::Prediction],
    league: &LeagueSnapshot,
) -> Vec<ProjectedCandidate> {
    predictions
        .iter()
        .filter_map(|p| {
            let info = league.player(p.player_id)?;
            Some(ProjectedCandidate {
                player_id: p.player_id,
                team_id: info.team_id,
                position: info.position,
                price: info.price,
                start_probability: p.start_probability,
                expected_points: p.expected_points,
                status: info.status.clone(),
            })
        })
        .collect()
}

fn realized_candidates<'a>(
    records: impl Iterator<Item = &'a StatRecord>,
    league: &LeagueSnapshot,
) -> Vec<RealizedCandidate> {
    records
        .filter_map(|r| {
            let info = league.player(r.player_id)?;
            Some(RealizedCandidate {
                player_id: r.player_id,
                team_id: info.team_id,
                position: info.position,
                price: info.price,
                total_points: r.total_points,
            })
        })
        .collect()
}

fn parse_str_arg(name: &str) -> Option<String> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&format!("{name}="))
            && !raw.trim().is_empty()
        {
            return Some(raw.trim().to_string());
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
        {
            return Some(next.trim().to_string());
        }
    }
    None
}

fn parse_u32_arg(name: &str) -> Option<u32> {
    parse_str_arg(name).and_then(|v| v.parse::<u32>().ok())
}

fn parse_f64_arg(name: &str) -> Option<f64> {
    parse_str_arg(name).and_then(|v| v.parse::<f64>().ok())
}

fn has_flag(name: &str) -> bool {
    std::env::args().skip(1).any(|a| a == name)
}
