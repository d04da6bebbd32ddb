use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};
use log::{info, warn};
use rusqlite::Connection;

use fpl_lineup::config::Settings;
use fpl_lineup::formation::Formation;
use fpl_lineup::predictor::{ModelBundle, predict_for_week};
use fpl_lineup::records::LeagueSnapshot;
use fpl_lineup::roster::LineupResult;
use fpl_lineup::store;
use fpl_lineup::synthetic::{SyntheticConfig, SyntheticLeague};
use fpl_lineup::training::{TrainingConfig, train_models};
use fpl_lineup::{generate_actual_lineup, generate_optimal_lineup};

const USAGE: &str = "usage: fpl_lineup <command> [options]

commands:
  seed           [--seed N] [--teams N] [--weeks N] [--played N]
  train          fit both models on every stored gameweek
  predict        --gw N
  lineup         --gw N [--formation 4-4-2] [--budget 100] [--max-per-team 3] [--json]
  actual-lineup  --gw N [--formation 4-4-2] [--max-per-team 3] [--json]

common: [--db PATH] [--model-dir PATH]";

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let mut settings = Settings::from_env();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let Some(command) = args.first().cloned() else {
        println!("{USAGE}");
        return Ok(());
    };
    if let Some(path) = parse_path_arg(&args, "--db") {
        settings.db_path = path;
    }
    if let Some(path) = parse_path_arg(&args, "--model-dir") {
        settings.model_dir = path;
    }

    match command.as_str() {
        "seed" => cmd_seed(&settings, &args),
        "train" => cmd_train(&settings),
        "predict" => cmd_predict(&settings, &args),
        "lineup" => cmd_lineup(&settings, &args),
        "actual-lineup" => cmd_actual_lineup(&settings, &args),
        "help" | "--help" | "-h" => {
            println!("{USAGE}");
            Ok(())
        }
        other => bail!("unknown command {other:?}\n\n{USAGE}"),
    }
}

fn cmd_seed(settings: &Settings, args: &[String]) -> Result<()> {
    let defaults = SyntheticConfig::default();
    let weeks = parse_u32_arg(args, "--weeks").unwrap_or(defaults.weeks);
    let cfg = SyntheticConfig {
        seed: parse_u32_arg(args, "--seed").map(u64::from).unwrap_or(defaults.seed),
        teams: parse_u32_arg(args, "--teams").unwrap_or(defaults.teams).max(2),
        weeks,
        played_weeks: parse_u32_arg(args, "--played")
            .unwrap_or(weeks.saturating_sub(2))
            .min(weeks),
        squad: defaults.squad,
    };
    let league = SyntheticLeague::generate(cfg);

    let mut conn = store::open_db(&settings.db_path)?;
    store::upsert_teams(&mut conn, &league.teams)?;
    store::upsert_players(&mut conn, &league.players)?;
    store::upsert_fixtures(&mut conn, &league.fixtures)?;
    let n = store::upsert_stat_records(&mut conn, &league.records)?;
    println!(
        "seeded {} teams, {} players, {} fixtures, {n} stat records into {}",
        league.teams.len(),
        league.players.len(),
        league.fixtures.len(),
        settings.db_path.display()
    );
    Ok(())
}

fn cmd_train(settings: &Settings) -> Result<()> {
    let conn = store::open_db(&settings.db_path)?;
    let Some(latest) = store::latest_week(&conn)? else {
        bail!("no stat records in {}; run `fpl_lineup seed` first", settings.db_path.display());
    };
    let history = store::load_stat_records(&conn, 1, latest)?;
    let league = store::load_league_snapshot(&conn)?;

    let (bundle, report) = train_models(
        &history,
        &league,
        &settings.model_version,
        TrainingConfig::default(),
    )?;
    bundle.save(&settings.model_dir)?;

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "model_version": report.model_version,
            "n_rows": report.n_rows,
            "max_gw": report.max_week,
            "classification": { "f1_mean": report.f1_mean, "roc_auc_mean": report.roc_auc_mean },
            "regression": { "mae_mean": report.mae_mean, "rmse_mean": report.rmse_mean },
            "model_dir": settings.model_dir.display().to_string(),
        }))
        .context("serialize training summary")?
    );
    Ok(())
}

fn cmd_predict(settings: &Settings, args: &[String]) -> Result<()> {
    let week = require_gw(args)?;
    let mut conn = store::open_db(&settings.db_path)?;
    let count = predict_and_store(settings, &mut conn, week)?;
    println!("stored {count} predictions for gameweek {week}");
    Ok(())
}

fn cmd_lineup(settings: &Settings, args: &[String]) -> Result<()> {
    let week = require_gw(args)?;
    let formation = formation_arg(settings, args)?;
    let budget = parse_f64_arg(args, "--budget").unwrap_or(settings.budget);
    let max_per_team = parse_u32_arg(args, "--max-per-team").unwrap_or(settings.max_per_team);

    let mut conn = store::open_db(&settings.db_path)?;
    let mut candidates = store::load_projected_candidates(&conn, week)?;
    if candidates.is_empty() {
        info!("no stored predictions for gameweek {week}, predicting now");
        predict_and_store(settings, &mut conn, week)?;
        candidates = store::load_projected_candidates(&conn, week)?;
    }

    let result = generate_optimal_lineup(&candidates, &formation, budget, max_per_team)?;
    if result.shortfall > 0 {
        warn!("lineup for gameweek {week} is {} players short", result.shortfall);
    }
    let league = store::load_league_snapshot(&conn)?;
    print_lineup(week, &result, &league, has_flag(args, "--json"))
}

fn cmd_actual_lineup(settings: &Settings, args: &[String]) -> Result<()> {
    let week = require_gw(args)?;
    let formation = formation_arg(settings, args)?;
    let max_per_team = parse_u32_arg(args, "--max-per-team").unwrap_or(settings.max_per_team);

    let conn = store::open_db(&settings.db_path)?;
    let candidates = store::load_realized_candidates(&conn, week)?;
    let result = generate_actual_lineup(&candidates, &formation, max_per_team)
        .with_context(|| format!("best lineup for gameweek {week}"))?;
    let league = store::load_league_snapshot(&conn)?;
    print_lineup(week, &result, &league, has_flag(args, "--json"))
}

fn predict_and_store(settings: &Settings, conn: &mut Connection, week: u32) -> Result<usize> {
    if week < 2 {
        bail!("gameweek {week} has no prior history to predict from");
    }
    let bundle = ModelBundle::load(&settings.model_dir)?;
    let history = store::load_stat_records(conn, 1, week - 1)?;
    let league = store::load_league_snapshot(conn)?;
    let predictions = predict_for_week(&history, &league, week, &bundle)?;
    store::upsert_predictions(conn, &predictions)
}

fn print_lineup(week: u32, result: &LineupResult, league: &LeagueSnapshot, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(result).context("serialize lineup")?
        );
        return Ok(());
    }

    println!("gameweek {week} · formation {}", result.formation);
    for p in &result.players {
        let name = league.player(p.player_id).map(|i| i.name.as_str()).unwrap_or("?");
        let team = league
            .team(p.team_id)
            .and_then(|t| t.short_name.as_deref())
            .unwrap_or("?");
        let marker = if p.fallback { " *" } else { "" };
        println!(
            "  {:<3} {:<22} {:<4} £{:>4.1}  score {:>6.2}{marker}",
            p.position.code(),
            name,
            team,
            p.price,
            p.score
        );
    }
    println!(
        "spend £{:.1} · points {:.2} · score {:.2}",
        result.total_spend, result.total_points, result.total_score
    );
    if result.players.iter().any(|p| p.fallback) {
        println!("(* filled outside its formation slot)");
    }
    Ok(())
}

fn require_gw(args: &[String]) -> Result<u32> {
    parse_u32_arg(args, "--gw").ok_or_else(|| anyhow!("--gw N is required\n\n{USAGE}"))
}

fn formation_arg(settings: &Settings, args: &[String]) -> Result<Formation> {
    match parse_str_arg(args, "--formation") {
        Some(raw) => Ok(Formation::parse(&raw)?),
        None => Ok(settings.formation.clone()),
    }
}

fn parse_str_arg(args: &[String], name: &str) -> Option<String> {
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&format!("{name}="))
            && !raw.trim().is_empty()
        {
            return Some(raw.trim().to_string());
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(next.trim().to_string());
        }
    }
    None
}

fn parse_path_arg(args: &[String], name: &str) -> Option<PathBuf> {
    parse_str_arg(args, name).map(PathBuf::from)
}

fn parse_u32_arg(args: &[String], name: &str) -> Option<u32> {
    parse_str_arg(args, name).and_then(|v| v.parse::<u32>().ok())
}

fn parse_f64_arg(args: &[String], name: &str) -> Option<f64> {
    parse_str_arg(args, name).and_then(|v| v.parse::<f64>().ok())
}

fn has_flag(args: &[String], name: &str) -> bool {
    args.iter().any(|a| a == name)
}
