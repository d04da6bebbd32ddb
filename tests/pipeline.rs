use fpl_lineup::LineupError;
use fpl_lineup::formation::Formation;
use fpl_lineup::manifest::{FeatureManifest, FeatureMatrix};
use fpl_lineup::predictor::{ModelBundle, Predictor, predict_for_week};
use fpl_lineup::store;
use fpl_lineup::synthetic::{SyntheticConfig, SyntheticLeague};
use fpl_lineup::training::{TrainingConfig, build_training_set, train_models};
use fpl_lineup::{features_for_week, generate_actual_lineup, generate_optimal_lineup};

fn league() -> SyntheticLeague {
    SyntheticLeague::generate(SyntheticConfig {
        seed: 11,
        teams: 6,
        weeks: 8,
        played_weeks: 7,
        squad: [2, 5, 5, 3],
    })
}

fn quick() -> TrainingConfig {
    TrainingConfig {
        max_iters: 120,
        ..TrainingConfig::default()
    }
}

#[test]
fn store_round_trips_the_league() {
    let league = league();
    let mut conn = store::open_in_memory().unwrap();
    store::upsert_teams(&mut conn, &league.teams).unwrap();
    store::upsert_players(&mut conn, &league.players).unwrap();
    store::upsert_fixtures(&mut conn, &league.fixtures).unwrap();
    store::upsert_stat_records(&mut conn, &league.records).unwrap();
    // Upserts are idempotent per (gw, player).
    store::upsert_stat_records(&mut conn, &league.records).unwrap();

    assert_eq!(store::latest_week(&conn).unwrap(), Some(7));
    let mut loaded = store::load_stat_records(&conn, 1, 7).unwrap();
    let mut expected = league.records.clone();
    loaded.sort_by_key(|r| (r.week, r.player_id));
    expected.sort_by_key(|r| (r.week, r.player_id));
    assert_eq!(loaded.len(), expected.len());
    assert_eq!(loaded, expected);

    assert_eq!(store::load_stat_records(&conn, 3, 4).unwrap().len(), league.players.len() * 2);

    let snapshot = store::load_league_snapshot(&conn).unwrap();
    assert_eq!(snapshot.player_count(), league.players.len());
    assert_eq!(snapshot.fixtures().len(), league.fixtures.len());

    let realized = store::load_realized_candidates(&conn, 7).unwrap();
    assert_eq!(realized.len(), league.players.len());
    let best = generate_actual_lineup(&realized, &Formation::default(), 3).unwrap();
    assert_eq!(best.len(), 11);
}

#[test]
fn training_needs_four_gameweeks() {
    let league = league();
    let short: Vec<_> = league.records.iter().filter(|r| r.week <= 3).cloned().collect();
    let err = train_models(&short, &league.snapshot(), "t", quick()).unwrap_err();
    assert!(matches!(err, LineupError::DataUnavailable(_)));
}

#[test]
fn train_predict_select_end_to_end() {
    let league = league();
    let snapshot = league.snapshot();
    let rows = build_training_set(&league.records, &snapshot);
    assert_eq!(rows.len(), league.records.len());

    let (bundle, report) = train_models(&league.records, &snapshot, "linear_test", quick()).unwrap();
    assert_eq!(report.n_rows, rows.len());
    assert_eq!(report.max_week, 7);
    // Weeks 4..=7 are evaluated on models fitted to earlier weeks only.
    let tested: Vec<u32> = report.per_week.iter().map(|m| m.test_week).collect();
    assert_eq!(tested, vec![4, 5, 6, 7]);
    assert!(report.per_week.iter().all(|m| (0.0..=1.0).contains(&m.f1)));
    assert!(report.mae_mean.is_finite() && report.rmse_mean >= report.mae_mean - 1e-9);
    assert_eq!(report.manifest_fingerprint, bundle.manifest().fingerprint());

    let dir = tempfile::tempdir().unwrap();
    bundle.save(dir.path()).unwrap();
    let loaded = ModelBundle::load(dir.path()).unwrap();
    assert_eq!(loaded.model_version(), "linear_test");
    assert!(loaded.report().is_some());

    let predictions = predict_for_week(&league.records, &snapshot, 8, &loaded).unwrap();
    assert_eq!(predictions.len(), league.players.len());
    assert!(predictions
        .iter()
        .all(|p| (0.0..=1.0).contains(&p.start_probability) && p.expected_points.is_finite()));

    let mut conn = store::open_in_memory().unwrap();
    store::upsert_teams(&mut conn, &league.teams).unwrap();
    store::upsert_players(&mut conn, &league.players).unwrap();
    store::upsert_predictions(&mut conn, &predictions).unwrap();
    assert_eq!(store::load_predictions(&conn, 8).unwrap().len(), predictions.len());

    let candidates = store::load_projected_candidates(&conn, 8).unwrap();
    let lineup = generate_optimal_lineup(&candidates, &Formation::default(), 100.0, 3).unwrap();
    assert!(lineup.total_spend <= 100.0);
    assert!(lineup.len() <= 11);
    assert!(lineup.players.iter().all(|p| {
        league
            .players
            .iter()
            .find(|info| info.id == p.player_id)
            .is_some_and(|info| info.status != "injured")
    }));
}

#[test]
fn regular_starters_score_higher_start_probability() {
    let league = league();
    let snapshot = league.snapshot();
    let (bundle, _) = train_models(&league.records, &snapshot, "t", quick()).unwrap();
    let predictions = predict_for_week(&league.records, &snapshot, 8, &bundle).unwrap();

    let starts = |player_id: u32| {
        league
            .records
            .iter()
            .filter(|r| r.player_id == player_id && r.started)
            .count()
    };
    let (regulars, fringe): (Vec<_>, Vec<_>) = predictions
        .iter()
        .filter(|p| starts(p.player_id) == 7 || starts(p.player_id) == 0)
        .partition(|p| starts(p.player_id) == 7);
    if regulars.is_empty() || fringe.is_empty() {
        return;
    }
    let mean = |v: &[&fpl_lineup::Prediction]| {
        v.iter().map(|p| p.start_probability).sum::<f64>() / v.len() as f64
    };
    assert!(mean(&regulars) > mean(&fringe));
}

#[test]
fn predictor_rejects_foreign_manifest() {
    let league = league();
    let snapshot = league.snapshot();
    let (bundle, _) = train_models(&league.records, &snapshot, "t", quick()).unwrap();

    let rows = features_for_week(&league.records, &snapshot, 8).unwrap();
    let mut columns = FeatureManifest::standard("other").columns;
    columns.retain(|c| c != "price");
    let narrowed = FeatureManifest::new("other", columns);
    assert!(matches!(
        FeatureMatrix::from_rows(&rows, &narrowed),
        Err(LineupError::FeatureMismatch { .. })
    ));

    let mut matrix = FeatureMatrix::from_rows(&rows, bundle.manifest()).unwrap();
    matrix.columns.reverse();
    assert!(matches!(
        bundle.classify(&matrix),
        Err(LineupError::FeatureMismatch { .. })
    ));
}

#[test]
fn missing_models_surface_as_data_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let err = ModelBundle::load(dir.path()).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<LineupError>(),
        Some(LineupError::DataUnavailable(_))
    ));
}
