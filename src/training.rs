//! Training path: labeled rows, fitted linear heads and a rolling-origin
//! evaluation report.

use std::collections::{BTreeSet, HashMap};

use log::{debug, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::LineupError;
use crate::features::{FeatureRow, assemble_features};
use crate::manifest::FeatureManifest;
use crate::predictor::{Link, LinearModel, ModelBundle, sigmoid};
use crate::records::{LeagueSnapshot, StatRecord};

pub const MIN_TRAINING_WEEKS: usize = 4;
const WARMUP_WEEKS: usize = 3;
const IMPROVEMENT_EPS: f64 = 1e-7;

#[derive(Debug, Clone)]
pub struct TrainingRow {
    pub features: FeatureRow,
    pub started: bool,
    pub total_points: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct TrainingConfig {
    pub l2: f64,
    pub max_iters: usize,
    pub learning_rate: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            l2: 0.01,
            max_iters: 400,
            learning_rate: 0.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeekMetrics {
    pub test_week: u32,
    pub samples: usize,
    pub f1: f64,
    pub roc_auc: Option<f64>,
    pub mae: f64,
    pub rmse: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub model_version: String,
    pub n_rows: usize,
    pub max_week: u32,
    pub f1_mean: f64,
    pub roc_auc_mean: Option<f64>,
    pub mae_mean: f64,
    pub rmse_mean: f64,
    pub per_week: Vec<WeekMetrics>,
    pub feature_cols: Vec<String>,
    pub manifest_fingerprint: String,
}

/// Feature rows joined with the labels observed in the same record.
pub fn build_training_set(history: &[StatRecord], league: &LeagueSnapshot) -> Vec<TrainingRow> {
    let labels: HashMap<(u32, u32), &StatRecord> = history
        .iter()
        .map(|r| ((r.player_id, r.week), r))
        .collect();

    assemble_features(history, league)
        .into_iter()
        .filter_map(|features| {
            let record = labels.get(&(features.player_id, features.week))?;
            Some(TrainingRow {
                started: record.started,
                total_points: record.total_points as f64,
                features,
            })
        })
        .collect()
}

/// Fits both heads, evaluating each week after the warmup on models fitted
/// to strictly earlier weeks, then refits on everything.
pub fn train_models(
    history: &[StatRecord],
    league: &LeagueSnapshot,
    model_version: &str,
    cfg: TrainingConfig,
) -> Result<(ModelBundle, TrainingReport), LineupError> {
    if history.is_empty() {
        return Err(LineupError::unavailable("no stat records to train on"));
    }
    let rows = build_training_set(history, league);
    let weeks: Vec<u32> = rows
        .iter()
        .map(|r| r.features.week)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if weeks.len() < MIN_TRAINING_WEEKS {
        return Err(LineupError::unavailable(format!(
            "need at least {MIN_TRAINING_WEEKS} gameweeks for training/evaluation, found {}",
            weeks.len()
        )));
    }

    let manifest = FeatureManifest::standard(model_version);
    let per_week: Vec<WeekMetrics> = weeks[WARMUP_WEEKS..]
        .par_iter()
        .filter_map(|&test_week| evaluate_week(&rows, &manifest, test_week, cfg))
        .collect();

    let report = TrainingReport {
        model_version: model_version.to_string(),
        n_rows: rows.len(),
        max_week: weeks.last().copied().unwrap_or_default(),
        f1_mean: mean(per_week.iter().map(|m| m.f1)),
        roc_auc_mean: mean_present(per_week.iter().map(|m| m.roc_auc)),
        mae_mean: mean(per_week.iter().map(|m| m.mae)),
        rmse_mean: mean(per_week.iter().map(|m| m.rmse)),
        per_week,
        feature_cols: manifest.columns.clone(),
        manifest_fingerprint: manifest.fingerprint(),
    };

    let all: Vec<&TrainingRow> = rows.iter().collect();
    let (start_model, points_model) = fit_heads(&all, &manifest, cfg);
    info!(
        "trained {model_version} on {} rows over {} gameweeks (f1 {:.3}, mae {:.3})",
        report.n_rows,
        weeks.len(),
        report.f1_mean,
        report.mae_mean
    );
    let bundle = ModelBundle::new(manifest, start_model, points_model, Some(report.clone()));
    Ok((bundle, report))
}

fn evaluate_week(
    rows: &[TrainingRow],
    manifest: &FeatureManifest,
    test_week: u32,
    cfg: TrainingConfig,
) -> Option<WeekMetrics> {
    let train: Vec<&TrainingRow> = rows.iter().filter(|r| r.features.week < test_week).collect();
    let test: Vec<&TrainingRow> = rows.iter().filter(|r| r.features.week == test_week).collect();
    if train.is_empty() || test.is_empty() {
        return None;
    }

    let (start_model, points_model) = fit_heads(&train, manifest, cfg);
    let x_test: Vec<Vec<f64>> = test.iter().map(|r| r.features.values()).collect();
    let p_start: Vec<f64> = x_test.iter().map(|x| start_model.predict_row(x)).collect();
    let points: Vec<f64> = x_test.iter().map(|x| points_model.predict_row(x)).collect();
    let y_start: Vec<bool> = test.iter().map(|r| r.started).collect();
    let y_points: Vec<f64> = test.iter().map(|r| r.total_points).collect();

    let metrics = WeekMetrics {
        test_week,
        samples: test.len(),
        f1: f1_score(&y_start, &p_start, 0.5),
        roc_auc: roc_auc(&y_start, &p_start),
        mae: mae(&y_points, &points),
        rmse: rmse(&y_points, &points),
    };
    debug!(
        "week {test_week}: train={} test={} f1={:.3} mae={:.3}",
        train.len(),
        test.len(),
        metrics.f1,
        metrics.mae
    );
    Some(metrics)
}

fn fit_heads(
    rows: &[&TrainingRow],
    manifest: &FeatureManifest,
    cfg: TrainingConfig,
) -> (LinearModel, LinearModel) {
    let x: Vec<Vec<f64>> = rows.iter().map(|r| r.features.values()).collect();
    let y_start: Vec<f64> = rows
        .iter()
        .map(|r| if r.started { 1.0 } else { 0.0 })
        .collect();
    let y_points: Vec<f64> = rows.iter().map(|r| r.total_points).collect();
    (
        fit_linear(&x, &y_start, &manifest.columns, Link::Logistic, cfg),
        fit_linear(&x, &y_points, &manifest.columns, Link::Identity, cfg),
    )
}

/// Batch gradient descent with L2 on standardized inputs. Both links share the
/// same gradient form: (prediction - target) * x.
pub fn fit_linear(
    x: &[Vec<f64>],
    y: &[f64],
    names: &[String],
    link: Link,
    cfg: TrainingConfig,
) -> LinearModel {
    let width = names.len();
    let (means, stds) = feature_norm_stats(x, width);
    let z: Vec<Vec<f64>> = x
        .iter()
        .map(|row| {
            (0..width)
                .map(|j| (row.get(j).copied().unwrap_or(0.0) - means[j]) / stds[j])
                .collect()
        })
        .collect();

    let n = y.len().max(1) as f64;
    let y_mean = y.iter().sum::<f64>() / n;
    let mut intercept = match link {
        Link::Logistic => {
            let p = y_mean.clamp(1e-3, 1.0 - 1e-3);
            (p / (1.0 - p)).ln()
        }
        Link::Identity => y_mean,
    };
    let mut coeffs = vec![0.0; width];
    let mut best_loss = loss(&z, y, &coeffs, intercept, link, cfg.l2);
    let mut stalled = 0usize;

    for iter in 0..cfg.max_iters {
        let mut grad = vec![0.0; width];
        let mut grad_b = 0.0;
        for (row, target) in z.iter().zip(y) {
            let err = apply_link(dot(&coeffs, row) + intercept, link) - target;
            grad_b += err;
            for (g, v) in grad.iter_mut().zip(row) {
                *g += err * v;
            }
        }

        let lr = cfg.learning_rate / (1.0 + iter as f64 * 0.003);
        intercept -= lr * grad_b / n;
        for (c, g) in coeffs.iter_mut().zip(&grad) {
            *c -= lr * (g / n + cfg.l2 * *c);
        }

        if iter % 20 == 0 {
            let current = loss(&z, y, &coeffs, intercept, link, cfg.l2);
            if current + IMPROVEMENT_EPS < best_loss {
                best_loss = current;
                stalled = 0;
            } else {
                stalled += 1;
                if stalled >= 5 {
                    break;
                }
            }
        }
    }

    LinearModel {
        link,
        feature_names: names.to_vec(),
        feature_means: means,
        feature_stds: stds,
        coeffs,
        intercept,
        l2: cfg.l2,
        train_samples: y.len(),
    }
}

fn feature_norm_stats(x: &[Vec<f64>], width: usize) -> (Vec<f64>, Vec<f64>) {
    let n = x.len().max(1) as f64;
    let mut means = vec![0.0; width];
    for row in x {
        for (m, v) in means.iter_mut().zip(row) {
            *m += v;
        }
    }
    for m in &mut means {
        *m /= n;
    }
    let mut stds = vec![0.0; width];
    for row in x {
        for j in 0..width {
            let d = row.get(j).copied().unwrap_or(0.0) - means[j];
            stds[j] += d * d;
        }
    }
    for s in &mut stds {
        // Constant columns keep unit scale so they standardize to zero.
        *s = (*s / n).sqrt();
        if *s < 1e-9 {
            *s = 1.0;
        }
    }
    (means, stds)
}

fn loss(z: &[Vec<f64>], y: &[f64], coeffs: &[f64], intercept: f64, link: Link, l2: f64) -> f64 {
    if y.is_empty() {
        return 0.0;
    }
    let mut sum = 0.0;
    for (row, target) in z.iter().zip(y) {
        let p = apply_link(dot(coeffs, row) + intercept, link);
        sum += match link {
            Link::Logistic => {
                let p = p.clamp(1e-9, 1.0 - 1e-9);
                -(target * p.ln() + (1.0 - target) * (1.0 - p).ln())
            }
            Link::Identity => 0.5 * (p - target).powi(2),
        };
    }
    let penalty = 0.5 * l2 * coeffs.iter().map(|c| c * c).sum::<f64>();
    sum / y.len() as f64 + penalty
}

fn apply_link(z: f64, link: Link) -> f64 {
    match link {
        Link::Logistic => sigmoid(z),
        Link::Identity => z,
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub fn f1_score(y_true: &[bool], p: &[f64], threshold: f64) -> f64 {
    let mut tp = 0usize;
    let mut fp = 0usize;
    let mut fn_ = 0usize;
    for (truth, prob) in y_true.iter().zip(p) {
        let pred = *prob >= threshold;
        match (pred, *truth) {
            (true, true) => tp += 1,
            (true, false) => fp += 1,
            (false, true) => fn_ += 1,
            (false, false) => {}
        }
    }
    let denom = 2 * tp + fp + fn_;
    if denom == 0 {
        return 0.0;
    }
    (2 * tp) as f64 / denom as f64
}

/// Rank-based AUC; `None` when only one class is present.
pub fn roc_auc(y_true: &[bool], p: &[f64]) -> Option<f64> {
    let mut pairs: Vec<(f64, bool)> = p.iter().copied().zip(y_true.iter().copied()).collect();
    let positives = pairs.iter().filter(|(_, y)| *y).count();
    let negatives = pairs.len() - positives;
    if positives == 0 || negatives == 0 {
        return None;
    }
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

    // Average ranks over ties.
    let mut rank_sum_pos = 0.0;
    let mut i = 0;
    while i < pairs.len() {
        let mut j = i;
        while j + 1 < pairs.len() && pairs[j + 1].0 == pairs[i].0 {
            j += 1;
        }
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        for pair in &pairs[i..=j] {
            if pair.1 {
                rank_sum_pos += avg_rank;
            }
        }
        i = j + 1;
    }
    let pos = positives as f64;
    let neg = negatives as f64;
    Some((rank_sum_pos - pos * (pos + 1.0) / 2.0) / (pos * neg))
}

pub fn mae(y: &[f64], pred: &[f64]) -> f64 {
    mean(y.iter().zip(pred).map(|(a, b)| (a - b).abs()))
}

pub fn rmse(y: &[f64], pred: &[f64]) -> f64 {
    mean(y.iter().zip(pred).map(|(a, b)| (a - b).powi(2))).sqrt()
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let mut sum = 0.0;
    let mut n = 0usize;
    for v in values {
        sum += v;
        n += 1;
    }
    if n == 0 { 0.0 } else { sum / n as f64 }
}

fn mean_present(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    let present: Vec<f64> = values.flatten().collect();
    if present.is_empty() {
        None
    } else {
        Some(mean(present.into_iter()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn f1_matches_hand_count() {
        let y = [true, true, false, false];
        let p = [0.9, 0.2, 0.7, 0.1];
        // tp=1 fp=1 fn=1
        assert!((f1_score(&y, &p, 0.5) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn auc_is_one_for_perfect_ranking_and_none_for_single_class() {
        assert_eq!(roc_auc(&[false, true, true], &[0.1, 0.8, 0.9]), Some(1.0));
        assert_eq!(roc_auc(&[true, true], &[0.1, 0.8]), None);
        assert_eq!(roc_auc(&[false, true], &[0.5, 0.5]), Some(0.5));
    }

    #[test]
    fn regression_errors() {
        let y = [1.0, 2.0, 3.0];
        let p = [1.0, 3.0, 1.0];
        assert!((mae(&y, &p) - 1.0).abs() < 1e-12);
        assert!((rmse(&y, &p) - (5.0_f64 / 3.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn identity_fit_recovers_linear_signal() {
        let names = vec!["a".to_string(), "b".to_string()];
        let x: Vec<Vec<f64>> = (0..40).map(|i| vec![i as f64, 7.0]).collect();
        let y: Vec<f64> = x.iter().map(|r| 2.0 * r[0] + 1.0).collect();
        let cfg = TrainingConfig {
            l2: 0.0,
            max_iters: 2000,
            learning_rate: 0.5,
        };
        let model = fit_linear(&x, &y, &names, Link::Identity, cfg);
        let pred = model.predict_row(&[10.0, 7.0]);
        assert!((pred - 21.0).abs() < 0.5, "pred={pred}");
    }

    #[test]
    fn logistic_fit_separates_classes() {
        let names = vec!["minutes".to_string()];
        let x: Vec<Vec<f64>> = (0..50).map(|i| vec![if i % 2 == 0 { 90.0 } else { 0.0 }]).collect();
        let y: Vec<f64> = x.iter().map(|r| if r[0] > 45.0 { 1.0 } else { 0.0 }).collect();
        let model = fit_linear(&x, &y, &names, Link::Logistic, TrainingConfig::default());
        assert!(model.predict_row(&[90.0]) > 0.8);
        assert!(model.predict_row(&[0.0]) < 0.2);
    }
}
