use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::context::features_for_week;
use crate::error::LineupError;
use crate::manifest::{FeatureManifest, FeatureMatrix};
use crate::records::{LeagueSnapshot, StatRecord};
use crate::training::TrainingReport;

const START_MODEL_FILE: &str = "start_clf.json";
const POINTS_MODEL_FILE: &str = "points_reg.json";
const METRICS_FILE: &str = "metrics.json";

/// "Given a feature matrix, return a numeric vector", once as a participation
/// probability and once as a points estimate. Feature and lineup code only
/// depend on this capability.
pub trait Predictor: Send + Sync {
    fn model_version(&self) -> &str;

    fn manifest(&self) -> &FeatureManifest;

    /// Start probability per row, in [0, 1].
    fn classify(&self, matrix: &FeatureMatrix) -> Result<Vec<f64>, LineupError>;

    /// Expected points per row.
    fn regress(&self, matrix: &FeatureMatrix) -> Result<Vec<f64>, LineupError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Link {
    Logistic,
    Identity,
}

/// Linear model over standardized features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub link: Link,
    pub feature_names: Vec<String>,
    pub feature_means: Vec<f64>,
    pub feature_stds: Vec<f64>,
    pub coeffs: Vec<f64>,
    pub intercept: f64,
    #[serde(default)]
    pub l2: f64,
    #[serde(default)]
    pub train_samples: usize,
}

impl LinearModel {
    pub fn predict_row(&self, x: &[f64]) -> f64 {
        let mut z = self.intercept;
        for (idx, c) in self.coeffs.iter().enumerate() {
            let Some(v) = x.get(idx) else {
                break;
            };
            z += c * standardized(*v, idx, self);
        }
        match self.link {
            Link::Logistic => sigmoid(z),
            Link::Identity => z,
        }
    }

    fn predict(&self, matrix: &FeatureMatrix, manifest: &FeatureManifest) -> Result<Vec<f64>, LineupError> {
        manifest.verify(&matrix.columns)?;
        if self.feature_names != manifest.columns {
            return Err(LineupError::FeatureMismatch {
                expected: manifest.width(),
                actual: self.feature_names.len(),
                detail: "model artifact was fitted on a different column set".to_string(),
            });
        }
        Ok(matrix.rows.iter().map(|row| self.predict_row(row)).collect())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MetricsFile {
    manifest: FeatureManifest,
    #[serde(default)]
    report: Option<TrainingReport>,
}

/// The two fitted artifacts plus the manifest they were fitted against.
#[derive(Debug, Clone)]
pub struct ModelBundle {
    manifest: FeatureManifest,
    start_model: LinearModel,
    points_model: LinearModel,
    report: Option<TrainingReport>,
}

impl ModelBundle {
    pub fn new(
        manifest: FeatureManifest,
        start_model: LinearModel,
        points_model: LinearModel,
        report: Option<TrainingReport>,
    ) -> Self {
        Self {
            manifest,
            start_model,
            points_model,
            report,
        }
    }

    pub fn report(&self) -> Option<&TrainingReport> {
        self.report.as_ref()
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir).with_context(|| format!("create model dir {}", dir.display()))?;
        write_json(&dir.join(START_MODEL_FILE), &self.start_model)?;
        write_json(&dir.join(POINTS_MODEL_FILE), &self.points_model)?;
        write_json(
            &dir.join(METRICS_FILE),
            &MetricsFile {
                manifest: self.manifest.clone(),
                report: self.report.clone(),
            },
        )?;
        info!(
            "saved model {} ({} columns, fingerprint {}) to {}",
            self.manifest.model_version,
            self.manifest.width(),
            &self.manifest.fingerprint()[..12],
            dir.display()
        );
        Ok(())
    }

    pub fn load(dir: &Path) -> Result<Self> {
        let start_path = dir.join(START_MODEL_FILE);
        let points_path = dir.join(POINTS_MODEL_FILE);
        let metrics_path = dir.join(METRICS_FILE);
        if !(start_path.exists() && points_path.exists()) {
            return Err(LineupError::unavailable(format!(
                "models not found in {}; run `fpl_lineup train` first",
                dir.display()
            ))
            .into());
        }
        if !metrics_path.exists() {
            return Err(LineupError::unavailable(format!(
                "feature manifest missing in {}",
                dir.display()
            ))
            .into());
        }

        let start_model: LinearModel = read_json(&start_path)?;
        let points_model: LinearModel = read_json(&points_path)?;
        let metrics: MetricsFile = read_json(&metrics_path)?;
        debug!(
            "loaded model {} with {} columns",
            metrics.manifest.model_version,
            metrics.manifest.width()
        );
        Ok(Self::new(
            metrics.manifest,
            start_model,
            points_model,
            metrics.report,
        ))
    }
}

impl Predictor for ModelBundle {
    fn model_version(&self) -> &str {
        &self.manifest.model_version
    }

    fn manifest(&self) -> &FeatureManifest {
        &self.manifest
    }

    fn classify(&self, matrix: &FeatureMatrix) -> Result<Vec<f64>, LineupError> {
        let probs = self.start_model.predict(matrix, &self.manifest)?;
        Ok(probs.into_iter().map(|p| p.clamp(0.0, 1.0)).collect())
    }

    fn regress(&self, matrix: &FeatureMatrix) -> Result<Vec<f64>, LineupError> {
        self.points_model.predict(matrix, &self.manifest)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub week: u32,
    pub player_id: u32,
    pub start_probability: f64,
    pub expected_points: f64,
    pub model_version: String,
}

/// Serving path end to end: features for the week, then both model heads.
pub fn predict_for_week(
    history: &[StatRecord],
    league: &LeagueSnapshot,
    week: u32,
    predictor: &dyn Predictor,
) -> Result<Vec<Prediction>, LineupError> {
    let rows = features_for_week(history, league, week)?;
    let matrix = FeatureMatrix::from_rows(&rows, predictor.manifest())?;
    let p_start = predictor.classify(&matrix)?;
    let points = predictor.regress(&matrix)?;
    if p_start.len() != matrix.len() || points.len() != matrix.len() {
        return Err(LineupError::unavailable(format!(
            "predictor returned {} / {} values for {} rows",
            p_start.len(),
            points.len(),
            matrix.len()
        )));
    }

    Ok(matrix
        .player_ids
        .iter()
        .zip(p_start)
        .zip(points)
        .map(|((player_id, start_probability), expected_points)| Prediction {
            week,
            player_id: *player_id,
            start_probability,
            expected_points,
            model_version: predictor.model_version().to_string(),
        })
        .collect())
}

pub(crate) fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

fn standardized(x: f64, idx: usize, model: &LinearModel) -> f64 {
    let mu = model.feature_means.get(idx).copied().unwrap_or(0.0);
    let sigma = model.feature_stds.get(idx).copied().unwrap_or(1.0).max(1e-6);
    (x - mu) / sigma
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string_pretty(value)
        .with_context(|| format!("serialize {}", path.display()))?;
    fs::write(&tmp, json).with_context(|| format!("write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("swap {}", path.display()))?;
    Ok(())
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))
}
