use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::LineupError;
use crate::features::FeatureRow;

/// Ordered feature columns a model was fitted on. Loaded once with the model
/// and shared read-only by every prediction call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureManifest {
    pub model_version: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub generated_at: String,
}

impl FeatureManifest {
    pub fn new(model_version: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            model_version: model_version.into(),
            columns,
            generated_at: Utc::now().to_rfc3339(),
        }
    }

    /// Manifest for the columns the feature pipeline currently emits.
    pub fn standard(model_version: impl Into<String>) -> Self {
        Self::new(model_version, FeatureRow::column_names())
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Hex SHA-256 over the ordered column names.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for col in &self.columns {
            hasher.update(col.as_bytes());
            hasher.update([0u8]);
        }
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }

    /// Exact match required: same names, same order.
    pub fn verify(&self, columns: &[String]) -> Result<(), LineupError> {
        if columns == self.columns.as_slice() {
            return Ok(());
        }
        let detail = if let Some(missing) = self.columns.iter().find(|c| !columns.contains(c)) {
            format!("missing column {missing}")
        } else if let Some(extra) = columns.iter().find(|c| !self.columns.contains(c)) {
            format!("unexpected column {extra}")
        } else {
            let idx = columns
                .iter()
                .zip(&self.columns)
                .position(|(a, b)| a != b)
                .unwrap_or(0);
            format!("column order differs at index {idx}")
        };
        Err(LineupError::FeatureMismatch {
            expected: self.columns.len(),
            actual: columns.len(),
            detail,
        })
    }
}

/// Rows = players, named numeric columns.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    pub columns: Vec<String>,
    pub player_ids: Vec<u32>,
    pub rows: Vec<Vec<f64>>,
}

impl FeatureMatrix {
    pub fn from_rows(rows: &[FeatureRow], manifest: &FeatureManifest) -> Result<Self, LineupError> {
        let columns = FeatureRow::column_names();
        manifest.verify(&columns)?;
        Ok(Self {
            columns,
            player_ids: rows.iter().map(|r| r.player_id).collect(),
            rows: rows.iter().map(FeatureRow::values).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_manifest_accepts_pipeline_columns() {
        let manifest = FeatureManifest::standard("test");
        assert!(manifest.verify(&FeatureRow::column_names()).is_ok());
        assert_eq!(manifest.fingerprint().len(), 64);
    }

    #[test]
    fn reordered_columns_are_rejected() {
        let manifest = FeatureManifest::standard("test");
        let mut cols = FeatureRow::column_names();
        cols.swap(0, 1);
        match manifest.verify(&cols) {
            Err(LineupError::FeatureMismatch { detail, .. }) => {
                assert!(detail.contains("order"), "{detail}");
            }
            other => panic!("expected mismatch, got {other:?}"),
        }
    }

    #[test]
    fn fingerprint_tracks_column_set() {
        let a = FeatureManifest::standard("a");
        let b = FeatureManifest::standard("b");
        assert_eq!(a.fingerprint(), b.fingerprint());
        let mut cols = FeatureRow::column_names();
        cols.pop();
        let c = FeatureManifest::new("c", cols);
        assert_ne!(a.fingerprint(), c.fingerprint());
    }
}
