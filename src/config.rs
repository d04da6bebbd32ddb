use std::env;
use std::path::PathBuf;

use log::warn;

use crate::formation::{DEFAULT_FORMATION, Formation};
use crate::store::default_db_path;

pub const DEFAULT_MODEL_DIR: &str = "./models_store";
pub const DEFAULT_MODEL_VERSION: &str = "linear_v1";
pub const DEFAULT_BUDGET: f64 = 100.0;
pub const DEFAULT_MAX_PER_TEAM: u32 = 3;

#[derive(Debug, Clone)]
pub struct Settings {
    pub db_path: PathBuf,
    pub model_dir: PathBuf,
    pub model_version: String,
    pub formation: Formation,
    pub budget: f64,
    pub max_per_team: u32,
}

impl Settings {
    /// Loads `.env.local` then `.env` (first value wins) and reads the process
    /// environment.
    pub fn from_env() -> Self {
        let _ = dotenvy::from_filename(".env.local");
        let _ = dotenvy::from_filename(".env");
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let db_path = var("FPL_DB_PATH")
            .map(PathBuf::from)
            .or_else(default_db_path)
            .unwrap_or_else(|| PathBuf::from("fpl.sqlite"));
        let formation = match var("LINEUP_FORMATION") {
            Some(raw) => Formation::parse(&raw).unwrap_or_else(|err| {
                warn!("LINEUP_FORMATION ignored ({err}), using {DEFAULT_FORMATION}");
                Formation::default()
            }),
            None => Formation::default(),
        };

        Self {
            db_path,
            model_dir: var("MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_DIR)),
            model_version: var("MODEL_VERSION").unwrap_or_else(|| DEFAULT_MODEL_VERSION.to_string()),
            formation,
            budget: var("LINEUP_BUDGET")
                .and_then(|v| v.parse::<f64>().ok())
                .filter(|v| v.is_finite() && *v >= 0.0)
                .unwrap_or(DEFAULT_BUDGET),
            max_per_team: var("LINEUP_MAX_PER_TEAM")
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(DEFAULT_MAX_PER_TEAM)
                .max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn settings(pairs: &[(&str, &str)]) -> Settings {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let s = settings(&[("FPL_DB_PATH", "/tmp/x.sqlite")]);
        assert_eq!(s.db_path, PathBuf::from("/tmp/x.sqlite"));
        assert_eq!(s.model_dir, PathBuf::from(DEFAULT_MODEL_DIR));
        assert_eq!(s.model_version, DEFAULT_MODEL_VERSION);
        assert_eq!(s.formation.name(), "4-4-2");
        assert_eq!(s.budget, DEFAULT_BUDGET);
        assert_eq!(s.max_per_team, DEFAULT_MAX_PER_TEAM);
    }

    #[test]
    fn overrides_and_bad_values() {
        let s = settings(&[
            ("LINEUP_FORMATION", "3-5-2"),
            ("LINEUP_BUDGET", "-4"),
            ("LINEUP_MAX_PER_TEAM", "0"),
            ("MODEL_VERSION", " v9 "),
        ]);
        assert_eq!(s.formation.name(), "3-5-2");
        assert_eq!(s.budget, DEFAULT_BUDGET);
        assert_eq!(s.max_per_team, 1);
        assert_eq!(s.model_version, "v9");

        let s = settings(&[("LINEUP_FORMATION", "diamond")]);
        assert_eq!(s.formation, Formation::default());
    }
}
