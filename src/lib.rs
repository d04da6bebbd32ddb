pub mod actual_lineup;
pub mod config;
pub mod context;
pub mod error;
pub mod features;
pub mod formation;
pub mod lineup;
pub mod manifest;
pub mod predictor;
pub mod records;
pub mod roster;
pub mod store;
pub mod synthetic;
pub mod training;

pub use actual_lineup::{RealizedCandidate, generate_actual_lineup};
pub use context::features_for_week;
pub use error::LineupError;
pub use features::{FeatureRow, assemble_features};
pub use formation::Formation;
pub use lineup::{ProjectedCandidate, generate_optimal_lineup};
pub use predictor::{ModelBundle, Prediction, Predictor, predict_for_week};
pub use roster::{LineupPlayer, LineupResult};
