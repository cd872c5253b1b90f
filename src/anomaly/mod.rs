mod detector;
mod forest;
mod monitor;

pub use detector::{
    feature_matrix, features, AnomalyDetector, DetectorSettings, FeatureVector,
    MIN_SAMPLES_FLOOR,
};
pub use forest::{average_path_length, percentile, ForestParams, IsolationForest};
pub use monitor::{AnomalyMonitor, AnomalyReport};
