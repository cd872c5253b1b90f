use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::forest::{ForestParams, IsolationForest};
use crate::error::ConfigError;
use crate::metrics::{Metrics, Sample};

/// Smallest history a detector may be configured to train on.
pub const MIN_SAMPLES_FLOOR: usize = 10;

/// `[cpu_usage_percent, memory_percent]`
pub type FeatureVector = [f64; 2];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorSettings {
    pub contamination: f64,
    pub min_samples: usize,
    pub relearning_interval: usize,
    pub random_state: u64,
    pub n_estimators: usize,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        DetectorSettings {
            contamination: 0.01,
            min_samples: 60,
            relearning_interval: 60,
            random_state: 42,
            n_estimators: 100,
        }
    }
}

impl DetectorSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.contamination > 0.0 && self.contamination <= 0.5) {
            return Err(ConfigError::ContaminationOutOfRange(self.contamination));
        }
        if self.min_samples < MIN_SAMPLES_FLOOR {
            return Err(ConfigError::MinSamplesTooSmall {
                got: self.min_samples,
                floor: MIN_SAMPLES_FLOOR,
            });
        }
        if self.relearning_interval == 0 {
            return Err(ConfigError::InvalidRelearningInterval);
        }
        if self.n_estimators == 0 {
            return Err(ConfigError::InvalidEstimatorCount);
        }
        Ok(())
    }

    fn forest_params(&self) -> ForestParams {
        ForestParams {
            n_estimators: self.n_estimators,
            contamination: self.contamination,
            random_state: self.random_state,
        }
    }
}

pub fn features(metrics: &Metrics) -> FeatureVector {
    [metrics.cpu_usage_percent, metrics.memory_percent]
}

/// Feature rows for every successful sample; error samples are skipped.
pub fn feature_matrix(history: &[Sample]) -> Vec<FeatureVector> {
    history
        .iter()
        .filter_map(Sample::metrics)
        .map(features)
        .collect()
}

/// Isolation-forest scorer over CPU% and memory%.
///
/// Holds its own model state; a settings change means building a new
/// detector, never mutating this one.
pub struct AnomalyDetector {
    settings: DetectorSettings,
    model: Option<IsolationForest<2>>,
}

impl AnomalyDetector {
    pub fn new(settings: DetectorSettings) -> Result<Self, ConfigError> {
        settings.validate()?;
        Ok(AnomalyDetector {
            settings,
            model: None,
        })
    }

    pub fn settings(&self) -> &DetectorSettings {
        &self.settings
    }

    pub fn is_trained(&self) -> bool {
        self.model.is_some()
    }

    /// Fits on every successful sample of `history`. Returns `false` and keeps
    /// the previous model when fewer than `min_samples` of them exist.
    pub fn train(&mut self, history: &[Sample]) -> bool {
        let matrix = feature_matrix(history);
        if matrix.len() < self.settings.min_samples {
            debug!(
                "not training: {} usable samples, need {}",
                matrix.len(),
                self.settings.min_samples
            );
            return false;
        }
        match IsolationForest::fit(&matrix, &self.settings.forest_params()) {
            Some(model) => {
                info!(
                    "anomaly model trained on {} samples (offset {:.4})",
                    matrix.len(),
                    model.offset()
                );
                self.model = Some(model);
                true
            }
            None => false,
        }
    }

    /// `0.0` while untrained. Otherwise negative means anomalous; the
    /// magnitude is not a probability.
    pub fn score(&self, metrics: &Metrics) -> f64 {
        match &self.model {
            Some(model) => model.decision_function(&features(metrics)),
            None => 0.0,
        }
    }

    pub fn is_anomaly(&self, metrics: &Metrics) -> bool {
        self.score(metrics) < 0.0
    }
}
