use log::info;
use serde::Serialize;

use super::detector::{AnomalyDetector, DetectorSettings};
use crate::error::ConfigError;
use crate::metrics::Sample;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AnomalyReport {
    pub timestamp: i64,
    pub score: f64,
    pub is_anomaly: bool,
}

/// Consumer-side owner of the detector and its retraining schedule.
///
/// Trains once the history first holds `min_samples` entries, then again at
/// every `min_samples + n * relearning_interval`, always on the full snapshot
/// handed in. Thresholds are fixed by the settings, not by the length polled
/// at the last training, so a late poll does not push later retrains back.
pub struct AnomalyMonitor {
    detector: AnomalyDetector,
    next_retrain_at: usize,
}

impl AnomalyMonitor {
    pub fn new(settings: DetectorSettings) -> Result<Self, ConfigError> {
        let detector = AnomalyDetector::new(settings)?;
        let next_retrain_at = detector.settings().min_samples;
        Ok(AnomalyMonitor {
            detector,
            next_retrain_at,
        })
    }

    pub fn detector(&self) -> &AnomalyDetector {
        &self.detector
    }

    pub fn settings(&self) -> &DetectorSettings {
        self.detector.settings()
    }

    pub fn is_trained(&self) -> bool {
        self.detector.is_trained()
    }

    /// Swaps in a fresh, untrained detector. Invalid settings are rejected and
    /// the current detector stays active.
    pub fn reconfigure(&mut self, settings: DetectorSettings) -> Result<(), ConfigError> {
        let detector = AnomalyDetector::new(settings)?;
        info!(
            "anomaly detector reconfigured (contamination {}, min_samples {}, relearning every {})",
            detector.settings().contamination,
            detector.settings().min_samples,
            detector.settings().relearning_interval
        );
        self.next_retrain_at = detector.settings().min_samples;
        self.detector = detector;
        Ok(())
    }

    pub fn retrain_due(&self, history_len: usize) -> bool {
        history_len >= self.next_retrain_at
    }

    /// History length at which the next training is attempted.
    pub fn next_retrain_at(&self) -> usize {
        self.next_retrain_at
    }

    /// First threshold strictly above `trained_len` on the
    /// `min_samples + n * relearning_interval` grid.
    fn threshold_after(&self, trained_len: usize) -> usize {
        let settings = self.detector.settings();
        let past = trained_len.saturating_sub(settings.min_samples);
        let steps = past / settings.relearning_interval + 1;
        settings.min_samples + steps * settings.relearning_interval
    }

    /// Retrains when due, then scores the newest successful sample.
    pub fn observe(&mut self, history: &[Sample]) -> Option<AnomalyReport> {
        if self.retrain_due(history.len()) && self.detector.train(history) {
            self.next_retrain_at = self.threshold_after(history.len());
        }

        let (timestamp, metrics) = history
            .iter()
            .rev()
            .find_map(|sample| sample.metrics().map(|m| (sample.timestamp, m)))?;
        let score = self.detector.score(metrics);
        Some(AnomalyReport {
            timestamp,
            score,
            is_anomaly: score < 0.0,
        })
    }
}
