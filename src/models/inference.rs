//! Inference engine: frame → preprocessor → model → threshold

use super::ArtifactPair;
use crate::error::{InferenceError, ServeError};
use crate::types::{FeatureFrame, Instance, InvocationResponse};
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Probabilities at or above this value are classified as 1
pub const DECISION_THRESHOLD: f64 = 0.5;

/// Binary class for a positive-class probability
pub fn classify(probability: f64) -> u8 {
    u8::from(probability >= DECISION_THRESHOLD)
}

/// Result of one invocation
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub predictions: Vec<u8>,
    pub probabilities: Vec<f64>,
    /// Time spent transforming, predicting and thresholding
    pub latency: Duration,
}

impl Prediction {
    pub fn len(&self) -> usize {
        self.predictions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predictions.is_empty()
    }
}

impl From<Prediction> for InvocationResponse {
    fn from(p: Prediction) -> Self {
        InvocationResponse {
            predictions: p.predictions,
            probabilities: p.probabilities,
            latency_s: p.latency.as_secs_f64(),
        }
    }
}

/// Holds the artifact pair for the lifetime of the process.
///
/// Artifacts are installed at most once; after that every handler reads them
/// without locking.
#[derive(Debug, Default)]
pub struct InferenceEngine {
    artifacts: OnceLock<ArtifactPair>,
}

impl InferenceEngine {
    /// An engine with no artifacts; `/ping` reports `model_loaded: false`
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_artifacts(artifacts: ArtifactPair) -> Self {
        let engine = Self::new();
        let _ = engine.artifacts.set(artifacts);
        engine
    }

    /// Install the artifact pair. Fails if one is already installed.
    pub fn install(&self, artifacts: ArtifactPair) -> anyhow::Result<()> {
        self.artifacts
            .set(artifacts)
            .map_err(|_| anyhow::anyhow!("Artifacts are already loaded"))?;
        info!("Artifacts installed");
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.artifacts.get().is_some()
    }

    /// Run the full pipeline over `instances`.
    ///
    /// Output element `i` always corresponds to instance `i`.
    pub fn predict(&self, instances: &[Instance]) -> Result<Prediction, ServeError> {
        let artifacts = self.artifacts.get().ok_or(ServeError::NotReady)?;

        if instances.is_empty() {
            return Ok(Prediction {
                predictions: Vec::new(),
                probabilities: Vec::new(),
                latency: Duration::ZERO,
            });
        }

        let frame = FeatureFrame::from_instances(instances);

        let start = Instant::now();
        let matrix = artifacts.preprocessor.transform(&frame)?;
        if matrix.rows() != frame.num_rows() {
            return Err(InferenceError::Runtime(format!(
                "preprocessor returned {} rows for {} instances",
                matrix.rows(),
                frame.num_rows()
            ))
            .into());
        }

        let probabilities = artifacts.model.predict_probability(&matrix)?;
        if probabilities.len() != frame.num_rows() {
            return Err(InferenceError::Runtime(format!(
                "model returned {} probabilities for {} instances",
                probabilities.len(),
                frame.num_rows()
            ))
            .into());
        }

        let predictions: Vec<u8> = probabilities.iter().map(|&p| classify(p)).collect();
        let latency = start.elapsed();

        debug!(
            instances = predictions.len(),
            columns = matrix.cols(),
            latency_us = latency.as_micros() as u64,
            "Invocation complete"
        );

        Ok(Prediction {
            predictions,
            probabilities,
            latency,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Classifier, Preprocessor};
    use crate::types::FeatureMatrix;

    /// Emits the row index as the only feature
    struct RowIndex;

    impl Preprocessor for RowIndex {
        fn transform(&self, frame: &FeatureFrame) -> Result<FeatureMatrix, InferenceError> {
            Ok(FeatureMatrix::new(
                frame.num_rows(),
                1,
                (0..frame.num_rows()).map(|i| i as f32).collect(),
            )
            .unwrap())
        }
    }

    /// Looks up a fixed probability per row
    struct Fixed(Vec<f64>);

    impl Classifier for Fixed {
        fn predict_probability(&self, m: &FeatureMatrix) -> Result<Vec<f64>, InferenceError> {
            Ok(m.iter_rows().map(|r| self.0[r[0] as usize]).collect())
        }
    }

    struct Truncating;

    impl Classifier for Truncating {
        fn predict_probability(&self, _m: &FeatureMatrix) -> Result<Vec<f64>, InferenceError> {
            Ok(vec![0.9])
        }
    }

    fn engine(probs: Vec<f64>) -> InferenceEngine {
        InferenceEngine::with_artifacts(ArtifactPair::new(Box::new(RowIndex), Box::new(Fixed(probs))))
    }

    fn instances(n: usize) -> Vec<Instance> {
        (0..n)
            .map(|i| Instance::new().with("x", i as f64))
            .collect()
    }

    #[test]
    fn test_classify_threshold_is_inclusive() {
        assert_eq!(classify(0.5), 1);
        assert_eq!(classify(0.4999999), 0);
        assert_eq!(classify(1.0), 1);
        assert_eq!(classify(0.0), 0);
        assert_eq!(classify(f64::NAN), 0);
    }

    #[test]
    fn test_predictions_follow_input_order() {
        let p = engine(vec![0.1, 0.5, 0.7, 0.49]).predict(&instances(4)).unwrap();

        assert_eq!(p.len(), 4);
        assert_eq!(p.probabilities, vec![0.1, 0.5, 0.7, 0.49]);
        assert_eq!(p.predictions, vec![0, 1, 1, 0]);
    }

    #[test]
    fn test_empty_instances() {
        let p = engine(vec![]).predict(&[]).unwrap();
        assert!(p.is_empty());
        assert!(p.probabilities.is_empty());
    }

    #[test]
    fn test_not_loaded() {
        let engine = InferenceEngine::new();
        assert!(!engine.is_loaded());
        assert!(matches!(engine.predict(&instances(1)), Err(ServeError::NotReady)));
    }

    #[test]
    fn test_install_once() {
        let engine = InferenceEngine::new();
        engine
            .install(ArtifactPair::new(Box::new(RowIndex), Box::new(Fixed(vec![0.5]))))
            .unwrap();
        assert!(engine.is_loaded());
        assert!(engine
            .install(ArtifactPair::new(Box::new(RowIndex), Box::new(Fixed(vec![0.5]))))
            .is_err());
    }

    #[test]
    fn test_length_mismatch_is_runtime_error() {
        let engine =
            InferenceEngine::with_artifacts(ArtifactPair::new(Box::new(RowIndex), Box::new(Truncating)));
        let err = engine.predict(&instances(3)).unwrap_err();
        assert!(matches!(
            err,
            ServeError::Inference(InferenceError::Runtime(_))
        ));
    }

    #[test]
    fn test_response_conversion() {
        let response: InvocationResponse = Prediction {
            predictions: vec![1],
            probabilities: vec![0.7],
            latency: Duration::from_millis(250),
        }
        .into();
        assert_eq!(response.predictions, vec![1]);
        assert_eq!(response.latency_s, 0.25);
    }
}
