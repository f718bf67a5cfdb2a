//! Artifact capability interface and the concrete artifact formats
//!
//! The service only needs two operations from its artifacts: the
//! preprocessor turns a [`FeatureFrame`] into a [`FeatureMatrix`], and the
//! model turns that matrix into positive-class probabilities. Any format that
//! implements [`Preprocessor`] / [`Classifier`] can be served.

pub mod inference;
pub mod loader;
pub mod logistic;
pub mod onnx;
pub mod preprocessor;

use crate::error::InferenceError;
use crate::types::{FeatureFrame, FeatureMatrix};

pub use inference::{InferenceEngine, Prediction};
pub use loader::{load_artifacts, ArtifactLoader};
pub use logistic::LogisticModel;
pub use onnx::OnnxClassifier;
pub use preprocessor::ColumnPreprocessor;

/// Turns raw feature records into the numeric matrix the model was trained on.
pub trait Preprocessor: Send + Sync {
    fn transform(&self, frame: &FeatureFrame) -> Result<FeatureMatrix, InferenceError>;
}

/// Binary classifier returning `P(class = 1)` for every matrix row.
pub trait Classifier: Send + Sync {
    fn predict_probability(&self, matrix: &FeatureMatrix) -> Result<Vec<f64>, InferenceError>;
}

/// The preprocessor and model, loaded together at startup and read-only afterwards.
pub struct ArtifactPair {
    pub preprocessor: Box<dyn Preprocessor>,
    pub model: Box<dyn Classifier>,
}

impl ArtifactPair {
    pub fn new(preprocessor: Box<dyn Preprocessor>, model: Box<dyn Classifier>) -> Self {
        Self {
            preprocessor,
            model,
        }
    }
}

impl std::fmt::Debug for ArtifactPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactPair").finish_non_exhaustive()
    }
}
