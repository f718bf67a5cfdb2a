//! Column preprocessor loaded from a JSON artifact.
//!
//! The artifact lists the training features in the order the model expects
//! them. Numeric features are imputed and standardised; categorical features
//! are imputed and one-hot encoded. Columns in the request that the artifact
//! does not list are dropped.
//!
//! ```json
//! {
//!   "features": [
//!     {"name": "age", "kind": "numeric", "impute": 38.0, "mean": 38.0, "scale": 12.5},
//!     {"name": "segment", "kind": "categorical", "categories": ["a", "b"], "handle_unknown": "ignore"}
//!   ]
//! }
//! ```

use super::Preprocessor;
use crate::error::InferenceError;
use crate::types::{FeatureFrame, FeatureMatrix, FeatureValue};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// What to do with a categorical value that was not seen during training
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum HandleUnknown {
    /// Encode as all zeros
    #[default]
    Ignore,
    /// Reject the request
    Error,
}

/// One training feature
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FeatureSpec {
    Numeric {
        name: String,
        /// Replacement for null / missing values
        #[serde(default)]
        impute: Option<f64>,
        #[serde(default)]
        mean: f64,
        #[serde(default = "default_scale")]
        scale: f64,
    },
    Categorical {
        name: String,
        categories: Vec<String>,
        #[serde(default)]
        impute: Option<String>,
        #[serde(default)]
        handle_unknown: HandleUnknown,
    },
}

fn default_scale() -> f64 {
    1.0
}

impl FeatureSpec {
    pub fn name(&self) -> &str {
        match self {
            FeatureSpec::Numeric { name, .. } | FeatureSpec::Categorical { name, .. } => name,
        }
    }

    /// Number of output columns this feature produces
    pub fn width(&self) -> usize {
        match self {
            FeatureSpec::Numeric { .. } => 1,
            FeatureSpec::Categorical { categories, .. } => categories.len(),
        }
    }

    fn encode(
        &self,
        value: &FeatureValue,
        row: usize,
        out: &mut Vec<f32>,
    ) -> Result<(), InferenceError> {
        match self {
            FeatureSpec::Numeric {
                name,
                impute,
                mean,
                scale,
            } => {
                let x = match value {
                    FeatureValue::Number(x) => *x,
                    FeatureValue::Null => impute.ok_or_else(|| InferenceError::MissingValue {
                        column: name.clone(),
                        row,
                    })?,
                    other => {
                        return Err(InferenceError::TypeMismatch {
                            column: name.clone(),
                            row,
                            expected: "number",
                            found: other.type_name(),
                        })
                    }
                };
                // A zero-variance column is left unscaled
                let scale = if *scale == 0.0 { 1.0 } else { *scale };
                out.push(((x - mean) / scale) as f32);
            }
            FeatureSpec::Categorical {
                name,
                categories,
                impute,
                handle_unknown,
            } => {
                let label = match value {
                    FeatureValue::Text(s) => Some(s.clone()),
                    FeatureValue::Number(x) => Some(x.to_string()),
                    FeatureValue::Null => impute.clone(),
                };
                let hit = label
                    .as_deref()
                    .and_then(|l| categories.iter().position(|c| c == l));

                if hit.is_none() && *handle_unknown == HandleUnknown::Error {
                    return Err(InferenceError::UnknownCategory {
                        column: name.clone(),
                        row,
                        value: label.unwrap_or_else(|| "null".to_string()),
                    });
                }

                out.extend((0..categories.len()).map(|i| if Some(i) == hit { 1.0 } else { 0.0 }));
            }
        }
        Ok(())
    }
}

/// Preprocessor artifact: an ordered list of [`FeatureSpec`]s
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ColumnPreprocessor {
    features: Vec<FeatureSpec>,
}

impl ColumnPreprocessor {
    pub fn new(features: Vec<FeatureSpec>) -> Self {
        Self { features }
    }

    /// Parse the artifact from JSON bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let preprocessor: Self =
            serde_json::from_slice(bytes).context("Failed to parse preprocessor artifact")?;
        if preprocessor.features.is_empty() {
            anyhow::bail!("Preprocessor artifact declares no features");
        }
        Ok(preprocessor)
    }

    /// Load the artifact from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read preprocessor from {:?}", path))?;
        Self::from_slice(&bytes)
    }

    pub fn features(&self) -> &[FeatureSpec] {
        &self.features
    }

    /// Number of columns in the output matrix
    pub fn output_width(&self) -> usize {
        self.features.iter().map(FeatureSpec::width).sum()
    }
}

impl Preprocessor for ColumnPreprocessor {
    fn transform(&self, frame: &FeatureFrame) -> Result<FeatureMatrix, InferenceError> {
        let width = self.output_width();
        if frame.is_empty() {
            return Ok(FeatureMatrix::empty(width));
        }

        if let Some(missing) = self.features.iter().find(|f| !frame.has_column(f.name())) {
            return Err(InferenceError::MissingFeature(missing.name().to_string()));
        }

        let mut data = Vec::with_capacity(frame.num_rows() * width);
        for row in 0..frame.num_rows() {
            for feature in &self.features {
                feature.encode(frame.value(row, feature.name()), row, &mut data)?;
            }
        }

        FeatureMatrix::new(frame.num_rows(), width, data)
            .ok_or_else(|| InferenceError::Runtime("preprocessor produced a ragged matrix".into()))
    }
}
