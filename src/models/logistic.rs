//! Logistic regression model loaded from a JSON artifact
//! (`{"coefficients": [...], "intercept": 0.0}`).

use super::Classifier;
use crate::error::InferenceError;
use crate::types::FeatureMatrix;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LogisticModel {
    coefficients: Vec<f64>,
    #[serde(default)]
    intercept: f64,
}

impl LogisticModel {
    pub fn new(coefficients: Vec<f64>, intercept: f64) -> Self {
        Self {
            coefficients,
            intercept,
        }
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let model: Self =
            serde_json::from_slice(bytes).context("Failed to parse logistic model artifact")?;
        if model.coefficients.is_empty() {
            anyhow::bail!("Logistic model artifact has no coefficients");
        }
        Ok(model)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            std::fs::read(path).with_context(|| format!("Failed to read model from {:?}", path))?;
        Self::from_slice(&bytes)
    }

    pub fn num_features(&self) -> usize {
        self.coefficients.len()
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

impl Classifier for LogisticModel {
    fn predict_probability(&self, matrix: &FeatureMatrix) -> Result<Vec<f64>, InferenceError> {
        if matrix.cols() != self.coefficients.len() {
            return Err(InferenceError::ShapeMismatch {
                expected: self.coefficients.len(),
                found: matrix.cols(),
            });
        }

        Ok(matrix
            .iter_rows()
            .map(|row| {
                let z = row
                    .iter()
                    .zip(&self.coefficients)
                    .map(|(&x, w)| x as f64 * w)
                    .sum::<f64>()
                    + self.intercept;
                sigmoid(z)
            })
            .collect())
    }
}
