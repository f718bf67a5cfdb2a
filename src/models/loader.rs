//! Artifact loader

use super::{ArtifactPair, Classifier, ColumnPreprocessor, LogisticModel, OnnxClassifier, Preprocessor};
use crate::config::{AppConfig, ModelFormat};
use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

/// Loads the preprocessor and model artifacts from disk
#[derive(Debug, Clone)]
pub struct ArtifactLoader {
    model_format: ModelFormat,
    /// Number of threads for ONNX inference
    onnx_threads: usize,
    /// Number of ONNX sessions in the pool
    onnx_sessions: usize,
}

impl ArtifactLoader {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            model_format: config.model_format,
            onnx_threads: config.onnx_threads,
            onnx_sessions: config.onnx_sessions,
        }
    }

    /// Resolve [`ModelFormat::Auto`] from the file extension
    pub fn resolve_format(&self, path: &Path) -> ModelFormat {
        match self.model_format {
            ModelFormat::Auto => match path.extension().and_then(|e| e.to_str()) {
                Some(ext) if ext.eq_ignore_ascii_case("json") => ModelFormat::Logistic,
                _ => ModelFormat::Onnx,
            },
            format => format,
        }
    }

    pub fn load_preprocessor<P: AsRef<Path>>(&self, path: P) -> Result<Box<dyn Preprocessor>> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading preprocessor");

        let preprocessor = ColumnPreprocessor::from_file(path)?;
        info!(
            features = preprocessor.features().len(),
            output_width = preprocessor.output_width(),
            "Preprocessor loaded"
        );
        Ok(Box::new(preprocessor))
    }

    pub fn load_model<P: AsRef<Path>>(&self, path: P) -> Result<Box<dyn Classifier>> {
        let path = path.as_ref();
        let format = self.resolve_format(path);
        info!(path = %path.display(), format = ?format, "Loading model");

        let model: Box<dyn Classifier> = match format {
            ModelFormat::Logistic => {
                let model = LogisticModel::from_file(path)?;
                info!(features = model.num_features(), "Logistic model loaded");
                Box::new(model)
            }
            ModelFormat::Onnx | ModelFormat::Auto => Box::new(OnnxClassifier::from_file(
                path,
                self.onnx_threads,
                self.onnx_sessions,
            )?),
        };
        Ok(model)
    }

    /// Load both artifacts; fails if either one cannot be loaded.
    pub fn load<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        preproc_path: P,
        model_path: Q,
    ) -> Result<ArtifactPair> {
        let preprocessor = self
            .load_preprocessor(preproc_path)
            .context("Failed to load preprocessor artifact")?;
        let model = self
            .load_model(model_path)
            .context("Failed to load model artifact")?;
        Ok(ArtifactPair::new(preprocessor, model))
    }
}

/// Load the artifact pair named by the configuration
pub fn load_artifacts(config: &AppConfig) -> Result<ArtifactPair> {
    ArtifactLoader::new(config).load(&config.preproc_path, &config.model_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FeatureFrame, Instance};
    use std::path::PathBuf;

    fn artifacts_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("artifacts")
    }

    fn sample_config() -> AppConfig {
        AppConfig {
            model_path: artifacts_dir().join("model.json"),
            preproc_path: artifacts_dir().join("preproc.json"),
            ..AppConfig::default()
        }
    }

    #[test]
    fn test_resolve_format() {
        let loader = ArtifactLoader::new(&AppConfig::default());
        assert_eq!(loader.resolve_format(Path::new("m.json")), ModelFormat::Logistic);
        assert_eq!(loader.resolve_format(Path::new("m.onnx")), ModelFormat::Onnx);
        assert_eq!(loader.resolve_format(Path::new("model.joblib")), ModelFormat::Onnx);

        let forced = ArtifactLoader::new(&AppConfig {
            model_format: ModelFormat::Logistic,
            ..AppConfig::default()
        });
        assert_eq!(forced.resolve_format(Path::new("model.bin")), ModelFormat::Logistic);
    }

    #[test]
    fn test_load_sample_artifacts() {
        let artifacts = load_artifacts(&sample_config()).unwrap();

        let instances = [
            Instance::new().with("age", 25.0).with("income", 50000.0),
            Instance::new()
                .with("age", 61.0)
                .with("income", 12000.0)
                .with("employment", "unemployed"),
        ];
        let frame = FeatureFrame::from_instances(&instances);
        let matrix = artifacts.preprocessor.transform(&frame).unwrap();
        let probs = artifacts.model.predict_probability(&matrix).unwrap();

        assert_eq!(probs.len(), 2);
        assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn test_missing_artifact_fails() {
        let config = AppConfig {
            preproc_path: artifacts_dir().join("nope.json"),
            ..sample_config()
        };
        let err = load_artifacts(&config).unwrap_err();
        assert!(format!("{:#}", err).contains("preprocessor"));

        let config = AppConfig {
            model_path: artifacts_dir().join("nope.json"),
            ..sample_config()
        };
        assert!(load_artifacts(&config).is_err());
    }

    #[test]
    fn test_corrupt_artifact_fails() {
        // The preprocessor JSON is not a logistic model
        let config = AppConfig {
            model_path: artifacts_dir().join("preproc.json"),
            ..sample_config()
        };
        assert!(load_artifacts(&config).is_err());
    }
}
