//! ONNX classifier executed with ONNX Runtime

use super::Classifier;
use crate::error::InferenceError;
use crate::types::FeatureMatrix;
use anyhow::{Context, Result};
use ort::memory::Allocator;
use ort::session::{builder::GraphOptimizationLevel, Session, SessionOutputs};
use ort::value::{DowncastableTarget, DynMapValueType, DynSequenceValueType, DynValue, Tensor};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::{debug, info};

/// Binary classifier backed by a pool of ONNX Runtime sessions.
///
/// `Session::run` needs exclusive access, so each session sits behind its own
/// mutex and concurrent calls spread across the pool.
pub struct OnnxClassifier {
    sessions: Vec<Mutex<Session>>,
    next: AtomicUsize,
    /// Input name for the model
    input_name: String,
    /// Output name for probabilities
    output_name: String,
}

impl OnnxClassifier {
    /// Load `pool_size` sessions of the model at `path`, each using `threads`
    /// intra-op threads.
    pub fn from_file<P: AsRef<Path>>(path: P, threads: usize, pool_size: usize) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            anyhow::bail!("Model file not found: {}", path.display());
        }

        // Later loads reuse the environment from the first commit
        if ort::init().with_name("inference-service").commit()? {
            info!("ONNX Runtime initialized");
        }

        info!(path = %path.display(), threads, sessions = pool_size, "Loading ONNX model");

        let sessions = (0..pool_size.max(1))
            .map(|_| {
                Session::builder()?
                    .with_optimization_level(GraphOptimizationLevel::Level3)?
                    .with_intra_threads(threads)?
                    .commit_from_file(path)
                    .context(format!("Failed to load model from {:?}", path))
            })
            .collect::<Result<Vec<Session>>>()?;

        let first = &sessions[0];
        let input_name = first
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "float_input".to_string());

        let output_name = first
            .outputs
            .iter()
            .find(|o| o.name.contains("prob") || o.name.contains("output"))
            .map(|o| o.name.clone())
            .unwrap_or_else(|| {
                first
                    .outputs
                    .last()
                    .map(|o| o.name.clone())
                    .unwrap_or_else(|| "probabilities".to_string())
            });

        info!(input = %input_name, output = %output_name, "Model loaded successfully");

        Ok(Self {
            sessions: sessions.into_iter().map(Mutex::new).collect(),
            next: AtomicUsize::new(0),
            input_name,
            output_name,
        })
    }

    pub fn pool_size(&self) -> usize {
        self.sessions.len()
    }

    /// Run `f` on an idle session, or wait for one picked round-robin.
    fn with_session<R>(&self, f: impl FnOnce(&mut Session) -> R) -> Result<R, InferenceError> {
        for slot in &self.sessions {
            if let Ok(mut session) = slot.try_lock() {
                return Ok(f(&mut session));
            }
        }

        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.sessions.len();
        let mut session = self.sessions[idx]
            .lock()
            .map_err(|_| InferenceError::Runtime("ONNX session lock poisoned".into()))?;
        Ok(f(&mut session))
    }

    /// Read class-1 probabilities for `rows` rows from the session outputs.
    /// Handles tensor outputs (XGBoost, scikit-learn) and `seq(map(int64, float))`
    /// outputs (LightGBM, CatBoost converters).
    fn extract_probabilities(
        &self,
        outputs: &SessionOutputs,
        rows: usize,
    ) -> Result<Vec<f64>, InferenceError> {
        if let Some(output) = outputs.get(self.output_name.as_str()) {
            if let Some(probs) = probabilities_from_value(output, rows)? {
                return Ok(probs);
            }
        }

        for (name, output) in outputs.iter() {
            if name.contains("label") {
                continue;
            }
            if let Some(probs) = probabilities_from_value(&output, rows)? {
                debug!(output = %name, "Extracted probabilities from fallback output");
                return Ok(probs);
            }
        }

        Err(InferenceError::Runtime(
            "model produced no probability output".into(),
        ))
    }
}

fn probabilities_from_value(
    output: &DynValue,
    rows: usize,
) -> Result<Option<Vec<f64>>, InferenceError> {
    if let Ok((shape, data)) = output.try_extract_tensor::<f32>() {
        let dims: Vec<i64> = shape.iter().copied().collect();
        return probabilities_from_tensor(&dims, data, rows).map(Some);
    }

    if DynSequenceValueType::can_downcast(&output.dtype()) {
        return probabilities_from_sequence_map(output, rows).map(Some);
    }

    Ok(None)
}

/// Class-1 probability per row from a `[rows, classes]` or `[rows]` tensor.
fn probabilities_from_tensor(
    dims: &[i64],
    data: &[f32],
    rows: usize,
) -> Result<Vec<f64>, InferenceError> {
    let unexpected = || InferenceError::Runtime(format!("unexpected probability shape {:?}", dims));

    match dims {
        [n, classes] if *n as usize == rows && *classes >= 2 => {
            let classes = *classes as usize;
            if data.len() < rows * classes {
                return Err(unexpected());
            }
            Ok((0..rows).map(|i| data[i * classes + 1] as f64).collect())
        }
        [n, 1] | [n] if *n as usize == rows && data.len() >= rows => {
            Ok(data[..rows].iter().map(|&p| p as f64).collect())
        }
        _ => Err(unexpected()),
    }
}

fn probabilities_from_sequence_map(
    output: &DynValue,
    rows: usize,
) -> Result<Vec<f64>, InferenceError> {
    let runtime = |e: ort::Error| InferenceError::Runtime(e.to_string());
    let allocator = Allocator::default();

    let sequence = output
        .downcast_ref::<DynSequenceValueType>()
        .map_err(runtime)?;
    let maps = sequence
        .try_extract_sequence::<DynMapValueType>(&allocator)
        .map_err(runtime)?;

    if maps.len() != rows {
        return Err(InferenceError::Runtime(format!(
            "model returned {} probability maps for {} rows",
            maps.len(),
            rows
        )));
    }

    maps.iter()
        .map(|map| {
            let pairs = map.try_extract_key_values::<i64, f32>().map_err(runtime)?;
            class_one_probability(&pairs)
        })
        .collect()
}

fn class_one_probability(pairs: &[(i64, f32)]) -> Result<f64, InferenceError> {
    if let Some((_, p)) = pairs.iter().find(|(class, _)| *class == 1) {
        return Ok(*p as f64);
    }
    if let Some((_, p)) = pairs.iter().find(|(class, _)| *class == 0) {
        return Ok(1.0 - *p as f64);
    }
    Err(InferenceError::Runtime("no class probability in map".into()))
}

impl Classifier for OnnxClassifier {
    fn predict_probability(&self, matrix: &FeatureMatrix) -> Result<Vec<f64>, InferenceError> {
        let rows = matrix.rows();
        if rows == 0 {
            return Ok(Vec::new());
        }

        let shape = vec![rows as i64, matrix.cols() as i64];
        let input_tensor = Tensor::from_array((shape, matrix.as_slice().to_vec()))
            .map_err(|e| InferenceError::Runtime(format!("failed to create input tensor: {}", e)))?;

        self.with_session(|session| {
            let outputs = session
                .run(ort::inputs![&self.input_name => input_tensor])
                .map_err(|e| InferenceError::Runtime(e.to_string()))?;
            self.extract_probabilities(&outputs, rows)
        })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tensor_two_classes() {
        let data = [0.9, 0.1, 0.3, 0.7];
        let p = probabilities_from_tensor(&[2, 2], &data, 2).unwrap();
        assert_eq!(p.len(), 2);
        assert!((p[0] - 0.1).abs() < 1e-6);
        assert!((p[1] - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_tensor_single_column() {
        let p = probabilities_from_tensor(&[3, 1], &[0.25, 0.5, 0.75], 3).unwrap();
        assert_eq!(p, vec![0.25, 0.5, 0.75]);

        let p = probabilities_from_tensor(&[2], &[0.5, 1.0], 2).unwrap();
        assert_eq!(p, vec![0.5, 1.0]);
    }

    #[test]
    fn test_tensor_row_count_mismatch() {
        assert!(probabilities_from_tensor(&[1, 2], &[0.5, 0.5], 2).is_err());
        assert!(probabilities_from_tensor(&[2, 2, 2], &[0.0; 8], 2).is_err());
    }

    #[test]
    fn test_class_one_probability() {
        assert_eq!(class_one_probability(&[(0, 0.25), (1, 0.75)]).unwrap(), 0.75);
        assert_eq!(class_one_probability(&[(0, 0.25)]).unwrap(), 0.75);
        assert!(class_one_probability(&[]).is_err());
    }

    #[test]
    fn test_missing_model_file() {
        assert!(OnnxClassifier::from_file("does/not/exist.onnx", 1, 1).is_err());
    }

    #[test]
    fn test_repeated_load_reuses_runtime() {
        // Not an ONNX graph: the runtime comes up, the session build fails
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/artifacts/model.json");
        for _ in 0..2 {
            let err = OnnxClassifier::from_file(path, 1, 1).err().unwrap();
            assert!(format!("{:#}", err).contains("Failed to load model"));
        }
    }
}
