//! Response bodies

use serde::{Deserialize, Serialize};

/// Body of `GET /ping`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingResponse {
    pub status: String,
    pub model_loaded: bool,
}

impl PingResponse {
    pub fn ok(model_loaded: bool) -> Self {
        Self {
            status: "ok".to_string(),
            model_loaded,
        }
    }
}

/// Body of a successful `POST /invocations`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationResponse {
    /// Binary class per instance (probability >= threshold)
    pub predictions: Vec<u8>,
    /// Probability of the positive class per instance
    pub probabilities: Vec<f64>,
    /// Wall-clock time spent in preprocessing + prediction
    pub latency_s: f64,
}

/// Body of every error response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
