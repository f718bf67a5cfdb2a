//! Inference Service Library
//!
//! Loads a preprocessor and a binary classifier once at startup and serves
//! predictions over HTTP, with a health check and Prometheus metrics.

pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod server;
pub mod types;

pub use config::AppConfig;
pub use error::{InferenceError, ServeError};
pub use metrics::ServiceMetrics;
pub use models::{load_artifacts, ArtifactPair, Classifier, InferenceEngine, Preprocessor};
pub use server::{router, AppState};
pub use types::{FeatureFrame, FeatureMatrix, Instance, InvocationRequest, InvocationResponse};
