//! Configuration management for the inference service

use anyhow::{Context, Result};
use config::{Config, File, FileFormat};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;

pub const DEFAULT_MODEL_PATH: &str = "/opt/ml/model/model.joblib";
pub const DEFAULT_PREPROC_PATH: &str = "/opt/ml/model/preproc.joblib";
pub const DEFAULT_PORT: u16 = 8080;

/// Environment variables that override file/default settings, with the key they set.
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("MODEL_PATH", "model_path"),
    ("PREPROC_PATH", "preproc_path"),
    ("PORT", "port"),
    ("BIND_HOST", "bind_host"),
    ("MODEL_FORMAT", "model_format"),
    ("ONNX_THREADS", "onnx_threads"),
    ("ONNX_SESSIONS", "onnx_sessions"),
    ("LOG_FORMAT", "log_format"),
];

/// How the model artifact is decoded
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelFormat {
    /// Pick by file extension: `.json` is a logistic model, anything else ONNX
    #[default]
    Auto,
    /// ONNX graph executed by ONNX Runtime
    Onnx,
    /// JSON coefficients + intercept
    Logistic,
}

/// Log output format
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Path to the model artifact
    pub model_path: PathBuf,
    /// Path to the preprocessor artifact
    pub preproc_path: PathBuf,
    /// Listening port
    pub port: u16,
    /// Listening address
    pub bind_host: String,
    /// Model artifact format
    #[serde(default)]
    pub model_format: ModelFormat,
    /// Intra-op threads per ONNX session
    pub onnx_threads: usize,
    /// Number of ONNX sessions kept for concurrent requests
    pub onnx_sessions: usize,
    /// Log format (pretty, json)
    #[serde(default)]
    pub log_format: LogFormat,
}

impl AppConfig {
    /// Load configuration from defaults, the file named by `CONFIG_FILE` (if any)
    /// and the process environment.
    pub fn load() -> Result<Self> {
        let file = std::env::var_os("CONFIG_FILE").map(PathBuf::from);
        Self::load_with(file, |key| std::env::var(key).ok())
    }

    /// Load configuration with an explicit config file and environment lookup.
    ///
    /// Precedence: defaults < file < environment.
    pub fn load_with<F>(file: Option<PathBuf>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Config::builder()
            .set_default("model_path", DEFAULT_MODEL_PATH)?
            .set_default("preproc_path", DEFAULT_PREPROC_PATH)?
            .set_default("port", DEFAULT_PORT as i64)?
            .set_default("bind_host", "0.0.0.0")?
            .set_default("model_format", "auto")?
            .set_default("onnx_threads", 1_i64)?
            .set_default("onnx_sessions", 4_i64)?
            .set_default("log_format", "pretty")?;

        if let Some(path) = &file {
            builder = builder.add_source(File::from(path.as_path()).format(FileFormat::Toml));
        }

        for &(var, key) in ENV_OVERRIDES {
            builder = builder.set_override_option(key, lookup(var))?;
        }

        let config: AppConfig = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.onnx_sessions == 0 {
            anyhow::bail!("onnx_sessions must be at least 1");
        }
        if self.onnx_threads == 0 {
            anyhow::bail!("onnx_threads must be at least 1");
        }
        Ok(())
    }

    /// Socket address the HTTP server binds to
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.bind_host, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", self.bind_host, self.port))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            preproc_path: PathBuf::from(DEFAULT_PREPROC_PATH),
            port: DEFAULT_PORT,
            bind_host: "0.0.0.0".to_string(),
            model_format: ModelFormat::Auto,
            onnx_threads: 1,
            onnx_sessions: 4,
            log_format: LogFormat::Pretty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::load_with(None, env(&[])).unwrap();
        assert_eq!(config.model_path, PathBuf::from("/opt/ml/model/model.joblib"));
        assert_eq!(config.preproc_path, PathBuf::from("/opt/ml/model/preproc.joblib"));
        assert_eq!(config.port, 8080);
        assert_eq!(config.model_format, ModelFormat::Auto);
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.bind_addr().unwrap().port(), 8080);
    }

    #[test]
    fn test_env_overrides() {
        let config = AppConfig::load_with(
            None,
            env(&[
                ("MODEL_PATH", "/tmp/model.onnx"),
                ("PREPROC_PATH", "/tmp/preproc.json"),
                ("PORT", "9090"),
                ("MODEL_FORMAT", "onnx"),
                ("LOG_FORMAT", "json"),
            ]),
        )
        .unwrap();

        assert_eq!(config.model_path, PathBuf::from("/tmp/model.onnx"));
        assert_eq!(config.preproc_path, PathBuf::from("/tmp/preproc.json"));
        assert_eq!(config.port, 9090);
        assert_eq!(config.model_format, ModelFormat::Onnx);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_file_then_env_precedence() {
        let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config/config.toml");
        let config = AppConfig::load_with(Some(path.clone()), env(&[])).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.onnx_sessions, 2);

        let config = AppConfig::load_with(Some(path), env(&[("ONNX_SESSIONS", "8")])).unwrap();
        assert_eq!(config.onnx_sessions, 8);
    }

    #[test]
    fn test_invalid_port_rejected() {
        assert!(AppConfig::load_with(None, env(&[("PORT", "not-a-port")])).is_err());
    }

    #[test]
    fn test_zero_sessions_rejected() {
        assert!(AppConfig::load_with(None, env(&[("ONNX_SESSIONS", "0")])).is_err());
    }
}
