//! Limiter configuration and validation.
//!
//! Options arrive either typed ([`LimiterConfig::new`]) or as a loosely
//! structured document (JSON, YAML, a config file plus environment). The
//! dynamic forms are checked field by field before anything is built, so a
//! limiter is never constructed from half-valid options.

use std::path::Path;
use std::time::Duration;

use serde_json::Value;
use tracing::info;

use crate::error::{LimiterError, Result};

/// Environment prefix for overrides applied on top of a config file.
pub const ENV_PREFIX: &str = "NOTSOFAST";

const INVALID_OPTIONS: &str = "Invalid or missing options";
const INVALID_THRESHOLD: &str = "Invalid or missing options.threshold";
const INVALID_TTL: &str = "Invalid or missing options.ttl";

/// Validated limiter configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterConfig {
    /// Maximum tokens per namespace per window
    threshold: u64,
    /// Length of the reset window
    window: Duration,
}

impl LimiterConfig {
    /// Create a configuration from a threshold and a ttl in seconds.
    pub fn new(threshold: u64, ttl_secs: f64) -> Result<Self> {
        Ok(Self {
            threshold,
            window: window_from_secs(ttl_secs)?,
        })
    }

    /// Validate a dynamic options document with `threshold` and `ttl` fields.
    pub fn from_value(options: &Value) -> Result<Self> {
        let options = options
            .as_object()
            .ok_or_else(|| LimiterError::Config(INVALID_OPTIONS.to_string()))?;

        let threshold = parse_threshold(options.get("threshold"))?;
        let ttl = options
            .get("ttl")
            .and_then(Value::as_f64)
            .ok_or_else(|| LimiterError::Config(INVALID_TTL.to_string()))?;

        Self::new(threshold, ttl)
    }

    /// Load configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| LimiterError::Config(format!("Failed to parse options: {}", e)))?;
        Self::from_value(&value)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let value: Value = serde_yaml::from_str(yaml)
            .map_err(|e| LimiterError::Config(format!("Failed to parse options: {}", e)))?;
        Self::from_value(&value)
    }

    /// Load configuration from a file, with `NOTSOFAST_*` environment overrides.
    ///
    /// The file format is picked from its extension (YAML, JSON, TOML, ...).
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load_layered(path.as_ref(), ENV_PREFIX)
    }

    fn load_layered(path: &Path, env_prefix: &str) -> Result<Self> {
        info!(path = %path.display(), "Loading limiter configuration");

        let settings = ::config::Config::builder()
            .add_source(::config::File::from(path))
            .add_source(::config::Environment::with_prefix(env_prefix).try_parsing(true))
            .build()
            .map_err(|e| LimiterError::Config(e.to_string()))?;

        let value: Value = settings
            .try_deserialize()
            .map_err(|e| LimiterError::Config(e.to_string()))?;
        Self::from_value(&value)
    }

    /// Maximum tokens per namespace per window.
    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    /// Length of the reset window.
    pub fn window(&self) -> Duration {
        self.window
    }
}

fn parse_threshold(value: Option<&Value>) -> Result<u64> {
    let invalid = || LimiterError::Config(INVALID_THRESHOLD.to_string());

    let number = match value {
        Some(Value::Number(number)) => number,
        _ => return Err(invalid()),
    };

    if let Some(threshold) = number.as_u64() {
        return Ok(threshold);
    }

    // Integral floats such as `3.0` are accepted; negatives and fractions are not.
    match number.as_f64() {
        Some(threshold) if threshold >= 0.0 && threshold.fract() == 0.0 => Ok(threshold as u64),
        _ => Err(invalid()),
    }
}

fn window_from_secs(ttl_secs: f64) -> Result<Duration> {
    if ttl_secs.is_nan() || ttl_secs < 0.0 {
        return Err(LimiterError::Config(INVALID_TTL.to_string()));
    }
    Duration::try_from_secs_f64(ttl_secs).map_err(|_| LimiterError::Config(INVALID_TTL.to_string()))
}
