use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub batching: BatchingConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

// ============================================================
// Event Source Config
// ============================================================

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    /// Read transfer records from this file instead of stdin.
    pub input_path: Option<String>,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_retry_initial_delay_ms")]
    pub retry_initial_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            input_path: None,
            queue_capacity: 10_000,
            retry_initial_delay_ms: 500,
            retry_max_delay_ms: 30_000,
        }
    }
}

fn default_queue_capacity() -> usize {
    10_000
}

fn default_retry_initial_delay_ms() -> u64 {
    500
}

fn default_retry_max_delay_ms() -> u64 {
    30_000
}

impl SourceConfig {
    pub fn retry_initial_delay(&self) -> Duration {
        Duration::from_millis(self.retry_initial_delay_ms)
    }

    pub fn retry_max_delay(&self) -> Duration {
        Duration::from_millis(self.retry_max_delay_ms)
    }
}

// ============================================================
// Batching Config
// ============================================================

#[derive(Debug, Deserialize, Clone)]
pub struct BatchingConfig {
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    #[serde(default = "default_decimal_places")]
    pub decimal_places: u32,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            window_secs: 60,
            decimal_places: 6,
        }
    }
}

fn default_window_secs() -> u64 {
    60
}

fn default_decimal_places() -> u32 {
    6
}

impl BatchingConfig {
    pub fn window_length(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

// ============================================================
// Model Config
// ============================================================

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: usize,
    #[serde(default = "default_hidden_dim")]
    pub hidden_dim: usize,
    #[serde(default = "default_latent_dim")]
    pub latent_dim: usize,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f32,
    #[serde(default = "default_training_epochs")]
    pub training_epochs: usize,
    /// Fixed RNG seed for reproducible initialization and negative sampling.
    pub seed: Option<u64>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            embedding_dim: 16,
            hidden_dim: 64,
            latent_dim: 32,
            learning_rate: 0.01,
            training_epochs: 100,
            seed: None,
        }
    }
}

fn default_embedding_dim() -> usize {
    16
}

fn default_hidden_dim() -> usize {
    64
}

fn default_latent_dim() -> usize {
    32
}

fn default_learning_rate() -> f32 {
    0.01
}

fn default_training_epochs() -> usize {
    100
}

// ============================================================
// Scoring & Output Config
// ============================================================

#[derive(Debug, Deserialize, Clone)]
pub struct ScoringConfig {
    #[serde(default = "default_anomaly_threshold")]
    pub anomaly_threshold: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            anomaly_threshold: 0.1,
        }
    }
}

fn default_anomaly_threshold() -> f64 {
    0.1
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
}

impl Config {
    pub fn load(path: &str) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| eyre::eyre!("Failed to read config file '{}': {}", path, e))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| eyre::eyre!("Failed to parse config file '{}': {}", path, e))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, else `fallback` when it exists, else built-in defaults.
    pub fn load_or_default(path: Option<&str>, fallback: &str) -> eyre::Result<(Self, String)> {
        match path {
            Some(p) => Ok((Self::load(p)?, p.to_string())),
            None if Path::new(fallback).exists() => Ok((Self::load(fallback)?, fallback.to_string())),
            None => {
                let config = Config::default();
                config.validate()?;
                Ok((config, "<defaults>".to_string()))
            }
        }
    }

    fn validate(&self) -> eyre::Result<()> {
        if self.batching.window_secs == 0 {
            return Err(eyre::eyre!("batching.window_secs must be greater than zero"));
        }
        if self.batching.decimal_places > 38 {
            return Err(eyre::eyre!(
                "batching.decimal_places must be at most 38, got {}",
                self.batching.decimal_places
            ));
        }
        if self.source.queue_capacity == 0 {
            return Err(eyre::eyre!("source.queue_capacity must be greater than zero"));
        }
        if self.source.retry_max_delay_ms < self.source.retry_initial_delay_ms {
            return Err(eyre::eyre!(
                "source.retry_max_delay_ms ({}) is below retry_initial_delay_ms ({})",
                self.source.retry_max_delay_ms,
                self.source.retry_initial_delay_ms
            ));
        }

        let model = &self.model;
        for (name, dim) in [
            ("embedding_dim", model.embedding_dim),
            ("hidden_dim", model.hidden_dim),
            ("latent_dim", model.latent_dim),
            ("training_epochs", model.training_epochs),
        ] {
            if dim == 0 {
                return Err(eyre::eyre!("model.{} must be greater than zero", name));
            }
        }
        if !model.learning_rate.is_finite() || model.learning_rate <= 0.0 {
            return Err(eyre::eyre!(
                "model.learning_rate must be a positive number, got {}",
                model.learning_rate
            ));
        }

        let threshold = self.scoring.anomaly_threshold;
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(eyre::eyre!(
                "scoring.anomaly_threshold must be a non-negative number, got {}",
                threshold
            ));
        }
        Ok(())
    }
}
