// src/config.rs

use chrono::{DateTime, Utc};
use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::EvaluatorConfigError;

const MAX_SCALE: u32 = 28;

/// Exit policy knobs. Passed explicitly to the evaluator, never read from globals.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct EvaluatorConfig {
    /// Retracement from peak that fires the trailing stop (0.01 = 1%).
    pub trailing_drop_fraction: Decimal,
    pub price_scale: u32,
    pub pnl_scale: u32,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            trailing_drop_fraction: Decimal::new(1, 2),
            price_scale: 6,
            pnl_scale: 2,
        }
    }
}

impl EvaluatorConfig {
    pub fn with_trailing_drop(trailing_drop_fraction: Decimal) -> Self {
        Self {
            trailing_drop_fraction,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), EvaluatorConfigError> {
        if self.trailing_drop_fraction <= Decimal::ZERO || self.trailing_drop_fraction >= Decimal::ONE
        {
            return Err(EvaluatorConfigError::TrailingDropOutOfRange(
                self.trailing_drop_fraction,
            ));
        }
        if self.price_scale > MAX_SCALE {
            return Err(EvaluatorConfigError::ScaleTooLarge {
                field: "price",
                value: self.price_scale,
            });
        }
        if self.pnl_scale > MAX_SCALE {
            return Err(EvaluatorConfigError::ScaleTooLarge {
                field: "pnl",
                value: self.pnl_scale,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct RunnerConfig {
    /// Extra fetch attempts after the first failure.
    pub fetch_retries: u32,
    pub retry_backoff_ms: u64,
    pub max_concurrent_fetches: usize,
    /// Per-signal evaluation timeout; `None` disables it.
    pub eval_timeout_ms: Option<u64>,
    /// Upper bound of the fetched history. Unset means the batch start time,
    /// so every signal in one run sees the same cut-off.
    pub window_end: Option<DateTime<Utc>>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            fetch_retries: 2,
            retry_backoff_ms: 200,
            max_concurrent_fetches: 8,
            eval_timeout_ms: None,
            window_end: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub signals_path: String,
    pub series_path: String,
    #[serde(default)]
    pub output_path: Option<String>,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default)]
    pub evaluator: EvaluatorConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
}

fn default_log_dir() -> String {
    "logs".to_string()
}

impl AppConfig {
    pub fn new() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .set_default("signals_path", "demos/signals.json")?
            .set_default("series_path", "demos/series.json")?
            .add_source(File::with_name("Settings").required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        let config = builder.build()?;
        let app: AppConfig = config.try_deserialize()?;
        app.evaluator
            .validate()
            .map_err(|e| ConfigError::Message(e.to_string()))?;
        Ok(app)
    }
}
