// src/lib.rs
//! Replays trading signals over their price history and decides how each
//! hypothetical long position would have been closed.

pub mod config;
pub mod connectors;
pub mod core;
pub mod error;
pub mod types;
pub mod utils;

pub use crate::config::EvaluatorConfig;
pub use crate::core::evaluator::Evaluator;
pub use crate::error::ValidationError;
pub use crate::types::{ExitReason, Outcome, PriceSample, PriceSeries, RawSignal, Signal};
