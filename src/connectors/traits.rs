// src/connectors/traits.rs
use crate::types::{Outcome, PriceSeries};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Requested span of price history. Open ends mean "as far as available".
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimeWindow {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl TimeWindow {
    pub fn since(from: Option<DateTime<Utc>>) -> Self {
        Self { from, to: None }
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.from.map_or(true, |f| t >= f) && self.to.map_or(true, |e| t <= e)
    }
}

#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn fetch_series(&self, token_id: &str, window: TimeWindow) -> Result<PriceSeries>;
}

#[async_trait]
pub trait OutcomeSink: Send + Sync {
    async fn store(&self, signal_id: &str, outcome: &Outcome) -> Result<()>;
}
