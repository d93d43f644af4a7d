// src/connectors/memory.rs
use crate::connectors::traits::{MarketDataProvider, OutcomeSink, TimeWindow};
use crate::types::{Outcome, PriceSample, PriceSeries};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tokio::sync::RwLock;

/// Price history held in memory, keyed by token id.
#[derive(Debug, Default)]
pub struct InMemoryMarketData {
    series: HashMap<String, PriceSeries>,
}

impl InMemoryMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, token_id: impl Into<String>, series: PriceSeries) {
        self.series.insert(token_id.into(), series);
    }

    /// Loads `{ "<token_id>": [ { "timestamp": ..., "price": ... }, ... ] }`.
    pub async fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read price series from {}", path.display()))?;
        Self::from_json_str(&data)
    }

    pub fn from_json_str(data: &str) -> Result<Self> {
        let raw: HashMap<String, Vec<PriceSample>> =
            serde_json::from_str(data).context("Malformed price series JSON")?;
        Ok(Self {
            series: raw
                .into_iter()
                .map(|(token, samples)| (token, PriceSeries::new(samples)))
                .collect(),
        })
    }
}

#[async_trait]
impl MarketDataProvider for InMemoryMarketData {
    async fn fetch_series(&self, token_id: &str, window: TimeWindow) -> Result<PriceSeries> {
        let series = self
            .series
            .get(token_id)
            .ok_or_else(|| anyhow!("No price history for {}", token_id))?;
        let samples = series
            .samples()
            .iter()
            .filter(|s| window.contains(s.timestamp))
            .copied()
            .collect();
        Ok(PriceSeries::new(samples))
    }
}

/// Collects outcomes by signal id; later writes replace earlier ones.
#[derive(Debug, Default)]
pub struct InMemoryOutcomeSink {
    outcomes: RwLock<BTreeMap<String, Outcome>>,
}

impl InMemoryOutcomeSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, signal_id: &str) -> Option<Outcome> {
        self.outcomes.read().await.get(signal_id).cloned()
    }

    pub async fn snapshot(&self) -> BTreeMap<String, Outcome> {
        self.outcomes.read().await.clone()
    }
}

#[async_trait]
impl OutcomeSink for InMemoryOutcomeSink {
    async fn store(&self, signal_id: &str, outcome: &Outcome) -> Result<()> {
        self.outcomes
            .write()
            .await
            .insert(signal_id.to_string(), outcome.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    const SERIES: &str = r#"{
        "BTC": [
            { "timestamp": "2024-01-01T00:02:00Z", "price": "102" },
            { "timestamp": "2024-01-01T00:00:00Z", "price": "100" },
            { "timestamp": "2024-01-01T00:01:00Z", "price": 101.5 }
        ]
    }"#;

    #[tokio::test]
    async fn loads_and_sorts_json_series() {
        let provider = InMemoryMarketData::from_json_str(SERIES).unwrap();
        let series = provider
            .fetch_series("BTC", TimeWindow::default())
            .await
            .unwrap();
        let prices: Vec<String> = series.samples().iter().map(|s| s.price.to_string()).collect();
        assert_eq!(prices, vec!["100", "101.5", "102"]);
    }

    #[tokio::test]
    async fn window_filters_samples() {
        let provider = InMemoryMarketData::from_json_str(SERIES).unwrap();
        let window = TimeWindow::since(Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 1, 0).unwrap()));
        let series = provider.fetch_series("BTC", window).await.unwrap();
        assert_eq!(series.len(), 2);
    }

    #[tokio::test]
    async fn unknown_token_is_an_error() {
        let provider = InMemoryMarketData::new();
        assert!(provider
            .fetch_series("DOGE", TimeWindow::default())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn sink_overwrites_by_id() {
        let sink = InMemoryOutcomeSink::new();
        sink.store("a", &Outcome::no_data()).await.unwrap();
        let mut second = Outcome::no_data();
        second.samples_walked = 3;
        sink.store("a", &second).await.unwrap();
        assert_eq!(sink.get("a").await.unwrap().samples_walked, 3);
        assert_eq!(sink.snapshot().await.len(), 1);
    }
}
