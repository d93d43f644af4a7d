// src/core/runner.rs
use crate::config::RunnerConfig;
use crate::connectors::traits::{MarketDataProvider, OutcomeSink, TimeWindow};
use crate::core::evaluator::Evaluator;
use crate::types::{Outcome, PriceSeries, RawSignal, Signal};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Per-signal result of a batch run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SignalResult {
    Evaluated { outcome: Outcome },
    Rejected { error: String },
    TimedOut,
}

impl SignalResult {
    pub fn outcome(&self) -> Option<&Outcome> {
        match self {
            SignalResult::Evaluated { outcome } => Some(outcome),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub results: BTreeMap<String, SignalResult>,
}

/// Batch identity of the `idx`-th input: the explicit id when present,
/// otherwise `<token>#<idx>`, so id-less signals on one token stay apart.
pub fn batch_key(id: Option<&str>, token_id: Option<&str>, idx: usize) -> String {
    match (id, token_id) {
        (Some(id), _) => id.to_string(),
        (None, Some(token)) => format!("{}#{}", token, idx),
        (None, None) => format!("#{}", idx),
    }
}

/// Fetches price history for many signals, evaluates them in parallel
/// and hands each outcome to the sink.
pub struct SignalRunner {
    config: RunnerConfig,
    evaluator: Evaluator,
    market_data: Arc<dyn MarketDataProvider>,
    sink: Option<Arc<dyn OutcomeSink>>,
}

impl SignalRunner {
    pub fn new(
        config: RunnerConfig,
        evaluator: Evaluator,
        market_data: Arc<dyn MarketDataProvider>,
    ) -> Self {
        Self {
            config,
            evaluator,
            market_data,
            sink: None,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn OutcomeSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Parses raw documents first; the ones that fail validation are
    /// reported as `Rejected` and never reach the evaluator.
    pub async fn run_raw(&self, raws: Vec<RawSignal>) -> BatchReport {
        let mut rejected = BTreeMap::new();
        let mut keyed = Vec::with_capacity(raws.len());

        for (idx, raw) in raws.into_iter().enumerate() {
            let key = batch_key(raw.id.as_deref(), raw.token_id.as_deref(), idx);
            match Signal::try_from(raw) {
                Ok(signal) => keyed.push((key, signal)),
                Err(e) => {
                    warn!("Signal {} rejected: {}", key, e);
                    rejected.insert(key, SignalResult::Rejected { error: e.to_string() });
                }
            }
        }

        let mut report = self.run_keyed(keyed).await;
        for (key, result) in rejected {
            if report.results.contains_key(&key) {
                warn!("Duplicate signal id {}; keeping the evaluated result", key);
                continue;
            }
            report.results.insert(key, result);
        }
        report
    }

    pub async fn run(&self, signals: Vec<Signal>) -> BatchReport {
        let keyed = signals
            .into_iter()
            .enumerate()
            .map(|(idx, s)| (batch_key(s.id.as_deref(), Some(&s.token_id), idx), s))
            .collect();
        self.run_keyed(keyed).await
    }

    async fn run_keyed(&self, keyed: Vec<(String, Signal)>) -> BatchReport {
        let run_id = Uuid::new_v4();
        let window_end = self.config.window_end.unwrap_or_else(Utc::now);
        info!(%run_id, signals = keyed.len(), %window_end, "Batch evaluation starting");

        let fetched: Vec<(String, Signal, PriceSeries)> = stream::iter(keyed)
            .map(|(key, signal)| async move {
                let window = TimeWindow {
                    from: signal.created_at,
                    to: Some(window_end),
                };
                let series = self.fetch_with_retry(&signal, window).await;
                (key, signal, series)
            })
            .buffer_unordered(self.config.max_concurrent_fetches.max(1))
            .collect()
            .await;

        let timeout = self.config.eval_timeout_ms.map(Duration::from_millis);
        let mut pending = BTreeSet::new();
        let mut tasks = JoinSet::new();
        for (key, signal, series) in fetched {
            if !pending.insert(key.clone()) {
                warn!("Duplicate signal id {}; keeping the last result", key);
            }
            let evaluator = self.evaluator.clone();
            tasks.spawn(async move {
                let work = tokio::task::spawn_blocking(move || evaluator.evaluate(&signal, &series));
                let joined = match timeout {
                    Some(limit) => match tokio::time::timeout(limit, work).await {
                        Ok(joined) => joined,
                        Err(_) => return (key, SignalResult::TimedOut),
                    },
                    None => work.await,
                };
                let result = match joined {
                    Ok(Ok(outcome)) => SignalResult::Evaluated { outcome },
                    Ok(Err(e)) => SignalResult::Rejected { error: e.to_string() },
                    Err(e) => SignalResult::Rejected {
                        error: format!("evaluation task failed: {}", e),
                    },
                };
                (key, result)
            });
        }

        let results = collect_results(tasks, pending).await;
        if let Some(sink) = &self.sink {
            for (key, result) in &results {
                if let SignalResult::Evaluated { outcome } = result {
                    if let Err(e) = sink.store(key, outcome).await {
                        error!("Failed to store outcome for {}: {}", key, e);
                    }
                }
            }
        }

        info!(%run_id, evaluated = results.len(), "Batch evaluation finished");
        BatchReport { run_id, results }
    }

    /// A fetch that still fails after the last retry degrades to an empty
    /// series, which the evaluator reports as `NO_DATA`.
    async fn fetch_with_retry(&self, signal: &Signal, window: TimeWindow) -> PriceSeries {
        let attempts = self.config.fetch_retries + 1;

        for attempt in 1..=attempts {
            match self.market_data.fetch_series(&signal.token_id, window).await {
                Ok(series) => {
                    debug!(token = %signal.token_id, samples = series.len(), "Series fetched");
                    return series;
                }
                Err(e) if attempt < attempts => {
                    warn!(
                        "Fetch for {} failed (attempt {}/{}): {}",
                        signal.token_id, attempt, attempts, e
                    );
                    tokio::time::sleep(Duration::from_millis(self.config.retry_backoff_ms)).await;
                }
                Err(e) => {
                    error!("Giving up on {} after {} attempts: {}", signal.token_id, attempts, e);
                }
            }
        }
        PriceSeries::empty()
    }
}

/// Drains the evaluation tasks. A key whose task never reported back
/// (panicked or aborted) is still recorded, as `Rejected`.
async fn collect_results(
    mut tasks: JoinSet<(String, SignalResult)>,
    mut pending: BTreeSet<String>,
) -> BTreeMap<String, SignalResult> {
    let mut results = BTreeMap::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((key, result)) => {
                pending.remove(&key);
                results.insert(key, result);
            }
            Err(e) => error!("Evaluation task failed to join: {}", e),
        }
    }
    for key in pending {
        results.insert(
            key,
            SignalResult::Rejected {
                error: "evaluation task failed before reporting".to_string(),
            },
        );
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_key_prefers_id_then_token_and_position() {
        assert_eq!(batch_key(Some("sig-1"), Some("SOL"), 4), "sig-1");
        assert_eq!(batch_key(None, Some("SOL"), 4), "SOL#4");
        assert_eq!(batch_key(None, None, 7), "#7");
    }

    #[tokio::test]
    async fn failed_task_still_leaves_an_entry() {
        let mut tasks = JoinSet::new();
        tasks.spawn(async { ("ok".to_string(), SignalResult::TimedOut) });
        tasks.spawn(async {
            if true {
                panic!("evaluation blew up");
            }
            ("lost".to_string(), SignalResult::TimedOut)
        });
        let pending: BTreeSet<String> = ["ok", "lost"].iter().map(|s| s.to_string()).collect();

        let results = collect_results(tasks, pending).await;

        assert_eq!(results.len(), 2);
        assert_eq!(results["ok"], SignalResult::TimedOut);
        assert!(matches!(results["lost"], SignalResult::Rejected { .. }));
    }
}
