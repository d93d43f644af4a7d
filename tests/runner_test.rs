//! Batch runner: fetch, retry, parallel evaluation and persistence.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use signal_outcome::config::RunnerConfig;
use signal_outcome::connectors::memory::{InMemoryMarketData, InMemoryOutcomeSink};
use signal_outcome::connectors::traits::{MarketDataProvider, TimeWindow};
use signal_outcome::core::runner::{SignalResult, SignalRunner};
use signal_outcome::core::summary::BatchSummary;
use signal_outcome::{Evaluator, ExitReason, PriceSample, PriceSeries, RawSignal, Signal};
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn series(prices: &[&str]) -> PriceSeries {
    PriceSeries::new(
        prices
            .iter()
            .enumerate()
            .map(|(i, p)| PriceSample::new(Utc.timestamp_opt(1_700_000_000 + i as i64, 0).unwrap(), d(p)))
            .collect(),
    )
}

fn signal(id: &str, token: &str) -> Signal {
    Signal {
        id: Some(id.into()),
        token_id: token.into(),
        entry_price: d("100"),
        stop_loss: d("90"),
        take_profit_1: d("110"),
        take_profit_2: None,
        created_at: None,
    }
}

fn fast_config() -> RunnerConfig {
    RunnerConfig {
        fetch_retries: 2,
        retry_backoff_ms: 1,
        max_concurrent_fetches: 4,
        eval_timeout_ms: None,
        window_end: None,
    }
}

/// Fails the first `failures` calls, then serves a fixed series.
struct FlakyProvider {
    failures: u32,
    calls: AtomicU32,
    series: PriceSeries,
}

#[async_trait]
impl MarketDataProvider for FlakyProvider {
    async fn fetch_series(&self, _token_id: &str, _window: TimeWindow) -> Result<PriceSeries> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            return Err(anyhow!("upstream unavailable"));
        }
        Ok(self.series.clone())
    }
}

#[tokio::test]
async fn evaluates_batch_and_stores_outcomes() {
    let mut market = InMemoryMarketData::new();
    market.insert("SOL", series(&["100", "105", "112", "111.5", "109.9"]));
    market.insert("ETH", series(&["100", "95", "89"]));
    market.insert("ARB", series(&["100", "104", "108"]));

    let sink = Arc::new(InMemoryOutcomeSink::new());
    let runner = SignalRunner::new(fast_config(), Evaluator::default(), Arc::new(market))
        .with_sink(sink.clone());

    let report = runner
        .run(vec![
            signal("a", "SOL"),
            signal("b", "ETH"),
            signal("c", "ARB"),
        ])
        .await;

    let reason = |k: &str| report.results[k].outcome().unwrap().exit_reason;
    assert_eq!(reason("a"), ExitReason::TrailingStop);
    assert_eq!(reason("b"), ExitReason::StopLoss);
    assert_eq!(reason("c"), ExitReason::Open);

    assert_eq!(sink.snapshot().await.len(), 3);
    assert_eq!(
        sink.get("b").await.unwrap().exit_price,
        Some(d("90"))
    );

    let summary = BatchSummary::from_report(&report, 2);
    assert_eq!(summary.total, 3);
    // (9.9 + -10) / 2
    assert_eq!(summary.avg_realized_pnl, Some(d("-0.05")));
}

#[tokio::test]
async fn retries_transient_fetch_failures() {
    let provider = Arc::new(FlakyProvider {
        failures: 2,
        calls: AtomicU32::new(0),
        series: series(&["100", "104", "108"]),
    });
    let runner = SignalRunner::new(fast_config(), Evaluator::default(), provider.clone());

    let report = runner.run(vec![signal("a", "SOL")]).await;

    assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    assert_eq!(
        report.results["a"].outcome().unwrap().exit_reason,
        ExitReason::Open
    );
}

#[tokio::test]
async fn exhausted_retries_degrade_to_no_data() {
    let provider = Arc::new(FlakyProvider {
        failures: u32::MAX,
        calls: AtomicU32::new(0),
        series: PriceSeries::empty(),
    });
    let runner = SignalRunner::new(fast_config(), Evaluator::default(), provider.clone());

    let report = runner.run(vec![signal("a", "SOL")]).await;

    assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    let outcome = report.results["a"].outcome().unwrap();
    assert_eq!(outcome.exit_reason, ExitReason::NoData);
    assert!(!outcome.is_determined());
}

#[tokio::test]
async fn raw_signals_failing_validation_are_rejected() {
    let mut market = InMemoryMarketData::new();
    market.insert("SOL", series(&["100", "95", "89"]));
    let runner = SignalRunner::new(fast_config(), Evaluator::default(), Arc::new(market));

    let raws: Vec<RawSignal> = serde_json::from_value(serde_json::json!([
        { "id": "ok", "tokenId": "SOL", "entryPrice": 100, "stopLoss": 90, "takeProfit1": 110 },
        { "id": "no-sl", "tokenId": "SOL", "entryPrice": 100, "takeProfit1": 110 },
        { "id": "sl-above", "tokenId": "SOL", "entryPrice": 100, "stopLoss": 101, "takeProfit1": 110 },
        { "tokenId": "SOL", "entryPrice": "x", "stopLoss": 90, "takeProfit1": 110 }
    ]))
    .unwrap();

    let report = runner.run_raw(raws).await;

    assert_eq!(
        report.results["ok"].outcome().unwrap().exit_reason,
        ExitReason::StopLoss
    );
    assert!(matches!(report.results["no-sl"], SignalResult::Rejected { .. }));
    assert!(matches!(report.results["sl-above"], SignalResult::Rejected { .. }));
    // Falls back to token and position when no id is given.
    assert!(matches!(report.results["SOL#3"], SignalResult::Rejected { .. }));
    assert_eq!(BatchSummary::from_report(&report, 2).rejected, 3);
}

#[tokio::test]
async fn unknown_token_is_no_data() {
    let runner = SignalRunner::new(
        RunnerConfig {
            fetch_retries: 0,
            ..fast_config()
        },
        Evaluator::default(),
        Arc::new(InMemoryMarketData::new()),
    );
    let report = runner.run(vec![signal("a", "NOPE")]).await;
    assert_eq!(
        report.results["a"].outcome().unwrap().exit_reason,
        ExitReason::NoData
    );
}

#[tokio::test]
async fn id_less_signals_on_one_token_are_kept_apart() {
    let mut market = InMemoryMarketData::new();
    market.insert("SOL", series(&["100", "95", "89"]));
    let sink = Arc::new(InMemoryOutcomeSink::new());
    let runner = SignalRunner::new(fast_config(), Evaluator::default(), Arc::new(market))
        .with_sink(sink.clone());

    let raws: Vec<RawSignal> = serde_json::from_value(serde_json::json!([
        { "tokenId": "SOL", "entryPrice": 100, "stopLoss": 90, "takeProfit1": 110 },
        { "tokenId": "SOL", "entryPrice": 100, "stopLoss": 80, "takeProfit1": 120 },
        { "tokenId": "SOL", "entryPrice": 100, "takeProfit1": 110 }
    ]))
    .unwrap();

    let report = runner.run_raw(raws).await;

    assert_eq!(report.results.len(), 3);
    assert_eq!(
        report.results["SOL#0"].outcome().unwrap().exit_reason,
        ExitReason::StopLoss
    );
    // The wider stop at 80 survives the dip to 89.
    assert_eq!(
        report.results["SOL#1"].outcome().unwrap().exit_reason,
        ExitReason::Open
    );
    assert!(matches!(report.results["SOL#2"], SignalResult::Rejected { .. }));
    assert_eq!(sink.snapshot().await.len(), 2);
}

#[tokio::test]
async fn typed_signals_without_id_get_positional_keys() {
    let mut market = InMemoryMarketData::new();
    market.insert("SOL", series(&["100", "104"]));
    let runner = SignalRunner::new(fast_config(), Evaluator::default(), Arc::new(market));

    let mut first = signal("x", "SOL");
    first.id = None;
    let mut second = first.clone();
    second.stop_loss = d("80");

    let report = runner.run(vec![first, second]).await;

    let keys: Vec<&str> = report.results.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["SOL#0", "SOL#1"]);
}

#[tokio::test]
async fn slow_evaluation_times_out() {
    // Flat at entry: never exits, so the walk covers every sample.
    let samples = (0..500_000i64)
        .map(|i| PriceSample::new(Utc.timestamp_opt(1_700_000_000 + i, 0).unwrap(), d("100")))
        .collect();
    let mut market = InMemoryMarketData::new();
    market.insert("SOL", PriceSeries::new(samples));

    let runner = SignalRunner::new(
        RunnerConfig {
            eval_timeout_ms: Some(0),
            ..fast_config()
        },
        Evaluator::default(),
        Arc::new(market),
    );

    let report = runner.run(vec![signal("slow", "SOL")]).await;

    assert_eq!(report.results["slow"], SignalResult::TimedOut);
    let summary = BatchSummary::from_report(&report, 2);
    assert_eq!(summary.timed_out, 1);
    assert_eq!(summary.total, 1);
}

#[tokio::test]
async fn window_end_cuts_off_later_samples() {
    let mut market = InMemoryMarketData::new();
    market.insert("ETH", series(&["100", "104", "108", "80"]));
    let runner = SignalRunner::new(
        RunnerConfig {
            window_end: Some(Utc.timestamp_opt(1_700_000_002, 0).unwrap()),
            ..fast_config()
        },
        Evaluator::default(),
        Arc::new(market),
    );

    let report = runner.run(vec![signal("a", "ETH")]).await;

    let outcome = report.results["a"].outcome().unwrap();
    assert_eq!(outcome.exit_reason, ExitReason::Open);
    assert_eq!(outcome.exit_price, Some(d("108")));
    assert_eq!(outcome.samples_walked, 3);
}
