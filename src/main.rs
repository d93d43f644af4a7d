// src/main.rs
use anyhow::{Context, Result};
use dotenvy::dotenv;
use serde_json::json;
use signal_outcome::config::AppConfig;
use signal_outcome::connectors::memory::{InMemoryMarketData, InMemoryOutcomeSink};
use signal_outcome::core::evaluator::Evaluator;
use signal_outcome::core::runner::SignalRunner;
use signal_outcome::core::summary::BatchSummary;
use signal_outcome::types::RawSignal;
use std::sync::Arc;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_logging(log_dir: &str) -> WorkerGuard {
    let file_appender = tracing_appender::rolling::daily(log_dir, "signal_outcome.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    // 1. Load Configuration
    let config = AppConfig::new().context("Failed to load configuration")?;
    let _log_guard = init_logging(&config.log_dir);

    eprintln!("========================================");
    eprintln!("     SIGNAL OUTCOME EVALUATOR - v0.1.0");
    eprintln!("========================================");
    eprintln!("Signals:        {}", config.signals_path);
    eprintln!("Price series:   {}", config.series_path);
    eprintln!("Trailing drop:  {}", config.evaluator.trailing_drop_fraction);
    eprintln!("========================================");

    // 2. Load inputs
    let raw = tokio::fs::read_to_string(&config.signals_path)
        .await
        .with_context(|| format!("Failed to read signals from {}", config.signals_path))?;
    let signals: Vec<RawSignal> =
        serde_json::from_str(&raw).context("Signals file must be a JSON array")?;
    let market_data = InMemoryMarketData::from_json_file(&config.series_path).await?;

    // 3. Initialize Components
    let evaluator = Evaluator::new(config.evaluator.clone())?;
    let sink = Arc::new(InMemoryOutcomeSink::new());
    let runner = SignalRunner::new(config.runner.clone(), evaluator, Arc::new(market_data))
        .with_sink(sink.clone());

    // 4. Run
    let report = runner.run_raw(signals).await;
    let summary = BatchSummary::from_report(&report, config.evaluator.pnl_scale);
    info!(
        stored = sink.snapshot().await.len(),
        rejected = summary.rejected,
        "Run {} complete",
        report.run_id
    );

    let output = serde_json::to_string_pretty(&json!({
        "run_id": report.run_id,
        "results": report.results,
        "summary": summary,
    }))?;

    match &config.output_path {
        Some(path) => tokio::fs::write(path, output)
            .await
            .with_context(|| format!("Failed to write outcomes to {}", path))?,
        None => println!("{}", output),
    }

    Ok(())
}
