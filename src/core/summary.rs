// src/core/summary.rs
use crate::core::runner::{BatchReport, SignalResult};
use crate::types::ExitReason;
use crate::utils::precision::normalize_percent;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub by_reason: BTreeMap<ExitReason, usize>,
    pub rejected: usize,
    pub timed_out: usize,
    /// Mean PnL over stop-loss and trailing-stop exits only.
    pub avg_realized_pnl: Option<Decimal>,
}

impl BatchSummary {
    pub fn from_report(report: &BatchReport, pnl_scale: u32) -> Self {
        let mut summary = BatchSummary {
            total: report.results.len(),
            ..Default::default()
        };
        let mut realized = Vec::new();

        for result in report.results.values() {
            match result {
                SignalResult::Evaluated { outcome } => {
                    *summary.by_reason.entry(outcome.exit_reason).or_default() += 1;
                    if outcome.is_closed() {
                        if let Some(pnl) = outcome.pnl_percent {
                            realized.push(pnl);
                        }
                    }
                }
                SignalResult::Rejected { .. } => summary.rejected += 1,
                SignalResult::TimedOut => summary.timed_out += 1,
            }
        }

        if !realized.is_empty() {
            let sum: Decimal = realized.iter().copied().sum();
            summary.avg_realized_pnl = Some(normalize_percent(
                sum / Decimal::from(realized.len()),
                pnl_scale,
            ));
        }
        summary
    }

    pub fn count(&self, reason: ExitReason) -> usize {
        self.by_reason.get(&reason).copied().unwrap_or(0)
    }
}
