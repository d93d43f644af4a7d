// src/core/evaluator.rs
use crate::config::EvaluatorConfig;
use crate::error::{EvaluatorConfigError, ValidationError};
use crate::types::{ExitReason, Outcome, PriceSample, PriceSeries, Signal};
use crate::utils::precision::{normalize_percent, normalize_price, pnl_percent, trailing_level};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::debug;

/// Where the simulated long position is while walking the series.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    /// Tracking toward TP1 or SL.
    Armed,
    /// TP1 touched; the trailing stop follows `peak`.
    Tp1Reached { peak: Decimal },
}

#[derive(Debug, Clone, Copy)]
struct Exit {
    reason: ExitReason,
    price: Decimal,
    at: DateTime<Utc>,
}

#[derive(Debug)]
struct Walk {
    phase: Phase,
    exit: Option<Exit>,
    tp2_reached: bool,
    walked: usize,
}

/// Stateless signal evaluator. Holds only its exit policy, so a single
/// instance can be cloned into any number of tasks.
#[derive(Debug, Clone, Default)]
pub struct Evaluator {
    config: EvaluatorConfig,
}

impl Evaluator {
    pub fn new(config: EvaluatorConfig) -> Result<Self, EvaluatorConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    /// Simulates `signal` over `series` and reports how the position ended.
    ///
    /// Only a malformed signal is an error. Missing data, a premise already
    /// violated at the first price and a still-open position are all
    /// reported through [`Outcome::exit_reason`].
    pub fn evaluate(
        &self,
        signal: &Signal,
        series: &PriceSeries,
    ) -> Result<Outcome, ValidationError> {
        signal.validate()?;

        let samples = series.since(signal.created_at);
        let (Some(first), Some(last)) = (samples.first(), samples.last()) else {
            debug!(token = %signal.token_id, "no samples after signal creation");
            return Ok(Outcome::no_data());
        };
        let price_at_signal = first.price;

        if price_at_signal <= Decimal::ZERO
            || price_at_signal > signal.take_profit_1
            || price_at_signal < signal.stop_loss
        {
            debug!(
                token = %signal.token_id,
                %price_at_signal,
                sl = %signal.stop_loss,
                tp1 = %signal.take_profit_1,
                "starting price outside signal range"
            );
            return Ok(Outcome::invalid_range(self.round_price(price_at_signal)));
        }

        let walk = self.walk(signal, samples, price_at_signal);

        let exit = walk.exit.unwrap_or(Exit {
            reason: ExitReason::Open,
            price: last.price,
            at: last.timestamp,
        });
        let peak = match walk.phase {
            Phase::Tp1Reached { peak } => Some(self.round_price(peak)),
            Phase::Armed => None,
        };
        let pnl = pnl_percent(price_at_signal, exit.price)
            .map(|p| normalize_percent(p, self.config.pnl_scale));

        Ok(Outcome {
            exit_price: Some(self.round_price(exit.price)),
            pnl_percent: pnl,
            exit_reason: exit.reason,
            peak_price: peak,
            price_at_signal: Some(self.round_price(price_at_signal)),
            tp2_reached: walk.tp2_reached,
            exit_at: Some(exit.at),
            samples_walked: walk.walked,
        })
    }

    fn walk(&self, signal: &Signal, samples: &[PriceSample], start: Decimal) -> Walk {
        let drop = self.config.trailing_drop_fraction;
        let mut phase = Phase::Armed;
        let mut tp2_reached = false;
        let mut walked = 0;

        for sample in samples {
            walked += 1;
            let price = sample.price;

            // Stop loss wins over everything else on the same sample.
            if price <= signal.stop_loss {
                debug!(token = %signal.token_id, %price, "stop loss touched");
                return Walk {
                    phase,
                    exit: Some(Exit {
                        reason: ExitReason::StopLoss,
                        price: signal.stop_loss,
                        at: sample.timestamp,
                    }),
                    tp2_reached,
                    walked,
                };
            }

            if signal.take_profit_2.is_some_and(|tp2| price >= tp2) {
                tp2_reached = true;
            }

            match phase {
                Phase::Armed if price >= signal.take_profit_1 => {
                    debug!(token = %signal.token_id, %price, "tp1 reached, trailing stop armed");
                    phase = Phase::Tp1Reached {
                        peak: start.max(price),
                    };
                }
                Phase::Armed => {}
                Phase::Tp1Reached { peak } if price > peak => {
                    phase = Phase::Tp1Reached { peak: price };
                }
                Phase::Tp1Reached { peak } if price <= trailing_level(peak, drop) => {
                    debug!(token = %signal.token_id, %price, %peak, "trailing stop hit");
                    return Walk {
                        phase,
                        exit: Some(Exit {
                            reason: ExitReason::TrailingStop,
                            price,
                            at: sample.timestamp,
                        }),
                        tp2_reached,
                        walked,
                    };
                }
                Phase::Tp1Reached { .. } => {}
            }
        }

        Walk {
            phase,
            exit: None,
            tp2_reached,
            walked,
        }
    }

    fn round_price(&self, price: Decimal) -> Decimal {
        normalize_price(price, self.config.price_scale)
    }
}
