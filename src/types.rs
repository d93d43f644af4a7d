// src/types.rs
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

use crate::error::ValidationError;

/// A long trade proposal: entry, stop-loss and one or two profit targets.
///
/// Build it through [`Signal::try_from`] on a [`RawSignal`] or construct it
/// directly; the evaluator re-checks the ordering rules either way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    #[serde(default)]
    pub id: Option<String>,
    pub token_id: String,
    pub entry_price: Decimal,
    pub stop_loss: Decimal,
    pub take_profit_1: Decimal,
    #[serde(default)]
    pub take_profit_2: Option<Decimal>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Signal {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.token_id.trim().is_empty() {
            return Err(ValidationError::EmptyTokenId);
        }
        if self.entry_price <= Decimal::ZERO {
            return Err(ValidationError::NonPositive("entry_price"));
        }
        if self.stop_loss <= Decimal::ZERO {
            return Err(ValidationError::NonPositive("stop_loss"));
        }
        if self.stop_loss >= self.entry_price {
            return Err(ValidationError::StopLossNotBelowEntry {
                stop_loss: self.stop_loss,
                entry_price: self.entry_price,
            });
        }
        if self.take_profit_1 <= self.entry_price {
            return Err(ValidationError::TakeProfitNotAboveEntry {
                field: "take_profit_1",
                take_profit: self.take_profit_1,
                entry_price: self.entry_price,
            });
        }
        if let Some(tp2) = self.take_profit_2 {
            if tp2 <= self.take_profit_1 {
                return Err(ValidationError::TakeProfitsOutOfOrder {
                    take_profit_1: self.take_profit_1,
                    take_profit_2: tp2,
                });
            }
        }
        Ok(())
    }
}

/// Signal as it arrives from a document store or a JSON file.
/// Every field is optional and numbers may be JSON numbers or strings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSignal {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub token_id: Option<String>,
    #[serde(default)]
    pub entry_price: Option<Value>,
    #[serde(default)]
    pub stop_loss: Option<Value>,
    #[serde(default, alias = "takeProfit")]
    pub take_profit1: Option<Value>,
    #[serde(default)]
    pub take_profit2: Option<Value>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

fn parse_decimal(field: &'static str, value: &Value) -> Result<Decimal, ValidationError> {
    let not_numeric = || ValidationError::NotNumeric {
        field,
        value: value.to_string(),
    };
    match value {
        // Через строку, чтобы не терять точность f64
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .map_err(|_| not_numeric()),
        Value::String(s) => Decimal::from_str(s.trim()).map_err(|_| not_numeric()),
        _ => Err(not_numeric()),
    }
}

fn required(field: &'static str, value: Option<&Value>) -> Result<Decimal, ValidationError> {
    match value {
        None | Some(Value::Null) => Err(ValidationError::MissingField(field)),
        Some(v) => parse_decimal(field, v),
    }
}

impl TryFrom<RawSignal> for Signal {
    type Error = ValidationError;

    fn try_from(raw: RawSignal) -> Result<Self, Self::Error> {
        let token_id = raw
            .token_id
            .ok_or(ValidationError::MissingField("token_id"))?;

        let take_profit_2 = match raw.take_profit2.as_ref() {
            None | Some(Value::Null) => None,
            Some(v) => Some(parse_decimal("take_profit_2", v)?),
        };

        let signal = Signal {
            id: raw.id,
            token_id,
            entry_price: required("entry_price", raw.entry_price.as_ref())?,
            stop_loss: required("stop_loss", raw.stop_loss.as_ref())?,
            take_profit_1: required("take_profit_1", raw.take_profit1.as_ref())?,
            take_profit_2,
            created_at: raw.created_at,
        };
        signal.validate()?;
        Ok(signal)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceSample {
    pub timestamp: DateTime<Utc>,
    pub price: Decimal,
}

impl PriceSample {
    pub fn new(timestamp: DateTime<Utc>, price: Decimal) -> Self {
        Self { timestamp, price }
    }
}

/// Chronologically ordered price history for one token.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<PriceSample>", into = "Vec<PriceSample>")]
pub struct PriceSeries {
    samples: Vec<PriceSample>,
}

impl PriceSeries {
    /// Stable-sorts by timestamp, so equal timestamps keep their order.
    pub fn new(mut samples: Vec<PriceSample>) -> Self {
        if !samples.windows(2).all(|w| w[0].timestamp <= w[1].timestamp) {
            samples.sort_by_key(|s| s.timestamp);
        }
        Self { samples }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn samples(&self) -> &[PriceSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples at or after `from`; the whole series when `from` is `None`.
    pub fn since(&self, from: Option<DateTime<Utc>>) -> &[PriceSample] {
        match from {
            None => &self.samples,
            Some(t) => {
                let start = self.samples.partition_point(|s| s.timestamp < t);
                &self.samples[start..]
            }
        }
    }
}

impl From<Vec<PriceSample>> for PriceSeries {
    fn from(samples: Vec<PriceSample>) -> Self {
        Self::new(samples)
    }
}

impl From<PriceSeries> for Vec<PriceSample> {
    fn from(series: PriceSeries) -> Self {
        series.samples
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitReason {
    StopLoss,
    TrailingStop,
    NoData,
    InvalidRange,
    Open,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::StopLoss => "STOP_LOSS",
            ExitReason::TrailingStop => "TRAILING_STOP",
            ExitReason::NoData => "NO_DATA",
            ExitReason::InvalidRange => "INVALID_RANGE",
            ExitReason::Open => "OPEN",
        }
    }
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of walking a signal over its price history.
/// `None` for `exit_price` / `pnl_percent` means "undetermined".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub exit_price: Option<Decimal>,
    pub pnl_percent: Option<Decimal>,
    pub exit_reason: ExitReason,
    pub peak_price: Option<Decimal>,
    pub price_at_signal: Option<Decimal>,
    pub tp2_reached: bool,
    pub exit_at: Option<DateTime<Utc>>,
    pub samples_walked: usize,
}

impl Outcome {
    pub fn no_data() -> Self {
        Self {
            exit_price: None,
            pnl_percent: None,
            exit_reason: ExitReason::NoData,
            peak_price: None,
            price_at_signal: None,
            tp2_reached: false,
            exit_at: None,
            samples_walked: 0,
        }
    }

    pub fn invalid_range(price_at_signal: Decimal) -> Self {
        Self {
            exit_reason: ExitReason::InvalidRange,
            price_at_signal: Some(price_at_signal),
            ..Self::no_data()
        }
    }

    /// False for `NO_DATA` / `INVALID_RANGE`: render those as "not yet determinable".
    pub fn is_determined(&self) -> bool {
        !matches!(
            self.exit_reason,
            ExitReason::NoData | ExitReason::InvalidRange
        )
    }

    /// Closed by a stop (realized), as opposed to marked-to-market or undetermined.
    pub fn is_closed(&self) -> bool {
        matches!(
            self.exit_reason,
            ExitReason::StopLoss | ExitReason::TrailingStop
        )
    }
}
