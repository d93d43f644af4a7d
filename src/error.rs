// src/error.rs
use rust_decimal::Decimal;
use thiserror::Error;

/// Caller-side contract violations. No simulation is attempted for these.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("field `{field}` is not numeric: {value}")]
    NotNumeric { field: &'static str, value: String },

    #[error("field `{0}` must be greater than zero")]
    NonPositive(&'static str),

    #[error("token id is empty")]
    EmptyTokenId,

    #[error("stop loss {stop_loss} must be below entry price {entry_price}")]
    StopLossNotBelowEntry {
        stop_loss: Decimal,
        entry_price: Decimal,
    },

    #[error("`{field}` {take_profit} must be above entry price {entry_price}")]
    TakeProfitNotAboveEntry {
        field: &'static str,
        take_profit: Decimal,
        entry_price: Decimal,
    },

    #[error("take profit 2 ({take_profit_2}) must be above take profit 1 ({take_profit_1})")]
    TakeProfitsOutOfOrder {
        take_profit_1: Decimal,
        take_profit_2: Decimal,
    },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluatorConfigError {
    #[error("trailing drop fraction must lie in (0, 1), got {0}")]
    TrailingDropOutOfRange(Decimal),

    #[error("{field} scale {value} exceeds the supported maximum of 28")]
    ScaleTooLarge { field: &'static str, value: u32 },
}
