use thiserror::Error;

/// Policy rejections returned to the caller. None of these are faults; each carries
/// enough detail for the presentation layer to explain what happened.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    /// Purchase price exceeds the current balance.
    #[error("not enough currency: need {needed}, have {available}")]
    InsufficientFunds { needed: u64, available: u64 },

    /// Admin amount outside the accepted range.
    #[error("amount {amount} is outside {min}..={max}")]
    InvalidAmount { amount: i64, min: u64, max: u64 },

    /// No record exists for the given id.
    #[error("player not found: {0}")]
    UnknownPlayer(String),

    /// The player id failed validation.
    #[error("invalid player id: {0}")]
    InvalidPlayerId(String),
}
