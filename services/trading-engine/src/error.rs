//! Error taxonomy for the trading engine.

use thiserror::Error;

/// Typed error hierarchy for the engine core.
///
/// Validation and admission failures are expected control flow at the
/// boundary; gateway failures come from the exchange collaborator.
#[derive(Error, Debug)]
pub enum EngineError {
    // -- Boundary -----------------------------------------------------------
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("admission rejected: {0}")]
    Admission(String),

    // -- Exchange -----------------------------------------------------------
    #[error("gateway error: {0}")]
    Gateway(String),

    // -- Lookup -------------------------------------------------------------
    #[error("order not found: {0}")]
    OrderNotFound(String),

    #[error("unknown strategy: {0}")]
    UnknownStrategy(String),

    #[error("invalid timeframe: {0}")]
    InvalidTimeframe(String),

    // -- Persistence --------------------------------------------------------
    #[error("settings error: {0}")]
    Settings(String),

    // -- Forwarded errors ---------------------------------------------------
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Admission rejections are logged at warning level and dropped.
    pub fn is_admission(&self) -> bool {
        matches!(self, EngineError::Admission(_))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
