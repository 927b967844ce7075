//! Errors Module
//!
//! Typed errors returned synchronously to whoever performed a lookup,
//! a downcast or a configuration step. Failures raised while strategies
//! run are never turned into a `KeepError`; they are collected by the
//! error group instead.

use thiserror::Error;

/// Errors raised by the keep itself (as opposed to the strategies it runs)
#[derive(Error, Debug)]
pub enum KeepError {
    #[error("strategy not found: {name}")]
    StrategyNotFound { name: String },
    #[error("strategy `{name}` is not a {expected}")]
    TypeMismatch { name: String, expected: &'static str },
    #[error("configuration error: {0}")]
    Config(String),
    #[error("logging setup failed: {0}")]
    Logging(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl KeepError {
    /// True for a lookup miss, so callers can pick a fallback without matching
    /// on the whole enum.
    pub fn is_not_found(&self) -> bool {
        matches!(self, KeepError::StrategyNotFound { .. })
    }
}

pub type Result<T, E = KeepError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_is_distinguishable() {
        let err = KeepError::StrategyNotFound {
            name: "balances".to_string(),
        };
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "strategy not found: balances");

        let err = KeepError::TypeMismatch {
            name: "balances".to_string(),
            expected: "BalancesStrategy",
        };
        assert!(!err.is_not_found());
        assert_eq!(err.to_string(), "strategy `balances` is not a BalancesStrategy");
    }
}
