//! Unified error handling for the charging engine
//!
//! Every failure the engine can report is a variant of [`ChargeError`]. The
//! only variant that carries data beyond a message is
//! [`ChargeError::InsufficientCredit`], which hands the caller the truncated
//! call cost that was actually paid.

use crate::models::CallCost;
use rust_decimal::Decimal;
use thiserror::Error;

/// Main charging error type
#[derive(Error, Debug)]
pub enum ChargeError {
    // ==================== Lookup Errors ====================
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Shared group not found: {0}")]
    SharedGroupNotFound(String),

    #[error("Destination not found: {0}")]
    DestinationNotFound(String),

    #[error("Not found: {0}")]
    NotFound(String),

    // ==================== Charging Errors ====================
    #[error("Account disabled: {0}")]
    AccountDisabled(String),

    #[error("Insufficient credit on account {account}: {missing} left unpaid")]
    InsufficientCredit {
        account: String,
        missing: Decimal,
        partial: Box<CallCost>,
    },

    #[error("Invalid action: {0}")]
    InvalidAction(String),

    #[error("Invalid rating subject: {0}")]
    InvalidRatingSubject(String),

    // ==================== Collaborator Errors ====================
    #[error("Action execution failed: {0}")]
    ActionFailed(String),

    // ==================== Internal Errors ====================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ChargeError {
    /// Returns the stable error code used in logs and exported records
    pub fn error_code(&self) -> &'static str {
        match self {
            ChargeError::AccountNotFound(_) => "account_not_found",
            ChargeError::SharedGroupNotFound(_) => "shared_group_not_found",
            ChargeError::DestinationNotFound(_) => "destination_not_found",
            ChargeError::NotFound(_) => "not_found",
            ChargeError::AccountDisabled(_) => "account_disabled",
            ChargeError::InsufficientCredit { .. } => "insufficient_credit",
            ChargeError::InvalidAction(_) => "invalid_action",
            ChargeError::InvalidRatingSubject(_) => "invalid_rating_subject",
            ChargeError::ActionFailed(_) => "action_failed",
            ChargeError::Internal(_) => "internal_error",
            ChargeError::Config(_) => "config_error",
            ChargeError::Serialization(_) => "serialization_error",
        }
    }

    /// True for lookup misses
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ChargeError::AccountNotFound(_)
                | ChargeError::SharedGroupNotFound(_)
                | ChargeError::DestinationNotFound(_)
                | ChargeError::NotFound(_)
        )
    }

    /// The paid prefix of the call when credit ran out
    pub fn partial_call_cost(&self) -> Option<&CallCost> {
        match self {
            ChargeError::InsufficientCredit { partial, .. } => Some(partial),
            _ => None,
        }
    }
}

// ==================== From implementations ====================

impl From<serde_json::Error> for ChargeError {
    fn from(err: serde_json::Error) -> Self {
        ChargeError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for ChargeError {
    fn from(err: std::io::Error) -> Self {
        ChargeError::Internal(err.to_string())
    }
}

impl From<config::ConfigError> for ChargeError {
    fn from(err: config::ConfigError) -> Self {
        ChargeError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            ChargeError::AccountNotFound("cgrates.org:1001".to_string()).error_code(),
            "account_not_found"
        );
        assert_eq!(
            ChargeError::InsufficientCredit {
                account: "cgrates.org:1001".to_string(),
                missing: dec!(1.5),
                partial: Box::default(),
            }
            .error_code(),
            "insufficient_credit"
        );
    }

    #[test]
    fn test_partial_call_cost_only_on_insufficient_credit() {
        let err = ChargeError::InsufficientCredit {
            account: "cgrates.org:1001".to_string(),
            missing: dec!(10),
            partial: Box::new(CallCost {
                destination: "0723".to_string(),
                ..Default::default()
            }),
        };
        assert_eq!(
            err.partial_call_cost().map(|cc| cc.destination.as_str()),
            Some("0723")
        );
        assert!(ChargeError::Internal("boom".to_string())
            .partial_call_cost()
            .is_none());
    }

    #[test]
    fn test_not_found_family() {
        assert!(ChargeError::SharedGroupNotFound("SG".to_string()).is_not_found());
        assert!(!ChargeError::AccountDisabled("x".to_string()).is_not_found());
    }
}
