//! OCS Charger Core Library
//!
//! This crate provides the foundational types, traits, and error handling
//! for the OCS charging engine. It includes:
//!
//! - Domain models (Account, Balance, CallCost, ActionTrigger, etc.)
//! - Collaborator traits for storage, destination lookup, subject rating
//!   and action execution
//! - Unified error handling with stable error codes
//! - Application configuration

pub mod config;
pub mod error;
pub mod models;
pub mod traits;

pub use config::AppConfig;
pub use error::ChargeError;

/// Result type alias using ChargeError
pub type ChargeResult<T> = Result<T, ChargeError>;

/// Well-known identifiers shared by every charging component
pub mod constants {
    /// Wildcard key (shared-group parameters, destination masks)
    pub const META_ANY: &str = "*any";

    /// ID of the auto-created default balance
    pub const META_DEFAULT: &str = "*default";

    /// Rating plan marker for timespans paid from unit balances
    pub const META_NONE: &str = "*none";

    /// Prefix of zero-rated rating subjects (`*zero1s`, `*zero1m`, ...)
    pub const ZERO_SUBJECT_PREFIX: &str = "*zero";

    /// Generic prefix of every special rating subject
    pub const META_SUBJECT_PREFIX: &str = "*";

    /// Separator between tenant and account in an account ID
    pub const TENANT_SEPARATOR: char = ':';
}
