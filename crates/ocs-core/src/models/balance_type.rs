//! Balance types and types of record
//!
//! A single closed enum serves both as the key of an account's balance map and
//! as the ToR of a call: monetary balances pay any ToR, unit balances pay calls
//! of their own type.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Balance type / type of record
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum BalanceType {
    /// Currency balance
    #[default]
    #[serde(rename = "*monetary")]
    Monetary,
    /// Call time, in nanoseconds
    #[serde(rename = "*voice")]
    Voice,
    /// Messages, one unit per message
    #[serde(rename = "*sms")]
    Sms,
    /// Traffic, one unit per byte
    #[serde(rename = "*data")]
    Data,
    /// Multimedia messages
    #[serde(rename = "*mms")]
    Mms,
    /// Units usable by any ToR through a per-ToR factor
    #[serde(rename = "*generic")]
    Generic,
}

impl BalanceType {
    pub const ALL: [BalanceType; 6] = [
        BalanceType::Monetary,
        BalanceType::Voice,
        BalanceType::Sms,
        BalanceType::Data,
        BalanceType::Mms,
        BalanceType::Generic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BalanceType::Monetary => "*monetary",
            BalanceType::Voice => "*voice",
            BalanceType::Sms => "*sms",
            BalanceType::Data => "*data",
            BalanceType::Mms => "*mms",
            BalanceType::Generic => "*generic",
        }
    }

    /// Parse from the `*type` tag (the leading `*` is optional)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim_start_matches('*').to_lowercase().as_str() {
            "monetary" => Some(BalanceType::Monetary),
            "voice" => Some(BalanceType::Voice),
            "sms" => Some(BalanceType::Sms),
            "data" => Some(BalanceType::Data),
            "mms" => Some(BalanceType::Mms),
            "generic" => Some(BalanceType::Generic),
            _ => None,
        }
    }

    #[inline]
    pub fn is_monetary(&self) -> bool {
        matches!(self, BalanceType::Monetary)
    }

    /// Whether lookups of this type also consider `*generic` balances
    #[inline]
    pub fn uses_generic(&self) -> bool {
        !matches!(self, BalanceType::Monetary | BalanceType::Generic)
    }

    /// Smallest unit a zero-rated balance of this type is consumed in
    pub fn default_increment(&self) -> Duration {
        match self {
            BalanceType::Voice => Duration::seconds(1),
            _ => Duration::nanoseconds(1),
        }
    }

    /// Zero-rating subject matching [`BalanceType::default_increment`]
    pub fn default_rating_subject(&self) -> &'static str {
        match self {
            BalanceType::Voice => "*zero1s",
            _ => "*zero1ns",
        }
    }
}

impl fmt::Display for BalanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
