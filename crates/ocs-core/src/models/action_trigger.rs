//! Action triggers
//!
//! A trigger watches a counter or the balances selected by its filter and
//! invokes its action list once a threshold is crossed.

use crate::models::duration::nanos;
use crate::models::{BalanceFilter, BalanceType, CounterType};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Condition a trigger watches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ThresholdType {
    #[default]
    #[serde(rename = "*max_event_counter")]
    MaxEventCounter,
    #[serde(rename = "*min_event_counter")]
    MinEventCounter,
    #[serde(rename = "*max_balance_counter")]
    MaxBalanceCounter,
    #[serde(rename = "*min_balance_counter")]
    MinBalanceCounter,
    #[serde(rename = "*max_balance")]
    MaxBalance,
    #[serde(rename = "*min_balance")]
    MinBalance,
    #[serde(rename = "*balance_expired")]
    BalanceExpired,
}

impl ThresholdType {
    /// Counter type watched by counter thresholds
    pub fn counter_type(&self) -> Option<CounterType> {
        match self {
            ThresholdType::MaxEventCounter | ThresholdType::MinEventCounter => {
                Some(CounterType::Event)
            }
            ThresholdType::MaxBalanceCounter | ThresholdType::MinBalanceCounter => {
                Some(CounterType::Balance)
            }
            _ => None,
        }
    }

    #[inline]
    pub fn is_counter(&self) -> bool {
        self.counter_type().is_some()
    }

    /// Whether the threshold fires when the watched value reaches it from below
    pub fn is_max(&self) -> bool {
        matches!(
            self,
            ThresholdType::MaxEventCounter
                | ThresholdType::MaxBalanceCounter
                | ThresholdType::MaxBalance
        )
    }

    /// Whether `value` satisfies the threshold
    pub fn crossed(&self, value: Decimal, threshold: Decimal) -> bool {
        if self.is_max() {
            value >= threshold
        } else {
            value <= threshold
        }
    }
}

/// Threshold watcher attached to an account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ActionTrigger {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "UniqueID")]
    pub unique_id: String,
    pub threshold_type: ThresholdType,
    pub threshold_value: Decimal,
    pub recurrent: bool,
    /// Minimum time between two firings of a recurrent trigger
    #[serde(with = "nanos")]
    pub min_sleep: Duration,
    pub expiration_date: Option<DateTime<Utc>>,
    pub activation_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<BalanceFilter>,
    pub weight: f64,
    #[serde(rename = "ActionsID")]
    pub actions_id: String,
    pub executed: bool,
    pub last_execution_time: Option<DateTime<Utc>>,
}

impl Default for ActionTrigger {
    fn default() -> Self {
        Self {
            id: String::new(),
            unique_id: String::new(),
            threshold_type: ThresholdType::default(),
            threshold_value: Decimal::ZERO,
            recurrent: false,
            min_sleep: Duration::zero(),
            expiration_date: None,
            activation_date: None,
            balance: None,
            weight: 0.0,
            actions_id: String::new(),
            executed: false,
            last_execution_time: None,
        }
    }
}

impl ActionTrigger {
    /// Balance type watched, `None` for triggers without a balance filter
    pub fn balance_type(&self) -> Option<BalanceType> {
        self.balance.as_ref().and_then(|b| b.balance_type)
    }

    /// Filter identifying this trigger's counter
    ///
    /// The balance filter, with its ID defaulting to the trigger's UniqueID.
    pub fn counter_filter(&self) -> BalanceFilter {
        let mut filter = self.balance.clone().unwrap_or_default();
        if filter.id.as_deref().map_or(true, str::is_empty) && !self.unique_id.is_empty() {
            filter.id = Some(self.unique_id.clone());
        }
        filter
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.activation_date.map_or(true, |at| at <= now)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration_date.is_some_and(|exp| exp < now)
    }

    /// Recurrent triggers wait `min_sleep` between firings
    pub fn is_sleeping(&self, now: DateTime<Utc>) -> bool {
        self.recurrent
            && self.min_sleep > Duration::zero()
            && self
                .last_execution_time
                .is_some_and(|last| last + self.min_sleep > now)
    }

    /// Whether an action filter selects this trigger
    ///
    /// No filter selects everything. A filter naming a type other than the
    /// trigger's watched type selects nothing; otherwise the trigger's balance
    /// template must soft-match the filter.
    pub fn matches(&self, filter: Option<&BalanceFilter>) -> bool {
        let Some(filter) = filter else {
            return true;
        };
        if filter.balance_type.is_some() && filter.balance_type != self.balance_type() {
            return false;
        }
        self.balance
            .as_ref()
            .map(|b| b.create_balance(Utc::now()))
            .unwrap_or_default()
            .match_filter(filter, false, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn typed(balance_type: BalanceType) -> ActionTrigger {
        ActionTrigger {
            balance: Some(BalanceFilter::of_type(balance_type)),
            ..Default::default()
        }
    }

    #[test]
    fn test_threshold_direction() {
        assert!(ThresholdType::MaxEventCounter.crossed(dec!(2), dec!(2)));
        assert!(!ThresholdType::MaxEventCounter.crossed(dec!(1), dec!(2)));
        assert!(ThresholdType::MinBalance.crossed(dec!(1), dec!(2)));
        assert!(!ThresholdType::BalanceExpired.is_counter());
        assert_eq!(
            ThresholdType::MinBalanceCounter.counter_type(),
            Some(CounterType::Balance)
        );
    }

    #[test]
    fn test_counter_filter_defaults_to_unique_id() {
        let mut at = typed(BalanceType::Monetary);
        at.unique_id = "day_trigger".to_string();
        assert_eq!(at.counter_filter().id.as_deref(), Some("day_trigger"));

        at.balance.as_mut().unwrap().id = Some("explicit".to_string());
        assert_eq!(at.counter_filter().id.as_deref(), Some("explicit"));
    }

    #[test]
    fn test_activation_window() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let at = ActionTrigger {
            activation_date: Some(now + Duration::days(1)),
            expiration_date: Some(now + Duration::days(2)),
            ..Default::default()
        };
        assert!(!at.is_active(now));
        assert!(at.is_active(now + Duration::days(1)));
        assert!(!at.is_expired(now + Duration::days(2)));
        assert!(at.is_expired(now + Duration::days(3)));
    }

    #[test]
    fn test_min_sleep() {
        let now = Utc::now();
        let mut at = ActionTrigger {
            recurrent: true,
            min_sleep: Duration::minutes(5),
            last_execution_time: Some(now - Duration::minutes(1)),
            ..Default::default()
        };
        assert!(at.is_sleeping(now));
        at.last_execution_time = Some(now - Duration::minutes(6));
        assert!(!at.is_sleeping(now));
        at.recurrent = false;
        at.last_execution_time = Some(now);
        assert!(!at.is_sleeping(now));
    }

    #[test]
    fn test_matches_filter_by_type() {
        let voice = typed(BalanceType::Voice);
        let untyped = ActionTrigger::default();
        let filter = BalanceFilter::of_type(BalanceType::Voice);
        assert!(voice.matches(Some(&filter)));
        assert!(!untyped.matches(Some(&filter)));
        assert!(untyped.matches(None));
        assert!(!typed(BalanceType::Sms).matches(Some(&filter)));
    }
}
