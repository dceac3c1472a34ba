//! Balance filters and value formulas
//!
//! A [`BalanceFilter`] is a partial balance: every `Some` field constrains the
//! match, every `None` field is a wildcard. Filters select balances for
//! administrative actions, counters and triggers, and act as templates for
//! balances created by top-ups.

use crate::models::{Balance, BalanceType, ValueFactor};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Spreading period of an incremental formula
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormulaInterval {
    Hour,
    Day,
    Week,
    Month,
    Year,
}

/// Granularity an incremental formula is applied at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormulaIncrement {
    Minute,
    Hour,
    Day,
}

/// Amount applied by an action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueFormula {
    /// A fixed delta
    Static(Decimal),
    /// `units` spread evenly over `interval`, applied once per `increment`
    Incremental {
        units: Decimal,
        interval: FormulaInterval,
        increment: FormulaIncrement,
    },
}

impl Default for ValueFormula {
    fn default() -> Self {
        ValueFormula::Static(Decimal::ZERO)
    }
}

impl From<Decimal> for ValueFormula {
    fn from(value: Decimal) -> Self {
        ValueFormula::Static(value)
    }
}

impl ValueFormula {
    /// Evaluate the formula at `now`
    pub fn value_at(&self, now: DateTime<Utc>) -> Decimal {
        match *self {
            ValueFormula::Static(v) => v,
            ValueFormula::Incremental {
                units,
                interval,
                increment,
            } => {
                let days_in_month = Decimal::from(days_in_month(now.year(), now.month()));
                let days_in_year = Decimal::from(days_in_year(now.year()));
                let divisor = match (increment, interval) {
                    (FormulaIncrement::Day, FormulaInterval::Week) => Decimal::from(7),
                    (FormulaIncrement::Day, FormulaInterval::Month) => days_in_month,
                    (FormulaIncrement::Day, FormulaInterval::Year) => days_in_year,
                    (FormulaIncrement::Hour, FormulaInterval::Day) => Decimal::from(24),
                    (FormulaIncrement::Hour, FormulaInterval::Month) => {
                        days_in_month * Decimal::from(24)
                    }
                    (FormulaIncrement::Hour, FormulaInterval::Year) => {
                        days_in_year * Decimal::from(24)
                    }
                    (FormulaIncrement::Minute, FormulaInterval::Hour) => Decimal::from(60),
                    _ => return Decimal::ZERO,
                };
                units / divisor
            }
        }
    }

    /// Same formula with the sign of the result flipped
    pub fn negated(&self) -> Self {
        match *self {
            ValueFormula::Static(v) => ValueFormula::Static(-v),
            ValueFormula::Incremental {
                units,
                interval,
                increment,
            } => ValueFormula::Incremental {
                units: -units,
                interval,
                increment,
            },
        }
    }
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    match (
        NaiveDate::from_ymd_opt(year, month, 1),
        NaiveDate::from_ymd_opt(next_year, next_month, 1),
    ) {
        (Some(start), Some(end)) => u32::try_from((end - start).num_days()).unwrap_or(30),
        _ => 30,
    }
}

fn days_in_year(year: i32) -> u32 {
    NaiveDate::from_ymd_opt(year, 12, 31).map_or(365, |d| d.ordinal())
}

/// Partial balance used to select or create balances
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct BalanceFilter {
    #[serde(rename = "Uuid", skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(rename = "ID", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "Type", skip_serializing_if = "Option::is_none")]
    pub balance_type: Option<BalanceType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<ValueFormula>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(rename = "DestinationIDs", skip_serializing_if = "Option::is_none")]
    pub destination_ids: Option<BTreeMap<String, bool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating_subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categories: Option<BTreeSet<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shared_groups: Option<BTreeSet<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub factor: Option<ValueFactor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocker: Option<bool>,
}

impl BalanceFilter {
    /// Filter selecting every balance of one type
    pub fn of_type(balance_type: BalanceType) -> Self {
        Self {
            balance_type: Some(balance_type),
            ..Default::default()
        }
    }

    /// Balance type the filter targets, monetary when unset
    pub fn target_type(&self) -> BalanceType {
        self.balance_type.unwrap_or_default()
    }

    /// Filter value at `now`, zero when unset
    pub fn value_at(&self, now: DateTime<Utc>) -> Decimal {
        self.value.as_ref().map_or(Decimal::ZERO, |v| v.value_at(now))
    }

    /// Materialize the filter as a balance holding the filter value
    pub fn create_balance(&self, now: DateTime<Utc>) -> Balance {
        Balance {
            uuid: self.uuid.clone().unwrap_or_default(),
            id: self.id.clone().unwrap_or_default(),
            value: self.value_at(now),
            weight: self.weight.unwrap_or_default(),
            destination_ids: self.destination_ids.clone().unwrap_or_default(),
            expiration_date: self.expiration_date,
            categories: self.categories.clone().unwrap_or_default(),
            rating_subject: self.rating_subject.clone().unwrap_or_default(),
            shared_groups: self.shared_groups.clone().unwrap_or_default(),
            blocker: self.blocker.unwrap_or_default(),
            disabled: self.disabled.unwrap_or_default(),
            factor: self.factor.clone().unwrap_or_default(),
            ..Default::default()
        }
    }

    /// True when the filter narrows nothing besides type and value
    pub fn is_unconstrained(&self) -> bool {
        self.uuid.is_none()
            && self.id.is_none()
            && self.expiration_date.is_none()
            && self.weight.is_none()
            && self.destination_ids.is_none()
            && self.rating_subject.is_none()
            && self.categories.is_none()
            && self.shared_groups.is_none()
            && self.factor.is_none()
            && self.disabled.is_none()
            && self.blocker.is_none()
    }
}
