//! Balance model
//!
//! A balance is one quota of an account: money, or units of one record type.
//! Eligibility for a given usage is decided by its destination mask,
//! categories, shared groups, expiry and the disabled flag.

use crate::constants::{META_ANY, META_DEFAULT};
use crate::models::{duration, BalanceFilter, BalanceType};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Per-ToR divisor applied to the units a balance consumes
///
/// A generic balance with factor `{*voice: 60s}` pays one unit per minute of
/// voice usage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValueFactor(pub BTreeMap<BalanceType, Decimal>);

impl ValueFactor {
    pub fn new(entries: &[(BalanceType, Decimal)]) -> Self {
        Self(entries.iter().copied().collect())
    }

    /// Divisor for `tor`, one when unset
    pub fn for_tor(&self, tor: BalanceType) -> Decimal {
        match self.0.get(&tor) {
            Some(f) if !f.is_zero() => *f,
            _ => Decimal::ONE,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Balance entity
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Balance {
    /// Globally unique identifier
    #[serde(rename = "Uuid")]
    pub uuid: String,

    /// Account-scoped identifier
    #[serde(rename = "ID")]
    pub id: String,

    /// Currency for monetary balances, units (nanoseconds, messages, bytes) otherwise
    pub value: Decimal,

    /// Selection priority, highest first
    pub weight: f64,

    /// Destination mask: destination ID to include (`true`) / exclude (`false`)
    #[serde(rename = "DestinationIDs")]
    pub destination_ids: BTreeMap<String, bool>,

    /// Instant after which the balance no longer exists
    pub expiration_date: Option<DateTime<Utc>>,

    /// Categories the balance pays for; empty pays for all
    pub categories: BTreeSet<String>,

    /// Special rate applied to what this balance pays
    pub rating_subject: String,

    /// Shared groups this balance belongs to
    pub shared_groups: BTreeSet<String>,

    /// Stop debiting the whole call once this balance cannot pay
    pub blocker: bool,

    /// Ignored by every lookup
    pub disabled: bool,

    /// Per-ToR unit divisor
    pub factor: ValueFactor,

    /// Touched since the last trigger evaluation
    #[serde(skip)]
    pub dirty: bool,
}

impl Balance {
    /// Build the zero-weight default monetary balance
    pub fn default_money() -> Self {
        Self {
            uuid: uuid::Uuid::new_v4().to_string(),
            id: META_DEFAULT.to_string(),
            ..Default::default()
        }
    }

    #[inline]
    pub fn is_default(&self) -> bool {
        self.id == META_DEFAULT
    }

    #[inline]
    pub fn value(&self) -> Decimal {
        self.value
    }

    pub fn set_value(&mut self, value: Decimal) {
        self.value = value;
        self.dirty = true;
    }

    pub fn add_value(&mut self, amount: Decimal) {
        self.set_value(self.value + amount);
    }

    pub fn subtract_value(&mut self, amount: Decimal) {
        self.set_value(self.value - amount);
    }

    /// Subtract exactly `amount`, already rounded by whoever priced it
    pub fn debit(&mut self, amount: Decimal) {
        self.set_value(self.value - amount);
    }

    /// Touched since the last trigger evaluation
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    pub fn is_expired_at(&self, at: DateTime<Utc>) -> bool {
        self.expiration_date.is_some_and(|exp| exp < at)
    }

    /// Empty categories pay for every category
    pub fn match_category(&self, category: &str) -> bool {
        self.categories.is_empty() || self.categories.contains(category)
    }

    /// Whether the balance is restricted to some destinations
    pub fn has_destination(&self) -> bool {
        !self.destination_ids.is_empty() && !self.destination_ids.contains_key(META_ANY)
    }

    pub fn is_shared(&self) -> bool {
        !self.shared_groups.is_empty()
    }

    /// Units consumed from this balance by `usage` of type `tor`
    ///
    /// Usage is measured in nanoseconds, divided by the balance factor for
    /// `tor` and rounded up to `decimals`.
    pub fn units_for(&self, usage: Duration, tor: BalanceType, decimals: u32) -> Decimal {
        let units = duration::as_units(usage);
        let factor = self.factor.for_tor(tor);
        if factor == Decimal::ONE {
            return units;
        }
        (units / factor).round_dp_with_strategy(decimals, RoundingStrategy::AwayFromZero)
    }

    /// Units available expressed as usage time of type `tor`
    pub fn available_usage(&self, tor: BalanceType) -> Duration {
        if self.value <= Decimal::ZERO {
            return Duration::zero();
        }
        let nanos = self
            .value
            .checked_mul(self.factor.for_tor(tor))
            .and_then(|v| v.trunc().to_i64())
            .unwrap_or(i64::MAX);
        Duration::nanoseconds(nanos)
    }

    /// Soft match: every field the filter sets must agree with this balance
    ///
    /// Destination IDs, categories and shared groups listed by the filter must
    /// all be present on the balance.
    pub fn match_filter(&self, filter: &BalanceFilter, skip_ids: bool, skip_expiry: bool) -> bool {
        if !skip_ids {
            if filter.uuid.as_ref().is_some_and(|u| *u != self.uuid) {
                return false;
            }
            if filter.id.as_ref().is_some_and(|id| *id != self.id) {
                return false;
            }
        }
        if !skip_expiry
            && filter.expiration_date.is_some()
            && filter.expiration_date != self.expiration_date
        {
            return false;
        }
        filter.weight.map_or(true, |w| w == self.weight)
            && filter.blocker.map_or(true, |b| b == self.blocker)
            && filter.disabled.map_or(true, |d| d == self.disabled)
            && filter
                .destination_ids
                .as_ref()
                .map_or(true, |ids| ids.keys().all(|k| self.destination_ids.contains_key(k)))
            && filter
                .categories
                .as_ref()
                .map_or(true, |c| c.is_subset(&self.categories))
            && filter
                .shared_groups
                .as_ref()
                .map_or(true, |sg| sg.is_subset(&self.shared_groups))
            && filter
                .rating_subject
                .as_ref()
                .map_or(true, |rs| *rs == self.rating_subject)
            && filter.factor.as_ref().map_or(true, |f| *f == self.factor)
    }

    /// Hard match: set-valued filter fields must equal the balance's exactly
    pub fn hard_match_filter(&self, filter: &BalanceFilter, skip_ids: bool) -> bool {
        self.match_filter(filter, skip_ids, false)
            && filter
                .destination_ids
                .as_ref()
                .map_or(true, |ids| *ids == self.destination_ids)
            && filter
                .categories
                .as_ref()
                .map_or(true, |c| *c == self.categories)
            && filter
                .shared_groups
                .as_ref()
                .map_or(true, |sg| *sg == self.shared_groups)
    }
}

impl PartialEq for Balance {
    fn eq(&self, other: &Self) -> bool {
        self.uuid == other.uuid
            && self.id == other.id
            && self.value == other.value
            && self.weight == other.weight
            && self.destination_ids == other.destination_ids
            && self.expiration_date == other.expiration_date
            && self.categories == other.categories
            && self.rating_subject == other.rating_subject
            && self.shared_groups == other.shared_groups
            && self.blocker == other.blocker
            && self.disabled == other.disabled
            && self.factor == other.factor
    }
}

/// Stable descending sort by weight; equal weights keep their order
pub fn sort_by_weight<T>(items: &mut [T], weight: impl Fn(&T) -> f64) {
    items.sort_by(|a, b| weight(b).total_cmp(&weight(a)));
}
