//! Call costs, timespans and increments
//!
//! A [`CallCost`] is the unit of work of the debit engine: the rating step
//! produces it as priced timespans, and the engine returns a new one whose
//! increments each record the balance and account that paid for them.

use crate::models::duration::{self, nanos};
use crate::models::{BalanceType, RateInterval};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Unit balance that paid an increment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct UnitInfo {
    #[serde(rename = "UUID")]
    pub uuid: String,
    #[serde(rename = "ID")]
    pub id: String,
    /// Balance value after the debit
    pub value: Decimal,
    #[serde(rename = "DestinationID")]
    pub destination_id: String,
    /// Units taken from the balance
    pub consumed: Decimal,
    #[serde(rename = "ToR")]
    pub tor: BalanceType,
    #[serde(rename = "AccountID")]
    pub account_id: String,
}

/// Monetary balance that paid an increment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct MonetaryInfo {
    #[serde(rename = "UUID")]
    pub uuid: String,
    #[serde(rename = "ID")]
    pub id: String,
    /// Balance value after the debit
    pub value: Decimal,
    #[serde(rename = "AccountID")]
    pub account_id: String,
}

/// Audit record of who paid an increment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct BalanceInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<UnitInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monetary: Option<MonetaryInfo>,
    #[serde(rename = "AccountID")]
    pub account_id: String,
}

impl BalanceInfo {
    pub fn is_empty(&self) -> bool {
        self.unit.is_none() && self.monetary.is_none() && self.account_id.is_empty()
    }
}

fn single() -> u64 {
    1
}

/// Smallest chargeable slice of a timespan
///
/// `compress_factor` identical slices paid by the same balance travel as one
/// increment; `duration` and `cost` describe a single slice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Increment {
    #[serde(with = "nanos")]
    pub duration: Duration,
    pub cost: Decimal,
    #[serde(default = "single")]
    pub compress_factor: u64,
    #[serde(default)]
    pub balance_info: BalanceInfo,
}

impl Increment {
    pub fn new(duration: Duration, cost: Decimal) -> Self {
        Self {
            duration,
            cost,
            compress_factor: 1,
            balance_info: BalanceInfo::default(),
        }
    }

    /// Duration of every slice this increment stands for
    pub fn total_duration(&self) -> Duration {
        duration::scale(self.duration, self.compress_factor)
    }

    pub fn total_cost(&self) -> Decimal {
        self.cost * Decimal::from(self.compress_factor)
    }

    /// Whether some account took responsibility for this increment
    pub fn is_paid(&self) -> bool {
        !self.balance_info.is_empty()
    }
}

/// Contiguous, uniformly rated segment of a call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TimeSpan {
    pub time_start: DateTime<Utc>,
    pub time_end: DateTime<Utc>,
    /// Offset of `time_end` from the start of the call
    #[serde(with = "nanos")]
    pub duration_index: Duration,
    pub cost: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_interval: Option<RateInterval>,
    #[serde(default)]
    pub increments: Vec<Increment>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub matched_subject: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub matched_prefix: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub matched_dest_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub rating_plan_id: String,
}

impl Default for TimeSpan {
    fn default() -> Self {
        let epoch = DateTime::<Utc>::default();
        Self {
            time_start: epoch,
            time_end: epoch,
            duration_index: Duration::zero(),
            cost: Decimal::ZERO,
            rate_interval: None,
            increments: Vec::new(),
            matched_subject: String::new(),
            matched_prefix: String::new(),
            matched_dest_id: String::new(),
            rating_plan_id: String::new(),
        }
    }
}

impl TimeSpan {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, rate_interval: RateInterval) -> Self {
        Self {
            time_start: start,
            time_end: end,
            rate_interval: Some(rate_interval),
            ..Default::default()
        }
    }

    pub fn duration(&self) -> Duration {
        self.time_end - self.time_start
    }

    /// Sum of increment durations
    pub fn increments_duration(&self) -> Duration {
        self.increments
            .iter()
            .fold(Duration::zero(), |acc, inc| acc + inc.total_duration())
    }

    /// Recompute `cost` from the increments
    pub fn refresh_cost(&mut self) {
        self.cost = self.increments.iter().map(Increment::total_cost).sum();
    }

    /// Slice `[from, time_end)` into increments at this timespan's rate
    ///
    /// `call_start` anchors rate-group offsets. The last increment may run
    /// past `time_end`: a partial increment is billed whole.
    pub fn explode_from(&self, from: DateTime<Utc>, call_start: DateTime<Utc>) -> Vec<Increment> {
        let mut increments = Vec::new();
        let Some(rate_interval) = self.rate_interval.as_ref() else {
            if self.time_end > from {
                increments.push(Increment::new(self.time_end - from, Decimal::ZERO));
            }
            return increments;
        };
        let mut position = from;
        while position < self.time_end {
            let (length, cost) =
                rate_interval.slice_at(position - call_start, self.time_end - position);
            increments.push(Increment::new(length, cost));
            position += length;
        }
        increments
    }

    /// Keep the first `index` increments, returning the rest as a new timespan
    ///
    /// Both halves get their bounds and costs recomputed from the increments
    /// they hold.
    pub fn split_by_increment(&mut self, index: usize) -> Option<TimeSpan> {
        if index >= self.increments.len() {
            return None;
        }
        let rest = self.increments.split_off(index);
        let kept = self.increments_duration();
        let mut tail = TimeSpan {
            time_start: self.time_start + kept,
            increments: rest,
            rate_interval: self.rate_interval.clone(),
            matched_subject: self.matched_subject.clone(),
            matched_prefix: self.matched_prefix.clone(),
            matched_dest_id: self.matched_dest_id.clone(),
            rating_plan_id: self.rating_plan_id.clone(),
            ..Default::default()
        };
        tail.time_end = tail.time_start + tail.increments_duration();
        tail.duration_index = self.duration_index;
        tail.refresh_cost();

        self.time_end = self.time_start + kept;
        self.duration_index = self.duration_index - tail.duration();
        self.refresh_cost();
        Some(tail)
    }
}

/// Priced call, before or after debiting
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct CallCost {
    pub category: String,
    pub tenant: String,
    pub subject: String,
    pub account: String,
    pub destination: String,
    #[serde(rename = "ToR")]
    pub tor: BalanceType,
    pub cost: Decimal,
    pub timespans: Vec<TimeSpan>,
    pub deduct_connect_fee: bool,
    /// Balance that paid the connect fee
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect_fee_info: Option<BalanceInfo>,
}

impl CallCost {
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.timespans.first().map(|ts| ts.time_start)
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.timespans.last().map(|ts| ts.time_end)
    }

    /// Wall-clock span covered by the timespans
    pub fn duration(&self) -> Duration {
        match (self.start_time(), self.end_time()) {
            (Some(start), Some(end)) => end - start,
            _ => Duration::zero(),
        }
    }

    /// Connect fee of the first timespan's rate
    pub fn connect_fee(&self) -> Decimal {
        self.timespans
            .first()
            .and_then(|ts| ts.rate_interval.as_ref())
            .map_or(Decimal::ZERO, |ri| ri.connect_fee)
    }

    /// Recompute the total from timespans and the paid connect fee
    pub fn update_cost(&mut self) {
        let mut cost: Decimal = self
            .timespans
            .iter_mut()
            .map(|ts| {
                if !ts.increments.is_empty() {
                    ts.refresh_cost();
                }
                ts.cost
            })
            .sum();
        if self.connect_fee_info.is_some() {
            cost += self.connect_fee();
        }
        self.cost = cost;
    }

    /// Sum of the durations of paid increments
    pub fn paid_duration(&self) -> Duration {
        self.timespans
            .iter()
            .flat_map(|ts| ts.increments.iter())
            .filter(|inc| inc.is_paid())
            .fold(Duration::zero(), |acc, inc| acc + inc.total_duration())
    }

    /// Copy of the call header without timespans
    pub fn header(&self) -> CallCost {
        CallCost {
            category: self.category.clone(),
            tenant: self.tenant.clone(),
            subject: self.subject.clone(),
            account: self.account.clone(),
            destination: self.destination.clone(),
            tor: self.tor,
            deduct_connect_fee: self.deduct_connect_fee,
            ..Default::default()
        }
    }
}

/// Usage query for credit and duration estimation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CallDescriptor {
    pub tenant: String,
    pub category: String,
    pub subject: String,
    pub account: String,
    pub destination: String,
    #[serde(rename = "ToR")]
    pub tor: BalanceType,
    pub time_start: DateTime<Utc>,
    pub time_end: DateTime<Utc>,
}

impl Default for CallDescriptor {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            tenant: String::new(),
            category: String::new(),
            subject: String::new(),
            account: String::new(),
            destination: String::new(),
            tor: BalanceType::Voice,
            time_start: now,
            time_end: now,
        }
    }
}

impl CallDescriptor {
    pub fn duration(&self) -> Duration {
        self.time_end - self.time_start
    }

    /// `tenant:account` key of the charged account
    pub fn account_key(&self) -> String {
        if self.tenant.is_empty() {
            self.account.clone()
        } else {
            format!("{}:{}", self.tenant, self.account)
        }
    }
}
