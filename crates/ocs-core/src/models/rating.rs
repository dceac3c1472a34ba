//! Rate tables attached to timespans and rating-subject classification

use crate::constants::{META_SUBJECT_PREFIX, ZERO_SUBJECT_PREFIX};
use crate::error::ChargeError;
use crate::models::duration::{self, nanos};
use crate::ChargeResult;
use chrono::Duration;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Rounding applied to increment costs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RoundingMethod {
    #[serde(rename = "*up")]
    Up,
    #[serde(rename = "*down")]
    Down,
    #[default]
    #[serde(rename = "*middle")]
    Middle,
}

impl RoundingMethod {
    pub fn round(&self, value: Decimal, decimals: u32) -> Decimal {
        let strategy = match self {
            RoundingMethod::Up => RoundingStrategy::AwayFromZero,
            RoundingMethod::Down => RoundingStrategy::ToZero,
            RoundingMethod::Middle => RoundingStrategy::MidpointAwayFromZero,
        };
        value.round_dp_with_strategy(decimals, strategy)
    }
}

/// One step of a rate table, effective from `group_interval_start` into the call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RateGroup {
    #[serde(with = "nanos")]
    pub group_interval_start: Duration,
    /// Price of one `rate_unit`
    pub value: Decimal,
    #[serde(with = "nanos")]
    pub rate_increment: Duration,
    #[serde(with = "nanos")]
    pub rate_unit: Duration,
}

impl Default for RateGroup {
    fn default() -> Self {
        Self {
            group_interval_start: Duration::zero(),
            value: Decimal::ZERO,
            rate_increment: Duration::seconds(1),
            rate_unit: Duration::seconds(1),
        }
    }
}

/// Per-unit rate table of a timespan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RateInterval {
    pub connect_fee: Decimal,
    pub rates: Vec<RateGroup>,
    pub rounding_method: RoundingMethod,
    pub rounding_decimals: u32,
}

impl Default for RateInterval {
    fn default() -> Self {
        Self {
            connect_fee: Decimal::ZERO,
            rates: Vec::new(),
            rounding_method: RoundingMethod::Middle,
            rounding_decimals: 4,
        }
    }
}

impl RateInterval {
    /// Single-group table charging `value` per `unit`, sliced in `increment`s
    pub fn flat(connect_fee: Decimal, value: Decimal, increment: Duration, unit: Duration) -> Self {
        Self {
            connect_fee,
            rates: vec![RateGroup {
                group_interval_start: Duration::zero(),
                value,
                rate_increment: increment,
                rate_unit: unit,
            }],
            ..Default::default()
        }
    }

    /// Free table used for timespans paid by zero-rated unit balances
    pub fn zero(increment: Duration) -> Self {
        Self::flat(Decimal::ZERO, Decimal::ZERO, increment, increment)
    }

    /// Group in effect `offset` into the call
    pub fn group_at(&self, offset: Duration) -> Option<&RateGroup> {
        self.rates
            .iter()
            .filter(|g| g.group_interval_start <= offset)
            .max_by_key(|g| g.group_interval_start)
            .or_else(|| self.rates.first())
    }

    /// Increment length and cost of the slice starting `offset` into the call
    ///
    /// Tables without groups, or groups with a non-positive increment, charge
    /// nothing and cover `fallback` in one slice.
    pub fn slice_at(&self, offset: Duration, fallback: Duration) -> (Duration, Decimal) {
        match self.group_at(offset) {
            Some(group) if group.rate_increment > Duration::zero() => {
                let unit = if group.rate_unit > Duration::zero() {
                    group.rate_unit
                } else {
                    group.rate_increment
                };
                let cost = group.value * duration::as_units(group.rate_increment)
                    / duration::as_units(unit);
                (
                    group.rate_increment,
                    self.rounding_method.round(cost, self.rounding_decimals),
                )
            }
            _ => (fallback, Decimal::ZERO),
        }
    }
}

/// How a balance rating subject prices what the balance pays
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectRating {
    /// Consumed in fixed free slices (`*zero1s`, `*zero1m`, ...)
    Zero(Duration),
    /// Priced at the named subject's rate
    Named(String),
    /// Priced at the timespan's own rate
    Standard,
}

/// Classify a rating subject
pub fn classify_subject(subject: &str) -> ChargeResult<SubjectRating> {
    if subject.is_empty() {
        return Ok(SubjectRating::Standard);
    }
    if let Some(granularity) = subject.strip_prefix(ZERO_SUBJECT_PREFIX) {
        let parsed = humantime::parse_duration(granularity)
            .map_err(|e| ChargeError::InvalidRatingSubject(format!("{}: {}", subject, e)))?;
        let slice = Duration::from_std(parsed)
            .map_err(|e| ChargeError::InvalidRatingSubject(format!("{}: {}", subject, e)))?;
        if slice <= Duration::zero() {
            return Err(ChargeError::InvalidRatingSubject(subject.to_string()));
        }
        return Ok(SubjectRating::Zero(slice));
    }
    if subject.starts_with(META_SUBJECT_PREFIX) {
        return Ok(SubjectRating::Standard);
    }
    Ok(SubjectRating::Named(subject.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_zero_subjects() {
        assert_eq!(
            classify_subject("*zero1s").unwrap(),
            SubjectRating::Zero(Duration::seconds(1))
        );
        assert_eq!(
            classify_subject("*zero1m").unwrap(),
            SubjectRating::Zero(Duration::minutes(1))
        );
        assert_eq!(
            classify_subject("*zero1ns").unwrap(),
            SubjectRating::Zero(Duration::nanoseconds(1))
        );
        assert!(classify_subject("*zerofoo").is_err());
    }

    #[test]
    fn test_named_and_standard_subjects() {
        assert_eq!(
            classify_subject("minu").unwrap(),
            SubjectRating::Named("minu".to_string())
        );
        assert_eq!(classify_subject("").unwrap(), SubjectRating::Standard);
        assert_eq!(classify_subject("*any").unwrap(), SubjectRating::Standard);
    }

    #[test]
    fn test_group_selection_by_offset() {
        let ri = RateInterval {
            rates: vec![
                RateGroup {
                    value: dec!(2),
                    rate_increment: Duration::nanoseconds(1),
                    rate_unit: Duration::nanoseconds(1),
                    ..Default::default()
                },
                RateGroup {
                    group_interval_start: Duration::nanoseconds(60),
                    value: dec!(1),
                    rate_increment: Duration::nanoseconds(1),
                    rate_unit: Duration::nanoseconds(1),
                },
            ],
            ..Default::default()
        };
        assert_eq!(ri.group_at(Duration::nanoseconds(59)).unwrap().value, dec!(2));
        assert_eq!(ri.group_at(Duration::nanoseconds(60)).unwrap().value, dec!(1));
    }

    #[test]
    fn test_slice_cost() {
        let ri = RateInterval::flat(
            Decimal::ZERO,
            dec!(1),
            Duration::seconds(10),
            Duration::seconds(1),
        );
        assert_eq!(
            ri.slice_at(Duration::zero(), Duration::seconds(5)),
            (Duration::seconds(10), dec!(10))
        );
        let empty = RateInterval::default();
        assert_eq!(
            empty.slice_at(Duration::zero(), Duration::seconds(5)),
            (Duration::seconds(5), Decimal::ZERO)
        );
    }

    #[test]
    fn test_rounding_methods() {
        assert_eq!(RoundingMethod::Up.round(dec!(0.0166666), 6), dec!(0.016667));
        assert_eq!(RoundingMethod::Down.round(dec!(0.0166666), 6), dec!(0.016666));
        assert_eq!(RoundingMethod::Middle.round(dec!(0.0000005), 6), dec!(0.000001));
    }
}
