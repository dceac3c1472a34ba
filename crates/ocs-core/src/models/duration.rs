//! Duration helpers
//!
//! Durations travel as signed nanosecond counts in JSON, the way call records
//! are exchanged with rating and CDR tooling.

use chrono::Duration;
use rust_decimal::Decimal;

/// Serialize a `chrono::Duration` as integer nanoseconds
pub mod nanos {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(value.num_nanoseconds().unwrap_or(i64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::nanoseconds(i64::deserialize(deserializer)?))
    }
}

/// Nanoseconds of `d` as a decimal unit amount
pub fn as_units(d: Duration) -> Decimal {
    Decimal::from(d.num_nanoseconds().unwrap_or(i64::MAX))
}

/// Number of `step`-sized slices needed to cover `total`, rounding up
pub fn slices_to_cover(total: Duration, step: Duration) -> i64 {
    let total = total.num_nanoseconds().unwrap_or(i64::MAX);
    let step = step.num_nanoseconds().unwrap_or(i64::MAX);
    if total <= 0 || step <= 0 {
        return 0;
    }
    (total + step - 1) / step
}

/// `d` repeated `times` times, saturating on overflow
pub fn scale(d: Duration, times: u64) -> Duration {
    let nanos = d.num_nanoseconds().unwrap_or(i64::MAX);
    let times = i64::try_from(times).unwrap_or(i64::MAX);
    Duration::nanoseconds(nanos.saturating_mul(times))
}

/// `a + b`, saturating at the largest nanosecond count
pub fn saturating_add(a: Duration, b: Duration) -> Duration {
    let a = a.num_nanoseconds().unwrap_or(i64::MAX);
    let b = b.num_nanoseconds().unwrap_or(i64::MAX);
    Duration::nanoseconds(a.saturating_add(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slices_round_up() {
        assert_eq!(slices_to_cover(Duration::seconds(10), Duration::minutes(1)), 1);
        assert_eq!(slices_to_cover(Duration::seconds(70), Duration::minutes(1)), 2);
        assert_eq!(slices_to_cover(Duration::seconds(20), Duration::seconds(10)), 2);
        assert_eq!(slices_to_cover(Duration::zero(), Duration::seconds(1)), 0);
    }

    #[test]
    fn test_saturating_add() {
        assert_eq!(
            saturating_add(Duration::seconds(1), Duration::seconds(2)),
            Duration::seconds(3)
        );
        let max = Duration::nanoseconds(i64::MAX);
        assert_eq!(saturating_add(max, max), max);
    }

    #[test]
    fn test_scale() {
        assert_eq!(scale(Duration::minutes(1), 3), Duration::minutes(3));
        assert_eq!(scale(Duration::seconds(1), 0), Duration::zero());
    }

    #[test]
    fn test_units_are_nanoseconds() {
        assert_eq!(as_units(Duration::seconds(1)), Decimal::from(1_000_000_000i64));
    }
}
