//! Read-only credit queries

use crate::debit::DebitContext;
use crate::locking::{AccountSet, Candidate};
use crate::shared;
use chrono::Duration;
use ocs_core::models::duration::{as_units, nanos, saturating_add, scale};
use ocs_core::models::{
    classify_subject, Balance, BalanceQuery, BalanceType, CallDescriptor, RateInterval,
    SubjectRating,
};
use ocs_core::ChargeResult;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::warn;

/// Balance able to pay for the queried usage
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreditBalance {
    #[serde(rename = "AccountID")]
    pub account_id: String,
    #[serde(rename = "Type")]
    pub balance_type: BalanceType,
    pub balance: Balance,
}

/// What an account can spend on one kind of usage
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreditInfo {
    /// Usage the unit balances cover
    #[serde(with = "nanos")]
    pub duration: Duration,
    /// Monetary credit available
    pub credit: Decimal,
    /// Unit candidates first, then monetary ones, each in consumption order
    pub balances: Vec<CreditBalance>,
}

pub(crate) fn credit_for_prefix(
    ctx: &DebitContext<'_>,
    set: &AccountSet<'_>,
    cd: &CallDescriptor,
) -> ChargeResult<CreditInfo> {
    let query = |tor| BalanceQuery {
        destination: &cd.destination,
        category: &cd.category,
        tor,
        shared_group: None,
        min_prefix: ctx.config.min_prefix_match,
        now: ctx.now,
    };
    let units = if cd.tor.is_monetary() {
        Vec::new()
    } else {
        shared::candidates(set, ctx.index, &query(cd.tor))
    };
    let money = shared::candidates(set, ctx.index, &query(BalanceType::Monetary));

    let credit: Decimal = money
        .iter()
        .filter_map(|c| set.balance(c))
        .map(Balance::value)
        .filter(|v| *v > Decimal::ZERO)
        .sum();

    let mut left = credit;
    let mut covered = Duration::zero();
    for c in &units {
        let Some(b) = set.balance(c) else {
            continue;
        };
        let available = b.available_usage(cd.tor);
        let subject = if b.rating_subject.is_empty() {
            ctx.config.balance_rating_subject(cd.tor)
        } else {
            b.rating_subject.as_str()
        };
        let usable = match classify_subject(subject) {
            Ok(SubjectRating::Zero(_)) | Ok(SubjectRating::Standard) => available,
            Ok(SubjectRating::Named(name)) => {
                match ctx
                    .rater
                    .rate_for_subject(&cd.tenant, &cd.category, &name, &cd.destination)
                {
                    Some(rate) => {
                        let (usable, spent) = affordable(&rate, available, left);
                        left -= spent;
                        usable
                    }
                    None => available,
                }
            }
            Err(e) => {
                warn!(account = %c.account_id, balance = %b.uuid, error = %e, "Skipping balance");
                Duration::zero()
            }
        };
        covered = saturating_add(covered, usable);
    }

    let balances = units
        .iter()
        .chain(money.iter())
        .filter_map(|c| credit_balance(set, c))
        .collect();
    Ok(CreditInfo {
        duration: covered,
        credit,
        balances,
    })
}

fn credit_balance(set: &AccountSet<'_>, c: &Candidate) -> Option<CreditBalance> {
    Some(CreditBalance {
        account_id: c.account_id.clone(),
        balance_type: c.balance.balance_type,
        balance: set.balance(c)?.clone(),
    })
}

/// Part of `wanted` that `credit` pays at `rate`, and the credit it takes
///
/// Only whole rate increments are counted.
fn affordable(rate: &RateInterval, wanted: Duration, credit: Decimal) -> (Duration, Decimal) {
    let Some(group) = rate.group_at(Duration::zero()) else {
        return (wanted, Decimal::ZERO);
    };
    if group.value <= Decimal::ZERO || group.rate_increment <= Duration::zero() {
        return (wanted, Decimal::ZERO);
    }
    let unit = if group.rate_unit > Duration::zero() {
        group.rate_unit
    } else {
        group.rate_increment
    };
    let per_increment = group.value * as_units(group.rate_increment) / as_units(unit);
    let wanted_increments = as_units(wanted) / as_units(group.rate_increment);
    let increments = (credit / per_increment).floor().min(wanted_increments.floor());
    let covered = increments.to_i64().unwrap_or(0).max(0) as u64;
    (
        scale(group.rate_increment, covered).min(wanted),
        per_increment * Decimal::from(covered),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_affordable_whole_increments() {
        let rate = RateInterval::flat(
            Decimal::ZERO,
            dec!(1),
            Duration::seconds(10),
            Duration::seconds(1),
        );
        let (covered, spent) = affordable(&rate, Duration::seconds(100), dec!(35));
        assert_eq!(covered, Duration::seconds(30));
        assert_eq!(spent, dec!(30));

        let (covered, spent) = affordable(&rate, Duration::seconds(20), dec!(500));
        assert_eq!(covered, Duration::seconds(20));
        assert_eq!(spent, dec!(20));
    }

    #[test]
    fn test_free_rate_is_unbounded() {
        let rate = RateInterval::zero(Duration::seconds(1));
        assert_eq!(
            affordable(&rate, Duration::minutes(5), Decimal::ZERO),
            (Duration::minutes(5), Decimal::ZERO)
        );
    }
}
