//! The debit walk
//!
//! Walks a rated call from its start with a cursor. Unit balances of the
//! call's type pay first, monetary balances after them, each candidate
//! covering as much of the call as it can from the cursor onwards. The paid
//! portions become the timespans of a new `CallCost`; the input is never
//! modified.

use crate::locking::{AccountSet, Candidate};
use crate::shared;
use chrono::{DateTime, Duration, Utc};
use ocs_core::config::EngineConfig;
use ocs_core::constants::META_NONE;
use ocs_core::models::duration::{self, slices_to_cover};
use ocs_core::models::{
    classify_subject, destination_ids_for_number, Balance, BalanceInfo, BalanceQuery,
    BalanceType, CallCost, Increment, MonetaryInfo, RateInterval, SubjectRating, TimeSpan,
    UnitInfo, UsageContext,
};
use ocs_core::traits::{ActionExecutor, DestinationIndex, SubjectRater};
use ocs_core::{ChargeError, ChargeResult};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Collaborators and switches of one debit
pub(crate) struct DebitContext<'a> {
    pub config: &'a EngineConfig,
    pub index: &'a dyn DestinationIndex,
    pub rater: &'a dyn SubjectRater,
    pub executor: &'a dyn ActionExecutor,
    pub now: DateTime<Utc>,
    /// Feed the paid amounts to the unit counters
    pub count: bool,
    /// Evaluate triggers of the touched accounts afterwards
    pub run_triggers: bool,
}

type UsageKey = (String, BalanceType, usize);

struct Walk<'c, 's, 'a> {
    ctx: &'c DebitContext<'c>,
    set: &'s mut AccountSet<'a>,
    cc: &'c CallCost,
    out: CallCost,
    call_start: DateTime<Utc>,
    call_end: DateTime<Utc>,
    blocked: bool,
    usage: BTreeMap<UsageKey, Decimal>,
}

/// Debit `cc` from the accounts in `set`
///
/// Returns the paid call. When credit runs out the error carries the paid
/// prefix; whatever was debited before stays debited.
pub(crate) fn debit_call_cost(
    ctx: &DebitContext<'_>,
    set: &mut AccountSet<'_>,
    cc: &CallCost,
) -> ChargeResult<CallCost> {
    {
        let owner = set.owner_mut()?;
        owner.ensure_enabled()?;
        owner.clean_expired_stuff(ctx.now, ctx.config.remove_expired);
    }

    let (Some(call_start), Some(call_end)) = (cc.start_time(), cc.end_time()) else {
        return Ok(cc.header());
    };

    let mut walk = Walk {
        ctx,
        set,
        cc,
        out: cc.header(),
        call_start,
        call_end,
        blocked: false,
        usage: BTreeMap::new(),
    };
    let result = walk.run();
    walk.finish();
    result.map(|()| walk.out)
}

impl Walk<'_, '_, '_> {
    fn run(&mut self) -> ChargeResult<()> {
        if !self.pay_connect_fee()? {
            let missing = self.cc.connect_fee();
            if self.blocked {
                debug!(account = %self.set.owner, %missing, "Blocker refused the connect fee");
                return Ok(());
            }
            warn!(account = %self.set.owner, %missing, "Connect fee not covered");
            return Err(self.insufficient(missing));
        }

        let mut cursor = self.call_start;
        while cursor < self.call_end && !self.blocked {
            let before = cursor;
            if !self.cc.tor.is_monetary() {
                let units = self.candidates(self.cc.tor);
                cursor = self.pay_with(&units, cursor)?;
            }
            if cursor < self.call_end && !self.blocked {
                let money = self.candidates(BalanceType::Monetary);
                cursor = self.pay_with(&money, cursor)?;
            }
            if cursor == before {
                break;
            }
        }

        if cursor < self.call_end {
            self.settle_remainder(cursor)?;
        }
        Ok(())
    }

    fn candidates(&self, tor: BalanceType) -> Vec<Candidate> {
        let query = BalanceQuery {
            destination: &self.cc.destination,
            category: &self.cc.category,
            tor,
            shared_group: None,
            min_prefix: self.ctx.config.min_prefix_match,
            now: self.ctx.now,
        };
        shared::candidates(&*self.set, self.ctx.index, &query)
    }

    fn decimals(&self) -> u32 {
        self.ctx.config.rounding_decimals
    }

    fn record_usage(&mut self, c: &Candidate, amount: Decimal) {
        *self
            .usage
            .entry((c.account_id.clone(), c.balance.balance_type, c.balance.index))
            .or_default() += amount;
    }

    fn insufficient(&mut self, missing: Decimal) -> ChargeError {
        self.out.update_cost();
        ChargeError::InsufficientCredit {
            account: self.set.owner.to_string(),
            missing,
            partial: Box::new(self.out.clone()),
        }
    }

    /// Charge the connect fee in one piece; false when nobody can
    fn pay_connect_fee(&mut self) -> ChargeResult<bool> {
        let fee = self.cc.connect_fee();
        if !self.cc.deduct_connect_fee || fee <= Decimal::ZERO {
            return Ok(true);
        }

        for c in self.candidates(BalanceType::Monetary) {
            let Some(b) = self.set.balance(&c) else {
                continue;
            };
            if b.value() >= fee {
                let info = self.debit_money(&c, fee);
                self.out.connect_fee_info = Some(info);
                debug!(account = %c.account_id, %fee, "Connect fee paid");
                return Ok(true);
            }
            if b.blocker {
                self.blocked = true;
                return Ok(false);
            }
        }

        if self.set.owner()?.allow_negative {
            let info = self.debit_default(fee)?;
            self.out.connect_fee_info = Some(info);
            return Ok(true);
        }
        Ok(false)
    }

    /// Let each candidate in turn pay from `cursor`; returns the new cursor
    fn pay_with(
        &mut self,
        candidates: &[Candidate],
        mut cursor: DateTime<Utc>,
    ) -> ChargeResult<DateTime<Utc>> {
        for c in candidates {
            if cursor >= self.call_end {
                break;
            }
            let Some(b) = self.set.balance(c) else {
                continue;
            };
            let blocker = b.blocker;
            let subject = if b.rating_subject.is_empty() && !c.balance.balance_type.is_monetary() {
                self.ctx.config.balance_rating_subject(self.cc.tor).to_string()
            } else {
                b.rating_subject.clone()
            };

            let rating = match classify_subject(&subject) {
                Ok(rating) => rating,
                Err(e) => {
                    warn!(account = %c.account_id, balance = %b.uuid, error = %e, "Skipping balance");
                    continue;
                }
            };
            cursor = match rating {
                SubjectRating::Zero(slice) if !c.balance.balance_type.is_monetary() => {
                    self.pay_zero_rated(c, cursor, slice)
                }
                SubjectRating::Named(name) => self.pay_rated(c, cursor, Some(&name))?,
                _ => self.pay_rated(c, cursor, None)?,
            };

            if blocker && cursor < self.call_end {
                debug!(account = %c.account_id, "Blocker balance exhausted, stopping");
                self.blocked = true;
            }
            if self.blocked {
                break;
            }
        }
        Ok(cursor)
    }

    /// Consume fixed free slices from a unit balance
    ///
    /// The rest of the call is cut in `slice` pieces, the last one billed
    /// whole. Returns the cursor after the slices paid.
    fn pay_zero_rated(&mut self, c: &Candidate, cursor: DateTime<Utc>, slice: Duration) -> DateTime<Utc> {
        let wanted = slices_to_cover(self.call_end - cursor, slice);
        let tor = self.cc.tor;
        let decimals = self.decimals();
        let Some(b) = self.set.balance_mut(c) else {
            return cursor;
        };
        let per_slice = b.units_for(slice, tor, decimals);
        let affordable = if per_slice <= Decimal::ZERO {
            wanted
        } else {
            (b.value() / per_slice)
                .floor()
                .to_i64()
                .unwrap_or(0)
                .min(wanted)
        };
        if affordable <= 0 {
            return cursor;
        }

        let consumed = per_slice * Decimal::from(affordable);
        b.debit(consumed);
        let info = BalanceInfo {
            unit: Some(UnitInfo {
                uuid: b.uuid.clone(),
                id: b.id.clone(),
                value: b.value(),
                destination_id: c.balance.destination_id.clone(),
                consumed: per_slice,
                tor,
                account_id: c.account_id.clone(),
            }),
            monetary: None,
            account_id: c.account_id.clone(),
        };
        let matched_subject = b.uuid.clone();

        let count = affordable as u64;
        let end = cursor + duration::scale(slice, count);
        let mut ts = TimeSpan::new(cursor, end, RateInterval::zero(slice));
        ts.duration_index = end - self.call_start;
        ts.increments.push(Increment {
            duration: slice,
            cost: Decimal::ZERO,
            compress_factor: count,
            balance_info: info,
        });
        ts.matched_subject = matched_subject;
        ts.matched_prefix = c.balance.prefix.clone();
        ts.matched_dest_id = c.balance.destination_id.clone();
        ts.rating_plan_id = META_NONE.to_string();
        ts.refresh_cost();
        self.out.timespans.push(ts);
        self.record_usage(c, consumed);

        debug!(
            account = %c.account_id,
            slices = count,
            %consumed,
            "Zero-rated units debited"
        );
        end
    }

    /// Pay increment by increment at a rate
    ///
    /// Monetary balances pay the cost. Unit balances pay the units while the
    /// cost goes to the first monetary candidate able to cover it. `subject`
    /// replaces the timespan rate when it has one for this usage.
    fn pay_rated(
        &mut self,
        c: &Candidate,
        mut cursor: DateTime<Utc>,
        subject: Option<&str>,
    ) -> ChargeResult<DateTime<Utc>> {
        let unit = !c.balance.balance_type.is_monetary();
        let subject_rate = subject.and_then(|s| {
            let rate = self.ctx.rater.rate_for_subject(
                &self.cc.tenant,
                &self.cc.category,
                s,
                &self.cc.destination,
            );
            if rate.is_none() {
                warn!(subject = %s, account = %c.account_id, "No rate for rating subject, using timespan rate");
            }
            rate
        });
        let money = if unit {
            self.candidates(BalanceType::Monetary)
        } else {
            Vec::new()
        };

        let cc = self.cc;
        for source in &cc.timespans {
            if source.time_end <= cursor {
                continue;
            }
            let from = cursor.max(source.time_start);
            let rate = subject_rate.clone().or_else(|| source.rate_interval.clone());
            let probe = TimeSpan {
                time_start: source.time_start,
                time_end: source.time_end,
                rate_interval: rate.clone(),
                ..Default::default()
            };
            let wanted = probe.explode_from(from, self.call_start);
            let total = wanted.len();

            let mut paid = Vec::with_capacity(total);
            for inc in wanted {
                match self.pay_increment(c, inc, unit, &money) {
                    Some(inc) => paid.push(inc),
                    None => break,
                }
            }
            if paid.is_empty() {
                break;
            }
            let complete = paid.len() == total;

            let mut ts = TimeSpan {
                time_start: from,
                rate_interval: rate,
                increments: paid,
                ..Default::default()
            };
            ts.time_end = from + ts.increments_duration();
            ts.duration_index = ts.time_end - self.call_start;
            if unit {
                if let Some(b) = self.set.balance(c) {
                    ts.matched_subject = b.uuid.clone();
                }
                ts.matched_prefix = c.balance.prefix.clone();
                ts.matched_dest_id = c.balance.destination_id.clone();
                ts.rating_plan_id = META_NONE.to_string();
            } else {
                ts.matched_subject = source.matched_subject.clone();
                ts.matched_prefix = source.matched_prefix.clone();
                ts.matched_dest_id = source.matched_dest_id.clone();
                ts.rating_plan_id = source.rating_plan_id.clone();
            }
            ts.refresh_cost();
            cursor = ts.time_end;
            self.out.timespans.push(ts);

            if !complete {
                break;
            }
        }
        Ok(cursor)
    }

    /// Pay one increment from `c`, tagging it; `None` when it cannot
    fn pay_increment(
        &mut self,
        c: &Candidate,
        mut inc: Increment,
        unit: bool,
        money: &[Candidate],
    ) -> Option<Increment> {
        if !unit {
            if self.set.balance(c)?.value() < inc.cost {
                return None;
            }
            inc.balance_info = self.debit_money(c, inc.cost);
            return Some(inc);
        }

        let tor = self.cc.tor;
        let decimals = self.decimals();
        let units = {
            let b = self.set.balance(c)?;
            let units = b.units_for(inc.duration, tor, decimals);
            if b.value() < units {
                return None;
            }
            units
        };
        let payer = if inc.cost > Decimal::ZERO {
            Some(self.money_payer(money, inc.cost)?)
        } else {
            None
        };

        let b = self.set.balance_mut(c)?;
        b.debit(units);
        let unit_info = UnitInfo {
            uuid: b.uuid.clone(),
            id: b.id.clone(),
            value: b.value(),
            destination_id: c.balance.destination_id.clone(),
            consumed: units,
            tor,
            account_id: c.account_id.clone(),
        };
        self.record_usage(c, units);

        let mut info = match payer {
            Some(payer) => self.debit_money(&payer, inc.cost),
            None => BalanceInfo::default(),
        };
        info.unit = Some(unit_info);
        if info.account_id.is_empty() {
            info.account_id = c.account_id.clone();
        }
        inc.balance_info = info;
        Some(inc)
    }

    /// First monetary candidate, in order, able to cover `cost`
    ///
    /// A blocker that cannot cover it ends the search and blocks the walk.
    fn money_payer(&mut self, money: &[Candidate], cost: Decimal) -> Option<Candidate> {
        for m in money {
            let Some(mb) = self.set.balance(m) else {
                continue;
            };
            if mb.value() >= cost {
                return Some(m.clone());
            }
            if mb.blocker {
                debug!(account = %m.account_id, %cost, "Monetary blocker cannot cover rated units");
                self.blocked = true;
                return None;
            }
        }
        None
    }

    /// Subtract `amount` from a monetary candidate
    fn debit_money(&mut self, c: &Candidate, amount: Decimal) -> BalanceInfo {
        let Some(b) = self.set.balance_mut(c) else {
            return BalanceInfo::default();
        };
        b.debit(amount);
        let info = money_info(b, &c.account_id);
        self.record_usage(c, amount);
        info
    }

    /// Charge the owner's default balance, creating it when missing
    fn debit_default(&mut self, amount: Decimal) -> ChargeResult<BalanceInfo> {
        let owner_id = self.set.owner.to_string();
        let owner = self.set.owner_mut()?;
        let index = owner.ensure_default_money_balance();
        let b = owner
            .balance_map
            .get_mut(&BalanceType::Monetary)
            .and_then(|l| l.get_mut(index))
            .ok_or_else(|| ChargeError::Internal("default balance vanished".to_string()))?;
        b.debit(amount);
        let info = money_info(b, &owner_id);
        warn!(account = %owner_id, %amount, balance = %b.value(), "Charging default balance");
        *self
            .usage
            .entry((owner_id, BalanceType::Monetary, index))
            .or_default() += amount;
        Ok(info)
    }

    /// Deal with the part of the call nobody paid
    fn settle_remainder(&mut self, cursor: DateTime<Utc>) -> ChargeResult<()> {
        let mut rest = Vec::new();
        for source in &self.cc.timespans {
            if source.time_end <= cursor {
                continue;
            }
            let from = cursor.max(source.time_start);
            let mut ts = TimeSpan {
                time_start: from,
                time_end: source.time_end,
                duration_index: source.time_end - self.call_start,
                rate_interval: source.rate_interval.clone(),
                matched_subject: source.matched_subject.clone(),
                matched_prefix: source.matched_prefix.clone(),
                matched_dest_id: source.matched_dest_id.clone(),
                rating_plan_id: source.rating_plan_id.clone(),
                ..Default::default()
            };
            ts.increments = ts.explode_from(from, self.call_start);
            rest.push(ts);
        }
        let missing: Decimal = rest
            .iter()
            .flat_map(|ts| ts.increments.iter())
            .map(Increment::total_cost)
            .sum();

        let owner_id = self.set.owner.to_string();
        if missing.is_zero() {
            for ts in rest.iter_mut() {
                for inc in ts.increments.iter_mut() {
                    inc.balance_info.account_id = owner_id.clone();
                }
                ts.refresh_cost();
            }
            debug!(account = %owner_id, "Free remainder appended");
            self.out.timespans.extend(rest);
            return Ok(());
        }

        if !self.blocked && self.set.owner()?.allow_negative {
            for ts in rest.iter_mut() {
                for inc in ts.increments.iter_mut() {
                    let cost = inc.total_cost();
                    inc.balance_info = self.debit_default(cost)?;
                }
                ts.refresh_cost();
            }
            self.out.timespans.extend(rest);
            return Ok(());
        }

        warn!(account = %owner_id, %missing, blocked = self.blocked, "Insufficient credit");
        Err(self.insufficient(missing))
    }

    /// Feed counters and evaluate triggers of every account that paid
    fn finish(&mut self) {
        self.out.update_cost();
        if !self.ctx.run_triggers {
            return;
        }

        let destination_ids: BTreeSet<String> = destination_ids_for_number(
            self.ctx.index,
            &self.cc.destination,
            self.ctx.config.min_prefix_match,
        )
        .into_iter()
        .collect();
        let usage_ctx = UsageContext {
            category: &self.cc.category,
            destination_ids: &destination_ids,
        };

        let mut touched: BTreeSet<String> = BTreeSet::new();
        for ((account_id, balance_type, index), amount) in std::mem::take(&mut self.usage) {
            let Some(account) = self.set.get_mut(&account_id) else {
                continue;
            };
            if self.ctx.count {
                let balance = account.balances(balance_type).get(index).cloned();
                account.unit_counters.add_units(
                    amount,
                    balance_type,
                    Some(&usage_ctx),
                    balance.as_ref(),
                );
            }
            touched.insert(account_id);
        }
        for account_id in touched {
            if let Some(account) = self.set.get_mut(&account_id) {
                account.execute_action_triggers(None, self.ctx.executor, self.ctx.now);
            }
        }
    }
}

fn money_info(b: &Balance, account_id: &str) -> BalanceInfo {
    BalanceInfo {
        unit: None,
        monetary: Some(MonetaryInfo {
            uuid: b.uuid.clone(),
            id: b.id.clone(),
            value: b.value(),
            account_id: account_id.to_string(),
        }),
        account_id: account_id.to_string(),
    }
}
