//! Account model
//!
//! An account owns its balances (grouped by balance type), usage counters and
//! action triggers. Everything here operates on one account already held by
//! the caller; locking and cross-account work live in the engine.

use crate::constants::{META_DEFAULT, TENANT_SEPARATOR};
use crate::error::ChargeError;
use crate::models::destination::{evaluate_mask, MaskDecision};
use crate::models::{
    sort_by_weight, Action, ActionTrigger, Balance, BalanceFilter, BalanceType, CounterFilter,
    ThresholdType, UnitCounter, UnitCounters, UsageContext,
};
use crate::traits::{ActionExecutor, DestinationIndex};
use crate::ChargeResult;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, error, info};

/// Usage a balance lookup is made for
#[derive(Debug, Clone, Copy)]
pub struct BalanceQuery<'a> {
    /// Dialed number or other destination key
    pub destination: &'a str,
    pub category: &'a str,
    pub tor: BalanceType,
    /// Only balances listing this shared group qualify
    pub shared_group: Option<&'a str>,
    /// Shortest prefix considered when matching the destination
    pub min_prefix: usize,
    pub now: DateTime<Utc>,
}

/// Position of an eligible balance in its account, with the destination match
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceRef {
    pub balance_type: BalanceType,
    pub index: usize,
    pub weight: f64,
    /// Length of the prefix that qualified the balance, 0 for all-purpose
    pub precision: usize,
    pub prefix: String,
    pub destination_id: String,
}

/// Account entity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Account {
    /// `tenant:account`
    #[serde(rename = "ID")]
    pub id: String,

    /// Balances per type, in insertion order
    pub balance_map: BTreeMap<BalanceType, Vec<Balance>>,

    pub unit_counters: UnitCounters,

    pub action_triggers: Vec<ActionTrigger>,

    /// Unpaid usage goes on the default balance instead of failing
    pub allow_negative: bool,

    pub disabled: bool,

    #[serde(skip)]
    executing_triggers: bool,
}

impl Account {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Split the ID into tenant and account parts
    pub fn tenant_and_id(&self) -> (&str, &str) {
        self.id
            .split_once(TENANT_SEPARATOR)
            .unwrap_or(("", self.id.as_str()))
    }

    pub fn balances(&self, balance_type: BalanceType) -> &[Balance] {
        self.balance_map
            .get(&balance_type)
            .map_or(&[], Vec::as_slice)
    }

    pub fn balance(&self, r: &BalanceRef) -> Option<&Balance> {
        self.balance_map.get(&r.balance_type)?.get(r.index)
    }

    pub fn balance_mut(&mut self, r: &BalanceRef) -> Option<&mut Balance> {
        self.balance_map.get_mut(&r.balance_type)?.get_mut(r.index)
    }

    pub fn add_balance(&mut self, balance_type: BalanceType, balance: Balance) {
        self.balance_map.entry(balance_type).or_default().push(balance);
    }

    pub fn get_balance_with_id(&self, balance_type: BalanceType, id: &str) -> Option<&Balance> {
        self.balances(balance_type).iter().find(|b| b.id == id)
    }

    /// Every shared group named by any balance of the account
    pub fn shared_group_ids(&self) -> BTreeSet<String> {
        self.balance_map
            .values()
            .flatten()
            .flat_map(|b| b.shared_groups.iter().cloned())
            .collect()
    }

    /// Balances able to pay for the usage described by `query`
    ///
    /// Unit types also consider `*generic` balances. Disabled and expired
    /// balances are skipped, as are empty ones unless they are shared or
    /// blockers. The result is ordered by weight, highest first, keeping
    /// insertion order among equal weights.
    pub fn balances_for_prefix(
        &self,
        index: &dyn DestinationIndex,
        query: &BalanceQuery<'_>,
    ) -> Vec<BalanceRef> {
        let mut types = vec![query.tor];
        if query.tor.uses_generic() {
            types.push(BalanceType::Generic);
        }

        let mut found = Vec::new();
        for balance_type in types {
            for (idx, b) in self.balances(balance_type).iter().enumerate() {
                if b.disabled || b.is_expired_at(query.now) {
                    continue;
                }
                if b.value() <= Decimal::ZERO && !b.is_shared() && !b.blocker {
                    continue;
                }
                if query
                    .shared_group
                    .is_some_and(|sg| !b.shared_groups.contains(sg))
                {
                    continue;
                }
                if !b.match_category(query.category) {
                    continue;
                }
                match evaluate_mask(&b.destination_ids, query.destination, index, query.min_prefix) {
                    MaskDecision::Excluded => continue,
                    MaskDecision::Included {
                        precision,
                        prefix,
                        destination_id,
                    } => found.push(BalanceRef {
                        balance_type,
                        index: idx,
                        weight: b.weight,
                        precision,
                        prefix,
                        destination_id: destination_id.unwrap_or_default(),
                    }),
                }
            }
        }
        sort_by_weight(&mut found, |r| r.weight);
        found
    }

    pub fn default_money_balance(&self) -> Option<&Balance> {
        self.balances(BalanceType::Monetary)
            .iter()
            .find(|b| b.is_default())
    }

    /// Index of the default monetary balance, creating it when missing
    pub fn ensure_default_money_balance(&mut self) -> usize {
        let list = self.balance_map.entry(BalanceType::Monetary).or_default();
        if let Some(idx) = list.iter().position(Balance::is_default) {
            return idx;
        }
        debug!(account = %self.id, "Creating default monetary balance");
        list.push(Balance::default_money());
        list.len() - 1
    }

    /// Apply an administrative debit described by `action`
    ///
    /// Every non-expired balance of the target type soft-matching the action
    /// filter loses the filter value. When none matches, a new balance built
    /// from the filter is appended holding the negated value (or, for ID
    /// `*default`, the default monetary balance is debited). Counters are
    /// rebuilt and triggers evaluated afterwards. A missing action or filter
    /// changes nothing.
    pub fn debit_balance_action(
        &mut self,
        action: Option<&Action>,
        reset: bool,
        reset_if_negative: bool,
        executor: &dyn ActionExecutor,
        now: DateTime<Utc>,
    ) -> ChargeResult<()> {
        let Some(filter) = action.and_then(|a| a.balance.as_ref()) else {
            return Ok(());
        };
        let amount = filter.value_at(now);
        let balance_type = filter.target_type();

        let mut found = false;
        if let Some(list) = self.balance_map.get_mut(&balance_type) {
            for b in list.iter_mut() {
                if b.is_expired_at(now) || !b.match_filter(filter, false, false) {
                    continue;
                }
                if reset || (reset_if_negative && b.value() < Decimal::ZERO) {
                    b.set_value(Decimal::ZERO);
                }
                b.subtract_value(amount);
                found = true;
            }
        }

        if !found {
            if filter.id.as_deref() == Some(META_DEFAULT) && balance_type.is_monetary() {
                let idx = self.ensure_default_money_balance();
                if let Some(b) = self
                    .balance_map
                    .get_mut(&BalanceType::Monetary)
                    .and_then(|l| l.get_mut(idx))
                {
                    b.subtract_value(amount);
                }
            } else {
                let mut b = filter.create_balance(now);
                b.set_value(-amount);
                if b.uuid.is_empty() {
                    b.uuid = uuid::Uuid::new_v4().to_string();
                }
                debug!(account = %self.id, balance = %b.uuid, "Adding balance from action");
                self.add_balance(balance_type, b);
            }
        }

        self.init_counters();
        self.execute_action_triggers(None, executor, now);
        Ok(())
    }

    /// Add usage to the counters, then evaluate triggers
    pub fn count_units(
        &mut self,
        amount: Decimal,
        balance_type: BalanceType,
        usage: Option<&UsageContext<'_>>,
        balance: Option<&Balance>,
        executor: &dyn ActionExecutor,
        now: DateTime<Utc>,
    ) {
        self.unit_counters
            .add_units(amount, balance_type, usage, balance);
        self.execute_action_triggers(None, executor, now);
    }

    /// Rebuild counters from the counter triggers, keeping existing values
    ///
    /// One unit counter per (balance type, counter type), one counter per
    /// distinct trigger counter filter. Running it twice changes nothing.
    pub fn init_counters(&mut self) {
        let old = std::mem::take(&mut self.unit_counters);
        let mut fresh: BTreeMap<BalanceType, Vec<UnitCounter>> = BTreeMap::new();

        for at in &self.action_triggers {
            let Some(counter_type) = at.threshold_type.counter_type() else {
                continue;
            };
            let group = fresh.entry(at.balance_type().unwrap_or_default()).or_default();
            let pos = match group.iter().position(|uc| uc.counter_type == counter_type) {
                Some(pos) => pos,
                None => {
                    group.push(UnitCounter::new(counter_type));
                    group.len() - 1
                }
            };
            let filter = at.counter_filter();
            if !group[pos].has_counter(&filter) {
                group[pos].counters.push(CounterFilter::new(filter));
            }
        }

        for (balance_type, counters) in fresh.iter_mut() {
            let Some(previous) = old.0.get(balance_type) else {
                continue;
            };
            for uc in counters.iter_mut() {
                for old_uc in previous {
                    if uc.copy_values_from(old_uc) {
                        break;
                    }
                }
            }
        }
        self.unit_counters = UnitCounters(fresh);
    }

    /// Evaluate the triggers selected by `filter` and fire those crossed
    ///
    /// Triggers run in weight order. Nested calls made by the actions a
    /// trigger runs are ignored. Balance thresholds only look at balances
    /// changed since the last evaluation, except `*balance_expired`.
    pub fn execute_action_triggers(
        &mut self,
        filter: Option<&BalanceFilter>,
        executor: &dyn ActionExecutor,
        now: DateTime<Utc>,
    ) {
        if self.executing_triggers {
            return;
        }
        self.executing_triggers = true;
        sort_by_weight(&mut self.action_triggers, |at| at.weight);

        for i in 0..self.action_triggers.len() {
            let Some(at) = self.action_triggers.get(i) else {
                break;
            };
            if at.executed
                || !at.matches(filter)
                || at.is_expired(now)
                || !at.is_active(now)
                || at.is_sleeping(now)
            {
                continue;
            }
            if self.threshold_crossed(at, now) {
                self.fire_trigger(i, executor, now);
            }
        }

        self.clean_expired_stuff(now, true);
        for b in self.balance_map.values_mut().flatten() {
            b.clear_dirty();
        }
        self.executing_triggers = false;
    }

    fn threshold_crossed(&self, at: &ActionTrigger, now: DateTime<Utc>) -> bool {
        let balance_type = at.balance_type().unwrap_or_default();
        if let Some(counter_type) = at.threshold_type.counter_type() {
            let wanted = at.counter_filter();
            return self
                .unit_counters
                .get(balance_type)
                .iter()
                .filter(|uc| uc.counter_type == counter_type)
                .flat_map(|uc| uc.counters.iter())
                .any(|c| {
                    c.filter.as_ref() == Some(&wanted)
                        && at.threshold_type.crossed(c.value, at.threshold_value)
                });
        }

        let template = at.balance.clone().unwrap_or_default();
        self.balances(balance_type).iter().any(|b| {
            if at.threshold_type != ThresholdType::BalanceExpired && !b.is_dirty() {
                return false;
            }
            if !b.hard_match_filter(&template, false) {
                return false;
            }
            match at.threshold_type {
                ThresholdType::BalanceExpired => b.is_expired_at(now),
                other => other.crossed(b.value(), at.threshold_value),
            }
        })
    }

    fn fire_trigger(&mut self, i: usize, executor: &dyn ActionExecutor, now: DateTime<Utc>) {
        let Some(at) = self.action_triggers.get_mut(i) else {
            return;
        };
        at.executed = true;
        at.last_execution_time = Some(now);
        let trigger = at.clone();

        info!(
            account = %self.id,
            trigger = %trigger.id,
            actions = %trigger.actions_id,
            threshold = ?trigger.threshold_type,
            "Firing action trigger"
        );
        let failed = match executor.execute_actions(self, &trigger, None) {
            Ok(()) => false,
            Err(e) => {
                error!(
                    account = %self.id,
                    trigger = %trigger.id,
                    error = %e,
                    "Action execution failed"
                );
                true
            }
        };
        if let Some(at) = self.action_triggers.get_mut(i) {
            if failed || at.recurrent {
                at.executed = false;
            }
        }
    }

    /// Re-arm the triggers selected by `filter`, then evaluate them
    pub fn reset_action_triggers(
        &mut self,
        filter: Option<&BalanceFilter>,
        executor: &dyn ActionExecutor,
        now: DateTime<Utc>,
    ) {
        for at in self.action_triggers.iter_mut() {
            if at.matches(filter) {
                at.executed = false;
            }
        }
        self.execute_action_triggers(filter, executor, now);
    }

    /// Toggle the recurrent flag of the triggers selected by `filter`
    pub fn set_recurrent(&mut self, filter: Option<&BalanceFilter>, recurrent: bool) {
        for at in self.action_triggers.iter_mut() {
            if at.matches(filter) {
                at.recurrent = recurrent;
            }
        }
    }

    pub fn reset_counters(&mut self, filter: Option<&BalanceFilter>) {
        self.unit_counters.reset(filter);
    }

    /// Drop expired triggers and, when `remove_balances` is set, expired balances
    pub fn clean_expired_stuff(&mut self, now: DateTime<Utc>, remove_balances: bool) {
        if remove_balances {
            for list in self.balance_map.values_mut() {
                list.retain(|b| !b.is_expired_at(now));
            }
        }
        self.action_triggers.retain(|at| !at.is_expired(now));
    }

    /// Fail when the account refuses charging
    pub fn ensure_enabled(&self) -> ChargeResult<()> {
        if self.disabled {
            return Err(ChargeError::AccountDisabled(self.id.clone()));
        }
        Ok(())
    }

    pub fn as_account_summary(&self) -> AccountSummary {
        let (tenant, id) = self.tenant_and_id();
        AccountSummary {
            tenant: tenant.to_string(),
            id: id.to_string(),
            balance_summaries: self
                .balance_map
                .iter()
                .flat_map(|(balance_type, list)| {
                    list.iter().map(move |b| BalanceSummary {
                        uuid: b.uuid.clone(),
                        id: b.id.clone(),
                        balance_type: *balance_type,
                        value: b.value(),
                        disabled: b.disabled,
                    })
                })
                .collect(),
            allow_negative: self.allow_negative,
            disabled: self.disabled,
        }
    }
}

/// Compact view of one balance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BalanceSummary {
    #[serde(rename = "UUID")]
    pub uuid: String,
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Type")]
    pub balance_type: BalanceType,
    pub value: Decimal,
    pub disabled: bool,
}

/// Compact view of an account, as exported to other subsystems
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AccountSummary {
    pub tenant: String,
    #[serde(rename = "ID")]
    pub id: String,
    pub balance_summaries: Vec<BalanceSummary>,
    pub allow_negative: bool,
    pub disabled: bool,
}

impl AccountSummary {
    /// Parse a summary, `null` yielding `None`
    pub fn from_json(json: &str) -> ChargeResult<Option<Self>> {
        Ok(serde_json::from_str(json)?)
    }
}
