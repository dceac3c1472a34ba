//! Usage counters
//!
//! Counters accumulate debited amounts per balance type. `*event` counters
//! match the usage context (category, destination IDs), `*balance` counters
//! match the balance that paid.

use crate::models::{Balance, BalanceFilter, BalanceType};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// What a counter is matched against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CounterType {
    #[default]
    #[serde(rename = "*event")]
    Event,
    #[serde(rename = "*balance")]
    Balance,
}

/// One named accumulator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct CounterFilter {
    pub value: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<BalanceFilter>,
}

impl CounterFilter {
    pub fn new(filter: BalanceFilter) -> Self {
        Self {
            value: Decimal::ZERO,
            filter: Some(filter),
        }
    }
}

/// Group of counters sharing a counter type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct UnitCounter {
    pub counter_type: CounterType,
    pub counters: Vec<CounterFilter>,
}

impl UnitCounter {
    pub fn new(counter_type: CounterType) -> Self {
        Self {
            counter_type,
            counters: Vec::new(),
        }
    }

    pub fn has_counter(&self, filter: &BalanceFilter) -> bool {
        self.counters
            .iter()
            .any(|c| c.filter.as_ref() == Some(filter))
    }

    /// Copy values of identically filtered counters from `old`
    ///
    /// Returns false when the counter types differ.
    pub fn copy_values_from(&mut self, old: &UnitCounter) -> bool {
        if self.counter_type != old.counter_type {
            return false;
        }
        for counter in &mut self.counters {
            if let Some(previous) = old.counters.iter().find(|c| c.filter == counter.filter) {
                counter.value = previous.value;
            }
        }
        true
    }
}

/// Usage being counted: category and destinations of the charged call
#[derive(Debug, Clone, Copy)]
pub struct UsageContext<'a> {
    pub category: &'a str,
    pub destination_ids: &'a BTreeSet<String>,
}

impl UsageContext<'_> {
    /// Whether an `*event` counter filter accepts this usage
    pub fn matches(&self, filter: Option<&BalanceFilter>) -> bool {
        let Some(filter) = filter else {
            return true;
        };
        if let Some(categories) = filter.categories.as_ref() {
            if !categories.is_empty() && !categories.contains(self.category) {
                return false;
            }
        }
        if let Some(mask) = filter.destination_ids.as_ref() {
            let mut has_include = false;
            let mut included = false;
            for (id, include) in mask {
                let present = self.destination_ids.contains(id);
                if *include {
                    has_include = true;
                    included |= present;
                } else if present {
                    return false;
                }
            }
            if has_include && !included {
                return false;
            }
        }
        true
    }
}

/// Counters of an account, keyed by balance type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitCounters(pub BTreeMap<BalanceType, Vec<UnitCounter>>);

impl UnitCounters {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, balance_type: BalanceType) -> &[UnitCounter] {
        self.0.get(&balance_type).map_or(&[], Vec::as_slice)
    }

    /// Add `amount` to every counter under `balance_type` accepting the usage
    ///
    /// `*event` counters need a usage context, `*balance` counters the paying
    /// balance; a counter without its input is left alone.
    pub fn add_units(
        &mut self,
        amount: Decimal,
        balance_type: BalanceType,
        usage: Option<&UsageContext<'_>>,
        balance: Option<&Balance>,
    ) {
        let Some(counters) = self.0.get_mut(&balance_type) else {
            return;
        };
        for uc in counters.iter_mut() {
            for counter in &mut uc.counters {
                let hit = match uc.counter_type {
                    CounterType::Event => usage.is_some_and(|u| u.matches(counter.filter.as_ref())),
                    CounterType::Balance => balance.is_some_and(|b| {
                        counter
                            .filter
                            .as_ref()
                            .map_or(true, |f| b.match_filter(f, true, false))
                    }),
                };
                if hit {
                    counter.value += amount;
                }
            }
        }
    }

    /// Zero counters selected by `filter`
    ///
    /// No filter resets everything. A filter restricts by balance type when
    /// it names one and by counter ID when it names one.
    pub fn reset(&mut self, filter: Option<&BalanceFilter>) {
        for (balance_type, counters) in self.0.iter_mut() {
            if let Some(wanted) = filter.and_then(|f| f.balance_type) {
                if wanted != *balance_type {
                    continue;
                }
            }
            let wanted_id = filter.and_then(|f| f.id.as_deref());
            for counter in counters.iter_mut().flat_map(|uc| uc.counters.iter_mut()) {
                let id = counter.filter.as_ref().and_then(|f| f.id.as_deref());
                if wanted_id.map_or(true, |w| Some(w) == id) {
                    counter.value = Decimal::ZERO;
                }
            }
        }
    }
}
