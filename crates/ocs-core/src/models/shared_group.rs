//! Shared groups
//!
//! A shared group pools balances of several accounts. A balance listing the
//! group redirects its debit to the member balances that also list it, in the
//! order chosen by the group's sharing strategy.

use crate::constants::META_ANY;
use rand::seq::SliceRandom;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Order in which member balances are consumed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SharingStrategy {
    #[serde(rename = "*lowest")]
    Lowest,
    #[serde(rename = "*highest")]
    Highest,
    #[serde(rename = "*random")]
    Random,
    #[serde(rename = "*mine_lowest")]
    MineLowest,
    #[serde(rename = "*mine_highest")]
    MineHighest,
    /// The originating account's balance first, then the others shuffled
    #[default]
    #[serde(rename = "*mine_random")]
    MineRandom,
}

impl SharingStrategy {
    /// Whether the originating balance is always consumed first
    pub fn prefers_mine(&self) -> bool {
        matches!(
            self,
            SharingStrategy::MineLowest | SharingStrategy::MineHighest | SharingStrategy::MineRandom
        )
    }
}

impl fmt::Display for SharingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SharingStrategy::Lowest => "*lowest",
            SharingStrategy::Highest => "*highest",
            SharingStrategy::Random => "*random",
            SharingStrategy::MineLowest => "*mine_lowest",
            SharingStrategy::MineHighest => "*mine_highest",
            SharingStrategy::MineRandom => "*mine_random",
        };
        f.write_str(s)
    }
}

/// Sharing settings for one account (or `*any`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SharingParameters {
    pub strategy: SharingStrategy,
    pub rating_subject: String,
}

/// Named pool of member accounts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SharedGroup {
    #[serde(rename = "Id")]
    pub id: String,
    /// Account ID (or `*any`) to sharing parameters
    pub account_parameters: BTreeMap<String, SharingParameters>,
    #[serde(rename = "MemberIds")]
    pub member_ids: BTreeSet<String>,
}

impl SharedGroup {
    pub fn new(id: impl Into<String>, members: &[&str], strategy: SharingStrategy) -> Self {
        let mut account_parameters = BTreeMap::new();
        account_parameters.insert(
            META_ANY.to_string(),
            SharingParameters {
                strategy,
                ..Default::default()
            },
        );
        Self {
            id: id.into(),
            account_parameters,
            member_ids: members.iter().map(|m| m.to_string()).collect(),
        }
    }

    /// Parameters for `account_id`, falling back to `*any`
    pub fn parameters_for(&self, account_id: &str) -> Option<&SharingParameters> {
        self.account_parameters
            .get(account_id)
            .or_else(|| self.account_parameters.get(META_ANY))
    }

    pub fn strategy_for(&self, account_id: &str) -> SharingStrategy {
        self.parameters_for(account_id)
            .map(|p| p.strategy)
            .unwrap_or_default()
    }

    /// Order member balances for a debit originating at `account_id`
    ///
    /// `value` reads a balance's value and `is_mine` recognizes the
    /// originating balance, which `*mine_*` strategies move to the front.
    pub fn sort_by_strategy<T>(
        &self,
        account_id: &str,
        balances: &mut Vec<T>,
        value: impl Fn(&T) -> Decimal,
        is_mine: impl Fn(&T) -> bool,
    ) {
        let strategy = self.strategy_for(account_id);
        match strategy {
            SharingStrategy::Lowest | SharingStrategy::MineLowest => {
                balances.sort_by_key(|b| value(b));
            }
            SharingStrategy::Highest | SharingStrategy::MineHighest => {
                balances.sort_by_key(|b| std::cmp::Reverse(value(b)));
            }
            SharingStrategy::Random | SharingStrategy::MineRandom => {
                balances.shuffle(&mut rand::thread_rng());
            }
        }
        if strategy.prefers_mine() {
            if let Some(pos) = balances.iter().position(|b| is_mine(b)) {
                let mine = balances.remove(pos);
                balances.insert(0, mine);
            }
        }
    }
}
