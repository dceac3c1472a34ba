//! Account set locking
//!
//! A debit touches the charged account plus every member of the shared
//! groups its balances list. The set is discovered without holding any
//! account lock, then locked in ascending ID order. If the owner's shared
//! groups changed in between, the locks are dropped and discovery restarts.

use ocs_core::models::{Account, Balance, BalanceRef, SharedGroup};
use ocs_core::traits::{AccountCell, DataManager};
use ocs_core::{ChargeError, ChargeResult};
use parking_lot::{ArcRwLockReadGuard, ArcRwLockWriteGuard, RawRwLock};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

type WriteGuard = ArcRwLockWriteGuard<RawRwLock, Account>;
type ReadGuard = ArcRwLockReadGuard<RawRwLock, Account>;

/// Balance of some account in the set, in weight order of its lookup
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Candidate {
    pub account_id: String,
    pub balance: BalanceRef,
}

impl Candidate {
    pub fn same_balance(&self, other: &Candidate) -> bool {
        self.account_id == other.account_id
            && self.balance.balance_type == other.balance.balance_type
            && self.balance.index == other.balance.index
    }
}

/// Mutable view over the accounts involved in one charging operation
pub(crate) struct AccountSet<'a> {
    pub owner: &'a str,
    pub accounts: BTreeMap<String, &'a mut Account>,
    pub groups: &'a BTreeMap<String, SharedGroup>,
}

impl AccountSet<'_> {
    pub fn get(&self, id: &str) -> Option<&Account> {
        self.accounts.get(id).map(|a| &**a)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Account> {
        self.accounts.get_mut(id).map(|a| &mut **a)
    }

    pub fn owner(&self) -> ChargeResult<&Account> {
        self.get(self.owner)
            .ok_or_else(|| ChargeError::AccountNotFound(self.owner.to_string()))
    }

    pub fn owner_mut(&mut self) -> ChargeResult<&mut Account> {
        let owner = self.owner;
        self.get_mut(owner)
            .ok_or_else(|| ChargeError::AccountNotFound(owner.to_string()))
    }

    pub fn balance(&self, c: &Candidate) -> Option<&Balance> {
        self.get(&c.account_id)?.balance(&c.balance)
    }

    pub fn balance_mut(&mut self, c: &Candidate) -> Option<&mut Balance> {
        self.get_mut(&c.account_id)?.balance_mut(&c.balance)
    }
}

/// Accounts found by discovery, not yet locked
struct Discovery {
    group_ids: BTreeSet<String>,
    groups: BTreeMap<String, SharedGroup>,
    /// Sorted by account ID
    cells: Vec<(String, AccountCell)>,
}

fn discover<D: DataManager>(dm: &D, owner_id: &str) -> ChargeResult<Discovery> {
    let owner_cell = dm.get_account(owner_id)?;
    let group_ids = owner_cell.read().shared_group_ids();

    let mut groups = BTreeMap::new();
    for id in &group_ids {
        match dm.get_shared_group(id) {
            Ok(sg) => {
                groups.insert(id.clone(), sg);
            }
            Err(ChargeError::SharedGroupNotFound(_)) => {
                warn!(account = %owner_id, shared_group = %id, "Shared group not found");
            }
            Err(e) => return Err(e),
        }
    }

    let mut ids = BTreeSet::new();
    ids.insert(owner_id.to_string());
    for sg in groups.values() {
        ids.extend(sg.member_ids.iter().cloned());
    }

    let mut cells = Vec::with_capacity(ids.len());
    for id in ids {
        if id == owner_id {
            cells.push((id, owner_cell.clone()));
            continue;
        }
        match dm.get_account(&id) {
            Ok(cell) => cells.push((id, cell)),
            Err(e) if e.is_not_found() => {
                warn!(account = %owner_id, member = %id, "Shared group member not found");
            }
            Err(e) => return Err(e),
        }
    }

    Ok(Discovery {
        group_ids,
        groups,
        cells,
    })
}

fn owner_guard<'g, G>(guards: &'g [(String, G)], owner_id: &str) -> Option<&'g G> {
    guards.iter().find(|(id, _)| id == owner_id).map(|(_, g)| g)
}

/// Exclusively locked accounts of one debit
pub(crate) struct LockedAccounts {
    owner: String,
    guards: Vec<(String, WriteGuard)>,
    groups: BTreeMap<String, SharedGroup>,
}

impl LockedAccounts {
    /// Lock the owner and every shared-group member it reaches
    pub fn acquire<D: DataManager>(dm: &D, owner_id: &str, attempts: u32) -> ChargeResult<Self> {
        for attempt in 1..=attempts.max(1) {
            let discovery = discover(dm, owner_id)?;
            let guards: Vec<(String, WriteGuard)> = discovery
                .cells
                .iter()
                .map(|(id, cell)| (id.clone(), cell.write_arc()))
                .collect();

            let stable = owner_guard(&guards, owner_id)
                .is_some_and(|g| g.shared_group_ids() == discovery.group_ids);
            if stable {
                debug!(account = %owner_id, locked = guards.len(), "Locked account set");
                return Ok(Self {
                    owner: owner_id.to_string(),
                    guards,
                    groups: discovery.groups,
                });
            }
            debug!(account = %owner_id, attempt, "Shared groups changed while locking, retrying");
        }
        Err(ChargeError::Internal(format!(
            "could not lock a stable account set for {}",
            owner_id
        )))
    }

    pub fn accounts(&mut self) -> AccountSet<'_> {
        AccountSet {
            owner: &self.owner,
            accounts: self
                .guards
                .iter_mut()
                .map(|(id, g)| (id.clone(), &mut **g))
                .collect(),
            groups: &self.groups,
        }
    }
}

/// Copies of the involved accounts, taken under read locks
pub(crate) struct AccountSnapshot {
    owner: String,
    accounts: Vec<(String, Account)>,
    groups: BTreeMap<String, SharedGroup>,
}

impl AccountSnapshot {
    pub fn acquire<D: DataManager>(dm: &D, owner_id: &str, attempts: u32) -> ChargeResult<Self> {
        for attempt in 1..=attempts.max(1) {
            let discovery = discover(dm, owner_id)?;
            let guards: Vec<(String, ReadGuard)> = discovery
                .cells
                .iter()
                .map(|(id, cell)| (id.clone(), cell.read_arc()))
                .collect();

            let stable = owner_guard(&guards, owner_id)
                .is_some_and(|g| g.shared_group_ids() == discovery.group_ids);
            if stable {
                return Ok(Self {
                    owner: owner_id.to_string(),
                    accounts: guards
                        .iter()
                        .map(|(id, g)| (id.clone(), (**g).clone()))
                        .collect(),
                    groups: discovery.groups,
                });
            }
            debug!(account = %owner_id, attempt, "Shared groups changed while reading, retrying");
        }
        Err(ChargeError::Internal(format!(
            "could not read a stable account set for {}",
            owner_id
        )))
    }

    pub fn accounts(&mut self) -> AccountSet<'_> {
        AccountSet {
            owner: &self.owner,
            accounts: self
                .accounts
                .iter_mut()
                .map(|(id, a)| (id.clone(), a))
                .collect(),
            groups: &self.groups,
        }
    }
}
