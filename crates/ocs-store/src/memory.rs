//! In-memory data manager
//!
//! Accounts are kept as individually locked cells: the map lock is only held
//! long enough to clone a cell handle, never while an account is in use.

use crate::keys;
use ocs_core::constants::META_ANY;
use ocs_core::error::ChargeError;
use ocs_core::models::{split_prefix, Account, Destination, RateInterval, SharedGroup};
use ocs_core::traits::{AccountCell, DataManager, DestinationIndex, SubjectRater};
use ocs_core::ChargeResult;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Rate of a named rating subject, optionally bound to a destination prefix
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SubjectRate {
    pub tenant: String,
    pub category: String,
    pub subject: String,
    /// Empty applies to every destination
    pub destination_prefix: String,
    pub rate_interval: RateInterval,
}

/// Serializable content of a store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct StoreSnapshot {
    pub accounts: Vec<Account>,
    pub shared_groups: Vec<SharedGroup>,
    pub destinations: Vec<Destination>,
    pub subject_rates: Vec<SubjectRate>,
}

/// `DataManager` keeping everything in process memory
#[derive(Default)]
pub struct MemoryDataManager {
    accounts: RwLock<HashMap<String, AccountCell>>,
    shared_groups: RwLock<HashMap<String, SharedGroup>>,
    destinations: RwLock<HashMap<String, Destination>>,
    reverse_destinations: RwLock<HashMap<String, Vec<String>>>,
    subject_rates: RwLock<HashMap<String, Vec<SubjectRate>>>,
}

impl MemoryDataManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store holding everything in `snapshot`
    pub fn from_snapshot(snapshot: StoreSnapshot) -> ChargeResult<Self> {
        let store = Self::new();
        for destination in snapshot.destinations {
            store.set_destination(destination);
        }
        for sg in snapshot.shared_groups {
            store.set_shared_group(sg);
        }
        for rate in snapshot.subject_rates {
            store.set_subject_rate(rate);
        }
        let count = snapshot.accounts.len();
        for account in snapshot.accounts {
            store.set_account(account)?;
        }
        info!(accounts = count, "Loaded store snapshot");
        Ok(store)
    }

    /// Copy of every stored account, sorted by ID
    pub fn accounts(&self) -> Vec<Account> {
        let cells: Vec<AccountCell> = self.accounts.read().values().cloned().collect();
        let mut accounts: Vec<Account> = cells.iter().map(|c| c.read().clone()).collect();
        accounts.sort_by(|a, b| a.id.cmp(&b.id));
        accounts
    }

    /// Store a destination and index its prefixes
    pub fn set_destination(&self, destination: Destination) {
        let key = keys::destination_key(&destination.id);
        let mut reverse = self.reverse_destinations.write();
        let mut destinations = self.destinations.write();
        if let Some(previous) = destinations.get(&key) {
            for prefix in &previous.prefixes {
                if let Some(ids) = reverse.get_mut(&keys::reverse_destination_key(prefix)) {
                    ids.retain(|id| *id != previous.id);
                }
            }
        }
        for prefix in &destination.prefixes {
            let ids = reverse
                .entry(keys::reverse_destination_key(prefix))
                .or_default();
            if !ids.contains(&destination.id) {
                ids.push(destination.id.clone());
                ids.sort();
            }
        }
        debug!(destination = %destination.id, prefixes = destination.prefixes.len(), "Stored destination");
        destinations.insert(key, destination);
    }

    pub fn set_shared_group(&self, sg: SharedGroup) {
        self.shared_groups
            .write()
            .insert(keys::shared_group_key(&sg.id), sg);
    }

    pub fn set_subject_rate(&self, rate: SubjectRate) {
        let key = keys::rating_subject_key(&rate.tenant, &rate.category, &rate.subject);
        self.subject_rates.write().entry(key).or_default().push(rate);
    }
}

impl DestinationIndex for MemoryDataManager {
    fn destination_ids_for_prefix(&self, prefix: &str) -> Vec<String> {
        self.reverse_destinations
            .read()
            .get(&keys::reverse_destination_key(prefix))
            .cloned()
            .unwrap_or_default()
    }
}

impl SubjectRater for MemoryDataManager {
    fn rate_for_subject(
        &self,
        tenant: &str,
        category: &str,
        subject: &str,
        destination: &str,
    ) -> Option<RateInterval> {
        let rates = self.subject_rates.read();
        let candidates = [
            (tenant, category),
            (tenant, META_ANY),
            (META_ANY, category),
            (META_ANY, META_ANY),
        ];
        for (t, c) in candidates {
            let Some(entries) = rates.get(&keys::rating_subject_key(t, c, subject)) else {
                continue;
            };
            for prefix in split_prefix(destination, 1) {
                if let Some(rate) = entries.iter().find(|r| r.destination_prefix == prefix) {
                    return Some(rate.rate_interval.clone());
                }
            }
            if let Some(rate) = entries.iter().find(|r| r.destination_prefix.is_empty()) {
                return Some(rate.rate_interval.clone());
            }
        }
        None
    }
}

impl DataManager for MemoryDataManager {
    fn get_account(&self, id: &str) -> ChargeResult<AccountCell> {
        self.accounts
            .read()
            .get(&keys::account_key(id))
            .cloned()
            .ok_or_else(|| ChargeError::AccountNotFound(id.to_string()))
    }

    fn set_account(&self, account: Account) -> ChargeResult<()> {
        let key = keys::account_key(&account.id);
        let cell = match self.accounts.write().entry(key) {
            Entry::Occupied(slot) => Arc::clone(slot.get()),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(RwLock::new(account)));
                return Ok(());
            }
        };
        *cell.write() = account;
        Ok(())
    }

    fn get_shared_group(&self, id: &str) -> ChargeResult<SharedGroup> {
        self.shared_groups
            .read()
            .get(&keys::shared_group_key(id))
            .cloned()
            .ok_or_else(|| ChargeError::SharedGroupNotFound(id.to_string()))
    }

    fn get_destination(&self, id: &str) -> ChargeResult<Destination> {
        self.destinations
            .read()
            .get(&keys::destination_key(id))
            .cloned()
            .ok_or_else(|| ChargeError::DestinationNotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocs_core::models::{Balance, BalanceType, SharingStrategy};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::time::Duration as StdDuration;

    fn store() -> MemoryDataManager {
        let store = MemoryDataManager::new();
        store.set_destination(Destination::new("NAT", &["0257", "0256", "0723"]));
        store.set_destination(Destination::new("RET", &["0723", "0724"]));
        store
    }

    #[test]
    fn test_reverse_index() {
        let store = store();
        assert_eq!(store.destination_ids_for_prefix("0723"), vec!["NAT", "RET"]);
        assert_eq!(store.destination_ids_for_prefix("0257"), vec!["NAT"]);
        assert!(store.destination_ids_for_prefix("999").is_empty());

        store.set_destination(Destination::new("NAT", &["0257"]));
        assert_eq!(store.destination_ids_for_prefix("0723"), vec!["RET"]);
        assert_eq!(store.get_destination("NAT").unwrap().prefixes, vec!["0257"]);
    }

    #[test]
    fn test_missing_entities() {
        let store = store();
        assert!(store.get_account("nobody").unwrap_err().is_not_found());
        assert_eq!(
            store.get_shared_group("SG").unwrap_err().error_code(),
            "shared_group_not_found"
        );
        assert!(store.get_destination("EXOTIC").is_err());
    }

    #[test]
    fn test_set_account_keeps_cell() {
        let store = store();
        store.set_account(Account::new("cgrates.org:rif")).unwrap();
        let cell = store.get_account("cgrates.org:rif").unwrap();

        let mut updated = Account::new("cgrates.org:rif");
        updated.add_balance(
            BalanceType::Monetary,
            Balance {
                value: dec!(10),
                ..Default::default()
            },
        );
        store.set_account(updated).unwrap();
        assert_eq!(cell.read().balances(BalanceType::Monetary)[0].value(), dec!(10));
        assert!(Arc::ptr_eq(
            &cell,
            &store.get_account("cgrates.org:rif").unwrap()
        ));
    }

    #[test]
    fn test_concurrent_first_inserts_share_one_cell() {
        let store = Arc::new(store());
        let barrier = Arc::new(std::sync::Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    store.set_account(Account::new("cgrates.org:new")).unwrap();
                    store.get_account("cgrates.org:new").unwrap()
                })
            })
            .collect();
        let cells: Vec<AccountCell> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let current = store.get_account("cgrates.org:new").unwrap();
        assert!(cells.iter().all(|cell| Arc::ptr_eq(cell, &current)));
    }

    #[test]
    fn test_subject_rate_lookup() {
        let store = store();
        let generic = RateInterval::flat(
            Decimal::ZERO,
            dec!(1),
            chrono::Duration::seconds(1),
            chrono::Duration::seconds(1),
        );
        let national = RateInterval::flat(
            Decimal::ZERO,
            dec!(0.5),
            chrono::Duration::seconds(1),
            chrono::Duration::seconds(1),
        );
        store.set_subject_rate(SubjectRate {
            tenant: META_ANY.to_string(),
            category: META_ANY.to_string(),
            subject: "minu".to_string(),
            rate_interval: generic.clone(),
            ..Default::default()
        });
        store.set_subject_rate(SubjectRate {
            tenant: "cgrates.org".to_string(),
            category: "call".to_string(),
            subject: "minu".to_string(),
            destination_prefix: "0723".to_string(),
            rate_interval: national.clone(),
        });

        assert_eq!(
            store.rate_for_subject("cgrates.org", "call", "minu", "0723045"),
            Some(national)
        );
        assert_eq!(
            store.rate_for_subject("cgrates.org", "sms", "minu", "0723045"),
            Some(generic)
        );
        assert_eq!(store.rate_for_subject("cgrates.org", "call", "other", "0723"), None);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let json = r#"{
            "Accounts": [{"ID": "cgrates.org:rif", "AllowNegative": true}],
            "SharedGroups": [{"Id": "SG", "MemberIds": ["cgrates.org:rif"],
                "AccountParameters": {"*any": {"Strategy": "*highest"}}}],
            "Destinations": [{"Id": "NAT", "Prefixes": ["0723"]}]
        }"#;
        let snapshot: StoreSnapshot = serde_json::from_str(json).unwrap();
        let store = MemoryDataManager::from_snapshot(snapshot).unwrap();
        assert!(store.get_account("cgrates.org:rif").unwrap().read().allow_negative);
        assert_eq!(
            store.get_shared_group("SG").unwrap().strategy_for("x"),
            SharingStrategy::Highest
        );
        assert_eq!(store.destination_ids_for_prefix("0723"), vec!["NAT"]);
        assert_eq!(store.accounts().len(), 1);
    }

    #[test]
    fn test_concurrent_access() {
        let store = Arc::new(store());
        store.set_account(Account::new("a")).unwrap();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let cell = store.get_account("a").unwrap();
                        cell.write().add_balance(BalanceType::Sms, Balance::default());
                        std::thread::sleep(StdDuration::from_micros(1));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(
            store.get_account("a").unwrap().read().balances(BalanceType::Sms).len(),
            800
        );
    }
}
