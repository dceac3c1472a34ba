//! In-memory storage for the OCS charger
//!
//! Provides [`MemoryDataManager`], an implementation of the core
//! `DataManager`, `DestinationIndex` and `SubjectRater` traits backed by
//! process memory. Accounts live in individually locked cells so the engine
//! can lock exactly the accounts a debit touches.
//!
//! # Example
//!
//! ```
//! use ocs_core::models::{Account, Destination};
//! use ocs_core::traits::{DataManager, DestinationIndex};
//! use ocs_store::MemoryDataManager;
//!
//! let store = MemoryDataManager::new();
//! store.set_destination(Destination::new("NAT", &["0723"]));
//! store.set_account(Account::new("cgrates.org:rif")).unwrap();
//!
//! assert_eq!(store.destination_ids_for_prefix("0723"), vec!["NAT"]);
//! assert!(store.get_account("cgrates.org:rif").is_ok());
//! ```

pub mod keys;
pub mod memory;

pub use memory::{MemoryDataManager, StoreSnapshot, SubjectRate};
