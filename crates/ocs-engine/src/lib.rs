//! Charging engine for the OCS charger
//!
//! This crate debits rated calls from accounts and answers credit queries.
//!
//! # Architecture
//!
//! - [`Charger`] owns the store and the action executor, locks the accounts
//!   a request involves and runs the debit walk on them
//! - Shared balances are redirected to the members of their shared groups,
//!   ordered by the group's strategy
//! - Triggers of every account that paid are evaluated after each debit
//!
//! # Services
//!
//! - `Charger` - debits, credit queries, max session duration
//! - `ActionRegistry` - named action lists run by triggers

pub mod actions;
pub mod charger;
pub mod credit;
mod debit;
mod locking;
mod shared;

pub use actions::ActionRegistry;
pub use charger::{Charger, DebitOptions};
pub use credit::{CreditBalance, CreditInfo};
