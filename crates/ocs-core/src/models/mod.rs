//! Domain models for the charging engine
//!
//! Balances, accounts, call costs and everything the debit engine reads or
//! mutates.

pub mod account;
pub mod action;
pub mod action_trigger;
pub mod balance;
pub mod balance_filter;
pub mod balance_type;
pub mod call_cost;
pub mod destination;
pub mod duration;
pub mod rating;
pub mod shared_group;
pub mod unit_counter;

pub use account::{Account, AccountSummary, BalanceQuery, BalanceRef, BalanceSummary};
pub use action::{Action, ActionType};
pub use action_trigger::{ActionTrigger, ThresholdType};
pub use balance::{sort_by_weight, Balance, ValueFactor};
pub use balance_filter::{BalanceFilter, FormulaIncrement, FormulaInterval, ValueFormula};
pub use balance_type::BalanceType;
pub use call_cost::{
    BalanceInfo, CallCost, CallDescriptor, Increment, MonetaryInfo, TimeSpan, UnitInfo,
};
pub use destination::{
    destination_ids_for_number, evaluate_mask, match_destination, split_prefix, Destination,
    DestinationMatch, MaskDecision,
};
pub use rating::{classify_subject, RateGroup, RateInterval, RoundingMethod, SubjectRating};
pub use shared_group::{SharedGroup, SharingParameters, SharingStrategy};
pub use unit_counter::{CounterFilter, CounterType, UnitCounter, UnitCounters, UsageContext};
