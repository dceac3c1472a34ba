//! Collaborator traits
//!
//! Defines the storage, destination lookup, subject rating and action
//! execution contracts the charging engine is written against.

use crate::models::{Account, ActionTrigger, Destination, RateInterval, SharedGroup};
use crate::ChargeResult;
use parking_lot::RwLock;
use std::sync::Arc;

/// Shared, individually locked account
pub type AccountCell = Arc<RwLock<Account>>;

/// Reverse index from dialed-number prefixes to destination IDs
pub trait DestinationIndex: Send + Sync {
    /// IDs of every destination listing exactly `prefix`
    fn destination_ids_for_prefix(&self, prefix: &str) -> Vec<String>;
}

/// Rate lookup for balances carrying a named rating subject
pub trait SubjectRater: Send + Sync {
    /// Rate applied when `subject` pays for usage towards `destination`
    ///
    /// `None` when the subject has no rate for this usage.
    fn rate_for_subject(
        &self,
        tenant: &str,
        category: &str,
        subject: &str,
        destination: &str,
    ) -> Option<RateInterval>;
}

/// Key-value storage of accounts, shared groups and destinations
pub trait DataManager: DestinationIndex + SubjectRater {
    /// Fetch the lock cell of an account
    fn get_account(&self, id: &str) -> ChargeResult<AccountCell>;

    /// Store an account, replacing any previous version
    fn set_account(&self, account: Account) -> ChargeResult<()>;

    fn get_shared_group(&self, id: &str) -> ChargeResult<SharedGroup>;

    fn get_destination(&self, id: &str) -> ChargeResult<Destination>;
}

/// Runs the action list a trigger names
///
/// Called synchronously while the account is locked. Failures are logged by
/// the caller and never abort charging.
pub trait ActionExecutor: Send + Sync {
    fn execute_actions(
        &self,
        account: &mut Account,
        trigger: &ActionTrigger,
        extra: Option<&serde_json::Value>,
    ) -> ChargeResult<()>;
}

/// Executor that runs nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopExecutor;

impl ActionExecutor for NoopExecutor {
    fn execute_actions(
        &self,
        _account: &mut Account,
        _trigger: &ActionTrigger,
        _extra: Option<&serde_json::Value>,
    ) -> ChargeResult<()> {
        Ok(())
    }
}
