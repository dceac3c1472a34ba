//! Action lists run by triggers
//!
//! [`ActionRegistry`] keeps the named action lists accounts refer to and
//! applies them to the account a trigger fired on. It is the executor the
//! binary wires into the charger; deployments with a remote action service
//! implement [`ActionExecutor`] themselves.

use chrono::Utc;
use ocs_core::models::{sort_by_weight, Account, Action, ActionTrigger, ActionType};
use ocs_core::traits::ActionExecutor;
use ocs_core::{ChargeError, ChargeResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// In-process store of named action lists
#[derive(Default)]
pub struct ActionRegistry {
    lists: RwLock<HashMap<String, Vec<Action>>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `actions` under `id`, replacing any previous list
    pub fn set_actions(&self, id: impl Into<String>, mut actions: Vec<Action>) {
        sort_by_weight(&mut actions, |a| a.weight);
        self.lists.write().insert(id.into(), actions);
    }

    pub fn get_actions(&self, id: &str) -> Option<Vec<Action>> {
        self.lists.read().get(id).cloned()
    }

    /// Apply every action of list `id` to `account`
    pub fn apply(&self, account: &mut Account, id: &str) -> ChargeResult<()> {
        let actions = self
            .get_actions(id)
            .ok_or_else(|| ChargeError::NotFound(format!("action list {}", id)))?;
        for action in &actions {
            self.apply_one(account, action)?;
        }
        Ok(())
    }

    fn apply_one(&self, account: &mut Account, action: &Action) -> ChargeResult<()> {
        let now = Utc::now();
        let filter = action.balance.as_ref();
        debug!(account = %account.id, action = %action.action_type, "Applying action");
        match action.action_type {
            ActionType::TopUp | ActionType::TopUpReset => {
                if action.balance.is_none() {
                    return Err(ChargeError::InvalidAction(format!(
                        "{} without balance",
                        action.action_type
                    )));
                }
                let reset = action.action_type == ActionType::TopUpReset;
                account.debit_balance_action(Some(&action.negated()), reset, false, self, now)?;
            }
            ActionType::Debit | ActionType::DebitReset => {
                if action.balance.is_none() {
                    return Err(ChargeError::InvalidAction(format!(
                        "{} without balance",
                        action.action_type
                    )));
                }
                let reset = action.action_type == ActionType::DebitReset;
                account.debit_balance_action(Some(action), reset, false, self, now)?;
            }
            ActionType::ResetTriggers => account.reset_action_triggers(filter, self, now),
            ActionType::SetRecurrent => account.set_recurrent(filter, true),
            ActionType::UnsetRecurrent => account.set_recurrent(filter, false),
            ActionType::ResetCounters => account.reset_counters(filter),
            ActionType::AllowNegative => account.allow_negative = true,
            ActionType::DenyNegative => account.allow_negative = false,
            ActionType::DisableAccount => account.disabled = true,
            ActionType::EnableAccount => account.disabled = false,
            ActionType::Log => {
                info!(
                    account = %account.id,
                    action = %action.id,
                    extra = %action.extra_parameters,
                    "Account log action"
                );
            }
        }
        Ok(())
    }
}

impl ActionExecutor for ActionRegistry {
    fn execute_actions(
        &self,
        account: &mut Account,
        trigger: &ActionTrigger,
        extra: Option<&serde_json::Value>,
    ) -> ChargeResult<()> {
        if let Some(extra) = extra {
            debug!(trigger = %trigger.id, %extra, "Trigger extra data");
        }
        if trigger.actions_id.is_empty() {
            warn!(account = %account.id, trigger = %trigger.id, "Trigger names no action list");
            return Ok(());
        }
        self.apply(account, &trigger.actions_id)
    }
}
