//! Administrative actions run by triggers

use crate::models::{BalanceFilter, ValueFormula};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of account change an action performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ActionType {
    #[default]
    #[serde(rename = "*topup")]
    TopUp,
    #[serde(rename = "*topup_reset")]
    TopUpReset,
    #[serde(rename = "*debit")]
    Debit,
    #[serde(rename = "*debit_reset")]
    DebitReset,
    #[serde(rename = "*reset_triggers")]
    ResetTriggers,
    #[serde(rename = "*set_recurrent")]
    SetRecurrent,
    #[serde(rename = "*unset_recurrent")]
    UnsetRecurrent,
    #[serde(rename = "*reset_counters")]
    ResetCounters,
    #[serde(rename = "*allow_negative")]
    AllowNegative,
    #[serde(rename = "*deny_negative")]
    DenyNegative,
    #[serde(rename = "*disable_account")]
    DisableAccount,
    #[serde(rename = "*enable_account")]
    EnableAccount,
    #[serde(rename = "*log")]
    Log,
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActionType::TopUp => "*topup",
            ActionType::TopUpReset => "*topup_reset",
            ActionType::Debit => "*debit",
            ActionType::DebitReset => "*debit_reset",
            ActionType::ResetTriggers => "*reset_triggers",
            ActionType::SetRecurrent => "*set_recurrent",
            ActionType::UnsetRecurrent => "*unset_recurrent",
            ActionType::ResetCounters => "*reset_counters",
            ActionType::AllowNegative => "*allow_negative",
            ActionType::DenyNegative => "*deny_negative",
            ActionType::DisableAccount => "*disable_account",
            ActionType::EnableAccount => "*enable_account",
            ActionType::Log => "*log",
        };
        f.write_str(s)
    }
}

/// One step of an action list
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Action {
    #[serde(rename = "Id")]
    pub id: String,
    pub action_type: ActionType,
    /// Free-form parameters, logged by `*log`
    #[serde(skip_serializing_if = "String::is_empty")]
    pub extra_parameters: String,
    pub weight: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<BalanceFilter>,
}

impl Action {
    pub fn new(action_type: ActionType, balance: Option<BalanceFilter>) -> Self {
        Self {
            action_type,
            balance,
            ..Default::default()
        }
    }

    /// Copy of the action whose balance value has the opposite sign
    ///
    /// A top-up is a debit of the negated amount.
    pub fn negated(&self) -> Self {
        let mut action = self.clone();
        if let Some(filter) = action.balance.as_mut() {
            filter.value = Some(
                filter
                    .value
                    .as_ref()
                    .map_or_else(ValueFormula::default, ValueFormula::negated),
            );
        }
        action
    }
}
