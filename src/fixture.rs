//! Replay fixtures
//!
//! A fixture is a store snapshot plus the action lists triggers refer to,
//! the debits to replay and the credit queries to answer afterwards.

use anyhow::{Context, Result};
use ocs_core::models::{Action, CallCost, CallDescriptor};
use ocs_store::StoreSnapshot;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Fixture {
    #[serde(flatten)]
    pub store: StoreSnapshot,
    pub actions: BTreeMap<String, Vec<Action>>,
    pub debits: Vec<DebitRequest>,
    pub credit_queries: Vec<CallDescriptor>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DebitRequest {
    #[serde(rename = "AccountID")]
    pub account_id: String,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub count: bool,
    pub call_cost: CallCost,
}

/// Outcome of one replayed debit
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DebitOutcome {
    #[serde(rename = "AccountID")]
    pub account_id: String,
    /// Usage the account could pay before the debit ran, in nanoseconds
    pub max_session_duration: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_cost: Option<CallCost>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<&'static str>,
}

impl Fixture {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading fixture {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing fixture {}", path.display()))
    }
}
