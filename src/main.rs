//! OCS Charger
//!
//! Loads a fixture into the in-memory store, replays the debits it lists
//! through the charging engine and prints the paid call costs, the answers to
//! its credit queries and the final account summaries as JSON.

mod fixture;

use anyhow::{Context, Result};
use fixture::{DebitOutcome, Fixture};
use ocs_core::config::LoggingConfig;
use ocs_core::models::AccountSummary;
use ocs_core::AppConfig;
use ocs_engine::{ActionRegistry, Charger, CreditInfo, DebitOptions};
use ocs_store::MemoryDataManager;
use serde::Serialize;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FIXTURE: &str = "fixtures/demo.json";

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct Report {
    debits: Vec<DebitOutcome>,
    credits: Vec<CreditInfo>,
    accounts: Vec<AccountSummary>,
}

/// Initialize tracing/logging
///
/// Logs go to stderr; stdout carries the report.
fn init_tracing(logging: &LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "ocs_charger={level},ocs_engine={level},ocs_core={level},ocs_store={level}",
            level = logging.level
        ))
    });

    let registry = tracing_subscriber::registry().with(env_filter);
    if logging.format == "json" {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_line_number(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("loading configuration")?;
    init_tracing(&config.logging);

    info!("Starting OCS Charger v{}", env!("CARGO_PKG_VERSION"));

    let path = env::args()
        .nth(1)
        .or_else(|| env::var("OCS_FIXTURE").ok())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_FIXTURE));
    let fixture = Fixture::load(&path)?;
    info!(
        fixture = %path.display(),
        debits = fixture.debits.len(),
        action_lists = fixture.actions.len(),
        "Fixture loaded"
    );

    let registry = Arc::new(ActionRegistry::new());
    for (id, actions) in fixture.actions {
        registry.set_actions(id, actions);
    }
    let dm = Arc::new(MemoryDataManager::from_snapshot(fixture.store)?);
    let charger = Charger::new(dm.clone(), registry, config.engine.clone());

    let mut debits = Vec::with_capacity(fixture.debits.len());
    for request in fixture.debits {
        let max = charger
            .max_session_duration(&request.account_id, &request.call_cost)
            .with_context(|| format!("max session duration for {}", request.account_id))?;
        let options = DebitOptions {
            dry_run: request.dry_run,
            count: request.count,
        };
        let outcome = match charger.debit(&request.account_id, &request.call_cost, options) {
            Ok(paid) => DebitOutcome {
                account_id: request.account_id,
                max_session_duration: max.num_nanoseconds().unwrap_or(i64::MAX),
                call_cost: Some(paid),
                error: None,
                error_code: None,
            },
            Err(e) => {
                warn!(account = %request.account_id, error = %e, "Debit not completed");
                DebitOutcome {
                    account_id: request.account_id,
                    max_session_duration: max.num_nanoseconds().unwrap_or(i64::MAX),
                    call_cost: e.partial_call_cost().cloned(),
                    error_code: Some(e.error_code()),
                    error: Some(e.to_string()),
                }
            }
        };
        debits.push(outcome);
    }

    let mut credits = Vec::with_capacity(fixture.credit_queries.len());
    for cd in &fixture.credit_queries {
        let credit = charger
            .get_credit_for_prefix(cd)
            .with_context(|| format!("credit query for {}", cd.account_key()))?;
        credits.push(credit);
    }

    let report = Report {
        debits,
        credits,
        accounts: dm
            .accounts()
            .iter()
            .map(|a| a.as_account_summary())
            .collect(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    info!("Replay finished");
    Ok(())
}
