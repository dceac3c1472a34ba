//! Charging service
//!
//! Entry points of the engine:
//! - Debit a rated call from an account and its shared groups
//! - Estimate the credit available for a destination
//! - Estimate how long a call may last
//! - Apply administrative balance changes
//!
//! Every mutation runs with all involved accounts write-locked in ascending
//! ID order; queries work on copies taken under read locks.

use crate::credit::{self, CreditInfo};
use crate::debit::{self, DebitContext};
use crate::locking::{AccountSnapshot, LockedAccounts};
use chrono::{DateTime, Duration, Utc};
use ocs_core::config::EngineConfig;
use ocs_core::models::{Action, CallCost, CallDescriptor};
use ocs_core::traits::{ActionExecutor, DataManager};
use ocs_core::{ChargeError, ChargeResult};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Switches of one debit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebitOptions {
    /// Work on copies; stored accounts stay untouched
    pub dry_run: bool,
    /// Feed the paid amounts to the unit counters
    pub count: bool,
}

/// Debit engine bound to a store and an action executor
pub struct Charger<D: DataManager> {
    dm: Arc<D>,
    executor: Arc<dyn ActionExecutor>,
    config: EngineConfig,
}

impl<D: DataManager> Charger<D> {
    /// Create a new charger
    pub fn new(dm: Arc<D>, executor: Arc<dyn ActionExecutor>, config: EngineConfig) -> Self {
        Self {
            dm,
            executor,
            config,
        }
    }

    pub fn data_manager(&self) -> &Arc<D> {
        &self.dm
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn context(&self, now: DateTime<Utc>, count: bool, run_triggers: bool) -> DebitContext<'_> {
        DebitContext {
            config: &self.config,
            index: &*self.dm,
            rater: &*self.dm,
            executor: &*self.executor,
            now,
            count,
            run_triggers,
        }
    }

    /// Debit a rated call from `account_id`
    ///
    /// Returns the paid call, each increment naming the balance and account
    /// that paid it.
    ///
    /// # Errors
    ///
    /// - `AccountNotFound` when the account does not exist
    /// - `AccountDisabled` when the account refuses charging
    /// - `InsufficientCredit` when part of the call stays unpaid; it carries
    ///   the paid prefix, and what was debited stays debited
    #[instrument(skip(self, cc), fields(destination = %cc.destination, tor = %cc.tor))]
    pub fn debit(
        &self,
        account_id: &str,
        cc: &CallCost,
        options: DebitOptions,
    ) -> ChargeResult<CallCost> {
        self.debit_at(account_id, cc, options, Utc::now())
    }

    /// [`Charger::debit`] evaluated at `now`
    pub fn debit_at(
        &self,
        account_id: &str,
        cc: &CallCost,
        options: DebitOptions,
        now: DateTime<Utc>,
    ) -> ChargeResult<CallCost> {
        let ctx = self.context(now, options.count, !options.dry_run);
        let result = if options.dry_run {
            let mut snapshot =
                AccountSnapshot::acquire(&*self.dm, account_id, self.config.max_lock_attempts)?;
            let mut set = snapshot.accounts();
            debit::debit_call_cost(&ctx, &mut set, cc)
        } else {
            let mut locked =
                LockedAccounts::acquire(&*self.dm, account_id, self.config.max_lock_attempts)?;
            let mut set = locked.accounts();
            debit::debit_call_cost(&ctx, &mut set, cc)
        };

        match &result {
            Ok(paid) => info!(
                account = %account_id,
                cost = %paid.cost,
                timespans = paid.timespans.len(),
                dry_run = options.dry_run,
                "Debited call"
            ),
            Err(ChargeError::InsufficientCredit { missing, partial, .. }) => info!(
                account = %account_id,
                cost = %partial.cost,
                %missing,
                dry_run = options.dry_run,
                "Debited call partially"
            ),
            Err(e) => warn!(account = %account_id, error = %e, "Debit failed"),
        }
        result
    }

    /// Credit available to `cd`'s account for its destination and type
    #[instrument(skip(self, cd), fields(account = %cd.account_key(), destination = %cd.destination))]
    pub fn get_credit_for_prefix(&self, cd: &CallDescriptor) -> ChargeResult<CreditInfo> {
        let ctx = self.context(Utc::now(), false, false);
        let mut snapshot =
            AccountSnapshot::acquire(&*self.dm, &cd.account_key(), self.config.max_lock_attempts)?;
        let set = snapshot.accounts();
        credit::credit_for_prefix(&ctx, &set, cd)
    }

    /// How much of `cc` the account could pay right now
    ///
    /// Accounts allowed to go negative get the whole call. An unpayable
    /// connect fee gives zero.
    #[instrument(skip(self, cc), fields(destination = %cc.destination))]
    pub fn max_session_duration(&self, account_id: &str, cc: &CallCost) -> ChargeResult<Duration> {
        let requested = cc.duration();
        let now = Utc::now();
        let mut snapshot =
            AccountSnapshot::acquire(&*self.dm, account_id, self.config.max_lock_attempts)?;
        let mut set = snapshot.accounts();
        if set.owner()?.allow_negative {
            return Ok(requested);
        }

        let ctx = self.context(now, false, false);
        let paid = match debit::debit_call_cost(&ctx, &mut set, cc) {
            Ok(paid) => paid,
            Err(ChargeError::InsufficientCredit { partial, .. }) => {
                let fee_unpaid = cc.deduct_connect_fee
                    && cc.connect_fee() > Decimal::ZERO
                    && partial.connect_fee_info.is_none();
                if fee_unpaid {
                    debug!(account = %account_id, "Connect fee not covered");
                    return Ok(Duration::zero());
                }
                *partial
            }
            Err(e) => return Err(e),
        };
        Ok(paid.paid_duration().min(requested))
    }

    /// Apply an administrative debit (or, negated, a top-up) to an account
    ///
    /// See [`ocs_core::models::Account::debit_balance_action`].
    #[instrument(skip(self, action))]
    pub fn debit_balance(
        &self,
        account_id: &str,
        action: Option<&Action>,
        reset: bool,
        reset_if_negative: bool,
    ) -> ChargeResult<()> {
        let cell = self.dm.get_account(account_id)?;
        let mut account = cell.write();
        account.debit_balance_action(
            action,
            reset,
            reset_if_negative,
            &*self.executor,
            Utc::now(),
        )?;
        info!(account = %account_id, "Applied balance action");
        Ok(())
    }
}
