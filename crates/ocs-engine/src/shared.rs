//! Candidate balances, with shared-group redirection
//!
//! A balance listing shared groups never pays directly: it stands for the
//! member balances of those groups, ordered by the group's strategy.

use crate::locking::{AccountSet, Candidate};
use ocs_core::models::{Balance, BalanceQuery};
use ocs_core::traits::DestinationIndex;
use rust_decimal::Decimal;
use tracing::{debug, warn};

/// Balances able to pay for `query`, in the order they are consumed
///
/// Owner balances come in weight order. Each shared one expands in place
/// into the group members' matching balances; a balance reached through
/// several routes is kept at its first position.
pub(crate) fn candidates(
    set: &AccountSet<'_>,
    index: &dyn DestinationIndex,
    query: &BalanceQuery<'_>,
) -> Vec<Candidate> {
    let Some(owner) = set.get(set.owner) else {
        return Vec::new();
    };

    let mut found: Vec<Candidate> = Vec::new();
    for r in owner.balances_for_prefix(index, query) {
        let own = Candidate {
            account_id: set.owner.to_string(),
            balance: r,
        };
        let Some(b) = owner.balance(&own.balance) else {
            continue;
        };
        if !b.is_shared() {
            push_unique(&mut found, own);
            continue;
        }

        for sg_id in &b.shared_groups {
            let Some(sg) = set.groups.get(sg_id) else {
                warn!(account = %set.owner, shared_group = %sg_id, "Shared group unavailable, using own balance");
                push_unique(&mut found, own.clone());
                continue;
            };
            let member_query = BalanceQuery {
                shared_group: Some(sg_id.as_str()),
                ..*query
            };
            let mut members: Vec<Candidate> = Vec::new();
            for member_id in &sg.member_ids {
                let Some(member) = set.get(member_id) else {
                    continue;
                };
                members.extend(
                    member
                        .balances_for_prefix(index, &member_query)
                        .into_iter()
                        .map(|balance| Candidate {
                            account_id: member_id.clone(),
                            balance,
                        }),
                );
            }
            sg.sort_by_strategy(
                set.owner,
                &mut members,
                |c| set.balance(c).map_or(Decimal::ZERO, Balance::value),
                |c| c.same_balance(&own),
            );
            debug!(
                shared_group = %sg_id,
                strategy = %sg.strategy_for(set.owner),
                members = members.len(),
                "Expanded shared balance"
            );
            for c in members {
                push_unique(&mut found, c);
            }
        }
    }
    found
}

fn push_unique(found: &mut Vec<Candidate>, c: Candidate) {
    if !found.iter().any(|f| f.same_balance(&c)) {
        found.push(c);
    }
}
