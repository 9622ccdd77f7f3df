//! Builds the audit row for every match attempt.

use crate::error::ReconcileError;
use crate::matching::policy::Decision;
use crate::models::{BankTransaction, MatchResult, NewAutoMatchLog, ScoreFactors};
use uuid::Uuid;

/// Audit row describing a policy decision as-is.
///
/// `skipped` and `multiple_candidates` rows reference the best candidate so a
/// reviewer can see what nearly matched.
pub fn for_decision(
    run_id: Uuid,
    transaction: &BankTransaction,
    decision: &Decision,
) -> NewAutoMatchLog {
    let (charge_id, factors) = match &decision.top {
        Some(top) => (Some(top.charge.charge_id), top.factors),
        None => (None, ScoreFactors::default()),
    };

    let note = match (decision.outcome, &decision.top) {
        (MatchResult::NoMatch, _) => Some("no open charge in the due-date window".to_string()),
        (MatchResult::Skipped, Some(top)) => Some(format!(
            "best score {} below auto-match threshold",
            top.total
        )),
        (MatchResult::MultipleCandidates, Some(top)) => Some(format!(
            "best score {} within tie margin of runner-up {}",
            top.total,
            decision.runner_up_total.unwrap_or_default()
        )),
        (MatchResult::Matched, Some(top)) => Some(format!("auto-matched with score {}", top.total)),
        _ => None,
    };

    NewAutoMatchLog {
        run_id,
        transaction_id: transaction.transaction_id,
        charge_id,
        scope: transaction.scope(),
        result: decision.outcome,
        factors,
        note,
    }
}

/// Audit row for a chosen match whose apply was refused or failed.
///
/// Nothing was mutated, so the attempt is recorded as `skipped` with the
/// chosen charge and its factors preserved.
pub fn for_failed_apply(
    run_id: Uuid,
    transaction: &BankTransaction,
    charge_id: Uuid,
    factors: ScoreFactors,
    error: &ReconcileError,
) -> NewAutoMatchLog {
    let note = if error.is_refusal() {
        format!("apply refused ({}): {}", error.reason(), error)
    } else {
        format!("apply failed ({}), will retry next run", error.reason())
    };

    NewAutoMatchLog {
        run_id,
        transaction_id: transaction.transaction_id,
        charge_id: Some(charge_id),
        scope: transaction.scope(),
        result: MatchResult::Skipped,
        factors,
        note: Some(note),
    }
}

/// Audit row for an operator-chosen match.
pub fn for_manual_match(
    run_id: Uuid,
    transaction: &BankTransaction,
    charge_id: Uuid,
    factors: ScoreFactors,
    note: Option<&str>,
) -> NewAutoMatchLog {
    let note = match note {
        Some(text) if !text.trim().is_empty() => format!("manual match: {}", text.trim()),
        _ => "manual match".to_string(),
    };

    NewAutoMatchLog {
        run_id,
        transaction_id: transaction.transaction_id,
        charge_id: Some(charge_id),
        scope: transaction.scope(),
        result: MatchResult::Matched,
        factors,
        note: Some(note),
    }
}
