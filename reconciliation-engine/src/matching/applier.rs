//! Match applier: checks preconditions and commits a payment against one charge.

use crate::config::MatchingPolicy;
use crate::error::ReconcileError;
use crate::models::{
    BankTransaction, Charge, MatchApplication, MatchState, NewAutoMatchLog, PaymentMatch,
};
use crate::services::ReconciliationStore;
use tracing::{info, instrument};

/// Validate a payment against a snapshot of the transaction and charge.
///
/// The store repeats the state and balance checks atomically when committing.
pub fn prepare(
    policy: &MatchingPolicy,
    transaction: &BankTransaction,
    charge: &Charge,
    confidence_score: i32,
    is_automatic: bool,
    note: Option<String>,
) -> Result<MatchApplication, ReconcileError> {
    match transaction.match_state {
        MatchState::Unmatched => {}
        MatchState::Matched => {
            return Err(ReconcileError::DuplicateMatch(transaction.transaction_id));
        }
        MatchState::Ignored => {
            return Err(ReconcileError::NotReconcilable(transaction.transaction_id));
        }
    }
    if !transaction.is_reconcilable() {
        return Err(ReconcileError::NotReconcilable(transaction.transaction_id));
    }
    if !charge.status.accepts_payment() {
        return Err(ReconcileError::ChargeClosed(charge.charge_id));
    }

    let outstanding = charge.outstanding();
    if outstanding < transaction.amount - policy.amount_tolerance {
        return Err(ReconcileError::Overpayment {
            charge_id: charge.charge_id,
            amount: transaction.amount,
            outstanding,
        });
    }

    Ok(MatchApplication {
        transaction_id: transaction.transaction_id,
        charge_id: charge.charge_id,
        amount: transaction.amount,
        applied_amount: transaction.amount.min(outstanding),
        tolerance: policy.amount_tolerance,
        confidence_score,
        is_automatic,
        note,
    })
}

/// Prepare and commit in one step; `log` is written only if the commit succeeds.
#[allow(clippy::too_many_arguments)]
#[instrument(
    skip(store, policy, transaction, charge, log, note),
    fields(transaction_id = %transaction.transaction_id, charge_id = %charge.charge_id)
)]
pub async fn apply(
    store: &dyn ReconciliationStore,
    policy: &MatchingPolicy,
    transaction: &BankTransaction,
    charge: &Charge,
    confidence_score: i32,
    is_automatic: bool,
    note: Option<String>,
    log: NewAutoMatchLog,
) -> Result<PaymentMatch, ReconcileError> {
    let application = prepare(
        policy,
        transaction,
        charge,
        confidence_score,
        is_automatic,
        note,
    )?;
    let payment = store.commit_match(&application, log).await?;

    info!(
        match_id = %payment.match_id,
        applied_amount = %payment.applied_amount,
        confidence_score = payment.confidence_score,
        is_automatic = payment.is_automatic,
        "Payment applied"
    );
    Ok(payment)
}
