//! Candidate selection: open charges plausibly settled by a transaction.

use crate::config::{MatchingPolicy, MAX_WINDOW_DAYS};
use crate::models::{BankTransaction, Charge, ChargeCandidate};
use crate::services::ReconciliationStore;
use chrono::{Duration, NaiveDate};
use service_core::error::AppError;
use tracing::{debug, instrument};

/// Inclusive due-date range searched around a booking date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DueWindow {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DueWindow {
    pub fn around(policy: &MatchingPolicy, booking_date: NaiveDate) -> Self {
        let days = |n: i64| Duration::days(n.clamp(0, MAX_WINDOW_DAYS));
        Self {
            from: booking_date
                .checked_sub_signed(days(policy.max_days_late))
                .unwrap_or(NaiveDate::MIN),
            to: booking_date
                .checked_add_signed(days(policy.max_days_early))
                .unwrap_or(NaiveDate::MAX),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }
}

/// Whether `charge` may be considered for `transaction` at all.
pub fn is_candidate(
    policy: &MatchingPolicy,
    transaction: &BankTransaction,
    charge: &Charge,
) -> bool {
    charge.scope() == transaction.scope()
        && charge.status.accepts_payment()
        && DueWindow::around(policy, transaction.booking_date).contains(charge.due_date)
}

/// Candidates for one transaction, earliest due date first. Read-only.
///
/// Rows returned by the store are re-checked so a store can never widen the
/// candidate set.
#[instrument(
    skip(store, policy, transaction),
    fields(transaction_id = %transaction.transaction_id)
)]
pub async fn select(
    store: &dyn ReconciliationStore,
    policy: &MatchingPolicy,
    transaction: &BankTransaction,
) -> Result<Vec<ChargeCandidate>, AppError> {
    let window = DueWindow::around(policy, transaction.booking_date);
    let mut candidates: Vec<ChargeCandidate> = store
        .find_open_charges(&transaction.scope(), window.from, window.to)
        .await?
        .into_iter()
        .filter(|c| is_candidate(policy, transaction, &c.charge))
        .collect();

    candidates.sort_by(|a, b| {
        a.charge
            .due_date
            .cmp(&b.charge.due_date)
            .then_with(|| a.charge.charge_id.cmp(&b.charge.charge_id))
    });

    debug!(candidates = candidates.len(), "Selected candidate charges");
    Ok(candidates)
}
