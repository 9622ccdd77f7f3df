//! In-memory store for tests and local runs.
//!
//! Every mutating call takes the single state lock for its whole duration, so
//! a commit is as atomic here as a database transaction.

use crate::error::ReconcileError;
use crate::models::{
    AuditLogFilter, AutoMatchLog, BankTransaction, Charge, ChargeCandidate, ChargeStatus,
    MatchApplication, MatchState, NewAutoMatchLog, OwnerScope, PayerProfile, PaymentMatch,
};
use crate::services::store::ReconciliationStore;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use service_core::error::AppError;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Default)]
struct State {
    transactions: HashMap<Uuid, BankTransaction>,
    external_refs: HashSet<String>,
    charges: HashMap<Uuid, Charge>,
    payers: HashMap<Uuid, PayerProfile>,
    matches: Vec<PaymentMatch>,
    logs: Vec<AutoMatchLog>,
    log_keys: HashSet<(Uuid, Uuid)>,
}

impl State {
    fn candidate(&self, charge: &Charge) -> Result<ChargeCandidate, AppError> {
        let payer = self.payers.get(&charge.charge_id).cloned().ok_or_else(|| {
            AppError::DatabaseError(anyhow::anyhow!(
                "Charge {} has no payer profile",
                charge.charge_id
            ))
        })?;
        Ok(ChargeCandidate {
            charge: charge.clone(),
            payer,
        })
    }

    fn push_log(&mut self, log: NewAutoMatchLog) -> Result<AutoMatchLog, AppError> {
        if !self.log_keys.insert((log.run_id, log.transaction_id)) {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Transaction {} already logged in run {}",
                log.transaction_id,
                log.run_id
            )));
        }
        let row = log.into_log(Uuid::new_v4(), Utc::now());
        self.logs.push(row.clone());
        Ok(row)
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, State>, AppError> {
        self.state
            .lock()
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Store mutex poisoned: {}", e)))
    }

    /// Ingest a transaction; duplicate external references are rejected.
    pub fn insert_transaction(&self, transaction: BankTransaction) -> Result<(), AppError> {
        let mut state = self.state()?;
        if !state
            .external_refs
            .insert(transaction.external_reference.clone())
        {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Transaction with external reference {} already imported",
                transaction.external_reference
            )));
        }
        state
            .transactions
            .insert(transaction.transaction_id, transaction);
        Ok(())
    }

    /// Register a charge together with the payer billing knows for it.
    pub fn insert_charge(&self, charge: Charge, payer: PayerProfile) -> Result<(), AppError> {
        let mut state = self.state()?;
        state.payers.insert(charge.charge_id, payer);
        state.charges.insert(charge.charge_id, charge);
        Ok(())
    }

    /// Billing-side status change, e.g. a charge cancelled or marked overdue.
    pub fn set_charge_status(&self, charge_id: Uuid, status: ChargeStatus) -> Result<(), AppError> {
        let mut state = self.state()?;
        let charge = state
            .charges
            .get_mut(&charge_id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Charge {} not found", charge_id)))?;
        charge.status = status;
        Ok(())
    }

    pub fn charge(&self, charge_id: Uuid) -> Option<Charge> {
        self.state().ok()?.charges.get(&charge_id).cloned()
    }

    pub fn transaction(&self, transaction_id: Uuid) -> Option<BankTransaction> {
        self.state().ok()?.transactions.get(&transaction_id).cloned()
    }

    /// All matches ever recorded, reversed ones included.
    pub fn matches(&self) -> Vec<PaymentMatch> {
        self.state()
            .map(|s| s.matches.clone())
            .unwrap_or_default()
    }

    pub fn logs(&self) -> Vec<AutoMatchLog> {
        self.state().map(|s| s.logs.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ReconciliationStore for InMemoryStore {
    async fn health_check(&self) -> Result<(), AppError> {
        self.state().map(|_| ())
    }

    async fn list_unmatched_transactions(
        &self,
        scope: &OwnerScope,
        limit: i64,
    ) -> Result<Vec<BankTransaction>, AppError> {
        let state = self.state()?;
        let mut pending: Vec<BankTransaction> = state
            .transactions
            .values()
            .filter(|t| t.scope() == *scope && t.is_reconcilable())
            .cloned()
            .collect();
        pending.sort_by(|a, b| {
            a.booking_date
                .cmp(&b.booking_date)
                .then_with(|| a.created_utc.cmp(&b.created_utc))
                .then_with(|| a.transaction_id.cmp(&b.transaction_id))
        });
        pending.truncate(limit.max(0) as usize);
        Ok(pending)
    }

    async fn list_scopes_with_unmatched(&self) -> Result<Vec<OwnerScope>, AppError> {
        let state = self.state()?;
        let scopes: BTreeSet<(Uuid, Option<Uuid>)> = state
            .transactions
            .values()
            .filter(|t| t.is_reconcilable())
            .map(|t| (t.owner_id, t.client_id))
            .collect();
        Ok(scopes
            .into_iter()
            .map(|(owner_id, client_id)| OwnerScope::new(owner_id, client_id))
            .collect())
    }

    async fn get_transaction(
        &self,
        transaction_id: Uuid,
    ) -> Result<Option<BankTransaction>, AppError> {
        Ok(self.state()?.transactions.get(&transaction_id).cloned())
    }

    async fn find_open_charges(
        &self,
        scope: &OwnerScope,
        due_from: NaiveDate,
        due_to: NaiveDate,
    ) -> Result<Vec<ChargeCandidate>, AppError> {
        let state = self.state()?;
        state
            .charges
            .values()
            .filter(|c| {
                c.scope() == *scope
                    && c.status.accepts_payment()
                    && c.due_date >= due_from
                    && c.due_date <= due_to
            })
            .map(|c| state.candidate(c))
            .collect()
    }

    async fn get_charge(&self, charge_id: Uuid) -> Result<Option<ChargeCandidate>, AppError> {
        let state = self.state()?;
        state
            .charges
            .get(&charge_id)
            .map(|c| state.candidate(c))
            .transpose()
    }

    async fn commit_match(
        &self,
        application: &MatchApplication,
        log: NewAutoMatchLog,
    ) -> Result<PaymentMatch, ReconcileError> {
        let mut state = self.state()?;

        let transaction = state
            .transactions
            .get(&application.transaction_id)
            .ok_or(ReconcileError::TransactionNotFound(application.transaction_id))?;
        match transaction.match_state {
            MatchState::Unmatched => {}
            MatchState::Matched => {
                return Err(ReconcileError::DuplicateMatch(application.transaction_id))
            }
            MatchState::Ignored => {
                return Err(ReconcileError::NotReconcilable(application.transaction_id))
            }
        }
        if state
            .matches
            .iter()
            .any(|m| m.transaction_id == application.transaction_id && m.is_active())
        {
            return Err(ReconcileError::DuplicateMatch(application.transaction_id));
        }

        let charge = state
            .charges
            .get(&application.charge_id)
            .ok_or(ReconcileError::ChargeNotFound(application.charge_id))?;
        if !charge.status.accepts_payment() {
            return Err(ReconcileError::ChargeClosed(charge.charge_id));
        }
        let outstanding = charge.outstanding();
        if outstanding < application.amount - application.tolerance
            || application.applied_amount > outstanding
        {
            return Err(ReconcileError::Overpayment {
                charge_id: charge.charge_id,
                amount: application.amount,
                outstanding,
            });
        }
        let status_before = charge.status;
        let status = charge.status_after_payment(application.applied_amount);
        if state.log_keys.contains(&(log.run_id, log.transaction_id)) {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Transaction {} already logged in run {}",
                log.transaction_id,
                log.run_id
            ))
            .into());
        }

        // All checks passed; nothing below can fail.
        if let Some(charge) = state.charges.get_mut(&application.charge_id) {
            charge.amount_paid += application.applied_amount;
            charge.status = status;
        }
        if let Some(transaction) = state.transactions.get_mut(&application.transaction_id) {
            transaction.match_state = MatchState::Matched;
        }
        let payment = application
            .clone()
            .into_match(Uuid::new_v4(), status_before, Utc::now());
        state.matches.push(payment.clone());
        state.push_log(log)?;

        Ok(payment)
    }

    async fn append_log(&self, log: NewAutoMatchLog) -> Result<AutoMatchLog, AppError> {
        self.state()?.push_log(log)
    }

    async fn active_match_for(
        &self,
        transaction_id: Uuid,
    ) -> Result<Option<PaymentMatch>, AppError> {
        Ok(self
            .state()?
            .matches
            .iter()
            .find(|m| m.transaction_id == transaction_id && m.is_active())
            .cloned())
    }

    async fn reverse_match(
        &self,
        transaction_id: Uuid,
        reason: &str,
    ) -> Result<PaymentMatch, ReconcileError> {
        let mut state = self.state()?;
        let index = state
            .matches
            .iter()
            .position(|m| m.transaction_id == transaction_id && m.is_active())
            .ok_or(ReconcileError::NoActiveMatch(transaction_id))?;

        let (charge_id, applied, before) = {
            let m = &state.matches[index];
            (m.charge_id, m.applied_amount, m.charge_status_before)
        };
        if let Some(charge) = state.charges.get_mut(&charge_id) {
            charge.status = charge.status_after_reversal(applied, before);
            charge.amount_paid -= applied;
        }
        if let Some(transaction) = state.transactions.get_mut(&transaction_id) {
            transaction.match_state = MatchState::Unmatched;
        }

        let reversed = &mut state.matches[index];
        reversed.reversed_utc = Some(Utc::now());
        reversed.reversal_reason = Some(reason.to_string());
        Ok(reversed.clone())
    }

    async fn ignore_transaction(
        &self,
        transaction_id: Uuid,
    ) -> Result<BankTransaction, ReconcileError> {
        let mut state = self.state()?;
        let transaction = state
            .transactions
            .get_mut(&transaction_id)
            .ok_or(ReconcileError::TransactionNotFound(transaction_id))?;
        match transaction.match_state {
            MatchState::Matched => Err(ReconcileError::DuplicateMatch(transaction_id)),
            MatchState::Unmatched | MatchState::Ignored => {
                transaction.match_state = MatchState::Ignored;
                Ok(transaction.clone())
            }
        }
    }

    async fn query_logs(&self, filter: &AuditLogFilter) -> Result<Vec<AutoMatchLog>, AppError> {
        let state = self.state()?;
        let mut rows: Vec<AutoMatchLog> = state
            .logs
            .iter()
            .rev()
            .filter(|log| filter.matches(log))
            .cloned()
            .collect();
        // Stable sort keeps later inserts first among equal timestamps.
        rows.sort_by(|a, b| b.created_utc.cmp(&a.created_utc));
        Ok(rows
            .into_iter()
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .collect())
    }
}
