//! Persistence seam for the reconciliation pipeline.

use crate::error::ReconcileError;
use crate::models::{
    AuditLogFilter, AutoMatchLog, BankTransaction, ChargeCandidate, MatchApplication,
    NewAutoMatchLog, OwnerScope, PaymentMatch,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use service_core::error::AppError;
use uuid::Uuid;

#[async_trait]
pub trait ReconciliationStore: Send + Sync {
    async fn health_check(&self) -> Result<(), AppError>;

    /// Unmatched incoming transactions of a scope, oldest booking date first.
    async fn list_unmatched_transactions(
        &self,
        scope: &OwnerScope,
        limit: i64,
    ) -> Result<Vec<BankTransaction>, AppError>;

    /// Every scope that currently has unmatched incoming transactions.
    async fn list_scopes_with_unmatched(&self) -> Result<Vec<OwnerScope>, AppError>;

    async fn get_transaction(
        &self,
        transaction_id: Uuid,
    ) -> Result<Option<BankTransaction>, AppError>;

    /// Charges of `scope` that still accept payment, due within `[due_from, due_to]`.
    async fn find_open_charges(
        &self,
        scope: &OwnerScope,
        due_from: NaiveDate,
        due_to: NaiveDate,
    ) -> Result<Vec<ChargeCandidate>, AppError>;

    async fn get_charge(&self, charge_id: Uuid) -> Result<Option<ChargeCandidate>, AppError>;

    /// Apply a payment and record its audit row as one atomic unit.
    ///
    /// Flips the transaction `unmatched -> matched` by compare-and-set, books
    /// the applied amount on the charge, inserts the PaymentMatch and `log`.
    /// On any refusal or failure nothing is written.
    async fn commit_match(
        &self,
        application: &MatchApplication,
        log: NewAutoMatchLog,
    ) -> Result<PaymentMatch, ReconcileError>;

    /// Record an attempt that did not mutate anything.
    async fn append_log(&self, log: NewAutoMatchLog) -> Result<AutoMatchLog, AppError>;

    async fn active_match_for(
        &self,
        transaction_id: Uuid,
    ) -> Result<Option<PaymentMatch>, AppError>;

    /// Deactivate the active match, take the payment back off the charge and
    /// return the transaction to `unmatched`.
    async fn reverse_match(
        &self,
        transaction_id: Uuid,
        reason: &str,
    ) -> Result<PaymentMatch, ReconcileError>;

    /// Move an unmatched transaction out of the queue. Idempotent.
    async fn ignore_transaction(
        &self,
        transaction_id: Uuid,
    ) -> Result<BankTransaction, ReconcileError>;

    /// Audit rows matching `filter`, newest first.
    async fn query_logs(&self, filter: &AuditLogFilter) -> Result<Vec<AutoMatchLog>, AppError>;
}
