//! Common test utilities for reconciliation-engine integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use reconciliation_engine::config::MatchingPolicy;
use reconciliation_engine::error::ReconcileError;
use reconciliation_engine::handlers::AppState;
use reconciliation_engine::matching::Reconciler;
use reconciliation_engine::models::{
    AuditLogFilter, AutoMatchLog, BankTransaction, Charge, ChargeCandidate, ChargeStatus,
    MatchApplication, MatchState, NewAutoMatchLog, OwnerScope, PayerProfile, PaymentMatch,
    TransactionSource,
};
use reconciliation_engine::services::{
    InMemoryStore, MemoryNotifier, ReconciliationStore, ReviewEvent, ReviewNotifier,
};
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once};
use tokio::sync::{Notify, Semaphore};
use uuid::Uuid;

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,reconciliation_engine=debug,sqlx=warn")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub const ANNA_IBAN: &str = "DE89 3704 0044 0532 0130 00";
pub const ANNA_LEASE: &str = "L-2024-017";

/// Anna Schmidt, tenant of unit WE 3 under lease L-2024-017.
pub fn anna() -> PayerProfile {
    PayerProfile {
        tenant_id: Uuid::new_v4(),
        first_name: Some("Anna".to_string()),
        last_name: "Schmidt".to_string(),
        iban: Some(ANNA_IBAN.to_string()),
        unit_label: Some("WE 3".to_string()),
        lease_reference: Some(ANNA_LEASE.to_string()),
    }
}

pub fn max_mustermann() -> PayerProfile {
    PayerProfile {
        tenant_id: Uuid::new_v4(),
        first_name: Some("Max".to_string()),
        last_name: "Mustermann".to_string(),
        iban: Some("DE02 1203 0000 0000 2020 51".to_string()),
        unit_label: Some("WE 5".to_string()),
        lease_reference: Some("L-2023-101".to_string()),
    }
}

pub fn charge(scope: OwnerScope, amount_due: &str, due_date: NaiveDate) -> Charge {
    Charge {
        charge_id: Uuid::new_v4(),
        lease_id: Uuid::new_v4(),
        owner_id: scope.owner_id,
        client_id: scope.client_id,
        amount_due: dec(amount_due),
        amount_paid: Decimal::ZERO,
        due_date,
        status: ChargeStatus::Open,
        reference: None,
        description: Some("Monthly rent".to_string()),
    }
}

/// Builder for imported bank transactions.
pub struct TransactionBuilder {
    transaction: BankTransaction,
}

impl TransactionBuilder {
    pub fn new(scope: OwnerScope, amount: &str, booking_date: NaiveDate) -> Self {
        let transaction_id = Uuid::new_v4();
        Self {
            transaction: BankTransaction {
                transaction_id,
                owner_id: scope.owner_id,
                client_id: scope.client_id,
                counterparty_iban: None,
                counterparty_name: None,
                amount: dec(amount),
                booking_date,
                purpose: None,
                match_state: MatchState::Unmatched,
                source: TransactionSource::CsvImport,
                external_reference: format!("csv-{}", transaction_id),
                created_utc: Utc::now(),
            },
        }
    }

    pub fn iban(mut self, iban: &str) -> Self {
        self.transaction.counterparty_iban = Some(iban.to_string());
        self
    }

    pub fn name(mut self, name: &str) -> Self {
        self.transaction.counterparty_name = Some(name.to_string());
        self
    }

    pub fn purpose(mut self, purpose: &str) -> Self {
        self.transaction.purpose = Some(purpose.to_string());
        self
    }

    pub fn build(self) -> BankTransaction {
        self.transaction
    }
}

/// A payment from Anna that matches her rent on every factor.
pub fn anna_pays(scope: OwnerScope, amount: &str, booking_date: NaiveDate) -> BankTransaction {
    TransactionBuilder::new(scope, amount, booking_date)
        .iban("DE89370400440532013000")
        .name("Anna Schmidt")
        .purpose(&format!("Miete Maerz {}", ANNA_LEASE))
        .build()
}

/// Engine wired to an in-memory store and a collecting notifier.
pub struct Harness {
    pub scope: OwnerScope,
    pub store: Arc<InMemoryStore>,
    pub notifier: Arc<MemoryNotifier>,
    pub reconciler: Arc<Reconciler>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_policy(MatchingPolicy::default())
    }

    pub fn with_policy(policy: MatchingPolicy) -> Self {
        init_tracing();
        let store = Arc::new(InMemoryStore::new());
        let notifier = Arc::new(MemoryNotifier::new());
        let reconciler = Arc::new(Reconciler::new(store.clone(), notifier.clone(), policy));
        Self {
            scope: OwnerScope::owner(Uuid::new_v4()),
            store,
            notifier,
            reconciler,
        }
    }

    pub fn state(&self) -> AppState {
        AppState::new(self.reconciler.clone(), 500)
    }

    pub fn add_charge(&self, charge: Charge, payer: PayerProfile) -> Charge {
        self.store.insert_charge(charge.clone(), payer).unwrap();
        charge
    }

    pub fn add_transaction(&self, transaction: BankTransaction) -> BankTransaction {
        self.store.insert_transaction(transaction.clone()).unwrap();
        transaction
    }

    pub fn charge(&self, charge_id: Uuid) -> Charge {
        self.store.charge(charge_id).unwrap()
    }

    pub fn transaction(&self, transaction_id: Uuid) -> BankTransaction {
        self.store.transaction(transaction_id).unwrap()
    }

    pub fn logs_for(&self, transaction_id: Uuid) -> Vec<AutoMatchLog> {
        self.store
            .logs()
            .into_iter()
            .filter(|l| l.transaction_id == transaction_id)
            .collect()
    }
}

/// Notifier that parks every delivery until `release` hands out permits.
pub struct GatedNotifier {
    pub delivering: Notify,
    pub delivered: MemoryNotifier,
    gate: Semaphore,
}

impl GatedNotifier {
    pub fn new() -> Self {
        Self {
            delivering: Notify::new(),
            delivered: MemoryNotifier::new(),
            gate: Semaphore::new(0),
        }
    }

    pub fn release(&self, deliveries: usize) {
        self.gate.add_permits(deliveries);
    }
}

#[async_trait]
impl ReviewNotifier for GatedNotifier {
    async fn notify(&self, event: &ReviewEvent) -> Result<(), AppError> {
        self.delivering.notify_one();
        self.gate
            .acquire()
            .await
            .map_err(|e| AppError::InternalError(anyhow::anyhow!(e)))?
            .forget();
        self.delivered.notify(event).await
    }
}

/// Store wrapper whose commits can be made to fail like a lost database.
pub struct FaultyStore {
    pub inner: Arc<InMemoryStore>,
    fail_commits: AtomicBool,
}

impl FaultyStore {
    pub fn new(inner: Arc<InMemoryStore>) -> Self {
        Self {
            inner,
            fail_commits: AtomicBool::new(true),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_commits.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl ReconciliationStore for FaultyStore {
    async fn health_check(&self) -> Result<(), AppError> {
        self.inner.health_check().await
    }

    async fn list_unmatched_transactions(
        &self,
        scope: &OwnerScope,
        limit: i64,
    ) -> Result<Vec<BankTransaction>, AppError> {
        self.inner.list_unmatched_transactions(scope, limit).await
    }

    async fn list_scopes_with_unmatched(&self) -> Result<Vec<OwnerScope>, AppError> {
        self.inner.list_scopes_with_unmatched().await
    }

    async fn get_transaction(
        &self,
        transaction_id: Uuid,
    ) -> Result<Option<BankTransaction>, AppError> {
        self.inner.get_transaction(transaction_id).await
    }

    async fn find_open_charges(
        &self,
        scope: &OwnerScope,
        due_from: NaiveDate,
        due_to: NaiveDate,
    ) -> Result<Vec<ChargeCandidate>, AppError> {
        self.inner.find_open_charges(scope, due_from, due_to).await
    }

    async fn get_charge(&self, charge_id: Uuid) -> Result<Option<ChargeCandidate>, AppError> {
        self.inner.get_charge(charge_id).await
    }

    async fn commit_match(
        &self,
        application: &MatchApplication,
        log: NewAutoMatchLog,
    ) -> Result<PaymentMatch, ReconcileError> {
        if self.fail_commits.load(Ordering::SeqCst) {
            let err = AppError::DatabaseError(anyhow::anyhow!("connection reset by peer"));
            return Err(err.into());
        }
        self.inner.commit_match(application, log).await
    }

    async fn append_log(&self, log: NewAutoMatchLog) -> Result<AutoMatchLog, AppError> {
        self.inner.append_log(log).await
    }

    async fn active_match_for(
        &self,
        transaction_id: Uuid,
    ) -> Result<Option<PaymentMatch>, AppError> {
        self.inner.active_match_for(transaction_id).await
    }

    async fn reverse_match(
        &self,
        transaction_id: Uuid,
        reason: &str,
    ) -> Result<PaymentMatch, ReconcileError> {
        self.inner.reverse_match(transaction_id, reason).await
    }

    async fn ignore_transaction(
        &self,
        transaction_id: Uuid,
    ) -> Result<BankTransaction, ReconcileError> {
        self.inner.ignore_transaction(transaction_id).await
    }

    async fn query_logs(&self, filter: &AuditLogFilter) -> Result<Vec<AutoMatchLog>, AppError> {
        self.inner.query_logs(filter).await
    }
}
