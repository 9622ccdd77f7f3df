//! PostgreSQL store for reconciliation-engine.

use crate::error::ReconcileError;
use crate::models::{
    AuditLogFilter, AutoMatchLog, BankTransaction, Charge, ChargeCandidate, ChargeStatus,
    MatchApplication, MatchResult, MatchState, NewAutoMatchLog, OwnerScope, PayerProfile,
    PaymentMatch, ScoreFactors, TransactionSource,
};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::store::ReconciliationStore;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

const TRANSACTION_COLUMNS: &str = "transaction_id, owner_id, client_id, counterparty_iban, \
     counterparty_name, amount, booking_date, purpose, match_state, source, external_reference, \
     created_utc";

const CANDIDATE_SELECT: &str = r#"
    SELECT c.charge_id, c.lease_id, c.owner_id, c.client_id, c.amount_due, c.amount_paid,
           c.due_date, c.status, c.reference, c.description,
           t.tenant_id, t.first_name, t.last_name, t.iban, l.unit_label, l.lease_reference
    FROM charges c
    JOIN leases l ON l.lease_id = c.lease_id
    JOIN tenants t ON t.tenant_id = l.tenant_id
"#;

const MATCH_COLUMNS: &str = "match_id, transaction_id, charge_id, applied_amount, \
     charge_status_before, confidence_score, is_automatic, note, matched_utc, reversed_utc, reversal_reason";

const LOG_COLUMNS: &str = "log_id, run_id, transaction_id, charge_id, owner_id, client_id, \
     result, confidence_score, iban_score, name_score, amount_score, date_score, purpose_score, \
     note, created_utc";

// ============================================================================
// Row types
// ============================================================================

#[derive(Debug, FromRow)]
struct TransactionRow {
    transaction_id: Uuid,
    owner_id: Uuid,
    client_id: Option<Uuid>,
    counterparty_iban: Option<String>,
    counterparty_name: Option<String>,
    amount: Decimal,
    booking_date: NaiveDate,
    purpose: Option<String>,
    match_state: String,
    source: String,
    external_reference: String,
    created_utc: DateTime<Utc>,
}

impl From<TransactionRow> for BankTransaction {
    fn from(r: TransactionRow) -> Self {
        Self {
            transaction_id: r.transaction_id,
            owner_id: r.owner_id,
            client_id: r.client_id,
            counterparty_iban: r.counterparty_iban,
            counterparty_name: r.counterparty_name,
            amount: r.amount,
            booking_date: r.booking_date,
            purpose: r.purpose,
            match_state: MatchState::from_str(&r.match_state),
            source: TransactionSource::from_str(&r.source),
            external_reference: r.external_reference,
            created_utc: r.created_utc,
        }
    }
}

#[derive(Debug, FromRow)]
struct CandidateRow {
    charge_id: Uuid,
    lease_id: Uuid,
    owner_id: Uuid,
    client_id: Option<Uuid>,
    amount_due: Decimal,
    amount_paid: Decimal,
    due_date: NaiveDate,
    status: String,
    reference: Option<String>,
    description: Option<String>,
    tenant_id: Uuid,
    first_name: Option<String>,
    last_name: String,
    iban: Option<String>,
    unit_label: Option<String>,
    lease_reference: Option<String>,
}

impl From<CandidateRow> for ChargeCandidate {
    fn from(r: CandidateRow) -> Self {
        Self {
            charge: Charge {
                charge_id: r.charge_id,
                lease_id: r.lease_id,
                owner_id: r.owner_id,
                client_id: r.client_id,
                amount_due: r.amount_due,
                amount_paid: r.amount_paid,
                due_date: r.due_date,
                status: ChargeStatus::from_str(&r.status),
                reference: r.reference,
                description: r.description,
            },
            payer: PayerProfile {
                tenant_id: r.tenant_id,
                first_name: r.first_name,
                last_name: r.last_name,
                iban: r.iban,
                unit_label: r.unit_label,
                lease_reference: r.lease_reference,
            },
        }
    }
}

#[derive(Debug, FromRow)]
struct MatchRow {
    match_id: Uuid,
    transaction_id: Uuid,
    charge_id: Uuid,
    applied_amount: Decimal,
    charge_status_before: String,
    confidence_score: i32,
    is_automatic: bool,
    note: Option<String>,
    matched_utc: DateTime<Utc>,
    reversed_utc: Option<DateTime<Utc>>,
    reversal_reason: Option<String>,
}

impl From<MatchRow> for PaymentMatch {
    fn from(r: MatchRow) -> Self {
        Self {
            match_id: r.match_id,
            transaction_id: r.transaction_id,
            charge_id: r.charge_id,
            applied_amount: r.applied_amount,
            charge_status_before: ChargeStatus::from_str(&r.charge_status_before),
            confidence_score: r.confidence_score,
            is_automatic: r.is_automatic,
            note: r.note,
            matched_utc: r.matched_utc,
            reversed_utc: r.reversed_utc,
            reversal_reason: r.reversal_reason,
        }
    }
}

#[derive(Debug, FromRow)]
struct LogRow {
    log_id: Uuid,
    run_id: Uuid,
    transaction_id: Uuid,
    charge_id: Option<Uuid>,
    owner_id: Uuid,
    client_id: Option<Uuid>,
    result: String,
    confidence_score: i32,
    iban_score: i32,
    name_score: i32,
    amount_score: i32,
    date_score: i32,
    purpose_score: i32,
    note: Option<String>,
    created_utc: DateTime<Utc>,
}

impl From<LogRow> for AutoMatchLog {
    fn from(r: LogRow) -> Self {
        Self {
            log_id: r.log_id,
            run_id: r.run_id,
            transaction_id: r.transaction_id,
            charge_id: r.charge_id,
            owner_id: r.owner_id,
            client_id: r.client_id,
            result: MatchResult::from_str(&r.result),
            confidence_score: r.confidence_score,
            factors: ScoreFactors {
                iban: r.iban_score,
                name: r.name_score,
                amount: r.amount_score,
                date: r.date_score,
                purpose: r.purpose_score,
            },
            note: r.note,
            created_utc: r.created_utc,
        }
    }
}

fn db_error(context: &'static str) -> impl FnOnce(sqlx::Error) -> AppError {
    move |e| AppError::DatabaseError(anyhow::anyhow!("{}: {}", context, e))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|e| e.code())
        .is_some_and(|code| code == "23505")
}

async fn insert_log<'e, E>(executor: E, log: NewAutoMatchLog) -> Result<AutoMatchLog, AppError>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let query = format!(
        r#"
        INSERT INTO auto_match_logs (log_id, run_id, transaction_id, charge_id, owner_id, client_id,
            result, confidence_score, iban_score, name_score, amount_score, date_score,
            purpose_score, note)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        RETURNING {}
        "#,
        LOG_COLUMNS
    );

    sqlx::query_as::<_, LogRow>(&query)
        .bind(Uuid::new_v4())
        .bind(log.run_id)
        .bind(log.transaction_id)
        .bind(log.charge_id)
        .bind(log.scope.owner_id)
        .bind(log.scope.client_id)
        .bind(log.result.as_str())
        .bind(log.factors.total())
        .bind(log.factors.iban)
        .bind(log.factors.name)
        .bind(log.factors.amount)
        .bind(log.factors.date)
        .bind(log.factors.purpose)
        .bind(&log.note)
        .fetch_one(executor)
        .await
        .map(AutoMatchLog::from)
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict(anyhow::anyhow!(
                    "Transaction {} already logged in run {}",
                    log.transaction_id,
                    log.run_id
                ))
            } else {
                AppError::DatabaseError(anyhow::anyhow!("Failed to insert audit log: {}", e))
            }
        })
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "reconciliation-engine"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    /// Explain why the guarded charge update touched no row.
    async fn charge_refusal(
        conn: &mut sqlx::PgConnection,
        application: &MatchApplication,
    ) -> Result<ReconcileError, AppError> {
        let row: Option<(String, Decimal)> = sqlx::query_as(
            "SELECT status, amount_due - amount_paid FROM charges WHERE charge_id = $1",
        )
        .bind(application.charge_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_error("Failed to load charge"))?;

        Ok(match row {
            None => ReconcileError::ChargeNotFound(application.charge_id),
            Some((status, _)) if !ChargeStatus::from_str(&status).accepts_payment() => {
                ReconcileError::ChargeClosed(application.charge_id)
            }
            Some((_, outstanding)) => ReconcileError::Overpayment {
                charge_id: application.charge_id,
                amount: application.amount,
                outstanding,
            },
        })
    }

    /// Explain why the compare-and-set on the transaction touched no row.
    async fn transaction_refusal(
        conn: &mut sqlx::PgConnection,
        transaction_id: Uuid,
    ) -> Result<ReconcileError, AppError> {
        let state: Option<String> =
            sqlx::query_scalar("SELECT match_state FROM bank_transactions WHERE transaction_id = $1")
                .bind(transaction_id)
                .fetch_optional(&mut *conn)
                .await
                .map_err(db_error("Failed to load transaction"))?;

        Ok(match state.as_deref().map(MatchState::from_str) {
            None => ReconcileError::TransactionNotFound(transaction_id),
            Some(MatchState::Matched) => ReconcileError::DuplicateMatch(transaction_id),
            Some(_) => ReconcileError::NotReconcilable(transaction_id),
        })
    }
}

#[async_trait]
impl ReconciliationStore for PgStore {
    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self), fields(owner_id = %scope.owner_id))]
    async fn list_unmatched_transactions(
        &self,
        scope: &OwnerScope,
        limit: i64,
    ) -> Result<Vec<BankTransaction>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_unmatched_transactions"])
            .start_timer();

        let query = format!(
            r#"
            SELECT {}
            FROM bank_transactions
            WHERE owner_id = $1
              AND client_id IS NOT DISTINCT FROM $2
              AND match_state = 'unmatched'
              AND amount > 0
            ORDER BY booking_date ASC, created_utc ASC, transaction_id ASC
            LIMIT $3
            "#,
            TRANSACTION_COLUMNS
        );

        let rows = sqlx::query_as::<_, TransactionRow>(&query)
            .bind(scope.owner_id)
            .bind(scope.client_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("Failed to list unmatched transactions"))?;

        timer.observe_duration();
        Ok(rows.into_iter().map(BankTransaction::from).collect())
    }

    #[instrument(skip(self))]
    async fn list_scopes_with_unmatched(&self) -> Result<Vec<OwnerScope>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_scopes_with_unmatched"])
            .start_timer();

        let rows: Vec<(Uuid, Option<Uuid>)> = sqlx::query_as(
            r#"
            SELECT DISTINCT owner_id, client_id
            FROM bank_transactions
            WHERE match_state = 'unmatched' AND amount > 0
            ORDER BY owner_id, client_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list scopes"))?;

        timer.observe_duration();
        Ok(rows
            .into_iter()
            .map(|(owner_id, client_id)| OwnerScope::new(owner_id, client_id))
            .collect())
    }

    #[instrument(skip(self))]
    async fn get_transaction(
        &self,
        transaction_id: Uuid,
    ) -> Result<Option<BankTransaction>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_transaction"])
            .start_timer();

        let query = format!(
            "SELECT {} FROM bank_transactions WHERE transaction_id = $1",
            TRANSACTION_COLUMNS
        );
        let row = sqlx::query_as::<_, TransactionRow>(&query)
            .bind(transaction_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to get transaction"))?;

        timer.observe_duration();
        Ok(row.map(BankTransaction::from))
    }

    #[instrument(skip(self), fields(owner_id = %scope.owner_id))]
    async fn find_open_charges(
        &self,
        scope: &OwnerScope,
        due_from: NaiveDate,
        due_to: NaiveDate,
    ) -> Result<Vec<ChargeCandidate>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_open_charges"])
            .start_timer();

        let query = format!(
            r#"
            {}
            WHERE c.owner_id = $1
              AND c.client_id IS NOT DISTINCT FROM $2
              AND c.status IN ('open', 'partially_paid', 'overdue')
              AND c.due_date BETWEEN $3 AND $4
            ORDER BY c.due_date ASC, c.charge_id ASC
            "#,
            CANDIDATE_SELECT
        );

        let rows = sqlx::query_as::<_, CandidateRow>(&query)
            .bind(scope.owner_id)
            .bind(scope.client_id)
            .bind(due_from)
            .bind(due_to)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("Failed to find open charges"))?;

        timer.observe_duration();
        Ok(rows.into_iter().map(ChargeCandidate::from).collect())
    }

    #[instrument(skip(self))]
    async fn get_charge(&self, charge_id: Uuid) -> Result<Option<ChargeCandidate>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_charge"])
            .start_timer();

        let query = format!("{} WHERE c.charge_id = $1", CANDIDATE_SELECT);
        let row = sqlx::query_as::<_, CandidateRow>(&query)
            .bind(charge_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to get charge"))?;

        timer.observe_duration();
        Ok(row.map(ChargeCandidate::from))
    }

    #[instrument(
        skip(self, application, log),
        fields(transaction_id = %application.transaction_id, charge_id = %application.charge_id)
    )]
    async fn commit_match(
        &self,
        application: &MatchApplication,
        log: NewAutoMatchLog,
    ) -> Result<PaymentMatch, ReconcileError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["commit_match"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("Failed to begin transaction"))?;

        // Compare-and-set: only an unmatched transaction may be flipped.
        let flipped = sqlx::query(
            r#"
            UPDATE bank_transactions
            SET match_state = 'matched', updated_utc = NOW()
            WHERE transaction_id = $1 AND match_state = 'unmatched' AND amount > 0
            "#,
        )
        .bind(application.transaction_id)
        .execute(&mut *tx)
        .await
        .map_err(db_error("Failed to flip transaction state"))?
        .rows_affected();

        if flipped == 0 {
            return Err(Self::transaction_refusal(&mut *tx, application.transaction_id).await?);
        }

        // Lock the charge and remember its status for a later reversal.
        let status_before: Option<(String,)> =
            sqlx::query_as("SELECT status FROM charges WHERE charge_id = $1 FOR UPDATE")
                .bind(application.charge_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_error("Failed to lock charge"))?;
        let Some((status_before,)) = status_before else {
            return Err(ReconcileError::ChargeNotFound(application.charge_id));
        };

        let booked: Option<(String,)> = sqlx::query_as(
            r#"
            UPDATE charges
            SET amount_paid = amount_paid + $2,
                status = CASE WHEN amount_paid + $2 >= amount_due THEN 'paid'
                              ELSE 'partially_paid' END,
                updated_utc = NOW()
            WHERE charge_id = $1
              AND status IN ('open', 'partially_paid', 'overdue')
              AND amount_due - amount_paid >= $3 - $4
              AND amount_paid + $2 <= amount_due
            RETURNING status
            "#,
        )
        .bind(application.charge_id)
        .bind(application.applied_amount)
        .bind(application.amount)
        .bind(application.tolerance)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error("Failed to book payment on charge"))?;

        if booked.is_none() {
            return Err(Self::charge_refusal(&mut *tx, application).await?);
        }

        let query = format!(
            r#"
            INSERT INTO payment_matches (match_id, transaction_id, charge_id, applied_amount,
                charge_status_before, confidence_score, is_automatic, note)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            MATCH_COLUMNS
        );
        let payment = sqlx::query_as::<_, MatchRow>(&query)
            .bind(Uuid::new_v4())
            .bind(application.transaction_id)
            .bind(application.charge_id)
            .bind(application.applied_amount)
            .bind(&status_before)
            .bind(application.confidence_score)
            .bind(application.is_automatic)
            .bind(&application.note)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    ReconcileError::DuplicateMatch(application.transaction_id)
                } else {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to insert payment match: {}", e))
                        .into()
                }
            })?;

        insert_log(&mut *tx, log).await?;

        tx.commit()
            .await
            .map_err(db_error("Failed to commit payment match"))?;

        timer.observe_duration();
        Ok(payment.into())
    }

    #[instrument(skip(self, log), fields(transaction_id = %log.transaction_id))]
    async fn append_log(&self, log: NewAutoMatchLog) -> Result<AutoMatchLog, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["append_log"])
            .start_timer();

        let row = insert_log(&self.pool, log).await?;

        timer.observe_duration();
        Ok(row)
    }

    #[instrument(skip(self))]
    async fn active_match_for(
        &self,
        transaction_id: Uuid,
    ) -> Result<Option<PaymentMatch>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["active_match_for"])
            .start_timer();

        let query = format!(
            "SELECT {} FROM payment_matches WHERE transaction_id = $1 AND reversed_utc IS NULL",
            MATCH_COLUMNS
        );
        let row = sqlx::query_as::<_, MatchRow>(&query)
            .bind(transaction_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to get active match"))?;

        timer.observe_duration();
        Ok(row.map(PaymentMatch::from))
    }

    #[instrument(skip(self, reason))]
    async fn reverse_match(
        &self,
        transaction_id: Uuid,
        reason: &str,
    ) -> Result<PaymentMatch, ReconcileError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["reverse_match"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("Failed to begin transaction"))?;

        let query = format!(
            r#"
            UPDATE payment_matches
            SET reversed_utc = NOW(), reversal_reason = $2
            WHERE transaction_id = $1 AND reversed_utc IS NULL
            RETURNING {}
            "#,
            MATCH_COLUMNS
        );
        let reversed = sqlx::query_as::<_, MatchRow>(&query)
            .bind(transaction_id)
            .bind(reason)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_error("Failed to reverse payment match"))?
            .ok_or(ReconcileError::NoActiveMatch(transaction_id))?;

        sqlx::query(
            r#"
            UPDATE charges
            SET amount_paid = amount_paid - $2,
                status = CASE WHEN status = 'cancelled' THEN status
                              WHEN amount_paid - $2 <= 0 THEN
                                  CASE WHEN status = 'overdue' OR $3::text = 'overdue'
                                       THEN 'overdue' ELSE 'open' END
                              WHEN amount_paid - $2 < amount_due THEN 'partially_paid'
                              ELSE 'paid' END,
                updated_utc = NOW()
            WHERE charge_id = $1
            "#,
        )
        .bind(reversed.charge_id)
        .bind(reversed.applied_amount)
        .bind(&reversed.charge_status_before)
        .execute(&mut *tx)
        .await
        .map_err(db_error("Failed to restore charge balance"))?;

        sqlx::query(
            r#"
            UPDATE bank_transactions
            SET match_state = 'unmatched', updated_utc = NOW()
            WHERE transaction_id = $1
            "#,
        )
        .bind(transaction_id)
        .execute(&mut *tx)
        .await
        .map_err(db_error("Failed to reopen transaction"))?;

        tx.commit()
            .await
            .map_err(db_error("Failed to commit reversal"))?;

        timer.observe_duration();
        Ok(reversed.into())
    }

    #[instrument(skip(self))]
    async fn ignore_transaction(
        &self,
        transaction_id: Uuid,
    ) -> Result<BankTransaction, ReconcileError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["ignore_transaction"])
            .start_timer();

        let query = format!(
            r#"
            UPDATE bank_transactions
            SET match_state = 'ignored', updated_utc = NOW()
            WHERE transaction_id = $1 AND match_state IN ('unmatched', 'ignored')
            RETURNING {}
            "#,
            TRANSACTION_COLUMNS
        );
        let row = sqlx::query_as::<_, TransactionRow>(&query)
            .bind(transaction_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to ignore transaction"))?;

        timer.observe_duration();
        match row {
            Some(row) => Ok(row.into()),
            None => match self.get_transaction(transaction_id).await? {
                Some(_) => Err(ReconcileError::DuplicateMatch(transaction_id)),
                None => Err(ReconcileError::TransactionNotFound(transaction_id)),
            },
        }
    }

    #[instrument(skip(self, filter), fields(owner_id = %filter.scope.owner_id))]
    async fn query_logs(&self, filter: &AuditLogFilter) -> Result<Vec<AutoMatchLog>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["query_logs"])
            .start_timer();

        let query = format!(
            r#"
            SELECT {}
            FROM auto_match_logs
            WHERE owner_id = $1
              AND client_id IS NOT DISTINCT FROM $2
              AND ($3::uuid IS NULL OR transaction_id = $3)
              AND ($4::text IS NULL OR result = $4)
              AND ($5::timestamptz IS NULL OR created_utc >= $5)
              AND ($6::timestamptz IS NULL OR created_utc < $6)
            ORDER BY created_utc DESC, log_id ASC
            LIMIT $7 OFFSET $8
            "#,
            LOG_COLUMNS
        );

        let rows = sqlx::query_as::<_, LogRow>(&query)
            .bind(filter.scope.owner_id)
            .bind(filter.scope.client_id)
            .bind(filter.transaction_id)
            .bind(filter.result.map(|r| r.as_str()))
            .bind(filter.from_utc)
            .bind(filter.to_utc)
            .bind(filter.limit)
            .bind(filter.offset)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("Failed to query audit logs"))?;

        timer.observe_duration();
        Ok(rows.into_iter().map(AutoMatchLog::from).collect())
    }
}
