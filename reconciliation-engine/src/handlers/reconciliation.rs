//! Reconciliation endpoints: batch runs, per-transaction processing,
//! suggestions, manual decisions and the audit trail.

use crate::handlers::AppState;
use crate::matching::{BatchSummary, RunTrigger, ScoredCandidate, TransactionOutcome};
use crate::models::{
    AuditLogFilter, AutoMatchLog, BankTransaction, MatchResult, OwnerScope, PaymentMatch,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use uuid::Uuid;

const MAX_BATCH_LIMIT: i64 = 10_000;

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct RunRequest {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct RunResponse {
    #[serde(flatten)]
    pub summary: BatchSummary,
    pub needs_review: usize,
}

#[derive(Debug, Serialize)]
pub struct SuggestionsResponse {
    pub transaction_id: Uuid,
    pub candidates: Vec<ScoredCandidate>,
}

#[derive(Debug, Deserialize)]
pub struct ManualMatchRequest {
    pub charge_id: Uuid,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReverseRequest {
    pub reason: String,
}

/// Query params for listing audit log rows.
#[derive(Debug, Deserialize)]
pub struct AuditLogQuery {
    pub transaction_id: Option<Uuid>,
    pub result: Option<MatchResult>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    100
}

#[derive(Debug, Serialize)]
pub struct AuditLogResponse {
    pub logs: Vec<AutoMatchLog>,
    pub limit: i64,
    pub offset: i64,
}

// ============================================================================
// Handlers
// ============================================================================

/// Run one batch over the caller's unmatched transactions.
///
/// POST /reconciliation/runs
#[tracing::instrument(skip(state, body), fields(owner_id = %scope.owner_id))]
pub async fn run_batch(
    State(state): State<AppState>,
    scope: OwnerScope,
    body: Option<Json<RunRequest>>,
) -> Result<Json<RunResponse>, AppError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let limit = request
        .limit
        .unwrap_or(state.batch_limit)
        .clamp(1, MAX_BATCH_LIMIT);

    let summary = state
        .reconciler
        .run_batch(scope, limit, RunTrigger::Api)
        .await?;

    Ok(Json(RunResponse {
        needs_review: summary.needs_review(),
        summary,
    }))
}

/// POST /reconciliation/transactions/:id/process
#[tracing::instrument(skip(state), fields(owner_id = %scope.owner_id))]
pub async fn process_transaction(
    State(state): State<AppState>,
    scope: OwnerScope,
    Path(transaction_id): Path<Uuid>,
) -> Result<Json<TransactionOutcome>, AppError> {
    let outcome = state
        .reconciler
        .process_transaction(scope, transaction_id)
        .await?;
    Ok(Json(outcome))
}

/// Ranked candidates for a transaction. Changes nothing.
///
/// GET /reconciliation/transactions/:id/suggestions
#[tracing::instrument(skip(state), fields(owner_id = %scope.owner_id))]
pub async fn suggestions(
    State(state): State<AppState>,
    scope: OwnerScope,
    Path(transaction_id): Path<Uuid>,
) -> Result<Json<SuggestionsResponse>, AppError> {
    let candidates = state.reconciler.suggest(scope, transaction_id).await?;
    Ok(Json(SuggestionsResponse {
        transaction_id,
        candidates,
    }))
}

/// POST /reconciliation/transactions/:id/manual-match
#[tracing::instrument(
    skip(state, body),
    fields(owner_id = %scope.owner_id, charge_id = %body.charge_id)
)]
pub async fn manual_match(
    State(state): State<AppState>,
    scope: OwnerScope,
    Path(transaction_id): Path<Uuid>,
    Json(body): Json<ManualMatchRequest>,
) -> Result<(StatusCode, Json<PaymentMatch>), AppError> {
    let note = body.note.filter(|n| !n.trim().is_empty());
    let payment = state
        .reconciler
        .manual_match(scope, transaction_id, body.charge_id, note)
        .await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

/// POST /reconciliation/transactions/:id/reverse
#[tracing::instrument(skip(state, body), fields(owner_id = %scope.owner_id))]
pub async fn reverse_match(
    State(state): State<AppState>,
    scope: OwnerScope,
    Path(transaction_id): Path<Uuid>,
    Json(body): Json<ReverseRequest>,
) -> Result<Json<PaymentMatch>, AppError> {
    let reason = body.reason.trim();
    if reason.is_empty() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "A reversal reason is required"
        )));
    }

    let reversed = state
        .reconciler
        .reverse(scope, transaction_id, reason)
        .await?;
    Ok(Json(reversed))
}

/// POST /reconciliation/transactions/:id/ignore
#[tracing::instrument(skip(state), fields(owner_id = %scope.owner_id))]
pub async fn ignore_transaction(
    State(state): State<AppState>,
    scope: OwnerScope,
    Path(transaction_id): Path<Uuid>,
) -> Result<Json<BankTransaction>, AppError> {
    let transaction = state.reconciler.ignore(scope, transaction_id).await?;
    Ok(Json(transaction))
}

/// List audit log rows for the caller's scope, newest first.
///
/// GET /reconciliation/audit-logs
#[tracing::instrument(
    skip(state),
    fields(owner_id = %scope.owner_id, limit = query.limit, offset = query.offset)
)]
pub async fn list_audit_logs(
    State(state): State<AppState>,
    scope: OwnerScope,
    Query(query): Query<AuditLogQuery>,
) -> Result<Json<AuditLogResponse>, AppError> {
    if let (Some(from), Some(to)) = (query.from, query.to) {
        if from >= to {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "`from` must be earlier than `to`"
            )));
        }
    }

    let limit = query.limit.clamp(1, 1000);
    let offset = query.offset.max(0);

    let filter = AuditLogFilter {
        transaction_id: query.transaction_id,
        result: query.result,
        from_utc: query.from,
        to_utc: query.to,
        limit,
        offset,
        ..AuditLogFilter::for_scope(scope)
    };
    let logs = state.reconciler.audit_logs(&filter).await?;

    Ok(Json(AuditLogResponse {
        logs,
        limit,
        offset,
    }))
}
