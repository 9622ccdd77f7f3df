//! Drives selector, scorer, policy, applier and audit log over transactions.

use crate::config::MatchingPolicy;
use crate::error::ReconcileError;
use crate::matching::policy::Decision;
use crate::matching::scorer::ScoredCandidate;
use crate::matching::{applier, audit, policy, scorer, selector};
use crate::models::{
    AuditLogFilter, AutoMatchLog, BankTransaction, MatchResult, NewAutoMatchLog, OwnerScope,
    PaymentMatch, ScoreFactors,
};
use crate::services::metrics::{
    record_apply_refusal, record_batch_run, record_error, record_match_outcome,
    record_review_notification,
};
use crate::services::{ReconciliationStore, ReviewEvent, ReviewNotifier};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError};
use std::time::Instant;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunTrigger {
    Api,
    Scheduler,
}

impl RunTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Scheduler => "scheduler",
        }
    }
}

/// Counts per outcome for one batch run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    pub run_id: Uuid,
    pub owner_id: Uuid,
    pub client_id: Option<Uuid>,
    pub processed: usize,
    pub matched: usize,
    pub skipped: usize,
    pub multiple_candidates: usize,
    pub no_match: usize,
    /// Chosen matches the applier refused; also counted in `skipped`.
    pub refused: usize,
    /// Transactions that failed with a storage error and will be retried.
    pub errors: usize,
    pub duration_ms: u64,
}

impl BatchSummary {
    fn new(run_id: Uuid, scope: &OwnerScope) -> Self {
        Self {
            run_id,
            owner_id: scope.owner_id,
            client_id: scope.client_id,
            processed: 0,
            matched: 0,
            skipped: 0,
            multiple_candidates: 0,
            no_match: 0,
            refused: 0,
            errors: 0,
            duration_ms: 0,
        }
    }

    /// Transactions a human should look at.
    pub fn needs_review(&self) -> usize {
        self.skipped + self.multiple_candidates
    }

    fn tally(&mut self, outcome: &TransactionOutcome) {
        let Some(result) = outcome.result else {
            return;
        };
        self.processed += 1;
        match result {
            MatchResult::Matched => self.matched += 1,
            MatchResult::Skipped => self.skipped += 1,
            MatchResult::MultipleCandidates => self.multiple_candidates += 1,
            MatchResult::NoMatch => self.no_match += 1,
        }
        if outcome.refusal.is_some() {
            self.refused += 1;
        }
    }
}

/// What happened to one transaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionOutcome {
    pub transaction_id: Uuid,
    /// `None` when the transaction was not eligible and nothing was recorded.
    pub result: Option<MatchResult>,
    pub charge_id: Option<Uuid>,
    pub confidence_score: i32,
    pub factors: ScoreFactors,
    pub payment: Option<PaymentMatch>,
    /// Reason the applier refused the chosen charge.
    pub refusal: Option<String>,
}

impl TransactionOutcome {
    fn not_eligible(transaction_id: Uuid) -> Self {
        Self {
            transaction_id,
            result: None,
            charge_id: None,
            confidence_score: 0,
            factors: ScoreFactors::default(),
            payment: None,
            refusal: None,
        }
    }

    fn from_log(log: &NewAutoMatchLog) -> Self {
        Self {
            transaction_id: log.transaction_id,
            result: Some(log.result),
            charge_id: log.charge_id,
            confidence_score: log.factors.total(),
            factors: log.factors,
            payment: None,
            refusal: None,
        }
    }
}

fn log_reason(decision: &Decision) -> Option<String> {
    match decision.outcome {
        MatchResult::MultipleCandidates => {
            Some("several charges scored within the tie margin".to_string())
        }
        MatchResult::Skipped => Some("best candidate below the auto-match threshold".to_string()),
        _ => None,
    }
}

fn review_event(
    run_id: Uuid,
    transaction: &BankTransaction,
    outcome: &TransactionOutcome,
    reason: Option<String>,
) -> Option<ReviewEvent> {
    Some(ReviewEvent {
        run_id,
        transaction_id: transaction.transaction_id,
        owner_id: transaction.owner_id,
        client_id: transaction.client_id,
        result: outcome.result?,
        charge_id: outcome.charge_id,
        confidence_score: outcome.confidence_score,
        reason,
    })
}

pub struct Reconciler {
    store: Arc<dyn ReconciliationStore>,
    notifier: Arc<dyn ReviewNotifier>,
    policy: Arc<MatchingPolicy>,
    scope_locks: std::sync::Mutex<HashMap<OwnerScope, Arc<AsyncMutex<()>>>>,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn ReconciliationStore>,
        notifier: Arc<dyn ReviewNotifier>,
        policy: MatchingPolicy,
    ) -> Self {
        Self {
            store,
            notifier,
            policy: Arc::new(policy),
            scope_locks: std::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn ReconciliationStore> {
        &self.store
    }

    pub fn policy(&self) -> &MatchingPolicy {
        &self.policy
    }

    fn scope_lock(&self, scope: &OwnerScope) -> Arc<AsyncMutex<()>> {
        let mut locks = self
            .scope_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        locks.entry(*scope).or_default().clone()
    }

    /// Load a transaction, hiding ones that belong to another scope.
    async fn load_transaction(
        &self,
        scope: &OwnerScope,
        transaction_id: Uuid,
    ) -> Result<BankTransaction, ReconcileError> {
        match self.store.get_transaction(transaction_id).await? {
            Some(tx) if tx.scope() == *scope => Ok(tx),
            _ => Err(ReconcileError::TransactionNotFound(transaction_id)),
        }
    }

    /// Reconcile the unmatched transactions of one scope, oldest first.
    ///
    /// A failing transaction is counted and the batch moves on.
    #[instrument(skip(self), fields(owner_id = %scope.owner_id, trigger = trigger.as_str()))]
    pub async fn run_batch(
        &self,
        scope: OwnerScope,
        limit: i64,
        trigger: RunTrigger,
    ) -> Result<BatchSummary, ReconcileError> {
        let lock = self.scope_lock(&scope);
        let guard = lock.lock().await;

        let started = Instant::now();
        let run_id = Uuid::new_v4();
        let mut summary = BatchSummary::new(run_id, &scope);

        let transactions = match self.store.list_unmatched_transactions(&scope, limit).await {
            Ok(transactions) => transactions,
            Err(e) => {
                record_error(e.kind());
                record_batch_run(trigger.as_str(), "failed", started.elapsed().as_secs_f64());
                return Err(e.into());
            }
        };
        info!(%run_id, transactions = transactions.len(), "Starting reconciliation batch");

        let mut reviews = Vec::new();
        for transaction in &transactions {
            match self.process_one(run_id, transaction, &mut reviews).await {
                Ok(outcome) => summary.tally(&outcome),
                Err(e) => {
                    summary.errors += 1;
                    record_error(e.reason());
                    error!(
                        %run_id,
                        transaction_id = %transaction.transaction_id,
                        error = %e,
                        "Failed to reconcile transaction"
                    );
                }
            }
        }

        summary.duration_ms = started.elapsed().as_millis() as u64;
        let status = if summary.errors == 0 { "success" } else { "partial" };
        record_batch_run(trigger.as_str(), status, started.elapsed().as_secs_f64());
        drop(guard);

        // Delivery can be slow; the scope is already free for the next run.
        self.send_reviews(reviews).await;

        info!(
            %run_id,
            processed = summary.processed,
            matched = summary.matched,
            skipped = summary.skipped,
            multiple_candidates = summary.multiple_candidates,
            no_match = summary.no_match,
            refused = summary.refused,
            errors = summary.errors,
            duration_ms = summary.duration_ms,
            "Reconciliation batch finished"
        );
        Ok(summary)
    }

    /// One batch per scope with pending work, scopes one after another.
    pub async fn run_all_scopes(&self, limit: i64, trigger: RunTrigger) -> Vec<BatchSummary> {
        let scopes = match self.store.list_scopes_with_unmatched().await {
            Ok(scopes) => scopes,
            Err(e) => {
                record_error(e.kind());
                error!(error = %e, "Failed to list scopes with unmatched transactions");
                return Vec::new();
            }
        };

        let mut summaries = Vec::with_capacity(scopes.len());
        for scope in scopes {
            match self.run_batch(scope, limit, trigger).await {
                Ok(summary) => summaries.push(summary),
                Err(e) => warn!(
                    owner_id = %scope.owner_id,
                    error = %e,
                    "Skipping scope after batch failure"
                ),
            }
        }
        summaries
    }

    /// Reconcile a single transaction in its own run.
    #[instrument(skip(self), fields(owner_id = %scope.owner_id))]
    pub async fn process_transaction(
        &self,
        scope: OwnerScope,
        transaction_id: Uuid,
    ) -> Result<TransactionOutcome, ReconcileError> {
        let lock = self.scope_lock(&scope);
        let guard = lock.lock().await;

        let transaction = self.load_transaction(&scope, transaction_id).await?;
        let mut reviews = Vec::new();
        let outcome = self
            .process_one(Uuid::new_v4(), &transaction, &mut reviews)
            .await;
        drop(guard);

        self.send_reviews(reviews).await;
        outcome
    }

    /// Reconcile one transaction. Review events are queued in `reviews` and
    /// sent by the caller once the scope lock is released.
    async fn process_one(
        &self,
        run_id: Uuid,
        transaction: &BankTransaction,
        reviews: &mut Vec<ReviewEvent>,
    ) -> Result<TransactionOutcome, ReconcileError> {
        if !transaction.is_reconcilable() {
            return Ok(TransactionOutcome::not_eligible(transaction.transaction_id));
        }

        let candidates = selector::select(self.store.as_ref(), &self.policy, transaction).await?;
        let scored = scorer::score_all(&self.policy, transaction, &candidates);
        let decision = policy::decide(&self.policy, scored);
        let log = audit::for_decision(run_id, transaction, &decision);

        let Some(chosen) = decision.chosen() else {
            let outcome = TransactionOutcome::from_log(&log);
            self.store.append_log(log).await?;
            record_match_outcome(decision.outcome.as_str(), "auto");
            if decision.outcome.needs_review() {
                reviews.extend(review_event(
                    run_id,
                    transaction,
                    &outcome,
                    log_reason(&decision),
                ));
            }
            return Ok(outcome);
        };

        let mut outcome = TransactionOutcome::from_log(&log);
        match applier::apply(
            self.store.as_ref(),
            &self.policy,
            transaction,
            &chosen.charge,
            chosen.total,
            true,
            log.note.clone(),
            log,
        )
        .await
        {
            Ok(payment) => {
                record_match_outcome(MatchResult::Matched.as_str(), "auto");
                outcome.payment = Some(payment);
                Ok(outcome)
            }
            Err(e) => {
                record_apply_refusal(e.reason());
                let failed = audit::for_failed_apply(
                    run_id,
                    transaction,
                    chosen.charge.charge_id,
                    chosen.factors,
                    &e,
                );

                if !e.is_refusal() {
                    // Storage failure: the commit rolled back; leave a trace if we still can.
                    if let Err(log_err) = self.store.append_log(failed).await {
                        warn!(error = %log_err, "Failed to record failed apply");
                    }
                    return Err(e);
                }

                warn!(
                    transaction_id = %transaction.transaction_id,
                    charge_id = %chosen.charge.charge_id,
                    reason = e.reason(),
                    "Apply refused"
                );
                let mut refused = TransactionOutcome::from_log(&failed);
                refused.refusal = Some(e.reason().to_string());
                self.store.append_log(failed).await?;
                record_match_outcome(MatchResult::Skipped.as_str(), "auto");
                reviews.extend(review_event(
                    run_id,
                    transaction,
                    &refused,
                    Some(e.to_string()),
                ));
                Ok(refused)
            }
        }
    }

    async fn send_reviews(&self, reviews: Vec<ReviewEvent>) {
        for event in reviews {
            match self.notifier.notify(&event).await {
                Ok(()) => record_review_notification("sent"),
                Err(e) => {
                    record_review_notification("failed");
                    warn!(
                        transaction_id = %event.transaction_id,
                        error = %e,
                        "Failed to send review notification"
                    );
                }
            }
        }
    }

    /// Ranked candidates at or above the suggestion threshold. Read-only.
    pub async fn suggest(
        &self,
        scope: OwnerScope,
        transaction_id: Uuid,
    ) -> Result<Vec<ScoredCandidate>, ReconcileError> {
        let transaction = self.load_transaction(&scope, transaction_id).await?;
        let candidates = selector::select(self.store.as_ref(), &self.policy, &transaction).await?;
        let mut scored = scorer::score_all(&self.policy, &transaction, &candidates);
        policy::rank(&mut scored);
        scored.retain(|c| c.total >= self.policy.suggestion_threshold);
        Ok(scored)
    }

    /// Apply an operator-chosen charge. Same preconditions as automatic matching.
    #[instrument(skip(self, note), fields(owner_id = %scope.owner_id))]
    pub async fn manual_match(
        &self,
        scope: OwnerScope,
        transaction_id: Uuid,
        charge_id: Uuid,
        note: Option<String>,
    ) -> Result<PaymentMatch, ReconcileError> {
        let lock = self.scope_lock(&scope);
        let _guard = lock.lock().await;

        let transaction = self.load_transaction(&scope, transaction_id).await?;
        let candidate = match self.store.get_charge(charge_id).await? {
            Some(c) if c.charge.scope() == scope => c,
            _ => return Err(ReconcileError::ChargeNotFound(charge_id)),
        };

        let scored = scorer::score(&self.policy, &transaction, &candidate);
        let log = audit::for_manual_match(
            Uuid::new_v4(),
            &transaction,
            charge_id,
            scored.factors,
            note.as_deref(),
        );

        let result = applier::apply(
            self.store.as_ref(),
            &self.policy,
            &transaction,
            &candidate.charge,
            scored.total,
            false,
            log.note.clone(),
            log,
        )
        .await;

        match &result {
            Ok(_) => record_match_outcome(MatchResult::Matched.as_str(), "manual"),
            Err(e) => record_apply_refusal(e.reason()),
        }
        result
    }

    /// Undo an active match. The PaymentMatch is kept, marked reversed.
    #[instrument(skip(self, reason), fields(owner_id = %scope.owner_id))]
    pub async fn reverse(
        &self,
        scope: OwnerScope,
        transaction_id: Uuid,
        reason: &str,
    ) -> Result<PaymentMatch, ReconcileError> {
        let lock = self.scope_lock(&scope);
        let _guard = lock.lock().await;

        self.load_transaction(&scope, transaction_id).await?;
        let reversed = self.store.reverse_match(transaction_id, reason).await?;
        info!(
            %transaction_id,
            match_id = %reversed.match_id,
            charge_id = %reversed.charge_id,
            applied_amount = %reversed.applied_amount,
            "Payment match reversed"
        );
        Ok(reversed)
    }

    /// Take a transaction out of the reconciliation queue.
    #[instrument(skip(self), fields(owner_id = %scope.owner_id))]
    pub async fn ignore(
        &self,
        scope: OwnerScope,
        transaction_id: Uuid,
    ) -> Result<BankTransaction, ReconcileError> {
        let lock = self.scope_lock(&scope);
        let _guard = lock.lock().await;

        self.load_transaction(&scope, transaction_id).await?;
        let transaction = self.store.ignore_transaction(transaction_id).await?;
        info!(%transaction_id, "Transaction ignored");
        Ok(transaction)
    }

    pub async fn audit_logs(
        &self,
        filter: &AuditLogFilter,
    ) -> Result<Vec<AutoMatchLog>, ReconcileError> {
        Ok(self.store.query_logs(filter).await?)
    }
}
