//! Integration tests for batch reconciliation against the in-memory store.

mod common;

use common::{
    anna, anna_pays, charge, date, dec, max_mustermann, FaultyStore, GatedNotifier, Harness,
    TransactionBuilder,
};
use reconciliation_engine::config::MatchingPolicy;
use reconciliation_engine::error::ReconcileError;
use reconciliation_engine::matching::{Reconciler, RunTrigger};
use reconciliation_engine::models::{ChargeStatus, MatchResult, MatchState, OwnerScope};
use reconciliation_engine::services::{InMemoryStore, MemoryNotifier};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[tokio::test]
async fn exact_payment_settles_open_charge() {
    let h = Harness::new();
    let rent = h.add_charge(charge(h.scope, "750.00", date(2024, 3, 1)), anna());
    let tx = h.add_transaction(anna_pays(h.scope, "750.00", date(2024, 3, 1)));

    let summary = h
        .reconciler
        .run_batch(h.scope, 100, RunTrigger::Api)
        .await
        .unwrap();

    assert_eq!(summary.processed, 1);
    assert_eq!(summary.matched, 1);
    assert_eq!(summary.needs_review(), 0);

    let settled = h.charge(rent.charge_id);
    assert_eq!(settled.status, ChargeStatus::Paid);
    assert_eq!(settled.amount_paid, dec("750.00"));
    assert_eq!(settled.outstanding(), Decimal::ZERO);
    assert_eq!(h.transaction(tx.transaction_id).match_state, MatchState::Matched);

    let matches = h.store.matches();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].charge_id, rent.charge_id);
    assert_eq!(matches[0].confidence_score, 100);
    assert!(matches[0].is_automatic);

    let logs = h.logs_for(tx.transaction_id);
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].result, MatchResult::Matched);
    assert_eq!(logs[0].run_id, summary.run_id);
    assert_eq!(logs[0].confidence_score, 100);
    assert_eq!(logs[0].factors.iban, 40);
    assert_eq!(logs[0].factors.name, 25);
    assert_eq!(logs[0].factors.amount, 20);
    assert_eq!(logs[0].factors.date, 10);
    assert_eq!(logs[0].factors.purpose, 5);
    assert!(h.notifier.events().is_empty());
}

#[tokio::test]
async fn rerunning_on_matched_transaction_changes_nothing() {
    let h = Harness::new();
    let rent = h.add_charge(charge(h.scope, "750.00", date(2024, 3, 1)), anna());
    let tx = h.add_transaction(anna_pays(h.scope, "750.00", date(2024, 3, 1)));

    h.reconciler
        .run_batch(h.scope, 100, RunTrigger::Api)
        .await
        .unwrap();
    let charge_before = h.charge(rent.charge_id);

    let second = h
        .reconciler
        .run_batch(h.scope, 100, RunTrigger::Api)
        .await
        .unwrap();
    assert_eq!(second.processed, 0);

    let outcome = h
        .reconciler
        .process_transaction(h.scope, tx.transaction_id)
        .await
        .unwrap();
    assert_eq!(outcome.result, None);
    assert!(outcome.payment.is_none());

    assert_eq!(h.charge(rent.charge_id), charge_before);
    assert_eq!(h.transaction(tx.transaction_id).match_state, MatchState::Matched);
    assert_eq!(h.store.matches().len(), 1);
    assert_eq!(h.logs_for(tx.transaction_id).len(), 1);
}

#[tokio::test]
async fn paid_and_cancelled_charges_are_never_candidates() {
    let h = Harness::new();
    let mut paid = charge(h.scope, "750.00", date(2024, 3, 1));
    paid.status = ChargeStatus::Paid;
    paid.amount_paid = dec("750.00");
    let mut cancelled = charge(h.scope, "750.00", date(2024, 3, 1));
    cancelled.status = ChargeStatus::Cancelled;
    h.add_charge(paid.clone(), anna());
    h.add_charge(cancelled.clone(), anna());
    let tx = h.add_transaction(anna_pays(h.scope, "750.00", date(2024, 3, 1)));

    let suggestions = h
        .reconciler
        .suggest(h.scope, tx.transaction_id)
        .await
        .unwrap();
    assert!(suggestions.is_empty());

    let summary = h
        .reconciler
        .run_batch(h.scope, 100, RunTrigger::Api)
        .await
        .unwrap();
    assert_eq!(summary.no_match, 1);
    assert_eq!(h.charge(paid.charge_id), paid);
    assert_eq!(h.charge(cancelled.charge_id), cancelled);
}

#[tokio::test]
async fn unrelated_payment_outside_window_is_no_match() {
    let h = Harness::new();
    let rent = h.add_charge(charge(h.scope, "500.00", date(2024, 6, 1)), anna());
    // 10 % off, booked 120 days before the due date, nobody we know.
    let tx = h.add_transaction(
        TransactionBuilder::new(h.scope, "450.00", date(2024, 2, 2))
            .iban("FR14 2004 1010 0505 0001 3M02 606")
            .name("Jean Dupont")
            .purpose("Facture 2024-17")
            .build(),
    );

    let outcome = h
        .reconciler
        .process_transaction(h.scope, tx.transaction_id)
        .await
        .unwrap();

    assert_eq!(outcome.result, Some(MatchResult::NoMatch));
    assert_eq!(outcome.charge_id, None);
    assert_eq!(h.charge(rent.charge_id), rent);
    assert_eq!(h.transaction(tx.transaction_id).match_state, MatchState::Unmatched);
    assert!(h.store.matches().is_empty());

    let logs = h.logs_for(tx.transaction_id);
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].result, MatchResult::NoMatch);
    assert_eq!(logs[0].charge_id, None);
    assert!(h.notifier.events().is_empty());
}

#[tokio::test]
async fn close_runner_up_blocks_automatic_match() {
    let h = Harness::new();
    let march = h.add_charge(charge(h.scope, "750.00", date(2024, 3, 1)), anna());
    let extra = h.add_charge(charge(h.scope, "750.00", date(2024, 3, 3)), anna());
    let tx = h.add_transaction(anna_pays(h.scope, "750.00", date(2024, 3, 2)));

    let summary = h
        .reconciler
        .run_batch(h.scope, 100, RunTrigger::Api)
        .await
        .unwrap();

    assert_eq!(summary.multiple_candidates, 1);
    assert_eq!(summary.needs_review(), 1);
    assert_eq!(h.charge(march.charge_id), march);
    assert_eq!(h.charge(extra.charge_id), extra);
    assert!(h.store.matches().is_empty());

    let logs = h.logs_for(tx.transaction_id);
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].result, MatchResult::MultipleCandidates);
    // Equal scores rank the earlier due date first.
    assert_eq!(logs[0].charge_id, Some(march.charge_id));

    let events = h.notifier.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].result, MatchResult::MultipleCandidates);
    assert_eq!(events[0].transaction_id, tx.transaction_id);
}

#[tokio::test]
async fn payment_above_outstanding_is_refused_without_mutation() {
    let h = Harness::new();
    let rent = h.add_charge(charge(h.scope, "500.00", date(2024, 3, 1)), anna());
    // Every factor but the amount agrees: 40 + 25 + 0 + 10 + 5 = 80.
    let tx = h.add_transaction(anna_pays(h.scope, "750.00", date(2024, 3, 1)));

    let summary = h
        .reconciler
        .run_batch(h.scope, 100, RunTrigger::Api)
        .await
        .unwrap();

    assert_eq!(summary.matched, 0);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.refused, 1);
    assert_eq!(h.charge(rent.charge_id), rent);
    assert_eq!(h.transaction(tx.transaction_id).match_state, MatchState::Unmatched);
    assert!(h.store.matches().is_empty());

    let logs = h.logs_for(tx.transaction_id);
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].result, MatchResult::Skipped);
    assert_eq!(logs[0].charge_id, Some(rent.charge_id));
    assert_eq!(logs[0].confidence_score, 80);
    assert!(logs[0].note.as_deref().unwrap().contains("overpayment"));

    let events = h.notifier.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].result, MatchResult::Skipped);
    assert_eq!(events[0].charge_id, Some(rent.charge_id));
}

#[tokio::test]
async fn partial_payment_leaves_charge_partially_paid() {
    let h = Harness::new();
    let rent = h.add_charge(charge(h.scope, "750.00", date(2024, 3, 1)), anna());
    h.add_transaction(anna_pays(h.scope, "400.00", date(2024, 3, 1)));

    let summary = h
        .reconciler
        .run_batch(h.scope, 100, RunTrigger::Api)
        .await
        .unwrap();

    assert_eq!(summary.matched, 1);
    let after = h.charge(rent.charge_id);
    assert_eq!(after.status, ChargeStatus::PartiallyPaid);
    assert_eq!(after.amount_paid, dec("400.00"));
    assert_eq!(after.outstanding(), dec("350.00"));
}

#[tokio::test]
async fn weak_evidence_is_skipped_for_review() {
    let h = Harness::new();
    let rent = h.add_charge(charge(h.scope, "750.00", date(2024, 3, 1)), anna());
    // No IBAN: 0 + 25 + 20 + 10 + 5 = 60, below the threshold.
    let tx = h.add_transaction(
        TransactionBuilder::new(h.scope, "750.00", date(2024, 3, 1))
            .name("Anna Schmidt")
            .purpose("Miete L-2024-017")
            .build(),
    );

    let outcome = h
        .reconciler
        .process_transaction(h.scope, tx.transaction_id)
        .await
        .unwrap();

    assert_eq!(outcome.result, Some(MatchResult::Skipped));
    assert_eq!(outcome.confidence_score, 60);
    assert_eq!(outcome.charge_id, Some(rent.charge_id));
    assert_eq!(h.charge(rent.charge_id), rent);
    assert_eq!(h.notifier.events().len(), 1);
}

#[tokio::test]
async fn one_log_row_per_processed_transaction_per_run() {
    let h = Harness::new();
    h.add_charge(charge(h.scope, "750.00", date(2024, 3, 1)), anna());
    h.add_charge(charge(h.scope, "920.00", date(2024, 3, 1)), max_mustermann());
    h.add_transaction(anna_pays(h.scope, "750.00", date(2024, 3, 1)));
    h.add_transaction(
        TransactionBuilder::new(h.scope, "920.00", date(2024, 3, 4))
            .name("Mustermann")
            .build(),
    );
    h.add_transaction(
        TransactionBuilder::new(h.scope, "12.99", date(2024, 3, 4))
            .name("Streaming Service")
            .build(),
    );
    // Outgoing transfers are never reconciled.
    h.add_transaction(TransactionBuilder::new(h.scope, "-300.00", date(2024, 3, 5)).build());

    let summary = h
        .reconciler
        .run_batch(h.scope, 100, RunTrigger::Api)
        .await
        .unwrap();

    assert_eq!(summary.processed, 3);
    let logs: Vec<_> = h
        .store
        .logs()
        .into_iter()
        .filter(|l| l.run_id == summary.run_id)
        .collect();
    assert_eq!(logs.len(), summary.processed);
    let distinct: HashSet<Uuid> = logs.iter().map(|l| l.transaction_id).collect();
    assert_eq!(distinct.len(), logs.len());
    assert_eq!(
        summary.matched + summary.skipped + summary.multiple_candidates + summary.no_match,
        summary.processed
    );
}

#[tokio::test]
async fn oldest_booking_wins_the_only_charge() {
    let h = Harness::new();
    let rent = h.add_charge(charge(h.scope, "750.00", date(2024, 3, 1)), anna());
    // Imported newest first; the batch still takes the older booking first.
    let later = h.add_transaction(anna_pays(h.scope, "750.00", date(2024, 3, 3)));
    let earlier = h.add_transaction(anna_pays(h.scope, "750.00", date(2024, 3, 1)));

    let summary = h
        .reconciler
        .run_batch(h.scope, 100, RunTrigger::Api)
        .await
        .unwrap();

    assert_eq!(summary.matched, 1);
    assert_eq!(summary.no_match, 1);
    let matches = h.store.matches();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].transaction_id, earlier.transaction_id);
    assert_eq!(matches[0].charge_id, rent.charge_id);
    assert_eq!(h.transaction(later.transaction_id).match_state, MatchState::Unmatched);
}

#[tokio::test]
async fn concurrent_runs_on_one_scope_apply_once() {
    let h = Harness::new();
    h.add_charge(charge(h.scope, "750.00", date(2024, 3, 1)), anna());
    h.add_transaction(anna_pays(h.scope, "750.00", date(2024, 3, 1)));

    let (a, b) = tokio::join!(
        h.reconciler.run_batch(h.scope, 100, RunTrigger::Api),
        h.reconciler.run_batch(h.scope, 100, RunTrigger::Scheduler),
    );

    assert_eq!(a.unwrap().matched + b.unwrap().matched, 1);
    assert_eq!(h.store.matches().len(), 1);
    assert_eq!(h.store.logs().len(), 1);
}

#[tokio::test]
async fn slow_review_delivery_does_not_hold_the_scope() {
    common::init_tracing();
    let store = Arc::new(InMemoryStore::new());
    let notifier = Arc::new(GatedNotifier::new());
    let reconciler = Arc::new(Reconciler::new(
        store.clone(),
        notifier.clone(),
        MatchingPolicy::default(),
    ));
    let scope = OwnerScope::owner(Uuid::new_v4());
    store
        .insert_charge(charge(scope, "750.00", date(2024, 3, 1)), anna())
        .unwrap();
    store
        .insert_charge(charge(scope, "750.00", date(2024, 3, 3)), anna())
        .unwrap();
    let tx = anna_pays(scope, "750.00", date(2024, 3, 2));
    store.insert_transaction(tx.clone()).unwrap();

    let batch = tokio::spawn({
        let reconciler = reconciler.clone();
        async move { reconciler.run_batch(scope, 100, RunTrigger::Api).await }
    });
    notifier.delivering.notified().await;

    // The review is still undelivered; an operator action on the scope goes through.
    let ignored = tokio::time::timeout(
        Duration::from_secs(5),
        reconciler.ignore(scope, tx.transaction_id),
    )
    .await
    .expect("scope stayed locked during review delivery")
    .unwrap();
    assert_eq!(ignored.match_state, MatchState::Ignored);

    notifier.release(1);
    let summary = batch.await.unwrap().unwrap();
    assert_eq!(summary.multiple_candidates, 1);
    assert_eq!(notifier.delivered.events().len(), 1);
}

#[tokio::test]
async fn storage_failure_is_counted_and_retried_next_run() {
    common::init_tracing();
    let inner = Arc::new(InMemoryStore::new());
    let faulty = Arc::new(FaultyStore::new(inner.clone()));
    let reconciler = Reconciler::new(
        faulty.clone(),
        Arc::new(MemoryNotifier::new()),
        MatchingPolicy::default(),
    );
    let scope = OwnerScope::owner(Uuid::new_v4());
    let rent = charge(scope, "750.00", date(2024, 3, 1));
    inner.insert_charge(rent.clone(), anna()).unwrap();
    let tx = anna_pays(scope, "750.00", date(2024, 3, 1));
    inner.insert_transaction(tx.clone()).unwrap();

    let failed = reconciler
        .run_batch(scope, 100, RunTrigger::Scheduler)
        .await
        .unwrap();
    assert_eq!(failed.errors, 1);
    assert_eq!(failed.processed, 0);
    assert_eq!(inner.charge(rent.charge_id).unwrap(), rent);
    assert_eq!(
        inner.transaction(tx.transaction_id).unwrap().match_state,
        MatchState::Unmatched
    );
    let logs = inner.logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].result, MatchResult::Skipped);
    assert!(logs[0].note.as_deref().unwrap().contains("will retry"));

    faulty.set_failing(false);
    let retried = reconciler
        .run_batch(scope, 100, RunTrigger::Scheduler)
        .await
        .unwrap();
    assert_eq!(retried.matched, 1);
    assert_eq!(inner.charge(rent.charge_id).unwrap().status, ChargeStatus::Paid);
}

#[tokio::test]
async fn scheduler_runs_every_scope_with_pending_work() {
    let h = Harness::new();
    let other = OwnerScope::new(Uuid::new_v4(), Some(Uuid::new_v4()));
    h.add_charge(charge(h.scope, "750.00", date(2024, 3, 1)), anna());
    h.add_charge(charge(other, "750.00", date(2024, 3, 1)), anna());
    h.add_transaction(anna_pays(h.scope, "750.00", date(2024, 3, 1)));
    h.add_transaction(anna_pays(other, "750.00", date(2024, 3, 1)));

    let summaries = h
        .reconciler
        .run_all_scopes(100, RunTrigger::Scheduler)
        .await;

    assert_eq!(summaries.len(), 2);
    assert!(summaries.iter().all(|s| s.matched == 1));
    let scopes: HashSet<OwnerScope> = summaries
        .iter()
        .map(|s| OwnerScope::new(s.owner_id, s.client_id))
        .collect();
    assert!(scopes.contains(&h.scope));
    assert!(scopes.contains(&other));
}

#[tokio::test]
async fn charges_of_another_scope_are_invisible() {
    let h = Harness::new();
    let foreign_scope = OwnerScope::owner(Uuid::new_v4());
    let foreign = h.add_charge(charge(foreign_scope, "750.00", date(2024, 3, 1)), anna());
    let tx = h.add_transaction(anna_pays(h.scope, "750.00", date(2024, 3, 1)));

    let outcome = h
        .reconciler
        .process_transaction(h.scope, tx.transaction_id)
        .await
        .unwrap();
    assert_eq!(outcome.result, Some(MatchResult::NoMatch));

    let err = h
        .reconciler
        .manual_match(h.scope, tx.transaction_id, foreign.charge_id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::ChargeNotFound(_)));

    let err = h
        .reconciler
        .process_transaction(foreign_scope, tx.transaction_id)
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::TransactionNotFound(_)));
}

#[tokio::test]
async fn manual_match_then_reverse_restores_balances() {
    let h = Harness::new();
    let rent = h.add_charge(charge(h.scope, "750.00", date(2024, 3, 1)), anna());
    let tx = h.add_transaction(
        TransactionBuilder::new(h.scope, "750.00", date(2024, 3, 1))
            .name("A. Schmidt")
            .build(),
    );

    let payment = h
        .reconciler
        .manual_match(
            h.scope,
            tx.transaction_id,
            rent.charge_id,
            Some("confirmed by phone".to_string()),
        )
        .await
        .unwrap();
    assert!(!payment.is_automatic);
    assert_eq!(payment.applied_amount, dec("750.00"));
    assert_eq!(h.charge(rent.charge_id).status, ChargeStatus::Paid);

    let logs = h.logs_for(tx.transaction_id);
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].result, MatchResult::Matched);
    assert_eq!(logs[0].note.as_deref(), Some("manual match: confirmed by phone"));

    let again = h
        .reconciler
        .manual_match(h.scope, tx.transaction_id, rent.charge_id, None)
        .await
        .unwrap_err();
    assert!(matches!(again, ReconcileError::DuplicateMatch(_)));

    let reversed = h
        .reconciler
        .reverse(h.scope, tx.transaction_id, "wrong tenant")
        .await
        .unwrap();
    assert_eq!(reversed.match_id, payment.match_id);
    assert!(reversed.reversed_utc.is_some());
    assert_eq!(reversed.reversal_reason.as_deref(), Some("wrong tenant"));

    assert_eq!(h.charge(rent.charge_id), rent);
    assert_eq!(h.transaction(tx.transaction_id).match_state, MatchState::Unmatched);
    assert!(h.store.matches().iter().all(|m| !m.is_active()));

    let err = h
        .reconciler
        .reverse(h.scope, tx.transaction_id, "again")
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::NoActiveMatch(_)));
}

#[tokio::test]
async fn reversal_never_reopens_a_cancelled_charge() {
    let h = Harness::new();
    let rent = h.add_charge(charge(h.scope, "750.00", date(2024, 3, 1)), anna());
    let tx = h.add_transaction(anna_pays(h.scope, "750.00", date(2024, 3, 1)));
    h.reconciler.run_batch(h.scope, 100, RunTrigger::Api).await.unwrap();
    assert_eq!(h.charge(rent.charge_id).status, ChargeStatus::Paid);

    h.store
        .set_charge_status(rent.charge_id, ChargeStatus::Cancelled)
        .unwrap();
    h.reconciler
        .reverse(h.scope, tx.transaction_id, "lease terminated")
        .await
        .unwrap();

    let after = h.charge(rent.charge_id);
    assert_eq!(after.status, ChargeStatus::Cancelled);
    assert_eq!(after.amount_paid, dec("0.00"));

    // The reopened transaction must not find its way back to the cancelled charge.
    let summary = h.reconciler.run_batch(h.scope, 100, RunTrigger::Api).await.unwrap();
    assert_eq!(summary.matched, 0);
    assert_eq!(h.charge(rent.charge_id).status, ChargeStatus::Cancelled);
}

#[tokio::test]
async fn reversal_restores_overdue_status() {
    let h = Harness::new();
    let mut overdue = charge(h.scope, "750.00", date(2024, 3, 1));
    overdue.status = ChargeStatus::Overdue;
    let rent = h.add_charge(overdue, anna());
    let tx = h.add_transaction(anna_pays(h.scope, "750.00", date(2024, 3, 1)));

    let payment = h
        .reconciler
        .manual_match(h.scope, tx.transaction_id, rent.charge_id, None)
        .await
        .unwrap();
    assert_eq!(payment.charge_status_before, ChargeStatus::Overdue);
    assert_eq!(h.charge(rent.charge_id).status, ChargeStatus::Paid);

    h.reconciler
        .reverse(h.scope, tx.transaction_id, "wrong tenant")
        .await
        .unwrap();

    assert_eq!(h.charge(rent.charge_id), rent);
}

#[tokio::test]
async fn ignored_transactions_leave_the_queue() {
    let h = Harness::new();
    h.add_charge(charge(h.scope, "750.00", date(2024, 3, 1)), anna());
    let tx = h.add_transaction(anna_pays(h.scope, "750.00", date(2024, 3, 1)));

    let ignored = h.reconciler.ignore(h.scope, tx.transaction_id).await.unwrap();
    assert_eq!(ignored.match_state, MatchState::Ignored);
    // Ignoring twice is harmless.
    h.reconciler.ignore(h.scope, tx.transaction_id).await.unwrap();

    let summary = h
        .reconciler
        .run_batch(h.scope, 100, RunTrigger::Api)
        .await
        .unwrap();
    assert_eq!(summary.processed, 0);

    let err = h
        .reconciler
        .manual_match(h.scope, tx.transaction_id, Uuid::new_v4(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::ChargeNotFound(_)));
}

#[tokio::test]
async fn matched_transaction_cannot_be_ignored() {
    let h = Harness::new();
    h.add_charge(charge(h.scope, "750.00", date(2024, 3, 1)), anna());
    let tx = h.add_transaction(anna_pays(h.scope, "750.00", date(2024, 3, 1)));
    h.reconciler
        .run_batch(h.scope, 100, RunTrigger::Api)
        .await
        .unwrap();

    let err = h
        .reconciler
        .ignore(h.scope, tx.transaction_id)
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::DuplicateMatch(_)));
}

#[tokio::test]
async fn suggestions_are_ranked_and_thresholded() {
    let h = Harness::new();
    let rent = h.add_charge(charge(h.scope, "750.00", date(2024, 3, 1)), anna());
    let other = h.add_charge(charge(h.scope, "920.00", date(2024, 3, 1)), max_mustermann());
    let tx = h.add_transaction(
        TransactionBuilder::new(h.scope, "750.00", date(2024, 3, 2))
            .name("Anna Schmidt")
            .build(),
    );

    let suggestions = h
        .reconciler
        .suggest(h.scope, tx.transaction_id)
        .await
        .unwrap();

    // Anna: 25 + 20 + 10 = 55. Max only earns the date: 10, below 30.
    assert_eq!(suggestions.len(), 1);
    assert_eq!(suggestions[0].charge.charge_id, rent.charge_id);
    assert_eq!(suggestions[0].total, 55);
    assert_ne!(suggestions[0].charge.charge_id, other.charge_id);
    assert!(h.store.logs().is_empty());
}

#[tokio::test]
async fn stricter_policy_changes_the_decision() {
    let policy = MatchingPolicy {
        auto_match_threshold: 95,
        ..MatchingPolicy::default()
    };
    let h = Harness::with_policy(policy);
    let rent = h.add_charge(charge(h.scope, "500.00", date(2024, 3, 1)), anna());
    // 40 + 25 + 20 + 10 + 0: no reference in the purpose line.
    let tx = h.add_transaction(
        TransactionBuilder::new(h.scope, "500.00", date(2024, 3, 1))
            .iban(common::ANNA_IBAN)
            .name("Anna Schmidt")
            .build(),
    );

    let outcome = h
        .reconciler
        .process_transaction(h.scope, tx.transaction_id)
        .await
        .unwrap();
    assert_eq!(outcome.result, Some(MatchResult::Skipped));
    assert_eq!(outcome.confidence_score, 90);
    assert_eq!(h.charge(rent.charge_id), rent);
}
