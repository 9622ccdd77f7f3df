//! Domain models for reconciliation-engine.

#![allow(clippy::should_implement_trait)]

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Scope
// ============================================================================

/// Owner (and optional client) a transaction or charge belongs to.
///
/// Reconciliation never crosses scopes, and runs within one scope are serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerScope {
    pub owner_id: Uuid,
    pub client_id: Option<Uuid>,
}

impl OwnerScope {
    pub fn new(owner_id: Uuid, client_id: Option<Uuid>) -> Self {
        Self {
            owner_id,
            client_id,
        }
    }

    pub fn owner(owner_id: Uuid) -> Self {
        Self::new(owner_id, None)
    }
}

// ============================================================================
// Bank Transaction Models
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchState {
    Unmatched,
    Matched,
    Ignored,
}

impl MatchState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unmatched => "unmatched",
            Self::Matched => "matched",
            Self::Ignored => "ignored",
        }
    }

    /// Unknown values map to `Ignored` so they never enter matching.
    pub fn from_str(s: &str) -> Self {
        match s {
            "unmatched" => Self::Unmatched,
            "matched" => Self::Matched,
            _ => Self::Ignored,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionSource {
    CsvImport,
    BankSync,
}

impl TransactionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CsvImport => "csv_import",
            Self::BankSync => "bank_sync",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "bank_sync" => Self::BankSync,
            _ => Self::CsvImport,
        }
    }
}

/// An imported bank movement. Never deleted once imported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankTransaction {
    pub transaction_id: Uuid,
    pub owner_id: Uuid,
    pub client_id: Option<Uuid>,
    pub counterparty_iban: Option<String>,
    pub counterparty_name: Option<String>,
    /// Signed; incoming payments are positive.
    pub amount: Decimal,
    pub booking_date: NaiveDate,
    pub purpose: Option<String>,
    pub match_state: MatchState,
    pub source: TransactionSource,
    /// Bank or CSV row identifier, unique per import.
    pub external_reference: String,
    pub created_utc: DateTime<Utc>,
}

impl BankTransaction {
    pub fn scope(&self) -> OwnerScope {
        OwnerScope::new(self.owner_id, self.client_id)
    }

    /// Only unmatched incoming payments take part in reconciliation.
    pub fn is_reconcilable(&self) -> bool {
        self.match_state == MatchState::Unmatched && self.amount > Decimal::ZERO
    }
}

// ============================================================================
// Charge Models
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeStatus {
    Open,
    PartiallyPaid,
    Paid,
    Overdue,
    Cancelled,
}

impl ChargeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::PartiallyPaid => "partially_paid",
            Self::Paid => "paid",
            Self::Overdue => "overdue",
            Self::Cancelled => "cancelled",
        }
    }

    /// Unknown values map to `Cancelled` so they are never candidates.
    pub fn from_str(s: &str) -> Self {
        match s {
            "open" => Self::Open,
            "partially_paid" => Self::PartiallyPaid,
            "paid" => Self::Paid,
            "overdue" => Self::Overdue,
            _ => Self::Cancelled,
        }
    }

    /// Statuses a payment may still be applied to.
    pub fn accepts_payment(&self) -> bool {
        matches!(self, Self::Open | Self::PartiallyPaid | Self::Overdue)
    }

    pub const SETTLEABLE: [ChargeStatus; 3] = [Self::Open, Self::PartiallyPaid, Self::Overdue];
}

/// An amount owed by a tenant for a billing period. Created by billing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Charge {
    pub charge_id: Uuid,
    pub lease_id: Uuid,
    pub owner_id: Uuid,
    pub client_id: Option<Uuid>,
    pub amount_due: Decimal,
    pub amount_paid: Decimal,
    pub due_date: NaiveDate,
    pub status: ChargeStatus,
    /// Invoice number, if billing issued one.
    pub reference: Option<String>,
    pub description: Option<String>,
}

impl Charge {
    pub fn scope(&self) -> OwnerScope {
        OwnerScope::new(self.owner_id, self.client_id)
    }

    pub fn outstanding(&self) -> Decimal {
        self.amount_due - self.amount_paid
    }

    /// Status after `applied` more has been paid.
    pub fn status_after_payment(&self, applied: Decimal) -> ChargeStatus {
        let paid = self.amount_paid + applied;
        if paid >= self.amount_due {
            ChargeStatus::Paid
        } else if paid > Decimal::ZERO {
            ChargeStatus::PartiallyPaid
        } else {
            self.status
        }
    }

    /// Status after `reversed` is taken back off the paid amount.
    ///
    /// `before` is the status the charge had when the reversed payment was
    /// booked. A cancelled charge stays cancelled; a charge that is or was
    /// overdue falls back to overdue once nothing is paid on it.
    pub fn status_after_reversal(&self, reversed: Decimal, before: ChargeStatus) -> ChargeStatus {
        if self.status == ChargeStatus::Cancelled {
            return ChargeStatus::Cancelled;
        }
        let paid = self.amount_paid - reversed;
        if paid <= Decimal::ZERO {
            if self.status == ChargeStatus::Overdue || before == ChargeStatus::Overdue {
                ChargeStatus::Overdue
            } else {
                ChargeStatus::Open
            }
        } else if paid < self.amount_due {
            ChargeStatus::PartiallyPaid
        } else {
            ChargeStatus::Paid
        }
    }
}

/// Who is expected to pay a charge, as known to billing (tenant + lease).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayerProfile {
    pub tenant_id: Uuid,
    pub first_name: Option<String>,
    /// Family name, or the company name for corporate tenants.
    pub last_name: String,
    pub iban: Option<String>,
    pub unit_label: Option<String>,
    pub lease_reference: Option<String>,
}

impl PayerProfile {
    pub fn full_name(&self) -> String {
        match self.first_name.as_deref().map(str::trim) {
            Some(first) if !first.is_empty() => format!("{} {}", first, self.last_name.trim()),
            _ => self.last_name.trim().to_string(),
        }
    }
}

/// A charge joined with its payer, as returned by candidate selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeCandidate {
    pub charge: Charge,
    pub payer: PayerProfile,
}

// ============================================================================
// Payment Match Models
// ============================================================================

/// Durable link between a transaction and the charge it settled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentMatch {
    pub match_id: Uuid,
    pub transaction_id: Uuid,
    pub charge_id: Uuid,
    pub applied_amount: Decimal,
    /// Charge status just before this payment was booked.
    pub charge_status_before: ChargeStatus,
    pub confidence_score: i32,
    pub is_automatic: bool,
    pub note: Option<String>,
    pub matched_utc: DateTime<Utc>,
    pub reversed_utc: Option<DateTime<Utc>>,
    pub reversal_reason: Option<String>,
}

impl PaymentMatch {
    pub fn is_active(&self) -> bool {
        self.reversed_utc.is_none()
    }
}

/// A single payment applied to a single charge.
///
/// Splitting one transaction over several charges would add more targets
/// here; the applier and stores only handle one.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchApplication {
    pub transaction_id: Uuid,
    pub charge_id: Uuid,
    /// Transaction amount offered.
    pub amount: Decimal,
    /// Portion booked against the charge: the lesser of amount and outstanding.
    pub applied_amount: Decimal,
    /// Slack allowed between amount and outstanding before refusing.
    pub tolerance: Decimal,
    pub confidence_score: i32,
    pub is_automatic: bool,
    pub note: Option<String>,
}

impl MatchApplication {
    pub fn into_match(
        self,
        match_id: Uuid,
        charge_status_before: ChargeStatus,
        matched_utc: DateTime<Utc>,
    ) -> PaymentMatch {
        PaymentMatch {
            match_id,
            transaction_id: self.transaction_id,
            charge_id: self.charge_id,
            applied_amount: self.applied_amount,
            charge_status_before,
            confidence_score: self.confidence_score,
            is_automatic: self.is_automatic,
            note: self.note,
            matched_utc,
            reversed_utc: None,
            reversal_reason: None,
        }
    }
}

// ============================================================================
// Audit Log Models
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchResult {
    Matched,
    Skipped,
    MultipleCandidates,
    NoMatch,
}

impl MatchResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Matched => "matched",
            Self::Skipped => "skipped",
            Self::MultipleCandidates => "multiple_candidates",
            Self::NoMatch => "no_match",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "matched" => Self::Matched,
            "multiple_candidates" => Self::MultipleCandidates,
            "no_match" => Self::NoMatch,
            _ => Self::Skipped,
        }
    }

    /// Outcomes that need a human to look at the transaction.
    pub fn needs_review(&self) -> bool {
        matches!(self, Self::Skipped | Self::MultipleCandidates)
    }
}

/// Per-factor points of one (transaction, charge) pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreFactors {
    pub iban: i32,
    pub name: i32,
    pub amount: i32,
    pub date: i32,
    pub purpose: i32,
}

impl ScoreFactors {
    pub const MAX_TOTAL: i32 = 100;

    pub fn total(&self) -> i32 {
        (self.iban + self.name + self.amount + self.date + self.purpose).min(Self::MAX_TOTAL)
    }
}

/// Immutable audit row for one match attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoMatchLog {
    pub log_id: Uuid,
    pub run_id: Uuid,
    pub transaction_id: Uuid,
    /// Lookup reference only; the log owns its factor snapshot.
    pub charge_id: Option<Uuid>,
    pub owner_id: Uuid,
    pub client_id: Option<Uuid>,
    pub result: MatchResult,
    pub confidence_score: i32,
    pub factors: ScoreFactors,
    pub note: Option<String>,
    pub created_utc: DateTime<Utc>,
}

/// An audit row before the store assigns its id and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAutoMatchLog {
    pub run_id: Uuid,
    pub transaction_id: Uuid,
    pub charge_id: Option<Uuid>,
    pub scope: OwnerScope,
    pub result: MatchResult,
    pub factors: ScoreFactors,
    pub note: Option<String>,
}

impl NewAutoMatchLog {
    pub fn into_log(self, log_id: Uuid, created_utc: DateTime<Utc>) -> AutoMatchLog {
        AutoMatchLog {
            log_id,
            run_id: self.run_id,
            transaction_id: self.transaction_id,
            charge_id: self.charge_id,
            owner_id: self.scope.owner_id,
            client_id: self.scope.client_id,
            result: self.result,
            confidence_score: self.factors.total(),
            factors: self.factors,
            note: self.note,
            created_utc,
        }
    }
}

/// Compliance query over the audit log.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditLogFilter {
    pub scope: OwnerScope,
    pub transaction_id: Option<Uuid>,
    pub result: Option<MatchResult>,
    pub from_utc: Option<DateTime<Utc>>,
    pub to_utc: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

impl AuditLogFilter {
    pub fn for_scope(scope: OwnerScope) -> Self {
        Self {
            scope,
            transaction_id: None,
            result: None,
            from_utc: None,
            to_utc: None,
            limit: 100,
            offset: 0,
        }
    }

    pub fn matches(&self, log: &AutoMatchLog) -> bool {
        log.owner_id == self.scope.owner_id
            && log.client_id == self.scope.client_id
            && self.transaction_id.map_or(true, |id| log.transaction_id == id)
            && self.result.map_or(true, |r| log.result == r)
            && self.from_utc.map_or(true, |from| log.created_utc >= from)
            && self.to_utc.map_or(true, |to| log.created_utc < to)
    }
}
