//! Domain errors raised by the matching pipeline.

use rust_decimal::Decimal;
use service_core::error::AppError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The transaction is no longer `unmatched`; somebody else applied it first.
    #[error("transaction {0} already has an active match")]
    DuplicateMatch(Uuid),

    #[error("payment of {amount} exceeds outstanding {outstanding} on charge {charge_id}")]
    Overpayment {
        charge_id: Uuid,
        amount: Decimal,
        outstanding: Decimal,
    },

    #[error("transaction {0} cannot be reconciled")]
    NotReconcilable(Uuid),

    #[error("charge {0} does not accept payments")]
    ChargeClosed(Uuid),

    #[error("transaction {0} not found")]
    TransactionNotFound(Uuid),

    #[error("charge {0} not found")]
    ChargeNotFound(Uuid),

    #[error("transaction {0} has no active match")]
    NoActiveMatch(Uuid),

    #[error(transparent)]
    Storage(#[from] AppError),
}

impl ReconcileError {
    /// Policy refusals leave everything untouched and are audited as `skipped`.
    pub fn is_refusal(&self) -> bool {
        matches!(
            self,
            Self::DuplicateMatch(_)
                | Self::Overpayment { .. }
                | Self::NotReconcilable(_)
                | Self::ChargeClosed(_)
        )
    }

    /// Label used for metrics and audit notes.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::DuplicateMatch(_) => "duplicate_match",
            Self::Overpayment { .. } => "overpayment",
            Self::NotReconcilable(_) => "not_reconcilable",
            Self::ChargeClosed(_) => "charge_closed",
            Self::TransactionNotFound(_) => "transaction_not_found",
            Self::ChargeNotFound(_) => "charge_not_found",
            Self::NoActiveMatch(_) => "no_active_match",
            Self::Storage(e) => e.kind(),
        }
    }
}

impl From<ReconcileError> for AppError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::Storage(inner) => inner,
            ReconcileError::TransactionNotFound(_) | ReconcileError::ChargeNotFound(_) => {
                AppError::NotFound(anyhow::anyhow!(err.to_string()))
            }
            ReconcileError::DuplicateMatch(_) | ReconcileError::NoActiveMatch(_) => {
                AppError::Conflict(anyhow::anyhow!(err.to_string()))
            }
            ReconcileError::Overpayment { .. }
            | ReconcileError::NotReconcilable(_)
            | ReconcileError::ChargeClosed(_) => {
                AppError::Unprocessable(anyhow::anyhow!(err.to_string()))
            }
        }
    }
}
