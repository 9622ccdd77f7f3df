//! HTTP handlers for reconciliation-engine.

pub mod health;
pub mod reconciliation;
pub mod scope;

use crate::matching::Reconciler;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub reconciler: Arc<Reconciler>,
    /// Default number of transactions per batch run.
    pub batch_limit: i64,
}

impl AppState {
    pub fn new(reconciler: Arc<Reconciler>, batch_limit: i64) -> Self {
        Self {
            reconciler,
            batch_limit,
        }
    }
}
