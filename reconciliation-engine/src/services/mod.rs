//! Storage, notification and metrics services for reconciliation-engine.

pub mod database;
pub mod memory;
pub mod metrics;
pub mod notifier;
pub mod store;

pub use database::PgStore;
pub use memory::InMemoryStore;
pub use metrics::{
    get_metrics, init_metrics, record_apply_refusal, record_batch_run, record_error,
    record_match_outcome, record_review_notification,
};
pub use notifier::{LogNotifier, MemoryNotifier, ReviewEvent, ReviewNotifier, WebhookNotifier};
pub use store::ReconciliationStore;
