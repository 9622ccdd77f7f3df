//! The matching pipeline: select, score, decide, apply, audit.

pub mod applier;
pub mod audit;
pub mod orchestrator;
pub mod policy;
pub mod scorer;
pub mod selector;
pub mod text;

pub use orchestrator::{BatchSummary, Reconciler, RunTrigger, TransactionOutcome};
pub use policy::{decide, Decision};
pub use scorer::{score, ScoredCandidate};
pub use selector::DueWindow;
