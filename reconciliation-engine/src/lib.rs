//! Reconciliation engine: matches incoming bank transactions to open rent
//! charges, applies confident matches and keeps an append-only audit trail.

pub mod config;
pub mod error;
pub mod handlers;
pub mod matching;
pub mod models;
pub mod scheduler;
pub mod services;
pub mod startup;
