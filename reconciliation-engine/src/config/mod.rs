//! Configuration module for reconciliation-engine.
//!
//! Infrastructure settings come from the environment; the matching policy is a
//! `[matching]` table in the layered `configuration` file, overridable through
//! `APP__MATCHING__*` variables.

use rust_decimal::Decimal;
use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ReconciliationConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub scheduler: SchedulerConfig,
    pub review_webhook_url: Option<String>,
    pub matching: MatchingPolicy,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// `None` disables periodic runs.
    pub interval: Option<Duration>,
    pub batch_limit: i64,
}

impl ReconciliationConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        let matching = MatchingPolicy::load()?;

        let interval_secs: u64 = env::var("RECONCILIATION_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "reconciliation-engine".to_string()),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!("DATABASE_URL is required"))
                })?,
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
                min_connections: env::var("DATABASE_MIN_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(2),
            },
            scheduler: SchedulerConfig {
                interval: (interval_secs > 0).then(|| Duration::from_secs(interval_secs)),
                batch_limit: env::var("RECONCILIATION_BATCH_LIMIT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(500),
            },
            review_webhook_url: env::var("REVIEW_WEBHOOK_URL").ok().filter(|s| !s.is_empty()),
            matching,
        })
    }
}

/// Points each factor contributes at full credit.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub iban: i32,
    pub name: i32,
    pub amount: i32,
    pub date: i32,
    pub purpose: i32,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            iban: 40,
            name: 25,
            amount: 20,
            date: 10,
            purpose: 5,
        }
    }
}

/// Upper bound for every day-count setting: ten years.
pub const MAX_WINDOW_DAYS: i64 = 3650;

/// Tunable scoring and decision parameters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MatchingPolicy {
    pub weights: ScoreWeights,
    /// Minimum total for an automatic match.
    pub auto_match_threshold: i32,
    /// Runner-up closer than this to the best blocks automatic matching.
    pub tie_margin: i32,
    /// Minimum total for a candidate to be shown as a suggestion.
    pub suggestion_threshold: i32,
    /// Charges due up to this many days before the booking date are candidates.
    pub max_days_late: i64,
    /// Charges due up to this many days after the booking date are candidates.
    pub max_days_early: i64,
    /// Payments within this many days of the due date get full date credit.
    pub on_time_days: i64,
    /// Differences up to this are treated as an exact amount.
    pub amount_tolerance: Decimal,
    /// Relative band, in percent, over which amount credit decays to zero.
    pub amount_band_percent: Decimal,
    /// Minimum edit-distance similarity for two name tokens to count as equal.
    pub name_token_similarity: f64,
    pub rent_keywords: Vec<String>,
    pub rent_keyword_points: i32,
}

impl Default for MatchingPolicy {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::default(),
            auto_match_threshold: 80,
            tie_margin: 10,
            suggestion_threshold: 30,
            max_days_late: 90,
            max_days_early: 30,
            on_time_days: 5,
            amount_tolerance: Decimal::new(1, 2),
            amount_band_percent: Decimal::new(5, 0),
            name_token_similarity: 0.85,
            rent_keywords: vec![
                "miete".to_string(),
                "rent".to_string(),
                "mietzahlung".to_string(),
            ],
            rent_keyword_points: 1,
        }
    }
}

impl MatchingPolicy {
    pub fn load() -> Result<Self, AppError> {
        Self::load_from(core_config::CONFIG_FILE)
    }

    pub fn load_from(file: &str) -> Result<Self, AppError> {
        let policy: Self = core_config::load_section(file, "matching")?;
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        let w = &self.weights;
        if [w.iban, w.name, w.amount, w.date, w.purpose]
            .iter()
            .any(|p| *p < 0)
        {
            return Err(invalid("weights must not be negative"));
        }
        if !(0..=100).contains(&self.auto_match_threshold) {
            return Err(invalid("auto_match_threshold must be within 0..=100"));
        }
        if self.tie_margin < 0 {
            return Err(invalid("tie_margin must not be negative"));
        }
        let day_range = 0..=MAX_WINDOW_DAYS;
        if ![self.max_days_late, self.max_days_early, self.on_time_days]
            .iter()
            .all(|days| day_range.contains(days))
        {
            return Err(invalid("date windows must be within 0..=3650 days"));
        }
        if self.amount_tolerance < Decimal::ZERO || self.amount_band_percent < Decimal::ZERO {
            return Err(invalid("amount tolerances must not be negative"));
        }
        if !(0.0..=1.0).contains(&self.name_token_similarity) {
            return Err(invalid("name_token_similarity must be within 0..=1"));
        }
        Ok(())
    }
}

fn invalid(msg: &str) -> AppError {
    AppError::ConfigError(anyhow::anyhow!("invalid [matching] section: {}", msg))
}
