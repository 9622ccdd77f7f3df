//! Human-review notifications for transactions the engine would not settle.

use crate::models::MatchResult;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use service_core::error::AppError;
use service_core::retry::{retry_with_backoff, RetryConfig};
use std::time::Duration;
use uuid::Uuid;

/// One transaction that needs an operator's attention.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewEvent {
    pub run_id: Uuid,
    pub transaction_id: Uuid,
    pub owner_id: Uuid,
    pub client_id: Option<Uuid>,
    pub result: MatchResult,
    pub charge_id: Option<Uuid>,
    pub confidence_score: i32,
    pub reason: Option<String>,
}

#[async_trait]
pub trait ReviewNotifier: Send + Sync {
    async fn notify(&self, event: &ReviewEvent) -> Result<(), AppError>;
}

/// Writes review events to the structured log only.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl ReviewNotifier for LogNotifier {
    async fn notify(&self, event: &ReviewEvent) -> Result<(), AppError> {
        tracing::info!(
            run_id = %event.run_id,
            transaction_id = %event.transaction_id,
            owner_id = %event.owner_id,
            result = event.result.as_str(),
            confidence_score = event.confidence_score,
            reason = event.reason.as_deref().unwrap_or(""),
            "Transaction needs manual review"
        );
        Ok(())
    }
}

/// POSTs review events as JSON to a configured URL.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
    retry: RetryConfig,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
            retry: RetryConfig::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    async fn post(&self, event: &ReviewEvent) -> Result<(), AppError> {
        let response = self
            .client
            .post(&self.url)
            .json(event)
            .send()
            .await
            .map_err(|e| AppError::BadGateway(format!("Review webhook unreachable: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else if status.is_server_error() || status.as_u16() == 429 {
            Err(AppError::BadGateway(format!(
                "Review webhook returned {}",
                status
            )))
        } else {
            Err(AppError::InternalError(anyhow::anyhow!(
                "Review webhook rejected event with {}",
                status
            )))
        }
    }
}

#[async_trait]
impl ReviewNotifier for WebhookNotifier {
    async fn notify(&self, event: &ReviewEvent) -> Result<(), AppError> {
        retry_with_backoff(
            &self.retry,
            "review_webhook",
            |e: &AppError| matches!(e, AppError::BadGateway(_)),
            || self.post(event),
        )
        .await
    }
}

/// Collects events in memory; used by tests and local runs.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    events: std::sync::Mutex<Vec<ReviewEvent>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ReviewEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ReviewNotifier for MemoryNotifier {
    async fn notify(&self, event: &ReviewEvent) -> Result<(), AppError> {
        self.events
            .lock()
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Notifier mutex poisoned: {}", e)))?
            .push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> ReviewEvent {
        ReviewEvent {
            run_id: Uuid::new_v4(),
            transaction_id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            client_id: None,
            result: MatchResult::MultipleCandidates,
            charge_id: Some(Uuid::new_v4()),
            confidence_score: 85,
            reason: None,
        }
    }

    #[tokio::test]
    async fn memory_notifier_keeps_events_in_order() {
        let notifier = MemoryNotifier::new();
        let first = event();
        let second = event();
        notifier.notify(&first).await.unwrap();
        notifier.notify(&second).await.unwrap();
        assert_eq!(notifier.events(), vec![first, second]);
    }

    #[tokio::test]
    async fn unreachable_webhook_fails_after_retries() {
        let notifier = WebhookNotifier::new("http://127.0.0.1:9/review")
            .unwrap()
            .with_retry(RetryConfig {
                max_retries: 1,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(1),
                backoff_multiplier: 1.0,
            });
        let err = notifier.notify(&event()).await.unwrap_err();
        assert!(matches!(err, AppError::BadGateway(_)));
    }

    #[test]
    fn event_serializes_result_as_snake_case() {
        let json = serde_json::to_value(event()).unwrap();
        assert_eq!(json["result"], "multiple_candidates");
    }
}
