//! Application startup and lifecycle management.

use crate::config::ReconciliationConfig;
use crate::handlers::{health, reconciliation, AppState};
use crate::matching::Reconciler;
use crate::scheduler::{self, SchedulerHandle};
use crate::services::{init_metrics, LogNotifier, PgStore, ReviewNotifier, WebhookNotifier};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::metrics::metrics_middleware;
use service_core::middleware::tracing::request_id_middleware;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Build the HTTP router over an already assembled state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(health::metrics_handler))
        .route("/reconciliation/runs", post(reconciliation::run_batch))
        .route(
            "/reconciliation/transactions/:id/process",
            post(reconciliation::process_transaction),
        )
        .route(
            "/reconciliation/transactions/:id/suggestions",
            get(reconciliation::suggestions),
        )
        .route(
            "/reconciliation/transactions/:id/manual-match",
            post(reconciliation::manual_match),
        )
        .route(
            "/reconciliation/transactions/:id/reverse",
            post(reconciliation::reverse_match),
        )
        .route(
            "/reconciliation/transactions/:id/ignore",
            post(reconciliation::ignore_transaction),
        )
        .route(
            "/reconciliation/audit-logs",
            get(reconciliation::list_audit_logs),
        )
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

fn build_notifier(config: &ReconciliationConfig) -> Result<Arc<dyn ReviewNotifier>, AppError> {
    match &config.review_webhook_url {
        Some(url) => {
            tracing::info!(url = %url, "Review notifications go to webhook");
            Ok(Arc::new(WebhookNotifier::new(url.clone())?))
        }
        None => {
            tracing::info!("Review webhook not configured - notifications are logged only");
            Ok(Arc::new(LogNotifier))
        }
    }
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
    config: ReconciliationConfig,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: ReconciliationConfig) -> Result<Self, AppError> {
        Self::build_internal(config, true).await
    }

    /// Build the application without running migrations.
    /// Use this in tests when migrations are already applied by the test harness.
    pub async fn build_without_migrations(config: ReconciliationConfig) -> Result<Self, AppError> {
        Self::build_internal(config, false).await
    }

    async fn build_internal(
        config: ReconciliationConfig,
        run_migrations: bool,
    ) -> Result<Self, AppError> {
        init_metrics();

        let store = PgStore::new(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
            e
        })?;

        if run_migrations {
            store.run_migrations().await.map_err(|e| {
                tracing::error!(error = %e, "Failed to run migrations");
                e
            })?;
        }

        let notifier = build_notifier(&config)?;
        let reconciler = Arc::new(Reconciler::new(
            Arc::new(store),
            notifier,
            config.matching.clone(),
        ));
        let state = AppState::new(reconciler, config.scheduler.batch_limit);

        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port = port, "Reconciliation engine listener bound");

        Ok(Self {
            port,
            listener,
            state,
            config,
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.state.reconciler
    }

    /// Serve HTTP and run the scheduler until `shutdown` resolves.
    pub async fn run_until_stopped<F>(self, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let scheduler: Option<SchedulerHandle> =
            scheduler::spawn(self.state.reconciler.clone(), &self.config.scheduler);
        if scheduler.is_none() {
            tracing::info!("Reconciliation scheduler disabled");
        }

        tracing::info!(
            service = "reconciliation-engine",
            version = env!("CARGO_PKG_VERSION"),
            port = self.port,
            "Service ready to accept connections"
        );

        let result = axum::serve(self.listener, router(self.state))
            .with_graceful_shutdown(shutdown)
            .await;

        if let Some(scheduler) = scheduler {
            scheduler.shutdown().await;
        }

        result.map_err(|e| {
            tracing::error!(error = %e, "HTTP server error");
            std::io::Error::other(format!("HTTP server error: {}", e))
        })
    }
}
