//! Owner/client scope resolved once per request.
//!
//! The gateway in front of the engine authenticates the caller and forwards
//! the owner (and, for property managers acting for a client, the client) as
//! headers. Every reconciliation endpoint is confined to that scope.

use crate::models::OwnerScope;
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use service_core::error::AppError;
use uuid::Uuid;

pub const OWNER_ID_HEADER: &str = "x-owner-id";
pub const CLIENT_ID_HEADER: &str = "x-client-id";

fn header_uuid(parts: &Parts, name: &str) -> Result<Option<Uuid>, AppError> {
    let Some(value) = parts.headers.get(name) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| AppError::BadRequest(anyhow::anyhow!("{} header is not valid text", name)))?;
    Uuid::parse_str(value.trim())
        .map(Some)
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!("{} header is not a UUID: {}", name, e)))
}

#[async_trait]
impl<S> FromRequestParts<S> for OwnerScope
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let owner_id = header_uuid(parts, OWNER_ID_HEADER)?.ok_or_else(|| {
            AppError::BadRequest(anyhow::anyhow!("Missing {} header", OWNER_ID_HEADER))
        })?;
        let client_id = header_uuid(parts, CLIENT_ID_HEADER)?;

        let span = tracing::Span::current();
        span.record("owner_id", tracing::field::display(owner_id));
        if let Some(client_id) = client_id {
            span.record("client_id", tracing::field::display(client_id));
        }

        Ok(OwnerScope::new(owner_id, client_id))
    }
}
