//! Time-limited protection handlers.
//!
//! `/api/protect` turns plaintext into a payload that can be unprotected
//! until its lifetime has passed. `/api/unprotect` reverses it. Every
//! protection failure, including an expired or tampered payload, is
//! reported as a bare 500 with the cause only in the logs.

use aide::axum::ApiRouter;
use aide::transform::TransformOperation;
use axum::extract::State;
use axum::http::StatusCode;
use keyward_core::protection::TimeLimitedProtector;

use crate::extract::Json;
use crate::handler::Result;
use crate::handler::request::Message;
use crate::handler::response::ErrorResponse;
use crate::service::{PayloadLifetime, ServiceState};

/// Tracing target for protection operations.
const TRACING_TARGET: &str = "keyward_server::handler::protection";

/// Protects the text for the configured payload lifetime.
#[tracing::instrument(skip_all)]
async fn protect(
    State(protector): State<TimeLimitedProtector>,
    State(payload_lifetime): State<PayloadLifetime>,
    Json(request): Json<Message>,
) -> Result<(StatusCode, Json<Message>)> {
    tracing::debug!(target: TRACING_TARGET, "Protecting message");

    let payload = protector
        .protect_str(&request.text, *payload_lifetime)
        .await?;

    tracing::debug!(
        target: TRACING_TARGET,
        lifetime_secs = payload_lifetime.as_secs(),
        "Message protected"
    );

    Ok((StatusCode::OK, Json(Message::new(payload))))
}

fn protect_docs(op: TransformOperation) -> TransformOperation {
    op.summary("Protect text")
        .description(
            "Returns an opaque, tamper-evident payload for the given text. The payload \
             can be unprotected until the configured lifetime has passed.",
        )
        .response::<200, Json<Message>>()
        .response::<400, Json<ErrorResponse>>()
        .response::<500, Json<ErrorResponse>>()
}

/// Unprotects a payload created by [`protect`].
#[tracing::instrument(skip_all)]
async fn unprotect(
    State(protector): State<TimeLimitedProtector>,
    Json(request): Json<Message>,
) -> Result<(StatusCode, Json<Message>)> {
    tracing::debug!(target: TRACING_TARGET, "Unprotecting message");

    let plaintext = protector.unprotect_str(&request.text).await?;

    tracing::debug!(target: TRACING_TARGET, "Message unprotected");

    Ok((StatusCode::OK, Json(Message::new(plaintext))))
}

fn unprotect_docs(op: TransformOperation) -> TransformOperation {
    op.summary("Unprotect text")
        .description(
            "Returns the text inside a payload created by the protect endpoint. Fails \
             when the payload was tampered with, belongs to a revoked key, or has expired.",
        )
        .response::<200, Json<Message>>()
        .response::<400, Json<ErrorResponse>>()
        .response::<500, Json<ErrorResponse>>()
}

/// Returns a [`Router`] with all protection routes.
///
/// [`Router`]: axum::routing::Router
pub fn routes() -> ApiRouter<ServiceState> {
    use aide::axum::routing::*;

    ApiRouter::new()
        .api_route("/api/protect", post_with(protect, protect_docs))
        .api_route("/api/unprotect", post_with(unprotect, unprotect_docs))
        .with_path_items(|item| item.tag("Protection"))
}
