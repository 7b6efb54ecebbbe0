use std::borrow::Cow;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use schemars::JsonSchema;
use serde::Serialize;

/// JSON body of every non-2xx response.
///
/// `context` and `status` never leave the server: the first is logged,
/// the second becomes the response status line.
#[must_use = "error responses do nothing unless serialized"]
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ErrorResponse<'a> {
    /// Stable snake_case identifier, e.g. `bad_request`.
    pub name: Cow<'a, str>,
    /// Human readable description.
    pub message: Cow<'a, str>,

    #[serde(skip)]
    pub context: Option<Cow<'a, str>>,
    #[serde(skip)]
    pub status: StatusCode,
}

impl<'a> ErrorResponse<'a> {
    pub const BAD_REQUEST: Self = Self::new(
        "bad_request",
        "The request body could not be read.",
        StatusCode::BAD_REQUEST,
    );
    pub const NOT_FOUND: Self = Self::new(
        "not_found",
        "No route matches this request.",
        StatusCode::NOT_FOUND,
    );
    pub const PAYLOAD_TOO_LARGE: Self = Self::new(
        "payload_too_large",
        "The request body exceeds the size limit.",
        StatusCode::PAYLOAD_TOO_LARGE,
    );
    pub const INTERNAL_SERVER_ERROR: Self = Self::new(
        "internal_server_error",
        "The request could not be processed.",
        StatusCode::INTERNAL_SERVER_ERROR,
    );

    pub const fn new(name: &'a str, message: &'a str, status: StatusCode) -> Self {
        Self {
            name: Cow::Borrowed(name),
            message: Cow::Borrowed(message),
            context: None,
            status,
        }
    }

    /// Replaces the client-facing message.
    pub fn with_message(self, message: impl Into<Cow<'a, str>>) -> Self {
        Self {
            message: message.into(),
            ..self
        }
    }

    /// Adds log-only context. Repeated calls are joined with `; `.
    pub fn with_context(mut self, context: impl Into<Cow<'a, str>>) -> Self {
        let context = context.into();
        self.context = match self.context.take() {
            None => Some(context),
            Some(previous) => Some(format!("{previous}; {context}").into()),
        };
        self
    }
}

impl Default for ErrorResponse<'_> {
    fn default() -> Self {
        Self::INTERNAL_SERVER_ERROR
    }
}

impl IntoResponse for ErrorResponse<'_> {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::warn!(
                status = self.status.as_u16(),
                name = %self.name,
                context = self.context.as_deref().unwrap_or_default(),
                "request failed"
            );
        } else {
            tracing::debug!(
                status = self.status.as_u16(),
                name = %self.name,
                context = self.context.as_deref().unwrap_or_default(),
                "request rejected"
            );
        }

        (self.status, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_is_replaced() {
        let response = ErrorResponse::BAD_REQUEST.with_message("Missing text field");
        assert_eq!(response.message, "Missing text field");
        assert_eq!(response.name, "bad_request");
    }

    #[test]
    fn context_accumulates() {
        let response = ErrorResponse::default()
            .with_context("unprotect")
            .with_context("authentication tag mismatch");

        assert_eq!(
            response.context.as_deref(),
            Some("unprotect; authentication tag mismatch")
        );
    }

    #[test]
    fn only_name_and_message_are_serialized() -> anyhow::Result<()> {
        let response = ErrorResponse::INTERNAL_SERVER_ERROR.with_context("key k-1 revoked");
        let value = serde_json::to_value(&response)?;

        assert_eq!(
            value,
            serde_json::json!({
                "name": "internal_server_error",
                "message": "The request could not be processed.",
            })
        );
        Ok(())
    }

    #[test]
    fn status_is_preserved() {
        let response = ErrorResponse::NOT_FOUND.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
