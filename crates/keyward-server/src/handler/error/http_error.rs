//! Handler-facing error carrying a status kind and optional details.

use std::borrow::Cow;
use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use strum::{EnumIter, IntoStaticStr};

use crate::handler::response::ErrorResponse;

/// Failure returned from a handler or extractor.
///
/// `message` replaces the kind's default client-facing text. `context`
/// only reaches the server log.
#[derive(Debug, Clone)]
#[must_use = "errors do nothing unless serialized"]
pub struct Error<'a> {
    kind: ErrorKind,
    message: Option<Cow<'a, str>>,
    context: Option<Cow<'a, str>>,
}

impl Error<'static> {
    /// Creates an error of the given kind with no details.
    #[inline]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            context: None,
        }
    }
}

impl<'a> Error<'a> {
    /// Replaces the client-facing message.
    pub fn with_message(mut self, message: impl Into<Cow<'a, str>>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Attaches diagnostic context for the server log.
    pub fn with_context(mut self, context: impl Into<Cow<'a, str>>) -> Self {
        self.context = Some(context.into());
        self
    }

    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[inline]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    #[inline]
    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }
}

impl Default for Error<'static> {
    fn default() -> Self {
        Self::new(ErrorKind::default())
    }
}

impl fmt::Display for Error<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = self.kind.status_code();
        match self.message.as_deref() {
            Some(message) => write!(f, "{} {}: {}", status.as_u16(), self.kind, message)?,
            None => write!(f, "{} {}", status.as_u16(), self.kind)?,
        }

        match self.context.as_deref() {
            Some(context) => write!(f, " ({context})"),
            None => Ok(()),
        }
    }
}

impl std::error::Error for Error<'_> {}

impl IntoResponse for Error<'_> {
    fn into_response(self) -> Response {
        let Self {
            kind,
            message,
            context,
        } = self;

        let mut response = kind.response();
        if let Some(message) = message {
            response = response.with_message(message);
        }
        if let Some(context) = context {
            response = response.with_context(context);
        }

        response.into_response()
    }
}

impl aide::OperationOutput for Error<'_> {
    type Inner = Self;
}

impl From<ErrorKind> for Error<'static> {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

/// Handler result defaulting to an owned [`Error`].
pub type Result<T, E = Error<'static>> = std::result::Result<T, E>;

/// Status category of an [`Error`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(IntoStaticStr, EnumIter)]
#[strum(serialize_all = "snake_case")]
#[must_use]
pub enum ErrorKind {
    BadRequest,
    NotFound,
    PayloadTooLarge,
    #[default]
    InternalServerError,
}

impl ErrorKind {
    #[inline]
    pub fn into_error(self) -> Error<'static> {
        Error::new(self)
    }

    /// Shorthand for `Error::new(kind).with_message(..)`.
    pub fn with_message<'a>(self, message: impl Into<Cow<'a, str>>) -> Error<'a> {
        Error::new(self).with_message(message)
    }

    /// Shorthand for `Error::new(kind).with_context(..)`.
    pub fn with_context<'a>(self, context: impl Into<Cow<'a, str>>) -> Error<'a> {
        Error::new(self).with_context(context)
    }

    pub fn status_code(self) -> StatusCode {
        self.response().status
    }

    /// Body template sent for this kind when no message overrides it.
    pub fn response(self) -> ErrorResponse<'static> {
        match self {
            Self::BadRequest => ErrorResponse::BAD_REQUEST,
            Self::NotFound => ErrorResponse::NOT_FOUND,
            Self::PayloadTooLarge => ErrorResponse::PAYLOAD_TOO_LARGE,
            Self::InternalServerError => ErrorResponse::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the snake_case name used in response bodies.
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl IntoResponse for ErrorKind {
    fn into_response(self) -> Response {
        self.response().into_response()
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn defaults_to_internal_server_error() {
        let response = Error::default().into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn details_are_kept() {
        let error = ErrorKind::BadRequest
            .with_message("Invalid JSON syntax in request body")
            .with_context("line 1 column 2");

        assert_eq!(error.kind(), ErrorKind::BadRequest);
        assert_eq!(error.message(), Some("Invalid JSON syntax in request body"));
        assert_eq!(error.context(), Some("line 1 column 2"));
    }

    #[test]
    fn display_includes_status_and_details() {
        let error = ErrorKind::NotFound.with_message("No such route");
        assert_eq!(error.to_string(), "404 not_found: No such route");

        let error = ErrorKind::InternalServerError.with_context("decrypt failed");
        assert_eq!(error.to_string(), "500 internal_server_error (decrypt failed)");
    }

    #[test]
    fn kind_names_match_response_bodies() {
        for kind in ErrorKind::iter() {
            let template = kind.response();
            assert_eq!(template.name, kind.as_str());
            assert!(kind.status_code().is_client_error() || kind.status_code().is_server_error());
            assert_eq!(kind.into_response().status(), kind.status_code());
        }
    }
}
