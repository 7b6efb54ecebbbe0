use aide::generate::GenContext;
use aide::openapi::{Operation, Response as ApiResponse};
use aide::{OperationInput, OperationOutput};
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Json as AxumJson, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use derive_more::{Deref, DerefMut, From};
use schemars::JsonSchema;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::handler::{Error, ErrorKind};

/// Longest rejection detail kept in the error context.
const MAX_DETAIL_CHARS: usize = 200;

/// [`axum::Json`] whose rejections use the server's error body.
#[must_use]
#[derive(Debug, Clone, Copy, Default, Deref, DerefMut, From)]
pub struct Json<T>(pub T);

impl<T, S> FromRequest<S> for Json<T>
where
    T: DeserializeOwned + 'static,
    S: Send + Sync,
{
    type Rejection = Error<'static>;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match <AxumJson<T> as FromRequest<S>>::from_request(req, state).await {
            Ok(AxumJson(value)) => Ok(Self(value)),
            Err(rejection) => Err(rejection.into()),
        }
    }
}

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        AxumJson(self.0).into_response()
    }
}

impl From<JsonRejection> for Error<'static> {
    fn from(rejection: JsonRejection) -> Self {
        let detail = shorten(&rejection.body_text());
        let (kind, message) = match &rejection {
            JsonRejection::JsonDataError(_) => {
                (ErrorKind::BadRequest, "Request body does not match the expected shape")
            }
            JsonRejection::JsonSyntaxError(_) => {
                (ErrorKind::BadRequest, "Request body is not valid JSON")
            }
            JsonRejection::MissingJsonContentType(_) => {
                (ErrorKind::BadRequest, "Content-Type must be application/json")
            }
            JsonRejection::BytesRejection(err) if err.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                (ErrorKind::PayloadTooLarge, "Request body is too large")
            }
            JsonRejection::BytesRejection(_) => {
                (ErrorKind::BadRequest, "Request body could not be read")
            }
            _ => (ErrorKind::InternalServerError, "Request body could not be processed"),
        };

        kind.with_message(message).with_context(detail)
    }
}

/// First three lines of `text`, joined and cut to [`MAX_DETAIL_CHARS`].
fn shorten(text: &str) -> String {
    text.lines()
        .take(3)
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(MAX_DETAIL_CHARS)
        .collect()
}

impl<T: JsonSchema> OperationInput for Json<T> {
    fn operation_input(ctx: &mut GenContext, operation: &mut Operation) {
        AxumJson::<T>::operation_input(ctx, operation);
    }

    fn inferred_early_responses(
        ctx: &mut GenContext,
        operation: &mut Operation,
    ) -> Vec<(Option<u16>, ApiResponse)> {
        AxumJson::<T>::inferred_early_responses(ctx, operation)
    }
}

impl<T: JsonSchema + Serialize> OperationOutput for Json<T> {
    type Inner = T;

    fn operation_response(ctx: &mut GenContext, operation: &mut Operation) -> Option<ApiResponse> {
        AxumJson::<T>::operation_response(ctx, operation)
    }

    fn inferred_responses(
        ctx: &mut GenContext,
        operation: &mut Operation,
    ) -> Vec<(Option<u16>, ApiResponse)> {
        AxumJson::<T>::inferred_responses(ctx, operation)
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::header::CONTENT_TYPE;
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize)]
    struct Text {
        text: String,
    }

    fn request(content_type: Option<&str>, body: &'static str) -> Request {
        let mut builder = Request::builder().method("POST").uri("/");
        if let Some(content_type) = content_type {
            builder = builder.header(CONTENT_TYPE, content_type);
        }
        builder.body(Body::from(body)).unwrap()
    }

    async fn rejection(req: Request) -> Error<'static> {
        Json::<Text>::from_request(req, &()).await.unwrap_err()
    }

    #[test]
    fn details_are_shortened() {
        assert_eq!(shorten(&"x".repeat(500)).len(), MAX_DETAIL_CHARS);
        assert_eq!(shorten("a\nb\nc\nd\ne"), "a b c");
    }

    #[tokio::test]
    async fn accepts_matching_body() {
        let req = request(Some("application/json"), r#"{"text":"hello"}"#);
        let Json(value) = Json::<Text>::from_request(req, &()).await.unwrap();
        assert_eq!(value.text, "hello");
    }

    #[tokio::test]
    async fn syntax_error_is_bad_request() {
        let error = rejection(request(Some("application/json"), "{not json")).await;
        assert_eq!(error.kind(), ErrorKind::BadRequest);
        assert_eq!(error.message(), Some("Request body is not valid JSON"));
    }

    #[tokio::test]
    async fn missing_field_is_bad_request() {
        let error = rejection(request(Some("application/json"), r#"{"other":1}"#)).await;
        assert_eq!(error.kind(), ErrorKind::BadRequest);
        assert!(error.context().is_some_and(|c| c.contains("text")));
    }

    #[tokio::test]
    async fn missing_content_type_is_bad_request() {
        let error = rejection(request(None, r#"{"text":"hello"}"#)).await;
        assert_eq!(error.kind(), ErrorKind::BadRequest);
    }
}
