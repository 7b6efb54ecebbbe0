//! Turns handler panics and slow requests into 500 responses.

use std::any::Any;
use std::time::Duration;

use axum::Router;
use axum::error_handling::HandleErrorLayer;
use axum::response::{IntoResponse, Response};
#[cfg(feature = "config")]
use clap::Args;
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower::timeout::TimeoutLayer;
use tower::timeout::error::Elapsed;
use tower_http::catch_panic::CatchPanicLayer;

use crate::handler::ErrorKind;

const TRACING_TARGET: &str = "keyward_server::middleware::recovery";

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Request deadline enforced by [`RouterRecoveryExt`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
#[must_use = "config does nothing unless you use it"]
pub struct RecoveryConfig {
    /// Seconds a request may run before it is answered with a 500.
    #[cfg_attr(
        feature = "config",
        arg(long, env = "REQUEST_TIMEOUT", default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS)
    )]
    pub request_timeout: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self::with_timeout_secs(DEFAULT_REQUEST_TIMEOUT_SECS)
    }
}

impl RecoveryConfig {
    pub fn with_timeout_secs(request_timeout: u64) -> Self {
        Self { request_timeout }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }
}

pub trait RouterRecoveryExt<S> {
    /// Answers panics and requests running past the deadline with a 500.
    fn with_recovery(self, config: &RecoveryConfig) -> Self;

    fn with_default_recovery(self) -> Self;
}

impl<S> RouterRecoveryExt<S> for Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_recovery(self, config: &RecoveryConfig) -> Self {
        self.layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(on_layer_error))
                .layer(CatchPanicLayer::custom(on_panic))
                .layer(TimeoutLayer::new(config.request_timeout())),
        )
    }

    fn with_default_recovery(self) -> Self {
        self.with_recovery(&RecoveryConfig::default())
    }
}

async fn on_layer_error(err: tower::BoxError) -> Response {
    if err.is::<Elapsed>() {
        tracing::error!(target: TRACING_TARGET, "request deadline exceeded");
        return ErrorKind::InternalServerError
            .with_context("request deadline exceeded")
            .into_response();
    }

    tracing::error!(target: TRACING_TARGET, error = %err, "middleware failure");
    ErrorKind::InternalServerError
        .with_context(err.to_string())
        .into_response()
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else if let Some(message) = panic.downcast_ref::<&str>() {
        *message
    } else {
        "non-string panic payload"
    }
}

fn on_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    // The panic text stays in the log; clients see the generic body.
    tracing::error!(
        target: TRACING_TARGET,
        panic = panic_message(panic.as_ref()),
        "handler panicked"
    );
    ErrorKind::InternalServerError.into_response()
}
