//! CORS, hardening response headers and request size limits.

use std::time::Duration;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::header::{self, HeaderName, HeaderValue};
use axum::http::Method;
#[cfg(feature = "config")]
use clap::Args;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::set_header::SetResponseHeaderLayer;

const TRACING_TARGET: &str = "keyward_server::middleware::security";

/// Largest request body accepted, in bytes.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Origins allowed when none are configured.
const LOCAL_ORIGINS: [&str; 4] = [
    "http://localhost:3000",
    "http://localhost:8080",
    "http://127.0.0.1:3000",
    "http://127.0.0.1:8080",
];

/// Headers set on every response regardless of configuration.
const FIXED_HEADERS: [(HeaderName, &str); 4] = [
    (header::X_FRAME_OPTIONS, "DENY"),
    (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
    (header::REFERRER_POLICY, "no-referrer"),
    (header::CACHE_CONTROL, "no-store"),
];

pub trait RouterSecurityExt<S> {
    /// Applies CORS, the body size limit and hardening headers.
    fn with_security(self, cors: &CorsConfig, headers: &SecurityHeadersConfig) -> Self;

    /// Localhost-only CORS with default HSTS.
    fn with_default_security(self) -> Self;
}

impl<S> RouterSecurityExt<S> for Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_security(self, cors: &CorsConfig, headers: &SecurityHeadersConfig) -> Self {
        let mut router = self
            .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
            .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
            .layer(cors.layer());

        for (name, value) in FIXED_HEADERS {
            router = router.layer(SetResponseHeaderLayer::overriding(
                name,
                HeaderValue::from_static(value),
            ));
        }

        router.layer(SetResponseHeaderLayer::overriding(
            header::STRICT_TRANSPORT_SECURITY,
            headers.hsts(),
        ))
    }

    fn with_default_security(self) -> Self {
        self.with_security(&CorsConfig::default(), &SecurityHeadersConfig::default())
    }
}

/// Cross-origin policy for browser clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
#[must_use = "config does nothing unless you use it"]
pub struct CorsConfig {
    /// Comma separated origins. Localhost origins are used when empty.
    #[cfg_attr(
        feature = "config",
        arg(long, env = "CORS_ORIGINS", value_delimiter = ',')
    )]
    pub allowed_origins: Vec<String>,

    /// Seconds a browser may cache a preflight response.
    #[cfg_attr(
        feature = "config",
        arg(long, env = "CORS_MAX_AGE", default_value_t = 3600)
    )]
    pub max_age_seconds: u64,

    #[cfg_attr(
        feature = "config",
        arg(long, env = "CORS_ALLOW_CREDENTIALS", default_value_t = false)
    )]
    pub allow_credentials: bool,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: Vec::new(),
            max_age_seconds: 3600,
            allow_credentials: false,
        }
    }
}

impl CorsConfig {
    /// Parsed allowed origins. Unparseable entries are logged and dropped.
    pub fn origins(&self) -> Vec<HeaderValue> {
        if self.allowed_origins.is_empty() {
            return LOCAL_ORIGINS.map(HeaderValue::from_static).to_vec();
        }

        let mut origins = Vec::with_capacity(self.allowed_origins.len());
        for origin in &self.allowed_origins {
            match HeaderValue::from_str(origin) {
                Ok(value) => origins.push(value),
                Err(_) => tracing::warn!(target: TRACING_TARGET, %origin, "dropping invalid cors origin"),
            }
        }
        origins
    }

    fn layer(&self) -> CorsLayer {
        CorsLayer::new()
            .allow_origin(self.origins())
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::ACCEPT, header::CONTENT_TYPE])
            .allow_credentials(self.allow_credentials)
            .max_age(Duration::from_secs(self.max_age_seconds))
    }
}

/// Strict-Transport-Security policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[must_use = "config does nothing unless you use it"]
pub struct SecurityHeadersConfig {
    pub hsts_max_age_seconds: u64,
    pub hsts_include_subdomains: bool,
}

impl Default for SecurityHeadersConfig {
    fn default() -> Self {
        Self {
            hsts_max_age_seconds: 365 * 24 * 60 * 60,
            hsts_include_subdomains: true,
        }
    }
}

impl SecurityHeadersConfig {
    /// Value of the `Strict-Transport-Security` header.
    pub fn hsts(&self) -> HeaderValue {
        let mut value = format!("max-age={}", self.hsts_max_age_seconds);
        if self.hsts_include_subdomains {
            value.push_str("; includeSubDomains");
        }
        // Digits and ASCII only, always a valid header value.
        HeaderValue::try_from(value).unwrap_or(HeaderValue::from_static("max-age=0"))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum_test::TestServer;

    use super::*;

    #[test]
    fn empty_origins_mean_localhost() {
        let origins = CorsConfig::default().origins();
        assert_eq!(origins.len(), LOCAL_ORIGINS.len());
        assert!(origins.iter().any(|o| o == "http://127.0.0.1:8080"));
    }

    #[test]
    fn invalid_origins_are_dropped() {
        let config = CorsConfig {
            allowed_origins: vec!["https://app.example".to_owned(), "bad\norigin".to_owned()],
            ..CorsConfig::default()
        };

        assert_eq!(config.origins(), vec![HeaderValue::from_static("https://app.example")]);
    }

    #[test]
    fn hsts_value() {
        let mut config = SecurityHeadersConfig::default();
        assert_eq!(config.hsts(), "max-age=31536000; includeSubDomains");

        config.hsts_include_subdomains = false;
        config.hsts_max_age_seconds = 60;
        assert_eq!(config.hsts(), "max-age=60");
    }

    #[tokio::test]
    async fn hardening_headers_are_set() -> anyhow::Result<()> {
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .with_default_security();
        let server = TestServer::new(app)?;

        let response = server.get("/").await;
        response.assert_status_ok();
        for (name, value) in FIXED_HEADERS {
            let actual = response.headers().get(&name).map(|v| v.as_bytes());
            assert_eq!(actual, Some(value.as_bytes()));
        }
        assert!(response.headers().contains_key(header::STRICT_TRANSPORT_SECURITY));
        Ok(())
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() -> anyhow::Result<()> {
        let app = Router::new()
            .route("/", post(|body: String| async move { body.len().to_string() }))
            .with_default_security();
        let server = TestServer::new(app)?;

        server
            .post("/")
            .text("x".repeat(MAX_BODY_BYTES + 1))
            .await
            .assert_status(StatusCode::PAYLOAD_TOO_LARGE);
        Ok(())
    }
}
