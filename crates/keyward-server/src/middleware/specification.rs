//! OpenAPI document and Scalar reference UI.

use aide::axum::ApiRouter;
use aide::openapi::{Info, License, OpenApi};
use aide::scalar::Scalar;
use axum::routing::{Router, get};
use axum::{Extension, Json};
#[cfg(feature = "config")]
use clap::Args;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const DEFAULT_OPENAPI_JSON_PATH: &str = "/api/openapi.json";
const DEFAULT_SCALAR_UI_PATH: &str = "/api/scalar";

/// Where the generated document and its UI are mounted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
#[must_use = "config does nothing unless you use it"]
pub struct OpenApiConfig {
    /// Route serving the OpenAPI JSON document.
    #[cfg_attr(
        feature = "config",
        arg(long, env = "OPENAPI_JSON_PATH", default_value = DEFAULT_OPENAPI_JSON_PATH)
    )]
    pub open_api_json: String,

    /// Route serving the Scalar UI.
    #[cfg_attr(
        feature = "config",
        arg(long, env = "OPENAPI_SCALAR_PATH", default_value = DEFAULT_SCALAR_UI_PATH)
    )]
    pub scalar_ui: String,
}

impl OpenApiConfig {
    /// Both routes must be absolute and distinct.
    pub fn validate(&self) -> Result<()> {
        for path in [&self.open_api_json, &self.scalar_ui] {
            if !path.starts_with('/') {
                return Err(Error::config(format!("route `{path}` must start with '/'")));
            }
        }

        if self.open_api_json == self.scalar_ui {
            return Err(Error::config(
                "openapi document and scalar ui cannot share a route",
            ));
        }

        Ok(())
    }
}

impl Default for OpenApiConfig {
    fn default() -> Self {
        Self {
            open_api_json: DEFAULT_OPENAPI_JSON_PATH.to_owned(),
            scalar_ui: DEFAULT_SCALAR_UI_PATH.to_owned(),
        }
    }
}

fn keyward_info() -> Info {
    Info {
        title: "Keyward API".to_owned(),
        summary: Some("Time-limited data protection".to_owned()),
        description: Some(
            "Turns short texts into tamper-evident payloads that can no longer \
             be unprotected once their lifetime has passed."
                .to_owned(),
        ),
        license: Some(License {
            name: "MIT".to_owned(),
            identifier: Some("MIT".to_owned()),
            ..License::default()
        }),
        version: env!("CARGO_PKG_VERSION").to_owned(),
        ..Info::default()
    }
}

async fn openapi_document(Extension(api): Extension<OpenApi>) -> Json<OpenApi> {
    Json(api)
}

/// Finishes an [`ApiRouter`] into a plain [`Router`] serving its own docs.
pub trait RouterOpenApiExt<S> {
    /// Uses keyward's title, description and version.
    fn with_open_api(self, config: &OpenApiConfig) -> Router<S>;

    fn with_open_api_info(self, config: &OpenApiConfig, info: Info) -> Router<S>;
}

impl<S> RouterOpenApiExt<S> for ApiRouter<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_open_api(self, config: &OpenApiConfig) -> Router<S> {
        self.with_open_api_info(config, keyward_info())
    }

    fn with_open_api_info(self, config: &OpenApiConfig, info: Info) -> Router<S> {
        let mut api = OpenApi {
            info,
            ..OpenApi::default()
        };

        let ui = Scalar::new(&config.open_api_json).axum_route();
        self.route(&config.open_api_json, get(openapi_document))
            .route(&config.scalar_ui, ui)
            .finish_api(&mut api)
            .layer(Extension(api))
    }
}
