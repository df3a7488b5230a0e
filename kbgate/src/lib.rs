//! # kbgate: Knowledge-Base Ingestion Gateway
//!
//! `kbgate` sits between a document-upload UI and a document-processing (RAG) backend. It accepts
//! a multipart upload (files plus chunking parameters), relays it to the backend in a single
//! request, and returns the backend's answer with its content identifiers additionally rendered
//! as CIDv1 in base-32.
//!
//! ## Request Flow
//!
//! A `POST /api/process-rag` request is handled by [`api::handlers::rag::process_rag`]:
//!
//! 1. The configured backend endpoint is checked first; without one the request fails with a
//!    500 before its body is read.
//! 2. The form is read field by field. File contents are staged per request (in memory or in a
//!    uniquely named temporary file, see [`staging`]).
//! 3. [`gateway::UploadGateway`] rebuilds the form and sends it through a
//!    [`backend::DocumentBackend`], exactly once.
//! 4. Non-2xx answers are passed through untouched. Successful answers get `cid_v1` and
//!    `index_cid_v1`, computed by [`crate::cid::normalize`].
//!
//! Every failure is reported as `{"error": "..."}` with a status matching its category, see
//! [`errors`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use kbgate::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = kbgate::config::Args::parse();
//!     let config = Config::load(&args)?;
//!     kbgate::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     Application::new(config)?
//!         .serve(async {
//!             tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!         })
//!         .await
//! }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.
pub mod api;
pub mod backend;
pub mod cid;
pub mod config;
pub mod errors;
pub mod gateway;
mod openapi;
pub mod staging;
pub mod telemetry;

#[cfg(test)]
mod test;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{get, post},
};
use bon::Builder;
pub use config::Config;
use config::CorsOrigin;
use gateway::UploadGateway;
use openapi::ApiDoc;
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

/// Application state shared across all request handlers.
///
/// Nothing in here is mutated after construction; requests share no state with each other.
///
/// # Example
///
/// ```ignore
/// let state = AppState::builder()
///     .config(config.clone())
///     .gateway(UploadGateway::from_config(&config))
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub gateway: UploadGateway,
}

fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let allowed = &config.cors.allowed_origins;

    // `AllowOrigin::list` refuses `*`
    let allow_origin = if allowed.iter().any(|origin| matches!(origin, CorsOrigin::Wildcard)) {
        AllowOrigin::any()
    } else {
        let mut origins = Vec::new();
        for origin in allowed {
            if let CorsOrigin::Url(url) = origin {
                origins.push(url.origin().ascii_serialization().parse::<HeaderValue>()?);
            }
        }
        AllowOrigin::list(origins)
    };

    let mut cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any);

    if let Some(max_age) = config.cors.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the application router.
///
/// - `POST /api/process-rag` (and `/process-rag`): document ingestion, with the body limit
///   taken from `max_upload_size`
/// - `GET /healthz`: liveness
/// - `GET /api-docs/openapi.json`, `GET /docs`: API documentation
///
/// CORS and request tracing layers wrap every route.
#[instrument(skip_all)]
pub fn build_router(state: &AppState) -> anyhow::Result<Router> {
    let upload_limit = DefaultBodyLimit::max(state.config.max_upload_size);

    let ingestion_routes = Router::new()
        .route("/api/process-rag", post(api::handlers::rag::process_rag))
        .route("/process-rag", post(api::handlers::rag::process_rag))
        .layer(upload_limit)
        .with_state(state.clone());

    let openapi = ApiDoc::openapi();
    let openapi_json = openapi.clone();

    let router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .route("/api-docs/openapi.json", get(move || async move { axum::Json(openapi_json) }))
        .merge(ingestion_routes)
        .merge(Scalar::with_url("/docs", openapi))
        .layer(create_cors_layer(&state.config)?)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        );

    Ok(router)
}

/// The running gateway: router plus configuration.
///
/// 1. **Create**: [`Application::new`] builds the backend client and the router
/// 2. **Serve**: [`Application::serve`] binds to a TCP port and handles requests until the
///    shutdown future resolves
pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting gateway with configuration: {:#?}", config);

        let state = AppState::builder()
            .gateway(UploadGateway::from_config(&config))
            .config(config.clone())
            .build();
        let router = build_router(&state)?;

        Ok(Self { router, config })
    }

    /// Convert application into a test server (for tests)
    #[cfg(any(test, feature = "test-utils"))]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "Gateway listening on http://{}, forwarding uploads to {}",
            bind_addr,
            self.config
                .backend
                .url
                .as_ref()
                .map(|url| url.as_str())
                .unwrap_or("<unconfigured>")
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
