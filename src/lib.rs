//! LDAP authentication strategy for axum.
//!
//! A [`LdapStrategy`] extracts credentials from a request, binds them
//! against a directory and reports an [`Outcome`]. The [`middleware`]
//! module plugs it in front of axum routes.

#![forbid(unsafe_code)]
pub mod classify;
pub mod config;
pub mod credentials;
pub mod directory;
pub mod error;
pub mod middleware;
pub mod options;
pub mod outcome;
pub mod request;
mod router;
pub mod strategy;
pub mod telemetry;
pub mod verify;

pub use credentials::{Credentials, CredentialsLookup, LookupResult};
pub use directory::{
    AttributeValue, DirectoryClient, DirectoryConnector, DirectoryEntry,
    DirectoryError, DirectoryUser, LdapClient, LdapConnector,
};
pub use error::{BoxError, StrategyError};
pub use middleware::{Authenticated, Authenticator};
pub use options::{
    AuthenticateOptions, GroupFilter, SearchScope, ServerOptions,
    StrategyOptions,
};
pub use outcome::{Info, Outcome};
pub use request::AuthRequest;
pub use strategy::{LdapStrategy, OptionsSource, ResolveOptions, Strategy};
pub use verify::{Verdict, Verify, VerifyContext, verify_fn};

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{StatusCode, header};
use axum::routing::{get, post};
use axum::{Router, middleware as AxumMiddleware};
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceBuilder;
use tower_http::LatencyUnit;
use tower_http::sensitive_headers::SetSensitiveHeadersLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{
    DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer,
};

/// MUST NEVER be used in production.
#[cfg(test)]
pub async fn make_request(
    app: Router,
    method: axum::http::Method,
    path: &str,
    body: String,
) -> axum::http::Response<axum::body::Body> {
    use axum::extract::Request;
    use tower::util::ServiceExt;

    app.oneshot(
        Request::builder()
            .method(method)
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json")
            .body(axum::body::Body::from(body))
            .unwrap(),
    )
    .await
    .unwrap()
}

/// State sharing between routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::Configuration>,
    pub authenticator: Authenticator,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Build the state from configuration, with an `ldap3` backed strategy.
    pub fn new(config: Arc<config::Configuration>) -> Self {
        let strategy = LdapStrategy::new(config.ldap.clone());
        let authenticator =
            Authenticator::new(strategy).options(config.authenticate.clone());

        Self {
            config,
            authenticator,
            metrics: None,
        }
    }

    /// Expose metrics on `GET /metrics`.
    pub fn metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

/// Create router.
pub fn app(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        // Add high level tracing/logging to all requests.
        .layer(
            TraceLayer::new_for_http()
                .on_body_chunk(
                    |chunk: &Bytes, latency: Duration, _span: &tracing::Span| {
                        tracing::trace!(
                            size_bytes = chunk.len(),
                            latency = ?latency,
                            "sending body chunk"
                        )
                    },
                )
                .make_span_with(
                    DefaultMakeSpan::new()
                        .include_headers(true)
                        .level(tracing::Level::INFO),
                )
                .on_request(DefaultOnRequest::new())
                .on_response(
                    DefaultOnResponse::new()
                        .include_headers(true)
                        .latency_unit(LatencyUnit::Micros),
                ),
        )
        // Set a timeout.
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(10),
        ))
        // Remove sensitive headers from trace.
        .layer(SetSensitiveHeadersLayer::new([
            header::AUTHORIZATION,
            header::COOKIE,
        ]));

    Router::new()
        // `GET /status.json` goes to `status`.
        .route("/status.json", get(router::status::status))
        // `GET /metrics` goes to Prometheus.
        .route("/metrics", get(telemetry::handler))
        // `POST /login` goes to `login`, behind the strategy.
        .route(
            "/login",
            post(router::login::handler).route_layer(
                AxumMiddleware::from_fn_with_state(
                    state.authenticator.clone(),
                    middleware::authenticate,
                ),
            ),
        )
        .with_state(state)
        .route_layer(AxumMiddleware::from_fn(telemetry::track))
        .layer(middleware)
}
