//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store/catalog selection and the ledger services
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request/response DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use crate::config::AppConfig;
use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

use services::{AppServices, StartupError};

/// Build the full HTTP router from configuration (entrypoint used by `main.rs`).
pub async fn build_app(config: &AppConfig) -> Result<Router, StartupError> {
    let services = Arc::new(services::build_services(config).await?);
    Ok(build_router(services, &config.jwt_secret))
}

/// Build the router around already-wired services (tests inject their own).
pub fn build_router(services: Arc<AppServices>, jwt_secret: &str) -> Router {
    let auth_state = middleware::AuthState {
        verifier: Arc::new(middleware::Hs256Verifier::new(jwt_secret.as_bytes())),
    };

    // Protected routes: require a valid bearer token.
    let protected = routes::router()
        .layer(Extension(services))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
        .layer(ServiceBuilder::new().layer(axum::middleware::from_fn(middleware::trace_requests)))
}
