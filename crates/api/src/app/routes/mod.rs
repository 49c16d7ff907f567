use axum::{routing::get, Router};

pub mod discrepancies;
pub mod movements;
pub mod purchases;
pub mod stock;
pub mod system;

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/movements", movements::router())
        .nest("/items", stock::items_router())
        .nest("/locations", stock::locations_router())
        .route("/stock/alerts", get(stock::alerts))
        .nest("/purchases", purchases::router())
        .nest("/discrepancies", discrepancies::router())
}
