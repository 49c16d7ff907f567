use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Extension, Path, Query},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use stockledger_core::{ItemId, LocationId};
use stockledger_infra::{CountLine, RecordCount};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::ActorContext;

pub fn items_router() -> Router {
    Router::new().route("/:id/quantity", get(item_quantity))
}

pub fn locations_router() -> Router {
    Router::new()
        .route("/:id/stock", get(location_stock))
        .route("/:id/counts", post(record_count))
}

pub async fn item_quantity(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    query: Result<Query<dto::LocationQuery>, QueryRejection>,
) -> axum::response::Response {
    let Query(query) = match query {
        Ok(q) => q,
        Err(rejection) => return errors::query_rejection(rejection),
    };
    let item_id: ItemId = match id.parse() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };
    let location_id: Option<LocationId> = match query.location_id.as_deref().map(str::parse).transpose() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.resolver.quantity(item_id, location_id).await {
        Ok(quantity) => Json(serde_json::json!({
            "item_id": item_id.to_string(),
            "location_id": location_id.map(|l| l.to_string()),
            "quantity": stockledger_inventory::round_for_display(quantity, services.display_scale).to_string(),
        }))
        .into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn location_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let location_id: LocationId = match id.parse() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.resolver.location_stock(location_id).await {
        Ok(lines) => Json(dto::location_stock_to_json(&lines, services.display_scale)).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

/// Record a physical count; opens a discrepancy per differing line.
pub async fn record_count(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    body: Result<Json<dto::RecordCountRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection(rejection),
    };
    let location_id: LocationId = match id.parse() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    let mut lines = Vec::with_capacity(body.lines.len());
    for l in &body.lines {
        let item_id: ItemId = match l.item_id.parse() {
            Ok(v) => v,
            Err(e) => return errors::domain_error_to_response(e),
        };
        let counted_qty = match dto::quantity(&l.counted_qty) {
            Ok(q) => q,
            Err(e) => return errors::domain_error_to_response(e),
        };
        lines.push(CountLine {
            item_id,
            counted_qty,
        });
    }

    let cmd = RecordCount {
        location_id,
        session_id: body.session_id,
        lines,
        counted_by: Some(actor.actor_id()),
    };

    match services.discrepancies.record_count(cmd).await {
        Ok(opened) => Json(serde_json::json!({
            "discrepancies": opened
                .iter()
                .map(|d| dto::discrepancy_to_json(d, services.display_scale))
                .collect::<Vec<_>>(),
        }))
        .into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

/// Items below their minimum or above their maximum stock level.
pub async fn alerts(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.resolver.alerts().await {
        Ok(alerts) => Json(
            alerts
                .iter()
                .map(|a| dto::alert_to_json(a, services.display_scale))
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}
