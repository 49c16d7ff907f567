use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use stockledger_core::PurchaseOrderId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::ActorContext;

pub fn router() -> Router {
    Router::new().nest("/orders", orders_router())
}

fn orders_router() -> Router {
    Router::new()
        .route("/", post(create_purchase_order))
        .route("/:id", get(get_purchase_order))
        .route("/:id/send", post(send_purchase_order))
        .route("/:id/receive", post(receive_purchase_order_goods))
        .route("/:id/close", post(close_purchase_order))
}

fn parse_order_id(id: &str) -> Result<PurchaseOrderId, axum::response::Response> {
    id.parse().map_err(errors::domain_error_to_response)
}

pub async fn create_purchase_order(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::CreatePurchaseOrderRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection(rejection),
    };
    let cmd = match body.into_command() {
        Ok(c) => c,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.orders.create(cmd).await {
        Ok(order) => (
            StatusCode::CREATED,
            Json(dto::purchase_order_to_json(&order, services.display_scale)),
        )
            .into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn get_purchase_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id = match parse_order_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.orders.get(order_id).await {
        Ok(order) => Json(dto::purchase_order_to_json(&order, services.display_scale)).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn send_purchase_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id = match parse_order_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.orders.send(order_id).await {
        Ok(order) => Json(dto::purchase_order_to_json(&order, services.display_scale)).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn close_purchase_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id = match parse_order_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.orders.close(order_id).await {
        Ok(order) => Json(dto::purchase_order_to_json(&order, services.display_scale)).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

/// Post INCOME movements for the received lines, open discrepancies for
/// shortfalls and overages, and advance the order, all in one commit.
pub async fn receive_purchase_order_goods(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    body: Result<Json<dto::ReceiveGoodsRequest>, JsonRejection>,
) -> axum::response::Response {
    let order_id = match parse_order_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection(rejection),
    };
    let cmd = match body.into_command(actor.actor_id()) {
        Ok(c) => c,
        Err(e) => return errors::domain_error_to_response(e),
    };

    let outcome = match services.receiving.receive(order_id, cmd).await {
        Ok(o) => o,
        Err(e) => return errors::ledger_error_to_response(e),
    };

    let scale = services.display_scale;
    Json(serde_json::json!({
        "order": dto::purchase_order_to_json(&outcome.order, scale),
        "movements": outcome.movements.iter().map(|m| dto::movement_to_json(m, scale)).collect::<Vec<_>>(),
        "discrepancies": outcome.discrepancies.iter().map(|d| dto::discrepancy_to_json(d, scale)).collect::<Vec<_>>(),
        "replayed": outcome.replayed,
    }))
    .into_response()
}
