use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};

use stockledger_infra::{LedgerStore, Pagination};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::ActorContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(append_movement).get(list_movements))
        .route("/transfer", post(transfer_stock))
}

pub async fn append_movement(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    body: Result<Json<dto::AppendMovementRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection(rejection),
    };
    let cmd = match body.into_command(actor.actor_id()) {
        Ok(c) => c,
        Err(e) => return errors::domain_error_to_response(e),
    };

    let outcome = match services.ledger.append(cmd).await {
        Ok(o) => o,
        Err(e) => return errors::ledger_error_to_response(e),
    };

    let status = if outcome.replayed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    let mut json = dto::movement_to_json(&outcome.movement, services.display_scale);
    json["replayed"] = outcome.replayed.into();
    (status, Json(json)).into_response()
}

/// Paginated movement history, newest first.
pub async fn list_movements(
    Extension(services): Extension<Arc<AppServices>>,
    query: Result<Query<dto::MovementQuery>, QueryRejection>,
) -> axum::response::Response {
    let Query(query) = match query {
        Ok(q) => q,
        Err(rejection) => return errors::query_rejection(rejection),
    };
    let filter = match query.filter() {
        Ok(f) => f,
        Err(e) => return errors::domain_error_to_response(e),
    };

    let page = match services
        .store
        .query_movements(filter, Pagination::new(query.limit, query.offset))
        .await
    {
        Ok(p) => p,
        Err(e) => return errors::ledger_error_to_response(e.into()),
    };

    Json(dto::movement_page_to_json(&page, services.display_scale)).into_response()
}

pub async fn transfer_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    body: Result<Json<dto::TransferRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection(rejection),
    };
    let cmd = match body.into_command(actor.actor_id()) {
        Ok(c) => c,
        Err(e) => return errors::domain_error_to_response(e),
    };

    let outcome = match services.ledger.transfer(cmd).await {
        Ok(o) => o,
        Err(e) => return errors::ledger_error_to_response(e),
    };

    let status = if outcome.replayed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    (
        status,
        Json(serde_json::json!({
            "issue": dto::movement_to_json(&outcome.issue, services.display_scale),
            "income": dto::movement_to_json(&outcome.income, services.display_scale),
            "replayed": outcome.replayed,
        })),
    )
        .into_response()
}
