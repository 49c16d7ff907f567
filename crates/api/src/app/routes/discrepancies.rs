use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use stockledger_core::DiscrepancyId;
use stockledger_inventory::DiscrepancyStatus;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::ActorContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_discrepancies).post(open_discrepancy))
        .route("/:id", get(get_discrepancy))
        .route("/:id/close", post(close_discrepancy))
}

pub async fn list_discrepancies(
    Extension(services): Extension<Arc<AppServices>>,
    query: Result<Query<dto::StatusQuery>, QueryRejection>,
) -> axum::response::Response {
    let Query(query) = match query {
        Ok(q) => q,
        Err(rejection) => return errors::query_rejection(rejection),
    };
    let status: Option<DiscrepancyStatus> = match query.status.as_deref().map(str::parse).transpose() {
        Ok(s) => s,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.discrepancies.list(status).await {
        Ok(list) => Json(
            list.iter()
                .map(|d| dto::discrepancy_to_json(d, services.display_scale))
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn open_discrepancy(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    body: Result<Json<dto::OpenDiscrepancyRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection(rejection),
    };
    let cmd = match body.into_command(actor.actor_id()) {
        Ok(c) => c,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.discrepancies.open(cmd).await {
        Ok(d) => (
            StatusCode::CREATED,
            Json(dto::discrepancy_to_json(&d, services.display_scale)),
        )
            .into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn get_discrepancy(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: DiscrepancyId = match id.parse() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.discrepancies.get(id).await {
        Ok(d) => Json(dto::discrepancy_to_json(&d, services.display_scale)).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

/// OPEN → CLOSED. Never writes a corrective movement.
pub async fn close_discrepancy(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    body: Option<Json<dto::CloseDiscrepancyRequest>>,
) -> axum::response::Response {
    let id: DiscrepancyId = match id.parse() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };
    let note = body.and_then(|Json(b)| b.close_note);

    match services
        .discrepancies
        .close(id, note, Some(actor.actor_id()))
        .await
    {
        Ok(d) => Json(dto::discrepancy_to_json(&d, services.display_scale)).into_response(),
        Err(e) => errors::ledger_error_to_response(e),
    }
}
