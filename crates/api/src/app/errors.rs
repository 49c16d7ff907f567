use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use stockledger_core::{DomainError, ErrorKind};
use stockledger_infra::{ErrorClass, LedgerError};

pub fn ledger_error_to_response(err: LedgerError) -> axum::response::Response {
    let status = match err.class() {
        ErrorClass::Domain(ErrorKind::Validation) => StatusCode::BAD_REQUEST,
        ErrorClass::Domain(ErrorKind::NotFound) => StatusCode::NOT_FOUND,
        ErrorClass::Domain(ErrorKind::Conflict) | ErrorClass::Conflict => StatusCode::CONFLICT,
        ErrorClass::Storage => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(error = %err, "storage failure");
        return json_error(status, err.code(), "storage failure");
    }

    json_error(status, err.code(), err.to_string())
}

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    ledger_error_to_response(err.into())
}

pub fn json_rejection(rejection: JsonRejection) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "BAD_REQUEST", rejection.body_text())
}

pub fn query_rejection(rejection: QueryRejection) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "BAD_REQUEST", rejection.body_text())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
