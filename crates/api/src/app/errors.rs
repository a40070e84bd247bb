use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use bizdesk_core::DomainError;
use bizdesk_infra::command_dispatcher::DispatchError;
use bizdesk_infra::event_store::EventStoreError;
use bizdesk_infra::external::{DocumentError, EmailError, StorageError};

/// Handlers return a ready response either way; the error side is always JSON.
pub type ApiResult = Result<Response, Response>;

pub fn dispatch_error_to_response(err: DispatchError) -> Response {
    match err {
        DispatchError::Concurrency(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        DispatchError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        DispatchError::InvariantViolation(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", msg)
        }
        DispatchError::Unauthorized => json_error(StatusCode::FORBIDDEN, "forbidden", "forbidden"),
        DispatchError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        DispatchError::TenantIsolation(msg) => {
            tracing::error!(%msg, "tenant isolation violation");
            json_error(StatusCode::FORBIDDEN, "tenant_isolation", msg)
        }
        DispatchError::Store(EventStoreError::Concurrency(msg)) => {
            json_error(StatusCode::CONFLICT, "conflict", msg)
        }
        // An id of another kind of record; to the caller it simply does not exist.
        DispatchError::Store(EventStoreError::AggregateTypeMismatch(_)) => {
            json_error(StatusCode::NOT_FOUND, "not_found", "not found")
        }
        DispatchError::Store(e) => internal("store_error", e.to_string()),
        DispatchError::Deserialize(msg) => internal("deserialize_error", msg),
        DispatchError::Publish(msg) => internal("publish_error", msg),
    }
}

pub fn domain_error_to_response(err: DomainError) -> Response {
    dispatch_error_to_response(err.into())
}

pub fn document_error_to_response(err: DocumentError) -> Response {
    match err {
        DocumentError::MissingRecipient(name) => json_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "missing_recipient",
            format!("no email address on file for {name}; pass \"to\""),
        ),
        DocumentError::Email(EmailError::InvalidMessage(msg)) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", msg)
        }
        DocumentError::Email(e) => {
            tracing::warn!(error = %e, "email delivery failed");
            json_error(StatusCode::BAD_GATEWAY, "email_error", e.to_string())
        }
        DocumentError::Storage(StorageError::InvalidKey(key)) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", format!("invalid key {key}"))
        }
        DocumentError::Storage(e) => internal("storage_error", e.to_string()),
        DocumentError::Render(e) => internal("render_error", e.to_string()),
    }
}

pub fn not_found(what: &str) -> Response {
    json_error(StatusCode::NOT_FOUND, "not_found", format!("{what} not found"))
}

pub fn bad_request(message: impl Into<String>) -> Response {
    json_error(StatusCode::BAD_REQUEST, "validation_error", message)
}

fn internal(code: &'static str, message: String) -> Response {
    tracing::error!(code, %message, "request failed");
    json_error(StatusCode::INTERNAL_SERVER_ERROR, code, message)
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_errors_map_to_statuses() {
        let cases = [
            (DispatchError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (DispatchError::InvariantViolation("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (DispatchError::Concurrency("x".into()), StatusCode::CONFLICT),
            (DispatchError::NotFound, StatusCode::NOT_FOUND),
            (DispatchError::Unauthorized, StatusCode::FORBIDDEN),
            (DispatchError::Publish("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(dispatch_error_to_response(err).status(), status);
        }
    }

    #[test]
    fn missing_recipient_is_unprocessable() {
        let resp = document_error_to_response(DocumentError::MissingRecipient("Acme".into()));
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
