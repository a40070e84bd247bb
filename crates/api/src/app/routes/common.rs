use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde_json::{Value as JsonValue, json};

use bizdesk_catalog::CatalogItemId;
use bizdesk_core::TenantId;
use bizdesk_infra::event_store::StoredEvent;
use bizdesk_infra::external::RenderedDocument;
use bizdesk_infra::workflows::LineInput;

use crate::app::dto;
use crate::app::services::AppServices;

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

pub fn ok(body: JsonValue) -> Response {
    (StatusCode::OK, Json(body)).into_response()
}

pub fn created(body: JsonValue) -> Response {
    (StatusCode::CREATED, Json(body)).into_response()
}

pub fn items(items: Vec<JsonValue>) -> Response {
    ok(json!({ "items": items }))
}

pub fn pdf(rendered: RenderedDocument) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"{}\"", rendered.file_name),
            ),
        ],
        rendered.pdf,
    )
        .into_response()
}

/// `?status=` filter, parsed with the status enum's own serde names.
pub fn parse_status<T: DeserializeOwned>(raw: Option<&str>, what: &str) -> Result<Option<T>, Response> {
    raw.map(|s| {
        serde_json::from_value(json!(s))
            .map_err(|_| crate::app::errors::bad_request(format!("unknown {what} status '{s}'")))
    })
    .transpose()
}

pub fn line_inputs(lines: Vec<dto::LineRequest>) -> Result<Vec<LineInput>, Response> {
    lines
        .into_iter()
        .map(|l| {
            let catalog_item_id = dto::parse_optional_id(l.catalog_item_id.as_deref(), "catalog item")?
                .map(CatalogItemId::new);
            Ok(LineInput {
                catalog_item_id,
                description: l.description,
                quantity: l.quantity,
                unit_price: l.unit_price,
                discount_bps: l.discount_bps,
                tax_rate_bps: l.tax_rate_bps,
            })
        })
        .collect()
}

/// Event log of one stream, if it exists and is of `aggregate_type`.
pub async fn history(
    services: &AppServices,
    tenant_id: TenantId,
    raw_id: &str,
    aggregate_type: &str,
    what: &str,
) -> Result<Response, Response> {
    let id = dto::parse_id(raw_id, what)?;
    let events = services
        .dispatcher()
        .history(tenant_id, id)
        .await
        .map_err(crate::app::errors::dispatch_error_to_response)?;
    if events.is_empty() || events.iter().any(|e| e.aggregate_type != aggregate_type) {
        return Err(crate::app::errors::not_found(what));
    }
    Ok(items(events.iter().map(event_to_json).collect()))
}

fn event_to_json(e: &StoredEvent) -> JsonValue {
    json!({
        "event_id": e.event_id.to_string(),
        "sequence_number": e.sequence_number,
        "event_type": e.event_type,
        "event_version": e.event_version,
        "occurred_at": e.occurred_at,
        "payload": e.payload,
    })
}
