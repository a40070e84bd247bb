use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};
use serde_json::{Value as JsonValue, json};

use bizdesk_catalog::{CatalogItem, DocumentTotals, PricedLine};
use bizdesk_core::{AggregateId, Quantity};
use bizdesk_inventory::{AdjustmentReason, StockItem};
use bizdesk_invoicing::{Invoice, InvoiceSource, PaymentMethod};
use bizdesk_numbering::{DocumentKind, DocumentSequence};
use bizdesk_parties::{ContactInfo, Party};
use bizdesk_projects::Project;
use bizdesk_purchasing::PurchaseOrder;
use bizdesk_quotes::Quote;
use bizdesk_timesheets::TimeEntry;

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

/// Quantities arrive as JSON numbers (`1.5`) or decimal strings (`"1.5"`).
fn quantity<'de, D>(de: D) -> Result<Quantity, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    match Raw::deserialize(de)? {
        Raw::Number(n) => Quantity::from_f64(n)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid quantity {n}"))),
        Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

fn optional_quantity<'de, D>(de: D) -> Result<Option<Quantity>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Wrapper(#[serde(deserialize_with = "quantity")] Quantity);

    Ok(Option::<Wrapper>::deserialize(de)?.map(|w| w.0))
}

fn default_terms() -> u32 {
    30
}

fn default_unit() -> String {
    "pcs".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct RegisterPartyRequest {
    pub name: String,
    #[serde(default)]
    pub contact: ContactInfo,
    pub tax_id: Option<String>,
    #[serde(default = "default_terms")]
    pub payment_terms_days: u32,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePartyRequest {
    pub name: Option<String>,
    pub contact: Option<ContactInfo>,
    pub tax_id: Option<String>,
    pub payment_terms_days: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReasonRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCatalogItemRequest {
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    #[serde(default = "default_unit")]
    pub unit: String,
    pub unit_price: u64,
    #[serde(default)]
    pub cost_price: u64,
    #[serde(default)]
    pub tax_rate_bps: u32,
    #[serde(default)]
    pub track_inventory: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePricingRequest {
    pub unit_price: Option<u64>,
    pub cost_price: Option<u64>,
    pub tax_rate_bps: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub customer_id: String,
    pub code: String,
    pub name: String,
    pub hourly_rate: u64,
    pub budget: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct RenameProjectRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct LineRequest {
    pub catalog_item_id: Option<String>,
    pub description: Option<String>,
    #[serde(deserialize_with = "quantity")]
    pub quantity: Quantity,
    pub unit_price: Option<u64>,
    #[serde(default)]
    pub discount_bps: u32,
    pub tax_rate_bps: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct CreateQuoteRequest {
    pub customer_id: String,
    pub project_id: Option<String>,
    pub currency: String,
    pub valid_until: NaiveDate,
    pub notes: Option<String>,
    pub lines: Vec<LineRequest>,
}

#[derive(Debug, Deserialize)]
pub struct AddLinesRequest {
    pub lines: Vec<LineRequest>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConvertQuoteRequest {
    /// Defaults to today.
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EmailDocumentRequest {
    /// Overrides the address on file.
    pub to: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct IssueInvoiceRequest {
    pub customer_id: String,
    pub project_id: Option<String>,
    pub currency: String,
    pub lines: Vec<LineRequest>,
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterPaymentRequest {
    pub amount: u64,
    #[serde(default = "default_payment_method")]
    pub method: PaymentMethod,
    pub reference: Option<String>,
}

fn default_payment_method() -> PaymentMethod {
    PaymentMethod::BankTransfer
}

#[derive(Debug, Deserialize)]
pub struct PurchaseLineRequest {
    pub catalog_item_id: String,
    pub description: Option<String>,
    #[serde(deserialize_with = "quantity")]
    pub quantity: Quantity,
    pub unit_cost: Option<u64>,
    pub tax_rate_bps: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePurchaseOrderRequest {
    pub supplier_id: String,
    pub currency: String,
    pub expected_on: Option<NaiveDate>,
    pub notes: Option<String>,
    pub lines: Vec<PurchaseLineRequest>,
}

#[derive(Debug, Deserialize)]
pub struct AddPurchaseLinesRequest {
    pub lines: Vec<PurchaseLineRequest>,
}

#[derive(Debug, Deserialize)]
pub struct ReceiptRequest {
    pub line_no: u32,
    #[serde(deserialize_with = "quantity")]
    pub quantity: Quantity,
}

#[derive(Debug, Deserialize)]
pub struct ReceiveGoodsRequest {
    pub receipts: Vec<ReceiptRequest>,
}

#[derive(Debug, Deserialize)]
pub struct AdjustStockRequest {
    #[serde(deserialize_with = "quantity")]
    pub delta: Quantity,
    #[serde(default = "default_adjustment_reason")]
    pub reason: AdjustmentReason,
    pub note: Option<String>,
}

fn default_adjustment_reason() -> AdjustmentReason {
    AdjustmentReason::Count
}

#[derive(Debug, Deserialize)]
pub struct ReorderLevelRequest {
    #[serde(deserialize_with = "quantity")]
    pub reorder_level: Quantity,
}

#[derive(Debug, Deserialize)]
pub struct LogTimeRequest {
    pub project_id: String,
    pub work_date: NaiveDate,
    pub minutes: u32,
    pub description: String,
    #[serde(default = "default_true")]
    pub billable: bool,
    /// Defaults to the project rate.
    pub hourly_rate: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTimeEntryRequest {
    pub work_date: Option<NaiveDate>,
    pub minutes: Option<u32>,
    pub description: Option<String>,
    pub billable: Option<bool>,
    pub hourly_rate: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct BillTimeRequest {
    pub project_id: String,
    pub entry_ids: Vec<String>,
    pub currency: String,
    #[serde(default)]
    pub tax_rate_bps: u32,
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConfigureNumberingRequest {
    pub prefix: String,
    pub padding: u8,
    pub next_value: u64,
}

/// Query string of the reporting endpoints. Missing dates default per report.
#[derive(Debug, Default, Deserialize)]
pub struct ReportQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub as_of: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TimesheetListQuery {
    pub project_id: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatusQuery {
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReorderQuery {
    #[serde(default, deserialize_with = "optional_quantity")]
    pub reorder_level: Option<Quantity>,
}

// -------------------------
// Helpers
// -------------------------

/// Parse a path or body id, as a ready 400 on failure.
pub fn parse_id(raw: &str, what: &str) -> Result<AggregateId, axum::response::Response> {
    raw.parse::<AggregateId>().map_err(|_| {
        errors::json_error(
            axum::http::StatusCode::BAD_REQUEST,
            "invalid_id",
            format!("invalid {what} id"),
        )
    })
}

pub fn parse_optional_id(
    raw: Option<&str>,
    what: &str,
) -> Result<Option<AggregateId>, axum::response::Response> {
    raw.map(|r| parse_id(r, what)).transpose()
}

pub fn parse_kind(raw: &str) -> Result<DocumentKind, axum::response::Response> {
    raw.parse::<DocumentKind>()
        .map_err(|e| errors::bad_request(e.to_string()))
}

fn id_string(id: Option<AggregateId>) -> Option<String> {
    id.map(|i| i.to_string())
}

// -------------------------
// JSON mapping helpers
// -------------------------

pub fn party_to_json(p: &Party) -> JsonValue {
    json!({
        "id": p.id_typed().0.to_string(),
        "kind": p.kind(),
        "name": p.name(),
        "contact": p.contact(),
        "tax_id": p.tax_id(),
        "payment_terms_days": p.payment_terms_days(),
        "status": p.status(),
    })
}

pub fn catalog_item_to_json(i: &CatalogItem) -> JsonValue {
    json!({
        "id": i.id_typed().0.to_string(),
        "sku": i.sku(),
        "name": i.name(),
        "description": i.description(),
        "unit": i.unit(),
        "unit_price": i.unit_price(),
        "cost_price": i.cost_price(),
        "tax_rate_bps": i.tax_rate_bps(),
        "track_inventory": i.track_inventory(),
        "status": i.status(),
    })
}

pub fn project_to_json(p: &Project) -> JsonValue {
    json!({
        "id": p.id_typed().0.to_string(),
        "customer_id": id_string(p.customer_id().map(|c| c.0)),
        "code": p.code(),
        "name": p.name(),
        "hourly_rate": p.hourly_rate(),
        "budget": p.budget(),
        "status": p.status(),
    })
}

pub fn line_to_json(l: &PricedLine) -> JsonValue {
    json!({
        "line_no": l.line_no,
        "catalog_item_id": id_string(l.catalog_item_id.map(|c| c.0)),
        "description": l.description,
        "quantity": l.quantity.as_f64(),
        "unit_price": l.unit_price,
        "discount_bps": l.discount_bps,
        "tax_rate_bps": l.tax_rate_bps,
        "net": l.net().ok(),
        "tax": l.tax().ok(),
        "total": l.total().ok(),
    })
}

pub fn totals_to_json(t: DocumentTotals) -> JsonValue {
    json!({
        "subtotal": t.subtotal,
        "discount": t.discount,
        "tax": t.tax,
        "total": t.total,
    })
}

pub fn quote_to_json(q: &Quote, today: NaiveDate) -> JsonValue {
    json!({
        "id": q.id_typed().0.to_string(),
        "number": q.number(),
        "status": q.status(),
        "customer_id": id_string(q.customer_id().map(|c| c.0)),
        "project_id": id_string(q.project_id().map(|p| p.0)),
        "currency": q.currency(),
        "valid_until": q.valid_until(),
        "expired": q.is_expired(today),
        "notes": q.notes(),
        "lines": q.lines().iter().map(line_to_json).collect::<Vec<_>>(),
        "totals": totals_to_json(q.totals()),
        "converted_invoice_id": id_string(q.converted_invoice_id()),
    })
}

fn source_to_json(source: &InvoiceSource) -> JsonValue {
    match source {
        InvoiceSource::Manual => json!({ "type": "manual" }),
        InvoiceSource::Quote {
            quote_id,
            quote_number,
        } => json!({
            "type": "quote",
            "quote_id": quote_id.0.to_string(),
            "quote_number": quote_number,
        }),
        InvoiceSource::Timesheet { entry_ids } => json!({
            "type": "timesheet",
            "entry_ids": entry_ids.iter().map(|e| e.0.to_string()).collect::<Vec<_>>(),
        }),
    }
}

pub fn invoice_to_json(i: &Invoice, today: NaiveDate) -> JsonValue {
    json!({
        "id": i.id_typed().0.to_string(),
        "number": i.number(),
        "status": i.status(),
        "customer_id": id_string(i.customer_id().map(|c| c.0)),
        "project_id": id_string(i.project_id().map(|p| p.0)),
        "source": source_to_json(i.source()),
        "currency": i.currency(),
        "issue_date": i.issue_date(),
        "due_date": i.due_date(),
        "sent_at": i.sent_at(),
        "notes": i.notes(),
        "lines": i.lines().iter().map(line_to_json).collect::<Vec<_>>(),
        "totals": totals_to_json(i.totals()),
        "payments": i.payments().iter().map(|p| json!({
            "amount": p.amount,
            "method": p.method,
            "reference": p.reference,
            "received_at": p.received_at,
        })).collect::<Vec<_>>(),
        "total_paid": i.total_paid(),
        "outstanding": i.outstanding_amount(),
        "overdue": i.is_overdue(today),
    })
}

pub fn purchase_order_to_json(o: &PurchaseOrder) -> JsonValue {
    json!({
        "id": o.id_typed().0.to_string(),
        "number": o.number(),
        "status": o.status(),
        "supplier_id": id_string(o.supplier_id().map(|s| s.0)),
        "currency": o.currency(),
        "expected_on": o.expected_on(),
        "notes": o.notes(),
        "lines": o.lines().iter().map(|l| json!({
            "line_no": l.line_no,
            "catalog_item_id": l.catalog_item_id.0.to_string(),
            "description": l.description,
            "quantity": l.quantity.as_f64(),
            "unit_cost": l.unit_cost,
            "tax_rate_bps": l.tax_rate_bps,
            "received": l.received.as_f64(),
            "outstanding": l.outstanding().as_f64(),
        })).collect::<Vec<_>>(),
        "totals": totals_to_json(o.totals()),
    })
}

pub fn stock_to_json(s: &StockItem) -> JsonValue {
    json!({
        "id": s.id_typed().0.to_string(),
        "catalog_item_id": id_string(s.catalog_item_id().map(|c| c.0)),
        "name": s.name(),
        "on_hand": s.on_hand().as_f64(),
        "reorder_level": s.reorder_level().as_f64(),
        "needs_reorder": s.needs_reorder(),
    })
}

pub fn time_entry_to_json(e: &TimeEntry) -> JsonValue {
    json!({
        "id": e.id_typed().0.to_string(),
        "project_id": id_string(e.project_id().map(|p| p.0)),
        "user_id": e.user_id().map(|u| u.to_string()),
        "work_date": e.work_date(),
        "minutes": e.minutes(),
        "hours": e.hours().as_f64(),
        "description": e.description(),
        "billable": e.billable(),
        "hourly_rate": e.hourly_rate(),
        "value": e.value(),
        "status": e.status(),
        "rejection_reason": e.rejection_reason(),
        "invoice_id": id_string(e.invoice_id()),
    })
}

pub fn sequence_to_json(kind: DocumentKind, s: &DocumentSequence) -> JsonValue {
    let (prefix, padding, next_value) = s.effective_settings(kind);
    json!({
        "kind": kind.as_str(),
        "prefix": prefix,
        "padding": padding,
        "next_value": next_value,
        "next_number": s.peek(kind),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantities_accept_numbers_and_strings() {
        let a: LineRequest =
            serde_json::from_str(r#"{"description":"Consulting","quantity":1.5,"unit_price":100}"#)
                .unwrap();
        let b: LineRequest =
            serde_json::from_str(r#"{"description":"Consulting","quantity":"1.5","unit_price":100}"#)
                .unwrap();
        assert_eq!(a.quantity, Quantity::from_milli(1500));
        assert_eq!(a.quantity, b.quantity);
        assert!(serde_json::from_str::<LineRequest>(r#"{"quantity":"lots"}"#).is_err());
    }

    #[test]
    fn party_defaults() {
        let req: RegisterPartyRequest = serde_json::from_str(r#"{"name":"Acme Ltd"}"#).unwrap();
        assert_eq!(req.payment_terms_days, 30);
        assert_eq!(req.contact, ContactInfo::default());
    }

    #[test]
    fn bad_ids_are_400() {
        let resp = parse_id("nope", "quote").unwrap_err();
        assert_eq!(resp.status(), axum::http::StatusCode::BAD_REQUEST);
        assert!(parse_optional_id(None, "project").unwrap().is_none());
    }
}
