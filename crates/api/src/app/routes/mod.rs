use axum::{routing::get, Router};

use bizdesk_parties::PartyKind;

pub mod catalog;
pub mod common;
pub mod inventory;
pub mod invoices;
pub mod parties;
pub mod projects;
pub mod purchase_orders;
pub mod quotes;
pub mod reports;
pub mod settings;
pub mod system;
pub mod timesheets;

/// Router for all authenticated (tenant-scoped) endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/customers", parties::router(PartyKind::Customer))
        .nest("/suppliers", parties::router(PartyKind::Supplier))
        .nest("/catalog", catalog::router())
        .nest("/projects", projects::router())
        .nest("/quotes", quotes::router())
        .nest("/invoices", invoices::router())
        .nest("/purchase-orders", purchase_orders::router())
        .nest("/inventory", inventory::router())
        .nest("/timesheets", timesheets::router())
        .nest("/reports", reports::router())
        .nest("/settings", settings::router())
}
