//! Invoicing: billing documents and their payment state.
//!
//! Also builds invoice lines from the two sources an invoice can be derived
//! from (an accepted quote, or approved billable time).

pub mod invoice;
pub mod lines;

pub use invoice::{
    InvoiceCommand, InvoiceEvent, InvoiceId, InvoiceIssued, InvoiceSent, InvoiceSource,
    InvoiceStatus, InvoiceVoided, Invoice, IssueInvoice, MarkInvoiceSent, Payment,
    PaymentMethod, PaymentRegistered, RegisterPayment, VoidInvoice,
};
pub use lines::{invoice_lines_from_quote, invoice_lines_from_time};
