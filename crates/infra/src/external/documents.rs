//! Render → store → email pipeline for customer-facing documents.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use bizdesk_catalog::PricedLine;
use bizdesk_core::TenantId;
use bizdesk_documents::{
    AddressBlock, DocumentKind, DocumentView, LabelledDate, RenderError, ViewLine, ViewTotals,
    render_html, render_pdf, render_text,
};
use bizdesk_invoicing::{Invoice, InvoiceSource, InvoiceStatus};
use bizdesk_parties::Party;
use bizdesk_purchasing::PurchaseOrder;
use bizdesk_quotes::Quote;

use super::email::{EmailAttachment, EmailError, EmailMessage, EmailReceipt, EmailSender};
use super::storage::{ObjectStore, StorageError, StoredObject};

const PDF: &str = "application/pdf";

/// The issuing business as printed on documents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub tax_id: Option<String>,
}

impl CompanyProfile {
    fn block(&self) -> AddressBlock {
        AddressBlock::new(&self.name)
            .with_line(self.address.as_deref())
            .with_line(self.email.as_deref())
            .with_line(self.tax_id.as_deref().map(|t| format!("Tax ID {t}")))
    }
}

fn party_block(party: &Party) -> AddressBlock {
    let contact = party.contact();
    AddressBlock::new(party.name())
        .with_line(contact.address.as_deref())
        .with_line(contact.email.as_deref())
        .with_line(party.tax_id().map(|t| format!("Tax ID {t}")))
}

fn view_lines(lines: &[PricedLine]) -> Vec<ViewLine> {
    lines
        .iter()
        .map(|l| ViewLine {
            line_no: l.line_no,
            description: l.description.clone(),
            quantity: l.quantity,
            unit_price: l.unit_price,
            discount_bps: l.discount_bps,
            tax_rate_bps: l.tax_rate_bps,
            // Lines were validated when they entered the document.
            amount: l.net().unwrap_or(0),
        })
        .collect()
}

pub fn quote_view(quote: &Quote, customer: &Party, company: &CompanyProfile) -> DocumentView {
    let totals = quote.totals();
    DocumentView {
        kind: DocumentKind::Quote,
        number: quote.number().to_string(),
        currency: quote.currency().to_string(),
        issuer: company.block(),
        recipient: party_block(customer),
        dates: quote
            .valid_until()
            .map(|d| vec![LabelledDate::new("Valid until", d)])
            .unwrap_or_default(),
        reference: None,
        stamp: None,
        lines: view_lines(quote.lines()),
        totals: ViewTotals {
            subtotal: totals.subtotal,
            discount: totals.discount,
            tax: totals.tax,
            total: totals.total,
            paid: None,
            balance_due: None,
        },
        notes: quote.notes().map(str::to_string),
    }
}

pub fn invoice_view(invoice: &Invoice, customer: &Party, company: &CompanyProfile) -> DocumentView {
    let totals = invoice.totals();
    let mut dates = Vec::new();
    if let Some(d) = invoice.issue_date() {
        dates.push(LabelledDate::new("Issue date", d));
    }
    if let Some(d) = invoice.due_date() {
        dates.push(LabelledDate::new("Due date", d));
    }
    let reference = match invoice.source() {
        InvoiceSource::Quote { quote_number, .. } => Some(format!("Quote {quote_number}")),
        InvoiceSource::Timesheet { entry_ids } => Some(format!("{} time entries", entry_ids.len())),
        InvoiceSource::Manual => None,
    };
    let stamp = match invoice.status() {
        InvoiceStatus::Void => Some("VOID".to_string()),
        InvoiceStatus::Paid => Some("PAID".to_string()),
        InvoiceStatus::Open => None,
    };
    DocumentView {
        kind: DocumentKind::Invoice,
        number: invoice.number().to_string(),
        currency: invoice.currency().to_string(),
        issuer: company.block(),
        recipient: party_block(customer),
        dates,
        reference,
        stamp,
        lines: view_lines(invoice.lines()),
        totals: ViewTotals {
            subtotal: totals.subtotal,
            discount: totals.discount,
            tax: totals.tax,
            total: totals.total,
            paid: Some(invoice.total_paid()),
            balance_due: Some(invoice.outstanding_amount()),
        },
        notes: invoice.notes().map(str::to_string),
    }
}

pub fn purchase_order_view(order: &PurchaseOrder, supplier: &Party, company: &CompanyProfile) -> DocumentView {
    let totals = order.totals();
    DocumentView {
        kind: DocumentKind::PurchaseOrder,
        number: order.number().to_string(),
        currency: order.currency().to_string(),
        issuer: company.block(),
        recipient: party_block(supplier),
        dates: order
            .expected_on()
            .map(|d| vec![LabelledDate::new("Expected", d)])
            .unwrap_or_default(),
        reference: None,
        stamp: None,
        lines: view_lines(&order.priced_lines()),
        totals: ViewTotals {
            subtotal: totals.subtotal,
            discount: totals.discount,
            tax: totals.tax,
            total: totals.total,
            paid: None,
            balance_due: None,
        },
        notes: order.notes().map(str::to_string),
    }
}

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Email(#[from] EmailError),

    #[error("no email address for {0}")]
    MissingRecipient(String),
}

#[derive(Debug, Clone)]
pub struct RenderedDocument {
    pub file_name: String,
    pub pdf: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmailedDocument {
    pub to: String,
    pub stored: StoredObject,
    pub receipt: EmailReceipt,
}

/// Renders documents, archives every PDF it sends, and mails them.
pub struct DocumentService<E, O> {
    email: E,
    store: O,
    company: CompanyProfile,
}

impl<E, O> DocumentService<E, O>
where
    E: EmailSender,
    O: ObjectStore,
{
    pub fn new(email: E, store: O, company: CompanyProfile) -> Self {
        Self {
            email,
            store,
            company,
        }
    }

    pub fn company(&self) -> &CompanyProfile {
        &self.company
    }

    pub fn render(&self, view: &DocumentView) -> Result<RenderedDocument, DocumentError> {
        Ok(RenderedDocument {
            file_name: view.file_name("pdf"),
            pdf: render_pdf(view)?,
        })
    }

    /// Object key of a document's archived PDF.
    pub fn archive_key(view: &DocumentView) -> String {
        format!("documents/{}/{}", view.kind.slug(), view.file_name("pdf"))
    }

    /// Render, archive, then email the PDF with text and HTML bodies.
    ///
    /// `to` overrides the recipient's address on file.
    #[tracing::instrument(skip(self, view, recipient_email, message), fields(tenant_id = %tenant_id, document = %view.heading()))]
    pub async fn email(
        &self,
        tenant_id: TenantId,
        view: &DocumentView,
        recipient_email: Option<&str>,
        to: Option<&str>,
        message: Option<&str>,
    ) -> Result<EmailedDocument, DocumentError> {
        let to = to
            .or(recipient_email)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| DocumentError::MissingRecipient(view.recipient.name.clone()))?
            .to_string();

        let rendered = self.render(view)?;
        let stored = self
            .store
            .put(tenant_id, &Self::archive_key(view), rendered.pdf.clone(), PDF)
            .await?;

        let mut text_body = render_text(view);
        let mut html_body = render_html(view);
        if let Some(message) = message.map(str::trim).filter(|m| !m.is_empty()) {
            text_body = format!("{message}\n\n{text_body}");
            html_body = html_body.replacen("<h1>", &format!("<p>{}</p><h1>", html_escape(message)), 1);
        }

        let email = EmailMessage {
            to: to.clone(),
            subject: format!("{} from {}", view.heading(), self.company.name),
            text_body,
            html_body: Some(html_body),
            attachments: vec![EmailAttachment {
                filename: rendered.file_name,
                content_type: PDF.to_string(),
                content: rendered.pdf,
            }],
        };
        let receipt = self.email.send(tenant_id, &email).await?;
        tracing::info!(to = %to, key = %stored.key, "document emailed");

        Ok(EmailedDocument {
            to,
            stored,
            receipt,
        })
    }
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
