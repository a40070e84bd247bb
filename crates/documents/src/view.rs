use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use bizdesk_core::Quantity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Quote,
    Invoice,
    PurchaseOrder,
}

impl DocumentKind {
    pub fn title(self) -> &'static str {
        match self {
            DocumentKind::Quote => "Quote",
            DocumentKind::Invoice => "Invoice",
            DocumentKind::PurchaseOrder => "Purchase Order",
        }
    }

    /// Lower-case, file-name friendly form.
    pub fn slug(self) -> &'static str {
        match self {
            DocumentKind::Quote => "quote",
            DocumentKind::Invoice => "invoice",
            DocumentKind::PurchaseOrder => "purchase-order",
        }
    }
}

/// A name plus free-form address lines.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressBlock {
    pub name: String,
    pub lines: Vec<String>,
}

impl AddressBlock {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lines: Vec::new(),
        }
    }

    /// Append a line when present and non-blank.
    pub fn with_line(mut self, line: Option<impl Into<String>>) -> Self {
        if let Some(line) = line.map(Into::into) {
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                self.lines.extend(trimmed.lines().map(str::to_string));
            }
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelledDate {
    pub label: String,
    pub date: NaiveDate,
}

impl LabelledDate {
    pub fn new(label: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            label: label.into(),
            date,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewLine {
    pub line_no: u32,
    pub description: String,
    pub quantity: Quantity,
    pub unit_price: u64,
    pub discount_bps: u32,
    pub tax_rate_bps: u32,
    /// Net of discount, before tax.
    pub amount: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewTotals {
    pub subtotal: u64,
    pub discount: u64,
    pub tax: u64,
    pub total: u64,
    /// Invoices only.
    pub paid: Option<u64>,
    pub balance_due: Option<u64>,
}

/// Everything a renderer needs; no domain types beyond plain values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentView {
    pub kind: DocumentKind,
    pub number: String,
    pub currency: String,
    pub issuer: AddressBlock,
    pub recipient: AddressBlock,
    pub dates: Vec<LabelledDate>,
    /// e.g. the quote an invoice was converted from.
    pub reference: Option<String>,
    /// Lifecycle marker printed in the header ("VOID", "PAID").
    pub stamp: Option<String>,
    pub lines: Vec<ViewLine>,
    pub totals: ViewTotals,
    pub notes: Option<String>,
}

impl DocumentView {
    /// "Invoice INV-00012"
    pub fn heading(&self) -> String {
        format!("{} {}", self.kind.title(), self.number)
    }

    /// Suggested attachment name, e.g. `invoice-INV-00012.pdf`.
    pub fn file_name(&self, extension: &str) -> String {
        let number: String = self
            .number
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        format!("{}-{}.{}", self.kind.slug(), number, extension)
    }
}
