//! Line pricing and document totals.
//!
//! All amounts are minor currency units. Per line:
//!
//! ```text
//! gross    = round(quantity × unit_price)
//! discount = round(gross × discount_bps / 10000)
//! net      = gross − discount
//! tax      = round(net × tax_rate_bps / 10000)
//! ```
//!
//! Rounding is half up and happens per line, so document totals are exact
//! sums of what the lines print.

use serde::{Deserialize, Serialize};

use bizdesk_core::{BPS_SCALE, DomainError, DomainResult, Quantity, ValueObject, apply_bps};

use crate::CatalogItemId;

/// One priced row of a quote, invoice or purchase order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedLine {
    /// 1-based position within the document.
    pub line_no: u32,
    pub catalog_item_id: Option<CatalogItemId>,
    pub description: String,
    pub quantity: Quantity,
    pub unit_price: u64,
    #[serde(default)]
    pub discount_bps: u32,
    #[serde(default)]
    pub tax_rate_bps: u32,
}

impl ValueObject for PricedLine {}

impl PricedLine {
    pub fn validate(&self) -> DomainResult<()> {
        if self.description.trim().is_empty() {
            return Err(DomainError::validation(format!(
                "line {}: description cannot be empty",
                self.line_no
            )));
        }
        if !self.quantity.is_positive() {
            return Err(DomainError::validation(format!(
                "line {}: quantity must be positive",
                self.line_no
            )));
        }
        if self.unit_price == 0 {
            return Err(DomainError::validation(format!(
                "line {}: unit price must be positive",
                self.line_no
            )));
        }
        if u64::from(self.discount_bps) > BPS_SCALE {
            return Err(DomainError::validation(format!(
                "line {}: discount cannot exceed 100%",
                self.line_no
            )));
        }
        if u64::from(self.tax_rate_bps) > BPS_SCALE {
            return Err(DomainError::validation(format!(
                "line {}: tax rate cannot exceed 100%",
                self.line_no
            )));
        }
        self.gross()?;
        Ok(())
    }

    pub fn gross(&self) -> DomainResult<u64> {
        self.quantity
            .extend(self.unit_price)
            .ok_or_else(|| overflow(self.line_no))
    }

    pub fn discount(&self) -> DomainResult<u64> {
        apply_bps(self.gross()?, self.discount_bps).ok_or_else(|| overflow(self.line_no))
    }

    pub fn net(&self) -> DomainResult<u64> {
        Ok(self.gross()? - self.discount()?)
    }

    pub fn tax(&self) -> DomainResult<u64> {
        apply_bps(self.net()?, self.tax_rate_bps).ok_or_else(|| overflow(self.line_no))
    }

    pub fn total(&self) -> DomainResult<u64> {
        self.net()?
            .checked_add(self.tax()?)
            .ok_or_else(|| overflow(self.line_no))
    }
}

fn overflow(line_no: u32) -> DomainError {
    DomainError::validation(format!("line {line_no}: amount overflow"))
}

/// Document-level sums.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentTotals {
    /// Sum of gross line amounts (before discount).
    pub subtotal: u64,
    pub discount: u64,
    pub tax: u64,
    /// `subtotal − discount + tax`
    pub total: u64,
}

impl ValueObject for DocumentTotals {}

/// Validate every line and sum them.
///
/// Line numbers must be unique. An empty slice yields zero totals.
pub fn compute_totals(lines: &[PricedLine]) -> DomainResult<DocumentTotals> {
    let mut seen = std::collections::HashSet::with_capacity(lines.len());
    let mut totals = DocumentTotals::default();
    for line in lines {
        if !seen.insert(line.line_no) {
            return Err(DomainError::validation(format!(
                "duplicate line number {}",
                line.line_no
            )));
        }
        line.validate()?;
        let sum = |acc: u64, v: u64| acc.checked_add(v).ok_or_else(|| overflow(line.line_no));
        totals.subtotal = sum(totals.subtotal, line.gross()?)?;
        totals.discount = sum(totals.discount, line.discount()?)?;
        totals.tax = sum(totals.tax, line.tax()?)?;
    }
    totals.total = (totals.subtotal - totals.discount)
        .checked_add(totals.tax)
        .ok_or_else(|| DomainError::validation("document total overflow"))?;
    Ok(totals)
}

/// Copy lines with positions reassigned as 1, 2, 3...
pub fn renumber(lines: &[PricedLine]) -> Vec<PricedLine> {
    lines
        .iter()
        .enumerate()
        .map(|(i, l)| PricedLine {
            line_no: i as u32 + 1,
            ..l.clone()
        })
        .collect()
}
