//! Fixed-layout A4 rendering with the built-in Helvetica faces.
//!
//! Coordinates are millimetres from the bottom-left corner of the page.

use printpdf::{
    BuiltinFont, IndirectFontRef, Line, Mm, PdfDocument, PdfDocumentReference,
    PdfLayerReference, Point,
};

use crate::RenderError;
use crate::format::{format_amount, format_bps, format_money, truncate, wrap};
use crate::view::DocumentView;

const PAGE_W: f32 = 210.0;
const PAGE_H: f32 = 297.0;
const MARGIN: f32 = 20.0;
const ROW_H: f32 = 6.0;
const FIRST_TABLE_TOP: f32 = 190.0;
const NEXT_TABLE_TOP: f32 = 262.0;

/// Line rows on the first page (which also carries the address header).
pub const FIRST_PAGE_ROWS: usize = 18;
/// Line rows on every continuation page.
pub const NEXT_PAGE_ROWS: usize = 30;

const COL_DESC: f32 = MARGIN;
const COL_QTY: f32 = 100.0;
const COL_PRICE: f32 = 117.0;
const COL_DISC: f32 = 142.0;
const COL_TAX: f32 = 156.0;
const COL_AMOUNT: f32 = 168.0;

/// Pages needed for `lines` line items; a document always has one page.
pub fn page_count(lines: usize) -> usize {
    if lines <= FIRST_PAGE_ROWS {
        1
    } else {
        1 + (lines - FIRST_PAGE_ROWS).div_ceil(NEXT_PAGE_ROWS)
    }
}

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
}

fn pdf_err(e: impl std::fmt::Display) -> RenderError {
    RenderError::Pdf(e.to_string())
}

pub fn render_pdf(view: &DocumentView) -> Result<Vec<u8>, RenderError> {
    let (doc, first_page, first_layer) =
        PdfDocument::new(view.heading(), Mm(PAGE_W), Mm(PAGE_H), "content");
    let fonts = Fonts {
        regular: doc.add_builtin_font(BuiltinFont::Helvetica).map_err(pdf_err)?,
        bold: doc.add_builtin_font(BuiltinFont::HelveticaBold).map_err(pdf_err)?,
    };

    let pages = page_count(view.lines.len());
    let mut remaining = view.lines.as_slice();

    for page_no in 1..=pages {
        let layer = if page_no == 1 {
            doc.get_page(first_page).get_layer(first_layer)
        } else {
            let (page, layer) = doc.add_page(Mm(PAGE_W), Mm(PAGE_H), "content");
            doc.get_page(page).get_layer(layer)
        };

        let (top, capacity) = if page_no == 1 {
            draw_header(&layer, &fonts, view);
            (FIRST_TABLE_TOP, FIRST_PAGE_ROWS)
        } else {
            text(&layer, &fonts.bold, 12.0, MARGIN, PAGE_H - MARGIN, &format!("{} (continued)", view.heading()));
            (NEXT_TABLE_TOP, NEXT_PAGE_ROWS)
        };

        let take = remaining.len().min(capacity);
        let (rows, rest) = remaining.split_at(take);
        remaining = rest;

        let mut y = draw_table_header(&layer, &fonts, top);
        for line in rows {
            text(&layer, &fonts.regular, 9.0, COL_DESC, y, &truncate(&line.description, 45));
            text(&layer, &fonts.regular, 9.0, COL_QTY, y, &line.quantity.to_string());
            text(&layer, &fonts.regular, 9.0, COL_PRICE, y, &format_amount(line.unit_price));
            if line.discount_bps > 0 {
                text(&layer, &fonts.regular, 9.0, COL_DISC, y, &format_bps(line.discount_bps));
            }
            text(&layer, &fonts.regular, 9.0, COL_TAX, y, &format_bps(line.tax_rate_bps));
            text(&layer, &fonts.regular, 9.0, COL_AMOUNT, y, &format_amount(line.amount));
            y -= ROW_H;
        }

        if page_no == pages {
            draw_totals(&layer, &fonts, view, y - ROW_H);
        }
        draw_footer(&layer, &fonts, view, page_no, pages);
    }

    save(doc)
}

fn save(doc: PdfDocumentReference) -> Result<Vec<u8>, RenderError> {
    doc.save_to_bytes().map_err(pdf_err)
}

fn text(layer: &PdfLayerReference, font: &IndirectFontRef, size: f32, x: f32, y: f32, s: &str) {
    layer.use_text(s, size, Mm(x), Mm(y), font);
}

fn rule(layer: &PdfLayerReference, y: f32) {
    layer.add_line(Line {
        points: vec![
            (Point::new(Mm(MARGIN), Mm(y)), false),
            (Point::new(Mm(PAGE_W - MARGIN), Mm(y)), false),
        ],
        is_closed: false,
    });
}

fn draw_header(layer: &PdfLayerReference, fonts: &Fonts, view: &DocumentView) {
    let mut y = PAGE_H - MARGIN;
    text(layer, &fonts.bold, 20.0, MARGIN, y, view.kind.title());
    if let Some(stamp) = &view.stamp {
        text(layer, &fonts.bold, 16.0, 80.0, y, stamp);
    }
    y -= 8.0;
    text(layer, &fonts.regular, 11.0, MARGIN, y, &view.number);
    if let Some(reference) = &view.reference {
        y -= 5.0;
        text(layer, &fonts.regular, 9.0, MARGIN, y, reference);
    }

    // Issuer, top right.
    let mut iy = PAGE_H - MARGIN;
    text(layer, &fonts.bold, 10.0, 125.0, iy, &view.issuer.name);
    for line in view.issuer.lines.iter().take(5) {
        iy -= 4.5;
        text(layer, &fonts.regular, 9.0, 125.0, iy, &truncate(line, 40));
    }

    // Recipient, left.
    let mut ry = 242.0;
    text(layer, &fonts.regular, 8.0, MARGIN, ry + 5.0, "To");
    text(layer, &fonts.bold, 10.0, MARGIN, ry, &view.recipient.name);
    for line in view.recipient.lines.iter().take(5) {
        ry -= 4.5;
        text(layer, &fonts.regular, 9.0, MARGIN, ry, &truncate(line, 50));
    }

    // Dates, right.
    let mut dy = 242.0;
    for date in &view.dates {
        text(layer, &fonts.regular, 9.0, 125.0, dy, &date.label);
        text(layer, &fonts.regular, 9.0, 160.0, dy, &date.date.format("%Y-%m-%d").to_string());
        dy -= 5.0;
    }
    text(layer, &fonts.regular, 9.0, 125.0, dy, "Currency");
    text(layer, &fonts.regular, 9.0, 160.0, dy, &view.currency);
}

/// Draws the column titles and returns the baseline of the first row.
fn draw_table_header(layer: &PdfLayerReference, fonts: &Fonts, top: f32) -> f32 {
    text(layer, &fonts.bold, 9.0, COL_DESC, top, "Description");
    text(layer, &fonts.bold, 9.0, COL_QTY, top, "Qty");
    text(layer, &fonts.bold, 9.0, COL_PRICE, top, "Unit price");
    text(layer, &fonts.bold, 9.0, COL_DISC, top, "Disc.");
    text(layer, &fonts.bold, 9.0, COL_TAX, top, "Tax");
    text(layer, &fonts.bold, 9.0, COL_AMOUNT, top, "Amount");
    rule(layer, top - 2.0);
    top - ROW_H - 1.0
}

fn draw_totals(layer: &PdfLayerReference, fonts: &Fonts, view: &DocumentView, top: f32) {
    rule(layer, top + ROW_H - 2.0);
    let t = &view.totals;
    let mut rows: Vec<(&str, u64, bool)> = vec![("Subtotal", t.subtotal, false)];
    if t.discount > 0 {
        rows.push(("Discount", t.discount, false));
    }
    rows.push(("Tax", t.tax, false));
    rows.push(("Total", t.total, true));
    if let Some(paid) = t.paid.filter(|p| *p > 0) {
        rows.push(("Paid", paid, false));
    }
    if let Some(due) = t.balance_due {
        rows.push(("Balance due", due, true));
    }

    let mut y = top;
    for (label, amount, strong) in rows {
        let font = if strong { &fonts.bold } else { &fonts.regular };
        text(layer, font, 10.0, 125.0, y, label);
        text(layer, font, 10.0, 158.0, y, &format_money(amount, &view.currency));
        y -= ROW_H;
    }

    if let Some(notes) = &view.notes {
        y -= 4.0;
        text(layer, &fonts.bold, 9.0, MARGIN, y, "Notes");
        for line in wrap(notes, 95).iter().take(6) {
            y -= 4.5;
            text(layer, &fonts.regular, 9.0, MARGIN, y, line);
        }
    }
}

fn draw_footer(layer: &PdfLayerReference, fonts: &Fonts, view: &DocumentView, page: usize, pages: usize) {
    text(
        layer,
        &fonts.regular,
        8.0,
        MARGIN,
        12.0,
        &format!("{} | {}", view.issuer.name, view.heading()),
    );
    text(layer, &fonts.regular, 8.0, 170.0, 12.0, &format!("Page {page} of {pages}"));
}
