use std::fmt::Write;

use crate::format::{format_bps, format_money};
use crate::view::DocumentView;

/// Plain-text rendering, used as the text part of document emails.
pub fn render_text(view: &DocumentView) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_document(&mut out, view);
    out
}

fn write_document(out: &mut String, view: &DocumentView) -> std::fmt::Result {
    writeln!(out, "{}", view.heading())?;
    if let Some(stamp) = &view.stamp {
        writeln!(out, "[{stamp}]")?;
    }
    if let Some(reference) = &view.reference {
        writeln!(out, "Ref: {reference}")?;
    }
    writeln!(out)?;

    writeln!(out, "From: {}", view.issuer.name)?;
    writeln!(out, "To:   {}", view.recipient.name)?;
    for date in &view.dates {
        writeln!(out, "{}: {}", date.label, date.date.format("%Y-%m-%d"))?;
    }
    writeln!(out)?;

    for line in &view.lines {
        write!(
            out,
            "{:>3}. {} | {} x {}",
            line.line_no,
            line.description,
            line.quantity,
            format_money(line.unit_price, &view.currency)
        )?;
        if line.discount_bps > 0 {
            write!(out, " -{}", format_bps(line.discount_bps))?;
        }
        writeln!(out, " = {}", format_money(line.amount, &view.currency))?;
    }
    writeln!(out)?;

    let t = &view.totals;
    writeln!(out, "Subtotal: {}", format_money(t.subtotal, &view.currency))?;
    if t.discount > 0 {
        writeln!(out, "Discount: {}", format_money(t.discount, &view.currency))?;
    }
    writeln!(out, "Tax:      {}", format_money(t.tax, &view.currency))?;
    writeln!(out, "Total:    {}", format_money(t.total, &view.currency))?;
    if let Some(due) = t.balance_due {
        writeln!(out, "Balance due: {}", format_money(due, &view.currency))?;
    }

    if let Some(notes) = &view.notes {
        writeln!(out)?;
        writeln!(out, "{notes}")?;
    }
    Ok(())
}
