use crate::format::{format_bps, format_money};
use crate::view::DocumentView;

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Self-contained HTML body for document emails. All text is escaped.
pub fn render_html(view: &DocumentView) -> String {
    let cur = view.currency.as_str();
    let mut html = String::new();
    html.push_str("<!DOCTYPE html><html><body style=\"font-family:Helvetica,Arial,sans-serif\">");
    html.push_str(&format!("<h1>{}</h1>", escape(&view.heading())));
    if let Some(stamp) = &view.stamp {
        html.push_str(&format!("<p><strong>{}</strong></p>", escape(stamp)));
    }
    if let Some(reference) = &view.reference {
        html.push_str(&format!("<p>Ref: {}</p>", escape(reference)));
    }

    html.push_str(&format!("<p><strong>{}</strong>", escape(&view.recipient.name)));
    for line in &view.recipient.lines {
        html.push_str(&format!("<br>{}", escape(line)));
    }
    html.push_str("</p><p>");
    for date in &view.dates {
        html.push_str(&format!(
            "{}: {}<br>",
            escape(&date.label),
            date.date.format("%Y-%m-%d")
        ));
    }
    html.push_str("</p>");

    html.push_str(
        "<table cellpadding=\"4\"><tr><th align=\"left\">Description</th><th>Qty</th>\
         <th>Unit price</th><th>Disc.</th><th>Tax</th><th align=\"right\">Amount</th></tr>",
    );
    for line in &view.lines {
        let discount = if line.discount_bps > 0 {
            format_bps(line.discount_bps)
        } else {
            String::new()
        };
        html.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td align=\"right\">{}</td></tr>",
            escape(&line.description),
            line.quantity,
            format_money(line.unit_price, cur),
            discount,
            format_bps(line.tax_rate_bps),
            format_money(line.amount, cur),
        ));
    }
    html.push_str("</table>");

    let t = &view.totals;
    html.push_str("<table cellpadding=\"2\">");
    let mut row = |label: &str, amount: u64| {
        html.push_str(&format!(
            "<tr><td>{label}</td><td align=\"right\">{}</td></tr>",
            format_money(amount, cur)
        ));
    };
    row("Subtotal", t.subtotal);
    if t.discount > 0 {
        row("Discount", t.discount);
    }
    row("Tax", t.tax);
    row("<strong>Total</strong>", t.total);
    if let Some(due) = t.balance_due {
        row("<strong>Balance due</strong>", due);
    }
    html.push_str("</table>");

    if let Some(notes) = &view.notes {
        html.push_str(&format!("<p>{}</p>", escape(notes).replace('\n', "<br>")));
    }
    html.push_str(&format!(
        "<p style=\"color:#777\">{}</p></body></html>",
        escape(&view.issuer.name)
    ));
    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::fixtures;

    #[test]
    fn user_text_is_escaped() {
        let mut view = fixtures::invoice(1);
        view.recipient.name = "Smith & <Sons>".to_string();
        view.lines[0].description = "<script>alert(1)</script>".to_string();
        let html = render_html(&view);
        assert!(html.contains("Smith &amp; &lt;Sons&gt;"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn html_carries_totals() {
        let html = render_html(&fixtures::invoice(2));
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("600.00 EUR"));
        assert!(html.ends_with("</html>"));
    }
}
