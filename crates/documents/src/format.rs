/// Minor units as `1,234.56 EUR`.
pub fn format_money(amount: u64, currency: &str) -> String {
    format!("{} {currency}", format_amount(amount))
}

/// Minor units as `1,234.56`, for table cells where the currency is implied.
pub(crate) fn format_amount(amount: u64) -> String {
    format!("{}.{:02}", group_thousands(amount / 100), amount % 100)
}

/// Basis points as a percentage: `2000` → `20%`, `1250` → `12.5%`.
pub fn format_bps(bps: u32) -> String {
    let whole = bps / 100;
    let frac = bps % 100;
    if frac == 0 {
        format!("{whole}%")
    } else if frac % 10 == 0 {
        format!("{whole}.{}%", frac / 10)
    } else {
        format!("{whole}.{frac:02}%")
    }
}

fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Cut `s` to at most `max` characters, marking the cut with `...`.
pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let kept: String = s.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}

/// Greedy word wrap at `width` characters.
pub(crate) fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.lines() {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            if !current.is_empty() && current.chars().count() + 1 + word.chars().count() > width {
                lines.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        }
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn money_has_two_decimals_and_grouping() {
        assert_eq!(format_money(0, "EUR"), "0.00 EUR");
        assert_eq!(format_money(5, "EUR"), "0.05 EUR");
        assert_eq!(format_money(123_456, "USD"), "1,234.56 USD");
        assert_eq!(format_money(100_000_000, "GBP"), "1,000,000.00 GBP");
    }

    #[test]
    fn bps_render_as_short_percentages() {
        assert_eq!(format_bps(0), "0%");
        assert_eq!(format_bps(2_000), "20%");
        assert_eq!(format_bps(1_250), "12.5%");
        assert_eq!(format_bps(705), "7.05%");
    }

    #[test]
    fn wrap_and_truncate() {
        assert_eq!(wrap("one two three", 7), vec!["one two", "three"]);
        assert_eq!(wrap("a\n\nb", 10), vec!["a", "", "b"]);
        assert_eq!(truncate("abcdefgh", 6), "abc...");
        assert_eq!(truncate("abc", 6), "abc");
    }
}
