//! Building invoice lines from other documents.

use bizdesk_catalog::{PricedLine, renumber};
use bizdesk_core::{DomainError, DomainResult};
use bizdesk_quotes::Quote;
use bizdesk_timesheets::TimeEntry;

/// Quote lines carried over unchanged apart from their positions.
pub fn invoice_lines_from_quote(quote: &Quote) -> Vec<PricedLine> {
    renumber(quote.lines())
}

/// One line per entry: hours at the entry's rate.
///
/// Every entry must be billable now (approved, billable, not yet billed).
pub fn invoice_lines_from_time(entries: &[TimeEntry], tax_rate_bps: u32) -> DomainResult<Vec<PricedLine>> {
    let mut lines = Vec::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        if !entry.can_bill() {
            return Err(DomainError::invariant(format!(
                "time entry {} is not billable (status {})",
                entry.id_typed(),
                entry.status().as_str()
            )));
        }
        let description = match entry.work_date() {
            Some(date) => format!("{date} {}", entry.description()),
            None => entry.description().to_string(),
        };
        lines.push(PricedLine {
            line_no: i as u32 + 1,
            catalog_item_id: None,
            description,
            quantity: entry.hours(),
            unit_price: entry.hourly_rate(),
            discount_bps: 0,
            tax_rate_bps,
        });
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bizdesk_catalog::compute_totals;
    use bizdesk_core::{AggregateId, Quantity, TenantId, UserId};
    use bizdesk_events::execute;
    use bizdesk_parties::PartyId;
    use bizdesk_projects::ProjectId;
    use bizdesk_quotes::{AddQuoteLine, CreateQuote, QuoteCommand, QuoteId};
    use bizdesk_timesheets::{ApproveTimeEntry, LogTime, TimeEntryCommand, TimeEntryId};
    use chrono::{Duration, NaiveDate, Utc};

    fn entry(minutes: u32, rate: u64, approve: bool) -> TimeEntry {
        let tenant_id = TenantId::new();
        let entry_id = TimeEntryId::new(AggregateId::new());
        let mut entry = TimeEntry::empty(entry_id);
        execute(
            &mut entry,
            &TimeEntryCommand::LogTime(LogTime {
                tenant_id,
                entry_id,
                project_id: ProjectId::new(AggregateId::new()),
                user_id: UserId::new(),
                work_date: NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
                minutes,
                description: "Site survey".to_string(),
                billable: true,
                hourly_rate: rate,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        if approve {
            execute(
                &mut entry,
                &TimeEntryCommand::ApproveTimeEntry(ApproveTimeEntry {
                    tenant_id,
                    entry_id,
                    occurred_at: Utc::now(),
                }),
            )
            .unwrap();
        }
        entry
    }

    #[test]
    fn time_entries_become_hour_lines() {
        let entries = vec![entry(90, 8_000, true), entry(30, 6_000, true)];
        let lines = invoice_lines_from_time(&entries, 0).unwrap();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].line_no, 1);
        assert_eq!(lines[0].quantity, Quantity::from_milli(1500));
        assert_eq!(lines[0].unit_price, 8_000);
        assert!(lines[0].description.starts_with("2024-03-04"));
        assert_eq!(lines[1].line_no, 2);

        let totals = compute_totals(&lines).unwrap();
        assert_eq!(totals.total, 12_000 + 3_000);
    }

    #[test]
    fn unapproved_entries_are_rejected() {
        let entries = vec![entry(60, 5_000, true), entry(60, 5_000, false)];
        let err = invoice_lines_from_time(&entries, 0).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(msg) if msg.contains("not billable")));
    }

    #[test]
    fn quote_lines_are_copied_and_renumbered() {
        let tenant_id = TenantId::new();
        let quote_id = QuoteId::new(AggregateId::new());
        let mut quote = Quote::empty(quote_id);
        execute(
            &mut quote,
            &QuoteCommand::CreateQuote(CreateQuote {
                tenant_id,
                quote_id,
                number: "QUO-00001".to_string(),
                customer_id: PartyId::new(AggregateId::new()),
                project_id: None,
                currency: "EUR".to_string(),
                valid_until: Utc::now().date_naive() + Duration::days(30),
                notes: None,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        for (price, tax) in [(1_000u64, 2_000u32), (2_500, 0)] {
            execute(
                &mut quote,
                &QuoteCommand::AddQuoteLine(AddQuoteLine {
                    tenant_id,
                    quote_id,
                    line: PricedLine {
                        line_no: 0,
                        catalog_item_id: None,
                        description: "Item".to_string(),
                        quantity: Quantity::from_units(2),
                        unit_price: price,
                        discount_bps: 0,
                        tax_rate_bps: tax,
                    },
                    occurred_at: Utc::now(),
                }),
            )
            .unwrap();
        }

        let lines = invoice_lines_from_quote(&quote);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines.iter().map(|l| l.line_no).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(compute_totals(&lines).unwrap(), quote.totals());
    }
}
