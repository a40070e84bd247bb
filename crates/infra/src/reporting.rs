//! Reports computed from read-model snapshots.
//!
//! Every function is pure over the slices it is given; callers pass the
//! tenant's projection lists. Money stays in minor units.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::Serialize;

use bizdesk_catalog::{CatalogItem, CatalogItemId};
use bizdesk_core::{AggregateId, DomainError, UserId};
use bizdesk_inventory::StockItem;
use bizdesk_invoicing::{Invoice, InvoiceStatus};
use bizdesk_parties::{Party, PartyId};
use bizdesk_projects::{Project, ProjectId};
use bizdesk_quotes::{Quote, QuoteStatus};
use bizdesk_timesheets::{TimeEntry, TimeEntryStatus};

/// Inclusive date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Period {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl Period {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self, DomainError> {
        if from > to {
            return Err(DomainError::validation(format!(
                "period starts after it ends ({from} > {to})"
            )));
        }
        Ok(Self { from, to })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }
}

// ---------------------------------------------------------------------------
// Sales
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CurrencySales {
    pub currency: String,
    pub invoice_count: usize,
    pub subtotal: u64,
    pub discount: u64,
    pub tax: u64,
    pub total: u64,
    pub paid: u64,
    pub outstanding: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SalesSummary {
    pub period: Period,
    pub void_count: usize,
    /// One row per invoice currency; amounts in different currencies are never summed.
    pub by_currency: Vec<CurrencySales>,
}

/// Invoiced amounts of non-void invoices issued within `period`.
pub fn sales_summary(invoices: &[Invoice], period: Period) -> SalesSummary {
    let mut by_currency: BTreeMap<String, CurrencySales> = BTreeMap::new();
    let mut void_count = 0;

    for invoice in invoices {
        let Some(issued) = invoice.issue_date() else {
            continue;
        };
        if !period.contains(issued) {
            continue;
        }
        if invoice.status() == InvoiceStatus::Void {
            void_count += 1;
            continue;
        }
        let totals = invoice.totals();
        let row = by_currency
            .entry(invoice.currency().to_string())
            .or_insert_with(|| CurrencySales {
                currency: invoice.currency().to_string(),
                ..CurrencySales::default()
            });
        row.invoice_count += 1;
        row.subtotal = row.subtotal.saturating_add(totals.subtotal);
        row.discount = row.discount.saturating_add(totals.discount);
        row.tax = row.tax.saturating_add(totals.tax);
        row.total = row.total.saturating_add(totals.total);
        row.paid = row.paid.saturating_add(invoice.total_paid());
        row.outstanding = row.outstanding.saturating_add(invoice.outstanding_amount());
    }

    SalesSummary {
        period,
        void_count,
        by_currency: by_currency.into_values().collect(),
    }
}

// ---------------------------------------------------------------------------
// Receivables aging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AgingBuckets {
    pub current: u64,
    pub days_1_30: u64,
    pub days_31_60: u64,
    pub days_61_90: u64,
    pub over_90: u64,
}

impl AgingBuckets {
    /// Add `amount` to the bucket for an invoice `days_overdue` past due.
    pub fn add(&mut self, days_overdue: i64, amount: u64) {
        let bucket = match days_overdue {
            d if d <= 0 => &mut self.current,
            1..=30 => &mut self.days_1_30,
            31..=60 => &mut self.days_31_60,
            61..=90 => &mut self.days_61_90,
            _ => &mut self.over_90,
        };
        *bucket = bucket.saturating_add(amount);
    }

    pub fn total(&self) -> u64 {
        self.current
            .saturating_add(self.days_1_30)
            .saturating_add(self.days_31_60)
            .saturating_add(self.days_61_90)
            .saturating_add(self.over_90)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomerAging {
    pub customer_id: PartyId,
    pub customer_name: String,
    pub currency: String,
    pub buckets: AgingBuckets,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArAging {
    pub as_of: NaiveDate,
    pub customers: Vec<CustomerAging>,
}

/// Outstanding balances of open invoices, bucketed by days past due.
pub fn ar_aging(invoices: &[Invoice], customers: &[Party], as_of: NaiveDate) -> ArAging {
    let names: HashMap<PartyId, &str> = customers
        .iter()
        .map(|p| (p.id_typed(), p.name()))
        .collect();

    let mut rows: BTreeMap<(String, String, PartyId), AgingBuckets> = BTreeMap::new();
    for invoice in invoices {
        if invoice.status() != InvoiceStatus::Open || invoice.outstanding_amount() == 0 {
            continue;
        }
        let (Some(customer_id), Some(due)) = (invoice.customer_id(), invoice.due_date()) else {
            continue;
        };
        let name = names.get(&customer_id).copied().unwrap_or_default().to_string();
        let days_overdue = (as_of - due).num_days();
        rows.entry((name, invoice.currency().to_string(), customer_id))
            .or_default()
            .add(days_overdue, invoice.outstanding_amount());
    }

    ArAging {
        as_of,
        customers: rows
            .into_iter()
            .map(|((customer_name, currency, customer_id), buckets)| CustomerAging {
                customer_id,
                customer_name,
                currency,
                total: buckets.total(),
                buckets,
            })
            .collect(),
    }
}

// ---------------------------------------------------------------------------
// Quote pipeline
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineStage {
    pub status: QuoteStatus,
    pub count: usize,
    pub value: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuotePipeline {
    pub stages: Vec<PipelineStage>,
    /// Sent quotes past their validity date.
    pub expired: usize,
    /// Converted / every quote that left Draft. `None` when nothing was sent.
    pub conversion_rate: Option<f64>,
}

pub fn quote_pipeline(quotes: &[Quote], today: NaiveDate) -> QuotePipeline {
    const ORDER: [QuoteStatus; 5] = [
        QuoteStatus::Draft,
        QuoteStatus::Sent,
        QuoteStatus::Accepted,
        QuoteStatus::Declined,
        QuoteStatus::Converted,
    ];
    let mut stages: Vec<PipelineStage> = ORDER
        .iter()
        .map(|status| PipelineStage {
            status: *status,
            count: 0,
            value: 0,
        })
        .collect();

    let mut expired = 0;
    for quote in quotes {
        if let Some(stage) = stages.iter_mut().find(|s| s.status == quote.status()) {
            stage.count += 1;
            stage.value = stage.value.saturating_add(quote.totals().total);
        }
        if quote.status() == QuoteStatus::Sent && quote.is_expired(today) {
            expired += 1;
        }
    }

    let count_of = |status: QuoteStatus| {
        stages
            .iter()
            .find(|s| s.status == status)
            .map(|s| s.count)
            .unwrap_or(0)
    };
    let decided = quotes.len() - count_of(QuoteStatus::Draft);
    let conversion_rate =
        (decided > 0).then(|| count_of(QuoteStatus::Converted) as f64 / decided as f64);

    QuotePipeline {
        stages,
        expired,
        conversion_rate,
    }
}

// ---------------------------------------------------------------------------
// Projects
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectSummary {
    pub project_id: ProjectId,
    pub code: String,
    pub name: String,
    pub minutes_logged: u64,
    pub billable_minutes: u64,
    /// Billable time not yet on an invoice (rejected entries excluded).
    pub unbilled_value: u64,
    pub invoiced: u64,
    pub budget: Option<u64>,
    /// Budget minus invoiced; negative when over budget.
    pub budget_remaining: Option<i64>,
}

pub fn project_summary(project: &Project, entries: &[TimeEntry], invoices: &[Invoice]) -> ProjectSummary {
    let project_id = project.id_typed();
    let mut minutes_logged = 0u64;
    let mut billable_minutes = 0u64;
    let mut unbilled_value = 0u64;

    for entry in entries.iter().filter(|e| e.project_id() == Some(project_id)) {
        if entry.status() == TimeEntryStatus::Rejected {
            continue;
        }
        minutes_logged += u64::from(entry.minutes());
        if entry.billable() {
            billable_minutes += u64::from(entry.minutes());
            if entry.status() != TimeEntryStatus::Billed {
                unbilled_value = unbilled_value.saturating_add(entry.value());
            }
        }
    }

    let invoiced = invoices
        .iter()
        .filter(|i| i.project_id() == Some(project_id) && i.status() != InvoiceStatus::Void)
        .map(Invoice::total_amount)
        .fold(0u64, u64::saturating_add);

    let budget = project.budget();
    ProjectSummary {
        project_id,
        code: project.code().to_string(),
        name: project.name().to_string(),
        minutes_logged,
        billable_minutes,
        unbilled_value,
        invoiced,
        budget,
        budget_remaining: budget.map(|b| {
            i64::try_from(b).unwrap_or(i64::MAX) - i64::try_from(invoiced).unwrap_or(i64::MAX)
        }),
    }
}

// ---------------------------------------------------------------------------
// Inventory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockValuation {
    pub stock_item_id: AggregateId,
    pub catalog_item_id: Option<CatalogItemId>,
    pub sku: String,
    pub name: String,
    pub on_hand: f64,
    pub unit_cost: u64,
    pub value: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InventoryValuation {
    pub items: Vec<StockValuation>,
    pub total_value: u64,
}

/// On-hand quantity at catalog cost price. Negative stock is valued at zero.
pub fn inventory_valuation(stock: &[StockItem], catalog: &[CatalogItem]) -> InventoryValuation {
    let by_id: HashMap<CatalogItemId, &CatalogItem> =
        catalog.iter().map(|c| (c.id_typed(), c)).collect();

    let mut items: Vec<StockValuation> = stock
        .iter()
        .map(|s| {
            let item = s.catalog_item_id().and_then(|id| by_id.get(&id).copied());
            let unit_cost = item.map(CatalogItem::cost_price).unwrap_or(0);
            let value = if s.on_hand().is_positive() {
                s.on_hand().extend(unit_cost).unwrap_or(u64::MAX)
            } else {
                0
            };
            StockValuation {
                stock_item_id: s.id_typed().0,
                catalog_item_id: s.catalog_item_id(),
                sku: item.map(|i| i.sku().to_string()).unwrap_or_default(),
                name: s.name().to_string(),
                on_hand: s.on_hand().as_f64(),
                unit_cost,
                value,
            }
        })
        .collect();
    items.sort_by(|a, b| a.sku.cmp(&b.sku).then_with(|| a.name.cmp(&b.name)));

    let total_value = items.iter().map(|i| i.value).fold(0u64, u64::saturating_add);
    InventoryValuation { items, total_value }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReorderLine {
    pub stock_item_id: AggregateId,
    pub name: String,
    pub on_hand: f64,
    pub reorder_level: f64,
    pub shortfall: f64,
}

/// Stock items at or below their reorder level, largest shortfall first.
pub fn reorder_list(stock: &[StockItem]) -> Vec<ReorderLine> {
    let mut lines: Vec<(i64, ReorderLine)> = stock
        .iter()
        .filter(|s| s.needs_reorder())
        .map(|s| {
            let shortfall = s.reorder_level().milli() - s.on_hand().milli();
            (
                shortfall,
                ReorderLine {
                    stock_item_id: s.id_typed().0,
                    name: s.name().to_string(),
                    on_hand: s.on_hand().as_f64(),
                    reorder_level: s.reorder_level().as_f64(),
                    shortfall: shortfall as f64 / 1_000.0,
                },
            )
        })
        .collect();
    lines.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.name.cmp(&b.1.name)));
    lines.into_iter().map(|(_, line)| line).collect()
}

// ---------------------------------------------------------------------------
// Timesheets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimesheetRow {
    pub user_id: UserId,
    pub project_id: ProjectId,
    pub project_code: String,
    pub minutes: u64,
    pub billable_minutes: u64,
    pub billable_value: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimesheetSummary {
    pub period: Period,
    pub rows: Vec<TimesheetRow>,
    pub total_minutes: u64,
}

/// Time per user and project within `period`; rejected entries excluded.
pub fn timesheet_summary(entries: &[TimeEntry], projects: &[Project], period: Period) -> TimesheetSummary {
    let codes: HashMap<ProjectId, &str> = projects
        .iter()
        .map(|p| (p.id_typed(), p.code()))
        .collect();

    let mut rows: BTreeMap<(UserId, ProjectId), TimesheetRow> = BTreeMap::new();
    for entry in entries {
        if entry.status() == TimeEntryStatus::Rejected {
            continue;
        }
        let (Some(user_id), Some(project_id), Some(date)) =
            (entry.user_id(), entry.project_id(), entry.work_date())
        else {
            continue;
        };
        if !period.contains(date) {
            continue;
        }
        let row = rows.entry((user_id, project_id)).or_insert_with(|| TimesheetRow {
            user_id,
            project_id,
            project_code: codes.get(&project_id).copied().unwrap_or_default().to_string(),
            minutes: 0,
            billable_minutes: 0,
            billable_value: 0,
        });
        row.minutes += u64::from(entry.minutes());
        if entry.billable() {
            row.billable_minutes += u64::from(entry.minutes());
            row.billable_value = row.billable_value.saturating_add(entry.value());
        }
    }

    let rows: Vec<_> = rows.into_values().collect();
    let total_minutes = rows.iter().map(|r| r.minutes).sum();
    TimesheetSummary {
        period,
        rows,
        total_minutes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aging_bucket_edges() {
        let mut b = AgingBuckets::default();
        b.add(-5, 1);
        b.add(0, 2);
        b.add(1, 10);
        b.add(30, 20);
        b.add(31, 100);
        b.add(60, 200);
        b.add(61, 1_000);
        b.add(90, 2_000);
        b.add(91, 10_000);

        assert_eq!(b.current, 3);
        assert_eq!(b.days_1_30, 30);
        assert_eq!(b.days_31_60, 300);
        assert_eq!(b.days_61_90, 3_000);
        assert_eq!(b.over_90, 10_000);
        assert_eq!(b.total(), 13_333);
    }

    #[test]
    fn period_rejects_reversed_range() {
        let a = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let b = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        assert!(Period::new(a, b).is_err());
        let p = Period::new(b, a).unwrap();
        assert!(p.contains(a) && p.contains(b));
    }

    #[test]
    fn empty_pipeline_has_no_conversion_rate() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let pipeline = quote_pipeline(&[], today);
        assert_eq!(pipeline.stages.len(), 5);
        assert_eq!(pipeline.conversion_rate, None);
        assert!(reorder_list(&[]).is_empty());
        assert_eq!(inventory_valuation(&[], &[]).total_value, 0);
    }
}
