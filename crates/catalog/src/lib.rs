//! Catalog: reusable priced items, and the line arithmetic every priced
//! document (quote, invoice, purchase order) shares.

pub mod item;
pub mod pricing;

pub use item::{
    ArchiveCatalogItem, CatalogItem, CatalogItemArchived, CatalogItemCommand, CatalogItemCreated,
    CatalogItemEvent, CatalogItemId, CatalogItemReactivated, CatalogItemStatus,
    CreateCatalogItem, PricingUpdated, ReactivateCatalogItem, UpdatePricing,
};
pub use pricing::{DocumentTotals, PricedLine, compute_totals, renumber};
