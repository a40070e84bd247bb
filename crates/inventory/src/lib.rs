//! Inventory domain module: on-hand stock of catalog items that track inventory.
//!
//! Pure domain logic (no IO, no HTTP, no storage).

pub mod stock;

pub use stock::{
    AdjustStock, AdjustmentReason, CreateStockItem, InventoryCommand, InventoryEvent,
    ReorderLevelSet, SetReorderLevel, StockAdjusted, StockItem, StockItemCreated, StockItemId,
};
