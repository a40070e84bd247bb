//! Purchasing domain module (purchase orders sent to suppliers).
//!
//! Pure domain logic: no IO, no HTTP, no storage. Stock effects of a
//! delivery are applied by the infra layer from [`GoodsReceived`].

pub mod order;

pub use order::{
    AddPurchaseLine, ApprovePurchaseOrder, CancelPurchaseOrder, ClosePurchaseOrder,
    CreatePurchaseOrder, GoodsReceived, PurchaseLine, PurchaseLineAdded, PurchaseLineRemoved,
    PurchaseOrder, PurchaseOrderApproved, PurchaseOrderCancelled, PurchaseOrderClosed,
    PurchaseOrderCommand, PurchaseOrderCreated, PurchaseOrderEvent, PurchaseOrderId,
    PurchaseOrderSent, PurchaseOrderStatus, Receipt, ReceiveGoods, ReceivedLine,
    RemovePurchaseLine, SendPurchaseOrder,
};
