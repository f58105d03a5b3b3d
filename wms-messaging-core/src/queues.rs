// wms-messaging-core/src/queues.rs
//! Queues the gateway forwards to, keyed by the flow that feeds them.
//!
//! Names match the broker's management UI. Only the order-download queue has
//! dead-letter routing; a new queue that needs it gets a variant here.

use crate::types::{DeadLetter, QueueSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KnownQueue {
    OrderDownload,
    OrderDelivery,
    RefundOrder,
    ReturnOrderNotice,
    StockoutPush,
    ReturnOrderEntry,
    ExchangeOrder,
    AllocationOut,
    AllocationIn,
    InventoryEntry,
}

impl KnownQueue {
    pub const ALL: [KnownQueue; 10] = [
        KnownQueue::OrderDownload,
        KnownQueue::OrderDelivery,
        KnownQueue::RefundOrder,
        KnownQueue::ReturnOrderNotice,
        KnownQueue::StockoutPush,
        KnownQueue::ReturnOrderEntry,
        KnownQueue::ExchangeOrder,
        KnownQueue::AllocationOut,
        KnownQueue::AllocationIn,
        KnownQueue::InventoryEntry,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            KnownQueue::OrderDownload => "oms_sales_order_download_queue",
            KnownQueue::OrderDelivery => "sale_order_add_back",
            KnownQueue::RefundOrder => "oms_return_order_download_queue",
            KnownQueue::ReturnOrderNotice => "sale_return_plan_add_back_b2c",
            KnownQueue::StockoutPush => "purchase_return_plan_add_back",
            KnownQueue::ReturnOrderEntry => "sale_return_plan_add_back",
            KnownQueue::ExchangeOrder => "oms_exchange_order_download_queue",
            KnownQueue::AllocationOut => "stock_out_back",
            KnownQueue::AllocationIn => "entry_order_add_back_other",
            KnownQueue::InventoryEntry => "inventory_return_order_back",
        }
    }

    pub const fn dead_letter(self) -> Option<DeadLetter> {
        match self {
            KnownQueue::OrderDownload => Some(DeadLetter {
                exchange: "dead_oms_order_center_exchange",
                routing_key: "dead_oms_sales_order_download_routing_key",
            }),
            _ => None,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|q| q.name() == name)
    }

    pub fn spec(self) -> QueueSpec {
        let spec = QueueSpec::durable(self.name());
        match self.dead_letter() {
            Some(dl) => spec.with_dead_letter(dl),
            None => spec,
        }
    }
}

impl std::fmt::Display for KnownQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl QueueSpec {
    /// Declaration for any queue name; unknown names are plain durable queues.
    pub fn for_name(name: &str) -> Self {
        KnownQueue::from_name(name)
            .map(KnownQueue::spec)
            .unwrap_or_else(|| QueueSpec::durable(name))
    }
}
