//! Topic and consumer group names used by the saga.

/// Topic carrying order lifecycle events consumed by the orchestrator.
pub const TOPIC_ORDERS: &str = "orders";

/// Topic carrying payment work items consumed by the payment processor.
pub const TOPIC_PAYMENTS: &str = "payments";

/// Topic carrying status-change notifications for external consumers.
pub const TOPIC_ORDER_STATUS: &str = "order-status";

/// The orchestrator's consumer group on [`TOPIC_ORDERS`].
pub const GROUP_ORCHESTRATOR: &str = "order-saga";

/// The payment processor's consumer group on [`TOPIC_PAYMENTS`].
pub const GROUP_PAYMENT_PROCESSOR: &str = "payment-processor";
