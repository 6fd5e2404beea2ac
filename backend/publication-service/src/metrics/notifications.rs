use lazy_static::lazy_static;
use prometheus::{register_int_counter_vec, register_int_gauge, IntCounterVec, IntGauge};

lazy_static! {
    /// New-post notifications by outcome (queued, dropped, sent, skipped, failed).
    pub static ref NOTIFICATION_DISPATCH_TOTAL: IntCounterVec = register_int_counter_vec!(
        "notification_dispatch_total",
        "New-post notification events segmented by result",
        &["result"]
    )
    .expect("failed to register notification_dispatch_total");

    /// Events waiting in the dispatch queue.
    pub static ref NOTIFICATION_QUEUE_DEPTH: IntGauge = register_int_gauge!(
        "notification_queue_depth",
        "Number of notification events waiting for the dispatch worker"
    )
    .expect("failed to register notification_queue_depth");
}
