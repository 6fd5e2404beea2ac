use crate::models::OwnerKind;
use lazy_static::lazy_static;
use prometheus::{register_histogram_vec, register_int_counter_vec, HistogramVec, IntCounterVec};

lazy_static! {
    /// Owner writes mirrored into the post index, by operation and outcome.
    pub static ref INDEX_SYNC_OPERATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "index_sync_operations_total",
        "Post index synchronization steps segmented by operation, owner type and result",
        &["operation", "owner_type", "result"]
    )
    .expect("failed to register index_sync_operations_total");

    /// Duration of the owner+index transaction.
    pub static ref INDEX_SYNC_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "index_sync_duration_seconds",
        "Duration of owner write transactions including index mirroring",
        &["operation"]
    )
    .expect("failed to register index_sync_duration_seconds");
}

pub fn record(operation: &str, kind: OwnerKind, ok: bool) {
    INDEX_SYNC_OPERATIONS_TOTAL
        .with_label_values(&[operation, kind.as_str(), if ok { "ok" } else { "error" }])
        .inc();
}
