use lazy_static::lazy_static;
use prometheus::{register_int_counter_vec, IntCounterVec};

lazy_static! {
    /// Vote attempts by outcome (accepted, duplicate, rejected, error).
    pub static ref TAG_VOTES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "tag_votes_total",
        "Tag vote attempts segmented by result",
        &["result"]
    )
    .expect("failed to register tag_votes_total");
}
