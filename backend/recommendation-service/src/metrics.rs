//! Prometheus metrics for the consumer and the cache layer

use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, IntCounter,
    IntCounterVec, IntGauge,
};

lazy_static::lazy_static! {
    /// Messages taken off the broker, by topic
    pub static ref MESSAGES_RECEIVED: IntCounterVec = register_int_counter_vec!(
        "recommendation_messages_received_total",
        "Messages received from the broker",
        &["topic"]
    ).expect("Prometheus metrics registration should succeed at startup");

    /// Dispatch results by event kind and outcome
    pub static ref MESSAGES_PROCESSED: IntCounterVec = register_int_counter_vec!(
        "recommendation_messages_processed_total",
        "Messages processed by the dispatcher",
        &["kind", "outcome"]
    ).expect("Prometheus metrics registration should succeed at startup");

    /// Messages dropped because the dispatch backlog was full
    pub static ref DISPATCH_REJECTED: IntCounter = register_int_counter!(
        "recommendation_dispatch_rejected_total",
        "Messages rejected because the dispatch backlog was full"
    ).expect("Prometheus metrics registration should succeed at startup");

    pub static ref BROKER_ERRORS: IntCounter = register_int_counter!(
        "recommendation_broker_errors_total",
        "Broker-level errors observed while polling"
    ).expect("Prometheus metrics registration should succeed at startup");

    pub static ref DISPATCH_IN_FLIGHT: IntGauge = register_int_gauge!(
        "recommendation_dispatch_in_flight",
        "Handlers currently executing"
    ).expect("Prometheus metrics registration should succeed at startup");

    pub static ref CACHE_HITS: IntCounterVec = register_int_counter_vec!(
        "recommendation_cache_hits_total",
        "Cache hits by entity",
        &["entity"]
    ).expect("Prometheus metrics registration should succeed at startup");

    pub static ref CACHE_MISSES: IntCounterVec = register_int_counter_vec!(
        "recommendation_cache_misses_total",
        "Cache misses by entity",
        &["entity"]
    ).expect("Prometheus metrics registration should succeed at startup");

    pub static ref CACHE_WRITES: IntCounterVec = register_int_counter_vec!(
        "recommendation_cache_writes_total",
        "Cache writes by entity",
        &["entity"]
    ).expect("Prometheus metrics registration should succeed at startup");

    pub static ref CACHE_ERRORS: IntCounterVec = register_int_counter_vec!(
        "recommendation_cache_errors_total",
        "Cache errors by entity and operation",
        &["entity", "op"]
    ).expect("Prometheus metrics registration should succeed at startup");
}
