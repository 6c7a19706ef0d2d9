use lazy_static::lazy_static;
use prometheus::{
    Counter, Gauge, Histogram, IntCounterVec, register_counter, register_gauge, register_histogram,
    register_int_counter_vec,
};

lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("gateway_requests_total", "Total number of requests").unwrap();
    pub static ref REQUEST_OUTCOMES: IntCounterVec = register_int_counter_vec!(
        "gateway_request_outcomes_total",
        "Requests by terminal pipeline state",
        &["outcome"]
    )
    .unwrap();
    pub static ref RATE_LIMITED: Counter =
        register_counter!("gateway_rate_limited_total", "Requests rejected by the rate limiter")
            .unwrap();
    pub static ref CACHE_HITS: Counter =
        register_counter!("gateway_credential_cache_hits_total", "Total credential cache hits")
            .unwrap();
    pub static ref CACHE_MISSES: Counter = register_counter!(
        "gateway_credential_cache_misses_total",
        "Total credential cache misses"
    )
    .unwrap();
    pub static ref CACHE_SIZE: Gauge = register_gauge!(
        "gateway_credential_cache_size",
        "Current number of cached verdicts"
    )
    .unwrap();
    pub static ref BROKER_CALLS: IntCounterVec = register_int_counter_vec!(
        "gateway_broker_calls_total",
        "verifyToken calls to the identity broker by result",
        &["result"]
    )
    .unwrap();
    pub static ref REQUEST_LATENCY: Histogram = register_histogram!(
        "gateway_request_latency_seconds",
        "Time until response headers are ready, in seconds"
    )
    .unwrap();
}
