/// Prometheus instrumentation for the bridge core.
///
/// Catalog is scoped to what the Observer, Recorder, and the two engines
/// actually emit: pipeline progress/throughput, chain tip tracking, and
/// latency histograms for RPC/DB calls. Labels are kept low-cardinality
/// (chain id, state, stage) per standard practice.
use lazy_static::lazy_static;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};

const LATENCY_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0];

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    /// Blocks accepted into block_log, by chain.
    pub static ref BLOCKS_INGESTED: IntCounterVec = IntCounterVec::new(
        Opts::new("xbridge_blocks_ingested_total", "Total blocks accepted into block_log"),
        &["chain_id"]
    ).unwrap();

    /// Blocks deleted by fork handling, by chain.
    pub static ref FORKS_HANDLED: IntCounterVec = IntCounterVec::new(
        Opts::new("xbridge_forks_handled_total", "Total tip deletions triggered by a parent-hash mismatch"),
        &["chain_id"]
    ).unwrap();

    /// Domain events recorded, by chain and family.
    pub static ref EVENTS_RECORDED: IntCounterVec = IntCounterVec::new(
        Opts::new("xbridge_events_recorded_total", "Domain rows inserted by the recorder"),
        &["chain_id", "family"]
    ).unwrap();

    /// State transitions made by either engine, by chain and target state.
    pub static ref STATE_TRANSITIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("xbridge_state_transitions_total", "Rows moved into a given state"),
        &["chain_id", "entity", "state"]
    ).unwrap();

    /// Highest committed BlockLog height, by chain.
    pub static ref CHAIN_TIP_HEIGHT: IntGaugeVec = IntGaugeVec::new(
        Opts::new("xbridge_chain_tip_height", "Highest committed block_log height"),
        &["chain_id"]
    ).unwrap();

    /// Age (seconds) of the LatestBlockCached pointer, by chain.
    pub static ref LATEST_BLOCK_AGE_SECONDS: IntGaugeVec = IntGaugeVec::new(
        Opts::new("xbridge_latest_block_age_seconds", "Age of the in-memory latest-block cache"),
        &["chain_id"]
    ).unwrap();

    /// RPC call latency, by method.
    pub static ref RPC_CALL_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new("xbridge_rpc_call_duration_seconds", "Chain RPC call latency")
            .buckets(LATENCY_BUCKETS.to_vec()),
        &["method"]
    ).unwrap();

    /// DB call latency, by operation.
    pub static ref DB_CALL_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new("xbridge_db_call_duration_seconds", "Store call latency")
            .buckets(LATENCY_BUCKETS.to_vec()),
        &["operation"]
    ).unwrap();

    /// Alerts emitted through the alert sink.
    pub static ref ALERTS_EMITTED: IntCounterVec = IntCounterVec::new(
        Opts::new("xbridge_alerts_emitted_total", "Alerts sent through the external alert sink"),
        &["chain_id"]
    ).unwrap();
}

pub fn register_all() {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(BLOCKS_INGESTED.clone()),
        Box::new(FORKS_HANDLED.clone()),
        Box::new(EVENTS_RECORDED.clone()),
        Box::new(STATE_TRANSITIONS.clone()),
        Box::new(CHAIN_TIP_HEIGHT.clone()),
        Box::new(LATEST_BLOCK_AGE_SECONDS.clone()),
        Box::new(RPC_CALL_DURATION.clone()),
        Box::new(DB_CALL_DURATION.clone()),
        Box::new(ALERTS_EMITTED.clone()),
    ];
    for c in collectors {
        // Safe to ignore AlreadyReg errors from repeated init in tests.
        let _ = REGISTRY.register(c);
    }
}

pub fn gather_text() -> String {
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap_or_default()
}

/// Timer helper matching the teacher's call-site pattern:
/// `let _t = timer(&RPC_CALL_DURATION, "header_by_number");`
pub fn timer(hist: &HistogramVec, label: &str) -> prometheus::HistogramTimer {
    hist.with_label_values(&[label]).start_timer()
}
