//! OpenTelemetry instruments and tracing spans.
//!
//! Instruments are registered on the global meter provider; installing an
//! exporter is left to the application.

#[cfg(feature = "metrics")]
use once_cell::sync::Lazy;
#[cfg(feature = "metrics")]
use opentelemetry::{
    global,
    metrics::{Counter, Histogram},
    KeyValue,
};
#[cfg(feature = "metrics")]
use std::time::Duration;

#[cfg(feature = "metrics")]
pub static METRICS: Lazy<LifelineMetrics> = Lazy::new(LifelineMetrics::init);

#[cfg(feature = "metrics")]
pub struct LifelineMetrics {
    pub queries_total: Counter<u64>,
    pub query_duration: Histogram<f64>,
    pub query_errors: Counter<u64>,
    pub session_acquire_duration: Histogram<f64>,
    pub transactions_total: Counter<u64>,
}

#[cfg(feature = "metrics")]
impl LifelineMetrics {
    pub fn init() -> Self {
        let meter = global::meter("lifeline");

        let queries_total = meter
            .u64_counter("lifeline_queries_total")
            .with_description("Total queries executed")
            .build();

        let query_duration = meter
            .f64_histogram("lifeline_query_duration_seconds")
            .with_description("Duration of queries")
            .build();

        let query_errors = meter
            .u64_counter("lifeline_query_errors_total")
            .with_description("Queries that failed")
            .build();

        let session_acquire_duration = meter
            .f64_histogram("lifeline_session_acquire_seconds")
            .with_description("Time spent opening a session")
            .build();

        let transactions_total = meter
            .u64_counter("lifeline_transactions_total")
            .with_description("Completed transactions by outcome")
            .build();

        Self {
            queries_total,
            query_duration,
            query_errors,
            session_acquire_duration,
            transactions_total,
        }
    }

    pub fn record_query(&self, elapsed: Duration) {
        self.queries_total.add(1, &[]);
        self.query_duration.record(elapsed.as_secs_f64(), &[]);
    }

    pub fn record_query_error(&self) {
        self.query_errors.add(1, &[]);
    }

    pub fn record_session_acquire(&self, elapsed: Duration) {
        self.session_acquire_duration
            .record(elapsed.as_secs_f64(), &[]);
    }

    /// `outcome` is `committed` or `rolled_back`
    pub fn record_transaction(&self, outcome: &'static str) {
        self.transactions_total
            .add(1, &[KeyValue::new("outcome", outcome)]);
    }
}

#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    use tracing::{info_span, Span};

    pub fn execute_query_span(sql: &str) -> Span {
        info_span!("lifeline.query", db.statement = sql)
    }

    pub fn acquire_session_span() -> Span {
        info_span!("lifeline.session.acquire")
    }

    pub fn begin_transaction_span() -> Span {
        info_span!("lifeline.transaction.begin")
    }

    pub fn commit_transaction_span() -> Span {
        info_span!("lifeline.transaction.commit")
    }

    pub fn rollback_transaction_span() -> Span {
        info_span!("lifeline.transaction.rollback")
    }
}
