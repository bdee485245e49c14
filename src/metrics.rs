//! Observability hooks.
//!
//! With the `metrics` feature, [`METRICS`] holds OpenTelemetry instruments
//! exported through a Prometheus registry served at `GET /metrics`.
//! With the `tracing` feature, [`tracing_helpers`] provides the spans wrapped
//! around pool checkout, transaction boundaries and statements.

#[cfg(feature = "metrics")]
pub use self::prometheus_metrics::{CatalogMetrics, METRICS};

#[cfg(feature = "metrics")]
mod prometheus_metrics {
    use once_cell::sync::Lazy;
    use opentelemetry::metrics::{Counter, Histogram, MeterProvider};
    use opentelemetry::KeyValue;
    use opentelemetry_sdk::metrics::SdkMeterProvider;
    use prometheus::{Encoder, Registry, TextEncoder};
    use std::time::Duration;

    pub static METRICS: Lazy<CatalogMetrics> = Lazy::new(CatalogMetrics::init);

    pub struct CatalogMetrics {
        registry: Registry,
        _provider: SdkMeterProvider,
        queries_total: Counter<u64>,
        query_errors_total: Counter<u64>,
        query_duration: Histogram<f64>,
        pool_wait_duration: Histogram<f64>,
        http_requests_total: Counter<u64>,
        http_request_duration: Histogram<f64>,
    }

    impl CatalogMetrics {
        pub fn init() -> Self {
            let registry = Registry::new();
            let exporter = opentelemetry_prometheus::exporter()
                .with_registry(registry.clone())
                .build()
                .expect("failed to build prometheus exporter");
            let provider = SdkMeterProvider::builder().with_reader(exporter).build();
            let meter = provider.meter("catalog");

            let queries_total = meter
                .u64_counter("catalog_queries_total")
                .with_description("Total SQL statements executed")
                .build();
            let query_errors_total = meter
                .u64_counter("catalog_query_errors_total")
                .with_description("SQL statements that failed")
                .build();
            let query_duration = meter
                .f64_histogram("catalog_query_duration_seconds")
                .with_description("Duration of SQL statements")
                .build();
            let pool_wait_duration = meter
                .f64_histogram("catalog_pool_wait_seconds")
                .with_description("Time spent waiting for a pooled connection")
                .build();
            let http_requests_total = meter
                .u64_counter("catalog_http_requests_total")
                .with_description("HTTP requests served")
                .build();
            let http_request_duration = meter
                .f64_histogram("catalog_http_request_duration_seconds")
                .with_description("Duration of HTTP requests")
                .build();

            Self {
                registry,
                _provider: provider,
                queries_total,
                query_errors_total,
                query_duration,
                pool_wait_duration,
                http_requests_total,
                http_request_duration,
            }
        }

        pub fn record_query_duration(&self, elapsed: Duration) {
            self.queries_total.add(1, &[]);
            self.query_duration.record(elapsed.as_secs_f64(), &[]);
        }

        pub fn record_query_error(&self) {
            self.query_errors_total.add(1, &[]);
        }

        pub fn record_pool_wait(&self, elapsed: Duration) {
            self.pool_wait_duration.record(elapsed.as_secs_f64(), &[]);
        }

        pub fn record_http_request(&self, method: &str, status: u16, elapsed: Duration) {
            let attrs = [
                KeyValue::new("method", method.to_string()),
                KeyValue::new("status", i64::from(status)),
            ];
            self.http_requests_total.add(1, &attrs);
            self.http_request_duration
                .record(elapsed.as_secs_f64(), &attrs);
        }

        /// Prometheus text exposition of every registered metric
        pub fn render(&self) -> Vec<u8> {
            let encoder = TextEncoder::new();
            let mut buffer = Vec::new();
            if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
                log::error!("failed to encode metrics: {e}");
            }
            buffer
        }
    }
}

#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    use tracing::Span;

    pub fn acquire_connection_span() -> Span {
        tracing::debug_span!("catalog.pool.checkout")
    }

    pub fn begin_transaction_span() -> Span {
        tracing::debug_span!("catalog.transaction.begin")
    }

    pub fn commit_transaction_span() -> Span {
        tracing::debug_span!("catalog.transaction.commit")
    }

    pub fn rollback_transaction_span() -> Span {
        tracing::debug_span!("catalog.transaction.rollback")
    }

    pub fn execute_query_span(query: &str) -> Span {
        tracing::debug_span!("catalog.query", db.statement = %query)
    }

    pub fn http_request_span(method: &str, path: &str) -> Span {
        tracing::info_span!("catalog.http", http.method = %method, http.path = %path)
    }
}
