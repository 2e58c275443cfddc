//! Request instrumentation and aggregated service metrics.

use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::{
    collections::BTreeMap,
    future::Future,
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};
use tracing::Instrument;

use super::cache::CacheStats;
use crate::{
    error::{AppResult, ErrorKind},
    middleware::CorrelationId,
};

#[derive(Debug, Clone, Default)]
struct Breakdown {
    endpoints: BTreeMap<String, u64>,
    status_codes: BTreeMap<u16, u64>,
    errors: BTreeMap<String, u64>,
}

/// Immutable view of the aggregated metrics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_seconds: u64,
    pub started_at: DateTime<Utc>,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub success_rate: f64,
    pub avg_latency_ms: f64,
    pub requests_by_endpoint: BTreeMap<String, u64>,
    pub status_codes: BTreeMap<u16, u64>,
    pub errors_by_kind: BTreeMap<String, u64>,
    pub cache: CacheStats,
    pub cache_hit_rate: f64,
    pub generated_at: DateTime<Utc>,
}

/// Process-wide request metrics.
///
/// Counters are atomics; the per-endpoint, per-status and per-error maps sit
/// behind a mutex held for one update at a time.
pub struct MetricsTracker {
    started: Instant,
    started_at: DateTime<Utc>,
    successful: AtomicU64,
    failed: AtomicU64,
    latency_micros: AtomicU64,
    breakdown: Mutex<Breakdown>,
}

impl Default for MetricsTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            started_at: Utc::now(),
            successful: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            latency_micros: AtomicU64::new(0),
            breakdown: Mutex::new(Breakdown::default()),
        }
    }

    /// Records one finished request
    pub fn record(
        &self,
        endpoint: &str,
        status: StatusCode,
        error: Option<ErrorKind>,
        elapsed: Duration,
    ) {
        let counter = if error.is_some() {
            &self.failed
        } else {
            &self.successful
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.latency_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);

        let mut breakdown = self.breakdown.lock();
        *breakdown.endpoints.entry(endpoint.to_string()).or_default() += 1;
        *breakdown.status_codes.entry(status.as_u16()).or_default() += 1;
        if let Some(kind) = error {
            *breakdown.errors.entry(kind.as_str().to_string()).or_default() += 1;
        }
    }

    /// Runs `operation` inside a span tagged with the correlation id and
    /// records its outcome and latency
    pub async fn track<T, F>(
        &self,
        endpoint: &str,
        correlation_id: &CorrelationId,
        operation: F,
    ) -> AppResult<T>
    where
        F: Future<Output = AppResult<T>>,
    {
        let span = tracing::info_span!(
            "operation",
            endpoint,
            correlation_id = %correlation_id,
        );
        let start = Instant::now();
        let result = operation.instrument(span.clone()).await;
        let elapsed = start.elapsed();

        span.in_scope(|| match &result {
            Ok(_) => {
                self.record(endpoint, StatusCode::OK, None, elapsed);
                tracing::debug!(elapsed_ms = elapsed.as_millis() as u64, "Request succeeded");
            }
            Err(e) => {
                let kind = e.kind();
                self.record(endpoint, kind.status_code(), Some(kind), elapsed);
                if kind.is_client_fault() {
                    tracing::warn!(error = %e, kind = %kind, "Request failed");
                } else {
                    tracing::error!(error = %e, kind = %kind, "Request failed");
                }
            }
        });

        result
    }

    pub fn snapshot(&self, cache: CacheStats) -> MetricsSnapshot {
        let successful = self.successful.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);
        let total = successful + failed;
        let latency_micros = self.latency_micros.load(Ordering::Relaxed);
        let breakdown = self.breakdown.lock().clone();

        let (success_rate, avg_latency_ms) = if total == 0 {
            (0.0, 0.0)
        } else {
            (
                successful as f64 / total as f64,
                latency_micros as f64 / total as f64 / 1000.0,
            )
        };

        MetricsSnapshot {
            uptime_seconds: self.started.elapsed().as_secs(),
            started_at: self.started_at,
            total_requests: total,
            successful_requests: successful,
            failed_requests: failed,
            success_rate,
            avg_latency_ms,
            requests_by_endpoint: breakdown.endpoints,
            status_codes: breakdown.status_codes,
            errors_by_kind: breakdown.errors,
            cache_hit_rate: cache.hit_rate(),
            cache,
            generated_at: Utc::now(),
        }
    }

    pub fn reset(&self) {
        self.successful.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
        self.latency_micros.store(0, Ordering::Relaxed);
        *self.breakdown.lock() = Breakdown::default();
    }
}
