//! Advisory counters of store traffic and claim outcomes.
//!
//! Counters are kept per fleet in their own prometheus [`Registry`]; nothing
//! reads them for correctness.


use std::sync::Arc;
use std::time::Duration;

use prometheus::Encoder;
use prometheus::IntCounter;
use prometheus::Registry;
use prometheus::TextEncoder;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing::warn;
use tracing::Instrument;

pub struct FleetMetrics {
    registry: Registry,
    pub job_queries: IntCounter,
    pub job_query_results: IntCounter,
    pub claim_attempts: IntCounter,
    pub claim_successes: IntCounter,
    pub claim_conflicts: IntCounter,
    pub store_faults: IntCounter,
    pub deliveries: IntCounter,
    pub jobs_created: IntCounter,
    pub promotions: IntCounter,
    pub holds: IntCounter,
}

/// Point-in-time copy of every counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeteringSnapshot {
    pub job_queries: u64,
    pub job_query_results: u64,
    pub claim_attempts: u64,
    pub claim_successes: u64,
    pub claim_conflicts: u64,
    pub store_faults: u64,
    pub deliveries: u64,
    pub jobs_created: u64,
    pub promotions: u64,
    pub holds: u64,
}

impl Default for FleetMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl FleetMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();
        let counter = |name: &str, help: &str| {
            let c = IntCounter::new(name, help).expect("metric can not be created");
            registry
                .register(Box::new(c.clone()))
                .expect("collector can be registered");
            c
        };

        Self {
            job_queries: counter("job_queries", "Proximity queries against the job store"),
            job_query_results: counter("job_query_results", "Jobs returned by proximity queries"),
            claim_attempts: counter("claim_attempts", "Optimistic claim attempts"),
            claim_successes: counter("claim_successes", "Claims that won the version check"),
            claim_conflicts: counter("claim_conflicts", "Claims lost to a concurrent writer"),
            store_faults: counter("store_faults", "Store operations that failed for other reasons"),
            deliveries: counter("deliveries", "Completed deliveries"),
            jobs_created: counter("jobs_created", "Jobs created by backlog replenishment"),
            promotions: counter("promotions", "OnHold jobs promoted back to Waiting"),
            holds: counter("holds", "Delivered jobs parked OnHold"),
            registry,
        }
    }

    pub fn snapshot(&self) -> MeteringSnapshot {
        MeteringSnapshot {
            job_queries: self.job_queries.get(),
            job_query_results: self.job_query_results.get(),
            claim_attempts: self.claim_attempts.get(),
            claim_successes: self.claim_successes.get(),
            claim_conflicts: self.claim_conflicts.get(),
            store_faults: self.store_faults.get(),
            deliveries: self.deliveries.get(),
            jobs_created: self.jobs_created.get(),
            promotions: self.promotions.get(),
            holds: self.holds.get(),
        }
    }

    /// Counters in the prometheus text exposition format.
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            warn!("could not encode fleet metrics: {}", e);
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl MeteringSnapshot {
    /// Counter growth since `earlier`.
    pub fn since(
        &self,
        earlier: &MeteringSnapshot,
    ) -> MeteringSnapshot {
        MeteringSnapshot {
            job_queries: self.job_queries.saturating_sub(earlier.job_queries),
            job_query_results: self.job_query_results.saturating_sub(earlier.job_query_results),
            claim_attempts: self.claim_attempts.saturating_sub(earlier.claim_attempts),
            claim_successes: self.claim_successes.saturating_sub(earlier.claim_successes),
            claim_conflicts: self.claim_conflicts.saturating_sub(earlier.claim_conflicts),
            store_faults: self.store_faults.saturating_sub(earlier.store_faults),
            deliveries: self.deliveries.saturating_sub(earlier.deliveries),
            jobs_created: self.jobs_created.saturating_sub(earlier.jobs_created),
            promotions: self.promotions.saturating_sub(earlier.promotions),
            holds: self.holds.saturating_sub(earlier.holds),
        }
    }
}

/// Logs per-interval rates until `shutdown` is cancelled.
pub fn spawn_metering_reporter(
    metrics: Arc<FleetMetrics>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // the first tick completes immediately
        ticker.tick().await;
        let secs = interval.as_secs_f64().max(f64::EPSILON);
        let mut last = metrics.snapshot();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let now = metrics.snapshot();
                    let delta = now.since(&last);
                    info!(
                        "metering: {:.0} queries/s ({:.1} results/query), {:.0} claims/s, {:.0} conflicts/s, {:.0} deliveries/s",
                        delta.job_queries as f64 / secs,
                        delta.job_query_results as f64 / delta.job_queries.max(1) as f64,
                        delta.claim_successes as f64 / secs,
                        delta.claim_conflicts as f64 / secs,
                        delta.deliveries as f64 / secs,
                    );
                    last = now;
                }
            }
        }
    }
    .in_current_span())
}
