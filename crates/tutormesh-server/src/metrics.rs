// tutormesh-server/src/metrics.rs
// ============================================================================
// Module: Server Metrics Registry
// Description: In-process metrics registry with text-format rendering.
// Purpose: Serve counters, histograms, and gauges at GET /metrics.
// Dependencies: tutormesh-core
// ============================================================================

//! ## Overview
//! The registry implements the core [`MetricsSink`] with plain synchronized
//! state and renders the pull-based text exposition format. It is
//! intentionally dependency-light; deployments that prefer Prometheus or
//! OpenTelemetry client libraries can swap the sink without touching the
//! core. Series: request counts by intent and outcome, triage and mastery
//! latency histograms, per-target breaker state gauges, per-partition
//! consumer lag, dead-letter and audit-drop counters.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::Mutex;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tutormesh_core::AgentId;
use tutormesh_core::BreakerState;
use tutormesh_core::IntentTag;
use tutormesh_core::MetricsSink;
use tutormesh_core::RequestOutcome;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Latency buckets in milliseconds for request histograms.
pub const LATENCY_BUCKETS_MS: &[u64] =
    &[1, 2, 5, 10, 25, 50, 100, 250, 500, 1_000, 2_500, 5_000, 10_000, 30_000];

// ============================================================================
// SECTION: Histogram
// ============================================================================

/// Cumulative latency histogram over [`LATENCY_BUCKETS_MS`].
#[derive(Debug, Default, Clone)]
struct Histogram {
    /// Per-bucket observation counts (non-cumulative).
    buckets: Vec<u64>,
    /// Sum of observed latencies in milliseconds.
    sum_ms: u64,
    /// Total observations.
    count: u64,
}

impl Histogram {
    /// Records one latency observation.
    fn observe(&mut self, latency: Duration) {
        if self.buckets.is_empty() {
            self.buckets = vec![0; LATENCY_BUCKETS_MS.len()];
        }
        let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        for (index, bound) in LATENCY_BUCKETS_MS.iter().enumerate() {
            if millis <= *bound {
                if let Some(slot) = self.buckets.get_mut(index) {
                    *slot += 1;
                }
                break;
            }
        }
        self.sum_ms = self.sum_ms.saturating_add(millis);
        self.count += 1;
    }

    /// Renders the histogram series under the given name and label set.
    fn render(&self, out: &mut String, name: &str, labels: &str) {
        let mut cumulative = 0_u64;
        for (index, bound) in LATENCY_BUCKETS_MS.iter().enumerate() {
            cumulative += self.buckets.get(index).copied().unwrap_or(0);
            let _ = writeln!(out, "{name}_bucket{{{labels}le=\"{bound}\"}} {cumulative}");
        }
        let _ = writeln!(out, "{name}_bucket{{{labels}le=\"+Inf\"}} {}", self.count);
        let _ = writeln!(out, "{name}_sum{{{labels}}} {}", self.sum_ms);
        let _ = writeln!(out, "{name}_count{{{labels}}} {}", self.count);
    }
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// In-process metrics registry.
#[derive(Default)]
pub struct RegistryMetrics {
    /// Triage request counts keyed by (intent, outcome).
    triage_requests: Mutex<BTreeMap<(&'static str, &'static str), u64>>,
    /// Mastery request counts keyed by (endpoint, outcome).
    mastery_requests: Mutex<BTreeMap<(&'static str, &'static str), u64>>,
    /// Triage latency histogram.
    triage_latency: Mutex<Histogram>,
    /// Mastery latency histograms keyed by endpoint.
    mastery_latency: Mutex<BTreeMap<&'static str, Histogram>>,
    /// Breaker state per target.
    breaker_states: Mutex<BTreeMap<String, BreakerState>>,
    /// Consumer lag per partition.
    consumer_lag: Mutex<BTreeMap<u32, u64>>,
    /// Dead-lettered payload count.
    dead_letters: AtomicU64,
    /// Dropped audit count.
    audit_drops: AtomicU64,
}

impl RegistryMetrics {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current dead-letter count.
    #[must_use]
    pub fn dead_letter_count(&self) -> u64 {
        self.dead_letters.load(Ordering::Relaxed)
    }

    /// Returns the current audit-drop count.
    #[must_use]
    pub fn audit_drop_count(&self) -> u64 {
        self.audit_drops.load(Ordering::Relaxed)
    }

    /// Renders every series in the text exposition format.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();

        let _ = writeln!(out, "# TYPE tutormesh_triage_requests_total counter");
        if let Ok(counts) = self.triage_requests.lock() {
            for ((intent, outcome), count) in counts.iter() {
                let _ = writeln!(
                    out,
                    "tutormesh_triage_requests_total{{intent=\"{intent}\",outcome=\"{outcome}\"}} {count}"
                );
            }
        }

        let _ = writeln!(out, "# TYPE tutormesh_mastery_requests_total counter");
        if let Ok(counts) = self.mastery_requests.lock() {
            for ((endpoint, outcome), count) in counts.iter() {
                let _ = writeln!(
                    out,
                    "tutormesh_mastery_requests_total{{endpoint=\"{endpoint}\",outcome=\"{outcome}\"}} {count}"
                );
            }
        }

        let _ = writeln!(out, "# TYPE tutormesh_triage_latency_ms histogram");
        if let Ok(histogram) = self.triage_latency.lock() {
            histogram.render(&mut out, "tutormesh_triage_latency_ms", "");
        }

        let _ = writeln!(out, "# TYPE tutormesh_mastery_latency_ms histogram");
        if let Ok(histograms) = self.mastery_latency.lock() {
            for (endpoint, histogram) in histograms.iter() {
                histogram.render(
                    &mut out,
                    "tutormesh_mastery_latency_ms",
                    &format!("endpoint=\"{endpoint}\","),
                );
            }
        }

        let _ = writeln!(out, "# TYPE tutormesh_breaker_state gauge");
        if let Ok(states) = self.breaker_states.lock() {
            for (target, state) in states.iter() {
                let value = match state {
                    BreakerState::Closed => 0,
                    BreakerState::Open => 1,
                    BreakerState::HalfOpen => 2,
                };
                let _ = writeln!(out, "tutormesh_breaker_state{{target=\"{target}\"}} {value}");
            }
        }

        let _ = writeln!(out, "# TYPE tutormesh_consumer_lag gauge");
        if let Ok(lags) = self.consumer_lag.lock() {
            for (partition, lag) in lags.iter() {
                let _ =
                    writeln!(out, "tutormesh_consumer_lag{{partition=\"{partition}\"}} {lag}");
            }
        }

        let _ = writeln!(out, "# TYPE tutormesh_dead_letter_total counter");
        let _ = writeln!(out, "tutormesh_dead_letter_total {}", self.dead_letter_count());
        let _ = writeln!(out, "# TYPE tutormesh_audit_dropped_total counter");
        let _ = writeln!(out, "tutormesh_audit_dropped_total {}", self.audit_drop_count());
        out
    }
}

impl MetricsSink for RegistryMetrics {
    fn record_triage(&self, intent: IntentTag, outcome: RequestOutcome, latency: Duration) {
        if let Ok(mut counts) = self.triage_requests.lock() {
            *counts.entry((intent.as_str(), outcome.as_str())).or_insert(0) += 1;
        }
        if let Ok(mut histogram) = self.triage_latency.lock() {
            histogram.observe(latency);
        }
    }

    fn record_mastery(&self, endpoint: &'static str, outcome: RequestOutcome, latency: Duration) {
        if let Ok(mut counts) = self.mastery_requests.lock() {
            *counts.entry((endpoint, outcome.as_str())).or_insert(0) += 1;
        }
        if let Ok(mut histograms) = self.mastery_latency.lock() {
            histograms.entry(endpoint).or_default().observe(latency);
        }
    }

    fn set_breaker_state(&self, target: &AgentId, state: BreakerState) {
        if let Ok(mut states) = self.breaker_states.lock() {
            states.insert(target.as_str().to_string(), state);
        }
    }

    fn set_consumer_lag(&self, partition: u32, lag: u64) {
        if let Ok(mut lags) = self.consumer_lag.lock() {
            lags.insert(partition, lag);
        }
    }

    fn incr_dead_letter(&self) {
        self.dead_letters.fetch_add(1, Ordering::Relaxed);
    }

    fn incr_audit_drop(&self) {
        self.audit_drops.fetch_add(1, Ordering::Relaxed);
    }
}
