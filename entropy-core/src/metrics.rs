// SPDX-License-Identifier: MIT
//
// QRNG Entropy Engine: Multi-Technique Quantum Randomness Service
// Copyright (c) 2025 Valer Bocan, PhD, CSSLP
// Email: valer.bocan@upt.ro
//
// Department of Computer and Information Technology
// Politehnica University of Timisoara
//
// https://github.com/yourusername/qrng-entropy-engine

//! Generation metrics: rolling distributions, quality tracking and health scoring
//!
//! Every finished generation is folded in as a [`GenerationEvent`]. Two windows back the
//! derived views:
//!
//! - a count-bounded history of the last `history_size` (1000) successful events feeds the
//!   averages, peak and percentile statistics
//! - a 60 second feed (also capped at `history_size`) backs the live throughput chart
//!
//! All mutable state sits behind one `RwLock`, so each `record` is atomic and every
//! snapshot is consistent at a single instant.

use crate::{
    analysis::QualityMetrics,
    technique::TechniqueId,
    window::MetricWindow,
    ErrorKind,
};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Floor applied to elapsed time before computing throughput
const MIN_ELAPSED_SECS: f64 = 0.001;

#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Events kept for percentile statistics
    pub history_size: usize,
    /// Age bound of the throughput feed
    pub feed_horizon: Duration,
    /// Quality samples kept for current/average/min/max
    pub quality_window: usize,
    /// Events listed under recent activity
    pub recent_activity: usize,
    /// Events averaged for the instantaneous throughput
    pub instantaneous_window: usize,
    /// A request within this span marks the system active
    pub activity_window: Duration,
    pub target_throughput_mbps: f64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            history_size: 1000,
            feed_horizon: Duration::from_secs(60),
            quality_window: 100,
            recent_activity: 20,
            instantaneous_window: 10,
            activity_window: Duration::from_secs(60),
            target_throughput_mbps: crate::DEFAULT_TARGET_THROUGHPUT_MBPS,
        }
    }
}

/// How a generation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    Success,
    Failure(ErrorKind),
}

/// One completed (or failed) generation
#[derive(Debug, Clone)]
pub struct GenerationEvent {
    pub technique: TechniqueId,
    pub bytes: usize,
    pub elapsed: Duration,
    pub quality: Option<QualityMetrics>,
    pub outcome: EventOutcome,
}

impl GenerationEvent {
    pub fn success(technique: TechniqueId, bytes: usize, elapsed: Duration) -> Self {
        Self {
            technique,
            bytes,
            elapsed,
            quality: None,
            outcome: EventOutcome::Success,
        }
    }

    pub fn failure(technique: TechniqueId, elapsed: Duration, kind: ErrorKind) -> Self {
        Self {
            technique,
            bytes: 0,
            elapsed,
            quality: None,
            outcome: EventOutcome::Failure(kind),
        }
    }

    pub fn with_quality(mut self, quality: QualityMetrics) -> Self {
        self.quality = Some(quality);
        self
    }

    fn check(&self) -> std::result::Result<(), &'static str> {
        if self.outcome != EventOutcome::Success && self.bytes != 0 {
            return Err("failed event carrying bytes");
        }
        if let Some(q) = &self.quality {
            if !(0.0..=8.0).contains(&q.entropy) {
                return Err("entropy outside [0, 8]");
            }
            if !(0.0..=1.0).contains(&q.uniformity_score) {
                return Err("uniformity outside [0, 1]");
            }
        }
        Ok(())
    }
}

/// Throughput of one event in Mbit/s
pub fn throughput_mbps(bytes: usize, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64().max(MIN_ELAPSED_SECS);
    (bytes as f64 * 8.0) / secs / 1_000_000.0
}

/// Per-technique counters, monotonically accumulating
#[derive(Debug, Clone, Default, Serialize)]
pub struct SourceStatistics {
    pub requests: u64,
    pub bytes_generated: u64,
    pub total_time_seconds: f64,
    pub error_count: u64,
    pub average_throughput_mbps: f64,
}

#[derive(Debug, Clone)]
struct EventSample {
    wall: DateTime<Utc>,
    technique: TechniqueId,
    bytes: usize,
    throughput_mbps: f64,
    latency_ms: f64,
}

#[derive(Debug, Clone, Copy)]
struct QualitySample {
    wall: DateTime<Utc>,
    entropy: f64,
    uniformity: f64,
}

/// Linear interpolation between order statistics; `sorted` must be ascending and non-empty
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    let rank = (p / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Percentiles {
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

/// Summary statistics over a window of values
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Distribution {
    pub mean: f64,
    pub median: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub percentiles: Percentiles,
}

impl Distribution {
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let n = sorted.len() as f64;
        let mean = sorted.iter().sum::<f64>() / n;
        let std = (sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();

        Some(Self {
            mean,
            median: percentile(&sorted, 50.0),
            std,
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            percentiles: Percentiles {
                p25: percentile(&sorted, 25.0),
                p50: percentile(&sorted, 50.0),
                p75: percentile(&sorted, 75.0),
                p90: percentile(&sorted, 90.0),
                p95: percentile(&sorted, 95.0),
                p99: percentile(&sorted, 99.0),
            },
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthGrade {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl HealthGrade {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            Self::Excellent
        } else if score >= 0.6 {
            Self::Good
        } else if score >= 0.4 {
            Self::Fair
        } else {
            Self::Poor
        }
    }
}

/// Composite health, recomputed on every read
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HealthScore {
    pub overall: f64,
    pub throughput_health: f64,
    pub latency_health: f64,
    pub uptime_health: f64,
    pub grade: HealthGrade,
}

impl HealthScore {
    /// Mean of three sub-scores, each clamped to [0, 1]:
    /// `avg_tp / target`, `1 - avg_latency_ms / 1000` and `uptime / 3600`
    pub fn compute(
        average_throughput_mbps: f64,
        average_latency_ms: f64,
        uptime_seconds: f64,
        target_mbps: f64,
    ) -> Self {
        let throughput_health = if target_mbps > 0.0 {
            (average_throughput_mbps / target_mbps).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let latency_health = (1.0 - average_latency_ms / 1000.0).clamp(0.0, 1.0);
        let uptime_health = (uptime_seconds / 3600.0).clamp(0.0, 1.0);
        let overall = (throughput_health + latency_health + uptime_health) / 3.0;

        Self {
            overall,
            throughput_health,
            latency_health,
            uptime_health,
            grade: HealthGrade::from_score(overall),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RealTimeMetrics {
    pub instantaneous_throughput_mbps: f64,
    pub average_throughput_mbps: f64,
    pub peak_throughput_mbps: f64,
    pub average_latency_ms: f64,
    pub requests_per_second: f64,
    pub total_bytes_generated: u64,
    pub total_requests: u64,
    pub total_errors: u64,
    pub dropped_events: u64,
    pub uptime_seconds: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RangeStats {
    pub current: f64,
    pub average: f64,
    pub min: f64,
    pub max: f64,
}

impl RangeStats {
    fn from_values(values: impl Iterator<Item = f64>) -> Option<Self> {
        let mut stats: Option<(RangeStats, f64, usize)> = None;
        for v in values {
            stats = Some(match stats {
                None => (
                    RangeStats {
                        current: v,
                        average: v,
                        min: v,
                        max: v,
                    },
                    v,
                    1,
                ),
                Some((s, sum, n)) => (
                    RangeStats {
                        current: v,
                        average: 0.0,
                        min: s.min.min(v),
                        max: s.max.max(v),
                    },
                    sum + v,
                    n + 1,
                ),
            });
        }
        stats.map(|(mut s, sum, n)| {
            s.average = sum / n as f64;
            s
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QualitySummary {
    pub sample_count: usize,
    pub last_check: Option<DateTime<Utc>>,
    pub entropy: Option<RangeStats>,
    pub uniformity: Option<RangeStats>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivityEntry {
    pub timestamp: DateTime<Utc>,
    pub technique: TechniqueId,
    pub source: &'static str,
    pub size_bytes: usize,
    pub throughput_mbps: f64,
    pub latency_ms: f64,
}

/// Full statistics view
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: f64,
    pub real_time_metrics: RealTimeMetrics,
    pub throughput_distribution: Option<Distribution>,
    pub latency_distribution: Option<Distribution>,
    pub source_statistics: BTreeMap<TechniqueId, SourceStatistics>,
    pub quality_metrics: QualitySummary,
    pub recent_activity: Vec<ActivityEntry>,
    pub health: HealthScore,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedPoint {
    pub timestamp: DateTime<Utc>,
    pub throughput_mbps: f64,
    pub size_bytes: usize,
    pub source: TechniqueId,
}

#[derive(Debug, Clone, Serialize)]
pub struct ThroughputFeed {
    pub current_throughput_mbps: f64,
    pub target_throughput_mbps: f64,
    pub peak_throughput_mbps: f64,
    pub average_throughput_mbps: f64,
    /// `min(average / target * 100, 100)`
    pub throughput_efficiency: f64,
    pub historical_data: Vec<FeedPoint>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemHealth {
    pub health: HealthScore,
    pub is_active: bool,
    pub last_activity: Option<DateTime<Utc>>,
    pub uptime_seconds: f64,
    pub timestamp: DateTime<Utc>,
}

/// Shared metrics aggregator
///
/// Cheap to clone; clones share state. Create one per engine and inject it where needed.
#[derive(Clone)]
pub struct MetricsAggregator {
    inner: Arc<AggregatorInner>,
}

struct AggregatorInner {
    start_time: Instant,
    config: MetricsConfig,
    dropped_events: AtomicU64,
    state: RwLock<AggregateState>,
}

struct AggregateState {
    total_requests: u64,
    total_errors: u64,
    total_bytes: u64,
    sources: BTreeMap<TechniqueId, SourceStatistics>,
    history: MetricWindow<EventSample>,
    feed: MetricWindow<EventSample>,
    quality: MetricWindow<QualitySample>,
    last_activity: Option<(Instant, DateTime<Utc>)>,
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new(MetricsConfig::default())
    }
}

impl MetricsAggregator {
    pub fn new(config: MetricsConfig) -> Self {
        let sources = TechniqueId::ALL
            .iter()
            .map(|&t| (t, SourceStatistics::default()))
            .collect();

        let state = AggregateState {
            total_requests: 0,
            total_errors: 0,
            total_bytes: 0,
            sources,
            history: MetricWindow::new(config.history_size),
            feed: MetricWindow::with_horizon(config.history_size, config.feed_horizon),
            quality: MetricWindow::new(config.quality_window),
            last_activity: None,
        };

        Self {
            inner: Arc::new(AggregatorInner {
                start_time: Instant::now(),
                config,
                dropped_events: AtomicU64::new(0),
                state: RwLock::new(state),
            }),
        }
    }

    pub fn started_at(&self) -> Instant {
        self.inner.start_time
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.inner.config
    }

    /// Fold one event in; malformed events are counted and dropped
    pub fn record(&self, event: GenerationEvent) {
        self.record_at(event, Instant::now());
    }

    pub fn record_at(&self, event: GenerationEvent, now: Instant) {
        if let Err(reason) = event.check() {
            self.inner.dropped_events.fetch_add(1, Ordering::Relaxed);
            warn!(technique = %event.technique, reason, "Dropped malformed metrics event");
            return;
        }

        let wall = Utc::now();
        let mut state = self.inner.state.write();

        match event.outcome {
            EventOutcome::Failure(kind) => {
                state.total_errors += 1;
                if let Some(source) = state.sources.get_mut(&event.technique) {
                    source.error_count += 1;
                }
                debug!(technique = %event.technique, error_kind = kind.as_str(), "Recorded failed generation");
            }
            EventOutcome::Success => {
                let throughput = throughput_mbps(event.bytes, event.elapsed);
                let latency_ms = event.elapsed.as_secs_f64() * 1000.0;

                state.total_requests += 1;
                state.total_bytes += event.bytes as u64;

                if let Some(source) = state.sources.get_mut(&event.technique) {
                    source.requests += 1;
                    source.bytes_generated += event.bytes as u64;
                    source.total_time_seconds += event.elapsed.as_secs_f64();
                    source.average_throughput_mbps = (source.bytes_generated as f64 * 8.0)
                        / source.total_time_seconds.max(MIN_ELAPSED_SECS)
                        / 1_000_000.0;
                }

                let sample = EventSample {
                    wall,
                    technique: event.technique,
                    bytes: event.bytes,
                    throughput_mbps: throughput,
                    latency_ms,
                };
                let at = state.history.push(now, sample.clone());
                state.feed.push(at, sample);

                if let Some(q) = event.quality {
                    state.quality.push(
                        at,
                        QualitySample {
                            wall,
                            entropy: q.entropy,
                            uniformity: q.uniformity_score,
                        },
                    );
                }
                state.last_activity = Some((at, wall));
            }
        }
    }

    pub fn dropped_events(&self) -> u64 {
        self.inner.dropped_events.load(Ordering::Relaxed)
    }

    pub fn uptime_seconds(&self) -> f64 {
        self.inner.start_time.elapsed().as_secs_f64()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.snapshot_at(Instant::now())
    }

    pub fn snapshot_at(&self, now: Instant) -> StatsSnapshot {
        let config = &self.inner.config;
        let uptime = now.saturating_duration_since(self.inner.start_time).as_secs_f64();
        let state = self.inner.state.read();

        let throughputs: Vec<f64> = state.history.iter().map(|e| e.value.throughput_mbps).collect();
        let latencies: Vec<f64> = state.history.iter().map(|e| e.value.latency_ms).collect();
        let averages = Averages::from_state(&state, config);

        let real_time_metrics = RealTimeMetrics {
            instantaneous_throughput_mbps: averages.instantaneous_throughput,
            average_throughput_mbps: averages.throughput,
            peak_throughput_mbps: averages.peak_throughput,
            average_latency_ms: averages.latency,
            requests_per_second: if uptime > 0.0 {
                state.total_requests as f64 / uptime
            } else {
                0.0
            },
            total_bytes_generated: state.total_bytes,
            total_requests: state.total_requests,
            total_errors: state.total_errors,
            dropped_events: self.dropped_events(),
            uptime_seconds: uptime,
        };

        let quality_metrics = QualitySummary {
            sample_count: state.quality.len(),
            last_check: state.quality.last().map(|e| e.value.wall),
            entropy: RangeStats::from_values(state.quality.iter().map(|e| e.value.entropy)),
            uniformity: RangeStats::from_values(state.quality.iter().map(|e| e.value.uniformity)),
        };

        let recent_activity = state
            .history
            .latest(config.recent_activity)
            .map(|e| ActivityEntry {
                timestamp: e.value.wall,
                technique: e.value.technique,
                source: e.value.technique.source_label(),
                size_bytes: e.value.bytes,
                throughput_mbps: round2(e.value.throughput_mbps),
                latency_ms: round2(e.value.latency_ms),
            })
            .collect();

        StatsSnapshot {
            timestamp: Utc::now(),
            uptime_seconds: uptime,
            health: HealthScore::compute(
                averages.throughput,
                averages.latency,
                uptime,
                config.target_throughput_mbps,
            ),
            real_time_metrics,
            throughput_distribution: Distribution::from_values(&throughputs),
            latency_distribution: Distribution::from_values(&latencies),
            source_statistics: state.sources.clone(),
            quality_metrics,
            recent_activity,
        }
    }

    pub fn throughput_feed(&self) -> ThroughputFeed {
        self.throughput_feed_at(Instant::now())
    }

    /// Feed points no older than the horizon, oldest first
    pub fn throughput_feed_at(&self, now: Instant) -> ThroughputFeed {
        let config = &self.inner.config;
        let state = self.inner.state.read();
        let averages = Averages::from_state(&state, config);

        let historical_data = state
            .feed
            .live(now)
            .map(|e| FeedPoint {
                timestamp: e.value.wall,
                throughput_mbps: e.value.throughput_mbps,
                size_bytes: e.value.bytes,
                source: e.value.technique,
            })
            .collect();

        let target = config.target_throughput_mbps;
        ThroughputFeed {
            current_throughput_mbps: averages.instantaneous_throughput,
            target_throughput_mbps: target,
            peak_throughput_mbps: averages.peak_throughput,
            average_throughput_mbps: averages.throughput,
            throughput_efficiency: if target > 0.0 {
                (averages.throughput / target * 100.0).min(100.0)
            } else {
                0.0
            },
            historical_data,
            timestamp: Utc::now(),
        }
    }

    pub fn system_health(&self) -> SystemHealth {
        self.system_health_at(Instant::now())
    }

    pub fn system_health_at(&self, now: Instant) -> SystemHealth {
        let config = &self.inner.config;
        let uptime = now.saturating_duration_since(self.inner.start_time).as_secs_f64();
        let state = self.inner.state.read();
        let averages = Averages::from_state(&state, config);

        let (is_active, last_activity) = match state.last_activity {
            Some((at, wall)) => (
                now.saturating_duration_since(at) <= config.activity_window,
                Some(wall),
            ),
            None => (false, None),
        };

        SystemHealth {
            health: HealthScore::compute(
                averages.throughput,
                averages.latency,
                uptime,
                config.target_throughput_mbps,
            ),
            is_active,
            last_activity,
            uptime_seconds: uptime,
            timestamp: Utc::now(),
        }
    }

    pub fn source_statistics(&self) -> BTreeMap<TechniqueId, SourceStatistics> {
        self.inner.state.read().sources.clone()
    }

    /// Generate Prometheus-compatible metrics output
    pub fn prometheus_format(&self) -> String {
        let snapshot = self.snapshot();
        let rt = &snapshot.real_time_metrics;
        let mut output = String::new();

        output.push_str("# HELP qrng_requests_total Successful generations\n");
        output.push_str("# TYPE qrng_requests_total counter\n");
        output.push_str(&format!("qrng_requests_total {}\n", rt.total_requests));

        output.push_str("# HELP qrng_errors_total Failed generations\n");
        output.push_str("# TYPE qrng_errors_total counter\n");
        output.push_str(&format!("qrng_errors_total {}\n", rt.total_errors));

        output.push_str("# HELP qrng_bytes_generated_total Entropy bytes consumed by generations\n");
        output.push_str("# TYPE qrng_bytes_generated_total counter\n");
        output.push_str(&format!("qrng_bytes_generated_total {}\n", rt.total_bytes_generated));

        output.push_str("# HELP qrng_dropped_events_total Malformed metrics events dropped\n");
        output.push_str("# TYPE qrng_dropped_events_total counter\n");
        output.push_str(&format!("qrng_dropped_events_total {}\n", rt.dropped_events));

        output.push_str("# HELP qrng_uptime_seconds Service uptime in seconds\n");
        output.push_str("# TYPE qrng_uptime_seconds gauge\n");
        output.push_str(&format!("qrng_uptime_seconds {:.0}\n", rt.uptime_seconds));

        output.push_str("# HELP qrng_throughput_mbps Average throughput over the history window\n");
        output.push_str("# TYPE qrng_throughput_mbps gauge\n");
        output.push_str(&format!("qrng_throughput_mbps {:.6}\n", rt.average_throughput_mbps));

        if let Some(latency) = &snapshot.latency_distribution {
            output.push_str("# HELP qrng_latency_p50_milliseconds Generation latency 50th percentile\n");
            output.push_str("# TYPE qrng_latency_p50_milliseconds gauge\n");
            output.push_str(&format!(
                "qrng_latency_p50_milliseconds {:.6}\n",
                latency.percentiles.p50
            ));

            output.push_str("# HELP qrng_latency_p99_milliseconds Generation latency 99th percentile\n");
            output.push_str("# TYPE qrng_latency_p99_milliseconds gauge\n");
            output.push_str(&format!(
                "qrng_latency_p99_milliseconds {:.6}\n",
                latency.percentiles.p99
            ));
        }

        output.push_str("# HELP qrng_health_score Composite health score (0-1)\n");
        output.push_str("# TYPE qrng_health_score gauge\n");
        output.push_str(&format!("qrng_health_score {:.4}\n", snapshot.health.overall));

        output.push_str("# HELP qrng_source_requests_total Successful generations per technique\n");
        output.push_str("# TYPE qrng_source_requests_total counter\n");
        for (technique, stats) in &snapshot.source_statistics {
            output.push_str(&format!(
                "qrng_source_requests_total{{technique=\"{}\"}} {}\n",
                technique, stats.requests
            ));
        }

        output.push_str("# HELP qrng_source_errors_total Failed generations per technique\n");
        output.push_str("# TYPE qrng_source_errors_total counter\n");
        for (technique, stats) in &snapshot.source_statistics {
            output.push_str(&format!(
                "qrng_source_errors_total{{technique=\"{}\"}} {}\n",
                technique, stats.error_count
            ));
        }

        output
    }
}

/// Window averages shared by the snapshot, feed and health views
struct Averages {
    throughput: f64,
    latency: f64,
    peak_throughput: f64,
    instantaneous_throughput: f64,
}

impl Averages {
    fn from_state(state: &AggregateState, config: &MetricsConfig) -> Self {
        let n = state.history.len();
        if n == 0 {
            return Self {
                throughput: 0.0,
                latency: 0.0,
                peak_throughput: 0.0,
                instantaneous_throughput: 0.0,
            };
        }

        let mut tp_sum = 0.0;
        let mut lat_sum = 0.0;
        let mut peak = 0.0f64;
        for e in state.history.iter() {
            tp_sum += e.value.throughput_mbps;
            lat_sum += e.value.latency_ms;
            peak = peak.max(e.value.throughput_mbps);
        }

        let recent: Vec<f64> = state
            .history
            .latest(config.instantaneous_window)
            .map(|e| e.value.throughput_mbps)
            .collect();

        Self {
            throughput: tp_sum / n as f64,
            latency: lat_sum / n as f64,
            peak_throughput: peak,
            instantaneous_throughput: recent.iter().sum::<f64>() / recent.len().max(1) as f64,
        }
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(bytes: usize, millis: u64) -> GenerationEvent {
        GenerationEvent::success(TechniqueId::Fpga, bytes, Duration::from_millis(millis))
    }

    #[test]
    fn test_throughput_formula() {
        // 1 MB in 1 s = 8 Mbit/s
        assert!((throughput_mbps(1_000_000, Duration::from_secs(1)) - 8.0).abs() < 1e-9);
        // Sub-millisecond elapsed is floored to 1 ms
        assert_eq!(
            throughput_mbps(1000, Duration::ZERO),
            throughput_mbps(1000, Duration::from_millis(1))
        );
    }

    #[test]
    fn test_percentile_interpolation() {
        let window = [10.0, 20.0, 30.0, 40.0, 50.0];
        assert_eq!(percentile(&window, 50.0), 30.0);
        assert!((percentile(&window, 90.0) - 46.0).abs() < 1e-9);
        assert_eq!(percentile(&window, 0.0), 10.0);
        assert_eq!(percentile(&window, 100.0), 50.0);

        let dist = Distribution::from_values(&[50.0, 10.0, 40.0, 20.0, 30.0]).unwrap();
        assert_eq!(dist.median, 30.0);
        assert_eq!(dist.min, 10.0);
        assert_eq!(dist.max, 50.0);
        assert!(dist.percentiles.p90 > 40.0 && dist.percentiles.p90 < 50.0);
        assert!(Distribution::from_values(&[]).is_none());
    }

    #[test]
    fn test_health_score_boundaries() {
        let best = HealthScore::compute(50.0, 0.0, 3600.0, 50.0);
        assert_eq!(best.overall, 1.0);
        assert_eq!(best.grade, HealthGrade::Excellent);

        let zero = HealthScore::compute(0.0, 0.0, 0.0, 50.0);
        assert!((zero.overall - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(zero.latency_health, 1.0);
        assert_eq!(zero.grade, HealthGrade::Poor);

        let clamped = HealthScore::compute(500.0, 5000.0, 1e9, 50.0);
        assert_eq!(clamped.throughput_health, 1.0);
        assert_eq!(clamped.latency_health, 0.0);
        assert_eq!(clamped.uptime_health, 1.0);
    }

    #[test]
    fn test_grade_buckets() {
        assert_eq!(HealthGrade::from_score(0.8), HealthGrade::Excellent);
        assert_eq!(HealthGrade::from_score(0.79), HealthGrade::Good);
        assert_eq!(HealthGrade::from_score(0.6), HealthGrade::Good);
        assert_eq!(HealthGrade::from_score(0.4), HealthGrade::Fair);
        assert_eq!(HealthGrade::from_score(0.39), HealthGrade::Poor);
    }

    #[test]
    fn test_record_and_snapshot() {
        let metrics = MetricsAggregator::default();
        let start = metrics.started_at();

        // 10, 20, 30, 40, 50 Mbit/s over 1 s each
        for mbps in [10u64, 20, 30, 40, 50] {
            metrics.record_at(event((mbps * 125_000) as usize, 1000), start);
        }
        metrics.record_at(
            GenerationEvent::failure(TechniqueId::Anu, Duration::ZERO, ErrorKind::UpstreamError),
            start,
        );

        let snapshot = metrics.snapshot_at(start + Duration::from_secs(10));
        let rt = &snapshot.real_time_metrics;
        assert_eq!(rt.total_requests, 5);
        assert_eq!(rt.total_errors, 1);
        assert_eq!(rt.total_bytes_generated, 150 * 125_000);
        assert!((rt.requests_per_second - 0.5).abs() < 1e-9);
        assert!((rt.average_throughput_mbps - 30.0).abs() < 1e-9);
        assert!((rt.peak_throughput_mbps - 50.0).abs() < 1e-9);

        let tp = snapshot.throughput_distribution.unwrap();
        assert!((tp.percentiles.p50 - 30.0).abs() < 1e-9);
        assert!((tp.percentiles.p90 - 46.0).abs() < 1e-9);

        let fpga = &snapshot.source_statistics[&TechniqueId::Fpga];
        assert_eq!(fpga.requests, 5);
        assert!((fpga.average_throughput_mbps - 30.0).abs() < 1e-9);
        assert_eq!(snapshot.source_statistics[&TechniqueId::Anu].error_count, 1);
        assert_eq!(snapshot.source_statistics[&TechniqueId::Anu].requests, 0);

        assert_eq!(snapshot.recent_activity.len(), 5);
        assert_eq!(snapshot.recent_activity[0].throughput_mbps, 50.0);
    }

    #[test]
    fn test_rps_zero_at_start() {
        let metrics = MetricsAggregator::default();
        let snapshot = metrics.snapshot_at(metrics.started_at());
        assert_eq!(snapshot.real_time_metrics.requests_per_second, 0.0);
        assert!(snapshot.throughput_distribution.is_none());
    }

    #[test]
    fn test_malformed_events_dropped() {
        let metrics = MetricsAggregator::default();
        metrics.record(GenerationEvent {
            bytes: 8,
            ..GenerationEvent::failure(TechniqueId::Fpga, Duration::from_millis(1), ErrorKind::UpstreamError)
        });
        metrics.record(event(16, 5).with_quality(QualityMetrics {
            entropy: 9.5,
            ones_ratio: 0.5,
            uniformity_score: 1.0,
        }));

        assert_eq!(metrics.dropped_events(), 2);
        assert_eq!(metrics.snapshot().real_time_metrics.total_requests, 0);
    }

    #[test]
    fn test_history_is_count_bounded() {
        let metrics = MetricsAggregator::new(MetricsConfig {
            history_size: 3,
            ..MetricsConfig::default()
        });
        let start = metrics.started_at();
        for i in 1..=5u64 {
            metrics.record_at(event((i * 125_000) as usize, 1000), start);
        }
        let snapshot = metrics.snapshot_at(start);
        let tp = snapshot.throughput_distribution.unwrap();
        assert_eq!(tp.min, 3.0);
        assert_eq!(snapshot.real_time_metrics.total_requests, 5);
    }

    #[test]
    fn test_feed_horizon() {
        let metrics = MetricsAggregator::default();
        let start = metrics.started_at();
        metrics.record_at(event(1000, 1), start);
        metrics.record_at(event(2000, 1), start + Duration::from_secs(30));

        let feed = metrics.throughput_feed_at(start + Duration::from_secs(70));
        assert_eq!(feed.historical_data.len(), 1);
        assert_eq!(feed.historical_data[0].size_bytes, 2000);
        assert_eq!(feed.target_throughput_mbps, 50.0);
        assert!(feed.throughput_efficiency <= 100.0);

        let feed = metrics.throughput_feed_at(start + Duration::from_secs(200));
        assert!(feed.historical_data.is_empty());
    }

    #[test]
    fn test_quality_tracking() {
        let metrics = MetricsAggregator::default();
        for entropy in [7.0, 7.5, 8.0] {
            metrics.record(event(64, 1).with_quality(QualityMetrics {
                entropy,
                ones_ratio: 0.5,
                uniformity_score: 1.0,
            }));
        }
        let quality = metrics.snapshot().quality_metrics;
        let entropy = quality.entropy.unwrap();
        assert_eq!(quality.sample_count, 3);
        assert_eq!(entropy.current, 8.0);
        assert_eq!(entropy.min, 7.0);
        assert_eq!(entropy.max, 8.0);
        assert!((entropy.average - 7.5).abs() < 1e-9);
    }

    #[test]
    fn test_system_health_activity() {
        let metrics = MetricsAggregator::default();
        let start = metrics.started_at();
        assert!(!metrics.system_health_at(start).is_active);

        metrics.record_at(event(1000, 1), start);
        assert!(metrics.system_health_at(start + Duration::from_secs(30)).is_active);
        assert!(!metrics.system_health_at(start + Duration::from_secs(61)).is_active);
    }

    #[test]
    fn test_concurrent_records_are_not_lost() {
        let metrics = MetricsAggregator::default();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let metrics = metrics.clone();
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        metrics.record(event(10, 1));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let rt = metrics.snapshot().real_time_metrics;
        assert_eq!(rt.total_requests, 2000);
        assert_eq!(rt.total_bytes_generated, 20_000);
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = MetricsAggregator::default();
        metrics.record(event(1024, 2));
        let output = metrics.prometheus_format();
        assert!(output.contains("qrng_requests_total 1"));
        assert!(output.contains("qrng_bytes_generated_total 1024"));
        assert!(output.contains("qrng_source_requests_total{technique=\"fpga\"} 1"));
        assert!(output.contains("qrng_latency_p50_milliseconds"));
    }
}
