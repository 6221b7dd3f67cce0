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

//! Rate-limited gate in front of the external quantum service
//!
//! The service tolerates roughly one call per minute, so the gate enforces:
//!
//! - at most one upstream call in flight at any time (an async mutex; waiters queue for at
//!   most `queue_wait` and are then refused as rate limited)
//! - a `cooldown` after every successful call, during which calls are refused locally
//! - an `error` phase of `error_backoff` after a failed call, during which calls are refused
//!   locally with the last failure
//!
//! Deadlines are absolute [`tokio::time::Instant`]s evaluated lazily on read; nothing runs in
//! the background.

use crate::{
    analysis,
    sample::RawSample,
    technique::{TechniqueId, TechniqueState, TechniqueStatus},
    Error, Result,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Source of quantum bytes behind the gate
#[async_trait]
pub trait QuantumUpstream: Send + Sync {
    /// Where requests go, for logs and status views
    fn endpoint(&self) -> String;

    /// Fetch exactly `n_bytes` bytes (one logical upstream request)
    async fn fetch(&self, n_bytes: usize) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    pub cooldown: Duration,
    pub error_backoff: Duration,
    pub queue_wait: Duration,
    pub call_timeout: Duration,
    pub max_request_bytes: usize,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(crate::DEFAULT_COOLDOWN_SECS),
            error_backoff: Duration::from_secs(30),
            queue_wait: Duration::from_secs(2),
            call_timeout: Duration::from_secs(30),
            max_request_bytes: 1024,
        }
    }
}

#[derive(Debug, Clone)]
enum Phase {
    Available,
    Cooldown { until: Instant },
    Failed { until: Instant, reason: String },
}

/// Counters for the external service
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidatorStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    /// Calls refused locally (cooldown or busy gate)
    pub rate_limited_requests: u64,
    pub bytes_received: u64,
    pub average_response_time_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

struct GateState {
    phase: Phase,
    stats: ValidatorStats,
}

/// Statistical comparison of a local batch against a reference sample
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub source: &'static str,
    pub reference_bytes: usize,
    pub local_mean: f64,
    pub reference_mean: f64,
    pub mean_difference: f64,
    pub local_std: f64,
    pub reference_std: f64,
    pub std_difference: f64,
    pub local_entropy: f64,
    pub reference_entropy: f64,
    pub entropy_difference: f64,
    /// Mean of the three similarity sub-scores, in [0, 1]
    pub quality_score: f64,
    pub validation_passed: bool,
}

/// Expected standard deviation of uniform bytes
const UNIFORM_BYTE_STD: f64 = 73.9;
/// Expected mean of uniform bytes
const UNIFORM_BYTE_MEAN: f64 = 127.5;
const PASS_SCORE: f64 = 0.8;

impl ValidationReport {
    pub fn compare(local: &[u8], reference: &[u8]) -> Self {
        let local_mean = analysis::mean(local);
        let reference_mean = analysis::mean(reference);
        let local_std = analysis::std_dev(local);
        let reference_std = analysis::std_dev(reference);
        let local_entropy = analysis::shannon_entropy(local);
        let reference_entropy = analysis::shannon_entropy(reference);

        let mean_difference = (local_mean - reference_mean).abs();
        let std_difference = (local_std - reference_std).abs();
        let entropy_difference = (local_entropy - reference_entropy).abs();

        let quality_score = ((1.0 - (mean_difference / UNIFORM_BYTE_MEAN).min(1.0))
            + (1.0 - (std_difference / UNIFORM_BYTE_STD).min(1.0))
            + (1.0 - (entropy_difference / 8.0).min(1.0)))
            / 3.0;

        Self {
            source: TechniqueId::Anu.source_label(),
            reference_bytes: reference.len(),
            local_mean,
            reference_mean,
            mean_difference,
            local_std,
            reference_std,
            std_difference,
            local_entropy,
            reference_entropy,
            entropy_difference,
            quality_score,
            validation_passed: quality_score > PASS_SCORE,
        }
    }
}

/// Result of an opportunistic validation attempt
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ValidationOutcome {
    Validated(ValidationReport),
    Unavailable {
        reason: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        retry_after_seconds: Option<u64>,
    },
}

impl ValidationOutcome {
    pub fn is_validated(&self) -> bool {
        matches!(self, Self::Validated(_))
    }
}

/// Decrements the in-flight counter however the call ends (including cancellation)
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Cooldown-gated client of the external quantum service
pub struct ExternalValidator {
    upstream: Arc<dyn QuantumUpstream>,
    config: ValidatorConfig,
    gate: tokio::sync::Mutex<()>,
    state: Mutex<GateState>,
    in_flight: AtomicUsize,
}

impl ExternalValidator {
    pub fn new(upstream: Arc<dyn QuantumUpstream>, config: ValidatorConfig) -> Self {
        info!(
            endpoint = %upstream.endpoint(),
            cooldown_secs = config.cooldown.as_secs(),
            "External validator configured"
        );
        Self {
            upstream,
            config,
            gate: tokio::sync::Mutex::new(()),
            state: Mutex::new(GateState {
                phase: Phase::Available,
                stats: ValidatorStats::default(),
            }),
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Fetch `n_bytes` bytes, queueing briefly behind an in-flight call
    #[instrument(skip(self))]
    pub async fn fetch(&self, n_bytes: usize) -> Result<RawSample> {
        self.check_size(n_bytes)?;
        self.check_permitted()?;

        let _gate = match tokio::time::timeout(self.config.queue_wait, self.gate.lock()).await {
            Ok(guard) => guard,
            Err(_) => {
                debug!("Gave up waiting for in-flight external call");
                return Err(self.busy());
            }
        };

        // The call we queued behind has most likely started a cooldown
        self.check_permitted()?;
        self.call_upstream(n_bytes).await
    }

    /// Fetch without queueing; refused immediately if another call is in flight
    pub async fn try_fetch(&self, n_bytes: usize) -> Result<RawSample> {
        self.check_size(n_bytes)?;
        self.check_permitted()?;

        let _gate = self.gate.try_lock().map_err(|_| self.busy())?;
        self.check_permitted()?;
        self.call_upstream(n_bytes).await
    }

    /// Compare `local` bytes against a fresh reference sample, if the gate allows one now
    pub async fn validate_batch(&self, local: &[u8], sample_bytes: usize) -> ValidationOutcome {
        let n = sample_bytes.clamp(1, self.config.max_request_bytes);
        match self.try_fetch(n).await {
            Ok(reference) => {
                let report = ValidationReport::compare(local, &reference.data);
                debug!(
                    quality_score = report.quality_score,
                    passed = report.validation_passed,
                    "Hybrid batch validated"
                );
                ValidationOutcome::Validated(report)
            }
            Err(e) => ValidationOutcome::Unavailable {
                reason: e.to_string(),
                retry_after_seconds: e.retry_after_seconds(),
            },
        }
    }

    /// Live view of the external technique
    pub fn status(&self) -> TechniqueState {
        let now = Instant::now();
        let mut state = self.state.lock();
        settle(&mut state.phase, now);

        let mut view = TechniqueState::operational(TechniqueId::Anu);
        match &state.phase {
            Phase::Available => view.status = TechniqueStatus::Available,
            Phase::Cooldown { until } => {
                let remaining = until.saturating_duration_since(now);
                view.status = TechniqueStatus::Cooldown;
                view.cooldown_seconds = Some(ceil_secs(remaining));
                view.cooldown_until = Some(wall_clock_deadline(remaining));
            }
            Phase::Failed { until, reason } => {
                let remaining = until.saturating_duration_since(now);
                view.status = TechniqueStatus::Error;
                view.cooldown_seconds = Some(ceil_secs(remaining));
                view.cooldown_until = Some(wall_clock_deadline(remaining));
                view.last_error = Some(reason.clone());
            }
        }
        view
    }

    pub fn stats(&self) -> ValidatorStats {
        self.state.lock().stats.clone()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    pub fn endpoint(&self) -> String {
        self.upstream.endpoint()
    }

    fn check_size(&self, n_bytes: usize) -> Result<()> {
        if n_bytes == 0 || n_bytes > self.config.max_request_bytes {
            return Err(Error::InvalidRequest(format!(
                "external service accepts 1..={} bytes per call, got {}",
                self.config.max_request_bytes, n_bytes
            )));
        }
        Ok(())
    }

    fn check_permitted(&self) -> Result<()> {
        let now = Instant::now();
        let mut state = self.state.lock();
        settle(&mut state.phase, now);

        let verdict = match &state.phase {
            Phase::Available => Ok(()),
            Phase::Cooldown { until } => Err(Error::RateLimited {
                technique: TechniqueId::Anu,
                retry_after_seconds: ceil_secs(until.saturating_duration_since(now)),
            }),
            Phase::Failed { until, reason } => Err(Error::Upstream(format!(
                "{} (retry in {}s)",
                reason,
                ceil_secs(until.saturating_duration_since(now))
            ))),
        };

        if matches!(verdict, Err(Error::RateLimited { .. })) {
            state.stats.rate_limited_requests += 1;
        }
        verdict
    }

    fn busy(&self) -> Error {
        self.state.lock().stats.rate_limited_requests += 1;
        Error::RateLimited {
            technique: TechniqueId::Anu,
            retry_after_seconds: ceil_secs(self.config.queue_wait).max(1),
        }
    }

    async fn call_upstream(&self, n_bytes: usize) -> Result<RawSample> {
        let _flight = InFlight::enter(&self.in_flight);
        let started = Instant::now();

        let outcome =
            match tokio::time::timeout(self.config.call_timeout, self.upstream.fetch(n_bytes))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(Error::Timeout),
            };
        let elapsed = started.elapsed();

        match outcome {
            Ok(data) if !data.is_empty() => {
                self.record_success(data.len(), elapsed);
                Ok(RawSample::from_bytes(TechniqueId::Anu, data))
            }
            Ok(_) => {
                let err = Error::Upstream("service returned no data".to_string());
                self.record_failure(&err, elapsed);
                Err(err)
            }
            Err(e) => {
                self.record_failure(&e, elapsed);
                Err(e)
            }
        }
    }

    fn record_success(&self, bytes: usize, elapsed: Duration) {
        let mut state = self.state.lock();
        state.phase = Phase::Cooldown {
            until: Instant::now() + self.config.cooldown,
        };
        let stats = &mut state.stats;
        stats.total_requests += 1;
        stats.successful_requests += 1;
        stats.bytes_received += bytes as u64;
        stats.last_success = Some(Utc::now());
        update_average(stats, elapsed);

        info!(
            bytes,
            elapsed_ms = elapsed.as_millis() as u64,
            cooldown_secs = self.config.cooldown.as_secs(),
            "External call succeeded, entering cooldown"
        );
    }

    fn record_failure(&self, error: &Error, elapsed: Duration) {
        let reason = error.to_string();
        let mut state = self.state.lock();
        state.phase = Phase::Failed {
            until: Instant::now() + self.config.error_backoff,
            reason: reason.clone(),
        };
        let stats = &mut state.stats;
        stats.total_requests += 1;
        stats.failed_requests += 1;
        stats.last_error = Some(reason);
        update_average(stats, elapsed);

        warn!(
            backoff_secs = self.config.error_backoff.as_secs(),
            "External call failed: {}", error
        );
    }
}

/// Fall back to `Available` once a deadline has passed
fn settle(phase: &mut Phase, now: Instant) {
    let expired = match phase {
        Phase::Available => false,
        Phase::Cooldown { until } | Phase::Failed { until, .. } => *until <= now,
    };
    if expired {
        *phase = Phase::Available;
    }
}

fn update_average(stats: &mut ValidatorStats, elapsed: Duration) {
    let ms = elapsed.as_secs_f64() * 1000.0;
    let n = stats.total_requests as f64;
    stats.average_response_time_ms += (ms - stats.average_response_time_ms) / n;
}

fn ceil_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}

fn wall_clock_deadline(remaining: Duration) -> DateTime<Utc> {
    Utc::now() + chrono::Duration::from_std(remaining).unwrap_or_else(|_| chrono::Duration::zero())
}
