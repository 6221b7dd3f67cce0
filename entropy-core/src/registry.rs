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

//! Technique dispatch
//!
//! The registry owns every entropy source and routes each request to one of them:
//!
//! | technique | path |
//! |---|---|
//! | `fpga` | noise simulator, von Neumann debiasing |
//! | `anu` | external quantum service only |
//! | `hybrid` | `fpga` output plus an opportunistic external validation |
//! | `cryptographic` | OS CSPRNG |
//!
//! A technique that cannot serve a request fails it; the registry never substitutes another
//! technique on its own. Every accepted request is folded into the injected
//! [`MetricsAggregator`].

use crate::{
    analysis::{self, QualityMetrics, RandomnessReport},
    config::EngineConfig,
    debias::Debiaser,
    fetcher::AnuClient,
    formatter::{self, EntropyReader, GenerationRequest, HashAlgorithm, OutputKind, OutputValue},
    keys::{self, DerivedKey, KeyType},
    metrics::{self, GenerationEvent, MetricsAggregator},
    os_source::CryptoFallbackSource,
    simulator::{NoiseSimulator, SimulatorStats},
    technique::{TechniqueId, TechniqueState, TechniqueStatus},
    validator::{ExternalValidator, ValidationOutcome},
    Error, ErrorKind, Result,
};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Metadata attached to every formatted result
#[derive(Debug, Clone, Serialize)]
pub struct GenerationMetadata {
    pub id: Uuid,
    pub count: usize,
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<HashAlgorithm>,
    /// `"min-max"` for integers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options_count: Option<usize>,
    pub technique: TechniqueId,
    pub source: &'static str,
    pub generation_time_ms: f64,
    /// Entropy bytes consumed
    pub size_bytes: usize,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<QualityMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationOutcome>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationResult {
    pub results: Vec<OutputValue>,
    pub metadata: GenerationMetadata,
}

/// Raw bytes from one technique
#[derive(Debug, Clone)]
pub struct BytesResult {
    pub data: Vec<u8>,
    pub technique: TechniqueId,
    pub source: &'static str,
    pub generation_time_ms: f64,
    pub throughput_mbps: f64,
    pub quality: QualityMetrics,
    pub validation: Option<ValidationOutcome>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct KeyResult {
    pub key: DerivedKey,
    pub key_type: KeyType,
    pub key_size_bits: usize,
    pub entropy_bytes: usize,
    pub technique: TechniqueId,
    pub generation_time_ms: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct Fault {
    reason: String,
    until: Instant,
}

/// Routes requests to entropy sources and tracks their live status
pub struct TechniqueRegistry {
    config: EngineConfig,
    simulator: NoiseSimulator,
    debiaser: Debiaser,
    os: CryptoFallbackSource,
    validator: Arc<ExternalValidator>,
    metrics: MetricsAggregator,
    /// Local source failures, shown as `error` until they expire or the source recovers
    faults: RwLock<HashMap<TechniqueId, Fault>>,
}

impl TechniqueRegistry {
    /// Build every source from configuration
    pub fn new(config: EngineConfig, metrics: MetricsAggregator) -> Result<Self> {
        config.validate()?;
        let simulator = NoiseSimulator::new(config.simulator_config())?;
        let client = AnuClient::new(config.fetcher_config()?)?;
        let validator = Arc::new(ExternalValidator::new(
            Arc::new(client),
            config.validator_config(),
        ));

        info!(
            max_results = config.max_results_per_request,
            debias_budget = config.debias_budget_factor,
            "Technique registry ready"
        );
        Ok(Self::with_components(config, simulator, validator, metrics))
    }

    /// Assemble a registry from prebuilt parts
    pub fn with_components(
        config: EngineConfig,
        simulator: NoiseSimulator,
        validator: Arc<ExternalValidator>,
        metrics: MetricsAggregator,
    ) -> Self {
        Self {
            debiaser: Debiaser::new(config.debias_budget_factor),
            config,
            simulator,
            os: CryptoFallbackSource::new(),
            validator,
            metrics,
            faults: RwLock::new(HashMap::new()),
        }
    }

    /// Live state of every technique, evaluated now
    pub fn list(&self) -> BTreeMap<TechniqueId, TechniqueState> {
        let fpga = self.local_state(TechniqueId::Fpga);

        let mut hybrid = TechniqueState::operational(TechniqueId::Hybrid);
        hybrid.status = fpga.status;
        hybrid.last_error = fpga.last_error.clone();

        BTreeMap::from([
            (TechniqueId::Fpga, fpga),
            (TechniqueId::Anu, self.validator.status()),
            (TechniqueId::Hybrid, hybrid),
            (
                TechniqueId::Cryptographic,
                self.local_state(TechniqueId::Cryptographic),
            ),
        ])
    }

    pub fn default_technique(&self) -> TechniqueId {
        TechniqueId::default()
    }

    pub fn metrics(&self) -> &MetricsAggregator {
        &self.metrics
    }

    pub fn validator(&self) -> &ExternalValidator {
        &self.validator
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn simulator_stats(&self) -> SimulatorStats {
        self.simulator.stats()
    }

    /// Produce exactly `request.count` values of the requested kind
    #[instrument(skip(self, request), fields(technique = %request.technique, kind = request.kind.type_name(), count = request.count))]
    pub async fn generate(&self, request: GenerationRequest) -> Result<GenerationResult> {
        let request = request.validated(self.config.max_results_per_request)?;
        let technique = request.technique;
        let started = Instant::now();

        let (results, consumed, validation) = match self.produce_values(&request).await {
            Ok(produced) => produced,
            Err(e) => {
                self.record_failure(technique, started.elapsed(), &e);
                return Err(e);
            }
        };

        let elapsed = started.elapsed();
        let quality = (!consumed.is_empty()).then(|| QualityMetrics::measure(&consumed));
        self.record_success(technique, consumed.len(), elapsed, quality);

        let (number_type, algorithm, range, options_count) = match &request.kind {
            OutputKind::Hash { algorithm } => (None, Some(*algorithm), None, None),
            OutputKind::Integer { min, max } => {
                (request.kind.number_type(), None, Some(format!("{}-{}", min, max)), None)
            }
            OutputKind::Float => (request.kind.number_type(), None, None, None),
            OutputKind::Category { options } => (None, None, None, Some(options.len())),
            OutputKind::Boolean => (None, None, None, None),
        };

        debug!(
            size_bytes = consumed.len(),
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            "Generation complete"
        );

        Ok(GenerationResult {
            metadata: GenerationMetadata {
                id: Uuid::new_v4(),
                count: results.len(),
                kind: request.kind.type_name(),
                number_type,
                algorithm,
                range,
                options_count,
                technique,
                source: technique.source_label(),
                generation_time_ms: round_ms(elapsed),
                size_bytes: consumed.len(),
                timestamp: Utc::now(),
                quality,
                validation,
            },
            results,
        })
    }

    /// `n_bytes` raw bytes from `technique`
    #[instrument(skip(self))]
    pub async fn generate_bytes(&self, technique: TechniqueId, n_bytes: usize) -> Result<BytesResult> {
        if n_bytes == 0 || n_bytes > self.config.max_request_bytes {
            return Err(Error::InvalidRequest(format!(
                "size_bytes must be between 1 and {}",
                self.config.max_request_bytes
            )));
        }
        let started = Instant::now();

        let produced = match technique {
            TechniqueId::Fpga | TechniqueId::Cryptographic => {
                self.draw_local(technique, n_bytes).map(|data| (data, None))
            }
            TechniqueId::Anu => self
                .validator
                .fetch(n_bytes)
                .await
                .map(|sample| (sample.data.to_vec(), None)),
            TechniqueId::Hybrid => match self.draw_local(TechniqueId::Fpga, n_bytes) {
                Ok(data) => {
                    let validation = self
                        .validator
                        .validate_batch(&data, self.config.validation_sample_bytes)
                        .await;
                    Ok((data, Some(validation)))
                }
                Err(e) => Err(e),
            },
        };

        let (data, validation) = match produced {
            Ok(produced) => produced,
            Err(e) => {
                self.record_failure(technique, started.elapsed(), &e);
                return Err(e);
            }
        };

        let elapsed = started.elapsed();
        let quality = QualityMetrics::measure(&data);
        self.record_success(technique, data.len(), elapsed, Some(quality));

        Ok(BytesResult {
            throughput_mbps: metrics::throughput_mbps(data.len(), elapsed),
            data,
            technique,
            source: technique.source_label(),
            generation_time_ms: round_ms(elapsed),
            quality,
            validation,
            timestamp: Utc::now(),
        })
    }

    /// Key material of `key_type` derived from fresh entropy
    pub async fn generate_key(
        &self,
        technique: TechniqueId,
        key_type: KeyType,
        key_size_bits: usize,
    ) -> Result<KeyResult> {
        let entropy_bytes = key_type.entropy_bytes(key_size_bits)?;
        let started = Instant::now();
        let entropy = self.generate_bytes(technique, entropy_bytes).await?;
        let key = keys::derive_key(key_type, key_size_bits, &entropy.data)?;

        Ok(KeyResult {
            key,
            key_type,
            key_size_bits,
            entropy_bytes,
            technique,
            generation_time_ms: round_ms(started.elapsed()),
            timestamp: Utc::now(),
        })
    }

    /// Run the randomness test battery over `size_bytes` fresh bytes
    pub async fn validate_randomness(
        &self,
        technique: TechniqueId,
        size_bytes: usize,
    ) -> Result<RandomnessReport> {
        let sample = self.generate_bytes(technique, size_bytes).await?;
        let report = analysis::validate_randomness(&sample.data);
        info!(
            technique = %technique,
            size_bytes,
            passed = report.passed_tests,
            total = report.total_tests,
            "Randomness validation finished"
        );
        Ok(report)
    }

    /// Format values and return them with the entropy they consumed
    async fn produce_values(
        &self,
        request: &GenerationRequest,
    ) -> Result<(Vec<OutputValue>, Vec<u8>, Option<ValidationOutcome>)> {
        match request.technique {
            TechniqueId::Fpga | TechniqueId::Cryptographic => {
                let (values, consumed) = self.format_local(request.technique, request)?;
                Ok((values, consumed, None))
            }
            TechniqueId::Anu => {
                let sample = self.validator.fetch(request.entropy_budget()).await?;
                let (values, consumed) = format_fixed(request, sample.data.to_vec())?;
                Ok((values, consumed, None))
            }
            TechniqueId::Hybrid => {
                let (values, consumed) = self.format_local(TechniqueId::Fpga, request)?;
                let validation = self
                    .validator
                    .validate_batch(&consumed, self.config.validation_sample_bytes)
                    .await;
                Ok((values, consumed, Some(validation)))
            }
        }
    }

    fn format_local(
        &self,
        source: TechniqueId,
        request: &GenerationRequest,
    ) -> Result<(Vec<OutputValue>, Vec<u8>)> {
        let initial = self.draw_local(source, request.expected_entropy_bytes())?;
        let mut reader = EntropyReader::refilling(initial, |n| self.draw_local(source, n));
        let values = formatter::format(&request.kind, request.count, &mut reader)?;
        Ok((values, reader.into_consumed()))
    }

    /// Bytes from a local source; a failure marks the source as faulted
    fn draw_local(&self, source: TechniqueId, n_bytes: usize) -> Result<Vec<u8>> {
        let drawn = match source {
            TechniqueId::Fpga => self.debiaser.extract(n_bytes, |n| self.simulator.draw(n)),
            TechniqueId::Cryptographic => self.os.draw(n_bytes).map(|s| s.into_bytes().to_vec()),
            other => {
                return Err(Error::InvalidRequest(format!(
                    "{} is not a local entropy source",
                    other
                )))
            }
        };

        match drawn {
            Ok(bytes) => {
                if self.faults.read().contains_key(&source) {
                    self.faults.write().remove(&source);
                }
                Ok(bytes)
            }
            Err(e) => {
                if matches!(e, Error::SourceUnavailable(_)) {
                    self.faults.write().insert(
                        source,
                        Fault {
                            reason: e.to_string(),
                            until: Instant::now()
                                + Duration::from_secs(self.config.validator_error_backoff_secs),
                        },
                    );
                }
                Err(e)
            }
        }
    }

    fn local_state(&self, id: TechniqueId) -> TechniqueState {
        let mut state = TechniqueState::operational(id);
        if let Some(fault) = self.faults.read().get(&id) {
            if fault.until > Instant::now() {
                state.status = TechniqueStatus::Error;
                state.last_error = Some(fault.reason.clone());
            }
        }
        state
    }

    fn record_success(
        &self,
        technique: TechniqueId,
        bytes: usize,
        elapsed: Duration,
        quality: Option<QualityMetrics>,
    ) {
        let mut event = GenerationEvent::success(technique, bytes, elapsed);
        if let Some(quality) = quality {
            event = event.with_quality(quality);
        }
        self.metrics.record(event);
    }

    fn record_failure(&self, technique: TechniqueId, elapsed: Duration, err: &Error) {
        match err.kind() {
            ErrorKind::RateLimited => {
                debug!(technique = %technique, retry_after = ?err.retry_after_seconds(), "Request refused during cooldown");
                return;
            }
            ErrorKind::InvalidRequest => {
                debug!(technique = %technique, error = %err, "Request rejected");
                return;
            }
            ErrorKind::SourceUnavailable => {
                error!(technique = %technique, error = %err, "Entropy source failed")
            }
            ErrorKind::UpstreamError => {
                warn!(technique = %technique, error = %err, "External service failed")
            }
            _ => warn!(technique = %technique, error = %err, "Generation failed"),
        }
        self.metrics
            .record(GenerationEvent::failure(technique, elapsed, err.kind()));
    }
}

/// Format from a fixed external sample
fn format_fixed(request: &GenerationRequest, data: Vec<u8>) -> Result<(Vec<OutputValue>, Vec<u8>)> {
    let mut reader = EntropyReader::fixed(data);
    let values = formatter::format(&request.kind, request.count, &mut reader)?;
    Ok((values, reader.into_consumed()))
}

fn round_ms(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 100_000.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::{QuantumUpstream, ValidatorConfig};
    use async_trait::async_trait;
    use rand::{rngs::StdRng, RngCore, SeedableRng};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeAnu {
        calls: AtomicUsize,
        current: AtomicUsize,
        peak: AtomicUsize,
        delay_ms: u64,
        fail: AtomicBool,
    }

    #[async_trait]
    impl QuantumUpstream for FakeAnu {
        fn endpoint(&self) -> String {
            "fake://anu".to_string()
        }

        async fn fetch(&self, n_bytes: usize) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);

            if self.fail.load(Ordering::SeqCst) {
                return Err(Error::Upstream("HTTP 500".to_string()));
            }
            let mut data = vec![0u8; n_bytes];
            StdRng::seed_from_u64(n_bytes as u64).fill_bytes(&mut data);
            Ok(data)
        }
    }

    fn registry_with(upstream: Arc<FakeAnu>) -> TechniqueRegistry {
        let validator = Arc::new(ExternalValidator::new(
            upstream,
            ValidatorConfig::default(),
        ));
        TechniqueRegistry::with_components(
            EngineConfig::default(),
            NoiseSimulator::deterministic(42),
            validator,
            MetricsAggregator::default(),
        )
    }

    fn registry() -> TechniqueRegistry {
        registry_with(Arc::new(FakeAnu::default()))
    }

    fn req(technique: TechniqueId, kind: OutputKind, count: usize) -> GenerationRequest {
        GenerationRequest::new(technique, kind, count)
    }

    #[tokio::test]
    async fn test_exact_counts_for_every_kind() {
        let registry = registry();
        let kinds = vec![
            OutputKind::Boolean,
            OutputKind::Hash {
                algorithm: HashAlgorithm::Blake2b,
            },
            OutputKind::Integer { min: -5, max: 5 },
            OutputKind::Float,
            OutputKind::Category {
                options: vec!["heads".into(), "tails".into()],
            },
        ];
        for technique in [TechniqueId::Fpga, TechniqueId::Cryptographic] {
            for kind in &kinds {
                for count in [1, 7, 100] {
                    let result = registry
                        .generate(req(technique, kind.clone(), count))
                        .await
                        .unwrap();
                    assert_eq!(result.results.len(), count);
                    assert_eq!(result.metadata.count, count);
                    assert_eq!(result.metadata.technique, technique);
                }
            }
        }
    }

    #[tokio::test]
    async fn test_integer_metadata_and_range() {
        let registry = registry();
        let result = registry
            .generate(req(TechniqueId::Fpga, OutputKind::Integer { min: 10, max: 20 }, 200))
            .await
            .unwrap();
        assert_eq!(result.metadata.range.as_deref(), Some("10-20"));
        assert_eq!(result.metadata.number_type, Some("integer"));
        assert_eq!(result.metadata.source, "FPGA Quantum Simulator");
        assert!(result.metadata.size_bytes > 0);
        for value in result.results {
            match value {
                OutputValue::Integer(v) => assert!((10..=20).contains(&v)),
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_fpga_integers_are_uniform() {
        let registry = registry();
        let result = registry
            .generate(req(TechniqueId::Fpga, OutputKind::Integer { min: 1, max: 4 }, 4000))
            .await
            .unwrap();
        let mut counts = [0usize; 4];
        for value in result.results {
            if let OutputValue::Integer(v) = value {
                counts[(v - 1) as usize] += 1;
            }
        }
        let expected = 1000.0;
        let chi_square: f64 = counts
            .iter()
            .map(|&c| (c as f64 - expected).powi(2) / expected)
            .sum();
        // 3 degrees of freedom, p = 0.001
        assert!(chi_square < 16.27, "chi-square {} for {:?}", chi_square, counts);
    }

    #[tokio::test]
    async fn test_invalid_request_consumes_no_entropy() {
        let registry = registry();
        let err = registry
            .generate(req(TechniqueId::Fpga, OutputKind::Integer { min: 3, max: 1 }, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));

        let err = registry
            .generate(req(TechniqueId::Fpga, OutputKind::Boolean, 10_001))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));

        assert_eq!(registry.simulator_stats().draws, 0);
        assert_eq!(registry.metrics().snapshot().real_time_metrics.total_errors, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_anu_cooldown_never_falls_back() {
        let upstream = Arc::new(FakeAnu::default());
        let registry = registry_with(upstream.clone());

        let first = registry
            .generate(req(TechniqueId::Anu, OutputKind::Boolean, 16))
            .await
            .unwrap();
        assert_eq!(first.results.len(), 16);
        assert_eq!(first.metadata.source, "ANU Quantum API");

        let retry_after = match registry
            .generate(req(TechniqueId::Anu, OutputKind::Boolean, 16))
            .await
        {
            Err(Error::RateLimited {
                retry_after_seconds,
                ..
            }) => retry_after_seconds,
            other => panic!("expected rate limit, got {:?}", other.map(|r| r.results)),
        };
        assert!(retry_after > 0);
        assert_eq!(upstream.calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.simulator_stats().draws, 0);

        tokio::time::advance(Duration::from_secs(10)).await;
        let later = registry.list()[&TechniqueId::Anu].cooldown_seconds.unwrap();
        assert!(later < retry_after);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(
            registry.list()[&TechniqueId::Anu].status,
            TechniqueStatus::Available
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_anu_oversized_budget_rejected() {
        let upstream = Arc::new(FakeAnu::default());
        let registry = registry_with(upstream.clone());
        let hashes = req(
            TechniqueId::Anu,
            OutputKind::Hash {
                algorithm: HashAlgorithm::Sha256,
            },
            40,
        );
        let err = registry.generate(hashes).await.unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
        assert_eq!(upstream.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hybrid_degrades_when_validator_fails() {
        let upstream = Arc::new(FakeAnu::default());
        upstream.fail.store(true, Ordering::SeqCst);
        let registry = registry_with(upstream.clone());

        for _ in 0..2 {
            let result = registry
                .generate(req(TechniqueId::Hybrid, OutputKind::Float, 5))
                .await
                .unwrap();
            assert_eq!(result.results.len(), 5);
            match result.metadata.validation {
                Some(ValidationOutcome::Unavailable { .. }) => {}
                other => panic!("expected unavailable validation, got {:?}", other),
            }
        }
        // The second request is refused locally during the error backoff
        assert_eq!(upstream.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            registry.list()[&TechniqueId::Anu].status,
            TechniqueStatus::Error
        );
        assert_eq!(
            registry.list()[&TechniqueId::Hybrid].status,
            TechniqueStatus::Operational
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_hybrid_attaches_validation() {
        let registry = registry();
        let result = registry
            .generate(req(TechniqueId::Hybrid, OutputKind::Boolean, 800))
            .await
            .unwrap();
        let json = serde_json::to_value(&result.metadata).unwrap();
        assert_eq!(json["validation"]["status"], "validated");
        assert_eq!(json["technique"], "hybrid");

        // Cooldown now; the next hybrid batch is still served
        let result = registry
            .generate(req(TechniqueId::Hybrid, OutputKind::Boolean, 8))
            .await
            .unwrap();
        let json = serde_json::to_value(&result.metadata).unwrap();
        assert_eq!(json["validation"]["status"], "unavailable");
        assert!(json["validation"]["retry_after_seconds"].as_u64().unwrap() > 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_fpga_requests_stay_separate() {
        let registry = Arc::new(registry());
        let handles: Vec<_> = (1..=16)
            .map(|i| {
                let registry = registry.clone();
                tokio::spawn(async move {
                    let size = i * 37;
                    let result = registry.generate_bytes(TechniqueId::Fpga, size).await;
                    (size, result)
                })
            })
            .collect();

        let mut outputs = Vec::new();
        for handle in handles {
            let (size, result) = handle.await.unwrap();
            let result = result.unwrap();
            assert_eq!(result.data.len(), size);
            outputs.push(result.data);
        }
        for (i, a) in outputs.iter().enumerate() {
            for b in &outputs[i + 1..] {
                assert_ne!(&a[..16], &b[..16]);
            }
        }
        assert_eq!(
            registry.metrics().snapshot().real_time_metrics.total_requests,
            16
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_anu_call_in_flight() {
        let upstream = Arc::new(FakeAnu {
            delay_ms: 500,
            ..FakeAnu::default()
        });
        let registry = Arc::new(registry_with(upstream.clone()));

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.generate_bytes(TechniqueId::Anu, 32).await })
            })
            .collect();

        let mut ok = 0;
        let mut limited = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(Error::RateLimited { .. }) => limited += 1,
                Err(e) => panic!("unexpected error: {}", e),
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(limited, 5);
        assert_eq!(upstream.peak.load(Ordering::SeqCst), 1);
        assert_eq!(registry.validator().in_flight(), 0);
    }

    #[tokio::test]
    async fn test_metrics_follow_outcomes() {
        let upstream = Arc::new(FakeAnu::default());
        upstream.fail.store(true, Ordering::SeqCst);
        let registry = registry_with(upstream);

        registry.generate_bytes(TechniqueId::Cryptographic, 64).await.unwrap();
        assert!(registry.generate_bytes(TechniqueId::Anu, 64).await.is_err());
        assert!(registry.generate_bytes(TechniqueId::Anu, 64).await.is_err());

        let snapshot = registry.metrics().snapshot();
        assert_eq!(snapshot.real_time_metrics.total_requests, 1);
        assert_eq!(snapshot.real_time_metrics.total_bytes_generated, 64);
        assert_eq!(
            snapshot.source_statistics[&TechniqueId::Cryptographic].requests,
            1
        );
        assert!(snapshot.source_statistics[&TechniqueId::Anu].error_count >= 1);
        assert!(snapshot.quality_metrics.sample_count >= 1);
    }

    #[tokio::test]
    async fn test_bytes_size_limits() {
        let registry = registry();
        assert!(matches!(
            registry.generate_bytes(TechniqueId::Fpga, 0).await,
            Err(Error::InvalidRequest(_))
        ));
        assert!(matches!(
            registry.generate_bytes(TechniqueId::Fpga, 65_537).await,
            Err(Error::InvalidRequest(_))
        ));
        assert!(matches!(
            registry.generate_bytes(TechniqueId::Anu, 2048).await,
            Err(Error::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_key_generation() {
        let registry = registry();
        let key = registry
            .generate_key(TechniqueId::Cryptographic, KeyType::Aes, 192)
            .await
            .unwrap();
        match key.key {
            DerivedKey::Symmetric(bytes) => assert_eq!(bytes.len(), 24),
            other => panic!("unexpected {:?}", other),
        }

        let seed = registry
            .generate_key(TechniqueId::Fpga, KeyType::RsaSeed, 2048)
            .await
            .unwrap();
        assert_eq!(seed.entropy_bytes, keys::RSA_SEED_ENTROPY_BYTES);
        assert!(matches!(seed.key, DerivedKey::RsaSeed(_)));

        assert!(registry
            .generate_key(TechniqueId::Fpga, KeyType::Aes, 100)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_validate_randomness_of_crypto() {
        let registry = registry();
        let report = registry
            .validate_randomness(TechniqueId::Cryptographic, 8192)
            .await
            .unwrap();
        assert_eq!(report.data_size, 8192);
        assert!(report.passed_tests >= 3);
    }

    #[test]
    fn test_listing_covers_every_technique() {
        let registry = registry();
        let list = registry.list();
        assert_eq!(list.len(), 4);
        assert_eq!(list[&TechniqueId::Fpga].status, TechniqueStatus::Operational);
        assert_eq!(list[&TechniqueId::Anu].status, TechniqueStatus::Available);
        assert_eq!(registry.default_technique(), TechniqueId::Fpga);
    }

    #[tokio::test]
    async fn test_fpga_bytes_are_debiased_from_packed_samples() {
        let registry = registry();
        let result = registry.generate_bytes(TechniqueId::Fpga, 8_192).await.unwrap();
        assert_eq!(result.data.len(), 8_192);

        let ones: u32 = result.data.iter().map(|b| b.count_ones()).sum();
        let ratio = ones as f64 / (8_192.0 * 8.0);
        assert!((ratio - 0.5).abs() < 0.01, "ones ratio {}", ratio);
    }

    // Wall-clock bound; only meaningful with optimizations on
    #[cfg(not(debug_assertions))]
    #[tokio::test]
    async fn test_fpga_throughput_under_a_millisecond_per_kilobyte() {
        let registry = registry();
        let mut best = Duration::MAX;
        for _ in 0..5 {
            let started = Instant::now();
            let result = registry
                .generate_bytes(TechniqueId::Fpga, crate::MAX_REQUEST_SIZE)
                .await
                .unwrap();
            assert_eq!(result.data.len(), crate::MAX_REQUEST_SIZE);
            best = best.min(started.elapsed());
        }
        assert!(best < Duration::from_millis(64), "64 KiB took {:?}", best);
    }
}
