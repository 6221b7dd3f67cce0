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

//! Configuration management for the entropy engine and gateway

use crate::{
    fetcher::FetcherConfig, metrics::MetricsConfig, retry::RetryPolicy,
    simulator::{ClockMode, NoiseParams, SimulatorConfig}, validator::ValidatorConfig, Error,
    Result,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Smallest per-attempt timeout the external client is given
const MIN_ATTEMPT_TIMEOUT: Duration = Duration::from_millis(100);

/// Engine configuration
///
/// Flat on purpose so every field maps onto a single `QRNG_*` environment variable.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Sustained throughput target of the simulated path (Mbit/s)
    #[serde(default = "default_target_throughput")]
    pub target_throughput_mbps: f64,

    /// Fixed simulator seed; random when absent
    #[serde(default)]
    pub noise_seed: Option<u64>,

    /// Replay the simulator clock from the call sequence only (reproducible output)
    #[serde(default)]
    pub deterministic_clock: bool,

    /// Simulated sample rate in Hz
    #[serde(default = "default_sample_rate")]
    pub sample_rate_hz: f64,

    #[serde(default = "default_thermal_amplitude")]
    pub thermal_amplitude: f64,

    #[serde(default = "default_thermal_frequency")]
    pub thermal_frequency_hz: f64,

    /// Standard deviation of the Gaussian jitter riding on the thermal term
    #[serde(default = "default_thermal_jitter")]
    pub thermal_jitter: f64,

    /// Probability of a shot-noise impulse per sample
    #[serde(default = "default_shot_rate")]
    pub shot_rate: f64,

    #[serde(default = "default_shot_amplitude")]
    pub shot_amplitude: f64,

    #[serde(default = "default_interference_amplitude")]
    pub interference_amplitude: f64,

    #[serde(default = "default_interference_frequency")]
    pub interference_frequency_hz: f64,

    #[serde(default = "default_interference_phase")]
    pub interference_phase: f64,

    /// Raw-bit budget multiplier for von Neumann extraction
    #[serde(default = "default_debias_budget_factor")]
    pub debias_budget_factor: usize,

    /// Largest `count` accepted by a single formatted generation
    #[serde(default = "default_max_results")]
    pub max_results_per_request: usize,

    /// Largest raw byte request
    #[serde(default = "default_max_request_bytes")]
    pub max_request_bytes: usize,

    /// External quantum service endpoint
    #[serde(default = "default_validator_url")]
    pub validator_url: String,

    #[serde(default = "default_validator_timeout_ms")]
    pub validator_timeout_ms: u64,

    /// Local cooldown after each successful external call
    #[serde(default = "default_cooldown_secs")]
    pub validator_cooldown_secs: u64,

    /// Time spent in `error` before the external technique is offered again
    #[serde(default = "default_error_backoff_secs")]
    pub validator_error_backoff_secs: u64,

    /// How long a request queues behind an in-flight external call
    #[serde(default = "default_queue_wait_ms")]
    pub validator_queue_wait_ms: u64,

    /// Per-call byte limit imposed by the external service
    #[serde(default = "default_validator_max_bytes")]
    pub validator_max_request_bytes: usize,

    #[serde(default = "default_max_retries")]
    pub validator_max_retries: u32,

    /// Bytes fetched to validate a hybrid batch
    #[serde(default = "default_validation_sample")]
    pub validation_sample_bytes: usize,

    /// Events retained for percentile statistics
    #[serde(default = "default_history_size")]
    pub metrics_history_size: usize,

    /// Retention horizon of the live throughput feed
    #[serde(default = "default_feed_horizon_secs")]
    pub metrics_feed_horizon_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            target_throughput_mbps: default_target_throughput(),
            noise_seed: None,
            deterministic_clock: false,
            sample_rate_hz: default_sample_rate(),
            thermal_amplitude: default_thermal_amplitude(),
            thermal_frequency_hz: default_thermal_frequency(),
            thermal_jitter: default_thermal_jitter(),
            shot_rate: default_shot_rate(),
            shot_amplitude: default_shot_amplitude(),
            interference_amplitude: default_interference_amplitude(),
            interference_frequency_hz: default_interference_frequency(),
            interference_phase: default_interference_phase(),
            debias_budget_factor: default_debias_budget_factor(),
            max_results_per_request: default_max_results(),
            max_request_bytes: default_max_request_bytes(),
            validator_url: default_validator_url(),
            validator_timeout_ms: default_validator_timeout_ms(),
            validator_cooldown_secs: default_cooldown_secs(),
            validator_error_backoff_secs: default_error_backoff_secs(),
            validator_queue_wait_ms: default_queue_wait_ms(),
            validator_max_request_bytes: default_validator_max_bytes(),
            validator_max_retries: default_max_retries(),
            validation_sample_bytes: default_validation_sample(),
            metrics_history_size: default_history_size(),
            metrics_feed_horizon_secs: default_feed_horizon_secs(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let config: Self = envy::prefixed("QRNG_")
            .from_env()
            .map_err(|e| Error::Config(format!("Failed to parse environment variables: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !(self.target_throughput_mbps > 0.0) {
            return Err(Error::Config(
                "target_throughput_mbps must be > 0".to_string(),
            ));
        }

        if !(self.sample_rate_hz > 0.0) {
            return Err(Error::Config("sample_rate_hz must be > 0".to_string()));
        }

        if !(self.thermal_jitter > 0.0) {
            return Err(Error::Config("thermal_jitter must be > 0".to_string()));
        }

        if !(0.0..=1.0).contains(&self.shot_rate) {
            return Err(Error::Config(
                "shot_rate must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.debias_budget_factor < 4 {
            return Err(Error::Config(
                "debias_budget_factor must be >= 4 (expected yield is 1/4)".to_string(),
            ));
        }

        if self.max_results_per_request == 0 {
            return Err(Error::Config(
                "max_results_per_request must be > 0".to_string(),
            ));
        }

        if self.max_request_bytes == 0 || self.max_request_bytes > crate::MAX_REQUEST_SIZE {
            return Err(Error::Config(format!(
                "max_request_bytes must be between 1 and {}",
                crate::MAX_REQUEST_SIZE
            )));
        }

        Url::parse(&self.validator_url)
            .map_err(|e| Error::Config(format!("Invalid validator_url: {}", e)))?;

        if self.validator_max_request_bytes == 0 {
            return Err(Error::Config(
                "validator_max_request_bytes must be > 0".to_string(),
            ));
        }

        if self.validation_sample_bytes == 0
            || self.validation_sample_bytes > self.validator_max_request_bytes
        {
            return Err(Error::Config(
                "validation_sample_bytes must be between 1 and validator_max_request_bytes"
                    .to_string(),
            ));
        }

        self.attempt_timeout(&self.retry_policy())?;

        if self.metrics_history_size == 0 {
            return Err(Error::Config("metrics_history_size must be > 0".to_string()));
        }

        Ok(())
    }

    pub fn simulator_config(&self) -> SimulatorConfig {
        SimulatorConfig {
            seed: self.noise_seed,
            clock: if self.deterministic_clock {
                ClockMode::Deterministic
            } else {
                ClockMode::RealTime
            },
            sample_rate_hz: self.sample_rate_hz,
            params: NoiseParams {
                thermal_amplitude: self.thermal_amplitude,
                thermal_frequency_hz: self.thermal_frequency_hz,
                thermal_jitter: self.thermal_jitter,
                shot_rate: self.shot_rate,
                shot_amplitude: self.shot_amplitude,
                interference_amplitude: self.interference_amplitude,
                interference_frequency_hz: self.interference_frequency_hz,
                interference_phase: self.interference_phase,
            },
        }
    }

    pub fn validator_config(&self) -> ValidatorConfig {
        ValidatorConfig {
            cooldown: Duration::from_secs(self.validator_cooldown_secs),
            error_backoff: Duration::from_secs(self.validator_error_backoff_secs),
            queue_wait: Duration::from_millis(self.validator_queue_wait_ms),
            call_timeout: Duration::from_millis(self.validator_timeout_ms),
            max_request_bytes: self.validator_max_request_bytes,
        }
    }

    pub fn fetcher_config(&self) -> Result<FetcherConfig> {
        let base_url = Url::parse(&self.validator_url)
            .map_err(|e| Error::Config(format!("Invalid validator_url: {}", e)))?;
        let retry_policy = self.retry_policy();
        let mut config = FetcherConfig::new(base_url);
        config.timeout = self.attempt_timeout(&retry_policy)?;
        config.retry_policy = retry_policy;
        Ok(config)
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.validator_max_retries.max(1),
            ..RetryPolicy::default()
        }
    }

    /// Share of `validator_timeout_ms` left to each attempt once backoff is paid for
    fn attempt_timeout(&self, policy: &RetryPolicy) -> Result<Duration> {
        let call_timeout = Duration::from_millis(self.validator_timeout_ms);
        let per_attempt =
            call_timeout.saturating_sub(policy.worst_case_backoff()) / policy.max_attempts;
        if per_attempt < MIN_ATTEMPT_TIMEOUT {
            return Err(Error::Config(format!(
                "validator_timeout_ms leaves {:?} per attempt across {} attempts (min {:?})",
                per_attempt, policy.max_attempts, MIN_ATTEMPT_TIMEOUT
            )));
        }
        Ok(per_attempt)
    }

    pub fn metrics_config(&self) -> MetricsConfig {
        MetricsConfig {
            history_size: self.metrics_history_size,
            feed_horizon: Duration::from_secs(self.metrics_feed_horizon_secs),
            target_throughput_mbps: self.target_throughput_mbps,
            ..MetricsConfig::default()
        }
    }
}

/// Gateway configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayConfig {
    /// Bind address for HTTP server
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Expose Prometheus metrics at /metrics
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,

    /// Per-request timeout applied by the HTTP layer
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

/// Gateway-only settings read from the environment
#[derive(Debug, Deserialize)]
struct GatewayEnv {
    #[serde(default = "default_listen_address")]
    listen_address: String,
    #[serde(default = "default_true")]
    metrics_enabled: bool,
    #[serde(default = "default_request_timeout_secs")]
    request_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            metrics_enabled: true,
            request_timeout_secs: default_request_timeout_secs(),
            engine: EngineConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let gateway: GatewayEnv = envy::prefixed("QRNG_")
            .from_env()
            .map_err(|e| Error::Config(format!("Failed to parse environment variables: {}", e)))?;
        let config = Self {
            listen_address: gateway.listen_address,
            metrics_enabled: gateway.metrics_enabled,
            request_timeout_secs: gateway.request_timeout_secs,
            engine: EngineConfig::from_env()?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.listen_address
            .parse::<std::net::SocketAddr>()
            .map_err(|e| Error::Config(format!("Invalid listen_address: {}", e)))?;

        // Queueing plus the external call must finish before the HTTP layer gives up
        let upstream_ms = self
            .engine
            .validator_queue_wait_ms
            .saturating_add(self.engine.validator_timeout_ms);
        if self.request_timeout_secs.saturating_mul(1000) <= upstream_ms {
            return Err(Error::Config(
                "request_timeout_secs must exceed validator_queue_wait_ms + validator_timeout_ms"
                    .to_string(),
            ));
        }

        self.engine.validate()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// Default value functions
fn default_target_throughput() -> f64 {
    crate::DEFAULT_TARGET_THROUGHPUT_MBPS
}

fn default_sample_rate() -> f64 {
    50_000_000.0 // one sample per bit at the 50 Mbit/s target
}

fn default_thermal_amplitude() -> f64 {
    0.1
}

fn default_thermal_frequency() -> f64 {
    1_000.0
}

fn default_thermal_jitter() -> f64 {
    1.0
}

fn default_shot_rate() -> f64 {
    0.05
}

fn default_shot_amplitude() -> f64 {
    0.5
}

fn default_interference_amplitude() -> f64 {
    0.05
}

fn default_interference_frequency() -> f64 {
    2_500_000.0
}

fn default_interference_phase() -> f64 {
    std::f64::consts::FRAC_PI_3
}

fn default_debias_budget_factor() -> usize {
    64
}

fn default_max_results() -> usize {
    10_000
}

fn default_max_request_bytes() -> usize {
    crate::MAX_REQUEST_SIZE
}

fn default_validator_url() -> String {
    "https://qrng.anu.edu.au/API/jsonI.php".to_string()
}

fn default_validator_timeout_ms() -> u64 {
    30_000
}

fn default_cooldown_secs() -> u64 {
    crate::DEFAULT_COOLDOWN_SECS
}

fn default_error_backoff_secs() -> u64 {
    30
}

fn default_queue_wait_ms() -> u64 {
    2_000
}

fn default_validator_max_bytes() -> usize {
    1024
}

fn default_max_retries() -> u32 {
    3
}

fn default_validation_sample() -> usize {
    100
}

fn default_history_size() -> usize {
    1000
}

fn default_feed_horizon_secs() -> u64 {
    60
}

fn default_listen_address() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_true() -> bool {
    true
}
