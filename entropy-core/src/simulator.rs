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

//! Simulated FPGA noise source
//!
//! Each raw bit is the sign of a composite analog signal sampled at `sample_rate_hz`:
//!
//! ```text
//! s(t) = A_th * sin(2π f_th t) + N(0, σ)          thermal, slow drift plus jitter
//!      + shot(t)                                  Bernoulli impulses of random polarity
//!      + A_if * sin(2π f_if t + φ)                interference, faster and phase shifted
//! ```
//!
//! The raw stream is deliberately imperfect (the sinusoids bias it slowly), which is why the
//! fpga path always runs it through the [`crate::debias::Debiaser`].
//!
//! Bits are packed as they are produced. The sinusoids run as rotating phasors resynced to
//! the exact phase every [`RESYNC_TICKS`], and shot impulses are placed by geometric gaps,
//! so a raw bit costs one normal variate and a handful of multiplications.

use crate::{sample::RawSample, technique::TechniqueId, Error, Result};
use rand::{rngs::SmallRng, Rng, RngCore, SeedableRng};
use rand_distr::{Distribution, Geometric, StandardNormal};
use serde::Serialize;
use std::f64::consts::TAU;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, trace};

/// Ticks between exact phase resynchronisations of the oscillators
pub const RESYNC_TICKS: u64 = 4096;

/// How the simulator advances its internal time index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockMode {
    /// Time index is a pure function of the call sequence; output is reproducible for a seed
    Deterministic,
    /// Time index also advances with wall-clock elapsed time
    RealTime,
}

/// Noise model coefficients
#[derive(Debug, Clone, Serialize)]
pub struct NoiseParams {
    pub thermal_amplitude: f64,
    pub thermal_frequency_hz: f64,
    pub thermal_jitter: f64,
    pub shot_rate: f64,
    pub shot_amplitude: f64,
    pub interference_amplitude: f64,
    pub interference_frequency_hz: f64,
    pub interference_phase: f64,
}

impl Default for NoiseParams {
    fn default() -> Self {
        Self {
            thermal_amplitude: 0.1,
            thermal_frequency_hz: 1_000.0,
            thermal_jitter: 1.0,
            shot_rate: 0.05,
            shot_amplitude: 0.5,
            interference_amplitude: 0.05,
            interference_frequency_hz: 2_500_000.0,
            interference_phase: std::f64::consts::FRAC_PI_3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Fixed seed; drawn from the OS when absent
    pub seed: Option<u64>,
    pub clock: ClockMode,
    pub sample_rate_hz: f64,
    pub params: NoiseParams,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            seed: None,
            clock: ClockMode::RealTime,
            sample_rate_hz: 50_000_000.0,
            params: NoiseParams::default(),
        }
    }
}

/// Counters reported on the simulator status view
#[derive(Debug, Clone, Serialize)]
pub struct SimulatorStats {
    pub draws: u64,
    pub raw_bits_generated: u64,
    pub clock_mode: &'static str,
    pub sample_rate_hz: f64,
    pub params: NoiseParams,
}

/// Thermal/shot/interference noise simulator
///
/// Safe to share across threads: every call reserves its own tick range and builds a
/// private RNG, so no lock is held while sampling.
pub struct NoiseSimulator {
    config: SimulatorConfig,
    seed: u64,
    epoch: Instant,
    next_tick: AtomicU64,
    draws: AtomicU64,
    thermal: Oscillator,
    interference: Oscillator,
    /// Ticks between shot impulses; `None` when `shot_rate` is zero
    shot_gap: Option<Geometric>,
}

impl NoiseSimulator {
    pub fn new(config: SimulatorConfig) -> Result<Self> {
        if !(0.0..=1.0).contains(&config.params.shot_rate) || !(config.sample_rate_hz > 0.0) {
            return Err(Error::Config(
                "simulator needs shot_rate in [0, 1] and a positive sample rate".to_string(),
            ));
        }

        let seed = match config.seed {
            Some(seed) => seed,
            None => {
                let mut buf = [0u8; 8];
                rand::rngs::OsRng.try_fill_bytes(&mut buf).map_err(|e| {
                    Error::SourceUnavailable(format!("cannot seed noise simulator: {}", e))
                })?;
                u64::from_le_bytes(buf)
            }
        };

        debug!(
            clock = ?config.clock,
            sample_rate_hz = config.sample_rate_hz,
            seeded = config.seed.is_some(),
            "Noise simulator initialized"
        );

        Ok(Self::build(config, seed))
    }

    /// Reproducible simulator for a fixed seed
    pub fn deterministic(seed: u64) -> Self {
        Self::build(
            SimulatorConfig {
                seed: Some(seed),
                clock: ClockMode::Deterministic,
                ..SimulatorConfig::default()
            },
            seed,
        )
    }

    fn build(config: SimulatorConfig, seed: u64) -> Self {
        let params = &config.params;
        let thermal = Oscillator::new(
            params.thermal_amplitude,
            params.thermal_frequency_hz,
            0.0,
            config.sample_rate_hz,
        );
        let interference = Oscillator::new(
            params.interference_amplitude,
            params.interference_frequency_hz,
            params.interference_phase,
            config.sample_rate_hz,
        );
        let shot_gap = if params.shot_rate > 0.0 {
            Geometric::new(params.shot_rate).ok()
        } else {
            None
        };

        Self {
            config,
            seed,
            epoch: Instant::now(),
            next_tick: AtomicU64::new(0),
            draws: AtomicU64::new(0),
            thermal,
            interference,
            shot_gap,
        }
    }

    /// Draw `n_bits` raw (biased) bits, packed MSB-first
    pub fn draw(&self, n_bits: usize) -> Result<RawSample> {
        if n_bits == 0 {
            return Ok(RawSample::from_packed(TechniqueId::Fpga, Vec::new(), 0));
        }

        let start_tick = self.reserve(n_bits as u64);
        let mut rng = SmallRng::seed_from_u64(mix(self.seed, start_tick));
        let mut thermal = self.thermal;
        let mut interference = self.interference;
        let jitter = self.config.params.thermal_jitter;
        let shot_amplitude = self.config.params.shot_amplitude;
        let mut next_shot = self.next_shot_gap(&mut rng);

        let mut data = Vec::with_capacity((n_bits + 7) / 8);
        let mut byte = 0u8;

        for i in 0..n_bits as u64 {
            if i % RESYNC_TICKS == 0 {
                let tick = start_tick.wrapping_add(i);
                thermal.seek(tick);
                interference.seek(tick);
            }

            let noise: f64 = rng.sample(StandardNormal);
            let mut signal = thermal.next() + jitter * noise + interference.next();

            if i == next_shot {
                signal += if rng.gen::<bool>() {
                    shot_amplitude
                } else {
                    -shot_amplitude
                };
                next_shot = i.saturating_add(1).saturating_add(self.next_shot_gap(&mut rng));
            }

            if !signal.is_finite() {
                return Err(Error::SourceUnavailable(
                    "noise simulator produced a non-finite sample".to_string(),
                ));
            }

            byte = (byte << 1) | (signal > 0.0) as u8;
            if i % 8 == 7 {
                data.push(byte);
                byte = 0;
            }
        }

        let tail = n_bits % 8;
        if tail != 0 {
            data.push(byte << (8 - tail));
        }

        self.draws.fetch_add(1, Ordering::Relaxed);
        trace!(n_bits, start_tick, "Simulated raw bits");
        Ok(RawSample::from_packed(TechniqueId::Fpga, data, n_bits))
    }

    pub fn stats(&self) -> SimulatorStats {
        SimulatorStats {
            draws: self.draws.load(Ordering::Relaxed),
            raw_bits_generated: self.next_tick.load(Ordering::Relaxed),
            clock_mode: match self.config.clock {
                ClockMode::Deterministic => "deterministic",
                ClockMode::RealTime => "real_time",
            },
            sample_rate_hz: self.config.sample_rate_hz,
            params: self.config.params.clone(),
        }
    }

    /// Ticks until the next shot impulse
    fn next_shot_gap(&self, rng: &mut SmallRng) -> u64 {
        match &self.shot_gap {
            Some(gap) => gap.sample(rng),
            None => u64::MAX,
        }
    }

    /// Reserve a tick range for one draw and return its first tick
    fn reserve(&self, n: u64) -> u64 {
        let reserved = self.next_tick.fetch_add(n, Ordering::Relaxed);
        match self.config.clock {
            ClockMode::Deterministic => reserved,
            ClockMode::RealTime => {
                let elapsed_ticks =
                    (self.epoch.elapsed().as_secs_f64() * self.config.sample_rate_hz) as u64;
                reserved.wrapping_add(elapsed_ticks)
            }
        }
    }
}

/// Sinusoid stepped by rotating its (cos, sin) phasor one tick at a time
#[derive(Debug, Clone, Copy)]
struct Oscillator {
    amplitude: f64,
    /// Radians per tick
    step: f64,
    phase: f64,
    step_cos: f64,
    step_sin: f64,
    cos: f64,
    sin: f64,
}

impl Oscillator {
    fn new(amplitude: f64, frequency_hz: f64, phase: f64, sample_rate_hz: f64) -> Self {
        let step = TAU * frequency_hz / sample_rate_hz;
        let (step_sin, step_cos) = step.sin_cos();
        let (sin, cos) = phase.sin_cos();
        Self {
            amplitude,
            step,
            phase,
            step_cos,
            step_sin,
            cos,
            sin,
        }
    }

    /// Jump to the exact phase of `tick`
    fn seek(&mut self, tick: u64) {
        let angle = (self.step * tick as f64 + self.phase).rem_euclid(TAU);
        let (sin, cos) = angle.sin_cos();
        self.sin = sin;
        self.cos = cos;
    }

    /// Current value, then advance one tick
    #[inline]
    fn next(&mut self) -> f64 {
        let value = self.amplitude * self.sin;
        let cos = self.cos * self.step_cos - self.sin * self.step_sin;
        self.sin = self.sin * self.step_cos + self.cos * self.step_sin;
        self.cos = cos;
        value
    }
}

/// SplitMix64 finalizer over seed and tick
fn mix(seed: u64, tick: u64) -> u64 {
    let mut z = seed ^ tick.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic_sequence_is_reproducible() {
        let a = NoiseSimulator::deterministic(42);
        let b = NoiseSimulator::deterministic(42);

        for _ in 0..3 {
            assert_eq!(a.draw(256).unwrap().data, b.draw(256).unwrap().data);
        }
    }

    #[test]
    fn test_different_seeds_diverge() {
        let a = NoiseSimulator::deterministic(1).draw(512).unwrap();
        let b = NoiseSimulator::deterministic(2).draw(512).unwrap();
        assert_ne!(a.data, b.data);
    }

    #[test]
    fn test_consecutive_draws_differ() {
        let sim = NoiseSimulator::deterministic(7);
        let first = sim.draw(512).unwrap();
        let second = sim.draw(512).unwrap();
        assert_ne!(first.data, second.data);
    }

    #[test]
    fn test_draw_length_and_rough_balance() {
        let sim = NoiseSimulator::deterministic(99);
        let sample = sim.draw(20_000).unwrap();
        let bits = sample.bits();
        assert_eq!(bits.len(), 20_000);

        let ones = bits.iter().filter(|&&b| b).count() as f64 / bits.len() as f64;
        assert!(ones > 0.4 && ones < 0.6, "ones ratio {}", ones);
    }

    #[test]
    fn test_zero_bits() {
        let sim = NoiseSimulator::deterministic(5);
        let sample = sim.draw(0).unwrap();
        assert!(sample.is_empty());
    }

    #[test]
    fn test_real_time_simulator() {
        let sim = NoiseSimulator::new(SimulatorConfig::default()).unwrap();
        let sample = sim.draw(64).unwrap();
        assert_eq!(sample.bit_len, 64);
        assert_eq!(sim.stats().draws, 1);
        assert_eq!(sim.stats().clock_mode, "real_time");
    }

    #[test]
    fn test_oscillator_tracks_exact_sine() {
        let sample_rate = 50_000_000.0;
        let mut osc = Oscillator::new(0.5, 2_500_000.0, 0.3, sample_rate);
        osc.seek(1_000);

        for tick in 1_000..1_000 + RESYNC_TICKS {
            let t = tick as f64 / sample_rate;
            let exact = 0.5 * (TAU * 2_500_000.0 * t + 0.3).sin();
            assert!((osc.next() - exact).abs() < 1e-9, "tick {}", tick);
        }
    }

    #[test]
    fn test_partial_byte_is_zero_padded() {
        let sim = NoiseSimulator::deterministic(11);
        let sample = sim.draw(13).unwrap();
        assert_eq!(sample.len_bytes(), 2);
        assert_eq!(sample.bit_len, 13);
        assert_eq!(sample.data[1] & 0b0000_0111, 0);
    }

    #[test]
    fn test_shot_rate_extremes() {
        for shot_rate in [0.0, 1.0] {
            let config = SimulatorConfig {
                seed: Some(4),
                clock: ClockMode::Deterministic,
                params: NoiseParams {
                    shot_rate,
                    ..NoiseParams::default()
                },
                ..SimulatorConfig::default()
            };
            let sim = NoiseSimulator::new(config).unwrap();
            let bits = sim.draw(8_192).unwrap().bits();
            let ones = bits.iter().filter(|&&b| b).count() as f64 / bits.len() as f64;
            assert!(ones > 0.4 && ones < 0.6, "shot_rate {} ones {}", shot_rate, ones);
        }
    }
}
