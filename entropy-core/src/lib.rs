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

//! QRNG Entropy Engine
//!
//! This crate is the generation-and-measurement engine behind the quantum RNG dashboard.
//! It turns a simulated hardware noise source, the host CSPRNG and a rate-limited external
//! quantum service into formatted random values, and keeps running throughput, latency and
//! quality statistics about everything it produces.
//!
//! # Architecture
//!
//! ```text
//!                 ┌────────────────────┐
//!   request ────> │ TechniqueRegistry  │ ──── fpga ────> NoiseSimulator ──> Debiaser ─┐
//!                 │  (dispatch/state)  │ ──── anu ─────> ExternalValidator ───────────┤
//!                 └────────────────────┘ ──── hybrid ──> fpga + opportunistic anu ────┤
//!                           │            ──── crypto ──> CryptoFallbackSource ────────┤
//!                           │                                                         v
//!                           │                                               ResultFormatter
//!                           v                                                         │
//!                 ┌────────────────────┐                                              │
//!                 │ MetricsAggregator  │ <──────────── generation event ──────────────┘
//!                 └────────────────────┘
//! ```
//!
//! The library is organized into modules representing core concerns:
//! - `simulator`: thermal/shot/interference noise simulation
//! - `debias`: von Neumann extractor with a bounded raw-bit budget
//! - `os_source`: operating system CSPRNG source
//! - `fetcher` / `validator`: external quantum service client and its cooldown gate
//! - `registry`: technique dispatch and live technique status
//! - `formatter`: entropy-to-value shaping (booleans, hashes, numbers, categories)
//! - `metrics` / `window`: event aggregation, percentiles and health scoring
//! - `analysis`: Shannon entropy and statistical randomness tests
//! - `error`: unified error types

pub mod analysis;
pub mod config;
pub mod debias;
pub mod error;
pub mod fetcher;
pub mod formatter;
pub mod keys;
pub mod metrics;
pub mod os_source;
pub mod protocol;
pub mod registry;
pub mod retry;
pub mod sample;
pub mod simulator;
pub mod technique;
pub mod validator;
pub mod window;

pub use error::{Error, ErrorKind, Result};
pub use metrics::MetricsAggregator;
pub use registry::TechniqueRegistry;
pub use technique::{TechniqueId, TechniqueStatus};

/// Library version reported by the gateway
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum raw byte request size to prevent OOM
pub const MAX_REQUEST_SIZE: usize = 65_536; // 64 KiB

/// Nominal sustained throughput of the simulated noise path (Mbit/s)
pub const DEFAULT_TARGET_THROUGHPUT_MBPS: f64 = 50.0;

/// Cooldown applied after every successful external call
pub const DEFAULT_COOLDOWN_SECS: u64 = 70;
