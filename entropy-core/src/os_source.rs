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

//! Operating system CSPRNG source

use crate::{sample::RawSample, technique::TechniqueId, Error, Result};
use rand::{rngs::OsRng, RngCore};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::error;

/// Thin wrapper over the OS entropy pool
///
/// Stateless apart from counters. Failures surface as [`Error::SourceUnavailable`] and are
/// never papered over with a weaker generator.
#[derive(Debug, Default)]
pub struct CryptoFallbackSource {
    bytes_served: AtomicU64,
    failures: AtomicU64,
}

impl CryptoFallbackSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Draw `n_bytes` bytes from the OS CSPRNG
    pub fn draw(&self, n_bytes: usize) -> Result<RawSample> {
        let mut buf = vec![0u8; n_bytes];
        if let Err(e) = OsRng.try_fill_bytes(&mut buf) {
            self.failures.fetch_add(1, Ordering::Relaxed);
            error!("OS entropy source failed: {}", e);
            return Err(Error::SourceUnavailable(format!("OS CSPRNG failed: {}", e)));
        }

        self.bytes_served
            .fetch_add(n_bytes as u64, Ordering::Relaxed);
        Ok(RawSample::from_bytes(TechniqueId::Cryptographic, buf))
    }

    pub fn bytes_served(&self) -> u64 {
        self.bytes_served.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}
