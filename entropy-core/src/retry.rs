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

//! Bounded retry with exponential backoff for transient upstream failures

use crate::{Error, Result};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_backoff: Duration,
    /// Upper bound for any single delay
    pub max_backoff: Duration,
    /// Growth factor between consecutive delays
    pub multiplier: f64,
    /// Spread retries by up to a quarter of the delay
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(5),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Run `operation`, retrying only errors where [`crate::Error::is_retryable`] holds
    pub async fn execute<F, Fut, T>(&self, label: &str, operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        self.execute_when(label, Error::is_retryable, operation).await
    }

    /// Run `operation`, retrying only errors accepted by `retry_when`
    pub async fn execute_when<P, F, Fut, T>(
        &self,
        label: &str,
        retry_when: P,
        mut operation: F,
    ) -> Result<T>
    where
        P: Fn(&Error) -> bool,
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;

            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(label, attempt, "Upstream call recovered");
                    }
                    return Ok(value);
                }
                Err(e) if retry_when(&e) && attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        label,
                        attempt,
                        max_attempts = self.max_attempts,
                        "Upstream call failed: {}. Retrying in {:?}",
                        e,
                        delay
                    );
                    sleep(delay).await;
                }
                Err(e) => {
                    if attempt > 1 {
                        warn!(label, attempt, "Giving up on upstream call: {}", e);
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Longest total sleep between attempts, jitter included
    pub fn worst_case_backoff(&self) -> Duration {
        let total: Duration = (1..self.max_attempts)
            .map(|attempt| {
                let exp = self.multiplier.powi(attempt as i32 - 1);
                let base = (self.initial_backoff.as_secs_f64() * exp)
                    .min(self.max_backoff.as_secs_f64());
                Duration::from_secs_f64(base)
            })
            .sum();
        if self.jitter {
            total + total / 4
        } else {
            total
        }
    }

    /// Delay after the given (1-based) failed attempt
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        let base = (self.initial_backoff.as_secs_f64() * exp).min(self.max_backoff.as_secs_f64());
        let delay = Duration::from_secs_f64(base);

        if self.jitter {
            add_jitter(delay)
        } else {
            delay
        }
    }
}

fn add_jitter(duration: Duration) -> Duration {
    use rand::Rng;
    let spread = (duration.as_millis() / 4) as u64;
    if spread == 0 {
        return duration;
    }
    duration + Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
}
