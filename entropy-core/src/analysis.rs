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

//! Statistical quality measures for generated bytes
//!
//! Two tiers: [`QualityMetrics`] is cheap enough to run on every generated batch, while
//! [`RandomnessReport`] runs the full battery used by the validation endpoint.

use serde::Serialize;

/// Shannon entropy of the byte histogram, in bits per byte (0.0..=8.0)
pub fn shannon_entropy(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let n = data.len() as f64;
    histogram(data)
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / n;
            -p * p.log2()
        })
        .sum()
}

pub fn mean(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().map(|&b| b as f64).sum::<f64>() / data.len() as f64
}

/// Population standard deviation
pub fn std_dev(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let m = mean(data);
    let var = data
        .iter()
        .map(|&b| (b as f64 - m).powi(2))
        .sum::<f64>()
        / data.len() as f64;
    var.sqrt()
}

fn histogram(data: &[u8]) -> [u64; 256] {
    let mut counts = [0u64; 256];
    for &b in data {
        counts[b as usize] += 1;
    }
    counts
}

fn count_ones(data: &[u8]) -> u64 {
    data.iter().map(|b| b.count_ones() as u64).sum()
}

/// Per-batch quality figures recorded with every generation event
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QualityMetrics {
    pub entropy: f64,
    pub ones_ratio: f64,
    /// `1 - 2 * |ones_ratio - 0.5|`
    pub uniformity_score: f64,
}

impl QualityMetrics {
    pub fn measure(data: &[u8]) -> Self {
        if data.is_empty() {
            return Self {
                entropy: 0.0,
                ones_ratio: 0.5,
                uniformity_score: 0.0,
            };
        }
        let ones_ratio = count_ones(data) as f64 / (data.len() * 8) as f64;
        Self {
            entropy: shannon_entropy(data),
            ones_ratio,
            uniformity_score: 1.0 - (ones_ratio - 0.5).abs() * 2.0,
        }
    }
}

/// Outcome of one statistical test
#[derive(Debug, Clone, Serialize)]
pub struct TestResult {
    pub name: &'static str,
    pub passed: bool,
    pub statistic: f64,
    /// Pass boundary for `statistic`
    pub threshold: f64,
    pub details: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Assessment {
    Good,
    Fair,
    Poor,
}

#[derive(Debug, Clone, Serialize)]
pub struct RandomnessReport {
    pub data_size: usize,
    pub tests: Vec<TestResult>,
    pub passed_tests: usize,
    pub total_tests: usize,
    /// Fraction of tests passed
    pub quality_score: f64,
    pub assessment: Assessment,
}

/// Run the full test battery over `data`
pub fn validate_randomness(data: &[u8]) -> RandomnessReport {
    let mut tests = vec![
        frequency_test(data),
        runs_test(data),
        chi_square_test(data),
        entropy_test(data),
    ];
    if let Some(serial) = serial_correlation_test(data) {
        tests.push(serial);
    }

    let passed_tests = tests.iter().filter(|t| t.passed).count();
    let total_tests = tests.len();
    let ratio = passed_tests as f64 / total_tests as f64;

    let assessment = if ratio >= 0.8 {
        Assessment::Good
    } else if ratio >= 0.6 {
        Assessment::Fair
    } else {
        Assessment::Poor
    };

    RandomnessReport {
        data_size: data.len(),
        tests,
        passed_tests,
        total_tests,
        quality_score: ratio,
        assessment,
    }
}

/// Monobit chi-square (1 degree of freedom, 95%)
pub fn frequency_test(data: &[u8]) -> TestResult {
    const CRITICAL: f64 = 3.841;
    let n = (data.len() * 8) as f64;
    let ones = count_ones(data) as f64;
    let zeros = n - ones;
    let expected = n / 2.0;
    let chi_square = if expected > 0.0 {
        ((ones - expected).powi(2) + (zeros - expected).powi(2)) / expected
    } else {
        0.0
    };

    TestResult {
        name: "frequency",
        passed: n > 0.0 && chi_square < CRITICAL,
        statistic: chi_square,
        threshold: CRITICAL,
        details: format!("ones={} zeros={}", ones, zeros),
    }
}

/// Wald-Wolfowitz runs test over the bit stream
pub fn runs_test(data: &[u8]) -> TestResult {
    const CRITICAL: f64 = 1.96;
    let bits = crate::sample::unpack_bits(data);
    let n = bits.len() as f64;

    let runs = if bits.is_empty() {
        0
    } else {
        1 + bits.windows(2).filter(|w| w[0] != w[1]).count()
    };
    let ones = bits.iter().filter(|&&b| b).count() as f64;

    let (expected, z_score) = if n > 1.0 {
        let product = 2.0 * ones * (n - ones);
        let expected = product / n + 1.0;
        let variance = product * (product - n) / (n * n * (n - 1.0));
        if variance > 0.0 {
            (expected, (runs as f64 - expected).abs() / variance.sqrt())
        } else {
            (expected, 0.0)
        }
    } else {
        (0.0, 0.0)
    };

    TestResult {
        name: "runs",
        passed: z_score < CRITICAL,
        statistic: z_score,
        threshold: CRITICAL,
        details: format!("runs_observed={} runs_expected={:.2}", runs, expected),
    }
}

/// Byte-histogram chi-square (255 degrees of freedom, 95%)
pub fn chi_square_test(data: &[u8]) -> TestResult {
    const CRITICAL: f64 = 293.25;
    let expected = data.len() as f64 / 256.0;
    let chi_square = if expected > 0.0 {
        histogram(data)
            .iter()
            .map(|&c| (c as f64 - expected).powi(2) / expected)
            .sum()
    } else {
        0.0
    };

    TestResult {
        name: "chi_square",
        passed: !data.is_empty() && chi_square < CRITICAL,
        statistic: chi_square,
        threshold: CRITICAL,
        details: "degrees_of_freedom=255".to_string(),
    }
}

pub fn entropy_test(data: &[u8]) -> TestResult {
    const THRESHOLD: f64 = 7.5;
    let entropy = shannon_entropy(data);
    TestResult {
        name: "entropy",
        passed: entropy > THRESHOLD,
        statistic: entropy,
        threshold: THRESHOLD,
        details: format!("entropy_ratio={:.4}", entropy / 8.0),
    }
}

/// Lag-1 Pearson correlation between consecutive bytes; `None` below two bytes
pub fn serial_correlation_test(data: &[u8]) -> Option<TestResult> {
    const THRESHOLD: f64 = 0.1;
    if data.len() < 2 {
        return None;
    }

    let x = &data[..data.len() - 1];
    let y = &data[1..];
    let (mx, my) = (mean(x), mean(y));

    let mut cov = 0.0;
    let mut vx = 0.0;
    let mut vy = 0.0;
    for (&a, &b) in x.iter().zip(y) {
        let dx = a as f64 - mx;
        let dy = b as f64 - my;
        cov += dx * dy;
        vx += dx * dx;
        vy += dy * dy;
    }

    let denom = (vx * vy).sqrt();
    // Constant input has no defined correlation; report it as uncorrelated
    let correlation = if denom > 0.0 { cov / denom } else { 0.0 };

    Some(TestResult {
        name: "serial_correlation",
        passed: correlation.abs() < THRESHOLD,
        statistic: correlation,
        threshold: THRESHOLD,
        details: format!("lag=1 samples={}", x.len()),
    })
}
