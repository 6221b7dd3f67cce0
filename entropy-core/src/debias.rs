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

//! Von Neumann debiasing
//!
//! Bits are read in non-overlapping pairs: `(0,1)` emits `0`, `(1,0)` emits `1`, equal
//! pairs are dropped. Expected yield is a quarter of the input for an unbiased source
//! and lower for a biased one, so extraction runs against a bounded raw-bit budget.
//!
//! Packed input is debiased a byte at a time through a 256-entry table holding the output
//! bits and their count for each raw byte.

use crate::{sample::RawSample, Error, Result};
use tracing::{debug, warn};

/// Smallest raw chunk pulled per refill
const MIN_CHUNK_BITS: usize = 256;

/// `(output bits, output count)` for every raw byte, four MSB-first pairs per byte
static PAIR_TABLE: [(u8, u8); 256] = build_pair_table();

const fn build_pair_table() -> [(u8, u8); 256] {
    let mut table = [(0u8, 0u8); 256];
    let mut byte = 0usize;
    while byte < 256 {
        let mut bits = 0u8;
        let mut count = 0u8;
        let mut pair_index = 0u32;
        while pair_index < 4 {
            match (byte >> (6 - 2 * pair_index)) & 0b11 {
                0b10 => {
                    bits = (bits << 1) | 1;
                    count += 1;
                }
                0b01 => {
                    bits <<= 1;
                    count += 1;
                }
                _ => {}
            }
            pair_index += 1;
        }
        table[byte] = (bits, count);
        byte += 1;
    }
    table
}

/// MSB-first bit sink for debiased output
#[derive(Debug, Default)]
struct PackedBits {
    bytes: Vec<u8>,
    acc: u16,
    pending: u32,
}

impl PackedBits {
    fn with_capacity(bytes: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(bytes),
            ..Self::default()
        }
    }

    /// Append the low `count` (at most 4) bits of `bits`
    #[inline]
    fn push(&mut self, bits: u8, count: u8) {
        if count == 0 {
            return;
        }
        self.acc = (self.acc << count) | bits as u16;
        self.pending += count as u32;
        if self.pending >= 8 {
            self.pending -= 8;
            self.bytes.push((self.acc >> self.pending) as u8);
            self.acc &= (1 << self.pending) - 1;
        }
    }

    fn bit_len(&self) -> usize {
        self.bytes.len() * 8 + self.pending as usize
    }

    /// Debias `bit_len` packed bits from `data` into the sink
    fn feed(&mut self, data: &[u8], bit_len: usize) {
        let bit_len = bit_len.min(data.len() * 8);
        let full = bit_len / 8;
        for &byte in &data[..full] {
            let (bits, count) = PAIR_TABLE[byte as usize];
            self.push(bits, count);
        }

        let tail_pairs = (bit_len % 8) / 2;
        if tail_pairs > 0 {
            let byte = data[full];
            for pair_index in 0..tail_pairs {
                match (byte >> (6 - 2 * pair_index)) & 0b11 {
                    0b10 => self.push(1, 1),
                    0b01 => self.push(0, 1),
                    _ => {}
                }
            }
        }
    }

    fn into_packed(mut self) -> (Vec<u8>, usize) {
        let bit_len = self.bit_len();
        if self.pending > 0 {
            self.bytes.push((self.acc << (8 - self.pending)) as u8);
        }
        (self.bytes, bit_len)
    }
}

/// Von Neumann extractor with a raw-bit budget
#[derive(Debug, Clone, Copy)]
pub struct Debiaser {
    /// Raw bits allowed per requested output bit
    budget_factor: usize,
}

impl Default for Debiaser {
    fn default() -> Self {
        Self { budget_factor: 64 }
    }
}

impl Debiaser {
    pub fn new(budget_factor: usize) -> Self {
        Self {
            budget_factor: budget_factor.max(1),
        }
    }

    pub fn budget_factor(&self) -> usize {
        self.budget_factor
    }

    /// Debias a finite bit sequence; a trailing unpaired bit is ignored
    pub fn debias(bits: &[bool]) -> Vec<bool> {
        bits.chunks_exact(2)
            .filter_map(|pair| match (pair[0], pair[1]) {
                (false, true) => Some(false),
                (true, false) => Some(true),
                _ => None,
            })
            .collect()
    }

    /// Debias `bit_len` packed MSB-first bits; returns the packed output and its bit count
    pub fn debias_packed(data: &[u8], bit_len: usize) -> (Vec<u8>, usize) {
        let mut sink = PackedBits::with_capacity(data.len() / 4 + 1);
        sink.feed(data, bit_len);
        sink.into_packed()
    }

    /// Produce exactly `requested_bytes` debiased bytes, pulling raw samples from `pull`
    ///
    /// `pull(n)` must return a sample of up to `n` fresh raw bits. Fails with
    /// [`Error::DebiasStarvation`] once more than `budget_factor` raw bits per requested
    /// bit have been consumed, and with [`Error::SourceUnavailable`] if the source dries up.
    pub fn extract<F>(&self, requested_bytes: usize, mut pull: F) -> Result<Vec<u8>>
    where
        F: FnMut(usize) -> Result<RawSample>,
    {
        if requested_bytes == 0 {
            return Ok(Vec::new());
        }

        let requested_bits = requested_bytes.saturating_mul(8);
        let budget = requested_bits.saturating_mul(self.budget_factor);
        let mut sink = PackedBits::with_capacity(requested_bytes + 1);
        let mut consumed = 0usize;

        while sink.bit_len() < requested_bits {
            if consumed >= budget {
                warn!(
                    requested_bits,
                    produced = sink.bit_len(),
                    consumed,
                    "Debias budget exhausted"
                );
                return Err(Error::DebiasStarvation {
                    requested_bits,
                    consumed_bits: consumed,
                });
            }

            let missing = requested_bits - sink.bit_len();
            // Expected yield is 1/4; ask for a little more to avoid extra round trips
            let chunk = (missing * 5).max(MIN_CHUNK_BITS).min(budget - consumed);
            let chunk = if chunk >= 8 { chunk & !7 } else { 2 };

            let raw = pull(chunk)?;
            if raw.is_empty() {
                return Err(Error::SourceUnavailable(
                    "raw bit source returned no data".to_string(),
                ));
            }
            consumed += raw.bit_len;
            sink.feed(&raw.data, raw.bit_len);
        }

        let (mut bytes, _) = sink.into_packed();
        bytes.truncate(requested_bytes);
        debug!(requested_bits, consumed, "Debiased raw bits");
        Ok(bytes)
    }
}
