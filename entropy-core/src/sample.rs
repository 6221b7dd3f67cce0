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

//! Raw entropy samples and bit packing helpers
//!
//! A [`RawSample`] is the unit handed from a source to the debiaser or formatter. It is
//! ephemeral: consumed immediately, never persisted.

use crate::technique::TechniqueId;
use bytes::Bytes;
use std::time::Instant;

/// One draw from an entropy source
#[derive(Debug, Clone)]
pub struct RawSample {
    /// Producing technique
    pub technique: TechniqueId,
    /// Packed payload, MSB-first within each byte
    pub data: Bytes,
    /// Number of meaningful bits in `data` (the tail of the last byte may be padding)
    pub bit_len: usize,
    /// Monotonic capture time
    pub timestamp: Instant,
}

impl RawSample {
    /// Sample made of whole bytes
    pub fn from_bytes(technique: TechniqueId, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let bit_len = data.len() * 8;
        Self {
            technique,
            data,
            bit_len,
            timestamp: Instant::now(),
        }
    }

    /// Sample made of individual bits
    pub fn from_bits(technique: TechniqueId, bits: &[bool]) -> Self {
        Self {
            technique,
            data: Bytes::from(pack_bits(bits)),
            bit_len: bits.len(),
            timestamp: Instant::now(),
        }
    }

    /// Sample over already packed bits; `bit_len` may leave padding in the last byte
    pub fn from_packed(technique: TechniqueId, data: impl Into<Bytes>, bit_len: usize) -> Self {
        let data = data.into();
        debug_assert!(bit_len <= data.len() * 8);
        Self {
            technique,
            data,
            bit_len,
            timestamp: Instant::now(),
        }
    }

    /// Unpack the meaningful bits
    pub fn bits(&self) -> Vec<bool> {
        let mut bits = unpack_bits(&self.data);
        bits.truncate(self.bit_len);
        bits
    }

    pub fn len_bytes(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bit_len == 0
    }

    pub fn into_bytes(self) -> Bytes {
        self.data
    }
}

/// Pack bits MSB-first; a partial final byte is zero-padded
pub fn pack_bits(bits: &[bool]) -> Vec<u8> {
    bits.chunks(8)
        .map(|chunk| {
            chunk
                .iter()
                .enumerate()
                .fold(0u8, |byte, (i, &bit)| byte | ((bit as u8) << (7 - i)))
        })
        .collect()
}

/// Unpack bytes MSB-first
pub fn unpack_bits(data: &[u8]) -> Vec<bool> {
    let mut bits = Vec::with_capacity(data.len() * 8);
    for byte in data {
        for i in (0..8).rev() {
            bits.push((byte >> i) & 1 == 1);
        }
    }
    bits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_msb_first() {
        let bits = [true, false, false, false, false, false, false, true];
        assert_eq!(pack_bits(&bits), vec![0x81]);
        assert_eq!(pack_bits(&[true, true]), vec![0xC0]);
    }

    #[test]
    fn test_sample_bits_truncated() {
        let sample = RawSample::from_bits(TechniqueId::Fpga, &[true, false, true]);
        assert_eq!(sample.len_bytes(), 1);
        assert_eq!(sample.bits(), vec![true, false, true]);
    }

    #[test]
    fn test_packed_sample_ignores_padding() {
        let sample = RawSample::from_packed(TechniqueId::Fpga, vec![0b1010_1111], 4);
        assert_eq!(sample.bits(), vec![true, false, true, false]);
    }

    #[test]
    fn test_sample_from_bytes() {
        let sample = RawSample::from_bytes(TechniqueId::Cryptographic, vec![0xFF, 0x00]);
        assert_eq!(sample.bit_len, 16);
        assert_eq!(sample.bits().iter().filter(|&&b| b).count(), 8);
    }
}
