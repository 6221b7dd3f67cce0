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

//! Shaping entropy into typed values
//!
//! Formatting pulls bits from an [`EntropyReader`]. Readers over local sources refill on
//! demand; a reader over an externally fetched sample is fixed and fails with
//! [`Error::SourceUnavailable`] once drained. Ranged values use reject-and-resample so every
//! outcome is exactly equally likely.

use crate::{technique::TechniqueId, Error, Result};
use serde::{Deserialize, Serialize};
use sha2::Digest;
use std::str::FromStr;

/// Rejection-sampling draws allowed per ranged value
pub const MAX_RESAMPLE_DRAWS: u32 = 64;

/// Key material hashed per digest
pub const HASH_KEY_BYTES: usize = 32;

/// Mantissa-sized integer used for floats in [0, 1)
const FLOAT_BITS: u32 = 53;

/// Smallest refill requested from a local source
const MIN_REFILL_BYTES: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HashAlgorithm {
    #[serde(rename = "sha256")]
    Sha256,
    #[serde(rename = "sha512")]
    Sha512,
    #[serde(rename = "sha3_256")]
    Sha3_256,
    #[serde(rename = "blake2b")]
    Blake2b,
}

impl HashAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
            Self::Sha3_256 => "sha3_256",
            Self::Blake2b => "blake2b",
        }
    }

    /// Lowercase hex digest of `data`
    pub fn digest_hex(&self, data: &[u8]) -> String {
        match self {
            Self::Sha256 => hex::encode(sha2::Sha256::digest(data)),
            Self::Sha512 => hex::encode(sha2::Sha512::digest(data)),
            Self::Sha3_256 => hex::encode(sha3::Sha3_256::digest(data)),
            Self::Blake2b => hex::encode(blake2::Blake2b512::digest(data)),
        }
    }
}

impl FromStr for HashAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "sha256" => Ok(Self::Sha256),
            "sha512" => Ok(Self::Sha512),
            "sha3_256" | "sha3-256" => Ok(Self::Sha3_256),
            "blake2b" => Ok(Self::Blake2b),
            other => Err(Error::InvalidRequest(format!(
                "Unsupported hash algorithm: {}",
                other
            ))),
        }
    }
}

/// Requested output shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputKind {
    Boolean,
    Hash { algorithm: HashAlgorithm },
    Integer { min: i64, max: i64 },
    Float,
    Category { options: Vec<String> },
}

impl OutputKind {
    /// Name used in result metadata
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Hash { .. } => "hash",
            Self::Integer { .. } | Self::Float => "number",
            Self::Category { .. } => "custom",
        }
    }

    pub fn number_type(&self) -> Option<&'static str> {
        match self {
            Self::Integer { .. } => Some("integer"),
            Self::Float => Some("float"),
            _ => None,
        }
    }
}

/// A validated generation request
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub technique: TechniqueId,
    pub kind: OutputKind,
    pub count: usize,
}

impl GenerationRequest {
    pub fn new(technique: TechniqueId, kind: OutputKind, count: usize) -> Self {
        Self {
            technique,
            kind,
            count,
        }
    }

    /// Normalize category options and check every constraint; consumes no entropy
    pub fn validated(mut self, max_count: usize) -> Result<Self> {
        if self.count == 0 {
            return Err(Error::InvalidRequest("count must be at least 1".to_string()));
        }
        if self.count > max_count {
            return Err(Error::InvalidRequest(format!(
                "count must not exceed {}",
                max_count
            )));
        }

        match &mut self.kind {
            OutputKind::Integer { min, max } if *min > *max => {
                return Err(Error::InvalidRequest(format!(
                    "min ({}) must not exceed max ({})",
                    min, max
                )));
            }
            OutputKind::Category { options } => {
                let cleaned: Vec<String> = options
                    .iter()
                    .map(|o| o.trim())
                    .filter(|o| !o.is_empty())
                    .map(str::to_string)
                    .collect();
                if cleaned.is_empty() {
                    return Err(Error::InvalidRequest(
                        "at least one non-empty option is required".to_string(),
                    ));
                }
                *options = cleaned;
            }
            _ => {}
        }

        Ok(self)
    }

    /// Bytes a refilling reader should start with (expected consumption)
    pub fn expected_entropy_bytes(&self) -> usize {
        let bits = match &self.kind {
            OutputKind::Boolean => self.count,
            OutputKind::Hash { .. } => self.count * HASH_KEY_BYTES * 8,
            OutputKind::Integer { min, max } => {
                self.count * bits_for_span(span_of(*min, *max)) as usize
            }
            OutputKind::Float => self.count * FLOAT_BITS as usize,
            OutputKind::Category { options } => {
                self.count * bits_for_span(options.len().saturating_sub(1) as u64) as usize
            }
        };
        bits.div_ceil(8).max(1)
    }

    /// Bytes a fixed reader needs so that ranged draws practically never run dry
    pub fn entropy_budget(&self) -> usize {
        let ranged_bits = |span: u64| {
            let bits = bits_for_span(span) as usize;
            // Acceptance is above 1/2 per draw, so 3n + 32 draws leave a wide margin
            (3 * self.count + 32) * bits
        };
        let bits = match &self.kind {
            OutputKind::Integer { min, max } => ranged_bits(span_of(*min, *max)),
            OutputKind::Category { options } => {
                ranged_bits(options.len().saturating_sub(1) as u64)
            }
            _ => return self.expected_entropy_bytes(),
        };
        bits.div_ceil(8).max(1)
    }
}

/// One formatted value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutputValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

type Refill<'a> = Box<dyn FnMut(usize) -> Result<Vec<u8>> + 'a>;

/// MSB-first bit cursor over entropy bytes
pub struct EntropyReader<'a> {
    buf: Vec<u8>,
    bit_pos: usize,
    refill: Option<Refill<'a>>,
}

impl<'a> EntropyReader<'a> {
    /// Reader over a fixed sample
    pub fn fixed(data: Vec<u8>) -> Self {
        Self {
            buf: data,
            bit_pos: 0,
            refill: None,
        }
    }

    /// Reader that asks `refill(n)` for more bytes when drained
    pub fn refilling(
        initial: Vec<u8>,
        refill: impl FnMut(usize) -> Result<Vec<u8>> + 'a,
    ) -> Self {
        Self {
            buf: initial,
            bit_pos: 0,
            refill: Some(Box::new(refill)),
        }
    }

    fn available_bits(&self) -> usize {
        self.buf.len() * 8 - self.bit_pos
    }

    fn ensure(&mut self, bits: usize) -> Result<()> {
        while self.available_bits() < bits {
            let missing = (bits - self.available_bits()).div_ceil(8);
            let refill = self.refill.as_mut().ok_or_else(|| {
                Error::SourceUnavailable("entropy sample exhausted".to_string())
            })?;
            let more = refill(missing.max(MIN_REFILL_BYTES))?;
            if more.is_empty() {
                return Err(Error::SourceUnavailable(
                    "entropy source returned no data".to_string(),
                ));
            }
            self.buf.extend_from_slice(&more);
        }
        Ok(())
    }

    pub fn read_bit(&mut self) -> Result<bool> {
        Ok(self.read_bits(1)? == 1)
    }

    /// Next `k` bits as an unsigned integer (`k <= 64`)
    pub fn read_bits(&mut self, k: u32) -> Result<u64> {
        if k > 64 {
            return Err(Error::InvalidRequest(format!("cannot read {} bits at once", k)));
        }
        self.ensure(k as usize)?;

        let mut value = 0u64;
        for _ in 0..k {
            let byte = self.buf[self.bit_pos / 8];
            let bit = (byte >> (7 - self.bit_pos % 8)) & 1;
            value = (value << 1) | bit as u64;
            self.bit_pos += 1;
        }
        Ok(value)
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        self.ensure(n * 8)?;
        if self.bit_pos % 8 == 0 {
            let start = self.bit_pos / 8;
            self.bit_pos += n * 8;
            return Ok(self.buf[start..start + n].to_vec());
        }
        (0..n).map(|_| self.read_bits(8).map(|b| b as u8)).collect()
    }

    /// Bytes touched so far (a partially read byte counts)
    pub fn consumed_bytes(&self) -> usize {
        self.bit_pos.div_ceil(8)
    }

    /// The consumed prefix of the stream
    pub fn into_consumed(mut self) -> Vec<u8> {
        let n = self.consumed_bytes();
        self.buf.truncate(n);
        self.buf
    }
}

/// Width needed to represent every value in `0..=span`
pub fn bits_for_span(span: u64) -> u32 {
    64 - span.leading_zeros()
}

fn span_of(min: i64, max: i64) -> u64 {
    (max as i128 - min as i128) as u64
}

/// Uniform value in `0..=span` by reject-and-resample
pub fn uniform_up_to(span: u64, reader: &mut EntropyReader<'_>) -> Result<u64> {
    if span == 0 {
        return Ok(0);
    }
    let bits = bits_for_span(span);
    for _ in 0..MAX_RESAMPLE_DRAWS {
        let candidate = reader.read_bits(bits)?;
        if candidate <= span {
            return Ok(candidate);
        }
    }
    Err(Error::SourceUnavailable(format!(
        "no in-range value after {} draws; entropy source looks stuck",
        MAX_RESAMPLE_DRAWS
    )))
}

pub fn integer_in_range(min: i64, max: i64, reader: &mut EntropyReader<'_>) -> Result<i64> {
    let offset = uniform_up_to(span_of(min, max), reader)?;
    Ok((min as i128 + offset as i128) as i64)
}

/// Float in [0, 1) from a 53-bit integer
pub fn unit_float(reader: &mut EntropyReader<'_>) -> Result<f64> {
    let v = reader.read_bits(FLOAT_BITS)?;
    Ok(v as f64 / (1u64 << FLOAT_BITS) as f64)
}

/// Produce exactly `count` values of `kind`
pub fn format(
    kind: &OutputKind,
    count: usize,
    reader: &mut EntropyReader<'_>,
) -> Result<Vec<OutputValue>> {
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        let value = match kind {
            OutputKind::Boolean => OutputValue::Bool(reader.read_bit()?),
            OutputKind::Hash { algorithm } => {
                let key = reader.read_bytes(HASH_KEY_BYTES)?;
                OutputValue::Text(algorithm.digest_hex(&key))
            }
            OutputKind::Integer { min, max } => {
                OutputValue::Integer(integer_in_range(*min, *max, reader)?)
            }
            OutputKind::Float => OutputValue::Float(unit_float(reader)?),
            OutputKind::Category { options } => {
                let span = options.len().saturating_sub(1) as u64;
                let index = uniform_up_to(span, reader)? as usize;
                OutputValue::Text(options[index].clone())
            }
        };
        values.push(value);
    }
    Ok(values)
}
