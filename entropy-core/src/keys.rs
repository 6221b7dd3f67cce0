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

//! Key material derived from generated entropy
//!
//! Symmetric keys are taken straight from the entropy stream when enough bytes are
//! available and stretched with HKDF-SHA256 otherwise. RSA seed material is always
//! expanded through HKDF from disjoint slices of the input.

use crate::{analysis::QualityMetrics, Error, Result};
use hkdf::Hkdf;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::str::FromStr;

const HKDF_SALT: &[u8] = b"quantum-rng-salt";
const HKDF_INFO: &[u8] = b"quantum-key-expansion";
const SHA256_LEN: usize = 32;

const RSA_PRIME_SEED_BYTES: usize = 64;
const RSA_AUX_BYTES: usize = 32;

/// Entropy consumed by one RSA seed derivation
pub const RSA_SEED_ENTROPY_BYTES: usize = 2 * RSA_PRIME_SEED_BYTES + RSA_AUX_BYTES;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyType {
    Symmetric,
    Aes,
    RsaSeed,
}

impl FromStr for KeyType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "symmetric" => Ok(Self::Symmetric),
            "aes" => Ok(Self::Aes),
            "rsa_seed" | "rsa" => Ok(Self::RsaSeed),
            other => Err(Error::InvalidRequest(format!("Invalid key type: {}", other))),
        }
    }
}

impl KeyType {
    /// Entropy bytes to draw for a key of `key_size_bits`, after validating the size
    pub fn entropy_bytes(&self, key_size_bits: usize) -> Result<usize> {
        match self {
            Self::Symmetric => {
                if !(128..=4096).contains(&key_size_bits) || key_size_bits % 8 != 0 {
                    return Err(Error::InvalidRequest(
                        "key_size_bits must be a multiple of 8 between 128 and 4096".to_string(),
                    ));
                }
                Ok(key_size_bits / 8)
            }
            Self::Aes => {
                if !matches!(key_size_bits, 128 | 192 | 256) {
                    return Err(Error::InvalidRequest(
                        "AES keys must be 128, 192 or 256 bits".to_string(),
                    ));
                }
                Ok(key_size_bits / 8)
            }
            Self::RsaSeed => Ok(RSA_SEED_ENTROPY_BYTES),
        }
    }
}

/// Seed material for an external RSA key generator
#[derive(Debug, Clone)]
pub struct RsaSeed {
    pub seed_p: Vec<u8>,
    pub seed_q: Vec<u8>,
    pub auxiliary_entropy: Vec<u8>,
    pub entropy_quality: QualityMetrics,
    pub algorithm_recommendation: &'static str,
}

#[derive(Debug, Clone)]
pub enum DerivedKey {
    Symmetric(Vec<u8>),
    RsaSeed(RsaSeed),
}

/// Derive key material of `key_type` from `entropy`
pub fn derive_key(key_type: KeyType, key_size_bits: usize, entropy: &[u8]) -> Result<DerivedKey> {
    match key_type {
        KeyType::Symmetric | KeyType::Aes => {
            let needed = key_type.entropy_bytes(key_size_bits)?;
            symmetric_key(entropy, needed).map(DerivedKey::Symmetric)
        }
        KeyType::RsaSeed => rsa_seed(entropy).map(DerivedKey::RsaSeed),
    }
}

/// Key of `key_bytes` bytes: a prefix of `entropy`, or its HKDF expansion if too short
pub fn symmetric_key(entropy: &[u8], key_bytes: usize) -> Result<Vec<u8>> {
    if entropy.is_empty() {
        return Err(Error::InvalidRequest("no entropy supplied".to_string()));
    }
    if entropy.len() >= key_bytes {
        Ok(entropy[..key_bytes].to_vec())
    } else {
        expand_entropy(entropy, key_bytes)
    }
}

pub fn rsa_seed(entropy: &[u8]) -> Result<RsaSeed> {
    if entropy.len() < RSA_SEED_ENTROPY_BYTES {
        return Err(Error::InvalidRequest(format!(
            "RSA seed needs {} entropy bytes, got {}",
            RSA_SEED_ENTROPY_BYTES,
            entropy.len()
        )));
    }

    let (p, rest) = entropy.split_at(RSA_PRIME_SEED_BYTES);
    let (q, aux) = rest.split_at(RSA_PRIME_SEED_BYTES);

    Ok(RsaSeed {
        seed_p: expand_entropy(p, RSA_PRIME_SEED_BYTES)?,
        seed_q: expand_entropy(q, RSA_PRIME_SEED_BYTES)?,
        auxiliary_entropy: expand_entropy(aux, RSA_AUX_BYTES)?,
        entropy_quality: QualityMetrics::measure(entropy),
        algorithm_recommendation: if entropy.len() >= 128 {
            "RSA-4096"
        } else {
            "RSA-2048"
        },
    })
}

/// HKDF-SHA256 (RFC 5869) extract-then-expand of `seed` into `output_len` bytes
pub fn expand_entropy(seed: &[u8], output_len: usize) -> Result<Vec<u8>> {
    hkdf_sha256(HKDF_SALT, seed, HKDF_INFO, output_len)
}

fn hkdf_sha256(salt: &[u8], ikm: &[u8], info: &[u8], output_len: usize) -> Result<Vec<u8>> {
    let hkdf = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut output = vec![0u8; output_len];
    hkdf.expand(info, &mut output).map_err(|_| {
        Error::InvalidRequest(format!(
            "cannot expand to {} bytes (max {})",
            output_len,
            255 * SHA256_LEN
        ))
    })?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_sizes() {
        assert_eq!(KeyType::Symmetric.entropy_bytes(256).unwrap(), 32);
        assert!(KeyType::Symmetric.entropy_bytes(100).is_err());
        assert!(KeyType::Symmetric.entropy_bytes(130).is_err());
        assert!(KeyType::Symmetric.entropy_bytes(8192).is_err());
        assert_eq!(KeyType::Aes.entropy_bytes(192).unwrap(), 24);
        assert!(KeyType::Aes.entropy_bytes(512).is_err());
        assert_eq!(KeyType::RsaSeed.entropy_bytes(0).unwrap(), 160);
    }

    #[test]
    fn test_symmetric_key_uses_prefix() {
        let entropy: Vec<u8> = (0..64).collect();
        let key = symmetric_key(&entropy, 32).unwrap();
        assert_eq!(key, entropy[..32].to_vec());
    }

    #[test]
    fn test_symmetric_key_expands_short_entropy() {
        let key = symmetric_key(&[1, 2, 3, 4], 48).unwrap();
        assert_eq!(key.len(), 48);
        assert_eq!(key, expand_entropy(&[1, 2, 3, 4], 48).unwrap());
        assert!(symmetric_key(&[], 16).is_err());
    }

    #[test]
    fn test_expansion_is_deterministic_and_prefix_stable() {
        let a = expand_entropy(b"seed", 100).unwrap();
        let b = expand_entropy(b"seed", 40).unwrap();
        assert_eq!(a.len(), 100);
        assert_eq!(&a[..40], &b[..]);
        assert_ne!(expand_entropy(b"other", 40).unwrap(), b);
        assert!(expand_entropy(b"seed", 255 * 32 + 1).is_err());
    }

    #[test]
    fn test_hkdf_matches_rfc5869_case_1() {
        let ikm = [0x0b; 22];
        let salt: Vec<u8> = (0x00..=0x0c).collect();
        let info: Vec<u8> = (0xf0..=0xf9).collect();
        let okm = hkdf_sha256(&salt, &ikm, &info, 42).unwrap();
        assert_eq!(
            hex::encode(okm),
            "3cb25f25faacd57a90434f64d0362f2a2d2d0a90cf1a5a4c5db02d56ecc4c5bf34007208d5b887185865"
        );
    }

    #[test]
    fn test_rsa_seed_parts_are_independent() {
        let entropy: Vec<u8> = (0..160).map(|i| (i * 7) as u8).collect();
        let seed = rsa_seed(&entropy).unwrap();
        assert_eq!(seed.seed_p.len(), 64);
        assert_eq!(seed.seed_q.len(), 64);
        assert_eq!(seed.auxiliary_entropy.len(), 32);
        assert_ne!(seed.seed_p, seed.seed_q);
        assert_eq!(seed.algorithm_recommendation, "RSA-4096");

        assert!(rsa_seed(&entropy[..100]).is_err());
    }

    #[test]
    fn test_parse_key_type() {
        assert_eq!("AES".parse::<KeyType>().unwrap(), KeyType::Aes);
        assert_eq!("rsa_seed".parse::<KeyType>().unwrap(), KeyType::RsaSeed);
        assert!("dsa".parse::<KeyType>().is_err());
    }
}
