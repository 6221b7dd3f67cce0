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

//! JSON wire types shared by the gateway and its clients
//!
//! Request bodies default every optional field the same way the dashboard expects, and
//! convert into core requests through `into_request`. Validation happens afterwards in the
//! core, so a wire type never rejects a body on its own beyond JSON shape.

use crate::{
    error::ErrorKind,
    formatter::{GenerationRequest, HashAlgorithm, OutputKind},
    keys::KeyType,
    technique::{TechniqueId, TechniqueState, TechniqueStatus},
    Error,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Encoding applied to raw bytes and symmetric keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodingFormat {
    #[default]
    Hex,
    Base64,
    /// JSON array of byte values
    #[serde(alias = "raw")]
    Array,
}

/// Bytes rendered per [`EncodingFormat`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum EncodedData {
    Text(String),
    Bytes(Vec<u8>),
}

impl EncodingFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hex => "hex",
            Self::Base64 => "base64",
            Self::Array => "array",
        }
    }

    pub fn encode(&self, data: &[u8]) -> EncodedData {
        match self {
            Self::Hex => EncodedData::Text(hex::encode(data)),
            Self::Base64 => EncodedData::Text(STANDARD.encode(data)),
            Self::Array => EncodedData::Bytes(data.to_vec()),
        }
    }
}

/// Error body returned for every failed call
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error_kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
}

impl From<&Error> for ErrorBody {
    fn from(err: &Error) -> Self {
        Self {
            error_kind: err.kind(),
            message: err.to_string(),
            retry_after_seconds: err.retry_after_seconds(),
        }
    }
}

/// One entry of the technique listing
#[derive(Debug, Clone, Serialize)]
pub struct TechniqueInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub status: TechniqueStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_until: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub default: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TechniqueListing {
    pub techniques: BTreeMap<TechniqueId, TechniqueInfo>,
    pub default_technique: TechniqueId,
}

impl TechniqueListing {
    pub fn new(states: BTreeMap<TechniqueId, TechniqueState>, default_technique: TechniqueId) -> Self {
        let techniques = states
            .into_iter()
            .map(|(id, state)| {
                (
                    id,
                    TechniqueInfo {
                        name: state.name,
                        description: state.description,
                        status: state.status,
                        cooldown_seconds: state.cooldown_seconds,
                        cooldown_until: state.cooldown_until,
                        last_error: state.last_error,
                        default: id == default_technique,
                    },
                )
            })
            .collect();
        Self {
            techniques,
            default_technique,
        }
    }
}

fn default_count() -> usize {
    1
}

fn default_min() -> i64 {
    1
}

fn default_max() -> i64 {
    100
}

fn default_algorithm() -> HashAlgorithm {
    HashAlgorithm::Sha256
}

#[derive(Debug, Clone, Deserialize)]
pub struct BooleanRequest {
    #[serde(default = "default_count")]
    pub count: usize,
    #[serde(default)]
    pub technique: TechniqueId,
}

impl BooleanRequest {
    pub fn into_request(self) -> GenerationRequest {
        GenerationRequest::new(self.technique, OutputKind::Boolean, self.count)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HashRequest {
    #[serde(default = "default_count")]
    pub count: usize,
    #[serde(default = "default_algorithm")]
    pub algorithm: HashAlgorithm,
    #[serde(default)]
    pub technique: TechniqueId,
}

impl HashRequest {
    pub fn into_request(self) -> GenerationRequest {
        GenerationRequest::new(
            self.technique,
            OutputKind::Hash {
                algorithm: self.algorithm,
            },
            self.count,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumberType {
    #[default]
    Integer,
    Float,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NumberRequest {
    #[serde(default = "default_count")]
    pub count: usize,
    #[serde(default, rename = "type")]
    pub number_type: NumberType,
    #[serde(default = "default_min")]
    pub min: i64,
    #[serde(default = "default_max")]
    pub max: i64,
    #[serde(default)]
    pub technique: TechniqueId,
}

impl NumberRequest {
    pub fn into_request(self) -> GenerationRequest {
        let kind = match self.number_type {
            NumberType::Integer => OutputKind::Integer {
                min: self.min,
                max: self.max,
            },
            NumberType::Float => OutputKind::Float,
        };
        GenerationRequest::new(self.technique, kind, self.count)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustomRequest {
    #[serde(default = "default_count")]
    pub count: usize,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub technique: TechniqueId,
}

impl CustomRequest {
    pub fn into_request(self) -> GenerationRequest {
        GenerationRequest::new(
            self.technique,
            OutputKind::Category {
                options: self.options,
            },
            self.count,
        )
    }
}

fn default_random_size() -> usize {
    32
}

/// Body of `POST /api/random`
#[derive(Debug, Clone, Deserialize)]
pub struct RandomRequest {
    #[serde(default = "default_random_size")]
    pub size_bytes: usize,
    #[serde(default, alias = "source")]
    pub technique: TechniqueId,
    #[serde(default)]
    pub format: EncodingFormat,
}

#[derive(Debug, Clone, Serialize)]
pub struct RandomMetadata {
    pub size_bytes: usize,
    pub technique: TechniqueId,
    pub source: &'static str,
    pub format: EncodingFormat,
    pub generation_time_ms: f64,
    pub throughput_mbps: f64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<crate::validator::ValidationOutcome>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RandomResponse {
    pub data: EncodedData,
    pub metadata: RandomMetadata,
}

fn default_key_bits() -> usize {
    256
}

fn default_key_type() -> KeyType {
    KeyType::Symmetric
}

/// Body of `POST /api/keys`
#[derive(Debug, Clone, Deserialize)]
pub struct KeyRequest {
    #[serde(default = "default_key_bits")]
    pub key_size_bits: usize,
    #[serde(default = "default_key_type", rename = "type")]
    pub key_type: KeyType,
    #[serde(default)]
    pub format: EncodingFormat,
    #[serde(default)]
    pub technique: TechniqueId,
}

/// Encoded RSA seed material
#[derive(Debug, Clone, Serialize)]
pub struct RsaSeedBody {
    pub seed_p: EncodedData,
    pub seed_q: EncodedData,
    pub auxiliary_entropy: EncodedData,
    pub entropy_quality: crate::analysis::QualityMetrics,
    pub algorithm_recommendation: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum KeyBody {
    Encoded(EncodedData),
    RsaSeed(RsaSeedBody),
}

impl KeyBody {
    pub fn encode(key: &crate::keys::DerivedKey, format: EncodingFormat) -> Self {
        match key {
            crate::keys::DerivedKey::Symmetric(bytes) => Self::Encoded(format.encode(bytes)),
            crate::keys::DerivedKey::RsaSeed(seed) => Self::RsaSeed(RsaSeedBody {
                seed_p: format.encode(&seed.seed_p),
                seed_q: format.encode(&seed.seed_q),
                auxiliary_entropy: format.encode(&seed.auxiliary_entropy),
                entropy_quality: seed.entropy_quality,
                algorithm_recommendation: seed.algorithm_recommendation,
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct KeyMetadata {
    pub key_size_bits: usize,
    pub key_type: KeyType,
    pub format: EncodingFormat,
    pub generation_time_ms: f64,
    pub entropy_source: TechniqueId,
    pub entropy_bytes: usize,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct KeyResponse {
    pub key: KeyBody,
    pub metadata: KeyMetadata,
}

fn default_validate_size() -> usize {
    crate::MAX_REQUEST_SIZE
}

/// Body of `POST /api/validate`
#[derive(Debug, Clone, Deserialize)]
pub struct ValidateRequest {
    #[serde(default = "default_validate_size")]
    pub size_bytes: usize,
    #[serde(default)]
    pub technique: TechniqueId,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidateResponse {
    pub validation_results: crate::analysis::RandomnessReport,
    pub size_bytes: usize,
    pub technique: TechniqueId,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}
