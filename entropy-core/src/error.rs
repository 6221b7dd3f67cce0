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

//! Error types for the entropy engine
//!
//! Provides a unified error taxonomy using `thiserror` for ergonomic error handling.
//! Every variant maps onto a stable wire-level [`ErrorKind`] so the HTTP layer can
//! render `{error_kind, message, retry_after_seconds?}` without string matching.

use crate::technique::TechniqueId;
use serde::Serialize;

pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for entropy generation
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Caller supplied bad parameters
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Technique is cooling down after a recent external call
    #[error("Technique '{technique}' is rate limited, retry after {retry_after_seconds}s")]
    RateLimited {
        technique: TechniqueId,
        retry_after_seconds: u64,
    },

    /// Underlying noise or OS entropy source failed
    #[error("Entropy source unavailable: {0}")]
    SourceUnavailable(String),

    /// External validator returned a protocol or HTTP failure
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Network communication with the external validator failed
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Operation timed out
    #[error("Operation timed out")]
    Timeout,

    /// Von Neumann extraction exhausted its raw-bit budget
    #[error("Debiasing starved: produced too few bits for {requested_bits} requested after consuming {consumed_bits} raw bits")]
    DebiasStarvation {
        requested_bits: usize,
        consumed_bits: usize,
    },

    /// Technique identifier is not registered
    #[error("Unknown technique: {0}")]
    UnknownTechnique(String),

    /// Configuration validation failed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stable error classification exposed to API consumers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidRequest,
    RateLimited,
    SourceUnavailable,
    UpstreamError,
    DebiasStarvation,
    UnknownTechnique,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::RateLimited => "rate_limited",
            Self::SourceUnavailable => "source_unavailable",
            Self::UpstreamError => "upstream_error",
            Self::DebiasStarvation => "debias_starvation",
            Self::UnknownTechnique => "unknown_technique",
            Self::Internal => "internal",
        }
    }
}

impl Error {
    /// Wire-level classification of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Error::RateLimited { .. } => ErrorKind::RateLimited,
            Error::SourceUnavailable(_) => ErrorKind::SourceUnavailable,
            Error::Upstream(_) | Error::Network(_) | Error::Timeout => ErrorKind::UpstreamError,
            Error::DebiasStarvation { .. } => ErrorKind::DebiasStarvation,
            Error::UnknownTechnique(_) => ErrorKind::UnknownTechnique,
            Error::Config(_) | Error::Serialization(_) | Error::Io(_) => ErrorKind::Internal,
        }
    }

    /// Check if error is transient and worth retrying against the upstream service
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Network(_) | Error::Timeout)
    }

    /// Check if error is the caller's fault (never retried server-side)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::InvalidRequest | ErrorKind::DebiasStarvation | ErrorKind::UnknownTechnique
        )
    }

    /// Cooldown hint for rate-limited errors
    pub fn retry_after_seconds(&self) -> Option<u64> {
        match self {
            Error::RateLimited {
                retry_after_seconds,
                ..
            } => Some(*retry_after_seconds),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
