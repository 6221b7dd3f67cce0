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

//! Generation technique identifiers and their live status

use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Entropy generation technique
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TechniqueId {
    /// Simulated FPGA noise source followed by von Neumann debiasing
    Fpga,
    /// External quantum service (ANU-compatible), one call per cooldown window
    Anu,
    /// FPGA output with opportunistic external validation
    Hybrid,
    /// Operating system CSPRNG
    Cryptographic,
}

impl TechniqueId {
    pub const ALL: [TechniqueId; 4] = [
        TechniqueId::Fpga,
        TechniqueId::Anu,
        TechniqueId::Hybrid,
        TechniqueId::Cryptographic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fpga => "fpga",
            Self::Anu => "anu",
            Self::Hybrid => "hybrid",
            Self::Cryptographic => "cryptographic",
        }
    }

    /// Human-readable technique name
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Fpga => "FPGA Quantum Simulation",
            Self::Anu => "ANU Quantum API",
            Self::Hybrid => "Hybrid (FPGA + ANU Validation)",
            Self::Cryptographic => "Cryptographically Secure",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Fpga => "High-speed quantum noise simulation with thermal/shot noise",
            Self::Anu => "Real quantum random numbers (LIMITED: 1 request/minute)",
            Self::Hybrid => "FPGA generation with ANU quantum validation",
            Self::Cryptographic => "OS-level cryptographic randomness",
        }
    }

    /// Label attached to generation metadata
    pub fn source_label(&self) -> &'static str {
        match self {
            Self::Fpga => "FPGA Quantum Simulator",
            Self::Anu => "ANU Quantum API",
            Self::Hybrid => "FPGA + ANU Validation",
            Self::Cryptographic => "OS Cryptographic",
        }
    }

    /// Whether the technique is subject to the external cooldown
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::Anu)
    }
}

impl Default for TechniqueId {
    fn default() -> Self {
        Self::Fpga
    }
}

impl fmt::Display for TechniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TechniqueId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fpga" => Ok(Self::Fpga),
            "anu" => Ok(Self::Anu),
            "hybrid" => Ok(Self::Hybrid),
            "cryptographic" | "crypto" => Ok(Self::Cryptographic),
            other => Err(Error::UnknownTechnique(other.to_string())),
        }
    }
}

/// Live technique status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TechniqueStatus {
    Operational,
    Available,
    Cooldown,
    Error,
}

impl TechniqueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Operational => "operational",
            Self::Available => "available",
            Self::Cooldown => "cooldown",
            Self::Error => "error",
        }
    }
}

/// Point-in-time view of a technique, derived lazily on read
#[derive(Debug, Clone, Serialize)]
pub struct TechniqueState {
    pub id: TechniqueId,
    pub name: &'static str,
    pub description: &'static str,
    pub status: TechniqueStatus,
    /// Absolute end of the current cooldown, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_until: Option<chrono::DateTime<chrono::Utc>>,
    /// Whole seconds left before the technique becomes available again
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_seconds: Option<u64>,
    /// Last failure reason while in `error`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl TechniqueState {
    pub fn operational(id: TechniqueId) -> Self {
        Self {
            id,
            name: id.display_name(),
            description: id.description(),
            status: TechniqueStatus::Operational,
            cooldown_until: None,
            cooldown_seconds: None,
            last_error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_technique() {
        assert_eq!("fpga".parse::<TechniqueId>().unwrap(), TechniqueId::Fpga);
        assert_eq!("ANU".parse::<TechniqueId>().unwrap(), TechniqueId::Anu);
        assert_eq!(
            "crypto".parse::<TechniqueId>().unwrap(),
            TechniqueId::Cryptographic
        );
        assert!(matches!(
            "quantum-foam".parse::<TechniqueId>(),
            Err(Error::UnknownTechnique(_))
        ));
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&TechniqueId::Cryptographic).unwrap();
        assert_eq!(json, "\"cryptographic\"");
        let status = serde_json::to_string(&TechniqueStatus::Cooldown).unwrap();
        assert_eq!(status, "\"cooldown\"");
    }

    #[test]
    fn test_only_anu_is_rate_limited() {
        let limited: Vec<_> = TechniqueId::ALL
            .iter()
            .filter(|t| t.is_rate_limited())
            .collect();
        assert_eq!(limited, vec![&TechniqueId::Anu]);
    }
}
