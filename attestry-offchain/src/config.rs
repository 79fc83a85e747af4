//! Verifier configuration.

use crate::eip712::DOMAIN_NAME;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    /// Protocol name bound into the domain separator
    pub domain_name: String,
    /// How far past the evaluation time an issue timestamp may sit (seconds)
    pub max_clock_skew_secs: u64,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            domain_name: DOMAIN_NAME.to_string(),
            max_clock_skew_secs: 0,
        }
    }
}

impl VerifierConfig {
    /// Parse a JSON document; omitted fields keep their defaults.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
