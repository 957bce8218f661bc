use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ScanError, ScanResult};

const BUILTIN_PROBES: &str = include_str!("../../data/probes.txt");
const BUILTIN_SIGNATURES: &str = include_str!("../../data/signatures.json");

/// Reference profile of one server software version: the checksum each
/// probe command is expected to produce.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Signature {
    pub label: String,
    pub expected: Vec<u64>,
}

/// Fixed probe-command list plus the signatures recorded against it.
///
/// The table is read-only. Scores for a scan live in a separate
/// `ScoringContext`, so one database can serve any number of hosts.
#[derive(Debug, Clone)]
pub struct SignatureDb {
    probes: Vec<String>,
    signatures: Vec<Signature>,
}

impl SignatureDb {
    pub fn new(probes: Vec<String>, signatures: Vec<Signature>) -> ScanResult<Self> {
        if probes.is_empty() {
            return Err(ScanError::InvalidSignatureDb("empty probe list".to_string()));
        }
        for signature in &signatures {
            if signature.expected.len() != probes.len() {
                return Err(ScanError::InvalidSignatureDb(format!(
                    "signature '{}' has {} checksums, expected {}",
                    signature.label,
                    signature.expected.len(),
                    probes.len()
                )));
            }
        }
        Ok(Self { probes, signatures })
    }

    /// The compiled-in probe list and signatures.
    pub fn builtin() -> ScanResult<Self> {
        let signatures: Vec<Signature> = serde_json::from_str(BUILTIN_SIGNATURES)?;
        Self::new(builtin_probes(), signatures)
    }

    /// Signatures from a JSON file, checked against the built-in probe list.
    pub fn load(path: &Path) -> ScanResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let signatures: Vec<Signature> = serde_json::from_str(&text)?;
        debug!("loaded {} signatures from {}", signatures.len(), path.display());
        Self::new(builtin_probes(), signatures)
    }

    pub fn probes(&self) -> &[String] {
        &self.probes
    }

    pub fn signatures(&self) -> &[Signature] {
        &self.signatures
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }
}

pub fn builtin_probes() -> Vec<String> {
    parse_lines(BUILTIN_PROBES)
}

/// One entry per line; blank lines and `#` comments are skipped.
pub fn parse_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}
