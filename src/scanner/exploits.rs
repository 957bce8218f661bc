use std::path::Path;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ScanResult;
use crate::scanner::banner::Banner;
use crate::scanner::ranking::DetectionState;

const BUILTIN_EXPLOITS: &str = include_str!("../../data/exploits.json");

lazy_static! {
    static ref NUMERIC_PREFIX: Regex = Regex::new(r"^\s*[+-]?(\d+(\.\d*)?|\.\d+)").unwrap();
    static ref INTEGER_PREFIX: Regex = Regex::new(r"^\s*[+-]?\d+").unwrap();
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExploitRecord {
    pub id: u32,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum Correlation {
    /// Matches in database order. Empty is a normal outcome.
    Matched(Vec<ExploitRecord>),
    /// Correlation was abandoned for this host.
    Undetermined(String),
}

impl Correlation {
    pub fn count(&self) -> usize {
        match self {
            Correlation::Matched(records) => records.len(),
            Correlation::Undetermined(_) => 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExploitDb {
    records: Vec<ExploitRecord>,
}

impl ExploitDb {
    pub fn new(records: Vec<ExploitRecord>) -> Self {
        Self { records }
    }

    pub fn builtin() -> ScanResult<Self> {
        Ok(Self::new(serde_json::from_str(BUILTIN_EXPLOITS)?))
    }

    pub fn load(path: &Path) -> ScanResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::new(serde_json::from_str(&text)?))
    }

    pub fn records(&self) -> &[ExploitRecord] {
        &self.records
    }

    /// Finds exploits whose description names both the software and the
    /// version the scan settled on.
    ///
    /// With a confirmed identity (banner or fingerprint) every substring hit
    /// is reported. With an unknown identity the banner tokens are used, and
    /// a hit against a version that is not a nonzero number abandons the
    /// correlation as undetermined.
    pub fn correlate(&self, state: &DetectionState, banner: &Banner) -> Correlation {
        let (software, version, require_numeric) = match state {
            DetectionState::BannerMatched { software, version } => {
                (software.clone(), version.clone(), false)
            }
            DetectionState::FingerprintMatched(candidate) => {
                let (software, version) = candidate.software_and_version();
                (software, version, false)
            }
            DetectionState::Unknown => (banner.software.clone(), banner.version.clone(), true),
        };

        if software.is_empty() || version.is_empty() {
            return Correlation::Undetermined("no software/version to correlate".to_string());
        }

        let mut matches = Vec::new();
        for record in &self.records {
            if !(contains_ignore_case(&record.description, &software)
                && contains_ignore_case(&record.description, &version))
            {
                continue;
            }
            if require_numeric && !is_nonzero_number(&version) {
                warn!("detected version {:?} is not a number, skipping exploit search", version);
                return Correlation::Undetermined(format!(
                    "version '{}' is not a nonzero number",
                    version
                ));
            }
            matches.push(record.clone());
        }

        if matches.is_empty() {
            info!("no exploits found for {} {}", software, version);
        } else {
            info!("found {} exploits for {} {}", matches.len(), software, version);
        }
        Correlation::Matched(matches)
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Whether both the leading integer and the leading decimal part of `token`
/// are nonzero. `1.3.5` passes; `0.9.41`, `abc` and `0` do not.
pub fn is_nonzero_number(token: &str) -> bool {
    let integer = INTEGER_PREFIX
        .find(token)
        .and_then(|m| m.as_str().trim().parse::<i64>().ok())
        .unwrap_or(0);
    let decimal = NUMERIC_PREFIX
        .find(token)
        .and_then(|m| m.as_str().trim().parse::<f64>().ok())
        .unwrap_or(0.0);
    integer != 0 && decimal != 0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::ranking::Candidate;

    fn db() -> ExploitDb {
        ExploitDb::new(vec![
            ExploitRecord { id: 1, description: "vsftpd 2.3.4 - Backdoor Command Execution".to_string() },
            ExploitRecord { id: 2, description: "ProFTPd 1.3.5 - 'mod_copy' Remote Command Execution".to_string() },
            ExploitRecord { id: 3, description: "FooFTP abc - Test Entry".to_string() },
            ExploitRecord { id: 4, description: "vsftpd 2.3.4 - Backdoor (Metasploit)".to_string() },
            ExploitRecord { id: 5, description: "BarFTP 0 - Zero Version".to_string() },
        ])
    }

    #[test]
    fn test_banner_matched_reports_all_hits_in_order() {
        let state = DetectionState::BannerMatched {
            software: "vsFTPd".to_string(),
            version: "2.3.4".to_string(),
        };
        let result = db().correlate(&state, &Banner::default());
        match result {
            Correlation::Matched(records) => {
                let ids: Vec<u32> = records.iter().map(|r| r.id).collect();
                assert_eq!(ids, vec![1, 4]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_fingerprint_matched_uses_candidate_label() {
        let state = DetectionState::FingerprintMatched(Candidate {
            rank: 1,
            label: "ProFTPD 1.3.5".to_string(),
            error: 0,
            confidence: 0.0,
        });
        let banner = Banner::parse("220 Welcome\r\n");
        assert_eq!(db().correlate(&state, &banner).count(), 1);
    }

    #[test]
    fn test_zero_matches_is_not_an_error() {
        let state = DetectionState::BannerMatched {
            software: "Serv-U".to_string(),
            version: "15.1".to_string(),
        };
        assert_eq!(db().correlate(&state, &Banner::default()), Correlation::Matched(vec![]));
    }

    #[test]
    fn test_unknown_state_requires_numeric_version() {
        let db = db();
        let non_numeric = Banner::parse("220 FooFTP abc\r\n");
        assert!(matches!(
            db.correlate(&DetectionState::Unknown, &non_numeric),
            Correlation::Undetermined(_)
        ));

        let zero = Banner::parse("220 BarFTP 0\r\n");
        assert!(matches!(
            db.correlate(&DetectionState::Unknown, &zero),
            Correlation::Undetermined(_)
        ));

        let numeric = Banner::parse("220 vsftpd 2.3.4\r\n");
        assert_eq!(db.correlate(&DetectionState::Unknown, &numeric).count(), 2);
    }

    #[test]
    fn test_unknown_state_rejects_zero_major_version() {
        let db = ExploitDb::new(vec![ExploitRecord {
            id: 9,
            description: "FileZilla 0.9.41 - DoS".to_string(),
        }]);
        let banner = Banner::parse("220 FileZilla 0.9.41\r\n");
        assert!(matches!(
            db.correlate(&DetectionState::Unknown, &banner),
            Correlation::Undetermined(_)
        ));

        let state = DetectionState::BannerMatched {
            software: "FileZilla".to_string(),
            version: "0.9.41".to_string(),
        };
        assert_eq!(db.correlate(&state, &banner).count(), 1);
    }

    #[test]
    fn test_unknown_state_without_tokens() {
        let banner = Banner::parse("220\r\n");
        assert!(matches!(
            db().correlate(&DetectionState::Unknown, &banner),
            Correlation::Undetermined(_)
        ));
    }

    #[test]
    fn test_nonzero_number() {
        assert!(is_nonzero_number("1.3.5"));
        assert!(is_nonzero_number("2"));
        assert!(is_nonzero_number("15.1"));
        assert!(!is_nonzero_number("0.9"));
        assert!(!is_nonzero_number("0.9.41"));
        assert!(!is_nonzero_number("0"));
        assert!(!is_nonzero_number("abc"));
        assert!(!is_nonzero_number(""));
    }

    #[test]
    fn test_builtin_exploit_table_loads() {
        let db = ExploitDb::builtin().unwrap();
        assert!(db.records().iter().any(|r| r.description.contains("vsftpd 2.3.4")));
    }
}
