use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::error::{ScanError, ScanResult};
use crate::scanner::banner::Banner;
use crate::scanner::fingerprint::ScoringContext;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingConfig {
    /// Distinct labels reported per scan.
    pub max_candidates: usize,
    /// Highest top-candidate confidence (percent of worst error) still
    /// accepted as an identification.
    pub match_threshold: f64,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            max_candidates: 3,
            match_threshold: 0.40,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub rank: usize,
    pub label: String,
    pub error: u64,
    /// `100 * error / worst error` of the pass. Lower is a closer match.
    pub confidence: f64,
}

impl Candidate {
    /// Software and version tokens of the label.
    pub fn software_and_version(&self) -> (String, String) {
        let mut tokens = self.label.split_whitespace();
        let software = tokens.next().unwrap_or("").to_string();
        let version = tokens.next().unwrap_or("").to_string();
        (software, version)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ranking {
    pub candidates: Vec<Candidate>,
    pub max_error: u64,
    /// Every signature scored zero error.
    pub ambiguous: bool,
}

/// How the server's identity was established for this scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DetectionState {
    Unknown,
    BannerMatched { software: String, version: String },
    FingerprintMatched(Candidate),
}

impl DetectionState {
    pub fn banner_matched(banner: &Banner) -> Self {
        DetectionState::BannerMatched {
            software: banner.software.clone(),
            version: banner.version.clone(),
        }
    }

    pub fn is_identified(&self) -> bool {
        !matches!(self, DetectionState::Unknown)
    }
}

impl std::fmt::Display for DetectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DetectionState::Unknown => write!(f, "unknown"),
            DetectionState::BannerMatched { software, version } => {
                write!(f, "banner matched ({} {})", software, version)
            }
            DetectionState::FingerprintMatched(candidate) => {
                write!(f, "fingerprint matched ({})", candidate.label)
            }
        }
    }
}

/// Errors ascending, ties by case-insensitive label descending.
fn compare(a: (&str, u64), b: (&str, u64)) -> Ordering {
    a.1.cmp(&b.1)
        .then_with(|| b.0.to_lowercase().cmp(&a.0.to_lowercase()))
}

fn confidence(error: u64, max_error: u64) -> f64 {
    if max_error == 0 {
        0.0
    } else {
        100.0 * error as f64 / max_error as f64
    }
}

/// Orders the scored signatures and keeps the first entry of each distinct
/// label, up to `max_candidates` labels. An ambiguous pass reports every
/// distinct label.
pub fn rank(context: &ScoringContext<'_>, config: &RankingConfig) -> Ranking {
    let mut scored: Vec<(&str, u64)> = context
        .scored()
        .map(|(signature, error)| (signature.label.as_str(), error))
        .collect();
    scored.sort_by(|a, b| compare(*a, *b));

    let max_error = scored.iter().map(|(_, error)| *error).max().unwrap_or(0);
    let ambiguous = max_error == 0;
    let limit = if ambiguous { usize::MAX } else { config.max_candidates };

    let mut candidates: Vec<Candidate> = Vec::new();
    for (label, error) in scored {
        if candidates.len() >= limit {
            break;
        }
        let seen = candidates
            .last()
            .map(|prev| prev.label.eq_ignore_ascii_case(label))
            .unwrap_or(false);
        if seen {
            continue;
        }
        candidates.push(Candidate {
            rank: candidates.len() + 1,
            label: label.to_string(),
            error,
            confidence: confidence(error, max_error),
        });
    }

    Ranking {
        candidates,
        max_error,
        ambiguous,
    }
}

/// Accepts the top candidate when its confidence is within the threshold.
/// An ambiguous ranking is surfaced as `AmbiguousMatch` instead of guessed.
pub fn decide(ranking: &Ranking, config: &RankingConfig) -> ScanResult<DetectionState> {
    if ranking.ambiguous {
        return Err(ScanError::AmbiguousMatch);
    }
    match ranking.candidates.first() {
        Some(top) if top.confidence <= config.match_threshold => {
            Ok(DetectionState::FingerprintMatched(top.clone()))
        }
        _ => Ok(DetectionState::Unknown),
    }
}
