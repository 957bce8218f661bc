use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::scanner::banner::Banner;
use crate::scanner::exploits::Correlation;
use crate::scanner::ranking::{DetectionState, Ranking};
use crate::scanner::sequence::SequenceOutcome;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostReport {
    pub target: String,
    pub address: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: HostStatus,
    pub banner: Option<Banner>,
    pub logged_in: bool,
    pub system_type: Option<String>,
    pub state: DetectionState,
    pub ranking: Option<Ranking>,
    /// Observed checksums of the fingerprint pass, in probe order.
    pub fingerprint: Option<Vec<u64>>,
    pub exploits: Option<Correlation>,
    pub sequence: Option<SequenceOutcome>,
}

impl HostReport {
    pub fn new(target: &str, address: &str) -> Self {
        let now = Utc::now();
        Self {
            target: target.to_string(),
            address: address.to_string(),
            start_time: now,
            end_time: now,
            status: HostStatus::Completed,
            banner: None,
            logged_in: false,
            system_type: None,
            state: DetectionState::Unknown,
            ranking: None,
            fingerprint: None,
            exploits: None,
            sequence: None,
        }
    }

    pub fn failed(mut self, reason: String) -> Self {
        self.status = HostStatus::Failed(reason);
        self.end_time = Utc::now();
        self
    }

    /// Label for a contributed signature built from this host's banner.
    pub fn fingerprint_label(&self) -> String {
        match &self.banner {
            Some(banner) => format!("{} {}", banner.software, banner.version).trim().to_string(),
            None => self.target.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum HostStatus {
    Completed,
    Failed(String),
}

impl std::fmt::Display for HostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HostStatus::Completed => write!(f, "completed"),
            HostStatus::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub total_hosts: usize,
    pub hosts: Vec<HostReport>,
}
