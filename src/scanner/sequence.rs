// Passive-mode port predictability heuristic
use std::collections::HashSet;

use lazy_static::lazy_static;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use tracing::{info, warn};

use crate::error::{ScanError, ScanResult};
use crate::scanner::session;
use crate::scanner::transport::FtpTransport;

/// First port of the dynamic range the reference samples are drawn from.
pub const DYNAMIC_PORT_FLOOR: u16 = 1024;

/// Overlap above this count flags a trivial time dependency.
pub const TIME_DEPENDENCY_OVERLAP: usize = 2;

lazy_static! {
    static ref PASV_TUPLE: Regex =
        Regex::new(r"\(\s*(\d+)\s*,\s*(\d+)\s*,\s*(\d+)\s*,\s*(\d+)\s*,\s*(\d+)\s*,\s*(\d+)").unwrap();
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceConfig {
    pub samples: usize,
    pub reference_size: usize,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            samples: 5,
            reference_size: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Difficulty {
    TrivialJoke,
    Easy,
    Medium,
    Formidable,
    WorthyChallenge,
    GoodLuck,
}

impl Difficulty {
    pub fn classify(average_difference: f64) -> Self {
        match average_difference {
            d if d < 100.0 => Difficulty::TrivialJoke,
            d if d < 1000.0 => Difficulty::Easy,
            d if d < 4000.0 => Difficulty::Medium,
            d if d < 8000.0 => Difficulty::Formidable,
            d if d < 16000.0 => Difficulty::WorthyChallenge,
            _ => Difficulty::GoodLuck,
        }
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Difficulty::TrivialJoke => write!(f, "Trivial joke"),
            Difficulty::Easy => write!(f, "Easy"),
            Difficulty::Medium => write!(f, "Medium"),
            Difficulty::Formidable => write!(f, "Formidable"),
            Difficulty::WorthyChallenge => write!(f, "Worthy challenge"),
            Difficulty::GoodLuck => write!(f, "Good luck!"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceReport {
    pub ports: Vec<u16>,
    pub average_difference: f64,
    pub overlap: usize,
    pub time_dependency: bool,
    pub difficulty: Difficulty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum SequenceOutcome {
    Analyzed(SequenceReport),
    Undetermined(String),
}

/// Port announced by a `227 Entering Passive Mode (h1,h2,h3,h4,p1,p2)` reply.
pub fn parse_pasv_port(reply: &str) -> ScanResult<u16> {
    if !reply.starts_with('2') {
        return Err(ScanError::UnparsableReply(reply.trim_end().to_string()));
    }
    let caps = PASV_TUPLE
        .captures(reply)
        .ok_or_else(|| ScanError::UnparsableReply(reply.trim_end().to_string()))?;

    let high: u8 = caps[5]
        .parse()
        .map_err(|_| ScanError::UnparsableReply(reply.trim_end().to_string()))?;
    let low: u8 = caps[6]
        .parse()
        .map_err(|_| ScanError::UnparsableReply(reply.trim_end().to_string()))?;
    Ok(u16::from(high) * 256 + u16::from(low))
}

/// Uniform samples from the dynamic port range.
pub fn reference_ports<R: Rng>(rng: &mut R, count: usize) -> Vec<u16> {
    (0..count)
        .map(|_| rng.gen_range(DYNAMIC_PORT_FLOOR..=u16::MAX))
        .collect()
}

/// Average consecutive difference, reference overlap and difficulty tier
/// of the observed ports.
pub fn analyze(ports: &[u16], reference: &[u16]) -> SequenceReport {
    let average_difference = if ports.len() < 2 {
        0.0
    } else {
        let differences: Vec<f64> = ports
            .windows(2)
            .map(|pair| f64::from(pair[1].abs_diff(pair[0])))
            .collect();
        differences.iter().mean()
    };

    let reference: HashSet<u16> = reference.iter().copied().collect();
    let overlap = ports.iter().filter(|port| reference.contains(port)).count();

    SequenceReport {
        ports: ports.to_vec(),
        average_difference,
        overlap,
        time_dependency: overlap > TIME_DEPENDENCY_OVERLAP,
        difficulty: Difficulty::classify(average_difference),
    }
}

pub struct SequenceAnalyzer {
    config: SequenceConfig,
}

impl SequenceAnalyzer {
    pub fn new(config: SequenceConfig) -> Self {
        Self { config }
    }

    /// Requests `samples` passive ports in a row and analyzes them. A refused
    /// or malformed PASV reply leaves the result undetermined.
    pub async fn run<T: FtpTransport>(&self, transport: &mut T) -> SequenceOutcome {
        let reference = reference_ports(&mut rand::thread_rng(), self.config.reference_size);

        let ports = match self.sample(transport).await {
            Ok(ports) => ports,
            Err(e) => {
                warn!("unable to determine FTP port sequence numbers: {}", e);
                return SequenceOutcome::Undetermined(e.to_string());
            }
        };

        let report = analyze(&ports, &reference);
        info!("FTP port sequence numbers: {:?}", report.ports);
        if report.time_dependency {
            warn!("possible trivial time dependency - insecure");
        }
        info!(
            "difficulty = {:.2} ({})",
            report.average_difference, report.difficulty
        );
        SequenceOutcome::Analyzed(report)
    }

    async fn sample<T: FtpTransport>(&self, transport: &mut T) -> ScanResult<Vec<u16>> {
        let mut ports = Vec::with_capacity(self.config.samples);
        for _ in 0..self.config.samples {
            let reply = session::command(transport, "PASV").await?;
            ports.push(parse_pasv_port(&reply)?);
        }
        Ok(ports)
    }
}
