// Behavioral fingerprinting over the fixed probe list
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ScanError, ScanResult};
use crate::scanner::session;
use crate::scanner::signatures::{Signature, SignatureDb};
use crate::scanner::transport::FtpTransport;

/// Sum of every byte of the reply, wrapping on overflow.
pub fn checksum(reply: &str) -> u64 {
    reply
        .bytes()
        .fold(0u64, |sum, byte| sum.wrapping_add(u64::from(byte)))
}

/// Per-scan accumulated error, one slot per signature in `db`.
///
/// A fresh context is created for every host, so nothing carries over
/// between scans and concurrent scans never share a slot.
#[derive(Debug, Clone)]
pub struct ScoringContext<'a> {
    db: &'a SignatureDb,
    errors: Vec<u64>,
}

impl<'a> ScoringContext<'a> {
    pub fn new(db: &'a SignatureDb) -> Self {
        Self {
            db,
            errors: vec![0; db.len()],
        }
    }

    /// Adds `|expected[index] - observed|` to every signature.
    pub fn record(&mut self, index: usize, observed: u64) {
        for (error, signature) in self.errors.iter_mut().zip(self.db.signatures()) {
            let deviation = signature.expected[index].abs_diff(observed);
            *error = error.saturating_add(deviation);
        }
    }

    pub fn errors(&self) -> &[u64] {
        &self.errors
    }

    /// Signatures paired with their accumulated error, in database order.
    pub fn scored(&self) -> impl Iterator<Item = (&'a Signature, u64)> + '_ {
        self.db.signatures().iter().zip(self.errors.iter().copied())
    }
}

/// Notified after each probe of a fingerprint pass.
pub trait FingerprintObserver: Send {
    fn on_probe(&mut self, index: usize, command: &str, checksum: u64);

    fn on_complete(&mut self) {}
}

/// Records the observed checksums so they can be contributed back as a
/// new signature.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranscriptRecorder {
    checksums: Vec<u64>,
}

impl TranscriptRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn checksums(&self) -> &[u64] {
        &self.checksums
    }

    pub fn into_checksums(self) -> Vec<u64> {
        self.checksums
    }
}

impl FingerprintObserver for TranscriptRecorder {
    fn on_probe(&mut self, _index: usize, _command: &str, checksum: u64) {
        self.checksums.push(checksum);
    }
}

pub struct ProgressObserver {
    bar: ProgressBar,
}

impl ProgressObserver {
    pub fn new(total: usize) -> Self {
        let bar = ProgressBar::new(total as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("⟦{spinner:.bright_magenta}⟧ fingerprint ⟨{bar:40.bright_green/bright_black}⟩ {percent}% {msg}")
        {
            bar.set_style(style.progress_chars("█▉▊▋▌▍▎▏ "));
        }
        Self { bar }
    }
}

impl FingerprintObserver for ProgressObserver {
    fn on_probe(&mut self, _index: usize, command: &str, _checksum: u64) {
        self.bar.set_message(command.to_string());
        self.bar.inc(1);
    }

    fn on_complete(&mut self) {
        self.bar.finish_and_clear();
    }
}

pub struct FingerprintScorer<'a> {
    db: &'a SignatureDb,
}

impl<'a> FingerprintScorer<'a> {
    pub fn new(db: &'a SignatureDb) -> Self {
        Self { db }
    }

    /// Sends every probe command in order and scores the replies against
    /// all signatures.
    ///
    /// A reply that times out or is lost counts as checksum 0 and the
    /// transport is reconnected. Only a failed reconnect aborts the pass,
    /// and the partial scores are dropped with it.
    pub async fn score<T: FtpTransport>(
        &self,
        transport: &mut T,
        observers: &mut [&mut dyn FingerprintObserver],
    ) -> ScanResult<ScoringContext<'a>> {
        let mut context = ScoringContext::new(self.db);

        for (index, probe) in self.db.probes().iter().enumerate() {
            let observed = match session::command(transport, probe).await {
                Ok(reply) => checksum(&reply),
                Err(e) if e.requires_reconnect() => {
                    warn!("probe {} ({}) failed: {}", index, probe, e);
                    if let Err(reconnect_err) = transport.reconnect().await {
                        warn!("reconnect failed: {}", reconnect_err);
                        return Err(ScanError::ConnectionLost);
                    }
                    0
                }
                Err(e) => {
                    debug!("probe {} ({}) unreadable: {}", index, probe, e);
                    0
                }
            };

            context.record(index, observed);
            for observer in observers.iter_mut() {
                observer.on_probe(index, probe, observed);
            }
        }

        for observer in observers.iter_mut() {
            observer.on_complete();
        }
        Ok(context)
    }
}
