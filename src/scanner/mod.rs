pub mod banner;
pub mod exploits;
pub mod fingerprint;
pub mod ranking;
pub mod results;
pub mod sequence;
pub mod session;
pub mod signatures;
pub mod transport;

use std::path::Path;

use tracing::{info, warn};

use crate::config::ScanConfig;
use crate::error::{ScanError, ScanResult};
use crate::network::Target;
pub use banner::{Banner, BannerMatcher};
pub use exploits::{Correlation, ExploitDb, ExploitRecord};
pub use fingerprint::{FingerprintObserver, FingerprintScorer, ProgressObserver, TranscriptRecorder};
pub use ranking::{Candidate, DetectionState, Ranking};
pub use results::{HostReport, HostStatus, ScanReport};
pub use sequence::{SequenceAnalyzer, SequenceOutcome};
pub use signatures::{Signature, SignatureDb};
pub use transport::{FtpTransport, ScriptedTransport, TcpTransport};

/// Drives one host at a time through banner matching, fingerprinting,
/// exploit correlation and sequence analysis.
pub struct Scanner {
    config: ScanConfig,
    signatures: SignatureDb,
    banners: BannerMatcher,
    exploits: ExploitDb,
}

impl Scanner {
    pub fn new(
        config: ScanConfig,
        signatures: SignatureDb,
        banners: BannerMatcher,
        exploits: ExploitDb,
    ) -> Self {
        Self {
            config,
            signatures,
            banners,
            exploits,
        }
    }

    /// Scanner over the compiled-in tables.
    pub fn with_builtin_tables(config: ScanConfig) -> ScanResult<Self> {
        Ok(Self::new(
            config,
            SignatureDb::builtin()?,
            BannerMatcher::builtin(),
            ExploitDb::builtin()?,
        ))
    }

    /// Replaces the signature or exploit tables with ones loaded from disk.
    pub fn load_tables(
        &mut self,
        signatures: Option<&Path>,
        exploits: Option<&Path>,
    ) -> ScanResult<()> {
        if let Some(path) = signatures {
            self.signatures = SignatureDb::load(path)?;
        }
        if let Some(path) = exploits {
            self.exploits = ExploitDb::load(path)?;
        }
        Ok(())
    }

    /// Scans every target in turn. A failing host is recorded and the run
    /// moves on to the next one.
    pub async fn scan(&self, targets: &[Target]) -> ScanReport {
        let start_time = chrono::Utc::now();
        let mut hosts = Vec::with_capacity(targets.len());

        for target in targets {
            hosts.push(self.scan_target(target).await);
        }

        ScanReport {
            start_time,
            end_time: chrono::Utc::now(),
            total_hosts: hosts.len(),
            hosts,
        }
    }

    pub async fn scan_target(&self, target: &Target) -> HostReport {
        info!("starting FTP scan of {} ({})", target.name, target.addr);
        let report = HostReport::new(&target.name, &target.addr.to_string());

        let mut transport = match TcpTransport::connect(
            target.addr,
            self.config.connect_timeout,
            self.config.read_timeout,
        )
        .await
        {
            Ok(transport) => transport,
            Err(e) => {
                warn!("cannot connect to {}: {}", target.addr, e);
                return report.failed(e.to_string());
            }
        };

        let report = self.probe_host(&mut transport, report).await;
        session::quit(&mut transport).await;
        info!("scan for {} completed", target.addr);
        report
    }

    /// Logs into every target and sends `command` once. A target that cannot
    /// be reached or answered is reported with its error and the run moves
    /// on to the next one.
    pub async fn execute(&self, targets: &[Target], command: &str) -> Vec<(Target, ScanResult<String>)> {
        let mut replies = Vec::with_capacity(targets.len());

        for target in targets {
            let outcome = match TcpTransport::connect(
                target.addr,
                self.config.connect_timeout,
                self.config.read_timeout,
            )
            .await
            {
                Ok(mut transport) => {
                    let outcome = self.execute_on(&mut transport, command).await;
                    session::quit(&mut transport).await;
                    outcome
                }
                Err(e) => Err(e),
            };
            if let Err(e) = &outcome {
                warn!("cannot run {} on {}: {}", command, target.addr, e);
            }
            replies.push((target.clone(), outcome));
        }

        replies
    }

    /// Reads the greeting, logs in and returns the full reply to `command`.
    pub async fn execute_on<T: FtpTransport>(&self, transport: &mut T, command: &str) -> ScanResult<String> {
        let greeting = transport.read_reply().await?;
        info!("FTP banner: {}", greeting.trim_end());
        session::login(transport, &self.config.credentials).await?;
        session::command(transport, command).await
    }

    /// The per-host pipeline over an already connected transport whose
    /// greeting has not been read yet.
    pub async fn probe_host<T: FtpTransport>(&self, transport: &mut T, mut report: HostReport) -> HostReport {
        match self.run_pipeline(transport, &mut report).await {
            Ok(()) => {
                report.end_time = chrono::Utc::now();
                report
            }
            Err(e) => {
                warn!("scan of {} aborted: {}", report.address, e);
                report.failed(e.to_string())
            }
        }
    }

    async fn run_pipeline<T: FtpTransport>(
        &self,
        transport: &mut T,
        report: &mut HostReport,
    ) -> ScanResult<()> {
        let greeting = transport.read_reply().await?;
        info!("FTP banner: {}", greeting.trim_end());
        let banner = Banner::parse(&greeting);
        report.banner = Some(banner.clone());

        report.logged_in = match session::login(transport, &self.config.credentials).await {
            Ok(accepted) => accepted,
            Err(e) if e.requires_reconnect() => {
                warn!("login did not complete: {}", e);
                transport.reconnect().await?;
                false
            }
            Err(e) => return Err(e),
        };
        transport.remember_credentials(&self.config.credentials);
        report.system_type = match session::system_type(transport).await {
            Ok(system) => system,
            Err(e) if e.requires_reconnect() => {
                warn!("SYST did not complete: {}", e);
                transport.reconnect().await?;
                None
            }
            Err(e) => return Err(e),
        };
        if let Some(system) = &report.system_type {
            info!("system type (OS): {}", system);
        }

        let banner_hit = self.banners.find(&banner).is_some();
        if banner_hit {
            report.state = DetectionState::banner_matched(&banner);
        }

        let fingerprint_wanted = if banner_hit {
            self.config.force_fingerprint
        } else {
            !self.config.skip_fingerprint
        };
        if fingerprint_wanted {
            let state = self.fingerprint(transport, report).await?;
            if !banner_hit {
                report.state = state;
            }
        }

        report.exploits = Some(self.exploits.correlate(&report.state, &banner));

        if !self.config.skip_sequence {
            let analyzer = SequenceAnalyzer::new(self.config.sequence.clone());
            report.sequence = Some(analyzer.run(transport).await);
        }
        Ok(())
    }

    /// Runs the fingerprint pass and ranks the result. Returns the state the
    /// ranking supports on its own.
    async fn fingerprint<T: FtpTransport>(
        &self,
        transport: &mut T,
        report: &mut HostReport,
    ) -> ScanResult<DetectionState> {
        info!("trying to detect FTP server by fingerprint");
        let mut recorder = TranscriptRecorder::new();
        let mut progress = self
            .config
            .show_progress
            .then(|| ProgressObserver::new(self.signatures.probes().len()));

        let scorer = FingerprintScorer::new(&self.signatures);
        let context = match progress.as_mut() {
            Some(progress) => {
                let mut observers: [&mut dyn FingerprintObserver; 2] = [&mut recorder, progress];
                scorer.score(transport, &mut observers).await?
            }
            None => {
                let mut observers: [&mut dyn FingerprintObserver; 1] = [&mut recorder];
                scorer.score(transport, &mut observers).await?
            }
        };

        let ranked = ranking::rank(&context, &self.config.ranking);
        for candidate in &ranked.candidates {
            info!("{}) {} - {:.2}%", candidate.rank, candidate.label, candidate.confidence);
        }
        let state = match ranking::decide(&ranked, &self.config.ranking) {
            Ok(state) => state,
            Err(ScanError::AmbiguousMatch) => {
                warn!("every signature matched equally, leaving the server unidentified");
                DetectionState::Unknown
            }
            Err(e) => return Err(e),
        };

        report.ranking = Some(ranked);
        report.fingerprint = Some(recorder.into_checksums());
        Ok(state)
    }
}
