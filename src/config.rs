use std::time::Duration;

use crate::cli::Cli;
use crate::scanner::ranking::RankingConfig;
use crate::scanner::sequence::SequenceConfig;
use crate::scanner::session::Credentials;

/// Settings for a scan run. Every tunable constant lives here.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Control port used when a target does not name one.
    pub port: u16,
    pub credentials: Credentials,
    pub connect_timeout: Duration,
    /// Deadline for one complete reply.
    pub read_timeout: Duration,
    pub ranking: RankingConfig,
    pub sequence: SequenceConfig,
    pub skip_fingerprint: bool,
    /// Fingerprint even when the banner already identified the server.
    pub force_fingerprint: bool,
    pub skip_sequence: bool,
    pub show_progress: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            port: 21,
            credentials: Credentials::default(),
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(5),
            ranking: RankingConfig::default(),
            sequence: SequenceConfig::default(),
            skip_fingerprint: false,
            force_fingerprint: false,
            skip_sequence: false,
            show_progress: false,
        }
    }
}

impl From<&Cli> for ScanConfig {
    fn from(cli: &Cli) -> Self {
        let defaults = ScanConfig::default();
        let timeout = cli.timeout.map(Duration::from_secs);
        Self {
            port: cli.port,
            credentials: Credentials {
                user: cli.user.clone(),
                password: cli.password.clone(),
            },
            connect_timeout: timeout.unwrap_or(defaults.connect_timeout),
            read_timeout: timeout.unwrap_or(defaults.read_timeout),
            ranking: RankingConfig {
                max_candidates: cli.top,
                match_threshold: cli.match_threshold,
            },
            sequence: defaults.sequence,
            skip_fingerprint: cli.no_fingerprint,
            force_fingerprint: cli.force,
            skip_sequence: cli.no_sequence,
            show_progress: !cli.quiet,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_defaults_from_cli() {
        let cli = Cli::parse_from(["ftpscope", "10.0.0.1"]);
        let config = ScanConfig::from(&cli);
        assert_eq!(config.port, 21);
        assert_eq!(config.credentials.user, "anonymous");
        assert_eq!(config.read_timeout, Duration::from_secs(5));
        assert_eq!(config.ranking.max_candidates, 3);
        assert_eq!(config.ranking.match_threshold, 0.40);
        assert_eq!(config.sequence.samples, 5);
        assert!(!config.force_fingerprint);
    }

    #[test]
    fn test_overrides_from_cli() {
        let cli = Cli::parse_from([
            "ftpscope", "-P", "2121", "-u", "ftp", "-p", "secret", "--timeout", "9", "--top", "5",
            "--match-threshold", "1.5", "-f", "--no-sequence", "10.0.0.1",
        ]);
        let config = ScanConfig::from(&cli);
        assert_eq!(config.port, 2121);
        assert_eq!(config.credentials.password, "secret");
        assert_eq!(config.connect_timeout, Duration::from_secs(9));
        assert_eq!(config.ranking.max_candidates, 5);
        assert_eq!(config.ranking.match_threshold, 1.5);
        assert!(config.force_fingerprint);
        assert!(config.skip_sequence);
    }
}
