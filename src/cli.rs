use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ftpscope")]
#[command(author = "FtpScope")]
#[command(version = "0.1.0")]
#[command(about = "FTP server fingerprinting, exploit correlation and passive port analysis", long_about = None)]
pub struct Cli {
    #[arg(help = "Target host, host:port, IP range (IP1-IP2) or CIDR (192.168.1.0/24). Can be specified multiple times.")]
    pub target: Vec<String>,

    #[arg(short = 'L', long, help = "Read targets from a file, one per line")]
    pub list: Option<PathBuf>,

    #[arg(short = 'P', long, default_value_t = 21, help = "FTP control port")]
    pub port: u16,

    #[arg(short, long, default_value = "anonymous", help = "FTP user")]
    pub user: String,

    #[arg(short, long, default_value = "anonymous@", help = "FTP password")]
    pub password: String,

    #[arg(short = 'n', long, help = "Do not generate a fingerprint")]
    pub no_fingerprint: bool,

    #[arg(short, long, help = "Generate a fingerprint even when the banner identifies the server")]
    pub force: bool,

    #[arg(long, help = "Skip the passive port sequence analysis")]
    pub no_sequence: bool,

    #[arg(short = 'x', long, value_name = "CMD", help = "Run a single command on the FTP server and print the reply")]
    pub execute: Option<String>,

    #[arg(short = 'o', long, value_enum, default_value = "human", help = "Output format")]
    pub output_format: OutputFormat,

    #[arg(long, help = "Output file path")]
    pub output_file: Option<PathBuf>,

    #[arg(long, value_name = "FILE", help = "Append observed fingerprints as signature entries (JSON lines)")]
    pub fingerprint_out: Option<PathBuf>,

    #[arg(long, value_name = "FILE", help = "Load signatures from a JSON file instead of the built-in table")]
    pub signatures: Option<PathBuf>,

    #[arg(long, value_name = "FILE", help = "Load exploits from a JSON file instead of the built-in table")]
    pub exploits: Option<PathBuf>,

    #[arg(long, value_name = "SECS", help = "Connect and reply timeout in seconds (default: 5)")]
    pub timeout: Option<u64>,

    #[arg(long, default_value_t = 0.40, help = "Highest top-candidate confidence accepted as a fingerprint match")]
    pub match_threshold: f64,

    #[arg(long, default_value_t = 3, help = "Number of distinct candidates to report")]
    pub top: usize,

    #[arg(long, help = "Disable colored output")]
    pub no_color: bool,

    #[arg(short, long, help = "Hide the fingerprint progress bar")]
    pub quiet: bool,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum OutputFormat {
    #[value(name = "human", help = "Human-readable output")]
    Human,
    #[value(name = "json", help = "JSON output")]
    Json,
    #[value(name = "csv", help = "CSV output, one row per host")]
    Csv,
}
