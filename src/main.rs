use anyhow::Result;
use clap::Parser;
use colored::*;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ftpscope::cli::Cli;
use ftpscope::config::ScanConfig;
use ftpscope::network::{Target, load_target_list, parse_targets};
use ftpscope::output::{OutputWriter, write_fingerprints};
use ftpscope::scanner::Scanner;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let config = ScanConfig::from(&cli);
    let targets = collect_targets(&cli, config.port)?;
    if targets.is_empty() {
        eprintln!("{}", "Error: No target specified.".red());
        eprintln!("Example: ftpscope 192.168.1.1");
        eprintln!("Run 'ftpscope --help' for more information.");
        std::process::exit(1);
    }

    let mut scanner = Scanner::with_builtin_tables(config)?;
    scanner.load_tables(cli.signatures.as_deref(), cli.exploits.as_deref())?;

    if let Some(command) = &cli.execute {
        return execute(&scanner, &targets, command).await;
    }

    let report = tokio::select! {
        report = scanner.scan(&targets) => report,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, aborting scan");
            std::process::exit(130);
        }
    };

    let output_writer = OutputWriter::new(cli.output_format, cli.output_file.clone())?;
    output_writer.write(&report)?;

    if let Some(path) = &cli.fingerprint_out {
        let written = write_fingerprints(path, &report)?;
        info!("wrote {} fingerprints to {}", written, path.display());
    }

    Ok(())
}

fn collect_targets(cli: &Cli, default_port: u16) -> Result<Vec<Target>> {
    let mut targets = Vec::new();
    if !cli.target.is_empty() {
        targets.extend(parse_targets(&cli.target.join(","), default_port)?);
    }
    if let Some(path) = &cli.list {
        targets.extend(load_target_list(path, default_port)?);
    }

    let mut seen = std::collections::HashSet::new();
    targets.retain(|t| seen.insert(t.addr));
    Ok(targets)
}

/// Sends one command to every target and prints the raw replies.
async fn execute(scanner: &Scanner, targets: &[Target], command: &str) -> Result<()> {
    let replies = tokio::select! {
        replies = scanner.execute(targets, command) => replies,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted");
            std::process::exit(130);
        }
    };

    for (target, outcome) in replies {
        println!("{} {}", "▶".truecolor(0, 255, 65).bold(), target.name.bold());
        match outcome {
            Ok(reply) => print!("{}", reply),
            Err(e) => println!("  {} {}", "✗".red().bold(), e.to_string().red()),
        }
    }
    Ok(())
}
