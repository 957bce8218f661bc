use std::fs::{File, OpenOptions};
use std::io::{self, Write, BufWriter};
use std::path::{Path, PathBuf};
use anyhow::Result;
use colored::*;

use crate::cli::OutputFormat;
use crate::scanner::exploits::Correlation;
use crate::scanner::ranking::DetectionState;
use crate::scanner::results::{HostReport, HostStatus, ScanReport};
use crate::scanner::sequence::SequenceOutcome;
use crate::scanner::signatures::Signature;

pub struct OutputWriter {
    format: OutputFormat,
    file: Option<PathBuf>,
}

impl OutputWriter {
    pub fn new(format: OutputFormat, file: Option<PathBuf>) -> Result<Self> {
        Ok(Self { format, file })
    }

    pub fn write(&self, report: &ScanReport) -> Result<()> {
        let output = self.render(report)?;

        match &self.file {
            Some(path) => {
                let file = File::create(path)?;
                let mut writer = BufWriter::new(file);
                writer.write_all(output.as_bytes())?;
                writer.flush()?;
            }
            None => {
                print!("{}", output);
                io::stdout().flush()?;
            }
        }

        Ok(())
    }

    pub fn render(&self, report: &ScanReport) -> Result<String> {
        match self.format {
            OutputFormat::Human => Ok(format_human(report)),
            OutputFormat::Json => Ok(serde_json::to_string_pretty(report)?),
            OutputFormat::Csv => Ok(format_csv(report)),
        }
    }
}

/// Appends one signature line per fingerprinted host, labelled with the
/// host's banner, so the file can be merged into a signature table.
pub fn write_fingerprints(path: &Path, report: &ScanReport) -> Result<usize> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = BufWriter::new(file);
    let mut written = 0;

    for host in &report.hosts {
        let Some(checksums) = &host.fingerprint else {
            continue;
        };
        let signature = Signature {
            label: host.fingerprint_label(),
            expected: checksums.clone(),
        };
        writeln!(writer, "{}", serde_json::to_string(&signature)?)?;
        written += 1;
    }

    writer.flush()?;
    Ok(written)
}

fn format_human(report: &ScanReport) -> String {
    let mut output = String::new();

    output.push_str(&format!("\n{}\n\n",
        "FTP SCAN COMPLETE".truecolor(0, 255, 65).bold()));
    output.push_str(&format!("{} {} {} {} {}\n\n",
        "⟦".truecolor(64, 64, 64),
        format!("{}ms", (report.end_time - report.start_time).num_milliseconds()).truecolor(0, 212, 255).bold(),
        "•".truecolor(0, 255, 65),
        format!("{} hosts", report.total_hosts).truecolor(191, 64, 191).bold(),
        "⟧".truecolor(64, 64, 64)));

    for host in &report.hosts {
        format_host(&mut output, host);
        output.push('\n');
    }

    let failed = report.hosts.iter()
        .filter(|h| matches!(h.status, HostStatus::Failed(_)))
        .count();
    let identified = report.hosts.iter()
        .filter(|h| h.state.is_identified())
        .count();
    output.push_str(&format!("{} {} {} {} {} {}\n",
        "⚡".truecolor(0, 255, 65).bold(),
        "Scan complete:".truecolor(0, 255, 65).bold(),
        format!("{} identified", identified).truecolor(255, 255, 255).bold(),
        "•".truecolor(64, 64, 64),
        format!("{} failed", failed).truecolor(255, 255, 255).bold(),
        "hosts".truecolor(0, 255, 65).bold()));

    output
}

fn format_host(output: &mut String, host: &HostReport) {
    output.push_str(&format!("{} {} {}\n",
        "▶".truecolor(0, 255, 65).bold(),
        host.target.truecolor(255, 255, 255).bold(),
        format!("({})", host.address).truecolor(128, 128, 128)));

    if let HostStatus::Failed(reason) = &host.status {
        output.push_str(&format!("  {} {}\n",
            "✗".red().bold(),
            reason.red()));
    }

    if let Some(banner) = &host.banner {
        output.push_str(&format!("  {:<10} {}\n", "banner".truecolor(128, 128, 128), banner.raw.trim_end()));
    }
    if !host.logged_in && host.banner.is_some() {
        output.push_str(&format!("  {:<10} {}\n", "login".truecolor(128, 128, 128), "rejected".truecolor(255, 140, 0)));
    }
    if let Some(system) = &host.system_type {
        output.push_str(&format!("  {:<10} {}\n", "system".truecolor(128, 128, 128), system));
    }

    let state = match &host.state {
        DetectionState::Unknown => host.state.to_string().truecolor(255, 140, 0),
        _ => host.state.to_string().truecolor(0, 255, 65).bold(),
    };
    output.push_str(&format!("  {:<10} {}\n", "server".truecolor(128, 128, 128), state));

    if let Some(ranking) = &host.ranking {
        if ranking.ambiguous {
            output.push_str(&format!("  {}\n",
                "every signature matched equally".truecolor(255, 140, 0)));
        }
        for candidate in &ranking.candidates {
            output.push_str(&format!("    {}) {} {}\n",
                candidate.rank,
                candidate.label.truecolor(255, 255, 255),
                format!("{:.2}%", candidate.confidence).truecolor(0, 212, 255)));
        }
    }

    match &host.exploits {
        Some(Correlation::Matched(records)) if records.is_empty() => {
            output.push_str(&format!("  {:<10} {}\n", "exploits".truecolor(128, 128, 128), "none found".truecolor(128, 128, 128)));
        }
        Some(Correlation::Matched(records)) => {
            output.push_str(&format!("  {:<10} {}\n",
                "exploits".truecolor(128, 128, 128),
                format!("{} found", records.len()).red().bold()));
            for record in records {
                output.push_str(&format!("    {:>6}  {}\n", record.id.to_string().truecolor(255, 140, 0), record.description));
            }
        }
        Some(Correlation::Undetermined(reason)) => {
            output.push_str(&format!("  {:<10} {} ({})\n",
                "exploits".truecolor(128, 128, 128),
                "undetermined".truecolor(255, 140, 0),
                reason));
        }
        None => {}
    }

    match &host.sequence {
        Some(SequenceOutcome::Analyzed(sequence)) => {
            let ports: Vec<String> = sequence.ports.iter().map(|p| p.to_string()).collect();
            output.push_str(&format!("  {:<10} {}\n", "pasv".truecolor(128, 128, 128), ports.join(" ")));
            output.push_str(&format!("  {:<10} {} (avg difference {:.2})\n",
                "difficulty".truecolor(128, 128, 128),
                sequence.difficulty.to_string().truecolor(191, 64, 191).bold(),
                sequence.average_difference));
            if sequence.time_dependency {
                output.push_str(&format!("  {} {}\n",
                    "⚠".truecolor(255, 140, 0).bold(),
                    format!("possible time dependency ({} ports overlap a random sample)", sequence.overlap)
                        .truecolor(255, 140, 0)));
            }
        }
        Some(SequenceOutcome::Undetermined(reason)) => {
            output.push_str(&format!("  {:<10} {} ({})\n",
                "pasv".truecolor(128, 128, 128),
                "undetermined".truecolor(255, 140, 0),
                reason));
        }
        None => {}
    }
}

fn format_csv(report: &ScanReport) -> String {
    let mut csv = String::new();
    csv.push_str("target,address,status,banner,system_type,state,top_candidate,confidence,exploits,pasv_difficulty,time_dependency\n");

    for host in &report.hosts {
        let status = match &host.status {
            HostStatus::Completed => "completed",
            HostStatus::Failed(_) => "failed",
        };
        let banner = host.banner.as_ref().map(|b| b.raw.trim_end()).unwrap_or("");
        let system = host.system_type.as_deref().unwrap_or("");
        let top = host.ranking.as_ref().and_then(|r| r.candidates.first());
        let top_label = top.map(|c| c.label.as_str()).unwrap_or("");
        let confidence = top.map(|c| format!("{:.2}", c.confidence)).unwrap_or_default();
        let exploits = match &host.exploits {
            Some(Correlation::Matched(records)) => records.len().to_string(),
            Some(Correlation::Undetermined(_)) => "undetermined".to_string(),
            None => String::new(),
        };
        let (difficulty, time_dependency) = match &host.sequence {
            Some(SequenceOutcome::Analyzed(sequence)) => {
                (sequence.difficulty.to_string(), sequence.time_dependency.to_string())
            }
            Some(SequenceOutcome::Undetermined(_)) => ("undetermined".to_string(), String::new()),
            None => (String::new(), String::new()),
        };

        let state = host.state.to_string();
        let row: [&str; 11] = [
            &host.target,
            &host.address,
            status,
            banner,
            system,
            &state,
            top_label,
            &confidence,
            &exploits,
            &difficulty,
            &time_dependency,
        ];
        let fields: Vec<String> = row.iter().map(|f| csv_field(f)).collect();
        csv.push_str(&fields.join(","));
        csv.push('\n');
    }

    csv
}

fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::banner::Banner;
    use crate::scanner::exploits::ExploitRecord;
    use crate::scanner::sequence::{Difficulty, SequenceReport};

    fn sample_report() -> ScanReport {
        let mut host = HostReport::new("ftp.example.org", "10.0.0.5:21");
        host.banner = Some(Banner::parse("220 (vsFTPd 2.3.4)\r\n"));
        host.logged_in = true;
        host.system_type = Some("UNIX Type: L8".to_string());
        host.state = DetectionState::BannerMatched {
            software: "vsFTPd".to_string(),
            version: "2.3.4".to_string(),
        };
        host.exploits = Some(Correlation::Matched(vec![ExploitRecord {
            id: 17491,
            description: "vsftpd 2.3.4 - Backdoor Command Execution (Metasploit)".to_string(),
        }]));
        host.sequence = Some(SequenceOutcome::Analyzed(SequenceReport {
            ports: vec![40000, 40001, 40002, 40003, 40004],
            average_difference: 1.0,
            overlap: 0,
            time_dependency: false,
            difficulty: Difficulty::TrivialJoke,
        }));
        host.fingerprint = Some(vec![1, 2, 3]);

        let failed = HostReport::new("10.0.0.6", "10.0.0.6:21").failed("connection refused".to_string());

        ScanReport {
            start_time: host.start_time,
            end_time: host.end_time,
            total_hosts: 2,
            hosts: vec![host, failed],
        }
    }

    #[test]
    fn test_human_output_lists_findings() {
        colored::control::set_override(false);
        let writer = OutputWriter::new(OutputFormat::Human, None).unwrap();
        let text = writer.render(&sample_report()).unwrap();

        assert!(text.contains("vsFTPd 2.3.4"));
        assert!(text.contains("UNIX Type: L8"));
        assert!(text.contains("17491"));
        assert!(text.contains("Trivial joke"));
        assert!(text.contains("connection refused"));
        assert!(!text.contains("time dependency"));
    }

    #[test]
    fn test_json_output_is_parseable() {
        let writer = OutputWriter::new(OutputFormat::Json, None).unwrap();
        let text = writer.render(&sample_report()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["total_hosts"], 2);
        assert_eq!(value["hosts"][0]["state"]["state"], "banner_matched");
    }

    #[test]
    fn test_csv_output_one_row_per_host() {
        let writer = OutputWriter::new(OutputFormat::Csv, None).unwrap();
        let text = writer.render(&sample_report()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("ftp.example.org,10.0.0.5:21,completed,"));
        assert!(lines[1].contains(",1,Trivial joke,false"));
        assert!(lines[2].starts_with("10.0.0.6,10.0.0.6:21,failed,"));
    }

    #[test]
    fn test_csv_field_quoting() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_write_fingerprints_appends_lines() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let report = sample_report();

        assert_eq!(write_fingerprints(file.path(), &report).unwrap(), 1);
        assert_eq!(write_fingerprints(file.path(), &report).unwrap(), 1);

        let text = std::fs::read_to_string(file.path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let signature: Signature = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(signature.label, "vsFTPd 2.3.4");
        assert_eq!(signature.expected, vec![1, 2, 3]);
    }
}
