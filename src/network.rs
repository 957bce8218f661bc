use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::path::Path;
use anyhow::{Result, anyhow};
use ipnet::IpNet;

/// One FTP server to scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// The name as given by the user.
    pub name: String,
    pub addr: SocketAddr,
}

impl Target {
    fn new(name: impl Into<String>, ip: IpAddr, port: u16) -> Self {
        Self { name: name.into(), addr: SocketAddr::new(ip, port) }
    }
}

pub fn parse_targets(target_spec: &str, default_port: u16) -> Result<Vec<Target>> {
    let mut targets = Vec::new();

    for part in target_spec.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (host, port) = split_port(part, default_port)?;

        if host.contains('/') {
            targets.extend(parse_cidr(host)?.into_iter().map(|ip| Target::new(ip.to_string(), ip, port)));
        } else if host.contains('-') && host.parse::<IpAddr>().is_err() && looks_like_range(host) {
            targets.extend(parse_ip_range(host)?.into_iter().map(|ip| Target::new(ip.to_string(), ip, port)));
        } else {
            targets.push(Target::new(host, parse_single_target(host)?, port));
        }
    }

    let mut seen = std::collections::HashSet::new();
    targets.retain(|t| seen.insert(t.addr));

    Ok(targets)
}

/// Targets listed in a file, one per line. Blank lines and `#` comments
/// are ignored.
pub fn load_target_list(path: &Path, default_port: u16) -> Result<Vec<Target>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("Failed to read {}: {}", path.display(), e))?;
    let mut targets = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        targets.extend(parse_targets(line, default_port)?);
    }
    Ok(targets)
}

fn looks_like_range(host: &str) -> bool {
    host.split('-').all(|side| side.trim().parse::<IpAddr>().is_ok())
}

/// `host:port` for names and IPv4, `[v6]:port` for IPv6.
fn split_port(part: &str, default_port: u16) -> Result<(&str, u16)> {
    if let Some(rest) = part.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| anyhow!("Invalid bracketed address: {}", part))?;
        return match tail.strip_prefix(':') {
            Some(port) => Ok((host, parse_port(port)?)),
            None => Ok((host, default_port)),
        };
    }
    if part.matches(':').count() == 1 {
        if let Some((host, port)) = part.rsplit_once(':') {
            return Ok((host, parse_port(port)?));
        }
    }
    Ok((part, default_port))
}

fn parse_port(port: &str) -> Result<u16> {
    port.parse::<u16>()
        .ok()
        .filter(|p| *p != 0)
        .ok_or_else(|| anyhow!("Invalid port: {}", port))
}

fn parse_cidr(cidr: &str) -> Result<Vec<IpAddr>> {
    let network: IpNet = cidr.parse()
        .map_err(|_| anyhow!("Invalid CIDR notation: {}", cidr))?;

    match network {
        IpNet::V4(net) => {
            Ok(net.hosts().map(IpAddr::V4).collect())
        }
        IpNet::V6(net) => {
            Ok(net.hosts().take(1000).map(IpAddr::V6).collect())
        }
    }
}

fn parse_ip_range(range: &str) -> Result<Vec<IpAddr>> {
    let parts: Vec<&str> = range.split('-').collect();
    if parts.len() != 2 {
        return Err(anyhow!("Invalid IP range format: {}", range));
    }

    let start_ip: IpAddr = parts[0].trim().parse()
        .map_err(|_| anyhow!("Invalid start IP: {}", parts[0]))?;
    let end_ip: IpAddr = parts[1].trim().parse()
        .map_err(|_| anyhow!("Invalid end IP: {}", parts[1]))?;

    match (start_ip, end_ip) {
        (IpAddr::V4(start), IpAddr::V4(end)) => {
            let start_u32 = u32::from(start);
            let end_u32 = u32::from(end);

            if start_u32 > end_u32 {
                return Err(anyhow!("Start IP must be less than or equal to end IP"));
            }

            if end_u32 - start_u32 > 10000 {
                return Err(anyhow!("IP range too large (max 10000 addresses)"));
            }

            Ok((start_u32..=end_u32).map(|ip| IpAddr::V4(Ipv4Addr::from(ip))).collect())
        }
        (IpAddr::V6(_), IpAddr::V6(_)) => {
            Err(anyhow!("IPv6 ranges not yet supported"))
        }
        _ => {
            Err(anyhow!("Start and end IP must be the same version"))
        }
    }
}

fn parse_single_target(target: &str) -> Result<IpAddr> {
    if let Ok(ip) = target.parse::<IpAddr>() {
        return Ok(ip);
    }

    let addr = format!("{}:0", target)
        .to_socket_addrs()
        .map_err(|_| anyhow!("Failed to resolve hostname: {}", target))?
        .next()
        .ok_or_else(|| anyhow!("No IP address found for hostname: {}", target))?;

    Ok(addr.ip())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn v4(a: u8, b: u8, c: u8, d: u8, port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(a, b, c, d)), port)
    }

    #[test]
    fn test_parse_single_ip() {
        let targets = parse_targets("192.168.1.1", 21).unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].addr, v4(192, 168, 1, 1, 21));
        assert_eq!(targets[0].name, "192.168.1.1");
    }

    #[test]
    fn test_parse_host_with_port() {
        let targets = parse_targets("192.168.1.1:2121", 21).unwrap();
        assert_eq!(targets[0].addr, v4(192, 168, 1, 1, 2121));
    }

    #[test]
    fn test_parse_bracketed_ipv6() {
        let targets = parse_targets("[::1]:2121", 21).unwrap();
        assert_eq!(targets[0].addr.port(), 2121);
        assert!(targets[0].addr.ip().is_loopback());
    }

    #[test]
    fn test_parse_cidr() {
        let targets = parse_targets("192.168.1.0/30", 21).unwrap();
        assert_eq!(targets.len(), 2);
        assert!(targets.iter().any(|t| t.addr == v4(192, 168, 1, 1, 21)));
        assert!(targets.iter().any(|t| t.addr == v4(192, 168, 1, 2, 21)));
    }

    #[test]
    fn test_parse_ip_range() {
        let targets = parse_targets("192.168.1.1-192.168.1.3", 21).unwrap();
        assert_eq!(targets.len(), 3);
    }

    #[test]
    fn test_parse_mixed_deduplicates() {
        let targets = parse_targets("192.168.1.1,192.168.1.1-192.168.1.2", 21).unwrap();
        assert_eq!(targets.len(), 2);
    }

    #[test]
    fn test_invalid_cidr() {
        assert!(parse_targets("192.168.1.0/99", 21).is_err());
    }

    #[test]
    fn test_invalid_port() {
        assert!(parse_targets("192.168.1.1:0", 21).is_err());
        assert!(parse_targets("192.168.1.1:ftp", 21).is_err());
    }

    #[test]
    fn test_large_range_rejected() {
        assert!(parse_targets("0.0.0.0-255.255.255.255", 21).is_err());
    }

    #[test]
    fn test_load_target_list() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# ftp servers").unwrap();
        writeln!(file, "10.0.0.1").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "10.0.0.2:2121").unwrap();

        let targets = load_target_list(file.path(), 21).unwrap();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[1].addr, v4(10, 0, 0, 2, 2121));
    }
}
