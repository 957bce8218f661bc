// Login, SYST and raw command helpers on top of a transport
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ScanResult;
use crate::scanner::transport::FtpTransport;

/// Commands whose reply spans several lines and must be drained in full.
pub const LONG_OUTPUT_COMMANDS: &[&str] = &["HELP", "FEAT", "STAT", "SITE HELP", "HELP SITE"];

pub fn is_long_output(command: &str) -> bool {
    LONG_OUTPUT_COMMANDS
        .iter()
        .any(|long| long.eq_ignore_ascii_case(command.trim()))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            user: "anonymous".to_string(),
            password: "anonymous@".to_string(),
        }
    }
}

/// Sends one command and reads its reply, draining long output when the
/// command is known to produce it.
pub async fn command<T: FtpTransport>(transport: &mut T, line: &str) -> ScanResult<String> {
    transport.send(line).await?;
    if is_long_output(line) {
        transport.read_multiline_reply().await
    } else {
        transport.read_reply().await
    }
}

/// USER/PASS exchange. Returns whether the server accepted the login.
pub async fn login<T: FtpTransport>(transport: &mut T, credentials: &Credentials) -> ScanResult<bool> {
    let reply = command(transport, &format!("USER {}", credentials.user)).await?;
    if reply.starts_with('2') {
        debug!("logged in without password: {}", reply.trim_end());
        return Ok(true);
    }

    let reply = command(transport, &format!("PASS {}", credentials.password)).await?;
    if reply.starts_with('2') {
        info!("login accepted: {}", reply.trim_end());
        Ok(true)
    } else {
        warn!("login as {} rejected: {}", credentials.user, reply.trim_end());
        Ok(false)
    }
}

/// Reported operating system type, `None` when SYST is refused.
pub async fn system_type<T: FtpTransport>(transport: &mut T) -> ScanResult<Option<String>> {
    let reply = command(transport, "SYST").await?;
    if reply.starts_with('5') {
        warn!("SYST command failed: {}", reply.trim_end());
        return Ok(None);
    }
    let text = reply.get(4..).unwrap_or("").trim_end().to_string();
    Ok(Some(text))
}

pub async fn quit<T: FtpTransport>(transport: &mut T) {
    if let Err(e) = command(transport, "QUIT").await {
        debug!("QUIT not acknowledged: {}", e);
    }
}
