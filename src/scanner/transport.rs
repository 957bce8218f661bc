// Line-oriented FTP control connection
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, warn};

use crate::error::{ScanError, ScanResult};
use crate::scanner::session::{self, Credentials};

/// Request/response primitives the fingerprinting core drives.
///
/// Every call is a strictly sequential request-then-blocking-read pair.
/// After `TransportTimeout` or `ConnectionLost` the caller must call
/// `reconnect` before sending anything else.
#[async_trait]
pub trait FtpTransport: Send {
    async fn send(&mut self, line: &str) -> ScanResult<()>;

    /// Reads up to and including the terminating `DDD<space>` line and
    /// returns only that line.
    async fn read_reply(&mut self) -> ScanResult<String>;

    /// Reads a complete reply and returns every line of it.
    async fn read_multiline_reply(&mut self) -> ScanResult<String>;

    async fn reconnect(&mut self) -> ScanResult<()>;

    /// Credentials to replay after a reconnect, once login has succeeded.
    fn remember_credentials(&mut self, _credentials: &Credentials) {}
}

/// A reply line is final when it starts with a non-zero numeric code
/// immediately followed by whitespace.
pub fn is_final_line(line: &str) -> bool {
    let digits = line.bytes().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 {
        return false;
    }
    let code_is_nonzero = line[..digits].bytes().any(|b| b != b'0');
    let followed_by_space = line[digits..]
        .chars()
        .next()
        .map(|c| c.is_whitespace())
        .unwrap_or(false);
    code_is_nonzero && followed_by_space
}

pub struct TcpTransport {
    addr: SocketAddr,
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    connect_timeout: Duration,
    read_timeout: Duration,
    credentials: Option<Credentials>,
}

impl TcpTransport {
    /// Opens the control connection. The greeting is left unread so the
    /// caller can parse the banner.
    pub async fn connect(
        addr: SocketAddr,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> ScanResult<Self> {
        let (reader, writer) = Self::open(addr, connect_timeout).await?;
        Ok(Self {
            addr,
            reader,
            writer,
            connect_timeout,
            read_timeout,
            credentials: None,
        })
    }

    async fn open(
        addr: SocketAddr,
        connect_timeout: Duration,
    ) -> ScanResult<(BufReader<OwnedReadHalf>, OwnedWriteHalf)> {
        let stream = match timeout(connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(ScanError::Io(e)),
            Err(_) => return Err(ScanError::TransportTimeout),
        };
        stream.set_nodelay(true)?;
        let (read_half, write_half) = stream.into_split();
        Ok((BufReader::new(read_half), write_half))
    }

    async fn next_line(&mut self, deadline: Instant) -> ScanResult<String> {
        let mut raw = Vec::new();
        let n = match timeout_at(deadline, self.reader.read_until(b'\n', &mut raw)).await {
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                debug!("read from {} failed: {}", self.addr, e);
                return Err(ScanError::ConnectionLost);
            }
            Err(_) => return Err(ScanError::TransportTimeout),
        };
        if n == 0 {
            return Err(ScanError::ConnectionLost);
        }
        Ok(String::from_utf8_lossy(&raw).into_owned())
    }
}

#[async_trait]
impl FtpTransport for TcpTransport {
    async fn send(&mut self, line: &str) -> ScanResult<()> {
        let wire = format!("{}\r\n", line);
        let write = async {
            self.writer.write_all(wire.as_bytes()).await?;
            self.writer.flush().await
        };
        match timeout(self.read_timeout, write).await {
            Ok(Ok(())) => Ok(()),
            _ => Err(ScanError::ConnectionLost),
        }
    }

    async fn read_reply(&mut self) -> ScanResult<String> {
        let deadline = Instant::now() + self.read_timeout;
        loop {
            let line = self.next_line(deadline).await?;
            if is_final_line(&line) {
                return Ok(line);
            }
        }
    }

    async fn read_multiline_reply(&mut self) -> ScanResult<String> {
        let deadline = Instant::now() + self.read_timeout;
        let mut text = String::new();
        loop {
            let line = self.next_line(deadline).await?;
            let done = is_final_line(&line);
            text.push_str(&line);
            if done {
                return Ok(text);
            }
        }
    }

    fn remember_credentials(&mut self, credentials: &Credentials) {
        self.credentials = Some(credentials.clone());
    }

    async fn reconnect(&mut self) -> ScanResult<()> {
        warn!("reconnecting to {}", self.addr);
        let (reader, writer) = Self::open(self.addr, self.connect_timeout).await?;
        self.reader = reader;
        self.writer = writer;
        self.read_reply().await?;
        if let Some(credentials) = self.credentials.clone() {
            session::login(self, &credentials).await?;
        }
        Ok(())
    }
}

/// What a scripted server does in response to one command.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(String),
    Timeout,
    Drop,
}

/// In-memory FTP server stand-in. Replies are looked up by the exact
/// command line; unknown commands get the default reply.
pub struct ScriptedTransport {
    replies: HashMap<String, VecDeque<ScriptedReply>>,
    default_reply: String,
    pending: VecDeque<ScriptedReply>,
    sent: Vec<String>,
    reconnects: usize,
    refuse_reconnect: bool,
}

impl ScriptedTransport {
    pub fn new(greeting: &str) -> Self {
        let mut pending = VecDeque::new();
        pending.push_back(ScriptedReply::Text(greeting.to_string()));
        Self {
            replies: HashMap::new(),
            default_reply: "500 Unknown command.\r\n".to_string(),
            pending,
            sent: Vec::new(),
            reconnects: 0,
            refuse_reconnect: false,
        }
    }

    /// Queues one reply for `command`; repeated calls queue further replies
    /// that are consumed in order.
    pub fn on(mut self, command: &str, reply: &str) -> Self {
        self.push(command, ScriptedReply::Text(reply.to_string()));
        self
    }

    pub fn on_timeout(mut self, command: &str) -> Self {
        self.push(command, ScriptedReply::Timeout);
        self
    }

    pub fn on_drop(mut self, command: &str) -> Self {
        self.push(command, ScriptedReply::Drop);
        self
    }

    pub fn refusing_reconnect(mut self) -> Self {
        self.refuse_reconnect = true;
        self
    }

    /// Command lines received so far, in order.
    pub fn sent(&self) -> &[String] {
        &self.sent
    }

    pub fn reconnects(&self) -> usize {
        self.reconnects
    }

    fn push(&mut self, command: &str, reply: ScriptedReply) {
        self.replies
            .entry(command.to_string())
            .or_insert_with(VecDeque::new)
            .push_back(reply);
    }

    fn take_pending(&mut self) -> ScanResult<String> {
        match self.pending.pop_front() {
            Some(ScriptedReply::Text(text)) => Ok(text),
            Some(ScriptedReply::Timeout) | None => Err(ScanError::TransportTimeout),
            Some(ScriptedReply::Drop) => Err(ScanError::ConnectionLost),
        }
    }
}

#[async_trait]
impl FtpTransport for ScriptedTransport {
    async fn send(&mut self, line: &str) -> ScanResult<()> {
        self.sent.push(line.to_string());
        let scripted = self.replies.get_mut(line).and_then(|queue| queue.pop_front());
        let reply = match scripted {
            Some(reply) => reply,
            None => ScriptedReply::Text(self.default_reply.clone()),
        };
        self.pending.push_back(reply);
        Ok(())
    }

    async fn read_reply(&mut self) -> ScanResult<String> {
        let text = self.take_pending()?;
        text.split_inclusive('\n')
            .find(|line| is_final_line(line))
            .map(str::to_string)
            .ok_or(ScanError::TransportTimeout)
    }

    async fn read_multiline_reply(&mut self) -> ScanResult<String> {
        self.take_pending()
    }

    async fn reconnect(&mut self) -> ScanResult<()> {
        if self.refuse_reconnect {
            return Err(ScanError::ConnectionLost);
        }
        self.reconnects += 1;
        self.pending.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_final_line_detection() {
        assert!(is_final_line("220 (vsFTPd 3.0.3)\r\n"));
        assert!(is_final_line("214 Help OK.\r\n"));
        assert!(!is_final_line("214-The following commands are recognized.\r\n"));
        assert!(!is_final_line(" ABOR ACCT ALLO\r\n"));
        assert!(!is_final_line("000 zero code\r\n"));
        assert!(!is_final_line("220"));
    }

    #[tokio::test]
    async fn test_scripted_reply_returns_final_line() {
        let mut transport = ScriptedTransport::new("220 ready\r\n")
            .on("HELP", "214-Commands:\r\n USER PASS\r\n214 Help OK.\r\n");

        assert_eq!(transport.read_reply().await.unwrap(), "220 ready\r\n");
        transport.send("HELP").await.unwrap();
        assert_eq!(transport.read_reply().await.unwrap(), "214 Help OK.\r\n");
    }

    #[tokio::test]
    async fn test_scripted_multiline_returns_everything() {
        let mut transport = ScriptedTransport::new("220 ready\r\n")
            .on("FEAT", "211-Features:\r\n SIZE\r\n211 End\r\n");
        transport.read_reply().await.unwrap();

        transport.send("FEAT").await.unwrap();
        let text = transport.read_multiline_reply().await.unwrap();
        assert_eq!(text, "211-Features:\r\n SIZE\r\n211 End\r\n");
    }

    #[tokio::test]
    async fn test_scripted_timeout_and_reconnect() {
        let mut transport = ScriptedTransport::new("220 ready\r\n").on_timeout("NOOP");
        transport.read_reply().await.unwrap();

        transport.send("NOOP").await.unwrap();
        let err = transport.read_reply().await.unwrap_err();
        assert!(err.requires_reconnect());
        transport.reconnect().await.unwrap();
        assert_eq!(transport.reconnects(), 1);
        assert_eq!(transport.sent(), ["NOOP".to_string()]);
    }
}
