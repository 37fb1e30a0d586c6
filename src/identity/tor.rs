//! Tor control-port client.
//!
//! Only the handful of commands needed for rotation are spoken:
//!
//! ```text
//! AUTHENTICATE "<password>"   -> 250 OK
//! SIGNAL NEWNYM               -> 250 OK
//! QUIT                        -> 250 closing connection
//! ```
//!
//! Each call to [`TorController::new_identity`] opens its own authenticated
//! session and closes it before returning, whatever the outcome.

use super::ProxyController;
use crate::errors::RotationError;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

/// Control-port client for a local Tor daemon.
#[derive(Clone)]
pub struct TorController {
    addr: String,
    password: String,
    timeout: Duration,
}

impl std::fmt::Debug for TorController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TorController")
            .field("addr", &self.addr)
            .field("password", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl TorController {
    pub fn new(addr: impl Into<String>, password: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            password: password.into(),
            timeout,
        }
    }
}

impl ProxyController for TorController {
    #[instrument(level = "info", skip_all, fields(addr = %self.addr))]
    async fn new_identity(&self) -> Result<(), RotationError> {
        let mut session = ControlSession::open(&self.addr, &self.password, self.timeout).await?;
        let result = session.command("SIGNAL NEWNYM").await.map(|_| ());
        session.close().await;
        if result.is_ok() {
            debug!("NEWNYM accepted");
        }
        result
    }
}

/// One authenticated control connection. Dropping it closes the socket.
struct ControlSession {
    stream: BufStream<TcpStream>,
    timeout: Duration,
}

impl ControlSession {
    async fn open(addr: &str, password: &str, limit: Duration) -> Result<Self, RotationError> {
        let tcp = timeout(limit, TcpStream::connect(addr))
            .await
            .map_err(|_| RotationError::Control(format!("connect to {addr} timed out")))?
            .map_err(|e| RotationError::Control(format!("connect to {addr}: {e}")))?;

        let mut session = Self {
            stream: BufStream::new(tcp),
            timeout: limit,
        };
        session
            .command(&format!("AUTHENTICATE {}", quote(password)))
            .await?;
        Ok(session)
    }

    /// Send one command line and read its reply; non-2xx replies are errors.
    async fn command(&mut self, line: &str) -> Result<String, RotationError> {
        let verb = line.split_whitespace().next().unwrap_or_default().to_string();
        timeout(self.timeout, self.exchange(line))
            .await
            .map_err(|_| RotationError::Control(format!("{verb} timed out")))?
            .and_then(|reply| {
                if reply.starts_with('2') {
                    Ok(reply)
                } else {
                    Err(RotationError::Control(format!("{verb} rejected: {reply}")))
                }
            })
    }

    async fn exchange(&mut self, line: &str) -> Result<String, RotationError> {
        let io = |e: std::io::Error| RotationError::Control(e.to_string());
        self.stream.write_all(line.as_bytes()).await.map_err(io)?;
        self.stream.write_all(b"\r\n").await.map_err(io)?;
        self.stream.flush().await.map_err(io)?;

        // Mid-reply lines are "250-..."; the final line is "250 ...".
        let mut reply = String::new();
        loop {
            let mut buf = String::new();
            let n = self.stream.read_line(&mut buf).await.map_err(io)?;
            if n == 0 {
                return Err(RotationError::Control("control connection closed".into()));
            }
            let text = buf.trim_end();
            if !reply.is_empty() {
                reply.push('\n');
            }
            reply.push_str(text);
            if text.len() < 4 || text.as_bytes()[3] == b' ' {
                return Ok(reply);
            }
        }
    }

    async fn close(mut self) {
        if let Err(e) = timeout(self.timeout, self.exchange("QUIT")).await {
            warn!(error = %e, "QUIT timed out; dropping control connection");
        }
    }
}

/// Quote a password as a control-protocol QuotedString.
fn quote(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 2);
    out.push('"');
    for c in raw.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}
