//! TCP transport for the matrix's serial-over-IP port.
//!
//! Commands are written terminated by `\r`. The reply is read line by line:
//! the first non-empty line must arrive within the command timeout, after
//! which lines are collected until the link stays quiet for the idle window.

use super::{Connector, Transport, parse_socket_url};
use crate::error::{MatrixError, Result};
use async_trait::async_trait;
use log::{debug, info, warn};
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;

/// Quiet period that ends a multi-line reply.
pub const DEFAULT_IDLE: Duration = Duration::from_millis(150);

struct Link {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Link {
    async fn open(host: &str, port: u16) -> io::Result<Self> {
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;
        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(read_half),
            writer: write_half,
        })
    }

    /// Throw away unsolicited bytes the matrix sent between exchanges.
    fn discard_stale(&mut self) {
        let buffered = self.reader.buffer().len();
        if buffered > 0 {
            self.reader.consume(buffered);
        }
        let mut scratch = [0u8; 256];
        while let Ok(n) = self.reader.get_ref().try_read(&mut scratch) {
            if n == 0 {
                break;
            }
            debug!("[Transport] Discarded {} stale bytes", n);
        }
    }

    async fn exchange(&mut self, command: &str, idle: Duration) -> io::Result<String> {
        self.discard_stale();

        self.writer.write_all(command.as_bytes()).await?;
        self.writer.write_all(b"\r").await?;
        self.writer.flush().await?;

        let mut reply = String::new();
        let mut line = String::new();

        // Wait (bounded by the caller's timeout) for the first real line.
        loop {
            line.clear();
            if self.reader.read_line(&mut line).await? == 0 {
                return Err(io::ErrorKind::UnexpectedEof.into());
            }
            if !line.trim().is_empty() {
                reply.push_str(line.trim_end());
                break;
            }
        }

        loop {
            line.clear();
            match tokio::time::timeout(idle, self.reader.read_line(&mut line)).await {
                Ok(Ok(0)) | Err(_) => break,
                Ok(Ok(_)) => {
                    let trimmed = line.trim_end();
                    if !trimmed.is_empty() {
                        reply.push_str("\r\n");
                        reply.push_str(trimmed);
                    }
                }
                Ok(Err(e)) => return Err(e),
            }
        }

        Ok(reply)
    }
}

/// One TCP connection to a matrix.
///
/// After a failed or timed-out exchange the socket is dropped and reopened
/// by the next command, so a late reply can never be read as the answer to
/// a later command.
pub struct TcpTransport {
    url: String,
    host: String,
    port: u16,
    link: Mutex<Option<Link>>,
    closed: AtomicBool,
    idle: Duration,
}

impl TcpTransport {
    /// Open a connection, failing with a connection error after `timeout`.
    pub async fn connect(url: &str, timeout: Duration, idle: Duration) -> Result<Self> {
        let (host, port) = parse_socket_url(url)?;
        let failed = |reason: String| MatrixError::Connection {
            url: url.to_string(),
            reason,
        };

        let link = tokio::time::timeout(timeout, Link::open(&host, port))
            .await
            .map_err(|_| failed(format!("timed out after {:?}", timeout)))?
            .map_err(|e| failed(e.to_string()))?;
        info!("[Transport] Connected to {}", url);

        Ok(Self {
            url: url.to_string(),
            host,
            port,
            link: Mutex::new(Some(link)),
            closed: AtomicBool::new(false),
            idle,
        })
    }

    async fn exchange_on(&self, slot: &mut Option<Link>, command: &str) -> io::Result<String> {
        if slot.is_none() {
            info!("[Transport] Reopening link to {}", self.url);
            *slot = Some(Link::open(&self.host, self.port).await?);
        }
        let Some(link) = slot.as_mut() else {
            return Err(io::ErrorKind::NotConnected.into());
        };
        link.exchange(command, self.idle).await
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&self, command: &str, timeout: Duration) -> Result<String> {
        let mut link = self.link.lock().await;
        if self.closed.load(Ordering::SeqCst) {
            return Err(MatrixError::command(command, "not connected"));
        }

        debug!("[Transport] {} <- {:?}", self.url, command);
        match tokio::time::timeout(timeout, self.exchange_on(&mut link, command)).await {
            Ok(Ok(reply)) => {
                debug!("[Transport] {} -> {:?}", self.url, reply);
                Ok(reply)
            }
            Ok(Err(e)) => {
                warn!("[Transport] Link to {} broken: {}", self.url, e);
                *link = None;
                Err(MatrixError::command(command, e.to_string()))
            }
            Err(_) => {
                warn!(
                    "[Transport] No reply from {} within {:?}, dropping link",
                    self.url, timeout
                );
                *link = None;
                Err(MatrixError::timeout(command, timeout))
            }
        }
    }

    async fn disconnect(&self) {
        let link = self.link.lock().await.take();
        self.closed.store(true, Ordering::SeqCst);
        if let Some(mut link) = link {
            if let Err(e) = link.writer.shutdown().await {
                warn!("[Transport] Error closing {}: {}", self.url, e);
            }
            info!("[Transport] Disconnected from {}", self.url);
        }
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }
}

/// Opens [`TcpTransport`]s.
pub struct TcpConnector {
    idle: Duration,
}

impl TcpConnector {
    pub fn new() -> Self {
        Self { idle: DEFAULT_IDLE }
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, url: &str, timeout: Duration) -> Result<Arc<dyn Transport>> {
        let transport = TcpTransport::connect(url, timeout, self.idle).await?;
        Ok(Arc::new(transport))
    }
}

/// Loopback stand-in for a matrix. Every accepted connection answers each
/// `\r`-terminated command with `reply(command)`; `None` stays silent.
#[cfg(test)]
pub(crate) async fn fake_matrix<F>(reply: F) -> String
where
    F: Fn(&str) -> Option<String> + Send + Sync + 'static,
{
    use tokio::net::TcpListener;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let reply = Arc::new(reply);
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let reply = reply.clone();
            tokio::spawn(serve_commands(socket, move |command| reply(command)));
        }
    });
    super::socket_url("127.0.0.1", addr.port())
}

#[cfg(test)]
async fn serve_commands<F>(mut socket: TcpStream, reply: F)
where
    F: Fn(&str) -> Option<String>,
{
    use tokio::io::AsyncReadExt;

    let mut pending = Vec::new();
    let mut buf = [0u8; 128];
    loop {
        let n = match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        pending.extend_from_slice(&buf[..n]);
        while let Some(pos) = pending.iter().position(|b| *b == b'\r') {
            let command = String::from_utf8_lossy(&pending[..pos]).to_string();
            pending.drain(..=pos);
            if let Some(text) = reply(&command)
                && socket.write_all(text.as_bytes()).await.is_err()
            {
                return;
            }
        }
    }
}
