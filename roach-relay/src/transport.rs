//! Line-oriented duplex channels to participants
//!
//! Level 1 - Transport primitives
//!
//! A `Transport` is the only thing a protocol adapter knows about the
//! participant on the other end: send a line, receive a line before a
//! deadline, observe disconnects. Process pipes and TCP sockets both end
//! up as a `LineChannel`.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::error::{ConnectError, TransportError};

/// Lines buffered between the reader task and the adapter
const LINE_BUFFER: usize = 64;

#[async_trait]
pub trait Transport: Send {
    async fn send_line(&mut self, line: &str) -> Result<(), TransportError>;

    /// Next line, or `Timeout` once `deadline` passes. Trailing `\r` is stripped.
    async fn recv_line(&mut self, deadline: Instant) -> Result<String, TransportError> {
        tokio::time::timeout_at(deadline, self.next_line())
            .await
            .map_err(|_| TransportError::Timeout)?
    }

    /// Next line, however long it takes
    async fn next_line(&mut self) -> Result<String, TransportError>;

    /// A line that has already arrived, without waiting
    fn buffered_line(&mut self) -> Option<String>;

    /// Flips to `true` when the peer's output stream ends
    fn disconnect_signal(&self) -> watch::Receiver<bool>;

    async fn close(&mut self);
}

/// Transport over any async reader/writer pair.
///
/// A background task reads lines into a bounded channel so that a
/// closed stream is noticed even while nobody is waiting for a reply.
pub struct LineChannel {
    label: String,
    writer: Box<dyn AsyncWrite + Send + Unpin>,
    lines: mpsc::Receiver<String>,
    closed: watch::Receiver<bool>,
    reader: JoinHandle<()>,
    child: Option<Child>,
}

impl LineChannel {
    pub fn from_stream<R, W>(label: impl Into<String>, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let label = label.into();
        let (tx, lines) = mpsc::channel(LINE_BUFFER);
        let (closed_tx, closed) = watch::channel(false);

        let reader_label = label.clone();
        let reader = tokio::spawn(async move {
            let mut stream = BufReader::new(reader).lines();
            loop {
                match stream.next_line().await {
                    Ok(Some(line)) => {
                        trace!("{} -> {}", reader_label, line);
                        if tx.send(line).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        debug!("{}: end of stream", reader_label);
                        break;
                    }
                    Err(err) => {
                        warn!("{}: read failed: {}", reader_label, err);
                        break;
                    }
                }
            }
            let _ = closed_tx.send(true);
        });

        Self {
            label,
            writer: Box::new(writer),
            lines,
            closed,
            reader,
            child: None,
        }
    }

    /// Spawn an engine process and talk to it over stdin/stdout
    pub fn spawn_process(command: &str, args: &[String]) -> Result<Self, ConnectError> {
        let spawn_error = |reason: String| ConnectError::Spawn {
            command: command.to_string(),
            reason,
        };

        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| spawn_error(e.to_string()))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| spawn_error("stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| spawn_error("stdout not captured".to_string()))?;

        let label = match child.id() {
            Some(pid) => format!("{}[{}]", command, pid),
            None => command.to_string(),
        };
        let mut channel = Self::from_stream(label, stdout, stdin);
        channel.child = Some(child);
        Ok(channel)
    }

    pub async fn connect_tcp(addr: &str) -> Result<Self, ConnectError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| ConnectError::Connect {
                addr: addr.to_string(),
                reason: e.to_string(),
            })?;
        let _ = stream.set_nodelay(true);
        let (read_half, write_half) = stream.into_split();
        Ok(Self::from_stream(format!("tcp:{}", addr), read_half, write_half))
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

#[async_trait]
impl Transport for LineChannel {
    async fn send_line(&mut self, line: &str) -> Result<(), TransportError> {
        if *self.closed.borrow() {
            return Err(TransportError::Disconnected);
        }
        trace!("{} <- {}", self.label, line);

        let mut framed = String::with_capacity(line.len() + 1);
        framed.push_str(line);
        framed.push('\n');
        let written = async {
            self.writer.write_all(framed.as_bytes()).await?;
            self.writer.flush().await
        };
        written.await.map_err(|e| match e.kind() {
            std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted => TransportError::Disconnected,
            _ => TransportError::Io(e.to_string()),
        })
    }

    async fn next_line(&mut self) -> Result<String, TransportError> {
        self.lines
            .recv()
            .await
            .map(strip_cr)
            .ok_or(TransportError::Disconnected)
    }

    fn buffered_line(&mut self) -> Option<String> {
        self.lines.try_recv().ok().map(strip_cr)
    }

    fn disconnect_signal(&self) -> watch::Receiver<bool> {
        self.closed.clone()
    }

    async fn close(&mut self) {
        let _ = self.writer.shutdown().await;
        self.reader.abort();
        if let Some(child) = self.child.as_mut() {
            if let Err(err) = child.start_kill() {
                debug!("{}: kill failed: {}", self.label, err);
            }
        }
    }
}

fn strip_cr(mut line: String) -> String {
    if line.ends_with('\r') {
        line.pop();
    }
    line
}

impl Drop for LineChannel {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
