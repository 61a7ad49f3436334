//! Per-connection session.
//!
//! A session owns one accepted stream and walks it through
//! `Connected -> (AwaitLine <-> Process)* -> Closing -> Closed`.
//! A line that fails to parse gets a DENY and the session keeps going; only
//! end-of-stream, an I/O error or cancellation ends it.

use crate::dispatch::Dispatcher;
use crate::protocol::{CompletionCode, Response};
use crate::protocol::{Command, ParseError};
use std::fmt;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::io::{AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use uuid::Uuid;

/// Longest accepted command line in bytes, line ending included.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

const INITIAL_LINE_CAPACITY: usize = 1024;

/// Unique identifier of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        SessionId(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SID-{}", self.0.simple())
    }
}

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepted, banner not yet sent.
    Connected,
    /// Waiting for the next line.
    AwaitLine,
    /// Handling a received line.
    Process,
    /// Releasing the stream.
    Closing,
    /// Terminal. No further I/O.
    Closed,
}

/// Why a session ended.
#[derive(Debug)]
pub enum CloseReason {
    /// The peer closed its side of the connection.
    PeerClosed,
    /// The server asked active sessions to stop.
    Cancelled,
    /// Reading or writing failed.
    Io(io::Error),
}

/// What happened over the lifetime of a session.
#[derive(Debug)]
pub struct SessionSummary {
    /// Lines processed, blank lines excluded.
    pub commands: u64,
    /// Responses sent with DENY.
    pub denied: u64,
    pub reason: CloseReason,
}

/// Outcome of a bounded line read.
enum ReadLine {
    Eof,
    Line,
    TooLong,
}

/// One client connection.
pub struct Session {
    id: SessionId,
    dispatcher: Arc<Dispatcher>,
    cancel: CancellationToken,
    state: SessionState,
    commands: u64,
    denied: u64,
}

impl Session {
    /// Create a session. Cancelling `cancel` closes the session while it
    /// waits for input or for the peer to take a response.
    pub fn new(dispatcher: Arc<Dispatcher>, cancel: CancellationToken) -> Self {
        Session {
            id: SessionId::new(),
            dispatcher,
            cancel,
            state: SessionState::Connected,
            commands: 0,
            denied: 0,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Serve `stream` until it closes, fails, or the session is cancelled.
    ///
    /// The stream is shut down and dropped on every exit path.
    pub async fn run<S>(mut self, stream: S) -> SessionSummary
    where
        S: AsyncRead + AsyncWrite,
    {
        let (reader, mut writer) = tokio::io::split(stream);
        let mut reader = BufReader::new(reader);

        let reason = match self.serve(&mut reader, &mut writer).await {
            Ok(reason) => reason,
            Err(e) => {
                warn!(error = %e, "Client connection error");
                CloseReason::Io(e)
            }
        };

        self.transition(SessionState::Closing);
        if let Err(e) = writer.shutdown().await {
            debug!(error = %e, "Error closing client connection");
        }
        drop(reader);
        drop(writer);
        self.transition(SessionState::Closed);

        SessionSummary {
            commands: self.commands,
            denied: self.denied,
            reason,
        }
    }

    async fn serve<R, W>(&mut self, reader: &mut R, writer: &mut W) -> io::Result<CloseReason>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let banner = format!("Welcome to TL1 Server - Session: {}\n", self.id);
        if !self.send(writer, banner.as_bytes()).await? {
            return Ok(CloseReason::Cancelled);
        }

        let mut buf = Vec::with_capacity(INITIAL_LINE_CAPACITY);

        loop {
            self.transition(SessionState::AwaitLine);
            buf.clear();

            let read = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(CloseReason::Cancelled),
                read = read_bounded_line(reader, &mut buf) => read?,
            };

            let response = match read {
                ReadLine::Eof => return Ok(CloseReason::PeerClosed),
                ReadLine::TooLong => {
                    self.transition(SessionState::Process);
                    warn!(limit = MAX_LINE_LENGTH, "Discarding oversized line");
                    self.commands += 1;
                    self.reject(&ParseError::LineTooLong {
                        limit: MAX_LINE_LENGTH,
                    })
                }
                ReadLine::Line => {
                    self.transition(SessionState::Process);
                    let line = String::from_utf8_lossy(&buf);
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    debug!(line, "Received");
                    self.process(line)
                }
            };

            if !self.send(writer, &response.encode()).await? {
                return Ok(CloseReason::Cancelled);
            }
        }
    }

    /// Write and flush `bytes`. Returns `false` if the session was cancelled
    /// before the peer took them all.
    async fn send<W>(&self, writer: &mut W, bytes: &[u8]) -> io::Result<bool>
    where
        W: AsyncWrite + Unpin,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Ok(false),
            written = async {
                writer.write_all(bytes).await?;
                writer.flush().await
            } => written.map(|()| true),
        }
    }

    /// Parse and dispatch one line.
    fn process(&mut self, line: &str) -> Response {
        self.commands += 1;
        match Command::parse(line) {
            Ok(command) => {
                trace!(verb = %command.verb, ctag = %command.ctag, "Dispatching");
                let response = self.dispatcher.dispatch(&command);
                if response.code == CompletionCode::Deny {
                    self.denied += 1;
                }
                response
            }
            Err(e) => {
                warn!(error = %e, "Parse error");
                self.reject(&e)
            }
        }
    }

    fn reject(&mut self, error: &ParseError) -> Response {
        self.denied += 1;
        Response::parse_failure(error)
    }

    fn transition(&mut self, next: SessionState) {
        trace!(from = ?self.state, to = ?next, "Session state");
        self.state = next;
    }
}

/// Read one line of at most [`MAX_LINE_LENGTH`] bytes into `buf`.
///
/// An oversized line is consumed up to and including its newline.
async fn read_bounded_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<ReadLine>
where
    R: AsyncBufRead + Unpin,
{
    let n = (&mut *reader)
        .take(MAX_LINE_LENGTH as u64)
        .read_until(b'\n', buf)
        .await?;

    if n == 0 {
        Ok(ReadLine::Eof)
    } else if n == MAX_LINE_LENGTH && buf.last() != Some(&b'\n') {
        discard_line(reader).await?;
        Ok(ReadLine::TooLong)
    } else {
        Ok(ReadLine::Line)
    }
}

/// Skip input through the next newline or end-of-stream.
async fn discard_line<R>(reader: &mut R) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(());
        }
        match available.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                reader.consume(pos + 1);
                return Ok(());
            }
            None => {
                let len = available.len();
                reader.consume(len);
            }
        }
    }
}
