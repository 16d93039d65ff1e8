//! Per-connection request handling.
//!
//! A connection moves through `AwaitingHeader -> Validated -> Streaming ->
//! Closed`, or `AwaitingHeader -> Rejected -> Closed` when the header is
//! short, late, or asks for more text than the server allows.
//!
//! The handler owns the stream, so every return path drops (and therefore
//! closes) it.

use crate::config::Config;
use crate::generator::TextGenerator;
use crate::protocol::{
    read_request, Framing, LengthMode, RequestError, ITEM_PREFIX_LEN, STATUS_ACCEPTED,
    STATUS_REJECTED,
};
use bytes::BytesMut;
use std::fmt;
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::{debug, trace};

/// Settings shared read-only by every connection task.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub max_text_len: u32,
    pub length_mode: LengthMode,
    pub framing: Framing,
}

impl From<&Config> for ConnectionSettings {
    fn from(config: &Config) -> Self {
        Self {
            read_timeout: config.read_timeout,
            write_timeout: config.write_timeout,
            max_text_len: config.max_text_len,
            length_mode: config.length_mode,
            framing: config.framing,
        }
    }
}

/// How a connection ended.
#[derive(Debug)]
pub enum Outcome {
    /// All requested items were written
    Completed { items: u64 },
    /// The header was refused and a reject status sent
    Rejected(RequestError),
    /// A write failed or timed out after `items` items
    Aborted { items: u64, error: io::Error },
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Completed { items } => write!(f, "completed after {} items", items),
            Outcome::Rejected(reason) => write!(f, "rejected: {}", reason),
            Outcome::Aborted { items, error } => {
                write!(f, "aborted after {} items: {}", items, error)
            }
        }
    }
}

/// Serve one request on `stream` and close it.
pub async fn handle_connection<S>(
    mut stream: S,
    settings: &ConnectionSettings,
    generator: &mut TextGenerator,
) -> Outcome
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let outcome = serve(&mut stream, settings, generator).await;

    if let Err(e) = write_timed(settings.write_timeout, stream.shutdown()).await {
        trace!(error = %e, "Shutdown failed");
    }

    outcome
}

async fn serve<S>(
    stream: &mut S,
    settings: &ConnectionSettings,
    generator: &mut TextGenerator,
) -> Outcome
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let header = timeout(settings.read_timeout, read_request(stream)).await;
    let request = match header {
        Ok(Ok(request)) => request,
        Ok(Err(e)) => return reject(stream, settings, RequestError::Io(e)).await,
        Err(_) => {
            return reject(stream, settings, RequestError::TimedOut(settings.read_timeout)).await
        }
    };

    debug!(
        count = request.count,
        origin = request.origin,
        bound = request.bound,
        "Request received"
    );

    if let Err(reason) = request.validate(settings.length_mode, settings.max_text_len) {
        return reject(stream, settings, reason).await;
    }

    let status = [STATUS_ACCEPTED];
    if let Err(error) = write_timed(settings.write_timeout, stream.write_all(&status)).await {
        return Outcome::Aborted { items: 0, error };
    }

    let mut frame = BytesMut::with_capacity(ITEM_PREFIX_LEN + request.origin.min(4096) as usize);

    for sent in 0..request.count {
        let length = generator.next_length(request.origin, request.bound, settings.length_mode);
        let text = generator.generate(length as usize);

        frame.clear();
        settings.framing.encode(text.as_bytes(), &mut frame);

        if let Err(error) = write_timed(settings.write_timeout, stream.write_all(&frame)).await {
            return Outcome::Aborted { items: sent, error };
        }

        trace!(length, "Item sent");
    }

    Outcome::Completed {
        items: request.count,
    }
}

/// Send the reject status, ignoring write errors.
async fn reject<S>(stream: &mut S, settings: &ConnectionSettings, reason: RequestError) -> Outcome
where
    S: AsyncWrite + Unpin,
{
    let status = [STATUS_REJECTED];
    if let Err(e) = write_timed(settings.write_timeout, stream.write_all(&status)).await {
        trace!(error = %e, "Failed to send reject status");
    }

    Outcome::Rejected(reason)
}

/// Run a write operation under `limit`, mapping expiry to `TimedOut`.
async fn write_timed<F>(limit: Duration, op: F) -> io::Result<()>
where
    F: Future<Output = io::Result<()>>,
{
    match timeout(limit, op).await {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("write did not complete within {:?}", limit),
        )),
    }
}
