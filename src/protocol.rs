//! Random text wire protocol.
//!
//! ## Protocol Format
//!
//! ```text
//! Request:  <count: u64 LE><origin: u32 LE><bound: u32 LE>
//! Response: <status: u8> then, if status == 1, `count` text items
//!
//! Item (length-prefixed): <length: u32 LE><ASCII bytes>
//! Item (raw):             <ASCII bytes>
//! ```
//!
//! The header is read once per connection. There is no further client
//! traffic after it.
//!
//! Status `0` is sent when the header is short, fails to arrive within the
//! read timeout, or describes items longer than the server's `max_text_len`
//! (for example `bound > max_text_len + 1` in uniform mode). A request with
//! `count == 0` is never rejected for length.

use bytes::{BufMut, BytesMut};
use clap::ValueEnum;
use serde::Deserialize;
use std::fmt;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Status byte sent when the request was accepted.
pub const STATUS_ACCEPTED: u8 = 1;

/// Status byte sent when the request was rejected.
pub const STATUS_REJECTED: u8 = 0;

/// Size of the length prefix in front of each item.
pub const ITEM_PREFIX_LEN: usize = 4;

/// Decoded request header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
    /// Number of text items requested
    pub count: u64,
    /// Lower bound (inclusive) for text length
    pub origin: u32,
    /// Upper bound (exclusive) for text length
    pub bound: u32,
}

impl Request {
    /// Longest text this request can produce under `mode`.
    pub fn longest_text(&self, mode: LengthMode) -> u32 {
        match mode {
            LengthMode::Uniform if self.bound > self.origin => self.bound - 1,
            LengthMode::Uniform => self.origin,
            LengthMode::Legacy => self.bound.saturating_sub(1),
        }
    }

    /// Check the request against the server's text length limit.
    ///
    /// A request for zero items never produces text and is always valid.
    pub fn validate(&self, mode: LengthMode, max_text_len: u32) -> Result<(), RequestError> {
        if self.count == 0 {
            return Ok(());
        }

        let longest = self.longest_text(mode);
        if longest > max_text_len {
            return Err(RequestError::TextTooLong {
                longest,
                limit: max_text_len,
            });
        }

        Ok(())
    }
}

/// How an item's length is drawn from a request's `(origin, bound)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum LengthMode {
    /// Uniform in `[origin, bound)`; `origin` when the range is empty.
    #[default]
    Uniform,
    /// Uniform in `[0, bound)`, ignoring `origin`.
    Legacy,
}

/// How item boundaries are marked in the response stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Framing {
    /// Each item is preceded by its byte length as a `u32` LE.
    #[default]
    LengthPrefixed,
    /// Items are written back-to-back with no delimiter.
    Raw,
}

impl Framing {
    /// Append one framed item to `dst`.
    pub fn encode(&self, text: &[u8], dst: &mut BytesMut) {
        match self {
            Framing::LengthPrefixed => {
                dst.reserve(ITEM_PREFIX_LEN + text.len());
                dst.put_u32_le(text.len() as u32);
                dst.extend_from_slice(text);
            }
            Framing::Raw => dst.extend_from_slice(text),
        }
    }
}

/// Read the three header fields as separate exact reads.
///
/// A short read at any field surfaces as `UnexpectedEof`.
pub async fn read_request<R>(reader: &mut R) -> io::Result<Request>
where
    R: AsyncRead + Unpin,
{
    let count = reader.read_u64_le().await?;
    let origin = reader.read_u32_le().await?;
    let bound = reader.read_u32_le().await?;

    Ok(Request {
        count,
        origin,
        bound,
    })
}

/// Reasons a request is answered with `STATUS_REJECTED`.
#[derive(Debug)]
pub enum RequestError {
    /// Header read failed or ended early
    Io(io::Error),
    /// Header did not arrive within the read timeout
    TimedOut(Duration),
    /// Request could produce a text longer than the server allows
    TextTooLong { longest: u32, limit: u32 },
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestError::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                write!(f, "truncated request header")
            }
            RequestError::Io(e) => write!(f, "failed to read request header: {}", e),
            RequestError::TimedOut(after) => {
                write!(f, "request header not received within {:?}", after)
            }
            RequestError::TextTooLong { longest, limit } => {
                write!(f, "text length up to {} exceeds limit of {}", longest, limit)
            }
        }
    }
}

impl std::error::Error for RequestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RequestError::Io(e) => Some(e),
            _ => None,
        }
    }
}
