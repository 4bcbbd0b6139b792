//! RESP2 codec.
//!
//! Requests are always sent as arrays of bulk strings. Replies are
//! decoded incrementally: `decode_frame` either returns one complete
//! frame and the number of bytes it used, or `InsufficientData` when the
//! buffer ends mid-frame and more bytes must be read first.
//!
//! # Wire Format
//!
//! ```text
//! +<text>\r\n                 simple string
//! -<text>\r\n                 error
//! :<integer>\r\n              integer
//! $<len>\r\n<bytes>\r\n       bulk string ($-1 is nil)
//! *<count>\r\n<frames...>     array (*-1 is nil)
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use ravel_core::{Command, Value};
use thiserror::Error;

/// Largest bulk string accepted (the server's own default limit).
pub const BULK_BYTES_MAX: usize = 512 * 1024 * 1024;

/// Largest element count accepted for one array.
pub const ARRAY_LEN_MAX: usize = 1 << 24;

/// Longest header line accepted before its terminator shows up.
pub const LINE_BYTES_MAX: usize = 64 * 1024;

/// Deepest array nesting accepted.
pub const NESTING_DEPTH_MAX: usize = 32;

const CRLF: &[u8] = b"\r\n";

/// Codec errors.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The buffer ends mid-frame.
    #[error("insufficient data: need {need} bytes, have {have}")]
    InsufficientData {
        /// Bytes needed, or a lower bound if the frame length is not yet known.
        need: usize,
        /// Bytes available.
        have: usize,
    },

    /// Unknown type marker.
    #[error("unknown frame type: {tag:#04x}")]
    UnknownFrameType {
        /// The unknown marker byte.
        tag: u8,
    },

    /// A length or integer field could not be parsed.
    #[error("invalid integer: {text:?}")]
    InvalidInteger {
        /// The offending field.
        text: String,
    },

    /// A frame exceeds a size limit.
    #[error("frame too large: {size} (max {max})")]
    FrameTooLarge {
        /// Declared or observed size.
        size: usize,
        /// The limit.
        max: usize,
    },

    /// Any other structural violation.
    #[error("malformed frame: {message}")]
    Malformed {
        /// What was wrong.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CodecError {
    /// Returns true if more input could complete the frame.
    #[must_use]
    pub const fn is_incomplete(&self) -> bool {
        matches!(self, Self::InsufficientData { .. })
    }
}

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// One RESP2 frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// `+OK`
    Simple(String),
    /// `-ERR ...`
    Error(String),
    /// `:42`
    Integer(i64),
    /// `$3 foo`, or `$-1` when `None`.
    Bulk(Option<Bytes>),
    /// `*2 ...`, or `*-1` when `None`.
    Array(Option<Vec<Frame>>),
}

impl Frame {
    /// Converts the frame into a reply value.
    ///
    /// # Errors
    ///
    /// Returns the error text if the frame, or any frame nested in it, is
    /// an error reply.
    pub fn into_reply(self) -> Result<Value, String> {
        match self {
            Self::Simple(text) => Ok(Value::Simple(text)),
            Self::Error(text) => Err(text),
            Self::Integer(n) => Ok(Value::Int(n)),
            Self::Bulk(Some(data)) => Ok(Value::Bulk(data)),
            Self::Bulk(None) | Self::Array(None) => Ok(Value::Nil),
            Self::Array(Some(items)) => items
                .into_iter()
                .map(Self::into_reply)
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
        }
    }
}

/// Encodes a command as an array of bulk strings.
#[must_use]
pub fn encode_command(command: &Command) -> Bytes {
    let args = command.args();
    let payload: usize = args.iter().map(Bytes::len).sum::<usize>() + command.name().len();
    let mut buf = BytesMut::with_capacity(payload + 16 * (args.len() + 2));

    put_header(&mut buf, b'*', args.len() + 1);
    put_bulk(&mut buf, command.name().as_bytes());
    for arg in args {
        put_bulk(&mut buf, arg);
    }
    buf.freeze()
}

/// Encodes any frame.
pub fn encode_frame(frame: &Frame, buf: &mut BytesMut) {
    match frame {
        Frame::Simple(text) => put_line(buf, b'+', text.as_bytes()),
        Frame::Error(text) => put_line(buf, b'-', text.as_bytes()),
        Frame::Integer(n) => put_line(buf, b':', n.to_string().as_bytes()),
        Frame::Bulk(Some(data)) => put_bulk(buf, data),
        Frame::Bulk(None) => put_line(buf, b'$', b"-1"),
        Frame::Array(Some(items)) => {
            put_header(buf, b'*', items.len());
            for item in items {
                encode_frame(item, buf);
            }
        }
        Frame::Array(None) => put_line(buf, b'*', b"-1"),
    }
}

/// Decodes one frame from the front of `data`.
///
/// Returns the frame and the number of bytes it occupied.
///
/// # Errors
///
/// Returns `InsufficientData` if `data` holds only part of a frame, and
/// another error if the bytes are not valid RESP2.
pub fn decode_frame(data: &[u8]) -> CodecResult<(Frame, usize)> {
    let mut pos = 0;
    let frame = decode_at(data, &mut pos, 0)?;
    Ok((frame, pos))
}

fn decode_at(data: &[u8], pos: &mut usize, depth: usize) -> CodecResult<Frame> {
    if depth > NESTING_DEPTH_MAX {
        return Err(CodecError::Malformed {
            message: format!("arrays nested deeper than {NESTING_DEPTH_MAX}"),
        });
    }

    let line = read_line(data, pos)?;
    let Some((&tag, body)) = line.split_first() else {
        return Err(CodecError::Malformed {
            message: "empty line".to_string(),
        });
    };

    match tag {
        b'+' => Ok(Frame::Simple(String::from_utf8_lossy(body).into_owned())),
        b'-' => Ok(Frame::Error(String::from_utf8_lossy(body).into_owned())),
        b':' => parse_integer(body).map(Frame::Integer),
        b'$' => {
            let Some(len) = parse_length(body, BULK_BYTES_MAX)? else {
                return Ok(Frame::Bulk(None));
            };
            let end = *pos + len;
            ensure_remaining(data, end + CRLF.len())?;
            if &data[end..end + CRLF.len()] != CRLF {
                return Err(CodecError::Malformed {
                    message: "bulk string not terminated by CRLF".to_string(),
                });
            }
            let bytes = Bytes::copy_from_slice(&data[*pos..end]);
            *pos = end + CRLF.len();
            Ok(Frame::Bulk(Some(bytes)))
        }
        b'*' => {
            let Some(count) = parse_length(body, ARRAY_LEN_MAX)? else {
                return Ok(Frame::Array(None));
            };
            // Every element takes at least three bytes; do not trust the
            // declared count for the allocation.
            let mut items = Vec::with_capacity(count.min(data.len().saturating_sub(*pos) / 3));
            for _ in 0..count {
                items.push(decode_at(data, pos, depth + 1)?);
            }
            Ok(Frame::Array(Some(items)))
        }
        other => Err(CodecError::UnknownFrameType { tag: other }),
    }
}

/// Returns the line starting at `pos` without its CRLF and moves past it.
fn read_line<'a>(data: &'a [u8], pos: &mut usize) -> CodecResult<&'a [u8]> {
    let rest = &data[*pos..];
    let Some(len) = rest.windows(CRLF.len()).position(|w| w == CRLF) else {
        if rest.len() > LINE_BYTES_MAX {
            return Err(CodecError::FrameTooLarge {
                size: rest.len(),
                max: LINE_BYTES_MAX,
            });
        }
        return Err(CodecError::InsufficientData {
            need: data.len() + 1,
            have: data.len(),
        });
    };
    let line = &rest[..len];
    *pos += len + CRLF.len();
    Ok(line)
}

fn parse_integer(text: &[u8]) -> CodecResult<i64> {
    std::str::from_utf8(text)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| CodecError::InvalidInteger {
            text: String::from_utf8_lossy(text).into_owned(),
        })
}

/// Parses a bulk or array length; `-1` means nil.
fn parse_length(text: &[u8], max: usize) -> CodecResult<Option<usize>> {
    let n = parse_integer(text)?;
    if n == -1 {
        return Ok(None);
    }
    let len = usize::try_from(n).map_err(|_| CodecError::InvalidInteger {
        text: n.to_string(),
    })?;
    if len > max {
        return Err(CodecError::FrameTooLarge { size: len, max });
    }
    Ok(Some(len))
}

fn ensure_remaining(data: &[u8], need: usize) -> CodecResult<()> {
    if data.len() < need {
        return Err(CodecError::InsufficientData {
            need,
            have: data.len(),
        });
    }
    Ok(())
}

fn put_line(buf: &mut BytesMut, tag: u8, body: &[u8]) {
    buf.put_u8(tag);
    buf.put_slice(body);
    buf.put_slice(CRLF);
}

fn put_header(buf: &mut BytesMut, tag: u8, len: usize) {
    put_line(buf, tag, len.to_string().as_bytes());
}

fn put_bulk(buf: &mut BytesMut, data: &[u8]) {
    put_header(buf, b'$', data.len());
    buf.put_slice(data);
    buf.put_slice(CRLF);
}
