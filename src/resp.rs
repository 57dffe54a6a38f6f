use crate::error::Error;
use bytes::{Buf, BytesMut};
use std::io;

/// Largest bulk argument a client may send.
const MAX_BULK_LEN: usize = 512 * 1024 * 1024;
const MAX_MULTIBULK_LEN: usize = 1024 * 1024;
const MAX_INLINE_LEN: usize = 64 * 1024;

/// A RESP2 reply written back to the client.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// +OK\r\n
    Simple(String),
    /// -CODE message\r\n
    Error { code: &'static str, message: String },
    /// :1000\r\n
    Integer(i64),
    /// $6\r\nfoobar\r\n
    Bulk(Vec<u8>),
    /// $-1\r\n
    Nil,
    /// *2\r\n...
    Array(Vec<Reply>),
}

impl Reply {
    pub fn ok() -> Self {
        Reply::Simple("OK".to_string())
    }

    pub fn simple(s: impl Into<String>) -> Self {
        Reply::Simple(s.into())
    }

    pub fn error(code: &'static str, message: impl Into<String>) -> Self {
        Reply::Error {
            code,
            message: message.into(),
        }
    }

    pub fn bulk(data: impl Into<Vec<u8>>) -> Self {
        Reply::Bulk(data.into())
    }

    /// Integer 1 or 0.
    pub fn bool(b: bool) -> Self {
        Reply::Integer(i64::from(b))
    }

    /// Bulk string, or nil when absent.
    pub fn bulk_or_nil<T: Into<Vec<u8>>>(data: Option<T>) -> Self {
        data.map_or(Reply::Nil, |d| Reply::Bulk(d.into()))
    }

    /// Serialize this reply to RESP bytes.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write_to(&mut buf);
        buf
    }

    /// Write RESP bytes into the given buffer.
    pub fn write_to(&self, buf: &mut Vec<u8>) {
        match self {
            Reply::Simple(s) => {
                buf.push(b'+');
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(b"\r\n");
            }
            Reply::Error { code, message } => {
                buf.push(b'-');
                buf.extend_from_slice(code.as_bytes());
                buf.push(b' ');
                buf.extend_from_slice(message.as_bytes());
                buf.extend_from_slice(b"\r\n");
            }
            Reply::Integer(n) => {
                buf.push(b':');
                buf.extend_from_slice(n.to_string().as_bytes());
                buf.extend_from_slice(b"\r\n");
            }
            Reply::Bulk(data) => {
                buf.push(b'$');
                buf.extend_from_slice(data.len().to_string().as_bytes());
                buf.extend_from_slice(b"\r\n");
                buf.extend_from_slice(data);
                buf.extend_from_slice(b"\r\n");
            }
            Reply::Nil => buf.extend_from_slice(b"$-1\r\n"),
            Reply::Array(items) => {
                buf.push(b'*');
                buf.extend_from_slice(items.len().to_string().as_bytes());
                buf.extend_from_slice(b"\r\n");
                for item in items {
                    item.write_to(buf);
                }
            }
        }
    }
}

impl From<&Error> for Reply {
    fn from(err: &Error) -> Self {
        Reply::error(err.code(), err.to_string())
    }
}

/// Streaming request parser.
///
/// A request is either an array of bulk strings or an inline command line.
/// `parse` returns `Ok(None)` until a whole request is buffered and leaves
/// the buffer untouched in that case.
pub struct RequestParser;

impl RequestParser {
    /// Parse one request into its argument vector, consuming its bytes.
    pub fn parse(buf: &mut BytesMut) -> Result<Option<Vec<Vec<u8>>>, RespError> {
        if buf.is_empty() {
            return Ok(None);
        }
        let parsed = if buf[0] == b'*' {
            Self::parse_multibulk(buf)?
        } else {
            Self::parse_inline(buf)?
        };
        Ok(parsed.map(|(args, used)| {
            buf.advance(used);
            args
        }))
    }

    fn parse_multibulk(buf: &[u8]) -> Result<Option<(Vec<Vec<u8>>, usize)>, RespError> {
        let Some((count, mut pos)) = read_length(buf, 0)? else {
            return Ok(None);
        };
        if count <= 0 {
            return Ok(Some((Vec::new(), pos)));
        }
        let count = usize::try_from(count).unwrap_or(usize::MAX);
        if count > MAX_MULTIBULK_LEN {
            return Err(RespError::InvalidData("invalid multibulk length".into()));
        }

        let mut args = Vec::with_capacity(count);
        for _ in 0..count {
            let Some(&tag) = buf.get(pos) else {
                return Ok(None);
            };
            if tag != b'$' {
                return Err(RespError::InvalidByte(tag));
            }
            let Some((len, start)) = read_length(buf, pos)? else {
                return Ok(None);
            };
            let len = usize::try_from(len)
                .ok()
                .filter(|len| *len <= MAX_BULK_LEN)
                .ok_or_else(|| RespError::InvalidData("invalid bulk length".into()))?;
            let end = start + len;
            if buf.len() < end + 2 {
                return Ok(None);
            }
            if &buf[end..end + 2] != b"\r\n" {
                return Err(RespError::InvalidData(
                    "missing trailing CRLF after bulk string".into(),
                ));
            }
            args.push(buf[start..end].to_vec());
            pos = end + 2;
        }
        Ok(Some((args, pos)))
    }

    fn parse_inline(buf: &[u8]) -> Result<Option<(Vec<Vec<u8>>, usize)>, RespError> {
        let Some(end) = find_crlf(buf, 0) else {
            if buf.len() > MAX_INLINE_LEN {
                return Err(RespError::InvalidData("inline command too long".into()));
            }
            return Ok(None);
        };
        let line = String::from_utf8_lossy(&buf[..end]);
        let args = split_inline(&line)?
            .into_iter()
            .map(String::into_bytes)
            .collect();
        Ok(Some((args, end + 2)))
    }
}

/// Read a `<tag><number>\r\n` header at `pos`. Returns the number and the
/// position right after the header.
fn read_length(buf: &[u8], pos: usize) -> Result<Option<(i64, usize)>, RespError> {
    let Some(end) = find_crlf(buf, pos + 1) else {
        return Ok(None);
    };
    let n = std::str::from_utf8(&buf[pos + 1..end])
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| RespError::InvalidData("invalid length".into()))?;
    Ok(Some((n, end + 2)))
}

fn find_crlf(buf: &[u8], from: usize) -> Option<usize> {
    buf.get(from..)?
        .windows(2)
        .position(|w| w == b"\r\n")
        .map(|i| i + from)
}

/// Split an inline command into tokens, honoring single and double quotes.
fn split_inline(line: &str) -> Result<Vec<String>, RespError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut chars = line.chars();

    while let Some(ch) = chars.next() {
        match quote {
            Some('"') if ch == '\\' => match chars.next() {
                Some('n') => current.push('\n'),
                Some('r') => current.push('\r'),
                Some('t') => current.push('\t'),
                Some(other) => current.push(other),
                None => break,
            },
            Some(q) if ch == q => quote = None,
            Some(_) => current.push(ch),
            None if ch == '"' || ch == '\'' => quote = Some(ch),
            None if ch.is_whitespace() => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            None => current.push(ch),
        }
    }

    if quote.is_some() {
        return Err(RespError::InvalidData("unbalanced quotes in request".into()));
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    Ok(tokens)
}

#[derive(Debug, thiserror::Error)]
pub enum RespError {
    #[error("expected '$', got '{}'", *.0 as char)]
    InvalidByte(u8),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
