use crate::error::{Error, Result};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use std::fmt;

/// A binary-safe string value as stored in the `rstring` table.
///
/// Numbers are kept in their decimal text form, the same way Redis keeps
/// them, so a value written by INCR reads back through GET unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Value(Vec<u8>);

impl Value {
    /// Maximum string size: 512 MB.
    pub const MAX_SIZE: usize = 512 * 1024 * 1024;

    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Value(data.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse as a signed 64-bit integer.
    pub fn as_i64(&self) -> Option<i64> {
        parse_i64(&self.0)
    }

    /// Parse as a float. NaN never parses.
    pub fn as_f64(&self) -> Option<f64> {
        parse_f64(&self.0)
    }

    pub fn to_i64(&self) -> Result<i64> {
        self.as_i64().ok_or(Error::NotInteger)
    }

    pub fn to_f64(&self) -> Result<f64> {
        self.as_f64().ok_or(Error::NotFloat)
    }

    /// Append data and return the new length.
    pub fn append(&mut self, data: &[u8]) -> Result<usize> {
        if self.0.len() + data.len() > Self::MAX_SIZE {
            return Err(Error::StringTooLong);
        }
        self.0.extend_from_slice(data);
        Ok(self.0.len())
    }

    /// Bytes between two inclusive offsets, negative offsets counting from the end.
    pub fn get_range(&self, start: i64, end: i64) -> &[u8] {
        let len = self.0.len() as i64;
        if len == 0 || (start < 0 && end < 0 && start > end) {
            return &[];
        }

        let mut s = if start < 0 { len + start } else { start };
        let mut e = if end < 0 { len + end } else { end };
        if s < 0 {
            s = 0;
        }
        if e < 0 {
            e = 0;
        }
        if e >= len {
            e = len - 1;
        }
        if s > e {
            return &[];
        }
        &self.0[s as usize..=e as usize]
    }

    /// Overwrite bytes starting at `offset`, zero-padding any gap.
    pub fn set_range(&mut self, offset: usize, data: &[u8]) -> Result<usize> {
        let needed = offset
            .checked_add(data.len())
            .filter(|n| *n <= Self::MAX_SIZE)
            .ok_or(Error::StringTooLong)?;
        if data.is_empty() {
            return Ok(self.0.len());
        }
        if needed > self.0.len() {
            self.0.resize(needed, 0);
        }
        self.0[offset..needed].copy_from_slice(data);
        Ok(self.0.len())
    }
}

impl From<Vec<u8>> for Value {
    fn from(data: Vec<u8>) -> Self {
        Value(data)
    }
}

impl From<&[u8]> for Value {
    fn from(data: &[u8]) -> Self {
        Value(data.to_vec())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value(s.as_bytes().to_vec())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value(s.into_bytes())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value(n.to_string().into_bytes())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value(format_float(n).into_bytes())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Borrowed(ValueRef::Blob(&self.0)))
    }
}

impl FromSql for Value {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Blob(b) | ValueRef::Text(b) => Ok(Value(b.to_vec())),
            ValueRef::Integer(n) => Ok(Value::from(n)),
            ValueRef::Real(n) => Ok(Value::from(n)),
            ValueRef::Null => Err(FromSqlError::InvalidType),
        }
    }
}

/// Strict decimal integer: an optional `-`, then digits with no leading zero.
/// Signs like `+5`, padding like `007`, `-0` and whitespace are all rejected.
pub fn parse_i64(bytes: &[u8]) -> Option<i64> {
    let digits = bytes.strip_prefix(b"-").unwrap_or(bytes);
    match digits {
        [] => return None,
        [b'0'] if digits.len() < bytes.len() => return None,
        [b'0', _, ..] => return None,
        _ => {}
    }
    if !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

/// Float with no surrounding whitespace. `inf` parses, NaN does not.
pub fn parse_f64(bytes: &[u8]) -> Option<f64> {
    let n = std::str::from_utf8(bytes).ok()?.parse::<f64>().ok()?;
    if n.is_nan() { None } else { Some(n) }
}

/// Significant digits kept when formatting floats. Past this, binary noise
/// such as the tail of `0.1 + 0.2` would show up in replies.
const FLOAT_DIGITS: usize = 15;

/// Format a float the way INCRBYFLOAT replies: plain decimal notation,
/// rounded to [`FLOAT_DIGITS`] significant digits, no trailing zeros.
pub fn format_float(n: f64) -> String {
    if n == 0.0 {
        return "0".to_string();
    }
    // `{:e}` yields a rounded mantissa like "3.00000000000000e-1".
    let sci = format!("{:.*e}", FLOAT_DIGITS - 1, n.abs());
    let Some((mantissa, exp)) = sci.split_once('e') else {
        return n.to_string();
    };
    let Ok(exp) = exp.parse::<i32>() else {
        return n.to_string();
    };
    let digits = mantissa.replace('.', "");

    let point = exp + 1;
    let mut out = String::with_capacity(digits.len() + point.unsigned_abs() as usize + 3);
    if n < 0.0 {
        out.push('-');
    }
    if point <= 0 {
        out.push_str("0.");
        out.extend(std::iter::repeat_n('0', point.unsigned_abs() as usize));
        out.push_str(&digits);
    } else if point as usize >= digits.len() {
        out.push_str(&digits);
        out.extend(std::iter::repeat_n('0', point as usize - digits.len()));
    } else {
        let (int, frac) = digits.split_at(point as usize);
        out.push_str(int);
        out.push('.');
        out.push_str(frac);
    }

    if out.contains('.') {
        out.truncate(out.trim_end_matches('0').trim_end_matches('.').len());
    }
    out
}
