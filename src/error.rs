/// Broad failure classes. Callers branch on these instead of on variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgNum,
    NotFound,
    KeyType,
    ValueType,
    Syntax,
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("wrong number of arguments for '{0}' command")]
    InvalidArgNum(String),

    #[error("no such key")]
    NotFound,

    #[error("Operation against a key holding the wrong kind of value")]
    KeyType,

    #[error("value is not an integer or out of range")]
    NotInteger,

    #[error("value is not a valid float")]
    NotFloat,

    #[error("increment or decrement would overflow")]
    Overflow,

    #[error("increment would produce NaN or Infinity")]
    NanOrInfinity,

    #[error("offset is out of range")]
    OffsetOutOfRange,

    #[error("string exceeds maximum allowed size (512MB)")]
    StringTooLong,

    #[error("syntax error")]
    Syntax,

    #[error("invalid expire time in '{0}' command")]
    InvalidExpire(String),

    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("internal error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidArgNum(_) => ErrorKind::InvalidArgNum,
            Error::NotFound => ErrorKind::NotFound,
            Error::KeyType => ErrorKind::KeyType,
            Error::NotInteger
            | Error::NotFloat
            | Error::Overflow
            | Error::NanOrInfinity
            | Error::OffsetOutOfRange => ErrorKind::ValueType,
            Error::StringTooLong
            | Error::Syntax
            | Error::InvalidExpire(_)
            | Error::UnknownCommand(_) => ErrorKind::Syntax,
            Error::Store(_) | Error::Io(_) => ErrorKind::Internal,
        }
    }

    /// Error prefix written on the wire ahead of the message.
    pub fn code(&self) -> &'static str {
        match self.kind() {
            ErrorKind::KeyType => "WRONGTYPE",
            _ => "ERR",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
