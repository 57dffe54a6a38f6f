pub mod rkey;
pub mod rstring;
pub mod value;

use crate::error::Result;
use crate::store::record::KeyRecord;
use crate::store::tx::Tx;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};

/// The data type a key holds. Stored as an integer in `rkey.type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    String = 1,
    List = 2,
    Set = 3,
    Hash = 4,
    SortedSet = 5,
}

impl TypeTag {
    pub fn type_name(&self) -> &'static str {
        match self {
            TypeTag::String => "string",
            TypeTag::List => "list",
            TypeTag::Set => "set",
            TypeTag::Hash => "hash",
            TypeTag::SortedSet => "zset",
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(TypeTag::String),
            2 => Some(TypeTag::List),
            3 => Some(TypeTag::Set),
            4 => Some(TypeTag::Hash),
            5 => Some(TypeTag::SortedSet),
            _ => None,
        }
    }
}

impl ToSql for TypeTag {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(*self as i64))
    }
}

impl FromSql for TypeTag {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let code = value.as_i64()?;
        TypeTag::from_code(code).ok_or(FromSqlError::OutOfRange(code))
    }
}

/// A repository for one Redis data type, layered on a transaction.
///
/// Every typed repository shares the same rules: a live key of another type
/// is a `KeyType` error, an expired key is absent.
pub trait TypedRepo<'t> {
    const TAG: TypeTag;

    fn tx(&self) -> &'t Tx<'t>;

    /// Look up a live key of this repository's type.
    fn lookup(&self, key: &str) -> Result<Option<KeyRecord>> {
        self.tx().typed_key(key, Self::TAG)
    }
}
