use crate::error::{Error, Result};
use crate::glob;
use crate::store::record::{Expiry, KeyRecord, now_millis};
use crate::types::TypeTag;
use rusqlite::{Connection, OptionalExtension, Transaction, params};

const SQL_GET_KEY: &str = "
    select id, key, type, version, etime, mtime from rkey
    where key = ?1 and (etime is null or etime > ?2)";

const SQL_PURGE_KEY: &str = "delete from rkey where key = ?1 and etime <= ?2";

// The `where` on the update branch keeps a live key from changing type:
// on a mismatch no row is touched and nothing is returned.
const SQL_PUT_KEY: &str = "
    insert into rkey (key, type, version, etime, mtime)
    values (?1, ?2, 1, ?3, ?4)
    on conflict (key) do update set
        version = version + 1,
        etime = excluded.etime,
        mtime = excluded.mtime
    where type = excluded.type
    returning id";

const SQL_PUT_KEY_KEEP_TTL: &str = "
    insert into rkey (key, type, version, etime, mtime)
    values (?1, ?2, 1, null, ?3)
    on conflict (key) do update set
        version = version + 1,
        mtime = excluded.mtime
    where type = excluded.type
    returning id";

const SQL_DELETE_KEY: &str = "delete from rkey where key = ?1 returning etime";

const SQL_SET_EXPIRY: &str = "
    update rkey set etime = ?2, version = version + 1, mtime = ?3
    where key = ?1 and (etime is null or etime > ?3)";

const SQL_LEN: &str = "select count(*) from rkey where etime is null or etime > ?1";

const SQL_KEYS: &str = "
    select key from rkey
    where etime is null or etime > ?1
    order by id";

const SQL_DELETE_EXPIRED: &str = "
    delete from rkey where id in (
        select id from rkey where etime <= ?1 limit ?2
    )";

/// One backing-store transaction, scoped to a single command.
///
/// The clock is read once when the transaction starts, so every lookup and
/// write in it agrees on which keys have expired.
pub struct Tx<'c> {
    inner: Transaction<'c>,
    now: i64,
}

impl<'c> Tx<'c> {
    pub(crate) fn new(inner: Transaction<'c>) -> Self {
        Tx {
            inner,
            now: now_millis(),
        }
    }

    /// The transaction's clock reading, in milliseconds since UNIX epoch.
    pub fn now(&self) -> i64 {
        self.now
    }

    /// The raw connection, for repositories that own their value tables.
    pub fn conn(&self) -> &Connection {
        &self.inner
    }

    pub(crate) fn commit(self) -> Result<()> {
        self.inner.commit()?;
        Ok(())
    }

    pub(crate) fn rollback(self) -> Result<()> {
        self.inner.rollback()?;
        Ok(())
    }

    /// Look up a live key. Expired records read as absent.
    pub fn key(&self, key: &str) -> Result<Option<KeyRecord>> {
        let mut stmt = self.inner.prepare_cached(SQL_GET_KEY)?;
        let rec = stmt
            .query_row(params![key, self.now], KeyRecord::from_row)
            .optional()?;
        Ok(rec)
    }

    /// Look up a live key that must hold `tag`.
    pub fn typed_key(&self, key: &str, tag: TypeTag) -> Result<Option<KeyRecord>> {
        match self.key(key)? {
            Some(rec) if rec.kind != tag => Err(Error::KeyType),
            other => Ok(other),
        }
    }

    /// Create or update a key of type `tag` and return its record id.
    ///
    /// An expired record under the same name is purged first, along with its
    /// value rows. Fails with `KeyType` if a live key holds another type.
    pub fn put_key(&self, key: &str, tag: TypeTag, expiry: Expiry) -> Result<i64> {
        self.inner
            .prepare_cached(SQL_PURGE_KEY)?
            .execute(params![key, self.now])?;

        let id: Option<i64> = match expiry {
            Expiry::Keep => self
                .inner
                .prepare_cached(SQL_PUT_KEY_KEEP_TTL)?
                .query_row(params![key, tag, self.now], |row| row.get(0))
                .optional()?,
            Expiry::Persist | Expiry::At(_) => {
                let etime = match expiry {
                    Expiry::At(at) => Some(at),
                    _ => None,
                };
                self.inner
                    .prepare_cached(SQL_PUT_KEY)?
                    .query_row(params![key, tag, etime, self.now], |row| row.get(0))
                    .optional()?
            }
        };
        id.ok_or(Error::KeyType)
    }

    /// Delete keys. Returns how many of them were live.
    pub fn delete<K: AsRef<str>>(&self, keys: &[K]) -> Result<usize> {
        let mut stmt = self.inner.prepare_cached(SQL_DELETE_KEY)?;
        let mut count = 0;
        for key in keys {
            let etime: Option<Option<i64>> = stmt
                .query_row(params![key.as_ref()], |row| row.get(0))
                .optional()?;
            if let Some(etime) = etime {
                if etime.is_none_or(|exp| exp > self.now) {
                    count += 1;
                }
            }
        }
        Ok(count)
    }

    /// Count live keys. A key named twice is counted twice.
    pub fn count<K: AsRef<str>>(&self, keys: &[K]) -> Result<usize> {
        let mut count = 0;
        for key in keys {
            if self.key(key.as_ref())?.is_some() {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Change the expiry of a live key. Returns false if the key is absent.
    pub fn set_expiry(&self, key: &str, expiry: Expiry) -> Result<bool> {
        let etime = match expiry {
            Expiry::Keep => return Ok(self.key(key)?.is_some()),
            Expiry::Persist => None,
            Expiry::At(at) => Some(at),
        };
        let changed = self
            .inner
            .prepare_cached(SQL_SET_EXPIRY)?
            .execute(params![key, etime, self.now])?;
        Ok(changed > 0)
    }

    /// Number of live keys.
    pub fn len(&self) -> Result<usize> {
        let n: i64 = self
            .inner
            .prepare_cached(SQL_LEN)?
            .query_row(params![self.now], |row| row.get(0))?;
        Ok(n as usize)
    }

    /// Live keys matching a glob pattern.
    pub fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut stmt = self.inner.prepare_cached(SQL_KEYS)?;
        let rows = stmt.query_map(params![self.now], |row| row.get::<_, String>(0))?;
        let mut keys = Vec::new();
        for key in rows {
            let key = key?;
            if glob::matches(pattern, &key) {
                keys.push(key);
            }
        }
        Ok(keys)
    }

    /// Delete every key.
    pub fn flush(&self) -> Result<()> {
        self.inner.execute("delete from rkey", [])?;
        Ok(())
    }

    /// Physically remove up to `limit` expired records.
    pub fn delete_expired(&self, limit: usize) -> Result<usize> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let n = self
            .inner
            .prepare_cached(SQL_DELETE_EXPIRED)?
            .execute(params![self.now, limit])?;
        Ok(n)
    }
}
