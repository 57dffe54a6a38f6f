use crate::types::TypeTag;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A row of the `rkey` table: one key, its type and its expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRecord {
    pub id: i64,
    pub key: String,
    pub kind: TypeTag,
    /// Bumped on every write to the key.
    pub version: i64,
    /// Expiry time as milliseconds since UNIX epoch. None = no expiry.
    pub expires_at: Option<i64>,
    /// Last write time as milliseconds since UNIX epoch.
    pub modified_at: i64,
}

impl KeyRecord {
    pub(crate) fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(KeyRecord {
            id: row.get(0)?,
            key: row.get(1)?,
            kind: row.get(2)?,
            version: row.get(3)?,
            expires_at: row.get(4)?,
            modified_at: row.get(5)?,
        })
    }

    /// Check if this record has expired at `now`.
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }

    /// Time-to-live in milliseconds, or -1 if no expiry, or -2 if expired.
    pub fn ttl_millis(&self, now: i64) -> i64 {
        match self.expires_at {
            None => -1,
            Some(exp) if now >= exp => -2,
            Some(exp) => exp - now,
        }
    }
}

/// How a write treats the key's expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// Clear any expiry.
    Persist,
    /// Expire at an absolute instant, in milliseconds since UNIX epoch.
    At(i64),
    /// Leave an existing key's expiry as it is; new keys get none.
    Keep,
}

impl Expiry {
    /// Expire `ttl` after `now`. A zero TTL means no expiry.
    pub fn after(ttl: Duration, now: i64) -> Self {
        if ttl.is_zero() {
            Expiry::Persist
        } else {
            let ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
            Expiry::At(now.saturating_add(ms))
        }
    }
}

/// Get current time in milliseconds since UNIX epoch.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
