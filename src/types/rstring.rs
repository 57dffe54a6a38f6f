use crate::error::{Error, Result};
use crate::store::record::{Expiry, KeyRecord};
use crate::store::tx::Tx;
use crate::types::value::Value;
use crate::types::{TypeTag, TypedRepo};
use rusqlite::params;
use std::collections::HashMap;
use std::time::Duration;

const SQL_GET_VALUE: &str = "select value from rstring where kid = ?1";

const SQL_SET_VALUE: &str = "
    insert into rstring (kid, value) values (?1, ?2)
    on conflict (kid) do update set value = excluded.value";

/// When a conditional write is allowed to happen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SetCondition {
    #[default]
    Always,
    IfExists,
    IfNotExists,
}

/// What a write does to the key's TTL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SetTtl {
    #[default]
    Clear,
    /// Expire after a duration; zero means no expiry.
    After(Duration),
    /// Expire at an instant, in milliseconds since UNIX epoch.
    At(i64),
    Keep,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
    pub condition: SetCondition,
    pub ttl: SetTtl,
    /// Return the previous value in `SetOut::prev`.
    pub get: bool,
}

impl SetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = SetTtl::After(ttl);
        self
    }

    pub fn at(mut self, at_millis: i64) -> Self {
        self.ttl = SetTtl::At(at_millis);
        self
    }

    pub fn keep_ttl(mut self) -> Self {
        self.ttl = SetTtl::Keep;
        self
    }

    pub fn if_exists(mut self) -> Self {
        self.condition = SetCondition::IfExists;
        self
    }

    pub fn if_not_exists(mut self) -> Self {
        self.condition = SetCondition::IfNotExists;
        self
    }

    pub fn get(mut self) -> Self {
        self.get = true;
        self
    }
}

/// Result of a conditional write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetOut {
    /// Previous value, when requested and the key existed.
    pub prev: Option<Value>,
    /// The key did not exist and was written.
    pub created: bool,
    /// The key existed and was overwritten.
    pub updated: bool,
}

/// String repository: the Redis string commands over one transaction.
pub struct StringRepo<'t> {
    tx: &'t Tx<'t>,
}

impl<'t> TypedRepo<'t> for StringRepo<'t> {
    const TAG: TypeTag = TypeTag::String;

    fn tx(&self) -> &'t Tx<'t> {
        self.tx
    }
}

impl<'t> StringRepo<'t> {
    pub fn new(tx: &'t Tx<'t>) -> Self {
        StringRepo { tx }
    }

    /// Value of the key. `NotFound` if absent or expired, `KeyType` if not a string.
    pub fn get(&self, key: &str) -> Result<Value> {
        self.current(key)?.ok_or(Error::NotFound)
    }

    /// Values of the keys that exist and hold strings. Other keys are left out.
    pub fn get_many<K: AsRef<str>>(&self, keys: &[K]) -> Result<HashMap<String, Value>> {
        let mut found = HashMap::with_capacity(keys.len());
        for key in keys {
            let key = key.as_ref();
            match self.tx.key(key)? {
                Some(rec) if rec.kind == Self::TAG => {
                    let value = self.value(&rec)?;
                    found.insert(key.to_string(), value);
                }
                _ => {}
            }
        }
        Ok(found)
    }

    /// Set the value and clear any TTL.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        self.write(key, &value.into(), Expiry::Persist)
    }

    /// Set the value with a TTL (zero means none), replacing any previous TTL.
    pub fn set_expires(&self, key: &str, value: impl Into<Value>, ttl: Duration) -> Result<()> {
        self.write(key, &value.into(), Expiry::after(ttl, self.tx.now()))
    }

    /// Set the value only if the key exists. Returns whether it was written.
    pub fn set_exists(&self, key: &str, value: impl Into<Value>, ttl: Duration) -> Result<bool> {
        let out = self.set_with(key, value, SetOptions::new().if_exists().ttl(ttl))?;
        Ok(out.updated)
    }

    /// Set the value only if the key does not exist. Returns whether it was written.
    pub fn set_not_exists(
        &self,
        key: &str,
        value: impl Into<Value>,
        ttl: Duration,
    ) -> Result<bool> {
        let out = self.set_with(key, value, SetOptions::new().if_not_exists().ttl(ttl))?;
        Ok(out.created)
    }

    /// General form of SET: condition, TTL handling and previous value.
    pub fn set_with(&self, key: &str, value: impl Into<Value>, opts: SetOptions) -> Result<SetOut> {
        let rec = self.lookup(key)?;
        let prev = match (&rec, opts.get) {
            (Some(rec), true) => Some(self.value(rec)?),
            _ => None,
        };

        let exists = rec.is_some();
        let allowed = match opts.condition {
            SetCondition::Always => true,
            SetCondition::IfExists => exists,
            SetCondition::IfNotExists => !exists,
        };
        if !allowed {
            return Ok(SetOut {
                prev,
                created: false,
                updated: false,
            });
        }

        let expiry = match opts.ttl {
            SetTtl::Clear => Expiry::Persist,
            SetTtl::After(ttl) => Expiry::after(ttl, self.tx.now()),
            SetTtl::At(at) => Expiry::At(at),
            SetTtl::Keep => Expiry::Keep,
        };
        self.write(key, &value.into(), expiry)?;
        Ok(SetOut {
            prev,
            created: !exists,
            updated: exists,
        })
    }

    /// Set every key, clearing TTLs. If any key holds another type, nothing is written.
    pub fn set_many(&self, items: &[(String, Value)]) -> Result<()> {
        for (key, _) in items {
            self.lookup(key)?;
        }
        for (key, value) in items {
            self.write(key, value, Expiry::Persist)?;
        }
        Ok(())
    }

    /// Set every key only if none of them exists. Returns whether the batch was written.
    pub fn set_many_nx(&self, items: &[(String, Value)]) -> Result<bool> {
        let keys: Vec<&str> = items.iter().map(|(key, _)| key.as_str()).collect();
        if self.tx.count(&keys)? > 0 {
            return Ok(false);
        }
        for (key, value) in items {
            self.write(key, value, Expiry::Persist)?;
        }
        Ok(true)
    }

    /// Replace the value and TTL, returning the previous value if any.
    pub fn get_set(
        &self,
        key: &str,
        value: impl Into<Value>,
        ttl: Duration,
    ) -> Result<Option<Value>> {
        let prev = self.current(key)?;
        self.write(key, &value.into(), Expiry::after(ttl, self.tx.now()))?;
        Ok(prev)
    }

    /// Add `delta` to an integer value; an absent key counts as 0. TTL is kept.
    pub fn incr(&self, key: &str, delta: i64) -> Result<i64> {
        let current = match self.current(key)? {
            Some(value) => value.to_i64()?,
            None => 0,
        };
        let next = current.checked_add(delta).ok_or(Error::Overflow)?;
        self.write(key, &Value::from(next), Expiry::Keep)?;
        Ok(next)
    }

    /// Add `delta` to a float value; an absent key counts as 0. TTL is kept.
    pub fn incr_float(&self, key: &str, delta: f64) -> Result<f64> {
        let current = match self.current(key)? {
            Some(value) => value.to_f64()?,
            None => 0.0,
        };
        let next = current + delta;
        if !next.is_finite() {
            return Err(Error::NanOrInfinity);
        }
        self.write(key, &Value::from(next), Expiry::Keep)?;
        Ok(next)
    }

    /// Append to the value, creating the key if needed. Returns the new length.
    pub fn append(&self, key: &str, data: &[u8]) -> Result<usize> {
        let mut value = self.current(key)?.unwrap_or_default();
        let len = value.append(data)?;
        self.write(key, &value, Expiry::Keep)?;
        Ok(len)
    }

    pub fn strlen(&self, key: &str) -> Result<usize> {
        Ok(self.current(key)?.map_or(0, |v| v.len()))
    }

    pub fn get_range(&self, key: &str, start: i64, end: i64) -> Result<Value> {
        Ok(self
            .current(key)?
            .map(|v| Value::from(v.get_range(start, end)))
            .unwrap_or_default())
    }

    /// Overwrite part of the value at `offset`. Returns the new length.
    pub fn set_range(&self, key: &str, offset: usize, data: &[u8]) -> Result<usize> {
        let current = self.current(key)?;
        if data.is_empty() {
            return Ok(current.map_or(0, |v| v.len()));
        }
        let mut value = current.unwrap_or_default();
        let len = value.set_range(offset, data)?;
        self.write(key, &value, Expiry::Keep)?;
        Ok(len)
    }

    /// Delete the key and return its value.
    pub fn get_del(&self, key: &str) -> Result<Option<Value>> {
        let prev = self.current(key)?;
        if prev.is_some() {
            self.tx.delete(&[key])?;
        }
        Ok(prev)
    }

    fn current(&self, key: &str) -> Result<Option<Value>> {
        match self.lookup(key)? {
            Some(rec) => Ok(Some(self.value(&rec)?)),
            None => Ok(None),
        }
    }

    fn value(&self, rec: &KeyRecord) -> Result<Value> {
        let value = self
            .tx
            .conn()
            .prepare_cached(SQL_GET_VALUE)?
            .query_row(params![rec.id], |row| row.get(0))?;
        Ok(value)
    }

    fn write(&self, key: &str, value: &Value, expiry: Expiry) -> Result<()> {
        let kid = self.tx.put_key(key, Self::TAG, expiry)?;
        self.tx
            .conn()
            .prepare_cached(SQL_SET_VALUE)?
            .execute(params![kid, value])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::store::Store;
    use std::sync::{Arc, Barrier};

    fn update<T>(store: &Store, f: impl FnOnce(&StringRepo<'_>) -> Result<T>) -> Result<T> {
        store.update(|tx| f(&StringRepo::new(tx)))
    }

    fn items(pairs: &[(&str, &str)]) -> Vec<(String, Value)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Value::from(*v)))
            .collect()
    }

    fn put_hash(store: &Store, key: &str) {
        store
            .update(|tx| tx.put_key(key, TypeTag::Hash, Expiry::Persist))
            .unwrap();
    }

    fn expires_at(store: &Store, key: &str) -> Option<i64> {
        store.view(|tx| tx.key(key)).unwrap().unwrap().expires_at
    }

    #[test]
    fn test_get_missing_key() {
        let store = Store::open_memory().unwrap();
        let err = update(&store, |s| s.get("never")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_set_get() {
        let store = Store::open_memory().unwrap();
        let value = update(&store, |s| {
            s.set("name", "alice")?;
            s.get("name")
        })
        .unwrap();
        assert_eq!(value, Value::from("alice"));
    }

    #[test]
    fn test_wrong_type() {
        let store = Store::open_memory().unwrap();
        put_hash(&store, "h");
        for result in [
            update(&store, |s| s.get("h").map(|_| ())),
            update(&store, |s| s.set("h", "v")),
            update(&store, |s| s.set_exists("h", "v", Duration::ZERO).map(|_| ())),
            update(&store, |s| s.get_set("h", "v", Duration::ZERO).map(|_| ())),
            update(&store, |s| s.incr("h", 1).map(|_| ())),
            update(&store, |s| s.incr_float("h", 1.0).map(|_| ())),
        ] {
            assert_eq!(result.unwrap_err().kind(), ErrorKind::KeyType);
        }
    }

    #[test]
    fn test_set_not_exists_twice() {
        let store = Store::open_memory().unwrap();
        let first = update(&store, |s| s.set_not_exists("k", "v1", Duration::ZERO)).unwrap();
        let second = update(&store, |s| s.set_not_exists("k", "v2", Duration::ZERO)).unwrap();
        assert!(first);
        assert!(!second);
        assert_eq!(update(&store, |s| s.get("k")).unwrap(), Value::from("v1"));
    }

    #[test]
    fn test_set_exists() {
        let store = Store::open_memory().unwrap();
        assert!(!update(&store, |s| s.set_exists("k", "v", Duration::ZERO)).unwrap());
        assert!(update(&store, |s| s.get("k")).is_err());

        update(&store, |s| s.set("k", "old")).unwrap();
        let written =
            update(&store, |s| s.set_exists("k", "new", Duration::from_secs(60))).unwrap();
        assert!(written);
        assert_eq!(update(&store, |s| s.get("k")).unwrap(), Value::from("new"));
        assert!(expires_at(&store, "k").is_some());
    }

    #[test]
    fn test_set_expires_zero_ttl_persists() {
        let store = Store::open_memory().unwrap();
        update(&store, |s| s.set_expires("k", "v", Duration::from_secs(10))).unwrap();
        assert!(expires_at(&store, "k").is_some());
        update(&store, |s| s.set_expires("k", "v", Duration::ZERO)).unwrap();
        assert_eq!(expires_at(&store, "k"), None);
    }

    #[test]
    fn test_get_set_on_unset_key() {
        let store = Store::open_memory().unwrap();
        let prev = update(&store, |s| s.get_set("k", "v", Duration::ZERO)).unwrap();
        assert_eq!(prev, None);
        assert_eq!(update(&store, |s| s.get("k")).unwrap(), Value::from("v"));
        assert_eq!(expires_at(&store, "k"), None);

        let prev = update(&store, |s| s.get_set("k", "w", Duration::ZERO)).unwrap();
        assert_eq!(prev, Some(Value::from("v")));
    }

    #[test]
    fn test_incr() {
        let store = Store::open_memory().unwrap();
        assert_eq!(update(&store, |s| s.incr("n", 5)).unwrap(), 5);
        assert_eq!(update(&store, |s| s.incr("n", -2)).unwrap(), 3);
        assert_eq!(update(&store, |s| s.get("n")).unwrap(), Value::from("3"));
    }

    #[test]
    fn test_incr_non_numeric_leaves_value() {
        let store = Store::open_memory().unwrap();
        update(&store, |s| s.set("k", "hello")).unwrap();
        let err = update(&store, |s| s.incr("k", 1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueType);
        assert_eq!(update(&store, |s| s.get("k")).unwrap(), Value::from("hello"));
    }

    #[test]
    fn test_incr_overflow() {
        let store = Store::open_memory().unwrap();
        update(&store, |s| s.set("k", i64::MAX)).unwrap();
        let err = update(&store, |s| s.incr("k", 1)).unwrap_err();
        assert!(matches!(err, Error::Overflow));
        assert_eq!(err.kind(), ErrorKind::ValueType);
        assert_eq!(update(&store, |s| s.get("k")).unwrap(), Value::from(i64::MAX));
    }

    #[test]
    fn test_incr_keeps_ttl() {
        let store = Store::open_memory().unwrap();
        update(&store, |s| s.set_expires("n", "1", Duration::from_secs(60))).unwrap();
        let before = expires_at(&store, "n");
        update(&store, |s| s.incr("n", 1)).unwrap();
        assert_eq!(expires_at(&store, "n"), before);
    }

    #[test]
    fn test_incr_float() {
        let store = Store::open_memory().unwrap();
        update(&store, |s| s.set("f", "10.5")).unwrap();
        assert_eq!(update(&store, |s| s.incr_float("f", 0.1)).unwrap(), 10.6);
        assert_eq!(update(&store, |s| s.incr_float("new", 2.5)).unwrap(), 2.5);

        update(&store, |s| s.set("bad", "abc")).unwrap();
        let err = update(&store, |s| s.incr_float("bad", 1.0)).unwrap_err();
        assert!(matches!(err, Error::NotFloat));

        update(&store, |s| s.set("big", "1.7e308")).unwrap();
        let err = update(&store, |s| s.incr_float("big", 1.7e308)).unwrap_err();
        assert!(matches!(err, Error::NanOrInfinity));
    }

    #[test]
    fn test_get_many() {
        let store = Store::open_memory().unwrap();
        put_hash(&store, "h");
        let found = update(&store, |s| {
            s.set("a", "1")?;
            s.set("b", "2")?;
            s.get_many(&["a", "b", "h", "missing"])
        })
        .unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found["a"], Value::from("1"));
        assert_eq!(found["b"], Value::from("2"));
    }

    #[test]
    fn test_set_many_clears_ttl() {
        let store = Store::open_memory().unwrap();
        update(&store, |s| s.set_expires("a", "old", Duration::from_secs(60))).unwrap();
        update(&store, |s| s.set_many(&items(&[("a", "1"), ("b", "2")]))).unwrap();
        assert_eq!(update(&store, |s| s.get("a")).unwrap(), Value::from("1"));
        assert_eq!(expires_at(&store, "a"), None);
        assert_eq!(expires_at(&store, "b"), None);
    }

    #[test]
    fn test_set_many_wrong_type_writes_nothing() {
        let store = Store::open_memory().unwrap();
        put_hash(&store, "h");
        let err = update(&store, |s| s.set_many(&items(&[("a", "1"), ("h", "2")]))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::KeyType);
        assert!(update(&store, |s| s.get("a")).is_err());
    }

    #[test]
    fn test_set_many_nx_all_or_nothing() {
        let store = Store::open_memory().unwrap();
        update(&store, |s| s.set("a", "old")).unwrap();
        let written = update(&store, |s| s.set_many_nx(&items(&[("a", "1"), ("b", "2")]))).unwrap();
        assert!(!written);
        assert_eq!(update(&store, |s| s.get("a")).unwrap(), Value::from("old"));
        assert_eq!(update(&store, |s| s.get("b")).unwrap_err().kind(), ErrorKind::NotFound);

        let written = update(&store, |s| s.set_many_nx(&items(&[("b", "2"), ("c", "3")]))).unwrap();
        assert!(written);
    }

    #[test]
    fn test_set_many_nx_concurrent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("race.db");
        let store = Store::open(path.to_str().unwrap()).unwrap();
        let barrier = Arc::new(Barrier::new(2));

        let batches = [
            items(&[("a", "1"), ("b", "1")]),
            items(&[("b", "2"), ("c", "2")]),
        ];
        let handles: Vec<_> = batches
            .iter()
            .cloned()
            .map(|batch| {
                let store = store.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    update(&store, |s| s.set_many_nx(&batch)).unwrap()
                })
            })
            .collect();
        let results: Vec<bool> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results.iter().filter(|ok| **ok).count(), 1);

        let winner = if results[0] { &batches[0] } else { &batches[1] };
        let keys = ["a", "b", "c"];
        let state = update(&store, |s| s.get_many(&keys)).unwrap();
        assert_eq!(state.len(), winner.len());
        for (key, value) in winner {
            assert_eq!(state.get(key), Some(value));
        }
    }

    #[test]
    fn test_expired_key_reads_as_absent() {
        let store = Store::open_memory().unwrap();
        store
            .update(|tx| {
                let past = Expiry::At(tx.now() - 1_000);
                let repo = StringRepo::new(tx);
                repo.write("s", &Value::from("41"), past)?;
                tx.put_key("h", TypeTag::Hash, past)?;
                Ok(())
            })
            .unwrap();

        assert_eq!(update(&store, |s| s.get("s")).unwrap_err().kind(), ErrorKind::NotFound);
        assert!(update(&store, |s| s.get_many(&["s"])).unwrap().is_empty());
        assert_eq!(update(&store, |s| s.incr("s", 1)).unwrap(), 1);
        assert_eq!(expires_at(&store, "s"), None);
        // The expired hash no longer claims the name.
        update(&store, |s| s.set("h", "now a string")).unwrap();
        assert_eq!(update(&store, |s| s.get("h")).unwrap(), Value::from("now a string"));
    }

    #[test]
    fn test_set_with_options() {
        let store = Store::open_memory().unwrap();
        let out = update(&store, |s| s.set_with("k", "v1", SetOptions::new().get())).unwrap();
        assert_eq!(out, SetOut { prev: None, created: true, updated: false });

        let out = update(&store, |s| {
            s.set_with("k", "v2", SetOptions::new().if_not_exists().get())
        })
        .unwrap();
        assert_eq!(out.prev, Some(Value::from("v1")));
        assert!(!out.created && !out.updated);

        update(&store, |s| s.set_with("k", "v3", SetOptions::new().ttl(Duration::from_secs(5))))
            .unwrap();
        let ttl = expires_at(&store, "k");
        assert!(ttl.is_some());
        update(&store, |s| s.set_with("k", "v4", SetOptions::new().keep_ttl())).unwrap();
        assert_eq!(expires_at(&store, "k"), ttl);
    }

    #[test]
    fn test_append_strlen_ranges() {
        let store = Store::open_memory().unwrap();
        assert_eq!(update(&store, |s| s.append("k", b"Hello")).unwrap(), 5);
        assert_eq!(update(&store, |s| s.append("k", b" World")).unwrap(), 11);
        assert_eq!(update(&store, |s| s.strlen("k")).unwrap(), 11);
        assert_eq!(update(&store, |s| s.strlen("missing")).unwrap(), 0);
        assert_eq!(
            update(&store, |s| s.get_range("k", -5, -1)).unwrap(),
            Value::from("World")
        );
        assert_eq!(update(&store, |s| s.set_range("k", 6, b"Redis")).unwrap(), 11);
        assert_eq!(update(&store, |s| s.get("k")).unwrap(), Value::from("Hello Redis"));
        assert_eq!(update(&store, |s| s.set_range("empty", 3, b"")).unwrap(), 0);
        assert!(update(&store, |s| s.get("empty")).is_err());
    }

    #[test]
    fn test_get_del() {
        let store = Store::open_memory().unwrap();
        update(&store, |s| s.set("k", "v")).unwrap();
        assert_eq!(update(&store, |s| s.get_del("k")).unwrap(), Some(Value::from("v")));
        assert_eq!(update(&store, |s| s.get_del("k")).unwrap(), None);
    }
}
