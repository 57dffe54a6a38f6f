use crate::error::Result;
use crate::store::record::Expiry;
use crate::store::tx::Tx;
use crate::types::TypeTag;
use std::time::Duration;

/// Remaining lifetime of a key, as reported by TTL/PTTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    Missing,
    Persistent,
    Remaining(i64),
}

impl KeyTtl {
    /// Redis encoding: -2 for a missing key, -1 for no expiry.
    pub fn millis(&self) -> i64 {
        match self {
            KeyTtl::Missing => -2,
            KeyTtl::Persistent => -1,
            KeyTtl::Remaining(ms) => *ms,
        }
    }

    /// Like `millis`, rounded to whole seconds.
    pub fn secs(&self) -> i64 {
        match self {
            KeyTtl::Remaining(ms) => (ms + 500) / 1000,
            other => other.millis(),
        }
    }
}

/// Type-agnostic key operations.
pub struct KeyRepo<'t> {
    tx: &'t Tx<'t>,
}

impl<'t> KeyRepo<'t> {
    pub fn new(tx: &'t Tx<'t>) -> Self {
        KeyRepo { tx }
    }

    pub fn exists<K: AsRef<str>>(&self, keys: &[K]) -> Result<usize> {
        self.tx.count(keys)
    }

    pub fn delete<K: AsRef<str>>(&self, keys: &[K]) -> Result<usize> {
        self.tx.delete(keys)
    }

    /// Expire the key `ttl` after now. A zero TTL expires it at once.
    pub fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        self.expire_at(key, self.tx.now().saturating_add(ms))
    }

    /// Expire the key at an instant in milliseconds since UNIX epoch.
    pub fn expire_at(&self, key: &str, at_millis: i64) -> Result<bool> {
        self.tx.set_expiry(key, Expiry::At(at_millis))
    }

    /// Remove the expiry. Returns false if the key is missing or had none.
    pub fn persist(&self, key: &str) -> Result<bool> {
        match self.tx.key(key)? {
            Some(rec) if rec.expires_at.is_some() => self.tx.set_expiry(key, Expiry::Persist),
            _ => Ok(false),
        }
    }

    pub fn ttl(&self, key: &str) -> Result<KeyTtl> {
        let ttl = match self.tx.key(key)? {
            None => KeyTtl::Missing,
            Some(rec) => match rec.ttl_millis(self.tx.now()) {
                -1 => KeyTtl::Persistent,
                ms => KeyTtl::Remaining(ms),
            },
        };
        Ok(ttl)
    }

    pub fn key_type(&self, key: &str) -> Result<Option<TypeTag>> {
        Ok(self.tx.key(key)?.map(|rec| rec.kind))
    }

    pub fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        self.tx.keys(pattern)
    }

    pub fn len(&self) -> Result<usize> {
        self.tx.len()
    }

    pub fn flush(&self) -> Result<()> {
        self.tx.flush()
    }

    pub fn delete_expired(&self, limit: usize) -> Result<usize> {
        self.tx.delete_expired(limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use crate::types::rstring::StringRepo;

    fn update<T>(store: &Store, f: impl FnOnce(&KeyRepo<'_>) -> Result<T>) -> Result<T> {
        store.update(|tx| f(&KeyRepo::new(tx)))
    }

    fn seed(store: &Store, keys: &[&str]) {
        store
            .update(|tx| {
                let strings = StringRepo::new(tx);
                for key in keys {
                    strings.set(key, "v")?;
                }
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_exists_and_delete() {
        let store = Store::open_memory().unwrap();
        seed(&store, &["a", "b"]);
        assert_eq!(update(&store, |k| k.exists(&["a", "a", "zz"])).unwrap(), 2);
        assert_eq!(update(&store, |k| k.delete(&["a", "zz"])).unwrap(), 1);
        assert_eq!(update(&store, |k| k.exists(&["a"])).unwrap(), 0);
        assert_eq!(update(&store, |k| k.len()).unwrap(), 1);
    }

    #[test]
    fn test_ttl_lifecycle() {
        let store = Store::open_memory().unwrap();
        seed(&store, &["k"]);
        assert_eq!(update(&store, |k| k.ttl("missing")).unwrap(), KeyTtl::Missing);
        assert_eq!(update(&store, |k| k.ttl("k")).unwrap(), KeyTtl::Persistent);

        assert!(update(&store, |k| k.expire("k", Duration::from_secs(100))).unwrap());
        match update(&store, |k| k.ttl("k")).unwrap() {
            KeyTtl::Remaining(ms) => assert!(ms > 99_000 && ms <= 100_000),
            other => panic!("unexpected ttl {other:?}"),
        }

        assert!(update(&store, |k| k.persist("k")).unwrap());
        assert!(!update(&store, |k| k.persist("k")).unwrap());
        assert_eq!(update(&store, |k| k.ttl("k")).unwrap(), KeyTtl::Persistent);
    }

    #[test]
    fn test_expire_zero_removes_key() {
        let store = Store::open_memory().unwrap();
        seed(&store, &["k"]);
        assert!(update(&store, |k| k.expire("k", Duration::ZERO)).unwrap());
        assert_eq!(update(&store, |k| k.key_type("k")).unwrap(), None);
        assert!(!update(&store, |k| k.expire("k", Duration::from_secs(1))).unwrap());
    }

    #[test]
    fn test_key_ttl_encoding() {
        assert_eq!(KeyTtl::Missing.secs(), -2);
        assert_eq!(KeyTtl::Persistent.millis(), -1);
        assert_eq!(KeyTtl::Remaining(1_499).secs(), 1);
        assert_eq!(KeyTtl::Remaining(1_500).secs(), 2);
    }

    #[test]
    fn test_key_type_and_keys() {
        let store = Store::open_memory().unwrap();
        seed(&store, &["user:1", "user:2", "cfg"]);
        store
            .update(|tx| tx.put_key("list", TypeTag::List, Expiry::Persist))
            .unwrap();
        assert_eq!(
            update(&store, |k| k.key_type("user:1")).unwrap(),
            Some(TypeTag::String)
        );
        assert_eq!(
            update(&store, |k| k.key_type("list")).unwrap(),
            Some(TypeTag::List)
        );
        assert_eq!(
            update(&store, |k| k.keys("user:*")).unwrap(),
            vec!["user:1", "user:2"]
        );
        update(&store, |k| k.flush()).unwrap();
        assert_eq!(update(&store, |k| k.len()).unwrap(), 0);
    }
}
