pub mod record;
pub mod tx;

use crate::error::Result;
use rusqlite::{Connection, TransactionBehavior};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};
use tx::Tx;

const SCHEMA: &str = include_str!("schema.sql");

/// Handle to the relational backing store.
///
/// Cloning is cheap; every clone shares one SQLite connection. Transactions
/// taken through the same store run one at a time.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open or create a database at the given path (`:memory:` works too).
    pub fn open(path: &str) -> Result<Self> {
        Self::open_with_timeout(path, Duration::from_secs(5))
    }

    /// Open with a custom wait for a lock held by another process.
    pub fn open_with_timeout(path: &str, busy_timeout: Duration) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA temp_store = MEMORY;",
        )?;
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch(SCHEMA)?;
        debug!("Opened store at {path}");
        Ok(Store {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open a private in-memory database.
    pub fn open_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    /// Run `f` in a write transaction. Commits if `f` succeeds, rolls back otherwise.
    pub fn update<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Tx<'_>) -> Result<T>,
    {
        self.run(TransactionBehavior::Immediate, f)
    }

    /// Run `f` in a read transaction.
    pub fn view<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Tx<'_>) -> Result<T>,
    {
        self.run(TransactionBehavior::Deferred, f)
    }

    fn run<T, F>(&self, behavior: TransactionBehavior, f: F) -> Result<T>
    where
        F: FnOnce(&Tx<'_>) -> Result<T>,
    {
        let mut conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let tx = Tx::new(conn.transaction_with_behavior(behavior)?);
        match f(&tx) {
            Ok(out) => {
                tx.commit()?;
                Ok(out)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback() {
                    warn!("Rollback failed: {rollback_err}");
                }
                Err(e)
            }
        }
    }

    /// Close the underlying connection. Other clones keep it open until dropped.
    pub fn close(self) -> Result<()> {
        match Arc::try_unwrap(self.conn) {
            Ok(mutex) => {
                let conn = mutex.into_inner().unwrap_or_else(PoisonError::into_inner);
                conn.close().map_err(|(_, e)| e)?;
                debug!("Store closed");
                Ok(())
            }
            Err(conn) => {
                debug!(
                    handles = Arc::strong_count(&conn),
                    "Store still shared, connection closes when the last handle drops"
                );
                Ok(())
            }
        }
    }
}
