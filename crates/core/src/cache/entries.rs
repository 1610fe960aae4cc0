//! Entry CRUD operations within a partition.
//!
//! Entries are keyed by `(partition, key_hash)`. Writing an entry creates
//! its partition if needed, and overwrites any previous entry for the key.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::connection::CacheDb;
use crate::Error;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// Write condition evaluated on the database thread just before the insert.
///
/// Holds while `counter` still equals the value captured when the write was
/// scheduled.
#[derive(Debug, Clone)]
pub struct WriteFence {
    counter: Arc<AtomicU64>,
    expected: u64,
}

impl WriteFence {
    pub fn new(counter: Arc<AtomicU64>, expected: u64) -> Self {
        Self { counter, expected }
    }

    fn holds(&self) -> bool {
        self.counter.load(Ordering::SeqCst) == self.expected
    }
}

/// An entry to be written.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub partition: String,
    pub key_hash: String,
    pub method: String,
    pub url: String,
    pub vary: String,
    pub status: u16,
    pub headers_json: String,
    pub body: Vec<u8>,
}

/// An entry as read back from storage.
#[derive(Debug, Clone)]
pub struct StoredEntry {
    pub partition: String,
    pub key_hash: String,
    pub method: String,
    pub url: String,
    pub vary: String,
    pub status: i64,
    pub headers_json: String,
    pub body: Vec<u8>,
    pub stored_at: String,
}

const SELECT_COLUMNS: &str = "partition, key_hash, method, url, vary, status, headers_json, body, stored_at";

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredEntry> {
    Ok(StoredEntry {
        partition: row.get(0)?,
        key_hash: row.get(1)?,
        method: row.get(2)?,
        url: row.get(3)?,
        vary: row.get(4)?,
        status: row.get(5)?,
        headers_json: row.get(6)?,
        body: row.get(7)?,
        stored_at: row.get(8)?,
    })
}

impl CacheDb {
    /// Insert or overwrite an entry. Last write wins.
    ///
    /// An overwritten entry moves to the end of its partition's enumeration order.
    pub async fn put_entry(&self, entry: NewEntry) -> Result<(), Error> {
        self.put_entry_fenced(entry, None).await.map(|_| ())
    }

    /// Like [`CacheDb::put_entry`], but skipped when `fence` no longer holds.
    ///
    /// Returns whether the entry was written.
    pub async fn put_entry_fenced(&self, entry: NewEntry, fence: Option<WriteFence>) -> Result<bool, Error> {
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                if let Some(fence) = &fence
                    && !fence.holds()
                {
                    return Ok(false);
                }
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT OR IGNORE INTO partitions (name, created_at) VALUES (?1, ?2)",
                    params![&entry.partition, &now],
                )?;
                let seq: i64 = tx.query_row(
                    "SELECT COALESCE(MAX(seq), 0) + 1 FROM entries WHERE partition = ?1",
                    params![&entry.partition],
                    |row| row.get(0),
                )?;
                tx.execute(
                    "INSERT INTO entries (
                        partition, key_hash, method, url, vary, status, headers_json, body, stored_at, seq
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                    ON CONFLICT(partition, key_hash) DO UPDATE SET
                        method = excluded.method,
                        url = excluded.url,
                        vary = excluded.vary,
                        status = excluded.status,
                        headers_json = excluded.headers_json,
                        body = excluded.body,
                        stored_at = excluded.stored_at,
                        seq = excluded.seq",
                    params![
                        &entry.partition,
                        &entry.key_hash,
                        &entry.method,
                        &entry.url,
                        &entry.vary,
                        entry.status as i64,
                        &entry.headers_json,
                        &entry.body,
                        &now,
                        seq,
                    ],
                )?;
                tx.commit()?;
                Ok(true)
            })
            .await
            .map_err(Error::from)
    }

    /// Get an entry by partition and key hash.
    ///
    /// Returns None if the partition or the entry doesn't exist.
    pub async fn get_entry(&self, partition: &str, key_hash: &str) -> Result<Option<StoredEntry>, Error> {
        let partition = partition.to_string();
        let key_hash = key_hash.to_string();
        self.conn
            .call(move |conn| -> Result<Option<StoredEntry>, Error> {
                let sql = format!("SELECT {SELECT_COLUMNS} FROM entries WHERE partition = ?1 AND key_hash = ?2");
                let mut stmt = conn.prepare(&sql)?;
                match stmt.query_row(params![partition, key_hash], row_to_entry) {
                    Ok(entry) => Ok(Some(entry)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a single entry.
    ///
    /// Returns false if there was nothing to delete.
    pub async fn delete_entry(&self, partition: &str, key_hash: &str) -> Result<bool, Error> {
        let partition = partition.to_string();
        let key_hash = key_hash.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute(
                    "DELETE FROM entries WHERE partition = ?1 AND key_hash = ?2",
                    params![partition, key_hash],
                )?;
                Ok(deleted == 1)
            })
            .await
            .map_err(Error::from)
    }

    /// List all entries of a partition in write order.
    pub async fn list_entries(&self, partition: &str) -> Result<Vec<StoredEntry>, Error> {
        let partition = partition.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<StoredEntry>, Error> {
                let sql = format!("SELECT {SELECT_COLUMNS} FROM entries WHERE partition = ?1 ORDER BY seq ASC");
                let mut stmt = conn.prepare(&sql)?;
                let entries = stmt
                    .query_map(params![partition], row_to_entry)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(entries)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::hash::compute_cache_key;

    fn make_entry(partition: &str, url: &str, body: &str) -> NewEntry {
        NewEntry {
            partition: partition.to_string(),
            key_hash: compute_cache_key("GET", url, ""),
            method: "GET".to_string(),
            url: url.to_string(),
            vary: String::new(),
            status: 200,
            headers_json: "{}".to_string(),
            body: body.as_bytes().to_vec(),
        }
    }

    #[tokio::test]
    async fn test_fenced_put_skipped_after_counter_moves() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let counter = Arc::new(AtomicU64::new(0));

        let written = db
            .put_entry_fenced(make_entry("docs-cache", "https://a.test/1", "one"), Some(WriteFence::new(counter.clone(), 0)))
            .await
            .unwrap();
        assert!(written);

        counter.fetch_add(1, Ordering::SeqCst);
        let written = db
            .put_entry_fenced(make_entry("ai-cache", "https://a.test/2", "two"), Some(WriteFence::new(counter, 0)))
            .await
            .unwrap();
        assert!(!written);
        assert_eq!(db.list_partitions().await.unwrap(), vec!["docs-cache".to_string()]);
    }

    #[tokio::test]
    async fn test_put_creates_partition() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put_entry(make_entry("static-v1", "https://example.com/app.js", "js"))
            .await
            .unwrap();
        assert_eq!(db.list_partitions().await.unwrap(), vec!["static-v1".to_string()]);
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let entry = make_entry("static-v1", "https://example.com/app.js", "console.log(1)");
        db.put_entry(entry.clone()).await.unwrap();

        let stored = db.get_entry("static-v1", &entry.key_hash).await.unwrap().unwrap();
        assert_eq!(stored.url, entry.url);
        assert_eq!(stored.status, 200);
        assert_eq!(stored.body, b"console.log(1)".to_vec());
    }

    #[tokio::test]
    async fn test_get_missing() {
        let db = CacheDb::open_in_memory().await.unwrap();
        assert!(db.get_entry("static-v1", "nonexistent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put_entry(make_entry("docs-cache", "https://example.com/a.pdf", "old"))
            .await
            .unwrap();
        db.put_entry(make_entry("docs-cache", "https://example.com/a.pdf", "new"))
            .await
            .unwrap();

        let entries = db.list_entries("docs-cache").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].body, b"new".to_vec());
    }

    #[tokio::test]
    async fn test_partition_delete_cascades() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let entry = make_entry("static-v1", "https://example.com/", "<html>");
        db.put_entry(entry.clone()).await.unwrap();
        db.delete_partition("static-v1").await.unwrap();

        db.ensure_partition("static-v1").await.unwrap();
        assert!(db.get_entry("static-v1", &entry.key_hash).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_entries_in_write_order() {
        let db = CacheDb::open_in_memory().await.unwrap();
        for n in 1..=3 {
            db.put_entry(make_entry("sync-queue", &format!("https://example.com/{n}"), "x"))
                .await
                .unwrap();
        }
        let urls: Vec<String> = db
            .list_entries("sync-queue")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.url)
            .collect();
        assert_eq!(urls, vec!["https://example.com/1", "https://example.com/2", "https://example.com/3"]);
    }

    #[tokio::test]
    async fn test_delete_entry() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let entry = make_entry("ai-cache", "https://example.com/session", "{}");
        db.put_entry(entry.clone()).await.unwrap();
        assert!(db.delete_entry("ai-cache", &entry.key_hash).await.unwrap());
        assert!(!db.delete_entry("ai-cache", &entry.key_hash).await.unwrap());
    }
}
