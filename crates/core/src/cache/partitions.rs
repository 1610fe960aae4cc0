//! Partition lifecycle: create, enumerate, delete.

use super::connection::CacheDb;
use crate::Error;
use tokio_rusqlite::params;

impl CacheDb {
    /// Create a partition if absent.
    ///
    /// Returns true when the partition was newly created.
    pub async fn ensure_partition(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let inserted = conn.execute(
                    "INSERT OR IGNORE INTO partitions (name, created_at) VALUES (?1, ?2)",
                    params![name, now],
                )?;
                Ok(inserted == 1)
            })
            .await
            .map_err(Error::from)
    }

    /// List partition names in creation order.
    pub async fn list_partitions(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM partitions ORDER BY created_at ASC, name ASC")?;
                let names = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete one partition and all of its entries.
    ///
    /// Returns false if the partition did not exist.
    pub async fn delete_partition(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute("DELETE FROM partitions WHERE name = ?1", params![name])?;
                Ok(deleted == 1)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete every partition whose name is not in `keep`.
    ///
    /// Runs in one transaction. Returns the deleted names.
    pub async fn delete_partitions_except(&self, keep: &[String]) -> Result<Vec<String>, Error> {
        let keep = keep.to_vec();
        self.conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let tx = conn.transaction()?;
                let existing = {
                    let mut stmt = tx.prepare("SELECT name FROM partitions ORDER BY created_at ASC, name ASC")?;
                    stmt.query_map([], |row| row.get::<_, String>(0))?
                        .collect::<Result<Vec<_>, _>>()?
                };

                let mut deleted = Vec::new();
                for name in existing {
                    if !keep.contains(&name) {
                        tx.execute("DELETE FROM partitions WHERE name = ?1", params![name])?;
                        deleted.push(name);
                    }
                }
                tx.commit()?;
                Ok(deleted)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete every partition.
    ///
    /// Returns the number of deleted partitions.
    pub async fn delete_all_partitions(&self) -> Result<u64, Error> {
        self.conn
            .call(|conn| -> Result<u64, Error> {
                let count = conn.execute("DELETE FROM partitions", [])?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}
