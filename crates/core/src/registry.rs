//! Cache registry: the sole owner of every partition.
//!
//! Other components never hold partition handles of their own; they address
//! partitions by [`PartitionRole`] and go through `match_entry` / `put` /
//! `delete`. The registry maps roles to full partition names using the
//! configured version tag.
//!
//! ### Eviction
//! - `evict_except` runs once per activation and deletes every partition not
//!   on the keep-list. There is no per-entry expiry.
//! - `wipe_all` deletes every partition regardless of the keep-list and
//!   bumps the wipe epoch. Writes scheduled under an older epoch through
//!   `put_since` are dropped, so nothing fetched before a wipe lands after it.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::cache::hash::compute_cache_key;
use crate::cache::{CacheDb, NewEntry, StoredEntry, WriteFence};
use crate::http::{Headers, Request, Response};
use crate::Error;

/// Logical role of a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PartitionRole {
    /// App shell and static assets. Replaced on every version bump.
    Static,
    /// Third-party web fonts.
    Fonts,
    /// Large user documents. Survive upgrades.
    Documents,
    /// Latest in-progress session snapshot.
    AiSession,
    /// Mutations waiting for a reconnect trigger.
    SyncQueue,
}

impl PartitionRole {
    pub const ALL: [PartitionRole; 5] = [
        PartitionRole::Static,
        PartitionRole::Fonts,
        PartitionRole::Documents,
        PartitionRole::AiSession,
        PartitionRole::SyncQueue,
    ];

    /// Versioned roles are fully replaced on upgrade.
    pub fn is_versioned(self) -> bool {
        matches!(self, PartitionRole::Static)
    }

    fn base_name(self) -> &'static str {
        match self {
            PartitionRole::Static => "static",
            PartitionRole::Fonts => "fonts-cache",
            PartitionRole::Documents => "docs-cache",
            PartitionRole::AiSession => "ai-cache",
            PartitionRole::SyncQueue => "sync-queue",
        }
    }

    /// Full partition name for a version tag.
    pub fn partition_name(self, version: &str) -> String {
        if self.is_versioned() { format!("{}-{version}", self.base_name()) } else { self.base_name().to_string() }
    }
}

impl fmt::Display for PartitionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.base_name())
    }
}

/// The tuple a partition entry is keyed by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestIdentity {
    pub method: String,
    pub url: String,
    /// Serialized values of request headers the entry varies on.
    pub vary: String,
}

impl RequestIdentity {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self { method: method.into().to_ascii_uppercase(), url: url.into(), vary: String::new() }
    }

    pub fn with_vary(mut self, vary: impl Into<String>) -> Self {
        self.vary = vary.into();
        self
    }

    pub fn key_hash(&self) -> String {
        compute_cache_key(&self.method, &self.url, &self.vary)
    }
}

impl From<&Request> for RequestIdentity {
    fn from(request: &Request) -> Self {
        let mut url = request.url.clone();
        url.set_fragment(None);
        RequestIdentity::new(&request.method, url.as_str())
    }
}

/// A stored request/response pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedEntry {
    pub identity: RequestIdentity,
    pub response: Response,
    pub stored_at: String,
}

impl TryFrom<StoredEntry> for CachedEntry {
    type Error = Error;

    fn try_from(stored: StoredEntry) -> Result<Self, Self::Error> {
        let status = u16::try_from(stored.status)
            .map_err(|_| Error::CorruptEntry(format!("status {} out of range", stored.status)))?;
        let headers: Headers = serde_json::from_str(&stored.headers_json)
            .map_err(|e| Error::CorruptEntry(format!("headers for {}: {e}", stored.url)))?;
        Ok(CachedEntry {
            identity: RequestIdentity { method: stored.method, url: stored.url, vary: stored.vary },
            response: Response { status, headers, body: Bytes::from(stored.body) },
            stored_at: stored.stored_at,
        })
    }
}

/// Name of an opened partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionHandle {
    pub role: PartitionRole,
    pub name: String,
}

/// Owns the partition set and the current version tag.
#[derive(Debug, Clone)]
pub struct CacheRegistry {
    db: CacheDb,
    version: String,
    wipes: Arc<AtomicU64>,
}

impl CacheRegistry {
    pub fn new(db: CacheDb, version: impl Into<String>) -> Self {
        Self { db, version: version.into(), wipes: Arc::new(AtomicU64::new(0)) }
    }

    /// Number of wipes so far. Capture it before a fetch whose result will be stored.
    pub fn wipe_epoch(&self) -> u64 {
        self.wipes.load(Ordering::SeqCst)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Full partition name for a role under the current version.
    pub fn partition_name(&self, role: PartitionRole) -> String {
        role.partition_name(&self.version)
    }

    /// Names every current-version role resolves to.
    pub fn keep_list(&self) -> Vec<String> {
        PartitionRole::ALL.iter().map(|role| self.partition_name(*role)).collect()
    }

    /// Create the partition for `role` if absent.
    pub async fn open(&self, role: PartitionRole) -> Result<PartitionHandle, Error> {
        let name = self.partition_name(role);
        if self.db.ensure_partition(&name).await? {
            tracing::debug!(partition = %name, "created partition");
        }
        Ok(PartitionHandle { role, name })
    }

    /// Look up an entry. No side effects.
    pub async fn match_entry(&self, role: PartitionRole, identity: &RequestIdentity) -> Result<Option<CachedEntry>, Error> {
        let name = self.partition_name(role);
        match self.db.get_entry(&name, &identity.key_hash()).await? {
            Some(stored) => Ok(Some(CachedEntry::try_from(stored)?)),
            None => Ok(None),
        }
    }

    /// Store a response, overwriting any previous entry for the identity.
    ///
    /// Takes the response by reference and copies it, so the caller's copy
    /// stays readable.
    pub async fn put(&self, role: PartitionRole, identity: &RequestIdentity, response: &Response) -> Result<(), Error> {
        let entry = self.new_entry(role, identity, response)?;
        self.db.put_entry(entry).await
    }

    /// Store a response only if no wipe happened since `epoch`.
    ///
    /// Returns whether the entry was written.
    pub async fn put_since(
        &self, epoch: u64, role: PartitionRole, identity: &RequestIdentity, response: &Response,
    ) -> Result<bool, Error> {
        let entry = self.new_entry(role, identity, response)?;
        let fence = WriteFence::new(self.wipes.clone(), epoch);
        self.db.put_entry_fenced(entry, Some(fence)).await
    }

    fn new_entry(&self, role: PartitionRole, identity: &RequestIdentity, response: &Response) -> Result<NewEntry, Error> {
        let headers_json = serde_json::to_string(&response.headers)?;
        Ok(NewEntry {
            partition: self.partition_name(role),
            key_hash: identity.key_hash(),
            method: identity.method.clone(),
            url: identity.url.clone(),
            vary: identity.vary.clone(),
            status: response.status,
            headers_json,
            body: response.body.to_vec(),
        })
    }

    /// Delete one entry. Returns false if absent.
    pub async fn delete(&self, role: PartitionRole, identity: &RequestIdentity) -> Result<bool, Error> {
        self.db.delete_entry(&self.partition_name(role), &identity.key_hash()).await
    }

    /// All entries of a partition, in write order.
    ///
    /// Entries that fail to decode are skipped with a warning.
    pub async fn entries(&self, role: PartitionRole) -> Result<Vec<CachedEntry>, Error> {
        let stored = self.db.list_entries(&self.partition_name(role)).await?;
        let mut entries = Vec::with_capacity(stored.len());
        for row in stored {
            match CachedEntry::try_from(row) {
                Ok(entry) => entries.push(entry),
                Err(e) => tracing::warn!(role = %role, error = %e, "skipping undecodable entry"),
            }
        }
        Ok(entries)
    }

    /// Every partition currently in storage, including other versions'.
    pub async fn partition_names(&self) -> Result<Vec<String>, Error> {
        self.db.list_partitions().await
    }

    /// Delete every partition whose full name is not in `keep`.
    ///
    /// Returns the deleted names.
    pub async fn evict_except(&self, keep: &[String]) -> Result<Vec<String>, Error> {
        let deleted = self.db.delete_partitions_except(keep).await?;
        for name in &deleted {
            tracing::info!(partition = %name, "evicted partition");
        }
        Ok(deleted)
    }

    /// Delete every partition, ignoring the keep-list.
    ///
    /// The epoch moves before the delete is queued, so a fenced write either
    /// runs ahead of the delete or is skipped.
    pub async fn wipe_all(&self) -> Result<u64, Error> {
        self.wipes.fetch_add(1, Ordering::SeqCst);
        let count = self.db.delete_all_partitions().await?;
        tracing::info!(partitions = count, "wiped all partitions");
        Ok(count)
    }
}
