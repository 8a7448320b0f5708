use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use taskfold_api::{Node, SmartRule, Tag};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, warn};

pub const NODES_FILE: &str = "nodes.json";
pub const TAGS_FILE: &str = "tags.json";
pub const RULES_FILE: &str = "rules.json";
pub const METADATA_FILE: &str = "metadata.json";
pub const PENDING_OPS_FILE: &str = "pending_ops.json";

const DEFAULT_SIZE_CHECK_BYTES: u64 = 10 * 1024 * 1024;

// The metadata document and the unreplayed mutation queue survive
// age-based eviction; size-based eviction additionally spares the node
// set, so only secondary caches (tags, rules) are candidates there.
const AGE_PROTECTED: &[&str] = &[METADATA_FILE, PENDING_OPS_FILE];
const SIZE_PROTECTED: &[&str] = &[NODES_FILE, METADATA_FILE, PENDING_OPS_FILE];

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Refreshed only after a successful full fetch, never after an optimistic
/// local mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMetadata {
    #[serde(with = "time::serde::rfc3339")]
    pub last_synced_at: OffsetDateTime,
    pub node_count: usize,
    pub tag_count: usize,
    pub owner_id: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub files_removed: usize,
    pub bytes_freed: u64,
}

impl MaintenanceReport {
    fn merge(self, other: MaintenanceReport) -> MaintenanceReport {
        MaintenanceReport {
            files_removed: self.files_removed + other.files_removed,
            bytes_freed: self.bytes_freed + other.bytes_freed,
        }
    }
}

#[derive(Debug, Clone)]
struct DocumentEntry {
    path: PathBuf,
    name: String,
    len: u64,
    modified: SystemTime,
}

/// Persists the last known-good snapshot of the entity collections as one
/// JSON document per collection under an app-private cache directory.
/// Writes are whole-document replace; reads treat missing or corrupt
/// documents as a cache miss.
#[derive(Debug, Clone)]
pub struct DiskCacheStore {
    root: PathBuf,
    size_check_threshold: u64,
}

impl DiskCacheStore {
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self {
            root,
            size_check_threshold: DEFAULT_SIZE_CHECK_BYTES,
        })
    }

    pub fn with_size_check_threshold(mut self, bytes: u64) -> Self {
        self.size_check_threshold = bytes;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn pending_ops_path(&self) -> PathBuf {
        self.root.join(PENDING_OPS_FILE)
    }

    pub async fn save_nodes(&self, nodes: &[Node]) -> Result<(), CacheError> {
        self.write_document(NODES_FILE, &nodes).await?;
        // Automatic size check after every node snapshot write.
        if self.size().await? > self.size_check_threshold {
            let report = self.enforce_max_size(self.size_check_threshold).await?;
            debug!(
                files_removed = report.files_removed,
                bytes_freed = report.bytes_freed,
                "cache size cap enforced after node write"
            );
        }
        Ok(())
    }

    pub async fn save_tags(&self, tags: &[Tag]) -> Result<(), CacheError> {
        self.write_document(TAGS_FILE, &tags).await
    }

    pub async fn save_rules(&self, rules: &[SmartRule]) -> Result<(), CacheError> {
        self.write_document(RULES_FILE, &rules).await
    }

    pub async fn save_metadata(&self, metadata: &SyncMetadata) -> Result<(), CacheError> {
        self.write_document(METADATA_FILE, metadata).await
    }

    pub async fn load_nodes(&self) -> Option<Vec<Node>> {
        self.read_document(NODES_FILE).await
    }

    pub async fn load_tags(&self) -> Option<Vec<Tag>> {
        self.read_document(TAGS_FILE).await
    }

    pub async fn load_rules(&self) -> Option<Vec<SmartRule>> {
        self.read_document(RULES_FILE).await
    }

    pub async fn load_metadata(&self) -> Option<SyncMetadata> {
        self.read_document(METADATA_FILE).await
    }

    pub async fn clear(&self) -> Result<(), CacheError> {
        for entry in self.document_entries().await? {
            tokio::fs::remove_file(&entry.path).await?;
        }
        Ok(())
    }

    pub async fn size(&self) -> Result<u64, CacheError> {
        let mut total = 0;
        for entry in self.document_entries().await? {
            total += entry.len;
        }
        Ok(total)
    }

    /// Deletes cache documents whose last-modified time is older than the
    /// threshold. The metadata document is never age-evicted.
    pub async fn cleanup_old_files(
        &self,
        max_age_days: u32,
    ) -> Result<MaintenanceReport, CacheError> {
        let cutoff = SystemTime::now() - Duration::from_secs(u64::from(max_age_days) * 86_400);
        let mut report = MaintenanceReport::default();
        for entry in self.document_entries().await? {
            if AGE_PROTECTED.contains(&entry.name.as_str()) {
                continue;
            }
            if entry.modified < cutoff {
                tokio::fs::remove_file(&entry.path).await?;
                report.files_removed += 1;
                report.bytes_freed += entry.len;
                debug!(document = %entry.name, "age-evicted cache document");
            }
        }
        Ok(report)
    }

    /// Removes documents oldest-first until the cache fits under the cap.
    /// The node set, the metadata document and the pending-operation queue
    /// are never size-evicted, so secondary caches go first.
    pub async fn enforce_max_size(&self, max_bytes: u64) -> Result<MaintenanceReport, CacheError> {
        let mut entries = self.document_entries().await?;
        entries.sort_by_key(|entry| entry.modified);
        let mut total: u64 = entries.iter().map(|entry| entry.len).sum();
        let mut report = MaintenanceReport::default();
        for entry in entries {
            if total <= max_bytes {
                break;
            }
            if SIZE_PROTECTED.contains(&entry.name.as_str()) {
                continue;
            }
            tokio::fs::remove_file(&entry.path).await?;
            total = total.saturating_sub(entry.len);
            report.files_removed += 1;
            report.bytes_freed += entry.len;
            debug!(document = %entry.name, "size-evicted cache document");
        }
        Ok(report)
    }

    pub async fn perform_maintenance(
        &self,
        max_age_days: u32,
        max_bytes: u64,
    ) -> Result<MaintenanceReport, CacheError> {
        let aged = self.cleanup_old_files(max_age_days).await?;
        let sized = self.enforce_max_size(max_bytes).await?;
        Ok(aged.merge(sized))
    }

    async fn write_document<T: Serialize>(&self, name: &str, value: &T) -> Result<(), CacheError> {
        let body = serde_json::to_vec_pretty(value)?;
        let target = self.root.join(name);
        let staging = self.root.join(format!("{name}.tmp"));
        tokio::fs::write(&staging, &body).await?;
        tokio::fs::rename(&staging, &target).await?;
        Ok(())
    }

    async fn read_document<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        let raw = match tokio::fs::read(self.root.join(name)).await {
            Ok(raw) => raw,
            Err(err) => {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!(document = name, error = %err, "cache document unreadable");
                }
                return None;
            }
        };
        match serde_json::from_slice(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(document = name, error = %err, "cache document failed to decode");
                None
            }
        }
    }

    async fn document_entries(&self) -> Result<Vec<DocumentEntry>, CacheError> {
        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = dir.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.ends_with(".json") {
                continue;
            }
            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            entries.push(DocumentEntry {
                path: entry.path(),
                name,
                len: metadata.len(),
                modified,
            });
        }
        Ok(entries)
    }
}
