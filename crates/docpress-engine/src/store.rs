//! Bundled collaborator implementations
//!
//! Sessions and plans are static maps from configuration. Usage goes to
//! process memory or to an append-only JSON lines file.

use async_trait::async_trait;
use docpress_config::{AuthConfig, EntitlementsConfig, UsageBackend, UsageConfig};
use docpress_types::{
    EntitlementStore, Error, PlanRecord, Result, SessionResolver, UsageRecord, UsageStore,
    UsageSummary,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

/// Session resolver backed by a fixed token map
#[derive(Debug, Clone, Default)]
pub struct StaticSessionResolver {
    sessions: HashMap<String, String>,
}

impl StaticSessionResolver {
    /// Create a resolver over token → user id pairs
    pub fn new(sessions: HashMap<String, String>) -> Self {
        Self { sessions }
    }

    /// Create a resolver from the auth configuration
    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(config.sessions.clone())
    }
}

#[async_trait]
impl SessionResolver for StaticSessionResolver {
    async fn resolve(&self, token: &str) -> Option<String> {
        self.sessions.get(token).cloned()
    }
}

/// Entitlement store backed by a fixed user → plan map
#[derive(Debug, Clone, Default)]
pub struct MemoryEntitlementStore {
    plans: HashMap<String, String>,
}

impl MemoryEntitlementStore {
    /// Create a store over user id → plan name pairs
    pub fn new(plans: HashMap<String, String>) -> Self {
        Self { plans }
    }

    /// Create a store from the entitlements configuration
    pub fn from_config(config: &EntitlementsConfig) -> Self {
        Self::new(config.plans.clone())
    }
}

#[async_trait]
impl EntitlementStore for MemoryEntitlementStore {
    async fn lookup(&self, user_id: &str) -> Result<Option<PlanRecord>> {
        Ok(self
            .plans
            .get(user_id)
            .map(|plan| PlanRecord::new(user_id, plan.as_str())))
    }
}

/// Usage store held in process memory
#[derive(Debug, Default)]
pub struct MemoryUsageStore {
    records: RwLock<Vec<UsageRecord>>,
}

impl MemoryUsageStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Whether the store is empty
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl UsageStore for MemoryUsageStore {
    async fn insert(&self, record: UsageRecord) -> Result<()> {
        self.records.write().await.push(record);
        Ok(())
    }

    async fn list(&self, user_id: &str, limit: usize) -> Result<Vec<UsageRecord>> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .rev()
            .filter(|record| record.user_id == user_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn summary(&self, user_id: &str) -> Result<UsageSummary> {
        let records = self.records.read().await;
        let mut summary = UsageSummary::default();
        for record in records.iter().filter(|record| record.user_id == user_id) {
            summary.add(record);
        }
        Ok(summary)
    }
}

/// Append-only usage store writing one JSON object per line
#[derive(Debug)]
pub struct JsonlUsageStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlUsageStore {
    /// Create a store appending to `path`
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// File the store appends to
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<Vec<UsageRecord>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for (index, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<UsageRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(
                    "Skipping malformed usage line {} in {}: {}",
                    index + 1,
                    self.path.display(),
                    e
                ),
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl UsageStore for JsonlUsageStore {
    async fn insert(&self, record: UsageRecord) -> Result<()> {
        let mut line = serde_json::to_string(&record)
            .map_err(|e| Error::store(format!("Failed to serialize usage record: {}", e)))?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| {
                Error::store(format!("Failed to open {}: {}", self.path.display(), e))
            })?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| Error::store(format!("Failed to append usage record: {}", e)))?;
        file.flush()
            .await
            .map_err(|e| Error::store(format!("Failed to flush usage record: {}", e)))?;

        debug!("Appended usage record {} to {}", record.id, self.path.display());
        Ok(())
    }

    async fn list(&self, user_id: &str, limit: usize) -> Result<Vec<UsageRecord>> {
        let mut records: Vec<_> = self
            .read_all()
            .await?
            .into_iter()
            .filter(|record| record.user_id == user_id)
            .collect();
        records.reverse();
        records.truncate(limit);
        Ok(records)
    }

    async fn summary(&self, user_id: &str) -> Result<UsageSummary> {
        let mut summary = UsageSummary::default();
        for record in self.read_all().await? {
            if record.user_id == user_id {
                summary.add(&record);
            }
        }
        Ok(summary)
    }
}

/// Build the usage store selected by configuration
pub fn usage_store_from_config(config: &UsageConfig) -> Arc<dyn UsageStore> {
    match config.backend {
        UsageBackend::Memory => Arc::new(MemoryUsageStore::new()),
        UsageBackend::Jsonl => Arc::new(JsonlUsageStore::new(config.path.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use docpress_types::{IdentitySource, QualityTier, RequestId};
    use tempfile::TempDir;

    fn record(user_id: &str, original: u64, compressed: u64) -> UsageRecord {
        UsageRecord {
            id: uuid::Uuid::new_v4(),
            user_id: user_id.to_string(),
            identity_source: IdentitySource::Authenticated,
            file_name: "a.pdf".to_string(),
            original_size: original,
            compressed_size: compressed,
            quality_tier: QualityTier::Ebook,
            request_id: RequestId::new(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_static_session_resolver() {
        let resolver = StaticSessionResolver::new(HashMap::from([(
            "token-1".to_string(),
            "alice".to_string(),
        )]));
        assert_eq!(resolver.resolve("token-1").await.as_deref(), Some("alice"));
        assert_eq!(resolver.resolve("forged").await, None);
    }

    #[tokio::test]
    async fn test_memory_entitlements() {
        let store = MemoryEntitlementStore::new(HashMap::from([
            ("alice".to_string(), "pro".to_string()),
            ("bob".to_string(), "free".to_string()),
        ]));
        assert!(store.lookup("alice").await.unwrap().unwrap().is_premium());
        assert!(!store.lookup("bob").await.unwrap().unwrap().is_premium());
        assert!(store.lookup("carol").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_usage_newest_first() {
        let store = MemoryUsageStore::new();
        store.insert(record("alice", 100, 50)).await.unwrap();
        store.insert(record("bob", 100, 10)).await.unwrap();
        store.insert(record("alice", 300, 100)).await.unwrap();

        let records = store.list("alice", 10).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].original_size, 300);

        assert_eq!(store.list("alice", 1).await.unwrap().len(), 1);

        let summary = store.summary("alice").await.unwrap();
        assert_eq!(summary.count, 2);
        assert_eq!(summary.bytes_saved, 250);
    }

    #[tokio::test]
    async fn test_jsonl_store_appends() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("usage.jsonl");
        let store = JsonlUsageStore::new(&path);

        assert!(store.list("alice", 10).await.unwrap().is_empty());

        store.insert(record("alice", 1000, 400)).await.unwrap();
        store.insert(record("alice", 2000, 2100)).await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);

        let records = store.list("alice", 10).await.unwrap();
        assert_eq!(records[0].original_size, 2000);

        let summary = store.summary("alice").await.unwrap();
        assert_eq!(summary.count, 2);
        assert_eq!(summary.bytes_saved, 500);
    }

    #[tokio::test]
    async fn test_jsonl_store_concurrent_appends() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(JsonlUsageStore::new(temp_dir.path().join("usage.jsonl")));

        let mut handles = Vec::new();
        for _ in 0..32 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.insert(record("alice", 10, 5)).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(store.summary("alice").await.unwrap().count, 32);
    }

    #[tokio::test]
    async fn test_jsonl_store_skips_malformed_lines() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("usage.jsonl");
        std::fs::write(&path, "{not json}\n\n").unwrap();

        let store = JsonlUsageStore::new(&path);
        store.insert(record("alice", 10, 5)).await.unwrap();
        assert_eq!(store.list("alice", 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_jsonl_store_unwritable_path() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonlUsageStore::new(temp_dir.path().join("missing").join("usage.jsonl"));
        let error = store.insert(record("alice", 10, 5)).await.unwrap_err();
        assert_eq!(error.kind(), docpress_types::ErrorKind::Store);
    }
}
