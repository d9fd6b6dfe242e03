//! Best-effort usage recording

use chrono::Utc;
use docpress_types::{
    CompressionResult, QualityTier, RecordOutcome, RequestId, ResolvedIdentity, UsageRecord,
    UsageStore,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Writes usage records without ever failing the request
#[derive(Clone)]
pub struct UsageRecorder {
    store: Arc<dyn UsageStore>,
    timeout: Duration,
}

impl std::fmt::Debug for UsageRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageRecorder")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl UsageRecorder {
    /// Create a recorder writing to `store`, each write bounded by `timeout`
    pub fn new(store: Arc<dyn UsageStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Underlying store
    pub fn store(&self) -> &Arc<dyn UsageStore> {
        &self.store
    }

    /// Record a successful compression.
    ///
    /// Anonymous callers are skipped. Store errors and timeouts become
    /// `RecordOutcome::Failed`.
    pub async fn record(
        &self,
        identity: &ResolvedIdentity,
        file_name: &str,
        result: &CompressionResult,
        quality_tier: QualityTier,
        request_id: RequestId,
    ) -> RecordOutcome {
        let (Some(user_id), Some(identity_source)) = (identity.user_id(), identity.source()) else {
            debug!("Skipping usage record for anonymous request {}", request_id);
            return RecordOutcome::Skipped;
        };

        let record = UsageRecord {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            identity_source,
            file_name: file_name.to_string(),
            original_size: result.original_size(),
            compressed_size: result.compressed_size(),
            quality_tier,
            request_id,
            timestamp: Utc::now(),
        };

        match tokio::time::timeout(self.timeout, self.store.insert(record)).await {
            Ok(Ok(())) => {
                debug!("Recorded usage for user {} (request {})", user_id, request_id);
                RecordOutcome::Recorded
            }
            Ok(Err(e)) => {
                warn!("Failed to record usage for request {}: {}", request_id, e);
                RecordOutcome::Failed(e.to_string())
            }
            Err(_) => {
                warn!(
                    "Usage recording for request {} timed out after {:?}",
                    request_id, self.timeout
                );
                RecordOutcome::Failed(format!(
                    "Usage store did not respond within {} seconds",
                    self.timeout.as_secs()
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryUsageStore;
    use async_trait::async_trait;
    use bytes::Bytes;
    use docpress_types::{Error, IdentitySource, Result, UsageSummary};

    struct BrokenStore;

    #[async_trait]
    impl UsageStore for BrokenStore {
        async fn insert(&self, _record: UsageRecord) -> Result<()> {
            Err(Error::store("table compression_usage is read-only"))
        }

        async fn list(&self, _user_id: &str, _limit: usize) -> Result<Vec<UsageRecord>> {
            Ok(Vec::new())
        }

        async fn summary(&self, _user_id: &str) -> Result<UsageSummary> {
            Ok(UsageSummary::default())
        }
    }

    struct StalledStore;

    #[async_trait]
    impl UsageStore for StalledStore {
        async fn insert(&self, _record: UsageRecord) -> Result<()> {
            std::future::pending::<()>().await;
            Ok(())
        }

        async fn list(&self, _user_id: &str, _limit: usize) -> Result<Vec<UsageRecord>> {
            Ok(Vec::new())
        }

        async fn summary(&self, _user_id: &str) -> Result<UsageSummary> {
            Ok(UsageSummary::default())
        }
    }

    fn result() -> CompressionResult {
        CompressionResult::new(1000, Bytes::from(vec![1u8; 400]))
    }

    #[tokio::test]
    async fn test_records_client_asserted_identity() {
        let store = Arc::new(MemoryUsageStore::new());
        let recorder = UsageRecorder::new(store.clone(), Duration::from_secs(1));
        let request_id = RequestId::new();

        let outcome = recorder
            .record(
                &ResolvedIdentity::ClientAsserted("u1".into()),
                "a.pdf",
                &result(),
                QualityTier::Ebook,
                request_id,
            )
            .await;

        assert_eq!(outcome, RecordOutcome::Recorded);
        let records = store.list("u1", 10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].identity_source, IdentitySource::ClientAsserted);
        assert_eq!(records[0].request_id, request_id);
        assert_eq!(records[0].compressed_size, 400);
    }

    #[tokio::test]
    async fn test_anonymous_is_skipped() {
        let store = Arc::new(MemoryUsageStore::new());
        let recorder = UsageRecorder::new(store.clone(), Duration::from_secs(1));

        let outcome = recorder
            .record(
                &ResolvedIdentity::Anonymous,
                "a.pdf",
                &result(),
                QualityTier::Ebook,
                RequestId::new(),
            )
            .await;

        assert_eq!(outcome, RecordOutcome::Skipped);
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_store_error_is_captured() {
        let recorder = UsageRecorder::new(Arc::new(BrokenStore), Duration::from_secs(1));
        let outcome = recorder
            .record(
                &ResolvedIdentity::Authenticated("u1".into()),
                "a.pdf",
                &result(),
                QualityTier::Ebook,
                RequestId::new(),
            )
            .await;

        match outcome {
            RecordOutcome::Failed(reason) => assert!(reason.contains("read-only")),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stalled_store_times_out() {
        let recorder = UsageRecorder::new(Arc::new(StalledStore), Duration::from_millis(50));
        let outcome = recorder
            .record(
                &ResolvedIdentity::Authenticated("u1".into()),
                "a.pdf",
                &result(),
                QualityTier::Ebook,
                RequestId::new(),
            )
            .await;

        assert!(outcome.is_failed());
    }
}
