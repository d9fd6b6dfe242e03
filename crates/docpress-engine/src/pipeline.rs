//! The compression request pipeline
//!
//! validate → resolve identity → evaluate entitlement → gate → acquire an
//! engine slot → locate engine → invoke → package → record → respond.
//! Validation, policy and saturation failures all happen before any scratch
//! file exists.

use crate::invoker::{CompressionInvoker, InvokerSettings};
use crate::locator::EngineLocator;
use crate::packager::ResultPackager;
use crate::policy::PolicyEvaluator;
use crate::store::{usage_store_from_config, MemoryEntitlementStore};
use crate::temp::TempResourceManager;
use crate::usage::UsageRecorder;
use docpress_config::{Config, ConfigLoader};
use docpress_types::{
    CompressionRequest, CompressionResult, EntitlementDecision, EntitlementStore, Error,
    QualityTier, RecordOutcome, RequestId, RequestState, ResolvedIdentity, Result, StateTrail,
    UsageStore,
};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, info_span, warn, Instrument};

/// Everything known about a successfully compressed request
#[derive(Debug, Clone)]
pub struct CompressionOutcome {
    /// Request id
    pub request_id: RequestId,
    /// Identity the request was evaluated under
    pub identity: ResolvedIdentity,
    /// Entitlement applied
    pub decision: EntitlementDecision,
    /// Preset used
    pub quality_tier: QualityTier,
    /// Name of the submitted file
    pub file_name: String,
    /// Compressed document and statistics
    pub result: CompressionResult,
    /// Outcome of the usage write
    pub record: RecordOutcome,
    /// States the request went through
    pub trail: StateTrail,
}

impl CompressionOutcome {
    /// Response metadata for this outcome
    pub fn metadata(&self) -> Vec<(&'static str, String)> {
        ResultPackager::metadata(
            &self.result,
            self.quality_tier,
            self.request_id,
            &self.file_name,
            &self.record,
        )
    }
}

/// Orchestrates one compression request end to end
pub struct CompressionPipeline {
    policy: PolicyEvaluator,
    locator: Arc<EngineLocator>,
    invoker: CompressionInvoker,
    recorder: UsageRecorder,
    permits: Arc<Semaphore>,
    max_concurrent: usize,
    expected_mime: String,
    require_pdf_header: bool,
}

impl std::fmt::Debug for CompressionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompressionPipeline")
            .field("policy", &self.policy)
            .field("locator", &self.locator)
            .field("invoker", &self.invoker)
            .field("max_concurrent", &self.max_concurrent)
            .finish_non_exhaustive()
    }
}

impl CompressionPipeline {
    /// Start building a pipeline for `config`
    pub fn builder(config: Config) -> PipelineBuilder {
        PipelineBuilder::new().with_config(config)
    }

    /// Pipeline with the bundled collaborators for `config`
    pub fn from_config(config: Config) -> Self {
        Self::builder(config).build()
    }

    /// Shared engine locator
    pub fn locator(&self) -> &Arc<EngineLocator> {
        &self.locator
    }

    /// Usage store the recorder writes to
    pub fn usage_store(&self) -> &Arc<dyn UsageStore> {
        self.recorder.store()
    }

    /// Scratch manager used for engine artifacts
    pub fn temp(&self) -> &TempResourceManager {
        self.invoker.temp()
    }

    /// Configured engine concurrency
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Engine slots currently free
    pub fn available_slots(&self) -> usize {
        self.permits.available_permits()
    }

    /// Whether an engine can be located
    pub async fn engine_available(&self) -> bool {
        self.locator.locate().await.is_ok()
    }

    /// Process a request under a fresh request id
    pub async fn process(&self, request: CompressionRequest) -> Result<CompressionOutcome> {
        self.process_with_id(RequestId::new(), request).await
    }

    /// Process a request under `request_id`
    pub async fn process_with_id(
        &self,
        request_id: RequestId,
        request: CompressionRequest,
    ) -> Result<CompressionOutcome> {
        let span = info_span!(
            "compress",
            request_id = %request_id,
            tier = %request.quality_tier,
            size = request.size()
        );

        async move {
            let mut trail = StateTrail::new();
            let outcome = self.run(request_id, request, &mut trail).await;

            match &outcome {
                Ok(outcome) => info!(
                    "Compressed {} -> {} bytes ({}%)",
                    outcome.result.original_size(),
                    outcome.result.compressed_size(),
                    outcome.result.ratio()
                ),
                Err(e) if e.is_client_fault() => info!("Request rejected: {}", e),
                Err(e) => warn!("Request failed: {}", e),
            }
            debug!("Request {} ended in state {}", request_id, trail.current());

            outcome
        }
        .instrument(span)
        .await
    }

    async fn run(
        &self,
        request_id: RequestId,
        request: CompressionRequest,
        trail: &mut StateTrail,
    ) -> Result<CompressionOutcome> {
        if let Err(e) = request.validate(&self.expected_mime, self.require_pdf_header) {
            advance(trail, RequestState::Rejected);
            return Err(e);
        }
        advance(trail, RequestState::Validated);

        let identity = PolicyEvaluator::resolve_identity(&request.caller);
        let decision = self.policy.evaluate(&identity).await;
        if let Err(e) = PolicyEvaluator::gate(&decision, &request) {
            advance(trail, RequestState::Rejected);
            return Err(e);
        }
        advance(trail, RequestState::PolicyChecked);

        let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() else {
            advance(trail, RequestState::Rejected);
            return Err(Error::Saturated {
                limit: self.max_concurrent,
            });
        };

        let engine = match self.locator.locate().await {
            Ok(engine) => engine,
            Err(e) => {
                advance(trail, RequestState::Failed);
                return Err(e);
            }
        };

        advance(trail, RequestState::Compressing);
        let result = match self
            .invoker
            .invoke(request_id, &request.payload, request.quality_tier, &engine)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                advance(trail, RequestState::Failed);
                return Err(e);
            }
        };
        advance(trail, RequestState::Compressed);
        drop(permit);

        let file_name = request.display_name().to_string();
        let record = self
            .recorder
            .record(
                &identity,
                &file_name,
                &result,
                request.quality_tier,
                request_id,
            )
            .await;
        match record {
            RecordOutcome::Recorded => advance(trail, RequestState::Recorded),
            RecordOutcome::Failed(_) => advance(trail, RequestState::RecordFailed),
            RecordOutcome::Skipped => {}
        }
        advance(trail, RequestState::Responded);

        Ok(CompressionOutcome {
            request_id,
            identity,
            decision,
            quality_tier: request.quality_tier,
            file_name,
            result,
            record,
            trail: trail.clone(),
        })
    }
}

fn advance(trail: &mut StateTrail, next: RequestState) {
    let from = trail.current();
    if trail.advance(next) {
        debug!("State {} -> {}", from, next);
    } else {
        warn!("Ignored illegal state transition {} -> {}", from, next);
    }
}

/// Builder for a pipeline with custom collaborators
#[derive(Default)]
pub struct PipelineBuilder {
    config: Option<Config>,
    entitlements: Option<Arc<dyn EntitlementStore>>,
    usage: Option<Arc<dyn UsageStore>>,
    locator: Option<Arc<EngineLocator>>,
}

impl PipelineBuilder {
    /// Create a new pipeline builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Use `store` for plan lookups instead of the configured plans
    pub fn with_entitlement_store(mut self, store: Arc<dyn EntitlementStore>) -> Self {
        self.entitlements = Some(store);
        self
    }

    /// Use `store` for usage records instead of the configured backend
    pub fn with_usage_store(mut self, store: Arc<dyn UsageStore>) -> Self {
        self.usage = Some(store);
        self
    }

    /// Share an existing locator
    pub fn with_locator(mut self, locator: Arc<EngineLocator>) -> Self {
        self.locator = Some(locator);
        self
    }

    /// Build the pipeline, loading configuration from the default locations when unset
    pub fn try_build(mut self) -> Result<CompressionPipeline> {
        if self.config.is_none() {
            self.config = Some(ConfigLoader::load_default()?);
        }
        Ok(self.build())
    }

    /// Build the pipeline, using default configuration when unset
    pub fn build(self) -> CompressionPipeline {
        let config = self.config.unwrap_or_default();

        let entitlements = self.entitlements.unwrap_or_else(|| {
            Arc::new(MemoryEntitlementStore::from_config(&config.entitlements))
        });
        let usage = self
            .usage
            .unwrap_or_else(|| usage_store_from_config(&config.usage));
        let locator = self
            .locator
            .unwrap_or_else(|| Arc::new(EngineLocator::from_config(&config.engine)));

        let temp = TempResourceManager::from_config(&config.scratch);
        let invoker = CompressionInvoker::new(
            temp,
            InvokerSettings::from_config(&config.engine, &config.scratch),
        );
        let max_concurrent = config.engine.max_concurrent_invocations.max(1);

        CompressionPipeline {
            policy: PolicyEvaluator::new(entitlements, &config.policy),
            locator,
            invoker,
            recorder: UsageRecorder::new(usage, config.usage.record_timeout()),
            permits: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            expected_mime: config.policy.expected_mime.clone(),
            require_pdf_header: config.policy.require_pdf_header,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryUsageStore;
    use docpress_types::{CallerIdentity, IdentitySource};
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::time::Duration;
    use tempfile::TempDir;

    const MB: usize = 1024 * 1024;

    fn config(scratch: &Path, engine: Option<PathBuf>) -> Config {
        let mut config = Config::default();
        config.scratch.directory = Some(scratch.to_path_buf());
        config.engine.path = engine;
        config.engine.max_concurrent_invocations = 2;
        config.entitlements.plans =
            HashMap::from([("premium-user".to_string(), "pro".to_string())]);
        config
    }

    fn missing_engine_locator() -> Arc<EngineLocator> {
        Arc::new(EngineLocator::new(
            vec!["/nonexistent/docpress/gs".to_string()],
            Duration::from_secs(1),
        ))
    }

    fn pdf(size: usize) -> Vec<u8> {
        let mut bytes = b"%PDF-1.7\n".to_vec();
        bytes.resize(size, b'x');
        bytes
    }

    fn scratch_is_empty(dir: &Path) -> bool {
        std::fs::read_dir(dir).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn test_anonymous_oversized_rejected_without_scratch_writes() {
        let scratch = TempDir::new().unwrap();
        let pipeline = CompressionPipeline::builder(config(scratch.path(), None))
            .with_locator(missing_engine_locator())
            .build();

        let error = pipeline
            .process(CompressionRequest::new(pdf(25 * MB)))
            .await
            .unwrap_err();

        assert_eq!(
            error,
            Error::PayloadTooLarge {
                limit: (20 * MB) as u64,
                actual: (25 * MB) as u64,
                premium: false,
            }
        );
        assert!(scratch_is_empty(scratch.path()));
    }

    #[tokio::test]
    async fn test_free_screen_rejected() {
        let scratch = TempDir::new().unwrap();
        let pipeline = CompressionPipeline::builder(config(scratch.path(), None))
            .with_locator(missing_engine_locator())
            .build();

        let request = CompressionRequest::new(pdf(5 * MB))
            .with_tier(QualityTier::Screen)
            .with_caller(CallerIdentity::authenticated("free-user"));
        let error = pipeline.process(request).await.unwrap_err();

        assert!(matches!(error, Error::FeatureNotEntitled { tier: QualityTier::Screen }));
        assert!(scratch_is_empty(scratch.path()));
    }

    #[tokio::test]
    async fn test_validation_runs_first() {
        let scratch = TempDir::new().unwrap();
        let pipeline = CompressionPipeline::builder(config(scratch.path(), None))
            .with_locator(missing_engine_locator())
            .build();

        let request = CompressionRequest::new(pdf(25 * MB)).with_mime("image/png");
        let error = pipeline.process(request).await.unwrap_err();
        assert_eq!(error.kind(), docpress_types::ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_engine_not_found_creates_no_scratch_files() {
        let scratch = TempDir::new().unwrap();
        let pipeline = CompressionPipeline::builder(config(scratch.path(), None))
            .with_locator(missing_engine_locator())
            .build();

        let request = CompressionRequest::new(pdf(25 * MB))
            .with_tier(QualityTier::Screen)
            .with_caller(CallerIdentity::client_asserted("premium-user"));
        let error = pipeline.process(request).await.unwrap_err();

        assert!(matches!(error, Error::EngineNotFound { .. }));
        assert!(scratch_is_empty(scratch.path()));
        assert_eq!(pipeline.available_slots(), 2);
    }

    #[cfg(unix)]
    mod with_fake_engine {
        use super::*;
        use crate::testing::{fake_engine, FakeEngine};

        fn pipeline(
            scratch: &Path,
            tools: &Path,
            behaviour: FakeEngine,
        ) -> (CompressionPipeline, Arc<MemoryUsageStore>) {
            let engine = fake_engine(tools, behaviour);
            let usage = Arc::new(MemoryUsageStore::new());
            let mut config = config(scratch, Some(engine));
            config.engine.invocation_timeout_secs = 2;
            let pipeline = CompressionPipeline::builder(config)
                .with_usage_store(usage.clone())
                .build();
            (pipeline, usage)
        }

        #[tokio::test]
        async fn test_premium_screen_25mb_compresses_and_records() {
            let scratch = TempDir::new().unwrap();
            let tools = TempDir::new().unwrap();
            let (pipeline, usage) = pipeline(scratch.path(), tools.path(), FakeEngine::Halve);

            let request = CompressionRequest::new(pdf(25 * MB))
                .with_tier(QualityTier::Screen)
                .with_caller(CallerIdentity::authenticated("premium-user"))
                .with_file_name("big.pdf");
            let outcome = pipeline.process(request).await.unwrap();

            assert!(outcome.decision.is_premium);
            assert_eq!(outcome.result.compressed_size(), (25 * MB / 2) as u64);
            assert_eq!(outcome.result.ratio().to_string(), "50.00");
            assert_eq!(outcome.record, RecordOutcome::Recorded);
            assert_eq!(outcome.trail.current(), RequestState::Responded);
            assert!(outcome.trail.states().contains(&RequestState::Recorded));
            assert!(scratch_is_empty(scratch.path()));

            let records = usage.list("premium-user", 10).await.unwrap();
            assert_eq!(records.len(), 1);
            assert_eq!(records[0].file_name, "big.pdf");
            assert_eq!(records[0].identity_source, IdentitySource::Authenticated);
        }

        #[tokio::test]
        async fn test_anonymous_success_skips_recording() {
            let scratch = TempDir::new().unwrap();
            let tools = TempDir::new().unwrap();
            let (pipeline, usage) = pipeline(scratch.path(), tools.path(), FakeEngine::Grow);

            let outcome = pipeline
                .process(CompressionRequest::new(pdf(1000)))
                .await
                .unwrap();

            assert_eq!(outcome.record, RecordOutcome::Skipped);
            assert_eq!(outcome.result.ratio().to_string(), "-100.00");
            assert!(usage.is_empty().await);
            assert!(!outcome.trail.states().contains(&RequestState::Recorded));
        }

        #[tokio::test]
        async fn test_engine_failure_cleans_up() {
            let scratch = TempDir::new().unwrap();
            let tools = TempDir::new().unwrap();
            let (pipeline, usage) = pipeline(scratch.path(), tools.path(), FakeEngine::Fail);

            let request = CompressionRequest::new(pdf(1000))
                .with_caller(CallerIdentity::authenticated("premium-user"));
            let error = pipeline.process(request).await.unwrap_err();

            match error {
                Error::Engine { diagnostics, .. } => {
                    assert!(diagnostics.contains("Unrecoverable error"));
                }
                other => panic!("expected engine error, got {:?}", other),
            }
            assert!(scratch_is_empty(scratch.path()));
            assert!(usage.is_empty().await);
            assert_eq!(pipeline.available_slots(), 2);
        }

        #[tokio::test]
        async fn test_saturation_rejects_before_scratch_writes() {
            let scratch = TempDir::new().unwrap();
            let tools = TempDir::new().unwrap();
            let (pipeline, _usage) = pipeline(scratch.path(), tools.path(), FakeEngine::Hang);
            let pipeline = Arc::new(pipeline);

            let mut running = Vec::new();
            for _ in 0..2 {
                let pipeline = Arc::clone(&pipeline);
                running.push(tokio::spawn(async move {
                    pipeline.process(CompressionRequest::new(pdf(100))).await
                }));
            }

            // Wait until both slots are taken
            let deadline = std::time::Instant::now() + Duration::from_secs(5);
            while pipeline.available_slots() > 0 && std::time::Instant::now() < deadline {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            assert_eq!(pipeline.available_slots(), 0);

            let error = pipeline
                .process(CompressionRequest::new(pdf(100)))
                .await
                .unwrap_err();
            assert_eq!(error, Error::Saturated { limit: 2 });

            for handle in running {
                let result = handle.await.unwrap();
                assert!(matches!(result, Err(Error::Timeout { seconds: 2 })));
            }
            assert!(scratch_is_empty(scratch.path()));
            assert_eq!(pipeline.available_slots(), 2);
        }

        #[tokio::test]
        async fn test_abandoned_request_releases_scratch_and_slot() {
            let scratch = TempDir::new().unwrap();
            let tools = TempDir::new().unwrap();
            let (pipeline, usage) = pipeline(scratch.path(), tools.path(), FakeEngine::Hang);

            let request = CompressionRequest::new(pdf(100))
                .with_caller(CallerIdentity::authenticated("premium-user"));
            let abandoned =
                tokio::time::timeout(Duration::from_millis(300), pipeline.process(request)).await;

            assert!(abandoned.is_err());
            assert!(scratch_is_empty(scratch.path()));
            assert_eq!(pipeline.available_slots(), 2);
            assert!(usage.is_empty().await);
        }

        #[tokio::test]
        async fn test_repeated_runs_produce_identical_sizes() {
            let scratch = TempDir::new().unwrap();
            let tools = TempDir::new().unwrap();
            let (pipeline, _usage) = pipeline(scratch.path(), tools.path(), FakeEngine::Halve);

            let payload = pdf(4096);
            let first = pipeline
                .process(CompressionRequest::new(payload.clone()))
                .await
                .unwrap();
            let second = pipeline
                .process(CompressionRequest::new(payload))
                .await
                .unwrap();

            assert_eq!(first.result.compressed_size(), second.result.compressed_size());
            assert_eq!(first.result.ratio(), second.result.ratio());
        }
    }
}
