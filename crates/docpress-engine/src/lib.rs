//! Compression request pipeline for docpress
//!
//! This crate turns an uploaded PDF into a compressed one by running
//! Ghostscript as an isolated subprocess, with tiered admission control in
//! front and best-effort usage recording behind.
//!
//! # Components
//!
//! - **TempResourceManager**: unique scratch paths, removed on every exit path
//! - **EngineLocator**: probes platform candidates for a working engine
//! - **PolicyEvaluator**: identity resolution, entitlement and size/tier gates
//! - **CompressionInvoker**: runs the engine with a fixed argument vector and a timeout
//! - **ResultPackager**: size statistics and response metadata
//! - **UsageRecorder**: append-only usage records that never fail a request
//! - **CompressionPipeline**: wires the above together with bounded concurrency
//!
//! # Examples
//!
//! ```rust,no_run
//! use docpress_config::Config;
//! use docpress_engine::CompressionPipeline;
//! use docpress_types::{CompressionRequest, QualityTier};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pipeline = CompressionPipeline::from_config(Config::default());
//! let payload = std::fs::read("report.pdf")?;
//! let request = CompressionRequest::new(payload).with_tier(QualityTier::Printer);
//! let outcome = pipeline.process(request).await?;
//! println!("Saved {}%", outcome.result.ratio());
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod invoker;
pub mod locator;
pub mod packager;
pub mod pipeline;
pub mod policy;
pub mod store;
pub mod temp;
pub mod usage;

#[cfg(all(test, unix))]
mod testing;

pub use invoker::{engine_args, CompressionInvoker, InvokerSettings};
pub use locator::{default_candidates, EngineLocator};
pub use packager::{content_disposition, sanitize_file_name, ResultPackager, COMPRESSION_METHOD};
pub use pipeline::{CompressionOutcome, CompressionPipeline, PipelineBuilder};
pub use policy::PolicyEvaluator;
pub use store::{
    usage_store_from_config, JsonlUsageStore, MemoryEntitlementStore, MemoryUsageStore,
    StaticSessionResolver,
};
pub use temp::{TempArtifact, TempResourceManager};
pub use usage::UsageRecorder;
